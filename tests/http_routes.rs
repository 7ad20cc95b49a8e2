mod support;

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use postlist::application::source::SourceError;
use tower::ServiceExt;

use support::{CatalogueSource, body_to_string, catalogue, feed_service, router};

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .expect("request")
}

fn datastar_get(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .header("datastar-request", "true")
        .body(Body::empty())
        .expect("request")
}

fn post(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .body(Body::empty())
        .expect("request")
}

#[tokio::test]
async fn home_renders_first_page_and_seed() {
    let feed = Arc::new(feed_service(Arc::new(CatalogueSource::new(catalogue(10)))));
    let app = router(feed.clone());

    let response = app.oneshot(get("/")).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CACHE_CONTROL).unwrap(),
        "no-store"
    );

    let body = body_to_string(response).await;
    assert!(body.contains(r#"id="feed-seed""#));
    assert!(body.contains(r#"data-count="8""#));
    assert!(body.contains("Post 8"));
    assert!(!body.contains("Post 9"));
    assert!(body.contains(r#"href="/posts/1""#));
    assert!(body.contains("data-close-path=\"/ui/feed/"));
    assert!(body.contains("if (event.persisted)"));
    assert_eq!(feed.sessions().len(), 1);
}

#[tokio::test]
async fn home_reports_upstream_outage() {
    let source = Arc::new(CatalogueSource::new(catalogue(10)));
    source.fail_next(SourceError::Transport("connection refused".to_string()));
    let app = router(Arc::new(feed_service(source)));

    let response = app.oneshot(get("/")).await.expect("response");
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    let body = body_to_string(response).await;
    assert!(body.contains("The post service is unavailable"));
}

#[tokio::test]
async fn load_more_streams_next_cards() {
    let feed = Arc::new(feed_service(Arc::new(CatalogueSource::new(catalogue(12)))));
    let app = router(feed);

    let home = app.clone().oneshot(get("/")).await.expect("home");
    let html = body_to_string(home).await;
    let session = support::session_id(&html).expect("session id");

    let response = app
        .oneshot(datastar_get(&format!("/ui/feed/{session}/more")))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.starts_with("text/event-stream"));

    let body = body_to_string(response).await;
    assert!(body.contains("#post-grid"));
    assert!(body.contains("Post 9"));
    assert!(body.contains("Post 12"));
    assert!(body.contains("Nothing more to show"));
    assert!(body.contains("feedLoading"));
}

#[tokio::test]
async fn load_more_requires_datastar_header() {
    let feed = Arc::new(feed_service(Arc::new(CatalogueSource::new(catalogue(12)))));
    let app = router(feed);

    let response = app
        .oneshot(get(&format!("/ui/feed/{}/more", uuid::Uuid::new_v4())))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_session_asks_for_reload() {
    let feed = Arc::new(feed_service(Arc::new(CatalogueSource::new(catalogue(12)))));
    let app = router(feed);

    for session in [uuid::Uuid::new_v4().to_string(), "not-a-uuid".to_string()] {
        let response = app
            .clone()
            .oneshot(datastar_get(&format!("/ui/feed/{session}/more")))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_to_string(response).await;
        assert!(body.contains("This list is no longer available."));
    }
}

#[tokio::test]
async fn close_releases_session() {
    let feed = Arc::new(feed_service(Arc::new(CatalogueSource::new(catalogue(12)))));
    let app = router(feed.clone());

    let home = app.clone().oneshot(get("/")).await.expect("home");
    let session = support::session_id(&body_to_string(home).await).expect("session id");
    assert_eq!(feed.sessions().len(), 1);

    let response = app
        .clone()
        .oneshot(post(&format!("/ui/feed/{session}/close")))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(feed.sessions().is_empty());

    let response = app
        .oneshot(post("/ui/feed/not-a-uuid/close"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn health_endpoints_report_status() {
    let source = Arc::new(CatalogueSource::new(catalogue(2)));
    let app = router(Arc::new(feed_service(source.clone())));

    let response = app.clone().oneshot(get("/_health")).await.expect("response");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .clone()
        .oneshot(get("/_health/api"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    source.fail_next(SourceError::GraphQl(vec!["boom".to_string()]));
    let response = app.oneshot(get("/_health/api")).await.expect("response");
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let probes = source.requests();
    assert!(probes.iter().all(|request| request.limit.get() == 1));
}

#[tokio::test]
async fn unknown_paths_render_not_found() {
    let app = router(Arc::new(feed_service(Arc::new(CatalogueSource::new(
        catalogue(1),
    )))));

    let response = app.oneshot(get("/missing")).await.expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
