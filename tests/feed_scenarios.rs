mod support;

use std::sync::Arc;

use postlist::application::{
    feed::{AppendOutcome, AppendPayload},
    source::SourceError,
};
use uuid::Uuid;

use support::{CatalogueSource, catalogue, feed_service};

fn session_of(close_path: Option<&String>) -> Uuid {
    let path = close_path.expect("session should be registered");
    let id = support::session_id(path).expect("session id in close path");
    Uuid::parse_str(&id).expect("uuid")
}

fn appended(outcome: AppendOutcome) -> AppendPayload {
    match outcome {
        AppendOutcome::Appended(payload) => payload,
        other => panic!("expected appended posts, got {other:?}"),
    }
}

#[tokio::test]
async fn scrolling_sixteen_posts_takes_two_pages() {
    let source = Arc::new(CatalogueSource::new(catalogue(16)));
    let feed = feed_service(source.clone());

    let page = feed.page_context().await.expect("first page");
    assert_eq!(page.post_count, 8);
    assert_eq!(page.posts[0].title, "Post 1");
    assert_eq!(page.posts[7].title, "Post 8");

    let session = session_of(page.close_path.as_ref());
    let payload = appended(feed.append_payload(session).await.expect("second page"));

    assert_eq!(payload.offset, 8);
    assert_eq!(payload.total_visible, 16);
    let titles: Vec<_> = payload.cards.iter().map(|card| card.title.as_str()).collect();
    assert_eq!(titles.first(), Some(&"Post 9"));
    assert_eq!(titles.last(), Some(&"Post 16"));
    assert_eq!(payload.cards[0].position, 8);
    assert!(payload.loader.more_path.is_none());

    // The second request resumes after post #8.
    let cursors = source.cursors();
    assert_eq!(cursors.len(), 2);
    assert_eq!(cursors[0], None);
    assert_eq!(cursors[1].as_deref(), Some("1699999999992"));

    // An exhausted feed releases its session.
    assert!(feed.sessions().get(session).is_none());
}

#[tokio::test]
async fn short_feed_never_paginates() {
    let source = Arc::new(CatalogueSource::new(catalogue(3)));
    let feed = feed_service(source.clone());

    let page = feed.page_context().await.expect("first page");

    assert_eq!(page.post_count, 3);
    assert!(page.has_results);
    assert!(page.close_path.is_none());
    assert!(page.loader_html.contains("Nothing more to show"));
    assert!(!page.loader_html.contains("No posts have been published yet."));
    assert!(feed.sessions().is_empty());
    assert_eq!(source.requests().len(), 1);
}

#[tokio::test]
async fn empty_feed_shows_empty_state() {
    let source = Arc::new(CatalogueSource::new(Vec::new()));
    let feed = feed_service(source);

    let page = feed.page_context().await.expect("first page");

    assert_eq!(page.post_count, 0);
    assert!(!page.has_results);
    assert!(page.loader_html.contains("No posts have been published yet."));
    assert!(page.seed_json.contains("\"posts\":[]"));
}

#[tokio::test]
async fn failed_follow_up_can_be_retried() {
    let source = Arc::new(CatalogueSource::new(catalogue(12)));
    let feed = feed_service(source.clone());

    let page = feed.page_context().await.expect("first page");
    let session = session_of(page.close_path.as_ref());

    source.fail_next(SourceError::Status {
        status: 503,
        body: "try later".to_string(),
    });
    match feed.append_payload(session).await.expect("outcome") {
        AppendOutcome::Loader(loader) => {
            assert_eq!(loader.failure.as_deref(), Some("Could not load more posts"));
            assert!(loader.more_path.is_some());
        }
        other => panic!("expected a retry prompt, got {other:?}"),
    }

    let payload = appended(feed.append_payload(session).await.expect("retry"));
    assert_eq!(payload.offset, 8);
    assert_eq!(payload.cards.len(), 4);
    assert_eq!(payload.total_visible, 12);

    // Both follow-up attempts used the same cursor.
    let cursors = source.cursors();
    assert_eq!(cursors.len(), 3);
    assert_eq!(cursors[1], cursors[2]);
}

#[tokio::test]
async fn first_page_failure_surfaces_as_error() {
    let source = Arc::new(CatalogueSource::new(catalogue(4)));
    source.fail_next(SourceError::Transport("connection refused".to_string()));
    let feed = feed_service(source);

    assert!(feed.page_context().await.is_err());
    assert!(feed.sessions().is_empty());
}

#[tokio::test]
async fn closed_session_reports_expired() {
    let source = Arc::new(CatalogueSource::new(catalogue(20)));
    let feed = feed_service(source.clone());

    let page = feed.page_context().await.expect("first page");
    let session = session_of(page.close_path.as_ref());

    assert!(feed.close_session(session));
    assert!(!feed.close_session(session));

    match feed.append_payload(session).await.expect("outcome") {
        AppendOutcome::Loader(loader) => assert!(loader.expired),
        other => panic!("expected expired loader, got {other:?}"),
    }
    assert_eq!(source.requests().len(), 1);
}

#[tokio::test]
async fn three_pages_of_twenty_posts() {
    let source = Arc::new(CatalogueSource::new(catalogue(20)));
    let feed = feed_service(source.clone());

    let page = feed.page_context().await.expect("first page");
    let session = session_of(page.close_path.as_ref());

    let second = appended(feed.append_payload(session).await.expect("second page"));
    assert!(second.loader.more_path.is_some());
    assert_eq!(second.total_visible, 16);

    let third = appended(feed.append_payload(session).await.expect("third page"));
    assert_eq!(third.offset, 16);
    assert_eq!(third.cards.len(), 4);
    assert_eq!(third.total_visible, 20);
    assert!(third.loader.more_path.is_none());
    assert!(third.loader.has_results);
}
