use std::sync::Arc;

use axum::{
    Router,
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header::CACHE_CONTROL},
    middleware,
    response::Response,
    routing::{get, post},
};
use uuid::Uuid;

use crate::{
    application::{
        chrome::ChromeService,
        error::HttpError,
        feed::{self, AppendOutcome, FeedService},
    },
    presentation::views::{
        FeedLoaderContext, IndexTemplate, LayoutContext, render_error_response,
        render_not_found_response, render_template_response,
    },
};

use super::{
    DATASTAR_REQUEST_HEADER, api_health_response,
    middleware::{log_responses, set_request_context},
};

#[derive(Clone)]
pub struct HttpState {
    pub feed: Arc<FeedService>,
    pub chrome: Arc<ChromeService>,
}

pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/ui/feed/{session}/more", get(feed_more))
        .route("/ui/feed/{session}/close", post(feed_close))
        .route("/_health", get(liveness))
        .route("/_health/api", get(api_health))
        .fallback(fallback)
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

async fn index(State(state): State<HttpState>) -> Response {
    let chrome = state.chrome.load();

    match state.feed.page_context().await {
        Ok(content) => {
            let view = LayoutContext::new(chrome, content);
            let mut response = render_template_response(IndexTemplate { view }, StatusCode::OK);
            set_no_store(&mut response);
            response
        }
        Err(err) => render_error_response(chrome, HttpError::from(err)),
    }
}

async fn feed_more(
    State(state): State<HttpState>,
    headers: HeaderMap,
    Path(session): Path<String>,
) -> Result<Response, HttpError> {
    if !headers.contains_key(DATASTAR_REQUEST_HEADER) {
        return Err(HttpError::new(
            "infra::http::feed_more",
            StatusCode::BAD_REQUEST,
            "Expected a datastar request",
            "load-more endpoint called without the datastar-request header",
        ));
    }

    let outcome = match Uuid::parse_str(&session) {
        Ok(id) => state.feed.append_payload(id).await?,
        Err(_) => AppendOutcome::Loader(FeedLoaderContext::expired()),
    };

    let mut response = feed::build_datastar_append_response(outcome)?;
    set_no_store(&mut response);
    Ok(response)
}

async fn feed_close(
    State(state): State<HttpState>,
    Path(session): Path<String>,
) -> Result<StatusCode, HttpError> {
    let id = Uuid::parse_str(&session).map_err(|err| {
        HttpError::from_error(
            "infra::http::feed_close",
            StatusCode::BAD_REQUEST,
            "Invalid feed session",
            &err,
        )
    })?;

    state.feed.close_session(id);
    Ok(StatusCode::NO_CONTENT)
}

async fn liveness() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn api_health(State(state): State<HttpState>) -> Response {
    api_health_response(state.feed.probe().await)
}

async fn fallback(State(state): State<HttpState>) -> Response {
    render_not_found_response(state.chrome.load())
}

fn set_no_store(response: &mut Response) {
    let value = HeaderValue::from_static("no-store");
    response.headers_mut().insert(CACHE_CONTROL, value);
}
