use crate::application::error::{ErrorReport, HttpError};
use askama::{Error as AskamaError, Template};
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("{public_message}")]
pub struct TemplateRenderError {
    pub(crate) source: &'static str,
    pub(crate) public_message: &'static str,
    #[source]
    pub(crate) error: AskamaError,
}

impl TemplateRenderError {
    pub fn new(source: &'static str, public_message: &'static str, error: AskamaError) -> Self {
        Self {
            source,
            public_message,
            error,
        }
    }
}

impl From<TemplateRenderError> for HttpError {
    fn from(err: TemplateRenderError) -> Self {
        let TemplateRenderError {
            source,
            public_message,
            error,
        } = err;

        HttpError::from_error(
            source,
            StatusCode::INTERNAL_SERVER_ERROR,
            public_message,
            &error,
        )
    }
}

/// Render a fragment to a string, tagging failures with `source`.
pub fn render_fragment<T: Template>(
    template: &T,
    source: &'static str,
) -> Result<String, TemplateRenderError> {
    template
        .render()
        .map_err(|err| TemplateRenderError::new(source, "Template rendering failed", err))
}

pub fn render_template<T: Template>(template: T) -> Result<Html<String>, HttpError> {
    render_fragment(&template, "presentation::views::render_template")
        .map(Html)
        .map_err(HttpError::from)
}

pub fn render_template_response<T: Template>(template: T, status: StatusCode) -> Response {
    match render_template(template) {
        Ok(html) => (status, html).into_response(),
        Err(err) => err.into_response(),
    }
}

pub fn render_not_found_response(chrome: LayoutChrome) -> Response {
    let view = LayoutContext::new(chrome, ErrorPageView::not_found());
    let mut response = render_template_response(ErrorTemplate { view }, StatusCode::NOT_FOUND);
    ErrorReport::from_message(
        "presentation::views::render_not_found_response",
        StatusCode::NOT_FOUND,
        "Resource not found",
    )
    .attach(&mut response);
    response
}

/// Full error page for a failed request. The report from `error` stays attached
/// so the response logger still sees the underlying cause.
pub fn render_error_response(chrome: LayoutChrome, error: HttpError) -> Response {
    let status = error.status();
    let content = ErrorPageView::unavailable(error.public_message());
    let view = LayoutContext::new(chrome, content);
    let mut response = render_template_response(ErrorTemplate { view }, status);
    error.into_report().attach(&mut response);
    response
}

#[derive(Clone)]
pub struct NavigationView {
    pub entries: Vec<NavigationLinkView>,
}

#[derive(Clone)]
pub struct BrandView {
    pub title: String,
    pub href: String,
}

#[derive(Clone)]
pub struct NavigationLinkView {
    pub label: String,
    pub href: String,
    pub target: Option<String>,
    pub rel: Option<String>,
}

#[derive(Clone)]
pub struct HeaderView {
    pub title: String,
}

#[derive(Clone)]
pub struct PageMetaView {
    pub title: String,
    pub description: String,
}

#[derive(Clone)]
pub struct AssetsView {
    pub datastar_src: String,
}

/// Static shell rendered around every page.
#[derive(Clone)]
pub struct LayoutChrome {
    pub brand: BrandView,
    pub navigation: NavigationView,
    pub header: HeaderView,
    pub meta: PageMetaView,
    pub assets: AssetsView,
}

#[derive(Clone)]
pub struct LayoutContext<T> {
    pub brand: BrandView,
    pub navigation: NavigationView,
    pub header: HeaderView,
    pub meta: PageMetaView,
    pub assets: AssetsView,
    pub content: T,
}

impl<T> LayoutContext<T> {
    pub fn new(chrome: LayoutChrome, content: T) -> Self {
        Self {
            brand: chrome.brand,
            navigation: chrome.navigation,
            header: chrome.header,
            meta: chrome.meta,
            assets: chrome.assets,
            content,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostCard {
    /// Zero-based position in the accumulated feed.
    pub position: usize,
    pub href: String,
    pub title: String,
    pub sub_text: String,
    pub image_src: String,
    pub image_alt: String,
}

pub struct PageContext {
    pub posts: Vec<PostCard>,
    pub post_count: usize,
    pub has_results: bool,
    /// Pre-rendered [`FeedLoaderTemplate`] for the sentinel slot.
    pub loader_html: String,
    /// JSON seed state, already escaped for embedding in a `<script>` element.
    pub seed_json: String,
    /// Initial datastar signals.
    pub signals_json: String,
    pub close_path: Option<String>,
}

#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    pub view: LayoutContext<PageContext>,
}

/// State of the slot below the grid that triggers and reports follow-up loads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedLoaderContext {
    pub has_results: bool,
    /// Endpoint the sentinel requests when it scrolls into view.
    pub more_path: Option<String>,
    /// Set when the last follow-up load failed; `more_path` then drives the retry.
    pub failure: Option<String>,
    /// The server no longer holds this feed; the reader has to reload.
    pub expired: bool,
}

impl FeedLoaderContext {
    pub fn more(has_results: bool, more_path: String) -> Self {
        Self {
            has_results,
            more_path: Some(more_path),
            ..Self::default()
        }
    }

    pub fn end(has_results: bool) -> Self {
        Self {
            has_results,
            ..Self::default()
        }
    }

    pub fn failed(more_path: String, message: impl Into<String>) -> Self {
        Self {
            has_results: true,
            more_path: Some(more_path),
            failure: Some(message.into()),
            expired: false,
        }
    }

    pub fn expired() -> Self {
        Self {
            has_results: true,
            expired: true,
            ..Self::default()
        }
    }
}

#[derive(Template)]
#[template(path = "partials/feed_loader.html")]
pub struct FeedLoaderTemplate {
    pub view: FeedLoaderContext,
}

#[derive(Template)]
#[template(path = "partials/post_cards_append.html")]
pub struct PostCardsAppendTemplate {
    pub posts: Vec<PostCard>,
}

pub struct ErrorPageView {
    pub title: String,
    pub message: String,
    pub primary_action: Option<ErrorAction>,
}

impl ErrorPageView {
    pub fn not_found() -> Self {
        Self {
            title: "Page Not Found".to_string(),
            message: "The page you requested does not exist.".to_string(),
            primary_action: Some(ErrorAction::home()),
        }
    }

    pub fn unavailable(message: &str) -> Self {
        Self {
            title: "Posts Unavailable".to_string(),
            message: format!("{message}. Please try again in a moment."),
            primary_action: Some(ErrorAction::retry()),
        }
    }
}

pub struct ErrorAction {
    pub href: String,
    pub label: String,
}

impl ErrorAction {
    pub fn home() -> Self {
        Self {
            href: "/".to_string(),
            label: "Back to home".to_string(),
        }
    }

    pub fn retry() -> Self {
        Self {
            href: "/".to_string(),
            label: "Try again".to_string(),
        }
    }
}

#[derive(Template)]
#[template(path = "error.html")]
pub struct ErrorTemplate {
    pub view: LayoutContext<ErrorPageView>,
}
