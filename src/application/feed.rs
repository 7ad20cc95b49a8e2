use std::sync::Arc;

use axum::response::Response;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::application::error::HttpError;
use crate::application::loader::{Appended, LoaderError};
use crate::application::pagination::{PageLimit, PageRequest};
use crate::application::session::{FeedSession, FeedSessions, SessionError};
use crate::application::source::{PostsSource, SourceError};
use crate::application::stream::PatchStream;
use crate::domain::posts::PostRecord;
use crate::presentation::views::{
    FeedLoaderContext, FeedLoaderTemplate, PageContext, PostCard, PostCardsAppendTemplate,
    TemplateRenderError, render_fragment,
};

const TARGET: &str = "postlist::feed";

const LOAD_MORE_FAILED: &str = "Could not load more posts";

/// How post cards link and illustrate themselves.
#[derive(Debug, Clone)]
pub struct CardSettings {
    pub post_path_prefix: String,
    pub image_src: String,
}

impl Default for CardSettings {
    fn default() -> Self {
        Self {
            post_path_prefix: "/posts/".to_string(),
            image_src:
                "https://tailwindui.com/img/ecommerce-images/category-page-04-image-card-03.jpg"
                    .to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendPayload {
    pub offset: usize,
    pub cards: Vec<PostCard>,
    pub loader: FeedLoaderContext,
    pub total_visible: usize,
}

/// Result of a scroll-triggered load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppendOutcome {
    Appended(AppendPayload),
    /// Nothing to append; only the loader slot changes.
    Loader(FeedLoaderContext),
    /// Another load for the same session is still running.
    Busy,
}

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("feed session failed")]
    Session(#[from] SessionError),
    #[error(transparent)]
    Render(#[from] TemplateRenderError),
}

#[derive(Clone)]
pub struct FeedService {
    source: Arc<dyn PostsSource>,
    sessions: Arc<FeedSessions>,
    limit: PageLimit,
    cards: CardSettings,
}

impl FeedService {
    pub fn new(
        source: Arc<dyn PostsSource>,
        sessions: Arc<FeedSessions>,
        limit: PageLimit,
        cards: CardSettings,
    ) -> Self {
        Self {
            source,
            sessions,
            limit,
            cards,
        }
    }

    pub fn sessions(&self) -> &Arc<FeedSessions> {
        &self.sessions
    }

    /// Fetch the first page for a new reader and build the home page content.
    ///
    /// The session is only kept when the feed reports further pages; a feed
    /// that fits in one page has nothing left to paginate.
    pub async fn page_context(&self) -> Result<PageContext, FeedError> {
        let session = Arc::new(FeedSession::new(self.limit));
        let first = session.load_initial(self.source.as_ref()).await?;

        let session_id = if first.has_more {
            self.sessions.insert(session.clone());
            Some(session.id())
        } else {
            session.close();
            None
        };

        info!(
            target = TARGET,
            session = ?session_id,
            posts = first.posts.len(),
            has_more = first.has_more,
            "served first feed page"
        );

        let loader = match session_id {
            Some(id) => FeedLoaderContext::more(first.total > 0, more_path(id)),
            None => FeedLoaderContext::end(first.total > 0),
        };
        let loader_html = render_fragment(
            &FeedLoaderTemplate { view: loader },
            "application::feed::page_context",
        )?;

        let seed_json = seed_json(session_id, &first.posts, first.has_more, self.limit);
        let signals_json = json!({
            "feedSession": session_id.map(|id| id.to_string()).unwrap_or_default(),
            "feedLoading": false,
        })
        .to_string();

        let cards = self.cards_for(&first);
        let post_count = cards.len();
        Ok(PageContext {
            posts: cards,
            post_count,
            has_results: post_count > 0,
            loader_html,
            seed_json,
            signals_json,
            close_path: session_id.map(close_path),
        })
    }

    /// Load the page after the last post the session holds.
    pub async fn append_payload(&self, session_id: Uuid) -> Result<AppendOutcome, FeedError> {
        let Some(session) = self.sessions.get(session_id) else {
            debug!(
                target = TARGET,
                session = %session_id,
                "load more for unknown or expired session"
            );
            return Ok(AppendOutcome::Loader(FeedLoaderContext::expired()));
        };

        match session.load_more(self.source.as_ref()).await {
            Ok(appended) => {
                let loader = if appended.has_more {
                    FeedLoaderContext::more(true, more_path(session_id))
                } else {
                    self.sessions.remove(session_id);
                    FeedLoaderContext::end(appended.total > 0)
                };
                Ok(AppendOutcome::Appended(AppendPayload {
                    offset: appended.offset,
                    cards: self.cards_for(&appended),
                    loader,
                    total_visible: appended.total,
                }))
            }
            Err(SessionError::Source(_)) => Ok(AppendOutcome::Loader(FeedLoaderContext::failed(
                more_path(session_id),
                LOAD_MORE_FAILED,
            ))),
            Err(SessionError::Loader(LoaderError::FetchInFlight)) => Ok(AppendOutcome::Busy),
            Err(SessionError::Loader(LoaderError::Exhausted)) => {
                self.sessions.remove(session_id);
                Ok(AppendOutcome::Loader(FeedLoaderContext::end(
                    !session.is_empty(),
                )))
            }
            Err(SessionError::Loader(LoaderError::EmptySequence)) => {
                warn!(
                    target = TARGET,
                    session = %session_id,
                    "feed reported more pages but returned no posts to continue from"
                );
                self.sessions.remove(session_id);
                Ok(AppendOutcome::Loader(FeedLoaderContext::end(false)))
            }
            Err(SessionError::Loader(LoaderError::Closed | LoaderError::Stale)) => {
                Ok(AppendOutcome::Loader(FeedLoaderContext::expired()))
            }
            Err(err @ SessionError::Loader(_)) => Err(err.into()),
        }
    }

    /// Tear down a session. Returns whether it was still live.
    pub fn close_session(&self, session_id: Uuid) -> bool {
        let closed = self.sessions.remove(session_id).is_some();
        if closed {
            debug!(target = TARGET, session = %session_id, "closed feed session");
        }
        closed
    }

    /// Ask the API for a single post to confirm it is reachable.
    pub async fn probe(&self) -> Result<(), SourceError> {
        self.source
            .fetch_posts(PageRequest::first(PageLimit::ONE))
            .await
            .map(|_| ())
    }

    fn cards_for(&self, appended: &Appended) -> Vec<PostCard> {
        appended
            .posts
            .iter()
            .enumerate()
            .map(|(index, post)| post_card(post, appended.offset + index, &self.cards))
            .collect()
    }
}

pub fn more_path(session_id: Uuid) -> String {
    format!("/ui/feed/{session_id}/more")
}

pub fn close_path(session_id: Uuid) -> String {
    format!("/ui/feed/{session_id}/close")
}

fn post_card(post: &PostRecord, position: usize, settings: &CardSettings) -> PostCard {
    PostCard {
        position,
        href: format!("{}{}", settings.post_path_prefix, post.id),
        title: post.title.clone(),
        sub_text: post.sub_text.clone(),
        image_src: settings.image_src.clone(),
        image_alt: format!("post_{}_logo", post.id),
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FeedSeed<'a> {
    session: Option<Uuid>,
    posts: &'a [PostRecord],
    has_more: bool,
    limit: PageLimit,
}

/// Seed state for the page, safe to place inside a `<script>` element.
fn seed_json(
    session: Option<Uuid>,
    posts: &[PostRecord],
    has_more: bool,
    limit: PageLimit,
) -> String {
    let seed = FeedSeed {
        session,
        posts,
        has_more,
        limit,
    };
    match serde_json::to_string(&seed) {
        Ok(encoded) => encoded
            .replace('<', "\\u003c")
            .replace('>', "\\u003e")
            .replace('&', "\\u0026"),
        Err(err) => {
            warn!(target = TARGET, error = %err, "failed to encode feed seed");
            "null".to_string()
        }
    }
}

pub fn build_datastar_append_response(outcome: AppendOutcome) -> Result<Response, HttpError> {
    const SOURCE: &str = "application::feed::build_datastar_append_response";
    let mut stream = PatchStream::new();

    match outcome {
        AppendOutcome::Appended(AppendPayload {
            offset: _,
            cards,
            loader,
            total_visible,
        }) => {
            if !cards.is_empty() {
                let html = render_fragment(&PostCardsAppendTemplate { posts: cards }, SOURCE)?;
                stream.append("#post-grid", html);
            }
            let loader_html = render_fragment(&FeedLoaderTemplate { view: loader }, SOURCE)?;
            stream.replace_inner("#feed-sentinel-container", loader_html);
            stream.script(format!(
                "(function() {{ const grid = document.querySelector('#post-grid'); if (grid) {{ grid.setAttribute('data-count', '{total_visible}'); }} }})();"
            ));
        }
        AppendOutcome::Loader(loader) => {
            let loader_html = render_fragment(&FeedLoaderTemplate { view: loader }, SOURCE)?;
            stream.replace_inner("#feed-sentinel-container", loader_html);
        }
        // The running fetch still owns `feedLoading`.
        AppendOutcome::Busy => return Ok(stream.into_response()),
    }

    stream.signals(&json!({ "feedLoading": false }));
    Ok(stream.into_response())
}
