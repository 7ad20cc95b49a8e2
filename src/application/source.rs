//! Port to the paginated post listing served by the upstream API.

use async_trait::async_trait;
use thiserror::Error;

use crate::application::pagination::{PageRequest, PostCursor, PostsPage};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("upstream responded with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("upstream reported errors: {}", .0.join("; "))]
    GraphQl(Vec<String>),
    #[error("malformed upstream response: {0}")]
    Decode(String),
}

impl SourceError {
    pub fn transport(err: impl std::fmt::Display) -> Self {
        Self::Transport(err.to_string())
    }

    pub fn decode(err: impl std::fmt::Display) -> Self {
        Self::Decode(err.to_string())
    }
}

/// Fetches one page of posts. A request without a cursor asks for the first page.
#[async_trait]
pub trait PostsSource: Send + Sync {
    async fn fetch_posts(&self, request: PageRequest<PostCursor>)
    -> Result<PostsPage, SourceError>;
}
