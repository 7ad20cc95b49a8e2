//! Cursor pagination primitives for the post feed.

use std::num::NonZeroU32;

use serde::Serialize;
use thiserror::Error;

use crate::domain::posts::PostRecord;

/// Upper bound accepted for a single page request.
pub const MAX_PAGE_LIMIT: u32 = 48;

/// Default number of posts requested per page.
pub const DEFAULT_PAGE_LIMIT: u32 = 8;

/// Positive page size, at most [`MAX_PAGE_LIMIT`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PageLimit(NonZeroU32);

impl PageLimit {
    pub const ONE: PageLimit = PageLimit(NonZeroU32::MIN);

    pub fn new(value: u32) -> Result<Self, PaginationError> {
        if value > MAX_PAGE_LIMIT {
            return Err(PaginationError::InvalidLimit(value));
        }
        NonZeroU32::new(value)
            .map(Self)
            .ok_or(PaginationError::InvalidLimit(value))
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }
}

impl Default for PageLimit {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_LIMIT).unwrap_or(Self::ONE)
    }
}

/// Opaque position to resume pagination from: the `createdAt` value of the
/// last post already held. The upstream API treats it as exclusive.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PostCursor(String);

impl PostCursor {
    /// Cursor that resumes after `post`.
    pub fn after(post: &PostRecord) -> Self {
        Self(post.created_at.clone())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Cursor-aware pagination request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest<C> {
    pub limit: PageLimit,
    pub cursor: Option<C>,
}

impl<C> PageRequest<C> {
    pub fn new(limit: PageLimit, cursor: Option<C>) -> Self {
        Self { limit, cursor }
    }

    pub fn first(limit: PageLimit) -> Self {
        Self {
            limit,
            cursor: None,
        }
    }
}

/// One bounded batch of posts plus whether more exist beyond it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostsPage {
    pub posts: Vec<PostRecord>,
    pub has_more: bool,
}

impl PostsPage {
    pub fn new(posts: Vec<PostRecord>, has_more: bool) -> Self {
        Self { posts, has_more }
    }

    pub fn empty() -> Self {
        Self::default()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PaginationError {
    #[error("page limit must be between 1 and {MAX_PAGE_LIMIT}, got {0}")]
    InvalidLimit(u32),
}
