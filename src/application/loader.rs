//! Cursor-driven accumulation of feed pages.
//!
//! [`FeedLoader`] owns the sequence of posts a reader has scrolled through and
//! decides which request comes next. It never performs I/O itself: a caller
//! asks for a [`FetchTicket`], runs the request the ticket describes, and hands
//! the outcome back through [`FeedLoader::complete`] or [`FeedLoader::fail`].
//! Tickets carry a generation, so overlapping and late results are rejected.

use thiserror::Error;
use tracing::warn;

use crate::application::pagination::{PageLimit, PageRequest, PostCursor, PostsPage};
use crate::domain::posts::PostRecord;

const TARGET: &str = "postlist::feed::loader";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderPhase {
    /// No page has been loaded yet.
    Unloaded,
    /// At least the first page is held and no fetch is running.
    Idle,
    Fetching,
    /// The reader went away; every later result is discarded.
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchKind {
    Initial,
    More,
}

impl FetchKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FetchKind::Initial => "initial",
            FetchKind::More => "more",
        }
    }
}

/// Permission to run exactly one page request against the source.
#[derive(Debug, Clone)]
pub struct FetchTicket {
    generation: u64,
    kind: FetchKind,
    request: PageRequest<PostCursor>,
}

impl FetchTicket {
    pub fn kind(&self) -> FetchKind {
        self.kind
    }

    pub fn request(&self) -> &PageRequest<PostCursor> {
        &self.request
    }
}

/// Posts appended by one successful fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Appended {
    /// Position of the first appended post within the accumulated sequence.
    pub offset: usize,
    pub posts: Vec<PostRecord>,
    pub has_more: bool,
    /// Length of the accumulated sequence after the append.
    pub total: usize,
}

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum LoaderError {
    #[error("the first page has already been loaded")]
    AlreadyLoaded,
    #[error("the first page has not been loaded yet")]
    NotLoaded,
    #[error("no posts are held, so no cursor can be derived")]
    EmptySequence,
    #[error("the feed reported no more pages")]
    Exhausted,
    #[error("another fetch is already in flight")]
    FetchInFlight,
    #[error("the feed session is closed")]
    Closed,
    #[error("fetch result no longer matches the loader state")]
    Stale,
}

#[derive(Debug)]
pub struct FeedLoader {
    limit: PageLimit,
    posts: Vec<PostRecord>,
    has_more: bool,
    phase: LoaderPhase,
    generation: u64,
}

impl FeedLoader {
    pub fn new(limit: PageLimit) -> Self {
        Self {
            limit,
            posts: Vec::new(),
            has_more: false,
            phase: LoaderPhase::Unloaded,
            generation: 0,
        }
    }

    pub fn posts(&self) -> &[PostRecord] {
        &self.posts
    }

    pub fn len(&self) -> usize {
        self.posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn phase(&self) -> LoaderPhase {
        self.phase
    }

    pub fn is_closed(&self) -> bool {
        self.phase == LoaderPhase::Closed
    }

    /// Cursor for the next page, derived from the last post currently held.
    pub fn next_cursor(&self) -> Option<PostCursor> {
        self.posts.last().map(PostCursor::after)
    }

    /// Start the first-page request. Runs with no cursor.
    pub fn begin_initial(&mut self) -> Result<FetchTicket, LoaderError> {
        match self.phase {
            LoaderPhase::Closed => Err(LoaderError::Closed),
            LoaderPhase::Fetching => Err(LoaderError::FetchInFlight),
            LoaderPhase::Idle => Err(LoaderError::AlreadyLoaded),
            LoaderPhase::Unloaded => Ok(self.start(FetchKind::Initial, None)),
        }
    }

    /// Start the request for the page after the last held post.
    pub fn begin_more(&mut self) -> Result<FetchTicket, LoaderError> {
        match self.phase {
            LoaderPhase::Closed => Err(LoaderError::Closed),
            LoaderPhase::Fetching => Err(LoaderError::FetchInFlight),
            LoaderPhase::Unloaded => Err(LoaderError::NotLoaded),
            LoaderPhase::Idle => {
                if !self.has_more {
                    return Err(LoaderError::Exhausted);
                }
                let cursor = self.next_cursor().ok_or(LoaderError::EmptySequence)?;
                Ok(self.start(FetchKind::More, Some(cursor)))
            }
        }
    }

    fn start(&mut self, kind: FetchKind, cursor: Option<PostCursor>) -> FetchTicket {
        self.generation += 1;
        self.phase = LoaderPhase::Fetching;
        FetchTicket {
            generation: self.generation,
            kind,
            request: PageRequest::new(self.limit, cursor),
        }
    }

    fn owns(&self, ticket: &FetchTicket) -> bool {
        self.phase == LoaderPhase::Fetching && ticket.generation == self.generation
    }

    /// Append the page fetched under `ticket`, preserving the order the source returned.
    pub fn complete(
        &mut self,
        ticket: &FetchTicket,
        page: PostsPage,
    ) -> Result<Appended, LoaderError> {
        if self.is_closed() {
            return Err(LoaderError::Closed);
        }
        if !self.owns(ticket) {
            return Err(LoaderError::Stale);
        }

        if let (Some(cursor), Some(first)) = (ticket.request.cursor.as_ref(), page.posts.first()) {
            if first.created_at == cursor.as_str() {
                warn!(
                    target = TARGET,
                    cursor = cursor.as_str(),
                    post_id = %first.id,
                    "cursor collision: page starts with a post sharing the cursor timestamp"
                );
            }
        }

        let offset = self.posts.len();
        self.posts.extend(page.posts.iter().cloned());
        self.has_more = page.has_more;
        self.phase = LoaderPhase::Idle;

        Ok(Appended {
            offset,
            posts: page.posts,
            has_more: self.has_more,
            total: self.posts.len(),
        })
    }

    /// Release `ticket` after its request failed. The held sequence is untouched,
    /// so the same request can be retried.
    pub fn fail(&mut self, ticket: &FetchTicket) {
        if !self.owns(ticket) {
            return;
        }
        self.phase = match ticket.kind {
            FetchKind::Initial => LoaderPhase::Unloaded,
            FetchKind::More => LoaderPhase::Idle,
        };
    }

    pub fn close(&mut self) {
        self.phase = LoaderPhase::Closed;
        self.generation += 1;
    }
}
