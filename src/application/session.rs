//! Per-page-view feed sessions and the registry that bounds them.
//!
//! A session lives from the server-side render of the home page until the
//! reader leaves the page or the registry drops it. Tearing a session down
//! cancels its in-flight fetch and discards anything that still arrives for it.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lru::LruCache;
use metrics::{counter, gauge, histogram};
use thiserror::Error;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::application::loader::{Appended, FeedLoader, FetchTicket, LoaderError};
use crate::application::pagination::PageLimit;
use crate::application::source::{PostsSource, SourceError};
use crate::domain::posts::PostRecord;
use crate::util::lock::mutex_lock;

const SOURCE: &str = "application::session";
const TARGET: &str = "postlist::feed::session";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Loader(#[from] LoaderError),
    #[error(transparent)]
    Source(#[from] SourceError),
}

/// Accumulated feed state for one page view.
pub struct FeedSession {
    id: Uuid,
    loader: Mutex<FeedLoader>,
    cancel: CancellationToken,
    touched: Mutex<Instant>,
}

impl FeedSession {
    pub fn new(limit: PageLimit) -> Self {
        Self::with_id(Uuid::new_v4(), limit)
    }

    pub fn with_id(id: Uuid, limit: PageLimit) -> Self {
        Self {
            id,
            loader: Mutex::new(FeedLoader::new(limit)),
            cancel: CancellationToken::new(),
            touched: Mutex::new(Instant::now()),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.loader, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn has_more(&self) -> bool {
        mutex_lock(&self.loader, SOURCE, "has_more").has_more()
    }

    /// Copy of the posts accumulated so far.
    pub fn posts(&self) -> Vec<PostRecord> {
        mutex_lock(&self.loader, SOURCE, "posts").posts().to_vec()
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn touch(&self) {
        *mutex_lock(&self.touched, SOURCE, "touch") = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        mutex_lock(&self.touched, SOURCE, "idle_for").elapsed()
    }

    /// Fetch and hold the first page.
    pub async fn load_initial(&self, source: &dyn PostsSource) -> Result<Appended, SessionError> {
        let ticket = mutex_lock(&self.loader, SOURCE, "begin_initial").begin_initial()?;
        self.run(ticket, source).await
    }

    /// Fetch the page after the last held post and append it.
    pub async fn load_more(&self, source: &dyn PostsSource) -> Result<Appended, SessionError> {
        self.touch();
        let ticket = mutex_lock(&self.loader, SOURCE, "begin_more").begin_more()?;
        self.run(ticket, source).await
    }

    async fn run(
        &self,
        ticket: FetchTicket,
        source: &dyn PostsSource,
    ) -> Result<Appended, SessionError> {
        let kind = ticket.kind().as_str();
        let ticket = TicketGuard::new(&self.loader, ticket);
        counter!("postlist_feed_fetch_total", "kind" => kind).increment(1);
        let started = Instant::now();

        let outcome = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            result = source.fetch_posts(ticket.ticket.request().clone()) => Some(result),
        };

        histogram!("postlist_feed_fetch_ms", "kind" => kind)
            .record(started.elapsed().as_secs_f64() * 1000.0);

        let Some(result) = outcome else {
            counter!("postlist_feed_discarded_total", "reason" => "cancelled").increment(1);
            debug!(
                target = TARGET,
                session = %self.id,
                kind,
                "fetch abandoned because the session closed"
            );
            return Err(LoaderError::Closed.into());
        };

        let ticket = ticket.disarm();
        let mut loader = mutex_lock(&self.loader, SOURCE, "finish_fetch");
        match result {
            Ok(page) => loader.complete(&ticket, page).map_err(|err| {
                counter!("postlist_feed_discarded_total", "reason" => "stale").increment(1);
                debug!(
                    target = TARGET,
                    session = %self.id,
                    kind,
                    error = %err,
                    "discarded late fetch result"
                );
                SessionError::from(err)
            }),
            Err(err) => {
                loader.fail(&ticket);
                counter!("postlist_feed_fetch_failed_total", "kind" => kind).increment(1);
                warn!(
                    target = TARGET,
                    session = %self.id,
                    kind,
                    error = %err,
                    "feed fetch failed"
                );
                Err(err.into())
            }
        }
    }

    /// Tear the session down. In-flight and future fetches are abandoned.
    pub fn close(&self) {
        mutex_lock(&self.loader, SOURCE, "close").close();
        self.cancel.cancel();
    }
}

/// Releases a fetch ticket whose request future was dropped before it finished,
/// so the loader does not stay in the fetching phase.
struct TicketGuard<'a> {
    loader: &'a Mutex<FeedLoader>,
    ticket: FetchTicket,
    armed: bool,
}

impl<'a> TicketGuard<'a> {
    fn new(loader: &'a Mutex<FeedLoader>, ticket: FetchTicket) -> Self {
        Self {
            loader,
            ticket,
            armed: true,
        }
    }

    fn disarm(mut self) -> FetchTicket {
        self.armed = false;
        self.ticket.clone()
    }
}

impl Drop for TicketGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        mutex_lock(self.loader, SOURCE, "release_ticket").fail(&self.ticket);
        debug!(
            target = TARGET,
            kind = self.ticket.kind().as_str(),
            "released fetch ticket of a dropped request"
        );
    }
}

/// Bounded registry of live feed sessions.
pub struct FeedSessions {
    sessions: Mutex<LruCache<Uuid, Arc<FeedSession>>>,
    idle_timeout: Duration,
}

impl FeedSessions {
    pub fn new(capacity: NonZeroUsize, idle_timeout: Duration) -> Self {
        Self {
            sessions: Mutex::new(LruCache::new(capacity)),
            idle_timeout,
        }
    }

    pub fn insert(&self, session: Arc<FeedSession>) {
        let id = session.id();
        let mut sessions = mutex_lock(&self.sessions, SOURCE, "insert");
        if let Some((evicted_id, evicted)) = sessions.push(id, session) {
            if evicted_id != id {
                debug!(
                    target = TARGET,
                    session = %evicted_id,
                    "evicted least recently used session"
                );
            }
            evicted.close();
        }
        gauge!("postlist_feed_sessions_active").set(sessions.len() as f64);
    }

    /// Look up a live session, expiring it first if it has been idle too long.
    pub fn get(&self, id: Uuid) -> Option<Arc<FeedSession>> {
        let mut sessions = mutex_lock(&self.sessions, SOURCE, "get");
        let expired = sessions
            .peek(&id)
            .map(|session| session.idle_for() > self.idle_timeout)?;

        if expired {
            if let Some(session) = sessions.pop(&id) {
                session.close();
            }
            gauge!("postlist_feed_sessions_active").set(sessions.len() as f64);
            return None;
        }

        sessions.get(&id).cloned()
    }

    pub fn remove(&self, id: Uuid) -> Option<Arc<FeedSession>> {
        let mut sessions = mutex_lock(&self.sessions, SOURCE, "remove");
        let removed = sessions.pop(&id);
        if let Some(session) = removed.as_ref() {
            session.close();
        }
        gauge!("postlist_feed_sessions_active").set(sessions.len() as f64);
        removed
    }

    /// Close and drop every session idle for longer than the timeout.
    pub fn sweep(&self) -> usize {
        let mut sessions = mutex_lock(&self.sessions, SOURCE, "sweep");
        let expired: Vec<Uuid> = sessions
            .iter()
            .filter(|(_, session)| session.idle_for() > self.idle_timeout)
            .map(|(id, _)| *id)
            .collect();

        for id in &expired {
            if let Some(session) = sessions.pop(id) {
                session.close();
            }
        }
        gauge!("postlist_feed_sessions_active").set(sessions.len() as f64);
        expired.len()
    }

    /// Sweep on a fixed cadence until `shutdown` fires.
    pub async fn sweep_every(&self, every: Duration, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    let expired = self.sweep();
                    if expired > 0 {
                        debug!(
                            target = TARGET,
                            expired,
                            remaining = self.len(),
                            "expired idle feed sessions"
                        );
                    }
                }
            }
        }
    }

    pub fn close_all(&self) {
        let mut sessions = mutex_lock(&self.sessions, SOURCE, "close_all");
        while let Some((_, session)) = sessions.pop_lru() {
            session.close();
        }
        gauge!("postlist_feed_sessions_active").set(0.0);
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.sessions, SOURCE, "len").len()
    }

    /// Ids of the live sessions, most recently used first.
    pub fn ids(&self) -> Vec<Uuid> {
        mutex_lock(&self.sessions, SOURCE, "ids")
            .iter()
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
