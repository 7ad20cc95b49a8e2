#![allow(dead_code)]

use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{Router, body::Body, http::Response};
use http_body_util::BodyExt;
use postlist::{
    application::{
        chrome::ChromeService,
        feed::{CardSettings, FeedService},
        pagination::{PageLimit, PageRequest, PostCursor, PostsPage},
        session::FeedSessions,
        source::{PostsSource, SourceError},
    },
    config::SiteSettings,
    domain::posts::PostRecord,
    infra::http::{HttpState, build_router},
};

/// Posts numbered `1..=count`, newest first, with strictly decreasing timestamps.
pub fn catalogue(count: usize) -> Vec<PostRecord> {
    (1..=count)
        .map(|n| {
            PostRecord::new(
                n.to_string(),
                format!("Post {n}"),
                format!("Summary of post {n}"),
                (1_700_000_000_000u64 - n as u64).to_string(),
            )
        })
        .collect()
}

/// In-memory API that pages through a fixed catalogue the way the real
/// `posts` query does, and can be told to fail upcoming requests.
pub struct CatalogueSource {
    posts: Vec<PostRecord>,
    failures: Mutex<VecDeque<SourceError>>,
    requests: Mutex<Vec<PageRequest<PostCursor>>>,
}

impl CatalogueSource {
    pub fn new(posts: Vec<PostRecord>) -> Self {
        Self {
            posts,
            failures: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn fail_next(&self, error: SourceError) {
        self.failures.lock().unwrap().push_back(error);
    }

    pub fn requests(&self) -> Vec<PageRequest<PostCursor>> {
        self.requests.lock().unwrap().clone()
    }

    pub fn cursors(&self) -> Vec<Option<String>> {
        self.requests()
            .into_iter()
            .map(|request| request.cursor.map(|cursor| cursor.as_str().to_string()))
            .collect()
    }
}

#[async_trait]
impl PostsSource for CatalogueSource {
    async fn fetch_posts(
        &self,
        request: PageRequest<PostCursor>,
    ) -> Result<PostsPage, SourceError> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(error) = self.failures.lock().unwrap().pop_front() {
            return Err(error);
        }

        let start = match request.cursor.as_ref() {
            None => 0,
            Some(cursor) => self
                .posts
                .iter()
                .position(|post| post.created_at.as_str() < cursor.as_str())
                .unwrap_or(self.posts.len()),
        };
        let end = (start + request.limit.get() as usize).min(self.posts.len());

        Ok(PostsPage::new(
            self.posts[start..end].to_vec(),
            end < self.posts.len(),
        ))
    }
}

pub fn feed_service(source: Arc<CatalogueSource>) -> FeedService {
    let sessions = FeedSessions::new(
        NonZeroUsize::new(64).unwrap(),
        Duration::from_secs(900),
    );
    FeedService::new(
        source,
        Arc::new(sessions),
        PageLimit::default(),
        CardSettings::default(),
    )
}

pub fn router(feed: Arc<FeedService>) -> Router {
    build_router(HttpState {
        feed,
        chrome: Arc::new(ChromeService::new(&SiteSettings::default())),
    })
}

pub async fn body_to_string(response: Response<Body>) -> String {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("collect body")
        .to_bytes();
    String::from_utf8(bytes.to_vec()).expect("utf8 body")
}

/// Pull the session id out of a rendered home page.
pub fn session_id(html: &str) -> Option<String> {
    let start = html.find("/ui/feed/")? + "/ui/feed/".len();
    let rest = &html[start..];
    let end = rest.find('/')?;
    Some(rest[..end].to_string())
}
