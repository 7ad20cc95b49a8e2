//! Datastar SSE responses for feed updates.

use std::convert::Infallible;

use async_stream::stream;
use axum::response::{
    IntoResponse, Response,
    sse::{Event, Sse},
};
use datastar::prelude::{ElementPatchMode, ExecuteScript, PatchElements, PatchSignals};
use serde::Serialize;

/// Ordered batch of datastar events sent back in a single SSE response.
#[derive(Default)]
pub struct PatchStream {
    events: Vec<Event>,
}

impl PatchStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `html` as the last children of `selector`.
    pub fn append(&mut self, selector: &str, html: String) -> &mut Self {
        self.patch(selector, html, ElementPatchMode::Append)
    }

    /// Replace the children of `selector` with `html`.
    pub fn replace_inner(&mut self, selector: &str, html: String) -> &mut Self {
        self.patch(selector, html, ElementPatchMode::Inner)
    }

    fn patch(&mut self, selector: &str, html: String, mode: ElementPatchMode) -> &mut Self {
        self.events.push(
            PatchElements::new(html)
                .selector(selector)
                .mode(mode)
                .write_as_axum_sse_event(),
        );
        self
    }

    pub fn script(&mut self, script: String) -> &mut Self {
        self.events
            .push(ExecuteScript::new(script).write_as_axum_sse_event());
        self
    }

    /// Merge `signals` into the page's datastar signal store.
    pub fn signals<S: Serialize>(&mut self, signals: &S) -> &mut Self {
        match serde_json::to_string(signals) {
            Ok(payload) => self
                .events
                .push(PatchSignals::new(payload).write_as_axum_sse_event()),
            Err(err) => tracing::error!(
                target = "postlist::http::stream",
                error = %err,
                "failed to encode datastar signals"
            ),
        }
        self
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn into_response(self) -> Response {
        let events = self.events;
        let stream = stream! {
            for event in events {
                yield Ok::<Event, Infallible>(event);
            }
        };
        Sse::new(stream).into_response()
    }
}
