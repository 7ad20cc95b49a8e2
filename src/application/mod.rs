//! Application services: feed pagination, sessions and page chrome.

pub mod chrome;
pub mod error;
pub mod feed;
pub mod loader;
pub mod pagination;
pub mod session;
pub mod source;
pub mod stream;
