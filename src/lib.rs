//! Server-rendered post list with cursor-paginated infinite scrolling over a
//! GraphQL API.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
pub mod presentation;
pub(crate) mod util;
