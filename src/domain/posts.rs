//! Post entity as served by the upstream GraphQL API.

use std::fmt;

use serde::Serialize;

use crate::domain::error::DomainError;

/// Upstream post identifier. GraphQL `ID` values arrive as strings or integers
/// and are normalised to their string form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct PostId(String);

impl PostId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Accept an identifier from the API, rejecting blank values that could not
    /// address a post detail route.
    pub fn parse(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(DomainError::validation("post id must not be blank"));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A post as listed by the feed. Read-only from this application's perspective.
///
/// `created_at` is kept in the exact form the API returned it because it doubles
/// as the pagination cursor for the page that follows this post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostRecord {
    pub id: PostId,
    pub title: String,
    pub sub_text: String,
    pub created_at: String,
}

impl PostRecord {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        sub_text: impl Into<String>,
        created_at: impl Into<String>,
    ) -> Self {
        Self {
            id: PostId::new(id),
            title: title.into(),
            sub_text: sub_text.into(),
            created_at: created_at.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_api_field_names() {
        let post = PostRecord::new("7", "Title", "Sub", "1700000000000");
        let value = serde_json::to_value(&post).expect("serialize post");

        assert_eq!(value["id"], "7");
        assert_eq!(value["subText"], "Sub");
        assert_eq!(value["createdAt"], "1700000000000");
    }

    #[test]
    fn blank_ids_are_rejected() {
        assert!(PostId::parse("  ").is_err());
        assert_eq!(PostId::parse("12").map(|id| id.to_string()), Ok("12".to_string()));
    }
}
