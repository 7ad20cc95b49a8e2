//! GraphQL client for the paginated `posts` query.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::application::pagination::{PageRequest, PostCursor, PostsPage};
use crate::application::source::{PostsSource, SourceError};
use crate::config::ApiSettings;
use crate::domain::posts::{PostId, PostRecord};
use crate::infra::error::InfraError;

const TARGET: &str = "postlist::graphql";

/// Longest upstream error body kept in a [`SourceError::Status`].
const MAX_ERROR_BODY: usize = 512;

pub const POSTS_QUERY: &str = "query Posts($limit: Int!, $cursor: String) { posts(limit: $limit, cursor: $cursor) { hasMore posts { id title subText createdAt } } }";

#[derive(Clone)]
pub struct GraphqlPostsSource {
    client: Client,
    endpoint: Url,
}

impl GraphqlPostsSource {
    pub fn new(endpoint: Url, timeout: Duration) -> Result<Self, InfraError> {
        let client = Client::builder()
            .user_agent(user_agent())
            .timeout(timeout)
            .build()
            .map_err(|err| InfraError::http_client(err.to_string()))?;
        Ok(Self { client, endpoint })
    }

    pub fn from_settings(settings: &ApiSettings) -> Result<Self, InfraError> {
        Self::new(settings.endpoint.clone(), settings.timeout)
    }
}

fn user_agent() -> &'static str {
    concat!("postlist/", env!("CARGO_PKG_VERSION"))
}

#[async_trait]
impl PostsSource for GraphqlPostsSource {
    async fn fetch_posts(
        &self,
        request: PageRequest<PostCursor>,
    ) -> Result<PostsPage, SourceError> {
        let cursor = request.cursor.as_ref().map(PostCursor::as_str);
        debug!(
            target = TARGET,
            limit = request.limit.get(),
            cursor = cursor.unwrap_or(""),
            "requesting posts page"
        );

        let body = GraphqlRequest {
            query: POSTS_QUERY,
            variables: PostsVariables {
                limit: request.limit.get(),
                cursor,
            },
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&body)
            .send()
            .await
            .map_err(SourceError::transport)?;

        let status = response.status();
        let bytes = response.bytes().await.map_err(SourceError::transport)?;
        if !status.is_success() {
            let mut text = String::from_utf8_lossy(&bytes).into_owned();
            if text.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !text.is_char_boundary(cut) {
                    cut -= 1;
                }
                text.truncate(cut);
            }
            return Err(SourceError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        let envelope: GraphqlResponse =
            serde_json::from_slice(&bytes).map_err(SourceError::decode)?;
        decode_page(envelope)
    }
}

#[derive(Serialize)]
struct GraphqlRequest<'a> {
    query: &'static str,
    variables: PostsVariables<'a>,
}

#[derive(Serialize)]
struct PostsVariables<'a> {
    limit: u32,
    cursor: Option<&'a str>,
}

#[derive(Deserialize)]
struct GraphqlResponse {
    data: Option<PostsData>,
    errors: Option<Vec<GraphqlErrorMessage>>,
}

#[derive(Deserialize)]
struct GraphqlErrorMessage {
    message: String,
}

#[derive(Deserialize)]
struct PostsData {
    posts: Option<WirePostsPage>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePostsPage {
    has_more: bool,
    posts: Vec<WirePost>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePost {
    id: Scalar,
    title: String,
    sub_text: Option<String>,
    created_at: Scalar,
}

/// GraphQL `ID` and custom date scalars may be serialized as strings or numbers.
#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Text(String),
    Number(serde_json::Number),
}

impl Scalar {
    fn into_string(self) -> String {
        match self {
            Scalar::Text(value) => value,
            Scalar::Number(value) => value.to_string(),
        }
    }
}

fn decode_page(envelope: GraphqlResponse) -> Result<PostsPage, SourceError> {
    if let Some(errors) = envelope.errors.filter(|errors| !errors.is_empty()) {
        return Err(SourceError::GraphQl(
            errors.into_iter().map(|error| error.message).collect(),
        ));
    }

    let page = envelope
        .data
        .and_then(|data| data.posts)
        .ok_or_else(|| SourceError::decode("response carried no `posts` data"))?;

    let posts = page
        .posts
        .into_iter()
        .map(|post| {
            Ok(PostRecord {
                id: PostId::parse(post.id.into_string()).map_err(SourceError::decode)?,
                title: post.title,
                sub_text: post.sub_text.unwrap_or_default(),
                created_at: post.created_at.into_string(),
            })
        })
        .collect::<Result<Vec<_>, SourceError>>()?;

    Ok(PostsPage::new(posts, page.has_more))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn decode(value: serde_json::Value) -> Result<PostsPage, SourceError> {
        let envelope: GraphqlResponse = serde_json::from_value(value).expect("envelope");
        decode_page(envelope)
    }

    #[test]
    fn decodes_posts_in_order() {
        let page = decode(json!({
            "data": { "posts": { "hasMore": true, "posts": [
                { "id": "1", "title": "A", "subText": "a", "createdAt": "1700000000002" },
                { "id": 2, "title": "B", "subText": null, "createdAt": 1700000000001u64 }
            ]}}
        }))
        .expect("page");

        assert!(page.has_more);
        assert_eq!(page.posts.len(), 2);
        assert_eq!(page.posts[0].id.as_str(), "1");
        assert_eq!(page.posts[1].id.as_str(), "2");
        assert_eq!(page.posts[1].sub_text, "");
        assert_eq!(page.posts[1].created_at, "1700000000001");
    }

    #[test]
    fn errors_win_over_partial_data() {
        let err = decode(json!({
            "data": { "posts": { "hasMore": false, "posts": [] } },
            "errors": [{ "message": "cursor is invalid" }]
        }))
        .unwrap_err();

        match err {
            SourceError::GraphQl(messages) => assert_eq!(messages, vec!["cursor is invalid"]),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn missing_data_is_a_decode_failure() {
        let err = decode(json!({ "data": null })).unwrap_err();
        assert!(matches!(err, SourceError::Decode(_)));
    }

    #[test]
    fn blank_ids_are_rejected() {
        let err = decode(json!({
            "data": { "posts": { "hasMore": false, "posts": [
                { "id": "", "title": "A", "subText": "a", "createdAt": "1" }
            ]}}
        }))
        .unwrap_err();
        assert!(matches!(err, SourceError::Decode(_)));
    }

    #[test]
    fn request_body_matches_query_contract() {
        let body = GraphqlRequest {
            query: POSTS_QUERY,
            variables: PostsVariables {
                limit: 8,
                cursor: None,
            },
        };
        let value = serde_json::to_value(&body).expect("encode");

        assert_eq!(value["variables"], json!({ "limit": 8, "cursor": null }));
        assert!(value["query"].as_str().is_some_and(|q| q.contains("hasMore")));
    }
}
