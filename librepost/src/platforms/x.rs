//! X (Twitter) API v2 platform implementation
//!
//! Reads use the app bearer token when one is configured and OAuth 1.0a
//! user-context signing otherwise; `users/me` and reposting are always
//! signed with the bot account's keys. Responses are decoded into private wire structs and turned into
//! [`PostRecord`]s here, so nothing past this module sees the API's shapes.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::AUTHORIZATION;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{PlatformError, Result};
use crate::platforms::oauth::OAuth1Credentials;
use crate::platforms::{FetchQuery, RepostPlatform};
use crate::types::{MediaKind, MediaRef, PostRecord};

/// The timeline endpoint rejects `max_results` outside this range
const MIN_PAGE_SIZE: usize = 5;
const MAX_PAGE_SIZE: usize = 100;

const USER_AGENT: &str = concat!("repostbot/", env!("CARGO_PKG_VERSION"));

// ----------------------------------------------------------------------------
// Wire types
// ----------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ApiProblem {
    title: Option<String>,
    detail: Option<String>,
}

impl ApiProblem {
    fn describe(problems: &[ApiProblem]) -> String {
        problems
            .iter()
            .map(|p| {
                p.detail
                    .clone()
                    .or_else(|| p.title.clone())
                    .unwrap_or_else(|| "unknown error".to_string())
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    data: Option<WireUser>,
    #[serde(default)]
    errors: Vec<ApiProblem>,
}

#[derive(Debug, Deserialize)]
struct WireUser {
    id: String,
    username: String,
}

#[derive(Debug, Deserialize)]
struct TimelineResponse {
    #[serde(default)]
    data: Vec<WireTweet>,
    includes: Option<Includes>,
}

#[derive(Debug, Deserialize)]
struct WireTweet {
    id: String,
    #[serde(default)]
    text: String,
    created_at: Option<String>,
    attachments: Option<Attachments>,
    #[serde(default)]
    referenced_tweets: Vec<ReferencedTweet>,
}

#[derive(Debug, Deserialize)]
struct Attachments {
    #[serde(default)]
    media_keys: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ReferencedTweet {
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Default, Deserialize)]
struct Includes {
    #[serde(default)]
    media: Vec<WireMedia>,
}

#[derive(Debug, Deserialize)]
struct WireMedia {
    media_key: String,
    #[serde(rename = "type")]
    kind: String,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RetweetResponse {
    data: Option<RetweetData>,
    #[serde(default)]
    errors: Vec<ApiProblem>,
}

#[derive(Debug, Deserialize)]
struct RetweetData {
    retweeted: bool,
}

// ----------------------------------------------------------------------------
// Error mapping
// ----------------------------------------------------------------------------

/// Map a non-success HTTP status to a `PlatformError`
///
/// # Arguments
///
/// * `status` - HTTP status code
/// * `body` - response body, included in the message
/// * `reset_at` - value of `x-rate-limit-reset` if present
/// * `context` - the operation that failed (e.g. "fetch @nasa")
fn map_status(status: StatusCode, body: &str, reset_at: Option<i64>, context: &str) -> PlatformError {
    let body = body.trim();
    let detail = if body.is_empty() {
        status.to_string()
    } else {
        format!("{}: {}", status, body)
    };

    match status.as_u16() {
        401 | 403 => PlatformError::Authentication(format!(
            "X rejected the credentials during {} ({}). Check X_CONSUMER_KEY, X_CONSUMER_SECRET, X_ACCESS_TOKEN and X_ACCESS_SECRET, and that the app has read and write permissions.",
            context, detail
        )),
        404 => PlatformError::NotFound(format!("{} ({})", context, detail)),
        429 => PlatformError::RateLimit {
            message: format!("X rate limit hit during {} ({})", context, detail),
            reset_at,
        },
        500..=599 => PlatformError::Network(format!(
            "X API unavailable during {} ({})",
            context, detail
        )),
        _ => PlatformError::Api(format!("X API error during {} ({})", context, detail)),
    }
}

fn map_transport_error(error: reqwest::Error, context: &str) -> PlatformError {
    if error.is_decode() {
        return PlatformError::InvalidResponse(format!(
            "Could not decode X API response during {}: {}",
            context, error
        ));
    }
    PlatformError::Network(format!("Request to X API failed during {}: {}", context, error))
}

fn rate_limit_reset(response: &Response) -> Option<i64> {
    response
        .headers()
        .get("x-rate-limit-reset")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.trim().parse::<i64>().ok())
        .filter(|reset_at| *reset_at > 0)
}

// ----------------------------------------------------------------------------
// Conversion into domain records
// ----------------------------------------------------------------------------

fn parse_created_at(raw: Option<&str>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn into_records(handle: &str, response: TimelineResponse) -> Vec<PostRecord> {
    let media: HashMap<String, WireMedia> = response
        .includes
        .unwrap_or_default()
        .media
        .into_iter()
        .map(|m| (m.media_key.clone(), m))
        .collect();

    response
        .data
        .into_iter()
        .filter_map(|tweet| {
            if tweet.id.trim().is_empty() {
                warn!("Dropping post from @{} without an id", handle);
                return None;
            }

            let media_refs = tweet
                .attachments
                .map(|a| a.media_keys)
                .unwrap_or_default()
                .into_iter()
                .map(|key| match media.get(&key) {
                    Some(m) => MediaRef {
                        key,
                        kind: MediaKind::from_api_str(&m.kind),
                        url: m.url.clone(),
                    },
                    None => MediaRef {
                        key,
                        kind: MediaKind::Other,
                        url: None,
                    },
                })
                .collect();

            Some(PostRecord {
                is_repost: tweet.referenced_tweets.iter().any(|r| r.kind == "retweeted"),
                created_at: parse_created_at(tweet.created_at.as_deref()),
                id: tweet.id,
                source: handle.to_string(),
                text: tweet.text,
                media: media_refs,
            })
        })
        .collect()
}

// ----------------------------------------------------------------------------
// Client
// ----------------------------------------------------------------------------

pub struct XClient {
    http: reqwest::Client,
    base_url: String,
    oauth: OAuth1Credentials,
    /// App-only bearer token for read endpoints
    app_token: Option<SecretString>,
    /// Id of the bot account, known after `authenticate`
    user_id: Option<String>,
    /// handle -> user id, filled lazily
    user_ids: Mutex<HashMap<String, String>>,
}

impl XClient {
    /// Create a new client
    ///
    /// # Arguments
    ///
    /// * `base_url` - API root, e.g. "https://api.twitter.com"
    /// * `oauth` - consumer keys and access token pair of the bot account
    /// * `app_token` - optional app-only bearer token for read endpoints
    /// * `timeout` - per-request timeout
    pub fn new(
        base_url: &str,
        oauth: OAuth1Credentials,
        app_token: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| PlatformError::Network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            oauth,
            app_token,
            user_id: None,
            user_ids: Mutex::new(HashMap::new()),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let credentials = &config.credentials;
        let copy = |s: &SecretString| SecretString::from(s.expose_secret().to_string());
        let oauth = OAuth1Credentials {
            consumer_key: copy(&credentials.consumer_key),
            consumer_secret: copy(&credentials.consumer_secret),
            access_token: copy(&credentials.access_token),
            access_secret: copy(&credentials.access_secret),
        };
        Self::new(
            &config.api_base_url,
            oauth,
            credentials.bearer_token.as_ref().map(copy),
            config.request_timeout,
        )
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// A request signed with the bot account's OAuth 1.0a keys
    fn signed(&self, method: Method, url: &str, query: &[(&str, String)]) -> Result<RequestBuilder> {
        let authorization = self.oauth.authorization(&method, url, query)?;
        let request = self.http.request(method, url).header(AUTHORIZATION, authorization);
        Ok(if query.is_empty() { request } else { request.query(query) })
    }

    /// GET for read endpoints: app bearer token if configured, signed otherwise
    fn read(&self, url: &str, query: &[(&str, String)]) -> Result<RequestBuilder> {
        match &self.app_token {
            Some(token) => {
                let request = self.http.get(url).bearer_auth(token.expose_secret());
                Ok(if query.is_empty() { request } else { request.query(query) })
            }
            None => self.signed(Method::GET, url, query),
        }
    }

    /// Send a request and decode a JSON body, mapping failures
    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder, context: &str) -> Result<T> {
        let response = request
            .send()
            .await
            .map_err(|e| map_transport_error(e, context))?;

        let status = response.status();
        if let Some(remaining) = response
            .headers()
            .get("x-rate-limit-remaining")
            .and_then(|h| h.to_str().ok())
        {
            debug!("{}: {} request(s) left in rate limit window", context, remaining);
        }

        if !status.is_success() {
            let reset_at = rate_limit_reset(&response);
            let body = response.text().await.unwrap_or_default();
            return Err(map_status(status, &body, reset_at, context).into());
        }

        response
            .json::<T>()
            .await
            .map_err(|e| map_transport_error(e, context).into())
    }

    async fn resolve_user_id(&self, handle: &str) -> Result<String> {
        if let Some(id) = self.user_ids.lock().ok().and_then(|m| m.get(handle).cloned()) {
            return Ok(id);
        }

        let context = format!("lookup @{}", handle);
        let request = self.read(&self.url(&format!("/2/users/by/username/{}", handle)), &[])?;
        let response: UserResponse = self.send_json(request, &context).await?;

        let user = response.data.ok_or_else(|| {
            let reason = if response.errors.is_empty() {
                "no user data returned".to_string()
            } else {
                ApiProblem::describe(&response.errors)
            };
            PlatformError::NotFound(format!("user @{}: {}", handle, reason))
        })?;

        debug!("Resolved @{} to user id {}", user.username, user.id);
        if let Ok(mut cache) = self.user_ids.lock() {
            cache.insert(handle.to_string(), user.id.clone());
        }
        Ok(user.id)
    }
}

#[async_trait]
impl RepostPlatform for XClient {
    async fn authenticate(&mut self) -> Result<()> {
        let request = self.signed(Method::GET, &self.url("/2/users/me"), &[])?;
        let response: UserResponse = self.send_json(request, "authentication").await?;

        let me = response.data.ok_or_else(|| {
            PlatformError::Authentication(format!(
                "X did not return the authenticated user: {}",
                ApiProblem::describe(&response.errors)
            ))
        })?;

        debug!("Authenticated as @{} ({})", me.username, me.id);
        self.user_id = Some(me.id);
        Ok(())
    }

    async fn recent_posts(&self, handle: &str, query: &FetchQuery) -> Result<Vec<PostRecord>> {
        let user_id = self.resolve_user_id(handle).await?;
        let page_size = query.max_results.clamp(MIN_PAGE_SIZE, MAX_PAGE_SIZE);

        let mut params: Vec<(&str, String)> = vec![
            ("max_results", page_size.to_string()),
            ("tweet.fields", "created_at,attachments,referenced_tweets".to_string()),
            ("expansions", "attachments.media_keys".to_string()),
            ("media.fields", "url,type".to_string()),
        ];
        if let Some(since_id) = &query.since_id {
            params.push(("since_id", since_id.clone()));
        }

        let context = format!("fetch @{}", handle);
        let request = self.read(&self.url(&format!("/2/users/{}/tweets", user_id)), &params)?;
        let response: TimelineResponse = self.send_json(request, &context).await?;

        let mut posts = into_records(handle, response);
        posts.truncate(query.max_results);
        Ok(posts)
    }

    async fn repost(&self, post: &PostRecord) -> Result<()> {
        let user_id = self
            .user_id
            .as_deref()
            .ok_or_else(|| PlatformError::Authentication("Not authenticated".to_string()))?;

        let context = format!("repost {}", post.id);
        let request = self
            .signed(Method::POST, &self.url(&format!("/2/users/{}/retweets", user_id)), &[])?
            .json(&serde_json::json!({ "tweet_id": post.id }));
        let response: RetweetResponse = self.send_json(request, &context).await?;

        match response.data {
            Some(RetweetData { retweeted: true }) => Ok(()),
            Some(RetweetData { retweeted: false }) => Err(PlatformError::Api(format!(
                "X did not repost {}",
                post.id
            ))
            .into()),
            None => Err(PlatformError::InvalidResponse(format!(
                "repost {}: {}",
                post.id,
                ApiProblem::describe(&response.errors)
            ))
            .into()),
        }
    }

    fn name(&self) -> &str {
        "x"
    }

    fn is_configured(&self) -> bool {
        self.oauth.is_complete()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_status_authentication() {
        for code in [401, 403] {
            let status = StatusCode::from_u16(code).unwrap();
            match map_status(status, "Unauthorized", None, "fetch @nasa") {
                PlatformError::Authentication(msg) => {
                    assert!(msg.contains("fetch @nasa"));
                    assert!(msg.contains("X_ACCESS_TOKEN"));
                }
                other => panic!("Expected Authentication error, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_map_status_rate_limit_keeps_reset() {
        match map_status(StatusCode::TOO_MANY_REQUESTS, "", Some(1_700_000_000), "repost 1") {
            PlatformError::RateLimit { message, reset_at } => {
                assert!(message.contains("repost 1"));
                assert_eq!(reset_at, Some(1_700_000_000));
            }
            other => panic!("Expected RateLimit error, got {:?}", other),
        }
    }

    #[test]
    fn test_map_status_server_errors_are_transient() {
        let error = map_status(StatusCode::SERVICE_UNAVAILABLE, "over capacity", None, "fetch @a");
        assert!(matches!(error, PlatformError::Network(_)));
        assert!(error.is_transient());
    }

    #[test]
    fn test_map_status_other() {
        assert!(matches!(
            map_status(StatusCode::NOT_FOUND, "", None, "lookup @a"),
            PlatformError::NotFound(_)
        ));

        match map_status(StatusCode::BAD_REQUEST, "{\"title\":\"Invalid Request\"}", None, "fetch @a") {
            PlatformError::Api(msg) => assert!(msg.contains("Invalid Request")),
            other => panic!("Expected Api error, got {:?}", other),
        }
    }

    #[test]
    fn test_into_records_joins_media_and_flags_reposts() {
        let response: TimelineResponse = serde_json::from_str(
            r#"{
                "data": [
                    {
                        "id": "1790000000000000003",
                        "text": "Saturn tonight",
                        "created_at": "2024-05-13T21:04:05.000Z",
                        "attachments": {"media_keys": ["3_1", "3_2"]}
                    },
                    {
                        "id": "1790000000000000002",
                        "text": "RT @esa: launch",
                        "referenced_tweets": [{"type": "retweeted", "id": "1"}]
                    },
                    {
                        "id": "1790000000000000001",
                        "text": "quoting",
                        "referenced_tweets": [{"type": "quoted", "id": "2"}]
                    },
                    {"id": "", "text": "broken"}
                ],
                "includes": {
                    "media": [
                        {"media_key": "3_1", "type": "photo", "url": "https://pbs.twimg.com/media/a.jpg"},
                        {"media_key": "3_2", "type": "video"}
                    ]
                },
                "meta": {"result_count": 4}
            }"#,
        )
        .unwrap();

        let posts = into_records("nasa", response);
        assert_eq!(posts.len(), 3);

        let first = &posts[0];
        assert_eq!(first.id, "1790000000000000003");
        assert_eq!(first.source, "nasa");
        assert_eq!(first.text, "Saturn tonight");
        assert_eq!(
            first.created_at.map(|d| d.to_rfc3339()),
            Some("2024-05-13T21:04:05+00:00".to_string())
        );
        assert_eq!(first.media.len(), 2);
        assert_eq!(first.media[0].kind, MediaKind::Photo);
        assert_eq!(first.media[1].kind, MediaKind::Video);
        assert!(first.has_photo());
        assert!(!first.is_repost);

        assert!(posts[1].is_repost);
        assert!(!posts[2].is_repost);
        assert_eq!(posts[1].created_at, None);
    }

    #[test]
    fn test_into_records_empty_timeline() {
        let response: TimelineResponse =
            serde_json::from_str(r#"{"meta": {"result_count": 0}}"#).unwrap();
        assert!(into_records("nasa", response).is_empty());
    }

    #[test]
    fn test_api_problem_describe() {
        let problems = vec![
            ApiProblem {
                title: Some("Not Found Error".to_string()),
                detail: Some("Could not find user with username: [ghost].".to_string()),
            },
            ApiProblem {
                title: Some("Other".to_string()),
                detail: None,
            },
        ];
        assert_eq!(
            ApiProblem::describe(&problems),
            "Could not find user with username: [ghost].; Other"
        );
    }

    #[tokio::test]
    async fn test_repost_requires_authentication() {
        let client = XClient::new(
            "http://127.0.0.1:9",
            OAuth1Credentials::new("ck", "cs", "at", "as"),
            None,
            Duration::from_secs(1),
        )
        .unwrap();

        assert!(client.is_configured());
        assert_eq!(client.name(), "x");

        let err = client.repost(&PostRecord::new("1", "nasa")).await.unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_blank_key_is_not_configured() {
        let client = XClient::new(
            "http://127.0.0.1:9",
            OAuth1Credentials::new("ck", "", "at", "as"),
            None,
            Duration::from_secs(1),
        )
        .unwrap();
        assert!(!client.is_configured());
    }
}
