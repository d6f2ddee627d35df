//! Mock platform implementation for testing
//!
//! A configurable in-memory platform: per-account feeds, reposts that fail
//! permanently or a given number of times before succeeding, accounts that
//! cannot be fetched, and a record of every call. Available in all builds so
//! integration tests and the binaries' tests can use it.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::cursor::compare_ids;
use crate::error::{PlatformError, Result};
use crate::platforms::{FetchQuery, RepostPlatform};
use crate::types::PostRecord;

/// Everything the mock has been asked to do
#[derive(Debug, Default)]
pub struct MockCalls {
    pub auth_calls: usize,
    pub fetches: Vec<(String, FetchQuery)>,
    /// Every repost attempt, including failed ones, in order
    pub repost_attempts: Vec<String>,
    /// Reposts that succeeded, in order
    pub reposted: Vec<String>,
}

pub struct MockPlatform {
    name: String,
    feeds: HashMap<String, Vec<PostRecord>>,
    fetch_errors: HashMap<String, PlatformError>,
    repost_errors: HashMap<String, PlatformError>,
    /// Remaining transient failures per post id
    flaky_reposts: Mutex<HashMap<String, u32>>,
    auth_error: Option<String>,
    configured: bool,
    authenticated: bool,
    calls: Arc<Mutex<MockCalls>>,
}

impl Default for MockPlatform {
    fn default() -> Self {
        Self::new("mock")
    }
}

impl MockPlatform {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            feeds: HashMap::new(),
            fetch_errors: HashMap::new(),
            repost_errors: HashMap::new(),
            flaky_reposts: Mutex::new(HashMap::new()),
            auth_error: None,
            configured: true,
            authenticated: false,
            calls: Arc::new(Mutex::new(MockCalls::default())),
        }
    }

    /// Posts returned for `handle`, most recent first
    pub fn with_feed(mut self, handle: &str, posts: Vec<PostRecord>) -> Self {
        self.feeds.insert(handle.to_string(), posts);
        self
    }

    /// Fetching `handle` always fails with `error`
    pub fn with_fetch_error(mut self, handle: &str, error: PlatformError) -> Self {
        self.fetch_errors.insert(handle.to_string(), error);
        self
    }

    /// Reposting `post_id` always fails with `error`
    pub fn with_repost_error(mut self, post_id: &str, error: PlatformError) -> Self {
        self.repost_errors.insert(post_id.to_string(), error);
        self
    }

    /// Reposting `post_id` fails with a network error `failures` times, then succeeds
    pub fn with_flaky_repost(self, post_id: &str, failures: u32) -> Self {
        if let Ok(mut flaky) = self.flaky_reposts.lock() {
            flaky.insert(post_id.to_string(), failures);
        }
        self
    }

    pub fn with_auth_error(mut self, message: &str) -> Self {
        self.auth_error = Some(message.to_string());
        self
    }

    pub fn not_configured(mut self) -> Self {
        self.configured = false;
        self
    }

    /// Skip [`RepostPlatform::authenticate`] for tests that only need reposts
    pub fn authenticated(mut self) -> Self {
        self.authenticated = true;
        self
    }

    /// Shared handle to the call record; stays valid after the mock is boxed
    pub fn calls(&self) -> Arc<Mutex<MockCalls>> {
        Arc::clone(&self.calls)
    }

    fn record<F: FnOnce(&mut MockCalls)>(&self, f: F) {
        if let Ok(mut calls) = self.calls.lock() {
            f(&mut calls);
        }
    }
}

#[async_trait]
impl RepostPlatform for MockPlatform {
    async fn authenticate(&mut self) -> Result<()> {
        self.record(|c| c.auth_calls += 1);

        if let Some(message) = &self.auth_error {
            return Err(PlatformError::Authentication(message.clone()).into());
        }
        self.authenticated = true;
        Ok(())
    }

    async fn recent_posts(&self, handle: &str, query: &FetchQuery) -> Result<Vec<PostRecord>> {
        self.record(|c| c.fetches.push((handle.to_string(), query.clone())));

        if let Some(error) = self.fetch_errors.get(handle) {
            return Err(error.clone().into());
        }

        let feed = self
            .feeds
            .get(handle)
            .ok_or_else(|| PlatformError::NotFound(format!("user @{}", handle)))?;

        Ok(feed
            .iter()
            .filter(|post| match &query.since_id {
                Some(since) => compare_ids(&post.id, since).is_gt(),
                None => true,
            })
            .take(query.max_results)
            .cloned()
            .collect())
    }

    async fn repost(&self, post: &PostRecord) -> Result<()> {
        self.record(|c| c.repost_attempts.push(post.id.clone()));

        if !self.authenticated {
            return Err(PlatformError::Authentication("Not authenticated".to_string()).into());
        }

        if let Some(error) = self.repost_errors.get(&post.id) {
            return Err(error.clone().into());
        }

        if let Ok(mut flaky) = self.flaky_reposts.lock() {
            if let Some(remaining) = flaky.get_mut(&post.id) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(PlatformError::Network("connection reset by peer".to_string()).into());
                }
            }
        }

        self.record(|c| c.reposted.push(post.id.clone()));
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn is_configured(&self) -> bool {
        self.configured
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(ids: &[&str]) -> Vec<PostRecord> {
        ids.iter().map(|id| PostRecord::new(*id, "nasa")).collect()
    }

    #[tokio::test]
    async fn test_mock_fetch_and_repost() {
        let mut platform = MockPlatform::new("test").with_feed("nasa", feed(&["3", "2", "1"]));
        let calls = platform.calls();

        platform.authenticate().await.unwrap();
        let posts = platform.recent_posts("nasa", &FetchQuery::new(2)).await.unwrap();
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].id, "3");

        platform.repost(&posts[0]).await.unwrap();

        let calls = calls.lock().unwrap();
        assert_eq!(calls.auth_calls, 1);
        assert_eq!(calls.fetches.len(), 1);
        assert_eq!(calls.reposted, vec!["3"]);
    }

    #[tokio::test]
    async fn test_mock_since_id() {
        let platform = MockPlatform::new("test").with_feed("nasa", feed(&["12", "11", "9"]));

        let query = FetchQuery::new(10).since(Some("10"));
        let posts = platform.recent_posts("nasa", &query).await.unwrap();
        let ids: Vec<&str> = posts.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["12", "11"]);
    }

    #[tokio::test]
    async fn test_mock_unknown_account() {
        let platform = MockPlatform::new("test");
        let err = platform
            .recent_posts("ghost", &FetchQuery::new(5))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("@ghost"));
    }

    #[tokio::test]
    async fn test_mock_requires_authentication() {
        let platform = MockPlatform::new("test");
        let err = platform.repost(&PostRecord::new("1", "nasa")).await.unwrap_err();
        assert!(err.to_string().contains("Not authenticated"));
    }

    #[tokio::test]
    async fn test_mock_auth_failure() {
        let mut platform = MockPlatform::new("test").with_auth_error("token revoked");
        let err = platform.authenticate().await.unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[tokio::test]
    async fn test_mock_flaky_repost() {
        let platform = MockPlatform::new("test")
            .authenticated()
            .with_flaky_repost("1", 2);
        let calls = platform.calls();
        let post = PostRecord::new("1", "nasa");

        assert!(platform.repost(&post).await.is_err());
        assert!(platform.repost(&post).await.is_err());
        assert!(platform.repost(&post).await.is_ok());

        let calls = calls.lock().unwrap();
        assert_eq!(calls.repost_attempts.len(), 3);
        assert_eq!(calls.reposted, vec!["1"]);
    }

    #[tokio::test]
    async fn test_mock_permanent_repost_failure() {
        let platform = MockPlatform::new("test")
            .authenticated()
            .with_repost_error("1", PlatformError::Api("tweet is protected".to_string()));

        let err = platform.repost(&PostRecord::new("1", "nasa")).await.unwrap_err();
        assert!(err.to_string().contains("protected"));
        assert!(platform.calls().lock().unwrap().reposted.is_empty());
    }

    #[test]
    fn test_mock_not_configured() {
        assert!(MockPlatform::new("test").is_configured());
        assert!(!MockPlatform::new("test").not_configured().is_configured());
    }
}
