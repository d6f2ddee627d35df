//! Platform abstraction and implementations
//!
//! The bot only needs two things from a platform: list an account's recent
//! posts and repost one of them. Everything else (HTTP, auth, response
//! shapes) stays behind [`RepostPlatform`] so the selection and run logic can
//! be exercised against [`mock::MockPlatform`].
//!
//! # Examples
//!
//! ```no_run
//! use librepost::platforms::{FetchQuery, RepostPlatform};
//!
//! # async fn example(platform: &mut dyn RepostPlatform) -> librepost::Result<()> {
//! platform.authenticate().await?;
//!
//! let posts = platform.recent_posts("nasa", &FetchQuery::new(10)).await?;
//! if let Some(newest) = posts.first() {
//!     platform.repost(newest).await?;
//! }
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;

use crate::error::Result;
use crate::types::PostRecord;

pub mod mock;
pub mod oauth;
pub mod x;

/// Parameters for listing an account's recent posts
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchQuery {
    /// Upper bound on the number of posts requested
    pub max_results: usize,
    /// Only return posts newer than this id
    pub since_id: Option<String>,
}

impl FetchQuery {
    pub fn new(max_results: usize) -> Self {
        Self {
            max_results,
            since_id: None,
        }
    }

    pub fn since(mut self, since_id: Option<&str>) -> Self {
        self.since_id = since_id.map(str::to_string);
        self
    }
}

/// A social platform the bot can read from and repost on
#[async_trait]
pub trait RepostPlatform: Send + Sync {
    /// Establish the bot account's identity. Must be called before [`repost`].
    ///
    /// # Errors
    ///
    /// Returns `PlatformError::Authentication` if the credentials are rejected.
    ///
    /// [`repost`]: RepostPlatform::repost
    async fn authenticate(&mut self) -> Result<()>;

    /// Recent posts of `handle`, most recent first
    ///
    /// # Errors
    ///
    /// Returns `PlatformError::NotFound` for unknown accounts and network,
    /// rate-limit or API errors as reported by the platform.
    async fn recent_posts(&self, handle: &str, query: &FetchQuery) -> Result<Vec<PostRecord>>;

    /// Repost `post` under the bot's own account
    ///
    /// Reposting something the bot has already reposted is not an error.
    async fn repost(&self, post: &PostRecord) -> Result<()>;

    /// Lowercase platform identifier used in logs
    fn name(&self) -> &str;

    /// Whether the client has what it needs to authenticate
    fn is_configured(&self) -> bool;
}
