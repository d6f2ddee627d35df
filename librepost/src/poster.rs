//! Run orchestration
//!
//! Fetches candidates from the source accounts, selects what to repost,
//! reposts with retry logic, and records confirmed reposts in the history.

use std::cmp::Reverse;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::cursor::{max_id, CursorStore};
use crate::error::{PlatformError, RepostError, Result};
use crate::history::HistoryStore;
use crate::platforms::{FetchQuery, RepostPlatform};
use crate::selector::{self, SelectionFilter};
use crate::types::PostRecord;

/// Retry behaviour for API calls
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// First backoff delay; doubles on each retry
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Longest sleep until a rate-limit window resets. Waits beyond this
    /// give up instead, leaving the work to the next scheduled run.
    pub max_rate_limit_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 4,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(300),
            max_rate_limit_wait: Duration::from_secs(15 * 60),
        }
    }
}

impl RetryPolicy {
    /// No retries at all
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Exponential backoff for the given retry (1-based), capped at `max_delay`
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// How long to wait before retry number `retry`, or `None` to give up.
    ///
    /// `now` is the current Unix time, used against a rate-limit reset time.
    pub fn delay_for(&self, error: &RepostError, retry: u32, now: i64) -> Option<Duration> {
        let platform_error = match error {
            RepostError::Platform(e) if e.is_transient() => e,
            _ => return None,
        };
        if retry > self.max_retries {
            return None;
        }

        match platform_error {
            PlatformError::RateLimit {
                reset_at: Some(reset_at),
                ..
            } => {
                // Two seconds of slack past the advertised reset
                let until_reset = reset_at.saturating_sub(now).max(0) as u64;
                let wait = Duration::from_secs(until_reset.saturating_add(2));
                if wait > self.max_rate_limit_wait {
                    None
                } else {
                    Some(wait)
                }
            }
            _ => Some(self.backoff(retry)),
        }
    }
}

/// Run `op` until it succeeds, fails permanently, or retries run out
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, context: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut retry = 0;
    loop {
        match op().await {
            Ok(value) => {
                if retry > 0 {
                    info!("{} succeeded after {} retr(ies)", context, retry);
                }
                return Ok(value);
            }
            Err(e) => {
                retry += 1;
                let now = chrono::Utc::now().timestamp();
                match policy.delay_for(&e, retry, now) {
                    Some(delay) => {
                        warn!(
                            "{} failed (retry {}/{}): {}. Retrying in {:?}",
                            context, retry, policy.max_retries, e, delay
                        );
                        sleep(delay).await;
                    }
                    None => return Err(e),
                }
            }
        }
    }
}

/// What happened to one selected post
#[derive(Debug, Clone, PartialEq)]
pub enum RepostOutcome {
    Reposted(PostRecord),
    Failed { post: PostRecord, error: String },
    /// Selected but not sent (dry run)
    Skipped(PostRecord),
}

impl RepostOutcome {
    pub fn post(&self) -> &PostRecord {
        match self {
            Self::Reposted(post) | Self::Skipped(post) => post,
            Self::Failed { post, .. } => post,
        }
    }
}

/// Posts fetched from one source account
#[derive(Debug, Clone, Default)]
pub struct AccountFetch {
    pub handle: String,
    pub fetched_ids: Vec<String>,
}

/// Result of polling the source accounts
#[derive(Debug, Clone, Default)]
pub struct FetchOutcome {
    /// Posts from every account, newest first
    pub candidates: Vec<PostRecord>,
    pub accounts: Vec<AccountFetch>,
    /// (handle, error) for accounts that could not be fetched
    pub failures: Vec<(String, String)>,
}

/// What a single run is asked to do
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub accounts: Vec<String>,
    pub fetch_limit: usize,
    pub quota: usize,
    /// Pass and advance per-account `since_id` cursors
    pub use_cursors: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Nothing was selected
    Idle,
    /// Every selected post was handled
    Completed,
    /// Some reposts succeeded, some failed
    Partial,
    /// Posts were selected but none could be reposted
    Failed,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Idle => write!(f, "idle"),
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::Partial => write!(f, "partial"),
            RunStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Summary of a run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    pub accounts_polled: usize,
    pub fetch_failures: Vec<(String, String)>,
    pub candidates: usize,
    pub eligible: usize,
    pub selected: usize,
    pub reposted: Vec<String>,
    /// (post id, error)
    pub failed: Vec<(String, String)>,
    pub dry_run: bool,
}

impl RunReport {
    pub fn status(&self) -> RunStatus {
        if self.selected == 0 {
            RunStatus::Idle
        } else if self.failed.is_empty() {
            RunStatus::Completed
        } else if self.reposted.is_empty() {
            RunStatus::Failed
        } else {
            RunStatus::Partial
        }
    }

    /// Non-zero only when posts were selected and none could be reposted
    pub fn exit_code(&self) -> i32 {
        match self.status() {
            RunStatus::Failed => 1,
            _ => 0,
        }
    }
}

/// Drives one scheduled run against a platform
pub struct RepostRunner {
    platform: Box<dyn RepostPlatform>,
    retry: RetryPolicy,
    filter: SelectionFilter,
    /// Where to save the history after each confirmed repost
    history_path: Option<PathBuf>,
    dry_run: bool,
}

impl RepostRunner {
    /// Create a runner with default retry policy and filter
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use librepost::platforms::mock::MockPlatform;
    /// use librepost::poster::{RepostRunner, RunPlan};
    /// use librepost::{CursorStore, HistoryStore};
    ///
    /// # async fn example() -> librepost::Result<()> {
    /// let mut runner = RepostRunner::new(Box::new(MockPlatform::new("mock")));
    /// let mut history = HistoryStore::new();
    /// let mut cursors = CursorStore::new();
    ///
    /// let plan = RunPlan {
    ///     accounts: vec!["nasa".to_string()],
    ///     fetch_limit: 10,
    ///     quota: 1,
    ///     use_cursors: false,
    /// };
    /// let report = runner.run(&plan, &mut history, &mut cursors).await?;
    /// println!("run {}", report.status());
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(platform: Box<dyn RepostPlatform>) -> Self {
        Self {
            platform,
            retry: RetryPolicy::default(),
            filter: SelectionFilter::default(),
            history_path: None,
            dry_run: false,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_filter(mut self, filter: SelectionFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Save the history to `path` after every confirmed repost
    pub fn persist_history_to(mut self, path: PathBuf) -> Self {
        self.history_path = Some(path);
        self
    }

    /// Select and log, but never call the repost endpoint
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub async fn authenticate(&mut self) -> Result<()> {
        if !self.platform.is_configured() {
            return Err(PlatformError::Authentication(format!(
                "{} is missing credentials",
                self.platform.name()
            ))
            .into());
        }

        let retry = self.retry.clone();
        let mut attempt = 0;
        loop {
            match self.platform.authenticate().await {
                Ok(()) => {
                    info!("Authenticated with {}", self.platform.name());
                    return Ok(());
                }
                Err(e) => {
                    attempt += 1;
                    let now = chrono::Utc::now().timestamp();
                    match retry.delay_for(&e, attempt, now) {
                        Some(delay) => {
                            warn!("Authentication failed ({}), retrying in {:?}", e, delay);
                            sleep(delay).await;
                        }
                        None => return Err(e),
                    }
                }
            }
        }
    }

    /// Poll each account and merge the results, newest first.
    ///
    /// A failing account is logged and skipped.
    ///
    /// # Errors
    ///
    /// Fails only if every account failed: with the authentication error if
    /// one occurred, otherwise with a network error summarizing them.
    pub async fn fetch_candidates(
        &self,
        accounts: &[String],
        fetch_limit: usize,
        cursors: Option<&CursorStore>,
    ) -> Result<FetchOutcome> {
        let mut outcome = FetchOutcome::default();
        let mut auth_error = None;

        for handle in accounts {
            let since = cursors.and_then(|c| c.get(handle));
            let query = FetchQuery::new(fetch_limit).since(since);
            let context = format!("fetch @{}", handle);

            match with_retry(&self.retry, &context, || self.platform.recent_posts(handle, &query)).await {
                Ok(posts) => {
                    info!("Fetched {} post(s) from @{}", posts.len(), handle);
                    outcome.accounts.push(AccountFetch {
                        handle: handle.clone(),
                        fetched_ids: posts.iter().map(|p| p.id.clone()).collect(),
                    });
                    outcome.candidates.extend(posts);
                }
                Err(e) => {
                    error!("Could not fetch @{}: {}", handle, e);
                    if matches!(e, RepostError::Platform(PlatformError::Authentication(_))) {
                        auth_error.get_or_insert(e.to_string());
                    }
                    outcome.failures.push((handle.clone(), e.to_string()));
                }
            }
        }

        if !accounts.is_empty() && outcome.accounts.is_empty() {
            if let Some(message) = auth_error {
                return Err(PlatformError::Authentication(message).into());
            }
            let summary = outcome
                .failures
                .iter()
                .map(|(handle, e)| format!("@{}: {}", handle, e))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(PlatformError::Network(format!(
                "Could not fetch any of {} source account(s): {}",
                accounts.len(),
                summary
            ))
            .into());
        }

        // Stable, so each account's API order survives; undated posts go last
        outcome
            .candidates
            .sort_by_key(|post| Reverse(post.created_at));

        Ok(outcome)
    }

    /// Select up to `quota` new posts, repost them in order, and mark each
    /// one in `history` only once the platform confirmed the repost.
    pub async fn select_and_mark(
        &self,
        candidates: &[PostRecord],
        history: &mut HistoryStore,
        quota: usize,
    ) -> Vec<RepostOutcome> {
        let selection = selector::select_filtered(candidates, history, quota, &self.filter);
        let mut outcomes = Vec::with_capacity(selection.len());

        for post in selection {
            if self.dry_run {
                info!("[dry run] Would repost {} from @{} ({})", post.id, post.source, post.permalink());
                outcomes.push(RepostOutcome::Skipped(post));
                continue;
            }

            info!("Reposting {} from @{} ({})", post.id, post.source, post.permalink());
            let context = format!("repost {}", post.id);
            match with_retry(&self.retry, &context, || self.platform.repost(&post)).await {
                Ok(()) => {
                    history.mark(post.id.clone());
                    info!("Reposted {}", post.id);
                    self.persist(history);
                    outcomes.push(RepostOutcome::Reposted(post));
                }
                Err(e) => {
                    error!("Failed to repost {}: {}", post.id, e);
                    outcomes.push(RepostOutcome::Failed {
                        post,
                        error: e.to_string(),
                    });
                }
            }
        }

        outcomes
    }

    fn persist(&self, history: &HistoryStore) {
        if let Some(path) = &self.history_path {
            if let Err(e) = history.save(path) {
                warn!("Could not save history after repost: {}", e);
            }
        }
    }

    /// Authenticate, fetch, select, repost, and advance cursors.
    ///
    /// The caller owns loading and saving of `history` and `cursors`.
    pub async fn run(
        &mut self,
        plan: &RunPlan,
        history: &mut HistoryStore,
        cursors: &mut CursorStore,
    ) -> Result<RunReport> {
        self.authenticate().await?;

        let fetched = self
            .fetch_candidates(
                &plan.accounts,
                plan.fetch_limit,
                plan.use_cursors.then_some(&*cursors),
            )
            .await?;

        let eligible = selector::eligible(&fetched.candidates, history, &self.filter).len();
        info!(
            "{} candidate(s), {} eligible, quota {}",
            fetched.candidates.len(),
            eligible,
            plan.quota
        );

        let outcomes = self
            .select_and_mark(&fetched.candidates, history, plan.quota)
            .await;

        if plan.use_cursors && !self.dry_run {
            self.advance_cursors(&fetched, history, cursors);
        }

        let mut report = RunReport {
            accounts_polled: plan.accounts.len(),
            fetch_failures: fetched.failures,
            candidates: fetched.candidates.len(),
            eligible,
            selected: outcomes.len(),
            dry_run: self.dry_run,
            ..RunReport::default()
        };
        for outcome in outcomes {
            match outcome {
                RepostOutcome::Reposted(post) => report.reposted.push(post.id),
                RepostOutcome::Failed { post, error } => report.failed.push((post.id, error)),
                RepostOutcome::Skipped(_) => {}
            }
        }

        Ok(report)
    }

    /// Move an account's cursor past what was fetched only when none of its
    /// eligible posts is still waiting (cut by quota or failed).
    fn advance_cursors(&self, fetched: &FetchOutcome, history: &HistoryStore, cursors: &mut CursorStore) {
        let pending = selector::eligible(&fetched.candidates, history, &self.filter);

        for account in &fetched.accounts {
            if pending.iter().any(|post| post.source == account.handle) {
                debug!("Keeping cursor for @{}: posts still pending", account.handle);
                continue;
            }
            if let Some(newest) = max_id(account.fetched_ids.iter().map(String::as_str)) {
                if cursors.advance(&account.handle, newest) {
                    debug!("Cursor for @{} advanced to {}", account.handle, newest);
                }
            }
        }
    }
}
