//! Runtime configuration for the sync stack.
//!
//! Settings come from the embedder or from `ROAM_*` environment
//! variables. A missing remote URL is not an error; Roam then runs
//! local-only and every write simply waits in the unsynced set.

use std::time::Duration;

use crate::sync::RetryPolicy;
use crate::util::normalize_text_option;

const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(15 * 60);
const DEFAULT_PULL_LIMIT: usize = 50;
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything the sync service needs to reach the remote document store
/// and decide its cadence
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Remote document-store base URL
    pub base_url: String,
    /// Optional bearer key sent with every request
    pub api_key: Option<String>,
    /// Owner key used for user-scoped remote queries
    pub user_id: String,
    /// Cadence of periodic background sync
    pub sync_interval: Duration,
    /// How many recent reviews one pull fetches
    pub pull_limit: usize,
    /// Per-request HTTP timeout
    pub request_timeout: Duration,
    /// Retry behavior for scheduled runs
    pub retry: RetryPolicy,
}

impl SyncSettings {
    /// Settings with defaults for everything but the required fields
    #[must_use]
    pub fn new(base_url: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            user_id: user_id.into(),
            sync_interval: DEFAULT_SYNC_INTERVAL,
            pull_limit: DEFAULT_PULL_LIMIT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = normalize_text_option(Some(api_key.into()));
        self
    }

    #[must_use]
    pub const fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }

    #[must_use]
    pub const fn with_pull_limit(mut self, limit: usize) -> Self {
        self.pull_limit = limit;
        self
    }

    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Build settings from an environment-style lookup.
    ///
    /// Public for testability; `from_env` wires it to the real process
    /// environment. Returns `None` when `ROAM_REMOTE_URL` is absent.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let base_url = normalize_text_option(lookup("ROAM_REMOTE_URL"))?;
        let user_id = normalize_text_option(lookup("ROAM_USER_ID"))
            .unwrap_or_else(|| "local".to_string());

        let mut settings = Self::new(base_url, user_id);
        settings.api_key = normalize_text_option(lookup("ROAM_API_KEY"));

        if let Some(seconds) = lookup("ROAM_SYNC_INTERVAL_SECS")
            .and_then(|raw| raw.trim().parse::<u64>().ok())
        {
            if seconds > 0 {
                settings.sync_interval = Duration::from_secs(seconds);
            }
        }

        Some(settings)
    }

    /// Read settings from the process environment
    #[must_use]
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }
}
