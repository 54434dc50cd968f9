//! Runtime configuration for the session layer.

use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_BOOT_DEADLINE: Duration = Duration::from_secs(10);
pub const DEFAULT_INACTIVITY_WINDOW: Duration = Duration::from_secs(3 * 60 * 60);
pub const DEFAULT_PROFILE_RETRY_BACKOFF: Duration = Duration::from_secs(1);
pub const DEFAULT_CACHE_KEY: &str = "auth-user-storage";
pub const DEFAULT_TOKEN_PREFIX: &str = "sb-";

/// Session layer configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Hard limit on how long a boot may stay in `checking`.
    pub boot_deadline: Duration,
    /// Idle time after which an authorized user is signed out.
    pub inactivity_window: Duration,
    /// Extra profile lookups after a retryable failure (0 = fail fast).
    pub profile_retry_attempts: u32,
    /// Delay before the first profile retry; doubled for each further retry.
    pub profile_retry_backoff: Duration,
    /// Store key holding the cached identity projection.
    pub cache_key: String,
    /// Prefix of the identity provider's persisted token keys.
    pub token_prefix: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            boot_deadline: DEFAULT_BOOT_DEADLINE,
            inactivity_window: DEFAULT_INACTIVITY_WINDOW,
            profile_retry_attempts: 0,
            profile_retry_backoff: DEFAULT_PROFILE_RETRY_BACKOFF,
            cache_key: DEFAULT_CACHE_KEY.to_string(),
            token_prefix: DEFAULT_TOKEN_PREFIX.to_string(),
        }
    }
}

impl SessionConfig {
    /// Defaults overridden by `TRADELINK_*` environment variables.
    ///
    /// Unparseable values are ignored (with a warning) and the default kept.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(ms) = env_parse::<u64>("TRADELINK_BOOT_DEADLINE_MS") {
            config.boot_deadline = Duration::from_millis(ms);
        }
        if let Some(secs) = env_parse::<u64>("TRADELINK_INACTIVITY_TIMEOUT_SECS") {
            config.inactivity_window = Duration::from_secs(secs);
        }
        if let Some(retries) = env_parse::<u32>("TRADELINK_PROFILE_RETRIES") {
            config.profile_retry_attempts = retries;
        }
        config
    }

    pub fn with_boot_deadline(mut self, deadline: Duration) -> Self {
        self.boot_deadline = deadline;
        self
    }

    pub fn with_inactivity_window(mut self, window: Duration) -> Self {
        self.inactivity_window = window;
        self
    }

    pub fn with_profile_retries(mut self, attempts: u32, backoff: Duration) -> Self {
        self.profile_retry_attempts = attempts;
        self.profile_retry_backoff = backoff;
        self
    }

    pub fn with_cache_key(mut self, key: impl Into<String>) -> Self {
        self.cache_key = key.into();
        self
    }

    pub fn with_token_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.token_prefix = prefix.into();
        self
    }
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(variable = name, value = %raw, "ignoring unparseable setting");
            None
        }
    }
}
