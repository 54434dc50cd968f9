//! Stale Token Sweeper.

use std::sync::Arc;

use crate::store::{KeyValueStore, StoreError};

/// Removes identity-provider token keys from the store.
///
/// A key is a provider token key when it starts with the provider prefix and
/// mentions `auth` or `session`. Everything else is left alone.
#[derive(Clone)]
pub struct TokenSweeper {
    store: Arc<dyn KeyValueStore>,
    prefix: String,
}

impl core::fmt::Debug for TokenSweeper {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TokenSweeper").field("prefix", &self.prefix).finish()
    }
}

impl TokenSweeper {
    pub fn new(store: Arc<dyn KeyValueStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }

    pub fn is_provider_token_key(&self, key: &str) -> bool {
        key.starts_with(&self.prefix) && (key.contains("auth") || key.contains("session"))
    }

    /// Remove every provider token key; returns the keys removed.
    ///
    /// Idempotent. A failure to remove one key does not stop the rest.
    pub async fn sweep(&self) -> Result<Vec<String>, StoreError> {
        let mut removed = Vec::new();
        for key in self.store.keys().await? {
            if !self.is_provider_token_key(&key) {
                continue;
            }
            match self.store.remove(&key).await {
                Ok(()) => {
                    tracing::info!(%key, "removed stale provider token");
                    removed.push(key);
                }
                Err(err) => tracing::warn!(%key, error = %err, "failed to remove provider token"),
            }
        }
        Ok(removed)
    }

    /// Whether any key under the provider prefix holds a value that is not
    /// valid JSON.
    ///
    /// Wider than [`is_provider_token_key`](Self::is_provider_token_key): any
    /// prefixed key counts. Storage that cannot be read is reported as
    /// corrupted.
    pub async fn detect_corrupted(&self) -> bool {
        match self.find_corrupted().await {
            Ok(Some(key)) => {
                tracing::warn!(%key, "corrupted provider auth state");
                true
            }
            Ok(None) => false,
            Err(err) => {
                tracing::warn!(error = %err, "provider auth state unreadable, assuming corrupted");
                true
            }
        }
    }

    async fn find_corrupted(&self) -> Result<Option<String>, StoreError> {
        for key in self.store.keys().await? {
            if !key.starts_with(&self.prefix) {
                continue;
            }
            if let Some(value) = self.store.get(&key).await? {
                if serde_json::from_str::<serde_json::Value>(&value).is_err() {
                    return Ok(Some(key));
                }
            }
        }
        Ok(None)
    }
}
