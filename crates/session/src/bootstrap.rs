//! Session Bootstrapper: derives the authoritative session state from the
//! identity provider, bounded by a hard deadline.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tradelink_auth::{AuthError, AuthErrorKind, Identity, map_provider_error};
use tradelink_core::UserId;

use crate::cache::IdentityCache;
use crate::config::SessionConfig;
use crate::provider::{IdentityProvider, ProfileResolver};
use crate::state::{BootOutcome, BootState, SessionStore};
use crate::sweeper::TokenSweeper;

/// Runs boot attempts against the shared [`SessionStore`].
///
/// Cheap to clone; every clone drives the same state.
#[derive(Clone)]
pub struct Bootstrapper {
    provider: Arc<dyn IdentityProvider>,
    resolver: Arc<dyn ProfileResolver>,
    state: Arc<SessionStore>,
    cache: IdentityCache,
    sweeper: TokenSweeper,
    config: Arc<SessionConfig>,
}

impl core::fmt::Debug for Bootstrapper {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Bootstrapper")
            .field("cache", &self.cache)
            .field("sweeper", &self.sweeper)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Bootstrapper {
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        resolver: Arc<dyn ProfileResolver>,
        state: Arc<SessionStore>,
        cache: IdentityCache,
        sweeper: TokenSweeper,
        config: Arc<SessionConfig>,
    ) -> Self {
        Self {
            provider,
            resolver,
            state,
            cache,
            sweeper,
            config,
        }
    }

    /// Run one boot attempt and return the resulting boot state.
    ///
    /// Never fails and never returns while the store is still `Checking`.
    /// Returns by the deadline even when the provider hangs; the in-flight
    /// lookup keeps running and its result is dropped if it lands after the
    /// attempt settled. When a newer attempt supersedes this one, the call
    /// waits for that attempt to settle instead.
    pub async fn rehydrate(&self) -> BootState {
        let attempt = self.state.begin_attempt();
        tracing::info!(attempt, "starting session rehydration");

        // The deadline lives in its own task so that dropping this future
        // cannot leave the attempt stuck in `Checking`.
        let worker = self.clone();
        let race = tokio::spawn(async move { worker.race_deadline(attempt).await });
        if let Err(join_err) = race.await {
            tracing::error!(attempt, error = %join_err, "boot task failed");
            self.commit(attempt, BootOutcome::failed(AuthError::new(AuthErrorKind::UnknownError)))
                .await;
        }

        let settled = self.state.settled().await;
        if settled.attempt != attempt {
            tracing::debug!(attempt, settled = settled.attempt, "boot superseded by a newer attempt");
        }
        settled.boot_state()
    }

    /// Race the lookup for `attempt` against the boot deadline.
    async fn race_deadline(&self, attempt: u64) {
        let worker = self.clone();
        let mut lookup = tokio::spawn(async move { worker.resolve(attempt).await });

        match tokio::time::timeout(self.config.boot_deadline, &mut lookup).await {
            Ok(Ok(())) => {}
            Ok(Err(join_err)) => {
                tracing::error!(attempt, error = %join_err, "session lookup task failed");
                self.commit(attempt, BootOutcome::failed(AuthError::new(AuthErrorKind::UnknownError)))
                    .await;
            }
            Err(_) => {
                if self.commit(attempt, BootOutcome::failed(AuthError::boot_timeout())).await {
                    tracing::warn!(
                        attempt,
                        deadline_ms = millis(self.config.boot_deadline),
                        "boot deadline exceeded, forcing ready state"
                    );
                }
            }
        }
    }

    /// The lookup half of an attempt: session, then profile, then commit.
    async fn resolve(&self, attempt: u64) {
        let outcome = match self.provider.get_session().await {
            Err(raw) => {
                let error = map_provider_error(&raw);
                tracing::error!(attempt, error = %raw, kind = %error.kind(), "session lookup failed");
                self.sweep_if_current(attempt).await;
                BootOutcome::failed(error)
            }
            Ok(None) => {
                tracing::info!(attempt, "no remote session");
                self.sweep_if_current(attempt).await;
                BootOutcome::anonymous()
            }
            Ok(Some(session)) if !session.is_valid_at(Utc::now()) => {
                tracing::info!(attempt, subject = %session.subject, "remote session expired");
                self.sweep_if_current(attempt).await;
                BootOutcome::failed(AuthError::new(AuthErrorKind::SessionExpired))
            }
            Ok(Some(session)) => {
                tracing::info!(attempt, subject = %session.subject, "remote session found, loading profile");
                match self.load_profile(attempt, &session.subject).await {
                    Ok(identity) => {
                        tracing::info!(attempt, role = %identity.role, "profile loaded");
                        BootOutcome::authenticated(identity, session)
                    }
                    Err(error) => {
                        tracing::error!(attempt, kind = %error.kind(), "profile resolution failed, discarding session");
                        self.sweep_if_current(attempt).await;
                        BootOutcome::failed(error)
                    }
                }
            }
        };

        if !self.commit(attempt, outcome).await {
            tracing::info!(attempt, "late boot result discarded");
        }
    }

    /// Resolve the profile, retrying retryable failures up to the configured
    /// number of times with exponential backoff.
    async fn load_profile(&self, attempt: u64, subject: &UserId) -> Result<Identity, AuthError> {
        let mut retries_left = self.config.profile_retry_attempts;
        let mut delay = self.config.profile_retry_backoff;
        loop {
            let raw = match self.resolver.load_profile(subject).await {
                Ok(identity) => return Ok(identity),
                Err(raw) => raw,
            };
            let error = map_provider_error(&raw);
            if retries_left == 0 || !error.retryable() || !self.state.is_current(attempt) {
                return Err(error);
            }
            retries_left -= 1;
            tracing::warn!(
                attempt,
                kind = %error.kind(),
                retries_left,
                delay_ms = millis(delay),
                "profile lookup failed, retrying"
            );
            tokio::time::sleep(delay).await;
            delay = delay.saturating_mul(2);
        }
    }

    async fn sweep_if_current(&self, attempt: u64) {
        if !self.state.is_current(attempt) {
            return;
        }
        if let Err(err) = self.sweeper.sweep().await {
            tracing::warn!(attempt, error = %err, "token sweep failed");
        }
    }

    /// Guarded commit plus cache sync. Returns whether the commit won.
    async fn commit(&self, attempt: u64, outcome: BootOutcome) -> bool {
        if !self.state.settle(attempt, outcome) {
            return false;
        }
        if let Err(err) = self.cache.sync_to(&self.state).await {
            tracing::warn!(attempt, error = %err, "identity cache update failed");
        }
        true
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
