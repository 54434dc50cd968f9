//! Session Facade: the API the application shell consumes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use tradelink_auth::{AuthError, Identity, map_provider_error};

use crate::bootstrap::Bootstrapper;
use crate::cache::IdentityCache;
use crate::config::SessionConfig;
use crate::guard::{GuardDecision, RouteGuard};
use crate::inactivity::{ActivityEvent, InactivityMonitor};
use crate::provider::{AuthEvent, IdentityProvider, ProfileResolver, SignIn};
use crate::state::{BootState, SessionSnapshot, SessionStore, SubscriberId};
use crate::store::KeyValueStore;
use crate::sweeper::TokenSweeper;

/// Composes the bootstrapper, cache, sweeper and inactivity monitor over one
/// published [`SessionStore`].
///
/// Local state changes (logout, reset) are committed before any remote call
/// is awaited, so a slow provider never leaves the shell looking signed in.
pub struct SessionFacade {
    state: Arc<SessionStore>,
    bootstrapper: Bootstrapper,
    provider: Arc<dyn IdentityProvider>,
    cache: IdentityCache,
    sweeper: TokenSweeper,
    monitor: Arc<InactivityMonitor>,
    config: Arc<SessionConfig>,
    started: AtomicBool,
}

impl core::fmt::Debug for SessionFacade {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SessionFacade")
            .field("state", &self.state)
            .field("monitor", &self.monitor)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SessionFacade {
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        resolver: Arc<dyn ProfileResolver>,
        store: Arc<dyn KeyValueStore>,
        config: SessionConfig,
    ) -> Arc<Self> {
        let config = Arc::new(config);
        let state = Arc::new(SessionStore::new());
        let cache = IdentityCache::new(Arc::clone(&store), config.cache_key.clone());
        let sweeper = TokenSweeper::new(store, config.token_prefix.clone());
        let monitor = Arc::new(InactivityMonitor::new(config.inactivity_window));
        let bootstrapper = Bootstrapper::new(
            Arc::clone(&provider),
            resolver,
            Arc::clone(&state),
            cache.clone(),
            sweeper.clone(),
            Arc::clone(&config),
        );

        Arc::new_cyclic(|facade: &Weak<SessionFacade>| {
            state.subscribe(inactivity_subscriber(Weak::clone(facade), Arc::clone(&monitor)));
            Self {
                state,
                bootstrapper,
                provider,
                cache,
                sweeper,
                monitor,
                config,
                started: AtomicBool::new(false),
            }
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.snapshot()
    }

    /// Register a subscriber; it is called after every commit, in
    /// registration order. Subscribers must not block.
    pub fn subscribe<F>(&self, subscriber: F) -> SubscriberId
    where
        F: Fn(&SessionSnapshot) + Send + Sync + 'static,
    {
        self.state.subscribe(subscriber)
    }

    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.state.unsubscribe(id)
    }

    /// Application start: publish the advisory cached identity, then boot.
    ///
    /// Only the first call boots; later calls return the current boot state.
    pub async fn start(&self) -> BootState {
        if self.started.swap(true, Ordering::SeqCst) {
            return self.state.snapshot().boot_state();
        }

        match self.cache.load().await {
            Ok(cached) => {
                if let Some(projection) = &cached {
                    tracing::debug!(role = %projection.role, "cached identity available");
                }
                self.state.set_cached_identity(cached);
            }
            Err(err) => tracing::warn!(error = %err, "failed to read identity cache"),
        }

        self.bootstrapper.rehydrate().await
    }

    pub async fn rehydrate(&self) -> BootState {
        self.bootstrapper.rehydrate().await
    }

    /// Re-run the boot sequence. Always converges to `Ready`.
    pub async fn retry_boot(&self) -> BootState {
        tracing::info!("boot retry requested");
        self.bootstrapper.rehydrate().await
    }

    /// Password sign-in. Errors are returned to the caller and also published
    /// on the login error channel.
    pub async fn login(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        self.state.record_error(None);
        match self.provider.sign_in_with_password(email, password).await {
            Ok(SignIn { session, identity }) => {
                tracing::info!(role = %identity.role, "signed in");
                self.state.authenticate(identity.clone(), session);
                if let Err(err) = self.cache.sync_to(&self.state).await {
                    tracing::warn!(error = %err, "failed to persist identity cache");
                }
                Ok(identity)
            }
            Err(raw) => {
                let error = map_provider_error(&raw);
                tracing::warn!(kind = %error.kind(), "sign-in failed");
                self.state.record_error(Some(error.clone()));
                Err(error)
            }
        }
    }

    /// Sign out. Local state is cleared first; the remote sign-out is
    /// best-effort and its failure is only logged.
    pub async fn logout(&self) {
        tracing::info!("signing out");
        self.state.sign_out();
        self.discard_local_credentials().await;
        if let Err(err) = self.provider.sign_out().await {
            tracing::warn!(error = %err, "remote sign-out failed");
        }
    }

    /// Hard reset: back to `Idle`, cache and provider tokens removed.
    pub async fn reset_store(&self) {
        tracing::info!("hard reset of session state");
        self.state.reset();
        self.discard_local_credentials().await;
    }

    /// Refresh the remote session and re-derive state from it. On failure the
    /// user is signed out and the mapped error returned.
    pub async fn refresh_session(&self) -> Result<(), AuthError> {
        match self.provider.refresh_session().await {
            Ok(Some(session)) => {
                self.state.replace_session(session);
                self.bootstrapper.rehydrate().await;
                Ok(())
            }
            Ok(None) => {
                tracing::debug!("no session to refresh");
                Ok(())
            }
            Err(raw) => {
                let error = map_provider_error(&raw);
                tracing::error!(kind = %error.kind(), "session refresh failed");
                self.logout().await;
                self.state.record_error(Some(error.clone()));
                Err(error)
            }
        }
    }

    /// React to an auth-state change reported by the provider.
    pub async fn handle_auth_event(&self, event: AuthEvent) {
        tracing::info!(?event, "auth state changed");
        match event {
            AuthEvent::SignedOut => {
                self.reset_store().await;
                self.state.sign_out();
            }
            AuthEvent::SignedIn | AuthEvent::TokenRefreshed => {
                self.bootstrapper.rehydrate().await;
            }
        }
    }

    /// Forward a user interaction to the inactivity monitor.
    pub fn record_activity(&self, event: ActivityEvent) {
        self.monitor.record(event);
    }

    pub fn evaluate(&self, guard: &RouteGuard) -> GuardDecision {
        guard.evaluate(&self.state.snapshot())
    }

    /// Called after the state already dropped the identity, so the cache
    /// sync clears the entry.
    async fn discard_local_credentials(&self) {
        if let Err(err) = self.cache.sync_to(&self.state).await {
            tracing::warn!(error = %err, "failed to clear identity cache");
        }
        if let Err(err) = self.sweeper.sweep().await {
            tracing::warn!(error = %err, "token sweep failed");
        }
    }
}

/// Keeps the inactivity monitor armed exactly while a usable identity is
/// signed in.
fn inactivity_subscriber(
    facade: Weak<SessionFacade>,
    monitor: Arc<InactivityMonitor>,
) -> impl Fn(&SessionSnapshot) + Send + Sync + 'static {
    move |snapshot| {
        if RouteGuard::any_role().evaluate(snapshot) != GuardDecision::Authorized {
            monitor.disarm();
            return;
        }
        let facade = Weak::clone(&facade);
        monitor.arm(move || async move {
            if let Some(facade) = facade.upgrade() {
                facade.logout().await;
            }
        });
    }
}
