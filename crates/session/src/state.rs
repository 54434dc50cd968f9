//! Published session state and its single-writer container.
//!
//! All writes funnel through [`SessionStore`]. Boot commits are guarded by an
//! attempt number: a result is accepted only while its attempt is current and
//! the status is still `Checking`, so a timeout and a late provider answer can
//! never both land.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tokio::sync::watch;
use tradelink_auth::{AuthError, Identity, Role, Session};

use crate::cache::CachedIdentityProjection;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BootStatus {
    Idle,
    Checking,
    Ready,
}

/// Boot phase plus the boot error, as returned by a rehydration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootState {
    pub status: BootStatus,
    pub boot_error: Option<AuthError>,
}

/// Immutable view of the published state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub status: BootStatus,
    pub identity: Option<Identity>,
    pub session: Option<Session>,
    pub boot_error: Option<AuthError>,
    /// Last login/refresh error, separate from boot failures.
    pub error: Option<AuthError>,
    /// Advisory projection read from the cache before boot completes.
    pub cached_identity: Option<CachedIdentityProjection>,
    /// Monotonic boot attempt counter; every authoritative write bumps it.
    pub attempt: u64,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            status: BootStatus::Idle,
            identity: None,
            session: None,
            boot_error: None,
            error: None,
            cached_identity: None,
            attempt: 0,
        }
    }
}

impl SessionSnapshot {
    pub fn boot_state(&self) -> BootState {
        BootState {
            status: self.status,
            boot_error: self.boot_error.clone(),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.status == BootStatus::Ready && self.identity.is_some() && self.session.is_some()
    }

    pub fn is_booting(&self) -> bool {
        self.status == BootStatus::Checking
    }

    pub fn is_boot_complete(&self) -> bool {
        self.status == BootStatus::Ready
    }

    pub fn user_role(&self) -> Option<Role> {
        self.identity.as_ref().map(|identity| identity.role)
    }

    pub fn user_email(&self) -> Option<&str> {
        self.identity.as_ref().map(|identity| identity.email.as_str())
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some() || self.boot_error.is_some()
    }
}

/// Terminal result of one boot attempt.
///
/// Constructors keep identity and session paired: there is no way to build
/// an outcome carrying an identity without a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootOutcome {
    identity: Option<Identity>,
    session: Option<Session>,
    boot_error: Option<AuthError>,
}

impl BootOutcome {
    pub fn authenticated(identity: Identity, session: Session) -> Self {
        Self {
            identity: Some(identity),
            session: Some(session),
            boot_error: None,
        }
    }

    pub fn anonymous() -> Self {
        Self {
            identity: None,
            session: None,
            boot_error: None,
        }
    }

    pub fn failed(error: AuthError) -> Self {
        Self {
            identity: None,
            session: None,
            boot_error: Some(error),
        }
    }
}

pub type SubscriberId = u64;

type Subscriber = Arc<dyn Fn(&SessionSnapshot) + Send + Sync>;

struct Inner {
    snapshot: SessionSnapshot,
    subscribers: Vec<(SubscriberId, Subscriber)>,
    next_subscriber: SubscriberId,
    pending: VecDeque<SessionSnapshot>,
    delivering: bool,
}

/// Single-writer container for the published session state.
///
/// Subscribers are invoked after every commit, in registration order, with
/// the committed snapshot. Deliveries are serialised: a commit made from
/// inside a subscriber (or from another thread mid-delivery) is queued and
/// delivered after the current round, so every subscriber observes commits
/// in commit order.
pub struct SessionStore {
    inner: Mutex<Inner>,
    /// Commit counter; lets async callers wait for the state to move.
    changes: watch::Sender<u64>,
}

impl core::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let inner = self.lock();
        f.debug_struct("SessionStore")
            .field("snapshot", &inner.snapshot)
            .field("subscribers", &inner.subscribers.len())
            .finish()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                snapshot: SessionSnapshot::default(),
                subscribers: Vec::new(),
                next_subscriber: 0,
                pending: VecDeque::new(),
                delivering: false,
            }),
            changes: watch::Sender::new(0),
        }
    }

    // A panicking subscriber runs outside the lock, so poisoning can only come
    // from a panic inside this module; the snapshot is still consistent.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.lock().snapshot.clone()
    }

    pub fn subscribe<F>(&self, subscriber: F) -> SubscriberId
    where
        F: Fn(&SessionSnapshot) + Send + Sync + 'static,
    {
        let mut inner = self.lock();
        let id = inner.next_subscriber;
        inner.next_subscriber += 1;
        inner.subscribers.push((id, Arc::new(subscriber)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let mut inner = self.lock();
        let before = inner.subscribers.len();
        inner.subscribers.retain(|(sid, _)| *sid != id);
        inner.subscribers.len() != before
    }

    /// Start a new boot attempt: status becomes `Checking`, the boot error
    /// is cleared, and every older attempt is invalidated.
    pub fn begin_attempt(&self) -> u64 {
        let mut attempt = 0;
        self.commit(|snapshot| {
            snapshot.attempt += 1;
            snapshot.status = BootStatus::Checking;
            snapshot.boot_error = None;
            attempt = snapshot.attempt;
            true
        });
        attempt
    }

    /// Wait until the status is no longer `Checking` and return that
    /// snapshot. Usually `Ready`, but a concurrent [`reset`](Self::reset)
    /// can make it `Idle`.
    pub async fn settled(&self) -> SessionSnapshot {
        let mut changes = self.changes.subscribe();
        loop {
            let snapshot = self.snapshot();
            if snapshot.status != BootStatus::Checking {
                return snapshot;
            }
            // Only fails once the sender is dropped.
            if changes.changed().await.is_err() {
                return snapshot;
            }
        }
    }

    /// Whether `attempt` may still commit.
    pub fn is_current(&self, attempt: u64) -> bool {
        let inner = self.lock();
        inner.snapshot.attempt == attempt && inner.snapshot.status == BootStatus::Checking
    }

    /// Guarded terminal commit for `attempt`. Returns `false` (and changes
    /// nothing) when the attempt is stale or already settled.
    pub fn settle(&self, attempt: u64, outcome: BootOutcome) -> bool {
        self.commit(|snapshot| {
            if snapshot.attempt != attempt || snapshot.status != BootStatus::Checking {
                return false;
            }
            snapshot.status = BootStatus::Ready;
            if outcome.identity.is_some() {
                snapshot.error = None;
            }
            snapshot.identity = outcome.identity;
            snapshot.session = outcome.session;
            snapshot.boot_error = outcome.boot_error;
            snapshot.cached_identity = None;
            true
        })
    }

    /// Authoritative sign-in outside of a boot (password login).
    pub fn authenticate(&self, identity: Identity, session: Session) {
        self.commit(|snapshot| {
            snapshot.attempt += 1;
            snapshot.status = BootStatus::Ready;
            snapshot.identity = Some(identity);
            snapshot.session = Some(session);
            snapshot.boot_error = None;
            snapshot.error = None;
            snapshot.cached_identity = None;
            true
        });
    }

    /// Replace the session handle of the current identity (token refresh).
    pub fn replace_session(&self, session: Session) -> bool {
        self.commit(|snapshot| {
            if snapshot.identity.is_none() {
                return false;
            }
            snapshot.session = Some(session);
            true
        })
    }

    /// Local sign-out: `Ready` with no identity. Invalidates any in-flight boot.
    pub fn sign_out(&self) {
        self.commit(|snapshot| {
            snapshot.attempt += 1;
            snapshot.status = BootStatus::Ready;
            snapshot.identity = None;
            snapshot.session = None;
            snapshot.boot_error = None;
            snapshot.error = None;
            snapshot.cached_identity = None;
            true
        });
    }

    /// Back to the initial `Idle` state with everything cleared.
    pub fn reset(&self) {
        self.commit(|snapshot| {
            let attempt = snapshot.attempt + 1;
            *snapshot = SessionSnapshot {
                attempt,
                ..SessionSnapshot::default()
            };
            true
        });
    }

    pub fn record_error(&self, error: Option<AuthError>) {
        self.commit(|snapshot| {
            if snapshot.error == error {
                return false;
            }
            snapshot.error = error;
            true
        });
    }

    /// Publish the advisory cached projection. Ignored once an authoritative
    /// result is in.
    pub fn set_cached_identity(&self, cached: Option<CachedIdentityProjection>) -> bool {
        self.commit(|snapshot| {
            if snapshot.status == BootStatus::Ready || snapshot.identity.is_some() {
                return false;
            }
            snapshot.cached_identity = cached;
            true
        })
    }

    /// Apply `mutate`; if it reports a change, queue the new snapshot and
    /// deliver queued snapshots unless another caller already is.
    fn commit(&self, mutate: impl FnOnce(&mut SessionSnapshot) -> bool) -> bool {
        {
            let mut inner = self.lock();
            if !mutate(&mut inner.snapshot) {
                return false;
            }
            let committed = inner.snapshot.clone();
            inner.pending.push_back(committed);
            self.changes.send_modify(|version| *version += 1);
            if inner.delivering {
                return true;
            }
            inner.delivering = true;
        }
        self.deliver();
        true
    }

    fn deliver(&self) {
        loop {
            let (snapshot, subscribers) = {
                let mut inner = self.lock();
                match inner.pending.pop_front() {
                    Some(snapshot) => {
                        let subscribers: Vec<Subscriber> =
                            inner.subscribers.iter().map(|(_, s)| Arc::clone(s)).collect();
                        (snapshot, subscribers)
                    }
                    None => {
                        inner.delivering = false;
                        return;
                    }
                }
            };
            for subscriber in subscribers {
                subscriber(&snapshot);
            }
        }
    }
}
