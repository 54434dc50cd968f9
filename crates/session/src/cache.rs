//! Persistent Identity Cache.
//!
//! Stores a minimal, non-sensitive projection of the signed-in identity under
//! a single versioned key so the shell can paint a plausible UI before the
//! authoritative boot check finishes. The projection is advisory only and is
//! never trusted as proof of authentication.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tradelink_auth::{Identity, Role};
use tradelink_core::UserId;

use crate::state::SessionStore;
use crate::store::{KeyValueStore, StoreError};

/// Current on-disk schema version of the cache envelope.
pub const CACHE_SCHEMA_VERSION: u32 = 3;

/// Fields older schemas persisted that must never survive a migration.
const SESSION_SHAPED_FIELDS: [&str; 4] = ["session", "bootStatus", "error", "bootError"];

/// The persisted subset of [`Identity`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedIdentityProjection {
    pub id: UserId,
    pub email: String,
    pub name: String,
    pub role: Role,
    #[serde(alias = "isActive")]
    pub active: bool,
}

impl From<&Identity> for CachedIdentityProjection {
    fn from(identity: &Identity) -> Self {
        Self {
            id: identity.id,
            email: identity.email.clone(),
            name: identity.name.clone(),
            role: identity.role,
            active: identity.active,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    version: u32,
    state: PersistedState,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedState {
    #[serde(default)]
    user: Option<Value>,
    /// Anything else an older writer left next to `user`.
    #[serde(flatten)]
    extra: Map<String, Value>,
}

/// Versioned identity cache over a [`KeyValueStore`].
#[derive(Clone)]
pub struct IdentityCache {
    store: Arc<dyn KeyValueStore>,
    key: String,
    /// Shared by clones; serialises [`sync_to`](Self::sync_to) writes.
    write_lock: Arc<Mutex<()>>,
}

impl core::fmt::Debug for IdentityCache {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("IdentityCache").field("key", &self.key).finish()
    }
}

impl IdentityCache {
    pub fn new(store: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Load the cached projection.
    ///
    /// Missing, corrupt, or newer-than-supported entries read as `None`.
    /// Entries from an older schema are migrated (session-shaped fields are
    /// dropped) and rewritten at [`CACHE_SCHEMA_VERSION`] before returning.
    pub async fn load(&self) -> Result<Option<CachedIdentityProjection>, StoreError> {
        let Some(raw) = self.store.get(&self.key).await? else {
            return Ok(None);
        };

        let mut envelope: Envelope = match serde_json::from_str(&raw) {
            Ok(envelope) => envelope,
            Err(err) => {
                tracing::warn!(key = %self.key, error = %err, "ignoring corrupt identity cache entry");
                return Ok(None);
            }
        };

        if envelope.version > CACHE_SCHEMA_VERSION {
            tracing::warn!(
                key = %self.key,
                stored = envelope.version,
                supported = CACHE_SCHEMA_VERSION,
                "identity cache written by a newer client; ignoring"
            );
            return Ok(None);
        }

        if envelope.version < CACHE_SCHEMA_VERSION {
            tracing::info!(
                key = %self.key,
                from = envelope.version,
                to = CACHE_SCHEMA_VERSION,
                "migrating identity cache"
            );
            migrate(&mut envelope);
            let rewritten = serde_json::to_string(&envelope)
                .map_err(|err| StoreError::Backend(err.to_string()))?;
            self.store.set(&self.key, &rewritten).await?;
        }

        let Some(user) = envelope.state.user.filter(|u| !u.is_null()) else {
            return Ok(None);
        };
        match serde_json::from_value::<CachedIdentityProjection>(user) {
            Ok(projection) => Ok(Some(projection)),
            Err(err) => {
                tracing::warn!(key = %self.key, error = %err, "ignoring malformed cached identity");
                Ok(None)
            }
        }
    }

    /// Persist the projection of `identity`. Session material is never written.
    pub async fn save(&self, identity: &Identity) -> Result<(), StoreError> {
        let projection = CachedIdentityProjection::from(identity);
        let envelope = Envelope {
            version: CACHE_SCHEMA_VERSION,
            state: PersistedState {
                user: Some(
                    serde_json::to_value(&projection)
                        .map_err(|err| StoreError::Backend(err.to_string()))?,
                ),
                extra: Map::new(),
            },
        };
        let raw =
            serde_json::to_string(&envelope).map_err(|err| StoreError::Backend(err.to_string()))?;
        self.store.set(&self.key, &raw).await
    }

    pub async fn clear(&self) -> Result<(), StoreError> {
        self.store.remove(&self.key).await
    }

    /// Make the cache match the identity `state` holds right now: save its
    /// projection, or clear the entry when nobody is signed in.
    ///
    /// Syncs run one at a time and read the state only once they hold the
    /// lock, so the last sync to finish always reflects the latest identity.
    /// A slow save that started before a logout cannot land after it.
    pub async fn sync_to(&self, state: &SessionStore) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        match state.snapshot().identity {
            Some(identity) => self.save(&identity).await,
            None => self.clear().await,
        }
    }
}

fn migrate(envelope: &mut Envelope) {
    for field in SESSION_SHAPED_FIELDS {
        envelope.state.extra.remove(field);
    }
    envelope.version = CACHE_SCHEMA_VERSION;
}
