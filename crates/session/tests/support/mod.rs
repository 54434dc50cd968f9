//! Scriptable identity provider / profile resolver doubles.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tradelink_auth::{Identity, ProviderError, Role, Session};
use tradelink_core::UserId;
use tradelink_session::{
    IdentityProvider, KeyValueStore, MemoryStore, ProfileResolver, SessionConfig, SessionFacade,
    SignIn, StoreError,
};

pub const PREFERENCES_KEY: &str = "user-preferences";
pub const TOKEN_KEY: &str = "sb-tradelink-auth-token";

pub fn init_tracing() {
    tradelink_observability::tracing::init_for_tests();
}

pub fn identity(role: Role) -> Identity {
    Identity::new(
        UserId::new(),
        format!("{}@tradelink.test", role.as_str()),
        format!("Test {}", role.as_str()),
        role,
    )
}

pub fn session_for(identity: &Identity) -> Session {
    Session::new(identity.id, "access-token")
        .with_refresh_token("refresh-token")
        .with_expiry(Utc::now() + chrono::Duration::hours(1))
}

/// Store holding one provider token and one unrelated preference.
pub fn seeded_store() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::with_entries([
        (TOKEN_KEY, r#"{"access_token":"stale"}"#),
        (PREFERENCES_KEY, r#"{"theme":"dark"}"#),
    ]))
}

/// One scripted answer, delivered after `delay`.
#[derive(Debug, Clone)]
pub struct Scripted<T> {
    pub delay: Duration,
    pub result: Result<T, ProviderError>,
}

impl<T> Scripted<T> {
    pub fn now(result: Result<T, ProviderError>) -> Self {
        Self {
            delay: Duration::ZERO,
            result,
        }
    }

    pub fn after(delay: Duration, result: Result<T, ProviderError>) -> Self {
        Self { delay, result }
    }
}

async fn play<T: Clone>(
    script: &Mutex<VecDeque<Scripted<T>>>,
    fallback: &Mutex<Scripted<T>>,
) -> Result<T, ProviderError> {
    let next = script.lock().unwrap().pop_front();
    let Scripted { delay, result } = next.unwrap_or_else(|| fallback.lock().unwrap().clone());
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
    result
}

/// Identity provider whose answers are queued by the test. When a queue is
/// empty the fallback answer is used.
pub struct FakeProvider {
    sessions: Mutex<VecDeque<Scripted<Option<Session>>>>,
    session_fallback: Mutex<Scripted<Option<Session>>>,
    sign_ins: Mutex<VecDeque<Scripted<SignIn>>>,
    sign_in_fallback: Mutex<Scripted<SignIn>>,
    refreshes: Mutex<VecDeque<Scripted<Option<Session>>>>,
    refresh_fallback: Mutex<Scripted<Option<Session>>>,
    sign_out_answer: Mutex<Scripted<()>>,
    pub get_session_calls: AtomicUsize,
    pub sign_out_calls: AtomicUsize,
}

impl Default for FakeProvider {
    fn default() -> Self {
        Self {
            sessions: Mutex::new(VecDeque::new()),
            session_fallback: Mutex::new(Scripted::now(Ok(None))),
            sign_ins: Mutex::new(VecDeque::new()),
            sign_in_fallback: Mutex::new(Scripted::now(Err(ProviderError::invalid_credentials()))),
            refreshes: Mutex::new(VecDeque::new()),
            refresh_fallback: Mutex::new(Scripted::now(Ok(None))),
            sign_out_answer: Mutex::new(Scripted::now(Ok(()))),
            get_session_calls: AtomicUsize::new(0),
            sign_out_calls: AtomicUsize::new(0),
        }
    }
}

impl FakeProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn queue_session(&self, answer: Scripted<Option<Session>>) {
        self.sessions.lock().unwrap().push_back(answer);
    }

    pub fn always_session(&self, answer: Scripted<Option<Session>>) {
        *self.session_fallback.lock().unwrap() = answer;
    }

    pub fn queue_sign_in(&self, answer: Scripted<SignIn>) {
        self.sign_ins.lock().unwrap().push_back(answer);
    }

    pub fn queue_refresh(&self, answer: Scripted<Option<Session>>) {
        self.refreshes.lock().unwrap().push_back(answer);
    }

    pub fn sign_out_answer(&self, answer: Scripted<()>) {
        *self.sign_out_answer.lock().unwrap() = answer;
    }

    pub fn get_session_calls(&self) -> usize {
        self.get_session_calls.load(Ordering::SeqCst)
    }

    pub fn sign_out_calls(&self) -> usize {
        self.sign_out_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for FakeProvider {
    async fn get_session(&self) -> Result<Option<Session>, ProviderError> {
        self.get_session_calls.fetch_add(1, Ordering::SeqCst);
        play(&self.sessions, &self.session_fallback).await
    }

    async fn sign_in_with_password(
        &self,
        _email: &str,
        _password: &str,
    ) -> Result<SignIn, ProviderError> {
        play(&self.sign_ins, &self.sign_in_fallback).await
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
        let Scripted { delay, result } = self.sign_out_answer.lock().unwrap().clone();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        result
    }

    async fn refresh_session(&self) -> Result<Option<Session>, ProviderError> {
        play(&self.refreshes, &self.refresh_fallback).await
    }
}

/// Profile resolver backed by a map, with queued failures consumed first.
#[derive(Default)]
pub struct FakeResolver {
    profiles: Mutex<HashMap<UserId, Identity>>,
    failures: Mutex<VecDeque<ProviderError>>,
    pub calls: AtomicUsize,
}

impl FakeResolver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_profile(identity: &Identity) -> Arc<Self> {
        let resolver = Self::new();
        resolver.insert(identity);
        resolver
    }

    pub fn insert(&self, identity: &Identity) {
        self.profiles
            .lock()
            .unwrap()
            .insert(identity.id, identity.clone());
    }

    pub fn fail_next(&self, error: ProviderError) {
        self.failures.lock().unwrap().push_back(error);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProfileResolver for FakeResolver {
    async fn load_profile(&self, subject: &UserId) -> Result<Identity, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        self.profiles
            .lock()
            .unwrap()
            .get(subject)
            .cloned()
            .ok_or_else(ProviderError::profile_not_found)
    }
}

/// Memory store whose writes take `write_delay` to land.
pub struct SlowStore {
    inner: Arc<MemoryStore>,
    write_delay: Duration,
}

impl SlowStore {
    pub fn new(inner: Arc<MemoryStore>, write_delay: Duration) -> Arc<Self> {
        Arc::new(Self { inner, write_delay })
    }
}

#[async_trait]
impl KeyValueStore for SlowStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        tokio::time::sleep(self.write_delay).await;
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.inner.remove(key).await
    }

    async fn keys(&self) -> Result<Vec<String>, StoreError> {
        self.inner.keys().await
    }
}

pub struct Harness {
    pub provider: Arc<FakeProvider>,
    pub resolver: Arc<FakeResolver>,
    pub store: Arc<MemoryStore>,
    pub facade: Arc<SessionFacade>,
}

impl Harness {
    pub fn new(config: SessionConfig) -> Self {
        Self::with_parts(FakeProvider::new(), FakeResolver::new(), seeded_store(), config)
    }

    pub fn with_parts(
        provider: Arc<FakeProvider>,
        resolver: Arc<FakeResolver>,
        store: Arc<MemoryStore>,
        config: SessionConfig,
    ) -> Self {
        let kv: Arc<dyn KeyValueStore> = store.clone();
        Self::over(provider, resolver, store, kv, config)
    }

    /// Like [`Harness::with_parts`] over a seeded store whose writes are slow.
    pub fn with_slow_writes(
        provider: Arc<FakeProvider>,
        resolver: Arc<FakeResolver>,
        write_delay: Duration,
        config: SessionConfig,
    ) -> Self {
        let store = seeded_store();
        let kv: Arc<dyn KeyValueStore> = SlowStore::new(store.clone(), write_delay);
        Self::over(provider, resolver, store, kv, config)
    }

    fn over(
        provider: Arc<FakeProvider>,
        resolver: Arc<FakeResolver>,
        store: Arc<MemoryStore>,
        kv: Arc<dyn KeyValueStore>,
        config: SessionConfig,
    ) -> Self {
        init_tracing();
        let facade = SessionFacade::new(provider.clone(), resolver.clone(), kv, config);
        Self {
            provider,
            resolver,
            store,
            facade,
        }
    }

    pub fn token_present(&self) -> bool {
        self.store.peek(TOKEN_KEY).is_some()
    }
}
