//! `tradelink-session`
//!
//! **Responsibility:** Client-side session bootstrap and authorization gate.
//!
//! This crate provides:
//! - A deadline-bounded boot sequence that derives the authoritative identity
//!   from the identity provider
//! - A versioned, advisory identity cache and a stale provider-token sweeper
//! - A single-writer published state with synchronous subscribers
//! - Route guarding and an inactivity sign-out timer
//!
//! Authorization decisions themselves live in `tradelink-auth`; this crate
//! only feeds them the published identity.

pub mod bootstrap;
pub mod cache;
pub mod config;
pub mod facade;
pub mod guard;
pub mod inactivity;
pub mod provider;
pub mod sqlite_store;
pub mod state;
pub mod store;
pub mod sweeper;

pub use bootstrap::Bootstrapper;
pub use cache::{CACHE_SCHEMA_VERSION, CachedIdentityProjection, IdentityCache};
pub use config::SessionConfig;
pub use facade::SessionFacade;
pub use guard::{GuardDecision, RouteGuard};
pub use inactivity::{ActivityEvent, InactivityMonitor};
pub use provider::{AuthEvent, IdentityProvider, ProfileResolver, SignIn};
pub use sqlite_store::SqliteStore;
pub use state::{BootOutcome, BootState, BootStatus, SessionSnapshot, SessionStore, SubscriberId};
pub use store::{KeyValueStore, MemoryStore, StoreError};
pub use sweeper::TokenSweeper;
