//! Core domain logic for ShareMemo.
//! This crate is the single source of truth for pairing, memo resolution
//! and live sync invariants.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod model;
pub mod service;
pub mod store;
pub mod sync;

pub use auth::{IdentityProvider, SessionIdentityProvider};
pub use config::{ConfigError, CoreConfig};
pub use error::{CoreError, CoreResult};
pub use logging::{default_log_level, init_logging, init_logging_from_config, logging_status};
pub use model::identity::Identity;
pub use model::memo::{MemoId, SharedDocument};
pub use model::profile::Profile;
pub use model::relationship::Relationship;
pub use service::hydrator::{DetailHydrator, HydratedRecord};
pub use service::memo_resolver::MemoResolver;
pub use service::profile_service::ProfileService;
pub use service::relationship_service::RelationshipService;
pub use store::{DocumentStore, SqliteDocumentStore, StoreError, StoreResult};
pub use sync::{LiveSyncEngine, MemoSession, SessionState};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
