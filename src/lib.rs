//! Rate-limited background synchronization of tracker-assigned tasks.
//!
//! The engine pulls a user's assigned work items from an upstream project
//! tracker under a strict API rate limit and serves them from a local task
//! cache, so the interactive layer never blocks on slow upstream calls.
//!
//! Layering, leaf-first:
//! - [`transport`]: rate-limited, retrying HTTP with explicit timeouts
//! - [`tracker`]: typed client for the tracker API, plus a cached wrapper
//! - [`cache`]: TTL tiers with single-flight fetching
//! - [`store`]: per-user sync status and task snapshot persistence
//! - [`sync`]: the background orchestrator
//! - [`engine`]: the facade the interactive layer talks to

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod notify;
pub mod store;
pub mod sync;
pub mod tracker;
pub mod transport;

pub use config::Config;
pub use engine::SyncEngine;
pub use error::SyncError;
pub use notify::{LogNotifier, Notifier};
pub use store::{SyncStatus, TaskCacheEntry, UserKey};
