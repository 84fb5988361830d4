//! Sync status and task cache stores.
//!
//! Both stores are keyed by chat identity. The interactive layer reads them
//! to decide between showing cached tasks, a "still syncing" message, or
//! triggering a new sync; only the orchestrator writes them. Backends are
//! pluggable behind the two traits: SQLite for the worker binary, in-memory
//! for tests and ephemeral deployments.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use chrono::{DateTime, Utc};

use crate::error::SyncError;
use crate::tracker::StateGroup;

/// Identity of one bot user: the chat id keys all storage, the email drives
/// identity resolution against the tracker.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserKey {
  pub chat_id: i64,
  pub email: String,
}

impl UserKey {
  pub fn new(chat_id: i64, email: impl Into<String>) -> Self {
    Self {
      chat_id,
      email: email.into(),
    }
  }
}

/// One row of a user's synced task snapshot.
#[derive(Debug, Clone)]
pub struct TaskCacheEntry {
  pub chat_id: i64,
  pub task_id: String,
  pub project_id: String,
  pub title: String,
  pub state_group: StateGroup,
  pub priority: Option<String>,
  pub url: String,
  pub synced_at: DateTime<Utc>,
}

/// Lifecycle record of a user's syncs. One row per user, never deleted.
#[derive(Debug, Clone)]
pub struct SyncStatus {
  pub chat_id: i64,
  pub email: String,
  pub sync_in_progress: bool,
  pub last_sync_started_at: Option<DateTime<Utc>>,
  pub last_sync_completed_at: Option<DateTime<Utc>>,
  pub last_sync_error: Option<String>,
  pub total_tasks_found: i64,
}

impl SyncStatus {
  /// Status for a user who has never synced.
  pub fn empty(chat_id: i64) -> Self {
    Self {
      chat_id,
      email: String::new(),
      sync_in_progress: false,
      last_sync_started_at: None,
      last_sync_completed_at: None,
      last_sync_error: None,
      total_tasks_found: 0,
    }
  }
}

/// Error recorded when a stale in-progress row from a dead process is reset.
pub const INTERRUPTED_SYNC_ERROR: &str = "sync interrupted";

/// Persistence of per-user sync lifecycle records.
pub trait SyncStatusStore: Send + Sync {
  /// Current status for a user. A row stuck `sync_in_progress` longer than
  /// the store's stale threshold is normalized to not-in-progress with
  /// [`INTERRUPTED_SYNC_ERROR`] before being returned.
  fn get(&self, chat_id: i64) -> Result<SyncStatus, SyncError>;

  /// Atomically claim the in-progress flag for a user. Returns `false`
  /// without side effects when a sync is already in flight.
  fn begin_sync(&self, user: &UserKey, started_at: DateTime<Utc>) -> Result<bool, SyncError>;

  /// Record a successful (possibly degraded) sync.
  fn complete_sync(
    &self,
    chat_id: i64,
    completed_at: DateTime<Utc>,
    total_tasks: i64,
  ) -> Result<(), SyncError>;

  /// Record a failed sync. The previous completion timestamp and task count
  /// are kept as the audit trail of the last good outcome.
  fn fail_sync(&self, chat_id: i64, error: &str) -> Result<(), SyncError>;

  /// Reset every row stuck in progress past the stale threshold. Returns
  /// how many rows were reset. Run once at startup; `get` applies the same
  /// normalization lazily.
  fn reset_interrupted(&self) -> Result<usize, SyncError>;
}

/// Persistence of per-user task snapshots.
pub trait TaskCacheStore: Send + Sync {
  /// Up to `max` entries of the user's latest snapshot.
  fn tasks(&self, chat_id: i64, max: usize) -> Result<Vec<TaskCacheEntry>, SyncError>;

  /// Replace the user's snapshot wholesale. Readers see the old snapshot or
  /// the new one, never a mix.
  fn replace(&self, chat_id: i64, entries: &[TaskCacheEntry]) -> Result<(), SyncError>;
}
