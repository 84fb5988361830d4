//! Engine facade: wires the transport, client, cache, stores and
//! orchestrator together and exposes the three calls the interactive layer
//! consumes.

use std::sync::Arc;

use tracing::info;

use crate::config::Config;
use crate::error::SyncError;
use crate::notify::Notifier;
use crate::store::{
  SqliteStore, SyncStatus, SyncStatusStore, TaskCacheEntry, TaskCacheStore, UserKey,
};
use crate::sync::SyncOrchestrator;
use crate::tracker::{CachedTrackerClient, TrackerClient};
use crate::transport::{RateLimitedTransport, TransportConfig};

pub struct SyncEngine {
  orchestrator: SyncOrchestrator,
  status: Arc<dyn SyncStatusStore>,
  tasks: Arc<dyn TaskCacheStore>,
}

impl SyncEngine {
  /// Build the full engine from configuration, backed by the SQLite store at
  /// its default location. Stale in-progress rows from a previous process
  /// are reset before the engine is handed out.
  pub fn new(config: &Config, token: String, notifier: Arc<dyn Notifier>) -> Result<Self, SyncError> {
    let store = Arc::new(SqliteStore::open(config.sync.stale_sync())?);
    let reset = store.reset_interrupted()?;
    if reset > 0 {
      info!(reset, "reset interrupted syncs from a previous run");
    }

    Self::with_stores(config, token, store.clone(), store, notifier)
  }

  /// Build the engine against explicit store backends.
  pub fn with_stores(
    config: &Config,
    token: String,
    status: Arc<dyn SyncStatusStore>,
    tasks: Arc<dyn TaskCacheStore>,
    notifier: Arc<dyn Notifier>,
  ) -> Result<Self, SyncError> {
    let transport = Arc::new(RateLimitedTransport::new(TransportConfig {
      min_interval: config.tracker.min_interval(),
      low_water_mark: config.tracker.low_water_mark,
      max_retries: config.tracker.max_retries,
      request_timeout: config.tracker.request_timeout(),
    })?);

    let client = TrackerClient::new(transport, &config.tracker.url, token)?;
    let cached = Arc::new(CachedTrackerClient::new(client, &config.cache));

    let orchestrator = SyncOrchestrator::new(
      cached,
      status.clone(),
      tasks.clone(),
      notifier,
      config.sync.deadline(),
    );

    Ok(Self {
      orchestrator,
      status,
      tasks,
    })
  }

  /// Up to `max` entries of the user's latest synced snapshot. Read-only,
  /// never triggers a sync.
  pub fn cached_tasks(&self, chat_id: i64, max: usize) -> Result<Vec<TaskCacheEntry>, SyncError> {
    self.tasks.tasks(chat_id, max)
  }

  /// The user's sync lifecycle record. Read-only; stale in-progress rows
  /// are normalized on the way out.
  pub fn sync_status(&self, chat_id: i64) -> Result<SyncStatus, SyncError> {
    self.status.get(chat_id)
  }

  /// Trigger a background sync. Returns `false` when one is already
  /// running for this user.
  pub async fn request_sync(&self, user: &UserKey) -> Result<bool, SyncError> {
    self.orchestrator.request_sync(user).await
  }
}
