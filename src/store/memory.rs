//! In-memory store, used in tests and by deployments that opt out of
//! durability. Same semantics as the SQLite backend, including stale-row
//! normalization.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use crate::error::SyncError;

use super::{
  SyncStatus, SyncStatusStore, TaskCacheEntry, TaskCacheStore, UserKey, INTERRUPTED_SYNC_ERROR,
};

pub struct MemoryStore {
  stale_after: chrono::Duration,
  status: Mutex<HashMap<i64, SyncStatus>>,
  tasks: Mutex<HashMap<i64, Vec<TaskCacheEntry>>>,
}

impl MemoryStore {
  pub fn new(stale_after: chrono::Duration) -> Self {
    Self {
      stale_after,
      status: Mutex::new(HashMap::new()),
      tasks: Mutex::new(HashMap::new()),
    }
  }
}

impl SyncStatusStore for MemoryStore {
  fn get(&self, chat_id: i64) -> Result<SyncStatus, SyncError> {
    let mut map = self.status.lock().map_err(|_| SyncError::Storage("status lock poisoned".to_string()))?;
    let Some(status) = map.get_mut(&chat_id) else {
      return Ok(SyncStatus::empty(chat_id));
    };

    if status.sync_in_progress {
      let stale = status
        .last_sync_started_at
        .map(|s| Utc::now() - s > self.stale_after)
        .unwrap_or(true);
      if stale {
        status.sync_in_progress = false;
        status.last_sync_error = Some(INTERRUPTED_SYNC_ERROR.to_string());
      }
    }

    Ok(status.clone())
  }

  fn begin_sync(&self, user: &UserKey, started_at: DateTime<Utc>) -> Result<bool, SyncError> {
    let mut map = self.status.lock().map_err(|_| SyncError::Storage("status lock poisoned".to_string()))?;
    let status = map
      .entry(user.chat_id)
      .or_insert_with(|| SyncStatus::empty(user.chat_id));
    status.email = user.email.clone();

    if status.sync_in_progress {
      return Ok(false);
    }

    status.sync_in_progress = true;
    status.last_sync_started_at = Some(started_at);
    Ok(true)
  }

  fn complete_sync(
    &self,
    chat_id: i64,
    completed_at: DateTime<Utc>,
    total_tasks: i64,
  ) -> Result<(), SyncError> {
    let mut map = self.status.lock().map_err(|_| SyncError::Storage("status lock poisoned".to_string()))?;
    if let Some(status) = map.get_mut(&chat_id) {
      status.sync_in_progress = false;
      status.last_sync_completed_at = Some(completed_at);
      status.last_sync_error = None;
      status.total_tasks_found = total_tasks;
    }
    Ok(())
  }

  fn fail_sync(&self, chat_id: i64, error: &str) -> Result<(), SyncError> {
    let mut map = self.status.lock().map_err(|_| SyncError::Storage("status lock poisoned".to_string()))?;
    if let Some(status) = map.get_mut(&chat_id) {
      status.sync_in_progress = false;
      status.last_sync_error = Some(error.to_string());
    }
    Ok(())
  }

  fn reset_interrupted(&self) -> Result<usize, SyncError> {
    let mut map = self.status.lock().map_err(|_| SyncError::Storage("status lock poisoned".to_string()))?;
    let cutoff = Utc::now() - self.stale_after;
    let mut reset = 0;

    for status in map.values_mut() {
      if status.sync_in_progress
        && status
          .last_sync_started_at
          .map(|s| s < cutoff)
          .unwrap_or(true)
      {
        status.sync_in_progress = false;
        status.last_sync_error = Some(INTERRUPTED_SYNC_ERROR.to_string());
        reset += 1;
      }
    }

    Ok(reset)
  }
}

impl TaskCacheStore for MemoryStore {
  fn tasks(&self, chat_id: i64, max: usize) -> Result<Vec<TaskCacheEntry>, SyncError> {
    let map = self.tasks.lock().map_err(|_| SyncError::Storage("task lock poisoned".to_string()))?;
    Ok(
      map
        .get(&chat_id)
        .map(|entries| entries.iter().take(max).cloned().collect())
        .unwrap_or_default(),
    )
  }

  fn replace(&self, chat_id: i64, entries: &[TaskCacheEntry]) -> Result<(), SyncError> {
    let mut map = self.tasks.lock().map_err(|_| SyncError::Storage("task lock poisoned".to_string()))?;
    map.insert(chat_id, entries.to_vec());
    Ok(())
  }
}
