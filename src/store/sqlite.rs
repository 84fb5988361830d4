//! SQLite implementation of the status and task stores.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::SyncError;
use crate::tracker::StateGroup;

use super::{
  SyncStatus, SyncStatusStore, TaskCacheEntry, TaskCacheStore, UserKey, INTERRUPTED_SYNC_ERROR,
};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS sync_status (
    chat_id INTEGER PRIMARY KEY,
    email TEXT NOT NULL DEFAULT '',
    sync_in_progress INTEGER NOT NULL DEFAULT 0,
    last_sync_started_at TEXT,
    last_sync_completed_at TEXT,
    last_sync_error TEXT,
    total_tasks_found INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS task_cache (
    chat_id INTEGER NOT NULL,
    task_id TEXT NOT NULL,
    project_id TEXT NOT NULL,
    title TEXT NOT NULL,
    state_group TEXT NOT NULL,
    priority TEXT,
    url TEXT NOT NULL,
    synced_at TEXT NOT NULL,
    PRIMARY KEY (chat_id, task_id)
);
"#;

pub struct SqliteStore {
  conn: Mutex<Connection>,
  stale_after: chrono::Duration,
}

impl SqliteStore {
  /// Open or create the store at the default location.
  pub fn open(stale_after: chrono::Duration) -> Result<Self, SyncError> {
    Self::open_at(&Self::default_path()?, stale_after)
  }

  /// Open or create the store at an explicit path.
  pub fn open_at(path: &Path, stale_after: chrono::Duration) -> Result<Self, SyncError> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| SyncError::Storage(format!("failed to create store directory: {}", e)))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| SyncError::Storage(format!("failed to open {}: {}", path.display(), e)))?;
    conn.execute_batch(SCHEMA)?;

    Ok(Self {
      conn: Mutex::new(conn),
      stale_after,
    })
  }

  fn default_path() -> Result<PathBuf, SyncError> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| SyncError::Storage("could not determine data directory".to_string()))?;

    Ok(data_dir.join("tasksync").join("tasksync.db"))
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, SyncError> {
    self
      .conn
      .lock()
      .map_err(|_| SyncError::Storage("store lock poisoned".to_string()))
  }
}

fn to_db(ts: DateTime<Utc>) -> String {
  ts.to_rfc3339()
}

fn from_db(s: &str) -> Result<DateTime<Utc>, SyncError> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| SyncError::Storage(format!("bad timestamp '{}': {}", s, e)))
}

impl SyncStatusStore for SqliteStore {
  fn get(&self, chat_id: i64) -> Result<SyncStatus, SyncError> {
    let conn = self.lock()?;

    let row: Option<(i64, String, i64, Option<String>, Option<String>, Option<String>, i64)> =
      conn
        .query_row(
          "SELECT chat_id, email, sync_in_progress, last_sync_started_at,
                  last_sync_completed_at, last_sync_error, total_tasks_found
           FROM sync_status WHERE chat_id = ?",
          params![chat_id],
          |row| {
            Ok((
              row.get(0)?,
              row.get(1)?,
              row.get(2)?,
              row.get(3)?,
              row.get(4)?,
              row.get(5)?,
              row.get(6)?,
            ))
          },
        )
        .optional()?;

    let Some((chat_id, email, in_progress, started, completed, error, total)) = row else {
      return Ok(SyncStatus::empty(chat_id));
    };

    let mut status = SyncStatus {
      chat_id,
      email,
      sync_in_progress: in_progress != 0,
      last_sync_started_at: started.as_deref().map(from_db).transpose()?,
      last_sync_completed_at: completed.as_deref().map(from_db).transpose()?,
      last_sync_error: error,
      total_tasks_found: total,
    };

    // Normalize a row left in progress by a process that died mid-sync.
    if status.sync_in_progress {
      let stale = status
        .last_sync_started_at
        .map(|s| Utc::now() - s > self.stale_after)
        .unwrap_or(true);
      if stale {
        conn.execute(
          "UPDATE sync_status SET sync_in_progress = 0, last_sync_error = ?
           WHERE chat_id = ? AND sync_in_progress = 1",
          params![INTERRUPTED_SYNC_ERROR, chat_id],
        )?;
        status.sync_in_progress = false;
        status.last_sync_error = Some(INTERRUPTED_SYNC_ERROR.to_string());
      }
    }

    Ok(status)
  }

  fn begin_sync(&self, user: &UserKey, started_at: DateTime<Utc>) -> Result<bool, SyncError> {
    let conn = self.lock()?;

    conn.execute(
      "INSERT INTO sync_status (chat_id, email) VALUES (?, ?)
       ON CONFLICT(chat_id) DO UPDATE SET email = excluded.email",
      params![user.chat_id, user.email],
    )?;

    let claimed = conn.execute(
      "UPDATE sync_status SET sync_in_progress = 1, last_sync_started_at = ?
       WHERE chat_id = ? AND sync_in_progress = 0",
      params![to_db(started_at), user.chat_id],
    )?;

    Ok(claimed == 1)
  }

  fn complete_sync(
    &self,
    chat_id: i64,
    completed_at: DateTime<Utc>,
    total_tasks: i64,
  ) -> Result<(), SyncError> {
    let conn = self.lock()?;
    conn.execute(
      "UPDATE sync_status SET sync_in_progress = 0, last_sync_completed_at = ?,
              last_sync_error = NULL, total_tasks_found = ?
       WHERE chat_id = ?",
      params![to_db(completed_at), total_tasks, chat_id],
    )?;
    Ok(())
  }

  fn fail_sync(&self, chat_id: i64, error: &str) -> Result<(), SyncError> {
    let conn = self.lock()?;
    conn.execute(
      "UPDATE sync_status SET sync_in_progress = 0, last_sync_error = ?
       WHERE chat_id = ?",
      params![error, chat_id],
    )?;
    Ok(())
  }

  fn reset_interrupted(&self) -> Result<usize, SyncError> {
    let conn = self.lock()?;
    let cutoff = Utc::now() - self.stale_after;
    let reset = conn.execute(
      "UPDATE sync_status SET sync_in_progress = 0, last_sync_error = ?
       WHERE sync_in_progress = 1
         AND (last_sync_started_at IS NULL OR last_sync_started_at < ?)",
      params![INTERRUPTED_SYNC_ERROR, to_db(cutoff)],
    )?;
    Ok(reset)
  }
}

impl TaskCacheStore for SqliteStore {
  fn tasks(&self, chat_id: i64, max: usize) -> Result<Vec<TaskCacheEntry>, SyncError> {
    let conn = self.lock()?;

    let mut stmt = conn.prepare(
      "SELECT chat_id, task_id, project_id, title, state_group, priority, url, synced_at
       FROM task_cache WHERE chat_id = ? ORDER BY project_id, task_id LIMIT ?",
    )?;

    let rows = stmt.query_map(params![chat_id, max as i64], |row| {
      Ok((
        row.get::<_, i64>(0)?,
        row.get::<_, String>(1)?,
        row.get::<_, String>(2)?,
        row.get::<_, String>(3)?,
        row.get::<_, String>(4)?,
        row.get::<_, Option<String>>(5)?,
        row.get::<_, String>(6)?,
        row.get::<_, String>(7)?,
      ))
    })?;

    let mut entries = Vec::new();
    for row in rows {
      let (chat_id, task_id, project_id, title, group, priority, url, synced_at) = row?;
      let state_group = StateGroup::parse(&group)
        .ok_or_else(|| SyncError::Storage(format!("unknown state group '{}'", group)))?;
      entries.push(TaskCacheEntry {
        chat_id,
        task_id,
        project_id,
        title,
        state_group,
        priority,
        url,
        synced_at: from_db(&synced_at)?,
      });
    }

    Ok(entries)
  }

  fn replace(&self, chat_id: i64, entries: &[TaskCacheEntry]) -> Result<(), SyncError> {
    let mut conn = self.lock()?;
    let tx = conn
      .transaction()
      .map_err(|e| SyncError::Storage(format!("failed to begin transaction: {}", e)))?;

    tx.execute("DELETE FROM task_cache WHERE chat_id = ?", params![chat_id])?;
    for entry in entries {
      tx.execute(
        "INSERT INTO task_cache
           (chat_id, task_id, project_id, title, state_group, priority, url, synced_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        params![
          chat_id,
          entry.task_id,
          entry.project_id,
          entry.title,
          entry.state_group.as_str(),
          entry.priority,
          entry.url,
          to_db(entry.synced_at),
        ],
      )?;
    }

    tx.commit()
      .map_err(|e| SyncError::Storage(format!("failed to commit snapshot: {}", e)))?;
    Ok(())
  }
}
