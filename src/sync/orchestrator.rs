//! Background sync orchestration.
//!
//! One accepted sync per user at a time: acceptance is a compare-and-swap on
//! the status store, the work itself runs on its own tokio task, and every
//! exit path (success, error, panic, deadline) funnels through one
//! finalization step that clears `sync_in_progress` and notifies the user.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::error::SyncError;
use crate::notify::Notifier;
use crate::store::{SyncStatusStore, TaskCacheEntry, TaskCacheStore, UserKey};
use crate::tracker::{CachedTrackerClient, StateGroup};

/// What a finished sync pass gathered.
struct SyncReport {
  total_tasks: usize,
  skipped_projects: Vec<String>,
}

#[derive(Clone)]
pub struct SyncOrchestrator {
  client: Arc<CachedTrackerClient>,
  status: Arc<dyn SyncStatusStore>,
  tasks: Arc<dyn TaskCacheStore>,
  notifier: Arc<dyn Notifier>,
  deadline: Duration,
}

impl SyncOrchestrator {
  pub fn new(
    client: Arc<CachedTrackerClient>,
    status: Arc<dyn SyncStatusStore>,
    tasks: Arc<dyn TaskCacheStore>,
    notifier: Arc<dyn Notifier>,
    deadline: Duration,
  ) -> Self {
    Self {
      client,
      status,
      tasks,
      notifier,
      deadline,
    }
  }

  /// Request a background sync for a user.
  ///
  /// Returns `Ok(false)` without spawning anything when a sync for this user
  /// is already in flight; repeated triggers are safe. On `Ok(true)` the
  /// sync runs on its own task and reports through the status store and the
  /// notifier.
  pub async fn request_sync(&self, user: &UserKey) -> Result<bool, SyncError> {
    if !self.status.begin_sync(user, Utc::now())? {
      info!(chat_id = user.chat_id, "sync already in progress, ignoring trigger");
      return Ok(false);
    }

    info!(chat_id = user.chat_id, email = %user.email, "sync accepted");
    self
      .notifier
      .notify(user, "Sync started, fetching your tasks from the tracker.")
      .await;

    let this = self.clone();
    let user = user.clone();
    tokio::spawn(async move {
      // catch_unwind keeps a panicking sync body from leaving the
      // in-progress flag set forever.
      let outcome = std::panic::AssertUnwindSafe(this.run_sync(&user))
        .catch_unwind()
        .await;
      this.finalize(&user, outcome).await;
    });

    Ok(true)
  }

  async fn finalize(
    &self,
    user: &UserKey,
    outcome: std::result::Result<Result<SyncReport, SyncError>, Box<dyn std::any::Any + Send>>,
  ) {
    match outcome {
      Ok(Ok(report)) => {
        info!(
          chat_id = user.chat_id,
          total = report.total_tasks,
          skipped = report.skipped_projects.len(),
          "sync completed"
        );
        if let Err(e) = self
          .status
          .complete_sync(user.chat_id, Utc::now(), report.total_tasks as i64)
        {
          error!(chat_id = user.chat_id, error = %e, "failed to record sync completion");
        }
        self
          .notifier
          .notify(user, &completion_message(&report))
          .await;
      }
      Ok(Err(e)) => {
        let reason = e.user_message();
        warn!(chat_id = user.chat_id, error = %e, "sync failed");
        if let Err(store_err) = self.status.fail_sync(user.chat_id, &reason) {
          error!(chat_id = user.chat_id, error = %store_err, "failed to record sync failure");
        }
        self
          .notifier
          .notify(user, &format!("Sync failed: {}.", reason))
          .await;
      }
      Err(_panic) => {
        error!(chat_id = user.chat_id, "sync task panicked");
        let reason = "internal error: sync crashed";
        if let Err(store_err) = self.status.fail_sync(user.chat_id, reason) {
          error!(chat_id = user.chat_id, error = %store_err, "failed to record sync panic");
        }
        self
          .notifier
          .notify(user, &format!("Sync failed: {}.", reason))
          .await;
      }
    }
  }

  /// One complete sync pass. The previous task snapshot is only touched on
  /// success; every error return leaves it as it was.
  async fn run_sync(&self, user: &UserKey) -> Result<SyncReport, SyncError> {
    let deadline = Instant::now() + self.deadline;

    let projects = self.client.projects().await?;
    info!(
      chat_id = user.chat_id,
      projects = projects.len(),
      "resolving identity across projects"
    );

    let identity = self
      .client
      .resolve_user_across_projects(&user.email, &projects)
      .await?;

    // Projects whose membership fetch failed were never scanned; their
    // tasks are missing from this pass, so they count as skipped.
    let mut skipped = identity.failed_projects.clone();

    // Keep the order the tracker returned.
    let resolved: Vec<_> = projects
      .iter()
      .filter(|p| identity.member_ids.contains_key(&p.id))
      .collect();

    let synced_at = Utc::now();
    let mut entries: Vec<TaskCacheEntry> = Vec::new();
    let mut attempted = 0usize;
    let mut fetch_failures = 0usize;
    let mut deadline_hit = false;
    let mut last_error: Option<SyncError> = None;

    for (idx, project) in resolved.iter().enumerate() {
      if Instant::now() >= deadline {
        deadline_hit = true;
        skipped.extend(resolved[idx..].iter().map(|p| p.name.clone()));
        warn!(
          chat_id = user.chat_id,
          remaining = resolved.len() - idx,
          "sync deadline reached, abandoning remaining projects"
        );
        break;
      }

      let member_id = &identity.member_ids[&project.id];
      attempted += 1;

      let result = self
        .sync_project_tasks(user.chat_id, &project.id, member_id, synced_at)
        .await;

      match result {
        Ok(mut project_entries) => entries.append(&mut project_entries),
        Err(e) => {
          warn!(
            chat_id = user.chat_id,
            project = %project.name,
            error = %e,
            "project fetch failed, continuing with remaining projects"
          );
          fetch_failures += 1;
          skipped.push(project.name.clone());
          last_error = Some(e);
        }
      }
    }

    // Nothing fetched at all is a failed sync, not an empty success.
    if attempted > 0 && fetch_failures == attempted {
      return Err(
        last_error
          .unwrap_or_else(|| SyncError::TransientNetwork("all projects unreachable".to_string())),
      );
    }
    if attempted == 0 && deadline_hit {
      return Err(SyncError::TransientNetwork(
        "sync deadline exceeded".to_string(),
      ));
    }

    self.tasks.replace(user.chat_id, &entries)?;

    Ok(SyncReport {
      total_tasks: entries.len(),
      skipped_projects: skipped,
    })
  }

  /// Fetch one project's open issues for the user as task entries.
  async fn sync_project_tasks(
    &self,
    chat_id: i64,
    project_id: &str,
    member_id: &str,
    synced_at: chrono::DateTime<Utc>,
  ) -> Result<Vec<TaskCacheEntry>, SyncError> {
    let states = self.client.states(project_id).await?;
    let issues = self.client.issues_for_user(project_id, member_id).await?;

    let refreshed_states;
    let mut groups: HashMap<&str, StateGroup> = states
      .iter()
      .map(|s| (s.state_id.as_str(), s.group))
      .collect();

    // A state created since the metadata was cached won't be in the map;
    // refresh once before classifying against it.
    if issues.iter().any(|i| !groups.contains_key(i.state_id.as_str())) {
      self.client.invalidate_project(project_id);
      refreshed_states = self.client.states(project_id).await?;
      groups = refreshed_states
        .iter()
        .map(|s| (s.state_id.as_str(), s.group))
        .collect();
    }

    Ok(
      issues
        .into_iter()
        .filter_map(|issue| {
          let group = groups
            .get(issue.state_id.as_str())
            .copied()
            .unwrap_or(StateGroup::Unstarted);
          if group.is_closed() {
            return None;
          }
          Some(TaskCacheEntry {
            chat_id,
            task_id: issue.id,
            project_id: issue.project_id,
            title: issue.title,
            state_group: group,
            priority: issue.priority,
            url: issue.url,
            synced_at,
          })
        })
        .collect(),
    )
  }
}

fn completion_message(report: &SyncReport) -> String {
  if report.skipped_projects.is_empty() {
    format!("Sync complete: {} tasks found.", report.total_tasks)
  } else {
    format!(
      "Sync complete: {} tasks found, {} project(s) skipped.",
      report.total_tasks,
      report.skipped_projects.len()
    )
  }
}
