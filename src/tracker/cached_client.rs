//! Cached tracker client that wraps [`TrackerClient`] with tiered caching.
//!
//! Project lists live in the long tier, per-project members and workflow
//! states in the medium tier. Issue queries always go upstream: they are
//! consumed straight into a user's task snapshot and never cached here.

use std::collections::HashMap;

use tracing::warn;

use crate::cache::TtlCache;
use crate::config::CacheConfig;
use crate::error::SyncError;

use super::client::TrackerClient;
use super::types::{Issue, Project, ProjectMembership, WorkflowState};

/// Outcome of resolving an email across projects.
///
/// `member_ids` maps project id to the member id matching the email.
/// Projects whose membership fetch failed are listed separately; they were
/// skipped, not scanned.
pub struct IdentityMap {
  pub member_ids: HashMap<String, String>,
  pub failed_projects: Vec<String>,
}

pub struct CachedTrackerClient {
  inner: TrackerClient,
  projects: TtlCache<(), Vec<Project>>,
  members: TtlCache<String, Vec<ProjectMembership>>,
  states: TtlCache<String, Vec<WorkflowState>>,
}

impl CachedTrackerClient {
  pub fn new(inner: TrackerClient, cache: &CacheConfig) -> Self {
    Self {
      inner,
      projects: TtlCache::new(cache.project_ttl()),
      members: TtlCache::new(cache.metadata_ttl()),
      states: TtlCache::new(cache.metadata_ttl()),
    }
  }

  /// Workspace projects, from cache when fresh.
  pub async fn projects(&self) -> Result<Vec<Project>, SyncError> {
    self
      .projects
      .get_or_fetch((), || self.inner.list_projects())
      .await
  }

  /// A project's members, from cache when fresh.
  pub async fn members(&self, project_id: &str) -> Result<Vec<ProjectMembership>, SyncError> {
    self
      .members
      .get_or_fetch(project_id.to_string(), || {
        self.inner.list_members(project_id)
      })
      .await
  }

  /// A project's workflow states, from cache when fresh.
  pub async fn states(&self, project_id: &str) -> Result<Vec<WorkflowState>, SyncError> {
    self
      .states
      .get_or_fetch(project_id.to_string(), || self.inner.list_states(project_id))
      .await
  }

  /// A project's issues for one member (never cached).
  pub async fn issues_for_user(
    &self,
    project_id: &str,
    member_id: &str,
  ) -> Result<Vec<Issue>, SyncError> {
    self.inner.list_issues_for_user(project_id, member_id).await
  }

  /// Find the member id matching `email` in each project.
  ///
  /// The match is case-insensitive and exact. A project whose membership
  /// fetch fails is logged and skipped rather than aborting the scan. An
  /// empty result after scanning every reachable project is
  /// [`SyncError::UserNotFound`], deliberately distinct from a resolved
  /// identity with zero assigned tasks.
  pub async fn resolve_user_across_projects(
    &self,
    email: &str,
    projects: &[Project],
  ) -> Result<IdentityMap, SyncError> {
    let mut member_ids = HashMap::new();
    let mut failed_projects = Vec::new();

    for project in projects {
      match self.members(&project.id).await {
        Ok(memberships) => {
          if let Some(membership) = memberships
            .iter()
            .find(|m| m.email.eq_ignore_ascii_case(email))
          {
            member_ids.insert(project.id.clone(), membership.member_id.clone());
          }
        }
        Err(e) => {
          warn!(
            project = %project.name,
            error = %e,
            "membership fetch failed during identity resolution, skipping project"
          );
          failed_projects.push(project.name.clone());
        }
      }
    }

    if member_ids.is_empty() {
      return Err(SyncError::UserNotFound {
        email: email.to_string(),
      });
    }

    Ok(IdentityMap {
      member_ids,
      failed_projects,
    })
  }

  /// Drop cached members and states for one project.
  pub fn invalidate_project(&self, project_id: &str) {
    self.members.invalidate(&project_id.to_string());
    self.states.invalidate(&project_id.to_string());
  }

  /// Drop everything, including the project list.
  pub fn clear_cache(&self) {
    self.projects.clear();
    self.members.clear();
    self.states.clear();
  }
}
