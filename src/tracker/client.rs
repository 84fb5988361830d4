//! Typed tracker API client.
//!
//! Thin wrappers over [`RateLimitedTransport`]: one method per upstream
//! endpoint, deserializing into the wire types and converting to domain
//! types. Caching lives one layer up in [`super::cached_client`].

use std::sync::Arc;

use url::Url;

use crate::error::SyncError;
use crate::transport::RateLimitedTransport;

use super::api_types::{ApiIssue, ApiMember, ApiPage, ApiProject, ApiState};
use super::types::{Issue, Project, ProjectMembership, WorkflowState};

const PAGE_SIZE: u64 = 100;

#[derive(Clone)]
pub struct TrackerClient {
  transport: Arc<RateLimitedTransport>,
  base_url: Url,
  token: String,
}

impl TrackerClient {
  pub fn new(
    transport: Arc<RateLimitedTransport>,
    base_url: &str,
    token: String,
  ) -> Result<Self, SyncError> {
    // A trailing slash keeps Url::join from eating the last path segment.
    let normalized = if base_url.ends_with('/') {
      base_url.to_string()
    } else {
      format!("{}/", base_url)
    };
    let base_url = Url::parse(&normalized)
      .map_err(|e| SyncError::Config(format!("invalid tracker url {}: {}", base_url, e)))?;

    Ok(Self {
      transport,
      base_url,
      token,
    })
  }

  async fn get_json<T: serde::de::DeserializeOwned>(
    &self,
    path: &str,
    query: &[(&str, String)],
  ) -> Result<T, SyncError> {
    let url = self
      .base_url
      .join(path)
      .map_err(|e| SyncError::Config(format!("invalid endpoint path {}: {}", path, e)))?;

    let request = self
      .transport
      .http()
      .get(url)
      .bearer_auth(&self.token)
      .query(query);

    let response = self.transport.send(request).await?;
    response
      .json::<T>()
      .await
      .map_err(|e| SyncError::BadResponse(format!("failed to decode {}: {}", path, e)))
  }

  /// List all projects in the workspace.
  pub async fn list_projects(&self) -> Result<Vec<Project>, SyncError> {
    let mut all = Vec::new();
    let mut offset = 0u64;

    loop {
      let page: ApiPage<ApiProject> = self
        .get_json(
          "projects",
          &[
            ("offset", offset.to_string()),
            ("limit", PAGE_SIZE.to_string()),
          ],
        )
        .await?;

      let count = page.results.len() as u64;
      all.extend(page.results.into_iter().map(Project::from));

      if count == 0 || offset + count >= page.total {
        break;
      }
      offset += count;
    }

    Ok(all)
  }

  /// List the members of a project.
  pub async fn list_members(&self, project_id: &str) -> Result<Vec<ProjectMembership>, SyncError> {
    let page: ApiPage<ApiMember> = self
      .get_json(&format!("projects/{}/members", project_id), &[])
      .await?;

    Ok(
      page
        .results
        .into_iter()
        .map(|m| m.into_membership(project_id))
        .collect(),
    )
  }

  /// List the workflow states of a project.
  pub async fn list_states(&self, project_id: &str) -> Result<Vec<WorkflowState>, SyncError> {
    let page: ApiPage<ApiState> = self
      .get_json(&format!("projects/{}/states", project_id), &[])
      .await?;

    Ok(
      page
        .results
        .into_iter()
        .map(|s| s.into_state(project_id))
        .collect(),
    )
  }

  /// List a project's issues assigned to the given member.
  ///
  /// The assignee filter is sent server-side; the same filter is re-applied
  /// locally as a guard for servers that ignore the query parameter.
  pub async fn list_issues_for_user(
    &self,
    project_id: &str,
    member_id: &str,
  ) -> Result<Vec<Issue>, SyncError> {
    let path = format!("projects/{}/issues", project_id);
    let mut all = Vec::new();
    let mut offset = 0u64;

    loop {
      let page: ApiPage<ApiIssue> = self
        .get_json(
          &path,
          &[
            ("assignee", member_id.to_string()),
            ("offset", offset.to_string()),
            ("limit", PAGE_SIZE.to_string()),
          ],
        )
        .await?;

      let count = page.results.len() as u64;
      all.extend(
        page
          .results
          .into_iter()
          .map(|i| i.into_issue(project_id))
          .filter(|i| i.assignee_ids.iter().any(|a| a == member_id)),
      );

      if count == 0 || offset + count >= page.total {
        break;
      }
      offset += count;
    }

    Ok(all)
  }
}
