//! Serde-deserializable types matching tracker API responses.
//!
//! These types are separate from domain types to allow clean deserialization
//! while keeping domain types focused on what the sync engine needs.

use serde::Deserialize;

use super::types::{Issue, Project, ProjectMembership, StateGroup, WorkflowState};

/// Envelope for paginated list endpoints.
#[derive(Debug, Deserialize)]
pub struct ApiPage<T> {
  #[serde(default = "Vec::new")]
  pub results: Vec<T>,
  #[serde(default)]
  pub total: u64,
}

// ============================================================================
// Projects
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiProject {
  pub id: String,
  #[serde(default)]
  pub name: String,
  #[serde(default)]
  pub identifier: String,
  #[serde(rename = "workspace", default)]
  pub workspace_id: String,
}

impl From<ApiProject> for Project {
  fn from(p: ApiProject) -> Self {
    Project {
      id: p.id,
      name: p.name,
      identifier: p.identifier,
      workspace_id: p.workspace_id,
    }
  }
}

// ============================================================================
// Members
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiMemberUser {
  pub id: String,
  #[serde(default)]
  pub email: String,
  #[serde(rename = "display_name", default)]
  pub display_name: String,
}

#[derive(Debug, Deserialize)]
pub struct ApiMember {
  pub member: ApiMemberUser,
}

impl ApiMember {
  pub fn into_membership(self, project_id: &str) -> ProjectMembership {
    ProjectMembership {
      project_id: project_id.to_string(),
      member_id: self.member.id,
      email: self.member.email,
      display_name: self.member.display_name,
    }
  }
}

// ============================================================================
// Workflow states
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiState {
  pub id: String,
  #[serde(default)]
  pub name: String,
  pub group: StateGroup,
}

impl ApiState {
  pub fn into_state(self, project_id: &str) -> WorkflowState {
    WorkflowState {
      project_id: project_id.to_string(),
      state_id: self.id,
      name: self.name,
      group: self.group,
    }
  }
}

// ============================================================================
// Issues
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiIssue {
  pub id: String,
  #[serde(default)]
  pub name: String,
  #[serde(rename = "state", default)]
  pub state_id: String,
  pub priority: Option<String>,
  #[serde(default)]
  pub assignees: Vec<String>,
  #[serde(default)]
  pub url: String,
}

impl ApiIssue {
  pub fn into_issue(self, project_id: &str) -> Issue {
    Issue {
      id: self.id,
      project_id: project_id.to_string(),
      title: self.name,
      state_id: self.state_id,
      priority: self.priority,
      assignee_ids: self.assignees,
      url: self.url,
    }
  }
}
