use serde::{Deserialize, Serialize};

/// A project in the tracker workspace
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
  pub id: String,
  pub name: String,
  pub identifier: String,
  pub workspace_id: String,
}

/// One member of a project, used only to resolve an email to a member id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectMembership {
  pub project_id: String,
  pub member_id: String,
  pub email: String,
  pub display_name: String,
}

/// Lifecycle bucket a workflow state belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateGroup {
  Backlog,
  Unstarted,
  Started,
  Completed,
  Cancelled,
}

impl StateGroup {
  /// Completed and cancelled issues are never shown as active tasks
  pub fn is_closed(self) -> bool {
    matches!(self, StateGroup::Completed | StateGroup::Cancelled)
  }

  pub fn as_str(self) -> &'static str {
    match self {
      StateGroup::Backlog => "backlog",
      StateGroup::Unstarted => "unstarted",
      StateGroup::Started => "started",
      StateGroup::Completed => "completed",
      StateGroup::Cancelled => "cancelled",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "backlog" => Some(StateGroup::Backlog),
      "unstarted" => Some(StateGroup::Unstarted),
      "started" => Some(StateGroup::Started),
      "completed" => Some(StateGroup::Completed),
      "cancelled" => Some(StateGroup::Cancelled),
      _ => None,
    }
  }
}

/// A workflow state within one project
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowState {
  pub project_id: String,
  pub state_id: String,
  pub name: String,
  pub group: StateGroup,
}

/// A raw issue as returned by the tracker; consumed into a task snapshot
/// during a sync pass, never cached on its own
#[derive(Debug, Clone)]
pub struct Issue {
  pub id: String,
  pub project_id: String,
  pub title: String,
  pub state_id: String,
  pub priority: Option<String>,
  pub assignee_ids: Vec<String>,
  pub url: String,
}
