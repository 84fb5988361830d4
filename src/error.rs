//! Error taxonomy for the sync engine.
//!
//! The interactive layer never sees these directly. Terminal failures are
//! flattened into `SyncStatus.last_sync_error` as one of three canonical
//! user-facing reasons (auth, unknown account, network).

use thiserror::Error;

/// Errors produced by the sync engine.
#[derive(Debug, Error)]
pub enum SyncError {
  /// Upstream rejected our credentials (401/403). Never retried.
  #[error("authentication rejected by tracker: {0}")]
  Auth(String),

  /// Network or timeout failure that survived the transport's retry budget.
  #[error("network failure after retries: {0}")]
  TransientNetwork(String),

  /// The user's email matched no member in any accessible project.
  /// Distinct from "member everywhere but zero tasks assigned".
  #[error("no tracker account found for {email}")]
  UserNotFound { email: String },

  /// Upstream answered but with a payload we could not interpret.
  #[error("unexpected tracker response: {0}")]
  BadResponse(String),

  /// Local store failure (SQLite or backend-specific).
  #[error("storage error: {0}")]
  Storage(String),

  /// Invalid or missing configuration.
  #[error("configuration error: {0}")]
  Config(String),
}

impl SyncError {
  /// The short canonical reason shown to end users in sync notifications
  /// and recorded in `SyncStatus.last_sync_error`.
  pub fn user_message(&self) -> String {
    match self {
      SyncError::Auth(_) => "authentication error, contact admin".to_string(),
      SyncError::UserNotFound { .. } => "could not find your account".to_string(),
      SyncError::TransientNetwork(_) | SyncError::BadResponse(_) => {
        "network error, try again later".to_string()
      }
      SyncError::Storage(m) | SyncError::Config(m) => format!("internal error: {}", m),
    }
  }
}

impl From<rusqlite::Error> for SyncError {
  fn from(e: rusqlite::Error) -> Self {
    SyncError::Storage(e.to_string())
  }
}

pub type Result<T> = std::result::Result<T, SyncError>;
