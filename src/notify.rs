//! Notification seam between the sync engine and the interactive layer.

use async_trait::async_trait;

use crate::store::UserKey;

/// Delivery of sync lifecycle messages to a user.
///
/// The orchestrator calls this at sync start and on every terminal outcome;
/// the interactive layer supplies the concrete delivery (e.g. a chat
/// message). Implementations must not fail the sync: delivery problems are
/// theirs to log and swallow.
#[async_trait]
pub trait Notifier: Send + Sync {
  async fn notify(&self, user: &UserKey, text: &str);
}

/// Notifier that only logs. Used by the worker binary and in tests.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
  async fn notify(&self, user: &UserKey, text: &str) {
    tracing::info!(chat_id = user.chat_id, "{}", text);
  }
}
