//! End-to-end sync scenarios against a mock tracker: aggregation and
//! filtering, duplicate-trigger suppression, identity-not-found vs
//! zero-tasks, degraded success, and auth failure.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tasksync::config::{CacheConfig, Config, SyncConfig, TrackerConfig};
use tasksync::store::{MemoryStore, TaskCacheEntry, TaskCacheStore};
use tasksync::tracker::StateGroup;
use tasksync::{Notifier, SyncEngine, UserKey};

struct RecordingNotifier {
  messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
  fn new() -> Self {
    Self {
      messages: Mutex::new(Vec::new()),
    }
  }

  fn messages(&self) -> Vec<String> {
    self.messages.lock().unwrap().clone()
  }
}

#[async_trait]
impl Notifier for RecordingNotifier {
  async fn notify(&self, _user: &UserKey, text: &str) {
    self.messages.lock().unwrap().push(text.to_string());
  }
}

struct Harness {
  engine: SyncEngine,
  store: Arc<MemoryStore>,
  notifier: Arc<RecordingNotifier>,
}

fn harness(server: &MockServer) -> Harness {
  let config = Config {
    tracker: TrackerConfig {
      url: server.uri(),
      request_timeout_secs: 5,
      min_interval_ms: 1,
      low_water_mark: 5,
      max_retries: 0,
    },
    cache: CacheConfig::default(),
    sync: SyncConfig {
      deadline_secs: 30,
      stale_sync_secs: 900,
    },
  };

  let store = Arc::new(MemoryStore::new(chrono::Duration::minutes(15)));
  let notifier = Arc::new(RecordingNotifier::new());
  let engine = SyncEngine::with_stores(
    &config,
    "test-token".to_string(),
    store.clone(),
    store.clone(),
    notifier.clone(),
  )
  .unwrap();

  Harness {
    engine,
    store,
    notifier,
  }
}

/// Poll until the background sync reaches a terminal state and its terminal
/// notification has been delivered (the status flips first).
async fn wait_for_sync(harness: &Harness, chat_id: i64) {
  for _ in 0..500 {
    tokio::time::sleep(Duration::from_millis(10)).await;
    let status = harness.engine.sync_status(chat_id).unwrap();
    if !status.sync_in_progress && harness.notifier.messages().len() >= 2 {
      return;
    }
  }
  panic!("sync did not finish in time");
}

fn page(results: Vec<Value>) -> Value {
  let total = results.len();
  json!({ "results": results, "total": total })
}

fn project(id: &str, name: &str) -> Value {
  json!({ "id": id, "name": name, "identifier": name, "workspace": "w1" })
}

fn member(id: &str, email: &str) -> Value {
  json!({ "member": { "id": id, "email": email, "display_name": email } })
}

fn state(id: &str, name: &str, group: &str) -> Value {
  json!({ "id": id, "name": name, "group": group })
}

fn issue(id: &str, title: &str, state_id: &str, assignees: Vec<&str>) -> Value {
  json!({
    "id": id, "name": title, "state": state_id, "priority": "medium",
    "assignees": assignees, "url": format!("https://tracker.example.com/issues/{}", id)
  })
}

async fn mount_get(server: &MockServer, at: &str, body: Value) {
  Mock::given(method("GET"))
    .and(path(at))
    .respond_with(ResponseTemplate::new(200).set_body_json(body))
    .mount(server)
    .await;
}

/// Standard states: s-open is started, s-done is completed, s-cancel cancelled.
async fn mount_states(server: &MockServer, project_id: &str) {
  mount_get(
    server,
    &format!("/projects/{}/states", project_id),
    page(vec![
      state("s-open", "In Progress", "started"),
      state("s-done", "Done", "completed"),
      state("s-cancel", "Cancelled", "cancelled"),
    ]),
  )
  .await;
}

#[tokio::test]
async fn sync_aggregates_open_tasks_and_excludes_closed_ones() {
  let server = MockServer::start().await;

  // Three projects; the user is a member of the first two.
  mount_get(
    &server,
    "/projects",
    page(vec![
      project("p1", "Atlas"),
      project("p2", "Borealis"),
      project("p3", "Cedar"),
    ]),
  )
  .await;
  mount_get(
    &server,
    "/projects/p1/members",
    page(vec![member("m1", "ana@example.com"), member("m2", "bo@example.com")]),
  )
  .await;
  mount_get(
    &server,
    "/projects/p2/members",
    page(vec![member("m1", "Ana@Example.com")]),
  )
  .await;
  mount_get(&server, "/projects/p3/members", page(vec![member("m9", "zed@example.com")])).await;
  mount_states(&server, "p1").await;
  mount_states(&server, "p2").await;

  // Five open and two finished issues per membership project.
  for (project_id, prefix) in [("p1", "a"), ("p2", "b")] {
    let mut issues: Vec<Value> = (0..5)
      .map(|i| issue(&format!("{}{}", prefix, i), &format!("task {}", i), "s-open", vec!["m1"]))
      .collect();
    issues.push(issue(&format!("{}-done", prefix), "done task", "s-done", vec!["m1"]));
    issues.push(issue(&format!("{}-cancel", prefix), "dropped task", "s-cancel", vec!["m1"]));
    mount_get(&server, &format!("/projects/{}/issues", project_id), page(issues)).await;
  }

  let harness = harness(&server);
  let user = UserKey::new(100, "ana@example.com");

  assert!(harness.engine.request_sync(&user).await.unwrap());
  wait_for_sync(&harness, 100).await;

  let status = harness.engine.sync_status(100).unwrap();
  assert!(!status.sync_in_progress);
  assert!(status.last_sync_error.is_none());
  assert_eq!(status.total_tasks_found, 10);
  assert!(status.last_sync_completed_at.is_some());

  let tasks = harness.engine.cached_tasks(100, 50).unwrap();
  assert_eq!(tasks.len(), 10);
  assert!(tasks.iter().all(|t| t.state_group == StateGroup::Started));

  let messages = harness.notifier.messages();
  assert_eq!(messages.len(), 2);
  assert!(messages[0].contains("Sync started"));
  assert_eq!(messages[1], "Sync complete: 10 tasks found.");
}

#[tokio::test]
async fn second_trigger_while_in_flight_is_rejected() {
  let server = MockServer::start().await;

  mount_get(&server, "/projects/p1/members", page(vec![member("m1", "ana@example.com")])).await;
  mount_states(&server, "p1").await;
  mount_get(&server, "/projects/p1/issues", page(vec![])).await;
  // Slow project list keeps the first sync in flight while we re-trigger.
  Mock::given(method("GET"))
    .and(path("/projects"))
    .respond_with(
      ResponseTemplate::new(200)
        .set_body_json(page(vec![project("p1", "Atlas")]))
        .set_delay(Duration::from_millis(300)),
    )
    .mount(&server)
    .await;

  let harness = harness(&server);
  let user = UserKey::new(101, "ana@example.com");

  assert!(harness.engine.request_sync(&user).await.unwrap());
  assert!(!harness.engine.request_sync(&user).await.unwrap());

  wait_for_sync(&harness, 101).await;

  // Exactly one background job ran: one started + one completed message.
  let messages = harness.notifier.messages();
  assert_eq!(messages.len(), 2);
  assert_eq!(messages[1], "Sync complete: 0 tasks found.");
}

#[tokio::test]
async fn unmatched_email_is_user_not_found_and_keeps_previous_snapshot() {
  let server = MockServer::start().await;

  mount_get(&server, "/projects", page(vec![project("p1", "Atlas")])).await;
  mount_get(&server, "/projects/p1/members", page(vec![member("m2", "bo@example.com")])).await;

  let harness = harness(&server);
  let user = UserKey::new(102, "ana@example.com");

  // A snapshot from an earlier successful sync must survive the failure.
  let previous = TaskCacheEntry {
    chat_id: 102,
    task_id: "old-1".to_string(),
    project_id: "p1".to_string(),
    title: "previously synced".to_string(),
    state_group: StateGroup::Started,
    priority: None,
    url: "https://tracker.example.com/issues/old-1".to_string(),
    synced_at: chrono::Utc::now(),
  };
  harness.store.replace(102, &[previous]).unwrap();

  assert!(harness.engine.request_sync(&user).await.unwrap());
  wait_for_sync(&harness, 102).await;

  let status = harness.engine.sync_status(102).unwrap();
  assert_eq!(
    status.last_sync_error.as_deref(),
    Some("could not find your account")
  );

  let tasks = harness.engine.cached_tasks(102, 50).unwrap();
  assert_eq!(tasks.len(), 1);
  assert_eq!(tasks[0].task_id, "old-1");

  let messages = harness.notifier.messages();
  assert_eq!(messages[1], "Sync failed: could not find your account.");
}

#[tokio::test]
async fn member_everywhere_but_no_tasks_is_an_empty_success() {
  let server = MockServer::start().await;

  mount_get(&server, "/projects", page(vec![project("p1", "Atlas")])).await;
  mount_get(&server, "/projects/p1/members", page(vec![member("m1", "ana@example.com")])).await;
  mount_states(&server, "p1").await;
  mount_get(&server, "/projects/p1/issues", page(vec![])).await;

  let harness = harness(&server);
  let user = UserKey::new(103, "ana@example.com");

  assert!(harness.engine.request_sync(&user).await.unwrap());
  wait_for_sync(&harness, 103).await;

  let status = harness.engine.sync_status(103).unwrap();
  assert!(status.last_sync_error.is_none());
  assert_eq!(status.total_tasks_found, 0);
}

#[tokio::test]
async fn one_failing_project_degrades_the_sync_without_failing_it() {
  let server = MockServer::start().await;

  mount_get(
    &server,
    "/projects",
    page(vec![project("p1", "Atlas"), project("p2", "Borealis"), project("p3", "Cedar")]),
  )
  .await;
  for project_id in ["p1", "p2", "p3"] {
    mount_get(
      &server,
      &format!("/projects/{}/members", project_id),
      page(vec![member("m1", "ana@example.com")]),
    )
    .await;
    mount_states(&server, project_id).await;
  }
  mount_get(
    &server,
    "/projects/p1/issues",
    page(vec![issue("a1", "task a1", "s-open", vec!["m1"])]),
  )
  .await;
  // p2's issue endpoint is broken; p3 is healthy.
  Mock::given(method("GET"))
    .and(path("/projects/p2/issues"))
    .respond_with(ResponseTemplate::new(502))
    .mount(&server)
    .await;
  mount_get(
    &server,
    "/projects/p3/issues",
    page(vec![issue("c1", "task c1", "s-open", vec!["m1"])]),
  )
  .await;

  let harness = harness(&server);
  let user = UserKey::new(104, "ana@example.com");

  assert!(harness.engine.request_sync(&user).await.unwrap());
  wait_for_sync(&harness, 104).await;

  let status = harness.engine.sync_status(104).unwrap();
  assert!(status.last_sync_error.is_none(), "degraded success is not an error");
  assert_eq!(status.total_tasks_found, 2);

  let messages = harness.notifier.messages();
  assert_eq!(messages[1], "Sync complete: 2 tasks found, 1 project(s) skipped.");
}

#[tokio::test]
async fn auth_rejection_fails_the_sync_with_the_auth_message() {
  let server = MockServer::start().await;

  Mock::given(method("GET"))
    .and(path("/projects"))
    .respond_with(ResponseTemplate::new(401))
    .mount(&server)
    .await;

  let harness = harness(&server);
  let user = UserKey::new(105, "ana@example.com");

  assert!(harness.engine.request_sync(&user).await.unwrap());
  wait_for_sync(&harness, 105).await;

  let status = harness.engine.sync_status(105).unwrap();
  assert_eq!(
    status.last_sync_error.as_deref(),
    Some("authentication error, contact admin")
  );

  let messages = harness.notifier.messages();
  assert_eq!(messages[1], "Sync failed: authentication error, contact admin.");
}

#[tokio::test]
async fn all_projects_failing_is_a_failure_not_an_empty_success() {
  let server = MockServer::start().await;

  mount_get(&server, "/projects", page(vec![project("p1", "Atlas")])).await;
  mount_get(&server, "/projects/p1/members", page(vec![member("m1", "ana@example.com")])).await;
  Mock::given(method("GET"))
    .and(path("/projects/p1/states"))
    .respond_with(ResponseTemplate::new(502))
    .mount(&server)
    .await;

  let harness = harness(&server);
  let user = UserKey::new(106, "ana@example.com");

  assert!(harness.engine.request_sync(&user).await.unwrap());
  wait_for_sync(&harness, 106).await;

  let status = harness.engine.sync_status(106).unwrap();
  assert_eq!(
    status.last_sync_error.as_deref(),
    Some("network error, try again later")
  );
}

#[tokio::test]
async fn membership_metadata_is_served_from_cache_across_syncs() {
  let server = MockServer::start().await;

  mount_get(&server, "/projects", page(vec![project("p1", "Atlas")])).await;
  // Membership and states must be fetched exactly once across two syncs.
  Mock::given(method("GET"))
    .and(path("/projects/p1/members"))
    .respond_with(
      ResponseTemplate::new(200).set_body_json(page(vec![member("m1", "ana@example.com")])),
    )
    .expect(1)
    .mount(&server)
    .await;
  Mock::given(method("GET"))
    .and(path("/projects/p1/states"))
    .respond_with(ResponseTemplate::new(200).set_body_json(page(vec![state(
      "s-open",
      "In Progress",
      "started",
    )])))
    .expect(1)
    .mount(&server)
    .await;
  mount_get(
    &server,
    "/projects/p1/issues",
    page(vec![issue("a1", "task a1", "s-open", vec!["m1"])]),
  )
  .await;

  let harness = harness(&server);
  let user = UserKey::new(107, "ana@example.com");

  assert!(harness.engine.request_sync(&user).await.unwrap());
  wait_for_sync(&harness, 107).await;
  assert!(harness.engine.request_sync(&user).await.unwrap());
  wait_for_sync(&harness, 107).await;

  let status = harness.engine.sync_status(107).unwrap();
  assert!(status.last_sync_error.is_none());
  assert_eq!(status.total_tasks_found, 1);
}

#[tokio::test]
async fn issues_assigned_to_someone_else_are_filtered_out() {
  let server = MockServer::start().await;

  mount_get(&server, "/projects", page(vec![project("p1", "Atlas")])).await;
  mount_get(&server, "/projects/p1/members", page(vec![member("m1", "ana@example.com")])).await;
  mount_states(&server, "p1").await;
  // The server ignores the assignee filter and returns everything.
  mount_get(
    &server,
    "/projects/p1/issues",
    page(vec![
      issue("a1", "mine", "s-open", vec!["m1"]),
      issue("a2", "someone else's", "s-open", vec!["m2"]),
      issue("a3", "unassigned", "s-open", vec![]),
    ]),
  )
  .await;

  let harness = harness(&server);
  let user = UserKey::new(108, "ana@example.com");

  assert!(harness.engine.request_sync(&user).await.unwrap());
  wait_for_sync(&harness, 108).await;

  let tasks = harness.engine.cached_tasks(108, 50).unwrap();
  assert_eq!(tasks.len(), 1);
  assert_eq!(tasks[0].task_id, "a1");
}
