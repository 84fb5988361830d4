//! Transport behavior against a mock upstream: pacing, adaptive backoff,
//! rate-limit hints, bounded retries, and auth fast-fail.

use std::time::{Duration, Instant};

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tasksync::error::SyncError;
use tasksync::transport::{RateLimitedTransport, TransportConfig};

fn transport(min_interval_ms: u64, max_retries: u32) -> RateLimitedTransport {
  RateLimitedTransport::new(TransportConfig {
    min_interval: Duration::from_millis(min_interval_ms),
    low_water_mark: 5,
    max_retries,
    request_timeout: Duration::from_secs(5),
  })
  .unwrap()
}

#[tokio::test]
async fn consecutive_requests_are_spaced_by_the_base_interval() {
  let server = MockServer::start().await;
  Mock::given(method("GET"))
    .and(path("/ping"))
    .respond_with(ResponseTemplate::new(200))
    .mount(&server)
    .await;

  let transport = transport(100, 2);
  let url = format!("{}/ping", server.uri());

  let start = Instant::now();
  for _ in 0..3 {
    transport.send(transport.http().get(&url)).await.unwrap();
  }
  let elapsed = start.elapsed();

  // Three calls, two enforced gaps of >= 100ms each.
  assert!(
    elapsed >= Duration::from_millis(200),
    "expected >=200ms, got {:?}",
    elapsed
  );
}

#[tokio::test]
async fn spacing_doubles_once_remaining_quota_is_low() {
  let server = MockServer::start().await;
  Mock::given(method("GET"))
    .and(path("/ping"))
    .respond_with(ResponseTemplate::new(200).insert_header("x-ratelimit-remaining", "3"))
    .mount(&server)
    .await;

  let transport = transport(50, 2);
  let url = format!("{}/ping", server.uri());

  let start = Instant::now();
  for _ in 0..3 {
    transport.send(transport.http().get(&url)).await.unwrap();
  }
  let elapsed = start.elapsed();

  // First gap was reserved at the base interval (50ms) before the low-quota
  // header was seen; the second gap runs at the doubled interval (100ms).
  assert!(
    elapsed >= Duration::from_millis(150),
    "expected >=150ms, got {:?}",
    elapsed
  );
}

#[tokio::test]
async fn rate_limit_hit_honors_retry_after_and_retries_once() {
  let server = MockServer::start().await;
  Mock::given(method("GET"))
    .and(path("/ping"))
    .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "1"))
    .up_to_n_times(1)
    .mount(&server)
    .await;
  Mock::given(method("GET"))
    .and(path("/ping"))
    .respond_with(ResponseTemplate::new(200))
    .mount(&server)
    .await;

  let transport = transport(1, 2);
  let url = format!("{}/ping", server.uri());

  let start = Instant::now();
  let response = transport.send(transport.http().get(&url)).await.unwrap();
  let elapsed = start.elapsed();

  assert!(response.status().is_success());
  assert!(
    elapsed >= Duration::from_secs(1),
    "expected the retry hint to be honored, got {:?}",
    elapsed
  );
}

#[tokio::test]
async fn persistent_rate_limiting_surfaces_as_transient_failure() {
  let server = MockServer::start().await;
  Mock::given(method("GET"))
    .and(path("/ping"))
    .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "0"))
    .expect(2)
    .mount(&server)
    .await;

  let transport = transport(1, 2);
  let url = format!("{}/ping", server.uri());

  let err = transport.send(transport.http().get(&url)).await.unwrap_err();
  assert!(matches!(err, SyncError::TransientNetwork(_)));
}

#[tokio::test]
async fn auth_failure_is_immediate_and_never_retried() {
  let server = MockServer::start().await;
  Mock::given(method("GET"))
    .and(path("/ping"))
    .respond_with(ResponseTemplate::new(401))
    .expect(1)
    .mount(&server)
    .await;

  let transport = transport(1, 2);
  let url = format!("{}/ping", server.uri());

  let err = transport.send(transport.http().get(&url)).await.unwrap_err();
  assert!(matches!(err, SyncError::Auth(_)));
}

#[tokio::test]
async fn server_errors_are_retried_within_the_bounded_budget() {
  let server = MockServer::start().await;
  Mock::given(method("GET"))
    .and(path("/ping"))
    .respond_with(ResponseTemplate::new(500))
    .expect(2)
    .mount(&server)
    .await;

  let transport = transport(1, 1);
  let url = format!("{}/ping", server.uri());

  let err = transport.send(transport.http().get(&url)).await.unwrap_err();
  assert!(matches!(err, SyncError::TransientNetwork(_)));
}

#[tokio::test]
async fn server_error_then_success_recovers_within_budget() {
  let server = MockServer::start().await;
  Mock::given(method("GET"))
    .and(path("/ping"))
    .respond_with(ResponseTemplate::new(500))
    .up_to_n_times(1)
    .mount(&server)
    .await;
  Mock::given(method("GET"))
    .and(path("/ping"))
    .respond_with(ResponseTemplate::new(200))
    .mount(&server)
    .await;

  let transport = transport(1, 2);
  let url = format!("{}/ping", server.uri());

  let response = transport.send(transport.http().get(&url)).await.unwrap();
  assert!(response.status().is_success());
}

#[tokio::test]
async fn connection_refused_exhausts_retries_then_fails() {
  // Nothing listens here; reserve and immediately drop a socket to get a
  // port that refuses connections.
  let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
  let addr = listener.local_addr().unwrap();
  drop(listener);

  let transport = transport(1, 0);
  let url = format!("http://{}/ping", addr);

  let err = transport.send(transport.http().get(&url)).await.unwrap_err();
  assert!(matches!(err, SyncError::TransientNetwork(_)));
}
