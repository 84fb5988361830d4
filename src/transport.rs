//! Rate-limited HTTP transport for the tracker API.
//!
//! All upstream calls funnel through one shared [`RateLimitedTransport`] so
//! that every concurrent sync draws on the same request budget. The transport
//! enforces a base inter-request spacing, doubles it while the server reports
//! the remaining quota at or below a low-water mark, honors `Retry-After` on
//! 429 with a single automatic retry, and retries connection/timeout failures
//! a bounded number of times before surfacing a transient-network error.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::SyncError;

const RATE_LIMIT_REMAINING_HEADER: &str = "x-ratelimit-remaining";
const RETRY_AFTER_HEADER: &str = "retry-after";

/// Wait applied on 429 when the server omits the retry hint.
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct TransportConfig {
  /// Base spacing between outbound requests.
  pub min_interval: Duration,
  /// Remaining-quota level at which the spacing doubles.
  pub low_water_mark: u64,
  /// Retries for connection/timeout failures before giving up.
  pub max_retries: u32,
  /// Total (connect + read) timeout for one request.
  pub request_timeout: Duration,
}

impl Default for TransportConfig {
  fn default() -> Self {
    Self {
      min_interval: Duration::from_secs(1),
      low_water_mark: 5,
      max_retries: 2,
      request_timeout: Duration::from_secs(30),
    }
  }
}

/// Process-wide request pacing state.
///
/// Callers reserve a start slot under the lock and sleep outside it, so
/// unrelated requests queue up behind the shared spacing without holding the
/// lock across I/O.
struct Pacer {
  base_interval: Duration,
  current_interval: Duration,
  next_allowed: Instant,
}

impl Pacer {
  fn new(base_interval: Duration) -> Self {
    Self {
      base_interval,
      current_interval: base_interval,
      next_allowed: Instant::now(),
    }
  }

  /// Reserve the next start slot and return it. Advances the slot by the
  /// currently enforced interval.
  fn reserve(&mut self, now: Instant) -> Instant {
    let start = self.next_allowed.max(now);
    self.next_allowed = start + self.current_interval;
    start
  }

  /// Adjust the enforced interval from the server-reported remaining quota.
  fn observe_remaining(&mut self, remaining: u64, low_water_mark: u64) {
    if remaining <= low_water_mark {
      if self.current_interval == self.base_interval {
        self.current_interval = self.base_interval * 2;
        warn!(
          remaining,
          interval_ms = self.current_interval.as_millis() as u64,
          "tracker quota low, doubling request spacing"
        );
      }
    } else if self.current_interval != self.base_interval {
      self.current_interval = self.base_interval;
      debug!(remaining, "tracker quota recovered, restoring base spacing");
    }
  }
}

/// Shared HTTP transport with rate limiting and bounded retries.
///
/// Construct one per process and pass it (via the client) to every caller;
/// the quota is shared across all syncs against one upstream account.
pub struct RateLimitedTransport {
  http: reqwest::Client,
  config: TransportConfig,
  pacer: Mutex<Pacer>,
}

impl RateLimitedTransport {
  pub fn new(config: TransportConfig) -> Result<Self, SyncError> {
    let http = reqwest::Client::builder()
      .connect_timeout(config.request_timeout.min(Duration::from_secs(10)))
      .timeout(config.request_timeout)
      .build()
      .map_err(|e| SyncError::Config(format!("failed to build HTTP client: {}", e)))?;

    Ok(Self {
      http,
      pacer: Mutex::new(Pacer::new(config.min_interval)),
      config,
    })
  }

  /// The underlying client, for building requests against it.
  pub fn http(&self) -> &reqwest::Client {
    &self.http
  }

  /// Send a request, enforcing spacing and absorbing retryable failures.
  ///
  /// Returns only successful (2xx) responses. 401/403 fail immediately with
  /// [`SyncError::Auth`]; 429 is retried once after the server's hint; 5xx
  /// and connection/timeout failures are retried within the bounded budget
  /// and then surface as [`SyncError::TransientNetwork`].
  pub async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, SyncError> {
    let mut transient_attempts: u32 = 0;
    let mut rate_limit_retried = false;

    loop {
      let attempt = request
        .try_clone()
        .ok_or_else(|| SyncError::Config("request body is not replayable".to_string()))?;

      self.wait_turn().await;

      let response = match attempt.send().await {
        Ok(r) => r,
        Err(e) if e.is_timeout() || e.is_connect() => {
          transient_attempts += 1;
          if transient_attempts > self.config.max_retries {
            return Err(SyncError::TransientNetwork(e.to_string()));
          }
          // 1s, 2s, 4s...
          let backoff = Duration::from_secs(1 << (transient_attempts - 1));
          warn!(
            attempt = transient_attempts,
            backoff_secs = backoff.as_secs(),
            error = %e,
            "tracker request failed, retrying"
          );
          tokio::time::sleep(backoff).await;
          continue;
        }
        Err(e) => return Err(SyncError::TransientNetwork(e.to_string())),
      };

      self.observe_quota(&response).await;
      let status = response.status();

      if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(SyncError::Auth(format!("tracker returned {}", status)));
      }

      if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        if rate_limit_retried {
          return Err(SyncError::TransientNetwork(
            "still rate limited after honoring retry hint".to_string(),
          ));
        }
        let wait = retry_after(&response).unwrap_or(DEFAULT_RETRY_AFTER);
        warn!(
          wait_secs = wait.as_secs(),
          "tracker rate limit exceeded, honoring retry hint"
        );
        tokio::time::sleep(wait).await;
        rate_limit_retried = true;
        continue;
      }

      if status.is_server_error() {
        transient_attempts += 1;
        if transient_attempts > self.config.max_retries {
          return Err(SyncError::TransientNetwork(format!(
            "tracker returned {}",
            status
          )));
        }
        let backoff = Duration::from_secs(1 << (transient_attempts - 1));
        warn!(
          attempt = transient_attempts,
          %status,
          backoff_secs = backoff.as_secs(),
          "tracker server error, retrying"
        );
        tokio::time::sleep(backoff).await;
        continue;
      }

      if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(SyncError::BadResponse(format!(
          "tracker returned {}: {}",
          status, body
        )));
      }

      return Ok(response);
    }
  }

  /// Sleep until our reserved start slot.
  async fn wait_turn(&self) {
    let start = {
      let mut pacer = self.pacer.lock().await;
      pacer.reserve(Instant::now())
    };
    tokio::time::sleep_until(start).await;
  }

  /// Track the server-reported remaining quota, if present.
  async fn observe_quota(&self, response: &reqwest::Response) {
    let remaining = response
      .headers()
      .get(RATE_LIMIT_REMAINING_HEADER)
      .and_then(|v| v.to_str().ok())
      .and_then(|v| v.parse::<u64>().ok());

    if let Some(remaining) = remaining {
      let mut pacer = self.pacer.lock().await;
      pacer.observe_remaining(remaining, self.config.low_water_mark);
    }
  }
}

/// Parse the Retry-After header as whole seconds.
fn retry_after(response: &reqwest::Response) -> Option<Duration> {
  response
    .headers()
    .get(RETRY_AFTER_HEADER)
    .and_then(|v| v.to_str().ok())
    .and_then(|v| v.trim().parse::<u64>().ok())
    .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test(start_paused = true)]
  async fn pacer_spaces_consecutive_reservations() {
    let mut pacer = Pacer::new(Duration::from_secs(1));
    let now = Instant::now();

    let first = pacer.reserve(now);
    let second = pacer.reserve(now);
    let third = pacer.reserve(now);

    assert_eq!(first, now);
    assert_eq!(second - first, Duration::from_secs(1));
    assert_eq!(third - second, Duration::from_secs(1));
  }

  #[tokio::test(start_paused = true)]
  async fn pacer_doubles_on_low_quota_and_recovers() {
    let mut pacer = Pacer::new(Duration::from_secs(1));
    let now = Instant::now();
    pacer.reserve(now);

    pacer.observe_remaining(5, 5);
    let a = pacer.reserve(now);
    let b = pacer.reserve(now);
    assert_eq!(b - a, Duration::from_secs(2));

    // Recovery applies to slots reserved after the observation.
    pacer.observe_remaining(40, 5);
    let c = pacer.reserve(now);
    let d = pacer.reserve(now);
    assert_eq!(c - b, Duration::from_secs(2));
    assert_eq!(d - c, Duration::from_secs(1));
  }

  #[tokio::test(start_paused = true)]
  async fn pacer_does_not_compound_the_doubled_interval() {
    let mut pacer = Pacer::new(Duration::from_secs(1));
    pacer.observe_remaining(3, 5);
    pacer.observe_remaining(2, 5);
    pacer.observe_remaining(1, 5);
    assert_eq!(pacer.current_interval, Duration::from_secs(2));
  }

  #[tokio::test(start_paused = true)]
  async fn pacer_reservation_catches_up_after_idle_gap() {
    let mut pacer = Pacer::new(Duration::from_secs(1));
    let now = Instant::now();
    pacer.reserve(now);

    // Long idle period: the next request starts immediately, not in the past.
    let later = now + Duration::from_secs(60);
    let slot = pacer.reserve(later);
    assert_eq!(slot, later);
  }
}
