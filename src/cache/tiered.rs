//! TTL cache with per-key single-flight fetching.
//!
//! Entries past their TTL are treated as absent, never served stale. While a
//! fetch for one key is in flight, concurrent lookups for that key wait for
//! its result instead of issuing duplicate upstream calls; lookups for other
//! keys proceed independently.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

/// One cache slot. The per-key async lock is what provides single-flight:
/// the fetching caller holds it across the upstream call, so waiters see the
/// freshly stored value instead of fetching again.
struct Slot<V> {
  value: Option<(V, Instant)>,
}

pub struct TtlCache<K, V> {
  ttl: Duration,
  slots: std::sync::Mutex<HashMap<K, Arc<tokio::sync::Mutex<Slot<V>>>>>,
}

impl<K, V> TtlCache<K, V>
where
  K: Eq + Hash + Clone,
  V: Clone,
{
  pub fn new(ttl: Duration) -> Self {
    Self {
      ttl,
      slots: std::sync::Mutex::new(HashMap::new()),
    }
  }

  /// Return the cached value if fresh, otherwise run `fetch`, store its
  /// result with the current timestamp, and return it. A failed fetch
  /// caches nothing; the next caller fetches again.
  pub async fn get_or_fetch<F, Fut, E>(&self, key: K, fetch: F) -> Result<V, E>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<V, E>>,
  {
    let slot = {
      // Recover from a poisoned map lock: the map itself is always valid.
      let mut slots = self
        .slots
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
      slots
        .entry(key)
        .or_insert_with(|| {
          Arc::new(tokio::sync::Mutex::new(Slot { value: None }))
        })
        .clone()
    };

    let mut guard = slot.lock().await;

    if let Some((value, fetched_at)) = &guard.value {
      if fetched_at.elapsed() < self.ttl {
        return Ok(value.clone());
      }
    }

    let value = fetch().await?;
    guard.value = Some((value.clone(), Instant::now()));
    Ok(value)
  }

  /// Drop one entry.
  pub fn invalidate(&self, key: &K) {
    self
      .slots
      .lock()
      .unwrap_or_else(std::sync::PoisonError::into_inner)
      .remove(key);
  }

  /// Drop every entry.
  pub fn clear(&self) {
    self
      .slots
      .lock()
      .unwrap_or_else(std::sync::PoisonError::into_inner)
      .clear();
  }
}
