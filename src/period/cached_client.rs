//! Cached period client: TTL-cached, coalesced, fail-closed.
//!
//! This wraps a `StatusSource` and guarantees two things the raw transport
//! cannot:
//! - at most one status fetch is in flight per period key, and every caller
//!   that asks while one is pending observes the same settlement;
//! - no code path ever yields a permissive state on error. Failures are
//!   normalized into a fail-closed snapshot, cached like a success (so
//!   repeated reads inside the TTL window do not hammer a failing backend),
//!   and attached to the rejection for the consumer to adopt.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tracing::{debug, warn};

use crate::cache::{CacheStore, InFlightMap, MemoryStore, PendingRegistry, SharedFetch};

use super::api_types::normalize_status;
use super::client::StatusSource;
use super::types::{PeriodKey, PeriodState};

/// How long a fetched state stays fresh unless overridden.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// Outcome of a period-state fetch.
pub type StateResult = Result<PeriodState, FetchFailure>;

/// A failed fetch, carrying the fail-closed snapshot that was cached in its
/// place. Consumers adopt `fallback` and surface `message`; they never need
/// to distinguish failure kinds.
#[derive(Debug, Clone)]
pub struct FetchFailure {
  pub message: String,
  pub fallback: PeriodState,
}

impl fmt::Display for FetchFailure {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.message)
  }
}

impl std::error::Error for FetchFailure {}

/// Period client with transparent fail-closed caching.
pub struct CachedPeriodClient<S> {
  inner: Arc<S>,
  store: Arc<dyn CacheStore<PeriodState>>,
  pending: Arc<dyn PendingRegistry<StateResult>>,
  ttl: Duration,
}

impl<S: StatusSource> CachedPeriodClient<S> {
  /// Create a client with in-memory store and registry.
  pub fn new(inner: S) -> Self {
    let store: Arc<dyn CacheStore<PeriodState>> = Arc::new(MemoryStore::new());
    let pending: Arc<dyn PendingRegistry<StateResult>> = Arc::new(InFlightMap::new());
    Self::with_parts(inner, store, pending)
  }

  /// Create a client over explicit store and registry instances.
  pub fn with_parts(
    inner: S,
    store: Arc<dyn CacheStore<PeriodState>>,
    pending: Arc<dyn PendingRegistry<StateResult>>,
  ) -> Self {
    Self {
      inner: Arc::new(inner),
      store,
      pending,
      ttl: DEFAULT_TTL,
    }
  }

  /// Override the freshness window.
  pub fn with_ttl(mut self, ttl: Duration) -> Self {
    self.ttl = ttl;
    self
  }

  /// Return the cached state for `key` if one exists and is still fresh.
  ///
  /// Stale entries are not an error, just a miss; they stay in the store
  /// until overwritten.
  pub fn cached_state(&self, key: &PeriodKey) -> Option<PeriodState> {
    self
      .store
      .get(key.as_str())
      .filter(|snapshot| snapshot.fetched_at.elapsed() < self.ttl)
      .map(|snapshot| snapshot.value)
  }

  /// Fetch the state for `key`, coalescing with any fetch already in
  /// flight for it.
  ///
  /// The pending entry is registered before the network is touched, so a
  /// second caller arriving at any point before settlement joins the same
  /// operation. The operation itself removes the entry when it settles,
  /// success or failure, so a later call retries.
  pub fn fetch_period_state(&self, key: &PeriodKey) -> SharedFetch<StateResult> {
    let inner = Arc::clone(&self.inner);
    let store = Arc::clone(&self.store);
    let pending = Arc::clone(&self.pending);
    let key_owned = key.clone();

    let mut make = move || {
      let inner = Arc::clone(&inner);
      let store = Arc::clone(&store);
      let pending = Arc::clone(&pending);
      let key = key_owned.clone();

      async move {
        let outcome = match inner.fetch_status(&key).await {
          Ok(payload) => {
            let state = normalize_status(&payload, Some(&key));
            store.set(key.as_str(), state.clone());
            Ok(state)
          }
          Err(err) => {
            let message = err.to_string();
            warn!(period = %key, error = %message, "period status fetch failed, caching fail-closed state");
            let fallback = PeriodState::fail_closed(message.clone(), Some(&key));
            store.set(key.as_str(), fallback.clone());
            Err(FetchFailure { message, fallback })
          }
        };
        pending.remove(key.as_str());
        outcome
      }
      .boxed()
      .shared()
    };

    self.pending.get_or_insert(key.as_str(), &mut make)
  }

  /// Resolve the state for `key`: fresh cache unless `force`, the coalesced
  /// fetch otherwise.
  pub async fn period_state(&self, key: &PeriodKey, force: bool) -> StateResult {
    if !force {
      if let Some(state) = self.cached_state(key) {
        debug!(period = %key, "using cached period state");
        return Ok(state);
      }
    }

    debug!(period = %key, force, "fetching period state");
    self.fetch_period_state(key).await
  }
}

impl<S> Clone for CachedPeriodClient<S> {
  fn clone(&self) -> Self {
    Self {
      inner: Arc::clone(&self.inner),
      store: Arc::clone(&self.store),
      pending: Arc::clone(&self.pending),
      ttl: self.ttl,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::period::types::PeriodStatus;
  use color_eyre::eyre::eyre;
  use color_eyre::Result;
  use futures::future::BoxFuture;
  use serde_json::{json, Value};
  use std::sync::atomic::{AtomicUsize, Ordering};

  /// Counting fake transport. `respond` receives the period key and the
  /// zero-based call index.
  struct FakeSource {
    calls: Arc<AtomicUsize>,
    delay: Duration,
    respond: Box<dyn Fn(&PeriodKey, usize) -> Result<Value> + Send + Sync>,
  }

  impl FakeSource {
    fn new<F>(delay: Duration, respond: F) -> (Self, Arc<AtomicUsize>)
    where
      F: Fn(&PeriodKey, usize) -> Result<Value> + Send + Sync + 'static,
    {
      let calls = Arc::new(AtomicUsize::new(0));
      let source = Self {
        calls: Arc::clone(&calls),
        delay,
        respond: Box::new(respond),
      };
      (source, calls)
    }
  }

  impl StatusSource for FakeSource {
    fn fetch_status(&self, key: &PeriodKey) -> BoxFuture<'static, Result<Value>> {
      let n = self.calls.fetch_add(1, Ordering::SeqCst);
      let result = (self.respond)(key, n);
      let delay = self.delay;
      Box::pin(async move {
        tokio::time::sleep(delay).await;
        result
      })
    }
  }

  fn open_payload() -> Value {
    json!({ "period": { "id": "P1", "status": "open" } })
  }

  #[tokio::test]
  async fn test_concurrent_fetches_for_one_key_share_one_call() {
    let (source, calls) = FakeSource::new(Duration::from_millis(50), |_, _| Ok(open_payload()));
    let client = CachedPeriodClient::new(source);
    let key = PeriodKey::from("P1");

    let first = client.fetch_period_state(&key);
    let second = client.fetch_period_state(&key);
    let (a, b) = tokio::join!(first, second);

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let a = a.unwrap();
    let b = b.unwrap();
    assert_eq!(a, b);
    assert!(a.is_open);
  }

  #[tokio::test]
  async fn test_failure_is_fail_closed_shared_and_cached() {
    let (source, calls) = FakeSource::new(Duration::from_millis(20), |_, _| Err(eyre!("timeout")));
    let client = CachedPeriodClient::new(source);
    let key = PeriodKey::from("P2");

    let first = client.fetch_period_state(&key);
    let second = client.fetch_period_state(&key);
    let (a, b) = tokio::join!(first, second);

    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let failure = a.unwrap_err();
    assert_eq!(failure.message, "timeout");
    assert_eq!(failure.fallback.status, PeriodStatus::Closed);
    assert!(!failure.fallback.is_open);
    assert!(!failure.fallback.can_post_journal);
    assert!(!failure.fallback.can_post_inventory);
    assert_eq!(failure.fallback.human_message.as_deref(), Some("timeout"));
    assert_eq!(b.unwrap_err().message, "timeout");

    // The fail-closed snapshot is cached so reads inside the TTL window
    // do not refetch.
    let cached = client.cached_state(&key).unwrap();
    assert_eq!(cached, failure.fallback);
  }

  #[tokio::test]
  async fn test_cache_freshness_window() {
    let (source, calls) = FakeSource::new(Duration::ZERO, |_, _| Ok(open_payload()));
    let client = CachedPeriodClient::new(source).with_ttl(Duration::from_millis(80));
    let key = PeriodKey::from("P1");

    let fetched = client.period_state(&key, false).await.unwrap();
    let cached = client.period_state(&key, false).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(fetched, cached);

    // Past the TTL the entry is a miss and triggers a new fetch.
    tokio::time::sleep(Duration::from_millis(120)).await;
    client.period_state(&key, false).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn test_keys_are_fetched_independently() {
    let (source, calls) = FakeSource::new(Duration::from_millis(30), |key, _| {
      if key.as_str() == "A" {
        Ok(open_payload())
      } else {
        Err(eyre!("backend down"))
      }
    });
    let client = CachedPeriodClient::new(source);
    let a_key = PeriodKey::from("A");
    let b_key = PeriodKey::from("B");

    let (a, b) = tokio::join!(
      client.fetch_period_state(&a_key),
      client.fetch_period_state(&b_key)
    );

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(a.unwrap().is_open);
    let failure = b.unwrap_err();
    assert_eq!(failure.message, "backend down");

    // One key's failure does not bleed into the other's cache entry.
    assert!(client.cached_state(&a_key).unwrap().is_open);
    assert!(!client.cached_state(&b_key).unwrap().is_open);
  }

  #[tokio::test]
  async fn test_force_bypasses_fresh_cache_and_overwrites_it() {
    let (source, calls) = FakeSource::new(Duration::ZERO, |_, n| {
      if n == 0 {
        Ok(open_payload())
      } else {
        Ok(json!({ "period": { "id": "P1", "status": "closed" } }))
      }
    });
    let client = CachedPeriodClient::new(source);
    let key = PeriodKey::from("P1");

    let first = client.period_state(&key, false).await.unwrap();
    assert!(first.is_open);

    let forced = client.period_state(&key, true).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(forced.status, PeriodStatus::Closed);

    // Last write wins: the cache now holds the forced result.
    assert_eq!(client.cached_state(&key).unwrap().status, PeriodStatus::Closed);
  }

  #[tokio::test]
  async fn test_settled_fetch_can_be_retried() {
    let (source, calls) = FakeSource::new(Duration::ZERO, |_, _| Err(eyre!("still down")));
    let client = CachedPeriodClient::new(source);
    let key = PeriodKey::from("P1");

    client.fetch_period_state(&key).await.unwrap_err();
    client.fetch_period_state(&key).await.unwrap_err();

    // The in-flight entry was removed on settlement, so the second call
    // reached the transport again.
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }
}
