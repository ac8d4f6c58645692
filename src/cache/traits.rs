//! Core traits for the fail-closed caching system.
//!
//! Both the snapshot store and the in-flight registry are explicit injected
//! dependencies rather than process-wide statics, so tests can run against
//! isolated instances and the check-then-insert sequence stays behind a lock
//! on a multi-threaded runtime.

use std::time::Instant;

use futures::future::{BoxFuture, Shared};

/// A cached value together with the moment it was written.
///
/// Freshness is decided by the reader (write time + TTL), never by eviction:
/// entries are only ever superseded by newer writes for the same key.
#[derive(Debug, Clone)]
pub struct CachedSnapshot<T> {
  /// The cached value
  pub value: T,
  /// When the value was written
  pub fetched_at: Instant,
}

/// Keyed snapshot store. `set` is last-write-wins; `get` must not mutate.
pub trait CacheStore<T: Clone>: Send + Sync {
  /// Return the stored snapshot for `key`, if any, regardless of age.
  fn get(&self, key: &str) -> Option<CachedSnapshot<T>>;

  /// Unconditionally overwrite the entry for `key`, stamped with now.
  fn set(&self, key: &str, value: T);
}

/// A fetch operation that can be awaited by any number of callers, each
/// observing the same settlement.
pub type SharedFetch<T> = Shared<BoxFuture<'static, T>>;

/// Registry of pending fetches, keyed like the snapshot store.
///
/// An entry is inserted before the underlying operation starts and removed
/// by the operation itself when it settles, so a later call can retry.
pub trait PendingRegistry<T: Clone>: Send + Sync {
  /// Return the pending operation for `key`, creating it with `make` if none
  /// exists. The whole check-then-insert runs atomically: two concurrent
  /// callers for the same key always end up sharing one operation.
  fn get_or_insert(&self, key: &str, make: &mut dyn FnMut() -> SharedFetch<T>) -> SharedFetch<T>;

  /// Drop the pending entry for `key`, if any.
  fn remove(&self, key: &str);
}
