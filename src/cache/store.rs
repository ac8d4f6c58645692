//! In-memory snapshot store.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

use super::traits::{CacheStore, CachedSnapshot};

/// Process-local keyed store backed by a `HashMap`.
///
/// Entries are never evicted; staleness is a read-time decision made by the
/// caller against `fetched_at`. Reads clone the snapshot so the map is never
/// borrowed across an await point.
pub struct MemoryStore<T> {
  entries: Mutex<HashMap<String, CachedSnapshot<T>>>,
}

impl<T> MemoryStore<T> {
  pub fn new() -> Self {
    Self {
      entries: Mutex::new(HashMap::new()),
    }
  }
}

impl<T> Default for MemoryStore<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T: Clone + Send> CacheStore<T> for MemoryStore<T> {
  fn get(&self, key: &str) -> Option<CachedSnapshot<T>> {
    let entries = match self.entries.lock() {
      Ok(guard) => guard,
      // A poisoned lock still holds valid data; the writer that panicked
      // either completed its insert or never started it.
      Err(poisoned) => poisoned.into_inner(),
    };
    entries.get(key).cloned()
  }

  fn set(&self, key: &str, value: T) {
    let mut entries = match self.entries.lock() {
      Ok(guard) => guard,
      Err(poisoned) => poisoned.into_inner(),
    };
    entries.insert(
      key.to_string(),
      CachedSnapshot {
        value,
        fetched_at: Instant::now(),
      },
    );
  }
}
