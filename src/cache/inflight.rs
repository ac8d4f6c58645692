//! In-flight fetch registry: collapses concurrent fetches for one key into a
//! single shared operation.

use std::collections::HashMap;
use std::sync::Mutex;

use super::traits::{PendingRegistry, SharedFetch};

/// Registry backed by a `HashMap` of shared futures.
///
/// The lock is held for the whole check-then-insert, and nothing awaits
/// while holding it, so at most one operation per key can ever be created
/// no matter how callers interleave.
pub struct InFlightMap<T> {
  pending: Mutex<HashMap<String, SharedFetch<T>>>,
}

impl<T> InFlightMap<T> {
  pub fn new() -> Self {
    Self {
      pending: Mutex::new(HashMap::new()),
    }
  }
}

impl<T> Default for InFlightMap<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T: Clone + Send + Sync> PendingRegistry<T> for InFlightMap<T> {
  fn get_or_insert(&self, key: &str, make: &mut dyn FnMut() -> SharedFetch<T>) -> SharedFetch<T> {
    let mut pending = match self.pending.lock() {
      Ok(guard) => guard,
      // A poisoned lock still holds valid entries; pending futures are
      // driven by whichever caller polls them, not by the panicked thread.
      Err(poisoned) => poisoned.into_inner(),
    };

    if let Some(existing) = pending.get(key) {
      return existing.clone();
    }

    let operation = make();
    pending.insert(key.to_string(), operation.clone());
    operation
  }

  fn remove(&self, key: &str) {
    let mut pending = match self.pending.lock() {
      Ok(guard) => guard,
      Err(poisoned) => poisoned.into_inner(),
    };
    pending.remove(key);
  }
}
