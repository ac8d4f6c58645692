//! Fail-closed caching primitives.
//!
//! This module is domain-agnostic: it knows nothing about periods, only
//! about keyed snapshots and pending fetches. It provides:
//! - a TTL-friendly snapshot store (staleness decided at read time)
//! - an in-flight registry that coalesces concurrent fetches per key

mod inflight;
mod store;
mod traits;

pub use inflight::InFlightMap;
pub use store::MemoryStore;
pub use traits::{CacheStore, CachedSnapshot, PendingRegistry, SharedFetch};
