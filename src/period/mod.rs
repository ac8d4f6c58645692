//! Accounting-period status: domain types, transport, normalization, and
//! the fail-closed cached client.

mod api_types;
mod cached_client;
mod client;
mod types;

pub use api_types::normalize_status;
pub use cached_client::{CachedPeriodClient, FetchFailure, StateResult, DEFAULT_TTL};
pub use client::{PeriodClient, StatusSource};
pub use types::{PeriodKey, PeriodState, PeriodStatus};
