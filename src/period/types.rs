//! Domain types for accounting period state.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Action suggested to operators whenever a period is reported closed
/// because verification failed rather than because the books are closed.
pub const VERIFY_NEXT_ACTION: &str =
  "Ask your finance administrator to confirm the period before posting.";

/// Opaque identifier for an accounting period.
///
/// ERP backends are inconsistent about whether period ids are strings or
/// numbers, so the key normalizes everything to its string form. The string
/// form is also what the cache and in-flight maps are keyed by.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeriodKey(String);

impl PeriodKey {
  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl From<String> for PeriodKey {
  fn from(id: String) -> Self {
    Self(id)
  }
}

impl From<&str> for PeriodKey {
  fn from(id: &str) -> Self {
    Self(id.to_string())
  }
}

impl From<u64> for PeriodKey {
  fn from(id: u64) -> Self {
    Self(id.to_string())
  }
}

impl fmt::Display for PeriodKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// Lifecycle status of a period as reported by the ERP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodStatus {
  Open,
  Closed,
  Locked,
  Unknown,
}

impl PeriodStatus {
  /// Coerce a raw status string. Matching is case-insensitive and anything
  /// outside the known set maps to `Unknown`.
  pub fn parse(raw: &str) -> Self {
    match raw.to_lowercase().as_str() {
      "open" => Self::Open,
      "closed" => Self::Closed,
      "locked" => Self::Locked,
      _ => Self::Unknown,
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Open => "open",
      Self::Closed => "closed",
      Self::Locked => "locked",
      Self::Unknown => "unknown",
    }
  }
}

impl fmt::Display for PeriodStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Canonical, immutable snapshot of a period's posting state.
///
/// `is_open` and the two `can_post_*` flags are derived at normalization
/// time; consumers gate actions on these booleans only, never on the absence
/// of an error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodState {
  pub period_id: Option<String>,
  pub period_name: Option<String>,
  pub status: PeriodStatus,
  pub is_open: bool,
  pub pl_closed: bool,
  pub inventory_closed: bool,
  pub can_post_journal: bool,
  pub can_post_inventory: bool,
  pub human_message: Option<String>,
  pub suggested_next_action: Option<String>,
  pub start_date: Option<String>,
  pub end_date: Option<String>,
  pub last_updated: DateTime<Utc>,
}

impl PeriodState {
  /// Build the most restrictive possible snapshot.
  ///
  /// Every error path resolves to this: status closed, both sub-ledgers
  /// closed, both posting permissions denied. `reason` becomes the
  /// operator-facing message.
  pub fn fail_closed(reason: impl Into<String>, period_id: Option<&PeriodKey>) -> Self {
    Self {
      period_id: period_id.map(|k| k.as_str().to_string()),
      period_name: None,
      status: PeriodStatus::Closed,
      is_open: false,
      pl_closed: true,
      inventory_closed: true,
      can_post_journal: false,
      can_post_inventory: false,
      human_message: Some(reason.into()),
      suggested_next_action: Some(VERIFY_NEXT_ACTION.to_string()),
      start_date: None,
      end_date: None,
      last_updated: Utc::now(),
    }
  }
}
