//! Serde-facing types and normalization for ERP period-status responses.
//!
//! ERP deployments disagree about the response envelope: the period object
//! may be nested under `period`, `data`, or `periodState`, or the fields may
//! sit at the top level. Normalization is total — any JSON-shaped input
//! produces a canonical `PeriodState`, never a panic — because the resulting
//! snapshot gates postings and must stay trustworthy on garbage input.

use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use super::types::{PeriodKey, PeriodState, PeriodStatus};

/// Envelope keys tried, in order, when locating the nested period object.
const NESTING_KEYS: [&str; 3] = ["period", "data", "periodState"];

/// Raw period fields as they appear in a status response.
///
/// Fields whose type varies across backends (`id`, `status`, the close
/// flags) are kept as raw values and coerced during normalization. A present
/// field with an unexpected type for one of the plain-string fields makes
/// the whole object degrade to defaults, which is safe: missing fields only
/// ever make the derived state more restrictive.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ApiPeriodFields {
  pub id: Option<Value>,
  pub period_id: Option<Value>,
  pub name: Option<String>,
  pub period_name: Option<String>,
  pub status: Option<Value>,
  pub pl_closed: Option<Value>,
  pub inventory_closed: Option<Value>,
  pub human_message: Option<String>,
  pub message: Option<String>,
  pub error: Option<String>,
  pub suggested_next_action: Option<String>,
  pub start_date: Option<String>,
  pub end_date: Option<String>,
}

impl ApiPeriodFields {
  /// Deserialize from any JSON value, falling back to all-defaults when the
  /// value is not an object of the expected shape.
  fn from_value(value: &Value) -> Self {
    serde_json::from_value(value.clone()).unwrap_or_default()
  }
}

/// Locate the nested period object.
///
/// Strategies are tried in priority order and the first truthy value wins,
/// whether or not it turns out to be an object; field extraction on a
/// non-object simply yields defaults.
pub fn period_object(payload: &Value) -> Option<&Value> {
  NESTING_KEYS
    .iter()
    .filter_map(|key| payload.get(key))
    .find(|value| truthy(value))
}

/// JSON truthiness: `null`, `false`, `0`, `0.0`, and `""` are falsy,
/// everything else (including empty objects and arrays) is truthy.
pub fn truthy(value: &Value) -> bool {
  match value {
    Value::Null => false,
    Value::Bool(b) => *b,
    Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
    Value::String(s) => !s.is_empty(),
    Value::Array(_) | Value::Object(_) => true,
  }
}

/// Stringify an identifier that may arrive as a string or a number.
fn id_string(value: &Value) -> Option<String> {
  match value {
    Value::String(s) => Some(s.clone()),
    Value::Number(n) => Some(n.to_string()),
    _ => None,
  }
}

/// Normalize an arbitrary status payload into a canonical `PeriodState`.
///
/// `requested` is the period id the caller asked about, used as the fallback
/// identifier when the response does not echo one back.
pub fn normalize_status(payload: &Value, requested: Option<&PeriodKey>) -> PeriodState {
  let nested = period_object(payload).map(ApiPeriodFields::from_value);
  let nested = nested.unwrap_or_default();
  let top = ApiPeriodFields::from_value(payload);

  let status = [&nested.status, &top.status]
    .into_iter()
    .flatten()
    .find(|value| truthy(value))
    .and_then(Value::as_str)
    .map(PeriodStatus::parse)
    .unwrap_or(PeriodStatus::Unknown);

  let pl_closed = nested
    .pl_closed
    .as_ref()
    .or(top.pl_closed.as_ref())
    .map(truthy)
    .unwrap_or(false);
  let inventory_closed = nested
    .inventory_closed
    .as_ref()
    .or(top.inventory_closed.as_ref())
    .map(truthy)
    .unwrap_or(false);

  let is_open = status == PeriodStatus::Open && !pl_closed && !inventory_closed;

  let can_post_journal = permission(
    payload,
    "canSubmitJournal",
    status == PeriodStatus::Open && !pl_closed,
  );
  let can_post_inventory = permission(
    payload,
    "canSubmitInventory",
    status == PeriodStatus::Open && !inventory_closed,
  );

  let period_id = nested
    .id
    .as_ref()
    .and_then(id_string)
    .or_else(|| nested.period_id.as_ref().and_then(id_string))
    .or_else(|| requested.map(|key| key.as_str().to_string()));

  PeriodState {
    period_id,
    period_name: nested.name.or(nested.period_name),
    status,
    is_open,
    pl_closed,
    inventory_closed,
    can_post_journal,
    can_post_inventory,
    human_message: nested
      .human_message
      .or(top.human_message)
      .or(top.message)
      .or(top.error),
    suggested_next_action: nested.suggested_next_action.or(top.suggested_next_action),
    start_date: nested.start_date.or(top.start_date),
    end_date: nested.end_date.or(top.end_date),
    last_updated: chrono::Utc::now(),
  }
}

/// Resolve a posting permission: a server-provided override takes precedence
/// over the locally derived value whenever the field is present at all.
fn permission(payload: &Value, field: &str, derived: bool) -> bool {
  match payload.get(field) {
    Some(value) => {
      let overridden = truthy(value);
      if overridden != derived {
        warn!(
          field,
          server = overridden,
          derived,
          "server posting permission disagrees with derived value"
        );
      }
      overridden
    }
    None => derived,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_normalize_is_total_for_degenerate_payloads() {
    for payload in [
      Value::Null,
      json!([]),
      json!(""),
      json!("garbage"),
      json!(42),
      json!({}),
      json!({ "period": null }),
      json!({ "period": "not-an-object" }),
    ] {
      let state = normalize_status(&payload, None);
      assert!(!state.is_open, "payload {payload} produced an open state");
      assert_eq!(state.status, PeriodStatus::Unknown);
      assert!(!state.can_post_journal);
      assert!(!state.can_post_inventory);
    }
  }

  #[test]
  fn test_open_period_with_closed_inventory_ledger() {
    let payload = json!({
      "period": { "id": "P1", "status": "open", "pl_closed": false, "inventory_closed": true }
    });

    let state = normalize_status(&payload, None);

    assert_eq!(state.status, PeriodStatus::Open);
    assert!(!state.is_open);
    assert!(state.can_post_journal);
    assert!(!state.can_post_inventory);
    assert_eq!(state.period_id.as_deref(), Some("P1"));
  }

  #[test]
  fn test_fully_open_period() {
    let payload = json!({
      "period": { "id": 7, "name": "July 2026", "status": "Open" }
    });

    let state = normalize_status(&payload, None);

    assert!(state.is_open);
    assert!(state.can_post_journal);
    assert!(state.can_post_inventory);
    assert_eq!(state.period_id.as_deref(), Some("7"));
    assert_eq!(state.period_name.as_deref(), Some("July 2026"));
  }

  #[test]
  fn test_nesting_priority_period_wins_over_data() {
    let payload = json!({
      "period": { "status": "open" },
      "data": { "status": "closed" }
    });

    assert_eq!(
      normalize_status(&payload, None).status,
      PeriodStatus::Open
    );
  }

  #[test]
  fn test_falsy_nesting_key_is_skipped() {
    let payload = json!({
      "period": null,
      "data": { "status": "locked" }
    });

    assert_eq!(
      normalize_status(&payload, None).status,
      PeriodStatus::Locked
    );
  }

  #[test]
  fn test_flat_payload_without_envelope() {
    let payload = json!({ "status": "open", "pl_closed": false, "inventory_closed": false });

    let state = normalize_status(&payload, Some(&PeriodKey::from("2026-07")));

    assert!(state.is_open);
    assert_eq!(state.period_id.as_deref(), Some("2026-07"));
  }

  #[test]
  fn test_unrecognized_status_coerces_to_unknown() {
    let payload = json!({ "period": { "status": "archived" } });
    let state = normalize_status(&payload, None);

    assert_eq!(state.status, PeriodStatus::Unknown);
    assert!(!state.is_open);
  }

  #[test]
  fn test_truthy_close_flags() {
    // Backends that report close flags as 0/1 instead of booleans.
    let payload = json!({ "period": { "status": "open", "pl_closed": 1, "inventory_closed": 0 } });
    let state = normalize_status(&payload, None);

    assert!(state.pl_closed);
    assert!(!state.inventory_closed);
    assert!(!state.is_open);
    assert!(!state.can_post_journal);
    assert!(state.can_post_inventory);
  }

  #[test]
  fn test_server_override_takes_precedence_when_present() {
    // Derived journal permission would be true (open, pl open), but the
    // server explicitly denies it.
    let denied = json!({
      "period": { "status": "open" },
      "canSubmitJournal": false
    });
    assert!(!normalize_status(&denied, None).can_post_journal);

    // Derived permission would be false (closed period), but the server
    // explicitly allows it.
    let allowed = json!({
      "period": { "status": "closed" },
      "canSubmitJournal": true
    });
    assert!(normalize_status(&allowed, None).can_post_journal);
  }

  #[test]
  fn test_server_override_uses_truthiness() {
    let payload = json!({
      "period": { "status": "open" },
      "canSubmitJournal": 0,
      "canSubmitInventory": "yes"
    });

    let state = normalize_status(&payload, None);
    assert!(!state.can_post_journal);
    assert!(state.can_post_inventory);
  }

  #[test]
  fn test_message_fallback_order() {
    let payload = json!({ "message": "books closing", "error": "ignored" });
    let state = normalize_status(&payload, None);
    assert_eq!(state.human_message.as_deref(), Some("books closing"));

    let payload = json!({ "error": "period service unavailable" });
    let state = normalize_status(&payload, None);
    assert_eq!(
      state.human_message.as_deref(),
      Some("period service unavailable")
    );

    let payload = json!({
      "period": { "human_message": "nested wins" },
      "message": "ignored"
    });
    let state = normalize_status(&payload, None);
    assert_eq!(state.human_message.as_deref(), Some("nested wins"));
  }

  #[test]
  fn test_dates_pass_through() {
    let payload = json!({
      "period": { "status": "open", "start_date": "2026-07-01", "end_date": "2026-07-31" }
    });

    let state = normalize_status(&payload, None);
    assert_eq!(state.start_date.as_deref(), Some("2026-07-01"));
    assert_eq!(state.end_date.as_deref(), Some("2026-07-31"));
  }
}
