use crate::config::Config;
use crate::period::{CachedPeriodClient, PeriodClient, PeriodKey, PeriodState};
use crate::query::PeriodQuery;
use clap::ValueEnum;
use color_eyre::Result;
use serde_json::json;
use std::time::Duration;

/// Sub-ledger a posting targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Ledger {
  Journal,
  Inventory,
}

impl Ledger {
  fn as_str(&self) -> &'static str {
    match self {
      Self::Journal => "journal",
      Self::Inventory => "inventory",
    }
  }
}

/// Command executor holding the configured cached client.
pub struct App {
  config: Config,
  client: CachedPeriodClient<PeriodClient>,
}

impl App {
  pub fn new(config: Config) -> Result<Self> {
    let client = PeriodClient::new(&config)?;
    let client = CachedPeriodClient::new(client).with_ttl(config.cache.ttl());
    Ok(Self { config, client })
  }

  /// Period from the command line, falling back to the configured default.
  /// An empty id is as good as no id.
  fn resolve_key(&self, period: Option<&str>) -> Option<PeriodKey> {
    period
      .map(PeriodKey::from)
      .or_else(|| self.config.default_period.as_deref().map(PeriodKey::from))
      .filter(|key| !key.as_str().is_empty())
  }

  /// Resolve a snapshot plus the error that produced it, if any. Every
  /// outcome, including a missing period id, yields a state to print.
  async fn resolve(&self, period: Option<&str>, force: bool) -> (PeriodState, Option<String>) {
    let Some(key) = self.resolve_key(period) else {
      return (
        PeriodState::fail_closed("No period selected", None),
        Some("Missing period id".to_string()),
      );
    };

    match self.client.period_state(&key, force).await {
      Ok(state) => (state, None),
      Err(failure) => (failure.fallback, Some(failure.message)),
    }
  }

  /// `status` command: print the full snapshot.
  pub async fn status(&self, period: Option<&str>, refresh: bool, json: bool) -> Result<()> {
    let (state, error) = self.resolve(period, refresh).await;
    print_state(&state, error.as_deref(), json)
  }

  /// `check` command: report whether posting to `ledger` is allowed.
  pub async fn check(&self, period: Option<&str>, ledger: Ledger) -> Result<bool> {
    let (state, error) = self.resolve(period, false).await;

    let allowed = match ledger {
      Ledger::Journal => state.can_post_journal,
      Ledger::Inventory => state.can_post_inventory,
    };
    let label = state.period_id.as_deref().unwrap_or("-");

    if allowed {
      println!("{} posting allowed for period {}", ledger.as_str(), label);
    } else {
      let reason = error
        .or_else(|| state.human_message.clone())
        .unwrap_or_else(|| format!("period is {}", state.status));
      println!(
        "{} posting blocked for period {}: {}",
        ledger.as_str(),
        label,
        reason
      );
    }

    Ok(allowed)
  }

  /// `watch` command: refetch every `every` and print state transitions.
  pub async fn watch(&self, period: Option<&str>, every: Duration) -> Result<()> {
    let mut query = PeriodQuery::new(self.client.clone(), self.resolve_key(period));

    // A cache hit or a missing period settles synchronously; show it.
    if let Some(state) = query.state() {
      println!("{}", summary_line(state, query.error()));
    }

    let mut refresh = tokio::time::interval(every);
    // The first interval tick completes immediately and the initial load
    // already ran.
    refresh.tick().await;
    let mut tick = tokio::time::interval(Duration::from_millis(200));

    loop {
      tokio::select! {
        _ = refresh.tick() => query.refetch(),
        _ = tick.tick() => {
          if query.poll() {
            if let Some(state) = query.state() {
              println!("{}", summary_line(state, query.error()));
            }
          }
        }
      }
    }
  }
}

fn gate(allowed: bool) -> &'static str {
  if allowed {
    "allowed"
  } else {
    "blocked"
  }
}

fn summary_line(state: &PeriodState, error: Option<&str>) -> String {
  let mut line = format!(
    "{}  status={}  journal={}  inventory={}",
    state.period_id.as_deref().unwrap_or("-"),
    state.status,
    gate(state.can_post_journal),
    gate(state.can_post_inventory),
  );
  if let Some(message) = error {
    line.push_str("  error=");
    line.push_str(message);
  }
  line
}

fn print_state(state: &PeriodState, error: Option<&str>, as_json: bool) -> Result<()> {
  if as_json {
    let doc = json!({ "state": state, "error": error });
    println!("{}", serde_json::to_string_pretty(&doc)?);
    return Ok(());
  }

  let label = match (&state.period_id, &state.period_name) {
    (Some(id), Some(name)) => format!("{} ({})", id, name),
    (Some(id), None) => id.clone(),
    (None, Some(name)) => name.clone(),
    (None, None) => "-".to_string(),
  };

  println!("period     {}", label);
  println!("status     {}", state.status);
  if let (Some(start), Some(end)) = (&state.start_date, &state.end_date) {
    println!("window     {} to {}", start, end);
  }
  println!("journal    {}", gate(state.can_post_journal));
  println!("inventory  {}", gate(state.can_post_inventory));
  if let Some(message) = &state.human_message {
    println!("message    {}", message);
  }
  if let Some(next) = &state.suggested_next_action {
    println!("next       {}", next);
  }
  println!("checked    {}", state.last_updated.to_rfc3339());
  if let Some(message) = error {
    println!("error      {}", message);
  }

  Ok(())
}
