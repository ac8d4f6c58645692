//! Consumer-facing period accessor.
//!
//! `PeriodQuery` wraps the cached client with the state a consumer renders
//! from: the current snapshot, a loading flag, an error message, and a
//! refetch operation. Results arrive over a channel and are drained with
//! `poll()`, so the accessor can sit inside any event or render loop.
//!
//! Two rules hold at all times:
//! - there is always a snapshot to gate on once a load has settled; error
//!   outcomes adopt the attached fail-closed state rather than leaving the
//!   previous one in place;
//! - changing the period key is the only automatic reload trigger. There is
//!   no polling; `refetch()` is explicit.

use tokio::sync::mpsc;

use crate::period::{CachedPeriodClient, PeriodKey, PeriodState, StateResult, StatusSource};

/// Accessor over a period's posting state.
pub struct PeriodQuery<S: StatusSource> {
  client: CachedPeriodClient<S>,
  key: Option<PeriodKey>,
  snapshot: Option<PeriodState>,
  error: Option<String>,
  loading: bool,
  receiver: Option<mpsc::UnboundedReceiver<StateResult>>,
}

impl<S: StatusSource> PeriodQuery<S> {
  /// Create the accessor and start the initial load.
  ///
  /// With no key, the snapshot is immediately the local fail-closed state
  /// and no network call is made. Must be called within a tokio runtime.
  pub fn new(client: CachedPeriodClient<S>, key: Option<PeriodKey>) -> Self {
    let mut query = Self {
      client,
      key: None,
      snapshot: None,
      error: None,
      loading: false,
      receiver: None,
    };
    query.set_period(key);
    query
  }

  /// The current snapshot. `None` only before the first load settles.
  pub fn state(&self) -> Option<&PeriodState> {
    self.snapshot.as_ref()
  }

  /// Message of the most recent failure, cleared by the next success.
  pub fn error(&self) -> Option<&str> {
    self.error.as_deref()
  }

  pub fn is_loading(&self) -> bool {
    self.loading
  }

  /// Switch to a different period. Reloads only when the key actually
  /// changes; the initial `new()` call counts as a change from nothing.
  pub fn set_period(&mut self, key: Option<PeriodKey>) {
    let first_load = self.snapshot.is_none() && self.receiver.is_none();
    if key == self.key && !first_load {
      return;
    }
    self.key = key;
    self.load(false);
  }

  /// Force a network call, bypassing the cache-freshness check. Still
  /// coalesces with any fetch already in flight for the same key.
  pub fn refetch(&mut self) {
    self.load(true);
  }

  /// Drain any settled result. Returns `true` if the visible state changed.
  ///
  /// Call this from the surrounding event loop tick.
  pub fn poll(&mut self) -> bool {
    let receiver = match &mut self.receiver {
      Some(rx) => rx,
      None => return false,
    };

    match receiver.try_recv() {
      Ok(Ok(state)) => {
        self.snapshot = Some(state);
        self.error = None;
        self.loading = false;
        self.receiver = None;
        true
      }
      Ok(Err(failure)) => {
        self.snapshot = Some(failure.fallback);
        self.error = Some(failure.message);
        self.loading = false;
        self.receiver = None;
        true
      }
      Err(mpsc::error::TryRecvError::Empty) => false,
      Err(mpsc::error::TryRecvError::Disconnected) => {
        // Sender dropped without sending. Treat like any other failure:
        // adopt a fail-closed snapshot rather than trusting the old one.
        let reason = "Period check was cancelled";
        self.snapshot = Some(PeriodState::fail_closed(reason, self.key.as_ref()));
        self.error = Some(reason.to_string());
        self.loading = false;
        self.receiver = None;
        true
      }
    }
  }

  fn load(&mut self, force: bool) {
    // An empty key is as good as no key.
    let selected = self.key.as_ref().filter(|key| !key.as_str().is_empty());
    let key = match selected {
      Some(key) => key.clone(),
      None => {
        self.snapshot = Some(PeriodState::fail_closed("No period selected", None));
        self.error = Some("Missing period id".to_string());
        self.loading = false;
        self.receiver = None;
        return;
      }
    };

    if !force {
      if let Some(state) = self.client.cached_state(&key) {
        self.snapshot = Some(state);
        self.error = None;
        self.loading = false;
        self.receiver = None;
        return;
      }
    }

    let (tx, rx) = mpsc::unbounded_channel();
    self.receiver = Some(rx);
    self.loading = true;

    // Registration with the in-flight map happens here, inside the call,
    // before the spawned task first yields.
    let operation = self.client.fetch_period_state(&key);
    tokio::spawn(async move {
      let result = operation.await;
      // Ignore send errors - receiver may have been dropped
      let _ = tx.send(result);
    });
  }
}

impl<S: StatusSource> std::fmt::Debug for PeriodQuery<S> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("PeriodQuery")
      .field("key", &self.key)
      .field("snapshot", &self.snapshot)
      .field("error", &self.error)
      .field("loading", &self.loading)
      .finish_non_exhaustive()
  }
}
