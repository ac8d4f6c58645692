use crate::config::Config;
use color_eyre::{eyre::eyre, Result};
use futures::future::BoxFuture;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CACHE_CONTROL};
use serde_json::Value;
use url::Url;

use super::types::PeriodKey;

/// Source of raw period-status payloads.
///
/// The trait is the seam between the caching layer and the network: the real
/// implementation is `PeriodClient`, tests substitute counting or failing
/// fakes. Implementations always hit their backend; freshness decisions
/// belong to the caller.
pub trait StatusSource: Send + Sync + 'static {
  /// Fetch the raw status payload for a period.
  fn fetch_status(&self, key: &PeriodKey) -> BoxFuture<'static, Result<Value>>;
}

/// ERP period-status API client.
#[derive(Clone)]
pub struct PeriodClient {
  http: reqwest::Client,
  base_url: Url,
}

impl PeriodClient {
  pub fn new(config: &Config) -> Result<Self> {
    let token = Config::get_api_token()?;

    let mut headers = HeaderMap::new();
    // The snapshot must always come from the ERP, never from an
    // intermediary cache; freshness is handled by our own TTL.
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));

    let mut auth = HeaderValue::from_str(&format!("Bearer {}", token))
      .map_err(|e| eyre!("Invalid ERP API token: {}", e))?;
    auth.set_sensitive(true);
    headers.insert(AUTHORIZATION, auth);

    let http = reqwest::Client::builder()
      .default_headers(headers)
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    // Url::join treats a base without a trailing slash as a file and would
    // drop its last path segment.
    let base = if config.erp.url.ends_with('/') {
      config.erp.url.clone()
    } else {
      format!("{}/", config.erp.url)
    };
    let base_url =
      Url::parse(&base).map_err(|e| eyre!("Invalid ERP URL {}: {}", config.erp.url, e))?;

    Ok(Self { http, base_url })
  }

  fn status_url(&self, key: &PeriodKey) -> Result<Url> {
    self
      .base_url
      .join(&format!("periods/{}/status", key))
      .map_err(|e| eyre!("Invalid period id {}: {}", key, e))
  }
}

impl StatusSource for PeriodClient {
  fn fetch_status(&self, key: &PeriodKey) -> BoxFuture<'static, Result<Value>> {
    let http = self.http.clone();
    let url = self.status_url(key);
    let key = key.clone();

    Box::pin(async move {
      let url = url?;

      let response = http
        .get(url)
        .send()
        .await
        .map_err(|e| eyre!("Failed to fetch status for period {}: {}", key, e))?;

      // Non-2xx responses are all the same failure; the body is not
      // consulted for a more specific diagnosis.
      let status = response.status();
      if !status.is_success() {
        return Err(eyre!(
          "Period status request for {} failed with HTTP {}",
          key,
          status
        ));
      }

      let body = response
        .text()
        .await
        .map_err(|e| eyre!("Failed to read status response for period {}: {}", key, e))?;

      serde_json::from_str(&body)
        .map_err(|e| eyre!("Failed to parse status response for period {}: {}", key, e))
    })
  }
}
