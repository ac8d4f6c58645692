use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub erp: ErpConfig,
  /// Period to use when a command is invoked without one
  pub default_period: Option<String>,
  #[serde(default)]
  pub cache: CacheConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErpConfig {
  /// Base URL of the ERP API, e.g. https://erp.example.com/api
  pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// How long a fetched period state stays fresh
  #[serde(default = "default_ttl_minutes")]
  pub ttl_minutes: u64,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      ttl_minutes: default_ttl_minutes(),
    }
  }
}

fn default_ttl_minutes() -> u64 {
  5
}

impl CacheConfig {
  pub fn ttl(&self) -> Duration {
    Duration::from_secs(self.ttl_minutes * 60)
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./pguard.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/pguard/config.yaml
  /// 4. ~/.config/pguard/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/pguard/config.yaml"
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("pguard.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("pguard").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }

  /// Get the ERP API token from environment variables.
  ///
  /// Checks PGUARD_ERP_TOKEN first, then ERP_API_TOKEN as fallback.
  pub fn get_api_token() -> Result<String> {
    std::env::var("PGUARD_ERP_TOKEN")
      .or_else(|_| std::env::var("ERP_API_TOKEN"))
      .map_err(|_| {
        eyre!("ERP API token not found. Set PGUARD_ERP_TOKEN or ERP_API_TOKEN environment variable.")
      })
  }
}
