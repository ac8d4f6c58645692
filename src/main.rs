mod app;
mod cache;
mod config;
mod period;
mod query;

use app::Ledger;
use clap::{Parser, Subcommand};
use color_eyre::Result;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "pguard")]
#[command(about = "Guard postings against closed ERP accounting periods")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/pguard/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Log filter, e.g. "warn" or "pguard=debug"
  #[arg(long, default_value = "warn")]
  log_level: String,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Show the posting state of a period
  Status {
    /// Period id (default: default_period from config)
    period: Option<String>,

    /// Print the snapshot as JSON
    #[arg(long)]
    json: bool,

    /// Bypass the cache-freshness check
    #[arg(long)]
    refresh: bool,
  },

  /// Exit 0 if posting is allowed for the given ledger, 1 if it is blocked
  Check {
    /// Period id (default: default_period from config)
    period: Option<String>,

    /// Which sub-ledger the posting targets
    #[arg(long, value_enum)]
    ledger: Ledger,
  },

  /// Re-check a period on an interval and print state transitions
  Watch {
    /// Period id (default: default_period from config)
    period: Option<String>,

    /// Seconds between checks
    #[arg(long, default_value_t = 30)]
    interval: u64,
  },
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("warn"));
  tracing_subscriber::registry()
    .with(filter)
    .with(
      tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr),
    )
    .init();

  let config = config::Config::load(args.config.as_deref())?;
  let app = app::App::new(config)?;

  match args.command {
    Command::Status {
      period,
      json,
      refresh,
    } => app.status(period.as_deref(), refresh, json).await?,
    Command::Check { period, ledger } => {
      let allowed = app.check(period.as_deref(), ledger).await?;
      if !allowed {
        std::process::exit(1);
      }
    }
    Command::Watch { period, interval } => {
      app
        .watch(period.as_deref(), Duration::from_secs(interval))
        .await?
    }
  }

  Ok(())
}
