//! `turnout` binary.
//!
//! Reads `config.toml` (or the path given with `--config`) plus `TURNOUT_*`
//! environment overrides, opens the SQLite store, and either serves the HTTP
//! API or runs a one-off maintenance command.
//!
//! ```text
//! turnout serve
//! turnout recalculate --station 1412 --dry-run
//! turnout recalculate-all
//! turnout populate
//! ```

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use turnout_core::{reconcile::DayChange, resync::resync_all, store::TallyStore};
use turnout_server::{ServerConfig, router, spawn_event_log};
use turnout_store_sqlite::SqliteStore;

#[derive(Parser)]
#[command(author, version, about = "Daily turnout tally server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml", global = true)]
  config: PathBuf,

  #[command(subcommand)]
  command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
  /// Serve the HTTP API (the default).
  Serve,
  /// Recalculate one station's tally from its vote records.
  Recalculate {
    /// Public station number.
    #[arg(long)]
    station: u32,
    /// Report what would change without writing.
    #[arg(long)]
    dry_run: bool,
  },
  /// Recalculate every tally.
  RecalculateAll {
    #[arg(long)]
    dry_run: bool,
  },
  /// Create an all-zero tally for every station that lacks one.
  Populate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let config = ServerConfig::load(Some(cli.config)).context("failed to load configuration")?;

  // Expand `~` in store path.
  let store_path = expand_tilde(&config.store_path);

  let store = SqliteStore::open(&store_path, config.polling_dates)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?
    .with_busy_retries(config.busy_retries);
  let store = Arc::new(store);

  match cli.command.unwrap_or(Command::Serve) {
    Command::Serve => serve(store, &config).await,
    Command::Recalculate { station, dry_run } => recalculate(&store, station, dry_run).await,
    Command::RecalculateAll { dry_run } => {
      let options = turnout_core::resync::ResyncOptions { dry_run, ..config.resync_options() };
      let report = resync_all(Arc::clone(&store), options)
        .await
        .context("failed to list tallies")?;
      for change in &report.changed {
        println!("station {}:", change.station_id);
        print_changes(&change.changes);
      }
      for failure in &report.failed {
        println!("station {} failed: {}", failure.station_id, failure.error);
      }
      println!(
        "{} processed, {} changed, {} failed{}",
        report.processed(),
        report.changed.len(),
        report.failed.len(),
        if report.dry_run { " (dry run)" } else { "" },
      );
      Ok(())
    }
    Command::Populate => {
      let created = store.ensure_tallies().await.context("failed to populate tallies")?;
      println!("created {created} daily tallies");
      Ok(())
    }
  }
}

async fn serve(store: Arc<SqliteStore>, config: &ServerConfig) -> anyhow::Result<()> {
  let _events = spawn_event_log(store.subscribe());
  let app = router(store, config);
  let address = config.address();

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}

async fn recalculate(store: &SqliteStore, number: u32, dry_run: bool) -> anyhow::Result<()> {
  let station = store
    .find_station(number)
    .await
    .context("failed to look up station")?
    .with_context(|| format!("no station numbered {number}"))?;

  let outcome = store
    .recalculate(station.station_id, dry_run)
    .await
    .with_context(|| format!("failed to recalculate station {number}"))?;

  if outcome.changed() {
    print_changes(&outcome.changes);
  } else {
    println!("station {number}: up to date");
  }
  if dry_run {
    println!("dry run: nothing written");
  }
  Ok(())
}

fn print_changes(changes: &[DayChange]) {
  for c in changes {
    println!(
      "  {}: computed {} -> {}, manual {} -> {}, source {:?} -> {:?}",
      c.day,
      c.computed_before,
      c.computed_after,
      c.manual_before,
      c.manual_after,
      c.source_before,
      c.source_after,
    );
  }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
