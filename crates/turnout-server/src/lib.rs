//! HTTP server assembly for turnout.
//!
//! Loads [`ServerConfig`], mounts the JSON API under `/api` next to a
//! `/healthz` probe, and logs every committed tally write.

use std::{path::PathBuf, sync::Arc};

use axum::{Json, Router, routing::get};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::{sync::broadcast, task::JoinHandle};
use tower_http::trace::TraceLayer;
use turnout_core::{
  calendar::PollingCalendar, resync::ResyncOptions, store::TallyStore, trigger::TallyEvent,
};

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `TURNOUT_*` environment variables.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  pub host:               String,
  pub port:               u16,
  pub store_path:         PathBuf,
  /// The three polling dates, in order.
  pub polling_dates:      PollingCalendar,
  /// Stations recalculated at once during a batch resync.
  pub resync_concurrency: usize,
  /// Retries for a write transaction that finds the database busy.
  pub busy_retries:       u32,
}

impl ServerConfig {
  /// Layer defaults, the optional file at `path`, then the environment.
  ///
  /// `TURNOUT_POLLING_DATES` takes a comma-separated list.
  pub fn load(path: Option<PathBuf>) -> Result<Self, config::ConfigError> {
    let mut builder = config::Config::builder()
      .set_default("host", "127.0.0.1")?
      .set_default("port", 8080)?
      .set_default("store_path", "turnout.db")?
      .set_default("polling_dates", vec!["2025-09-12", "2025-09-13", "2025-09-14"])?
      .set_default("resync_concurrency", ResyncOptions::default().concurrency as u64)?
      .set_default("busy_retries", 5)?;
    if let Some(path) = path {
      builder = builder.add_source(config::File::from(path).required(false));
    }
    builder
      .add_source(
        config::Environment::with_prefix("TURNOUT")
          .try_parsing(true)
          .list_separator(",")
          .with_list_parse_key("polling_dates"),
      )
      .build()?
      .try_deserialize()
  }

  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }

  pub fn resync_options(&self) -> ResyncOptions {
    ResyncOptions { concurrency: self.resync_concurrency, dry_run: false }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the top-level router: `/healthz` plus the API under `/api`.
pub fn router<S>(store: Arc<S>, config: &ServerConfig) -> Router
where
  S: TallyStore + 'static,
{
  Router::new()
    .route("/healthz", get(healthz))
    .nest("/api", turnout_api::api_router(store, config.resync_options()))
    .layer(TraceLayer::new_for_http())
}

async fn healthz() -> Json<Value> { Json(json!({ "status": "ok" })) }

// ─── Event log ────────────────────────────────────────────────────────────────

/// Log every [`TallyEvent`] until the sending store is dropped.
pub fn spawn_event_log(mut events: broadcast::Receiver<TallyEvent>) -> JoinHandle<()> {
  tokio::spawn(async move {
    loop {
      match events.recv().await {
        Ok(TallyEvent::Recalculated { station_id, version, cause }) => {
          tracing::info!(%station_id, version, ?cause, "tally recalculated");
        }
        Ok(TallyEvent::Edited { station_id, version }) => {
          tracing::info!(%station_id, version, "tally edited");
        }
        Err(broadcast::error::RecvError::Lagged(skipped)) => {
          tracing::warn!(skipped, "tally event log fell behind");
        }
        Err(broadcast::error::RecvError::Closed) => break,
      }
    }
  })
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use std::io::Write as _;

  use axum::{
    body::Body,
    http::{Request, StatusCode},
  };
  use chrono::NaiveDate;
  use tower::ServiceExt as _;
  use turnout_store_sqlite::SqliteStore;

  use super::*;

  fn test_config() -> ServerConfig {
    ServerConfig {
      host:               "127.0.0.1".into(),
      port:               0,
      store_path:         PathBuf::from(":memory:"),
      polling_dates:      PollingCalendar::new([
        NaiveDate::from_ymd_opt(2025, 9, 12).unwrap(),
        NaiveDate::from_ymd_opt(2025, 9, 13).unwrap(),
        NaiveDate::from_ymd_opt(2025, 9, 14).unwrap(),
      ])
      .unwrap(),
      resync_concurrency: 2,
      busy_retries:       1,
    }
  }

  async fn get(uri: &str) -> (StatusCode, Value) {
    let config = test_config();
    let store = SqliteStore::open_in_memory(config.polling_dates).await.unwrap();
    let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let resp = router(Arc::new(store), &config).oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
  }

  #[tokio::test]
  async fn healthz_is_ok() {
    let (status, body) = get("/healthz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
  }

  #[tokio::test]
  async fn api_is_nested() {
    let (status, body) = get("/api/reports/summary").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["station_count"], 0);
  }

  #[test]
  fn defaults_apply_without_a_file() {
    let config = ServerConfig::load(None).unwrap();
    assert_eq!(config.polling_dates, test_config().polling_dates);
    assert_eq!(config.resync_concurrency, 8);
    assert_eq!(config.busy_retries, 5);
  }

  #[test]
  fn file_overrides_defaults() {
    let dir = std::env::temp_dir().join(format!("turnout-config-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("config.toml");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(
      file,
      "port = 9000\npolling_dates = [\"2024-03-15\", \"2024-03-16\", \"2024-03-17\"]"
    )
    .unwrap();

    let config = ServerConfig::load(Some(path)).unwrap();
    assert_eq!(config.port, 9000);
    assert_eq!(
      config.polling_dates.dates()[0],
      NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
    );
    std::fs::remove_dir_all(&dir).ok();
  }

  #[test]
  fn unordered_dates_are_rejected() {
    let dir = std::env::temp_dir().join(format!("turnout-bad-config-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("config.toml");
    std::fs::write(&path, "polling_dates = [\"2025-09-14\", \"2025-09-13\", \"2025-09-12\"]\n")
      .unwrap();

    assert!(ServerConfig::load(Some(path)).is_err());
    std::fs::remove_dir_all(&dir).ok();
  }
}
