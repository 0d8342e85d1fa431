//! Batch resync: recalculate every tally in the store.
//!
//! Stations are independent, so they are processed concurrently up to a
//! bound. A failing station is recorded and the run carries on.

use std::{collections::HashMap, sync::Arc};

use serde::{Deserialize, Serialize};
use tokio::{sync::Semaphore, task::JoinSet};
use uuid::Uuid;

use crate::{reconcile::DayChange, store::TallyStore};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ResyncOptions {
  /// Maximum stations recalculated at once. Zero is treated as one.
  pub concurrency: usize,
  pub dry_run:     bool,
}

impl Default for ResyncOptions {
  fn default() -> Self { Self { concurrency: 8, dry_run: false } }
}

/// A station whose tally moved during the run.
#[derive(Debug, Clone, Serialize)]
pub struct StationChange {
  pub station_id: Uuid,
  pub changes:    Vec<DayChange>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResyncFailure {
  pub station_id: Uuid,
  pub error:      String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ResyncReport {
  pub dry_run:   bool,
  /// Stations recalculated without error.
  pub succeeded: usize,
  /// The subset of successful stations whose tally changed.
  pub changed:   Vec<StationChange>,
  pub failed:    Vec<ResyncFailure>,
}

impl ResyncReport {
  pub fn processed(&self) -> usize { self.succeeded + self.failed.len() }
}

/// Recalculate every tally in `store`.
///
/// Only listing the tallies can fail the whole run; per-station errors end
/// up in [`ResyncReport::failed`].
pub async fn resync_all<S>(store: Arc<S>, options: ResyncOptions) -> Result<ResyncReport, S::Error>
where
  S: TallyStore + 'static,
{
  let station_ids: Vec<Uuid> =
    store.list_tallies().await?.into_iter().map(|t| t.station_id).collect();

  let permits = Arc::new(Semaphore::new(options.concurrency.max(1)));
  let mut tasks = JoinSet::new();
  let mut by_task = HashMap::with_capacity(station_ids.len());

  for station_id in station_ids {
    let store = Arc::clone(&store);
    let permits = Arc::clone(&permits);
    let handle = tasks.spawn(async move {
      let _permit = permits.acquire_owned().await;
      store.recalculate(station_id, options.dry_run).await
    });
    by_task.insert(handle.id(), station_id);
  }

  let mut report = ResyncReport { dry_run: options.dry_run, ..ResyncReport::default() };
  while let Some(joined) = tasks.join_next_with_id().await {
    match joined {
      Ok((_, Ok(outcome))) => {
        report.succeeded += 1;
        if outcome.changed() {
          report.changed.push(StationChange {
            station_id: outcome.station_id,
            changes:    outcome.changes,
          });
        }
      }
      Ok((id, Err(e))) => report.failed.push(ResyncFailure {
        station_id: by_task.get(&id).copied().unwrap_or_default(),
        error:      e.to_string(),
      }),
      Err(e) => report.failed.push(ResyncFailure {
        station_id: by_task.get(&e.id()).copied().unwrap_or_default(),
        error:      e.to_string(),
      }),
    }
  }

  report.changed.sort_by_key(|c| c.station_id);
  report.failed.sort_by_key(|f| f.station_id);
  Ok(report)
}
