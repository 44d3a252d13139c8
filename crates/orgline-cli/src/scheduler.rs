//! Periodic background jobs for `orgline run`.
//!
//! Two independent timers: a consistency check that logs alerts, and a full
//! recompute sweep that refreshes current flags as days roll over. Both run
//! on the caller's task, so a slow sweep delays the next check instead of
//! overlapping it.

use std::time::Duration;

use anyhow::Context as _;
use orgline_core::{
  config::SchedulerConfig,
  health::Scope,
  store::{ConsistencyMonitor, TemporalFacade},
  version::EntityKind,
};
use orgline_store_sqlite::SqliteStore;
use tokio::time::{Interval, MissedTickBehavior};

fn timer(enabled: bool, secs: u64) -> Option<Interval> {
  enabled.then(|| {
    let mut t = tokio::time::interval(Duration::from_secs(secs.max(1)));
    t.set_missed_tick_behavior(MissedTickBehavior::Delay);
    t
  })
}

/// Resolves on the next tick, or never for a disabled job.
async fn tick(timer: &mut Option<Interval>) {
  match timer {
    Some(t) => {
      t.tick().await;
    }
    None => std::future::pending::<()>().await,
  }
}

pub async fn run(store: SqliteStore, cfg: &SchedulerConfig) -> anyhow::Result<()> {
  let mut monitor = timer(cfg.monitor_enabled, cfg.monitor_interval_secs);
  let mut recompute = timer(cfg.recompute_enabled, cfg.recompute_interval_secs);
  if monitor.is_none() && recompute.is_none() {
    tracing::warn!("all scheduled jobs are disabled");
  }
  tracing::info!(
    monitor_interval_secs = cfg.monitor_interval_secs,
    recompute_interval_secs = cfg.recompute_interval_secs,
    "scheduler started"
  );

  loop {
    tokio::select! {
      _ = tick(&mut monitor) => check(&store).await,
      _ = tick(&mut recompute) => sweep(&store).await,
      signal = tokio::signal::ctrl_c() => {
        signal.context("failed to listen for ctrl-c")?;
        tracing::info!("shutting down");
        return Ok(());
      }
    }
  }
}

async fn check(store: &SqliteStore) {
  if let Err(e) = store.monitor().check_alerts(Scope::All).await {
    tracing::error!(error = %e, "scheduled consistency check failed");
  }
}

async fn sweep(store: &SqliteStore) {
  for kind in EntityKind::ALL {
    match store.facade(kind).recompute_all(Scope::All).await {
      Ok(report) => {
        if let Some((key, e)) = report.first_error {
          tracing::warn!(
            %kind,
            failed = report.failed,
            first_key = %key,
            error = %e,
            "scheduled recompute had failures"
          );
        }
      }
      Err(e) => tracing::error!(%kind, error = %e, "scheduled recompute failed"),
    }
  }
}
