//! `orgline`: operate an Orgline timeline store from the command line.
//!
//! # Usage
//!
//! ```text
//! orgline show --tenant <UUID> 1000001
//! orgline recompute --tenant <UUID> --kind position P-1
//! orgline recompute --all
//! orgline check --tenant <UUID>
//! orgline --config /etc/orgline.toml run
//! ```
//!
//! Settings come from the TOML file named by `--config` (optional) layered
//! with `ORGLINE_*` environment variables, e.g.
//! `ORGLINE_SCHEDULER__MONITOR_INTERVAL_SECS=60`.

mod scheduler;

use std::{
  path::{Path, PathBuf},
  process::ExitCode,
};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use orgline_core::{
  config::EngineConfig,
  context::OperationContext,
  health::{AlertLevel, Scope},
  metrics::LogMetrics,
  store::{ConsistencyMonitor, TemporalFacade},
  version::{EntityKey, EntityKind},
};
use orgline_store_sqlite::SqliteStore;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

// ─── CLI args ────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "orgline", version, about = "Bitemporal timeline engine for HR entities")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, value_name = "FILE", default_value = "orgline.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Print an entity's timeline as JSON.
  Show {
    #[arg(long)]
    tenant:          Uuid,
    #[arg(long, default_value = "organization_unit")]
    kind:            EntityKind,
    /// Include soft-deleted versions.
    #[arg(long)]
    include_deleted: bool,
    code:            String,
  },

  /// Rederive end dates and current flags.
  Recompute {
    /// Restrict to one tenant; required when recomputing a single entity.
    #[arg(long, required_unless_present = "all")]
    tenant: Option<Uuid>,
    #[arg(long, default_value = "organization_unit")]
    kind:   EntityKind,
    /// Recompute every entity of every kind.
    #[arg(long, conflicts_with = "code")]
    all:    bool,
    #[arg(required_unless_present = "all")]
    code:   Option<String>,
  },

  /// Scan for invariant violations and print metrics and alerts as JSON.
  ///
  /// Exits with 1 on WARNING and 2 on CRITICAL.
  Check {
    #[arg(long)]
    tenant: Option<Uuid>,
  },

  /// Run the periodic monitor and recompute jobs until interrupted.
  Run,
}

// ─── Entry point ─────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  let mut config = load_config(&cli.config)?;
  config.store_path = expand_tilde(&config.store_path);

  let store = SqliteStore::from_config(&config)
    .await
    .with_context(|| format!("failed to open store at {:?}", config.store_path))?
    .with_metrics(LogMetrics);

  match cli.command {
    Command::Show { tenant, kind, include_deleted, code } => {
      let timeline = store
        .facade(kind)
        .get_timeline(EntityKey::new(tenant, code), include_deleted)
        .await
        .context("failed to read timeline")?;
      println!("{}", serde_json::to_string_pretty(&timeline)?);
    }

    Command::Recompute { tenant, kind, all, code } => {
      if all {
        recompute_all(&store, tenant.map_or(Scope::All, Scope::Tenant)).await?;
      } else if let (Some(tenant), Some(code)) = (tenant, code) {
        store
          .facade(kind)
          .recompute_timeline(
            EntityKey::new(tenant, code),
            OperationContext::actor("orgline-cli"),
          )
          .await
          .context("recompute failed")?;
      }
    }

    Command::Check { tenant } => {
      let scope = tenant.map_or(Scope::All, Scope::Tenant);
      let monitor = store.monitor();
      let metrics = monitor
        .collect_metrics(scope)
        .await
        .context("consistency scan failed")?;
      let alerts = monitor.evaluate(&metrics);
      for alert in &alerts {
        tracing::warn!(%alert, "consistency alert");
      }

      let report = serde_json::json!({ "metrics": metrics, "alerts": alerts });
      println!("{}", serde_json::to_string_pretty(&report)?);
      return Ok(match metrics.alert_level {
        AlertLevel::Healthy => ExitCode::SUCCESS,
        AlertLevel::Warning => ExitCode::from(1),
        AlertLevel::Critical => ExitCode::from(2),
      });
    }

    Command::Run => scheduler::run(store, &config.scheduler).await?,
  }

  Ok(ExitCode::SUCCESS)
}

fn load_config(path: &Path) -> anyhow::Result<EngineConfig> {
  config::Config::builder()
    .add_source(config::File::from(path.to_path_buf()).required(false))
    .add_source(
      config::Environment::with_prefix("ORGLINE")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true),
    )
    .build()
    .context("failed to read config file")?
    .try_deserialize()
    .context("failed to deserialise EngineConfig")
}

async fn recompute_all(store: &SqliteStore, scope: Scope) -> anyhow::Result<()> {
  for kind in EntityKind::ALL {
    let report = store
      .facade(kind)
      .recompute_all(scope)
      .await
      .with_context(|| format!("failed to list {kind} entities"))?;
    println!("{kind}: {} recomputed, {} failed", report.completed, report.failed);
    if let Some((key, e)) = report.first_error {
      eprintln!("{kind}: first failure at {key}: {e}");
    }
  }
  Ok(())
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

#[cfg(test)]
mod tests {
  use clap::CommandFactory;

  use super::*;

  #[test]
  fn cli_definition_is_valid() { Cli::command().debug_assert(); }

  #[test]
  fn recompute_needs_a_code_or_all() {
    assert!(Cli::try_parse_from(["orgline", "recompute"]).is_err());
    assert!(Cli::try_parse_from(["orgline", "recompute", "--all"]).is_ok());

    let tenant = Uuid::nil().to_string();
    let cli = Cli::try_parse_from([
      "orgline", "recompute", "--tenant", &tenant, "--kind", "position", "P-1",
    ])
    .unwrap();
    assert!(matches!(
      cli.command,
      Command::Recompute { kind: EntityKind::Position, all: false, .. }
    ));
  }

  #[test]
  fn missing_config_file_yields_defaults() {
    let cfg = load_config(Path::new("/nonexistent/orgline.toml")).unwrap();
    assert_eq!(cfg.store_path, PathBuf::from("orgline.db"));
    assert!(cfg.scheduler.monitor_enabled);
  }
}
