//! [`SqliteStore`]: connection ownership and the injected capabilities shared
//! by the facade and the monitor.

use std::{path::Path, sync::Arc, time::Duration};

use orgline_core::{
  audit::AuditEvent,
  config::{EngineConfig, RepairPolicy},
  context::{Clock, SystemClock},
  health::{AlertRule, default_rules},
  metrics::{MetricsSink, NoopMetrics},
  version::{EntityKey, EntityKind, TimelineVersion},
};
use rusqlite::Connection;

use crate::{
  Result,
  audit::{self, AuditRecorder, SqliteAuditRecorder},
  encode::{RawVersion, VERSION_COLUMNS, encode_uuid, table},
  facade::SqliteFacade,
  hierarchy::{HierarchyPaths, NoopHierarchy},
  monitor::SqliteMonitor,
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// An Orgline timeline store backed by a single SQLite file.
///
/// Cloning is cheap; the connection and capabilities are reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn: tokio_rusqlite::Connection,
  pub(crate) deps: Deps,
}

/// Capabilities injected at construction.
#[derive(Clone)]
pub(crate) struct Deps {
  pub clock:       Arc<dyn Clock>,
  pub metrics:     Arc<dyn MetricsSink>,
  pub audit:       Arc<dyn AuditRecorder>,
  pub hierarchy:   Arc<dyn HierarchyPaths>,
  pub policy:      RepairPolicy,
  pub alert_rules: Arc<[AlertRule]>,
}

impl Default for Deps {
  fn default() -> Self {
    Self {
      clock:       Arc::new(SystemClock),
      metrics:     Arc::new(NoopMetrics),
      audit:       Arc::new(SqliteAuditRecorder),
      hierarchy:   Arc::new(NoopHierarchy),
      policy:      RepairPolicy::default(),
      alert_rules: default_rules().into(),
    }
  }
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn, deps: Deps::default() };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn, deps: Deps::default() };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open the store described by `config` with its policy, alert rules and
  /// busy timeout applied.
  pub async fn from_config(config: &EngineConfig) -> Result<Self> {
    let store = Self::open(&config.store_path)
      .await?
      .with_repair_policy(config.repair_policy)
      .with_alert_rules(config.monitor.rules());
    store.set_busy_timeout(config.busy_timeout()).await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// How long a writer waits for another writer's lock before failing.
  pub async fn set_busy_timeout(&self, timeout: Duration) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        conn.busy_timeout(timeout)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Capabilities ──────────────────────────────────────────────────────────

  pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
    self.deps.clock = Arc::new(clock);
    self
  }

  pub fn with_metrics(mut self, metrics: impl MetricsSink + 'static) -> Self {
    self.deps.metrics = Arc::new(metrics);
    self
  }

  pub fn with_audit_recorder(
    mut self,
    recorder: impl AuditRecorder + 'static,
  ) -> Self {
    self.deps.audit = Arc::new(recorder);
    self
  }

  pub fn with_hierarchy(mut self, paths: impl HierarchyPaths + 'static) -> Self {
    self.deps.hierarchy = Arc::new(paths);
    self
  }

  pub fn with_repair_policy(mut self, policy: RepairPolicy) -> Self {
    self.deps.policy = policy;
    self
  }

  pub fn with_alert_rules(mut self, rules: Vec<AlertRule>) -> Self {
    self.deps.alert_rules = rules.into();
    self
  }

  // ── Views ─────────────────────────────────────────────────────────────────

  /// The mutation facade for one entity kind.
  pub fn facade(&self, kind: EntityKind) -> SqliteFacade {
    SqliteFacade::new(self.clone(), kind)
  }

  pub fn monitor(&self) -> SqliteMonitor { SqliteMonitor::new(self.clone()) }

  /// Every audit event recorded for `key`, oldest first.
  pub async fn audit_history(&self, key: EntityKey) -> Result<Vec<AuditEvent>> {
    self
      .conn
      .call(move |conn| Ok(audit::history(conn, &key)))
      .await?
  }
}

/// All versions of one entity ordered by effective date. Shared by the
/// locked mutation path and the lock-free read path.
pub(crate) fn load_versions(
  conn: &Connection,
  kind: EntityKind,
  key: &EntityKey,
  include_deleted: bool,
) -> Result<Vec<TimelineVersion>> {
  let sql = format!(
    "SELECT {VERSION_COLUMNS} FROM {}
     WHERE tenant_id = ?1 AND code = ?2 AND (?3 OR status <> 'DELETED')
     ORDER BY effective_date, created_at",
    table(kind)
  );
  let mut stmt = conn.prepare(&sql)?;
  let raws = stmt
    .query_map(
      rusqlite::params![encode_uuid(key.tenant_id), key.code, include_deleted],
      RawVersion::from_row,
    )?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawVersion::into_version).collect()
}
