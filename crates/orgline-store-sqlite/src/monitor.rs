//! [`SqliteMonitor`]: the SQLite implementation of [`ConsistencyMonitor`].
//!
//! Plain aggregate queries over committed data, run in one deferred read
//! transaction so every count comes from the same snapshot. No entity lock
//! is taken and nothing is written.

use orgline_core::{
  health::{MonitoringMetrics, Scope, evaluate},
  store::ConsistencyMonitor,
  version::EntityKind,
};
use rusqlite::{Connection, Transaction};

use crate::{
  Error, Result,
  encode::{encode_date, encode_uuid, table},
  store::SqliteStore,
};

/// Dataset-wide invariant scan over every entity kind.
#[derive(Clone)]
pub struct SqliteMonitor {
  store: SqliteStore,
}

impl SqliteMonitor {
  pub(crate) fn new(store: SqliteStore) -> Self { Self { store } }

  /// The alert lines the configured rules raise for `metrics`.
  pub fn evaluate(&self, metrics: &MonitoringMetrics) -> Vec<String> {
    evaluate(metrics, &self.store.deps.alert_rules)
  }
}

// Every query binds `?1` = today and `?2` = tenant (NULL for all tenants).
const LIVE: &str = "status <> 'DELETED' AND (?2 IS NULL OR tenant_id = ?2)";

fn count(conn: &Connection, sql: &str, today: &str, tenant: Option<&str>) -> Result<i64> {
  Ok(conn.query_row(sql, rusqlite::params![today, tenant], |row| row.get(0))?)
}

/// Raw counts for one version table.
fn scan_table(
  conn: &Connection,
  kind: EntityKind,
  today: &str,
  tenant: Option<&str>,
) -> Result<MonitoringMetrics> {
  let t = table(kind);
  let q = |sql: String| count(conn, &sql, today, tenant);

  Ok(MonitoringMetrics {
    total_entities: q(format!(
      "SELECT COUNT(*) FROM (SELECT 1 FROM {t} WHERE {LIVE} GROUP BY tenant_id, code)"
    ))?,
    current_record_count: q(format!(
      "SELECT COUNT(*) FROM {t} WHERE {LIVE} AND is_current = 1"
    ))?,
    future_record_count: q(format!(
      "SELECT COUNT(*) FROM {t} WHERE {LIVE} AND effective_date > ?1"
    ))?,
    historical_record_count: q(format!(
      "SELECT COUNT(*) FROM {t}
       WHERE {LIVE} AND end_date IS NOT NULL AND end_date < ?1"
    ))?,
    duplicate_current_count: q(format!(
      "SELECT COUNT(*) FROM (
         SELECT 1 FROM {t} WHERE {LIVE} AND is_current = 1
         GROUP BY tenant_id, code HAVING COUNT(*) > 1)"
    ))?,
    missing_current_count: q(format!(
      "SELECT COUNT(*) FROM (
         SELECT 1 FROM {t} WHERE {LIVE}
         GROUP BY tenant_id, code
         HAVING SUM(effective_date <= ?1) > 0 AND SUM(is_current) = 0)"
    ))?,
    timeline_overlap_count: q(format!(
      "SELECT COUNT(*) FROM {t} a
       JOIN {t} b
         ON a.tenant_id = b.tenant_id
        AND a.code = b.code
        AND a.record_id < b.record_id
       WHERE a.status <> 'DELETED' AND b.status <> 'DELETED'
         AND (?2 IS NULL OR a.tenant_id = ?2)
         AND a.effective_date <= COALESCE(b.end_date, '9999-12-31')
         AND b.effective_date <= COALESCE(a.end_date, '9999-12-31')"
    ))?,
    inconsistent_flag_count: q(format!(
      "SELECT COUNT(*) FROM {t}
       WHERE (?2 IS NULL OR tenant_id = ?2)
         AND ((status <> 'DELETED'
               AND is_current <> (effective_date <= ?1
                                  AND (end_date IS NULL OR end_date >= ?1)))
              OR (status = 'DELETED' AND is_current = 1))"
    ))?,
    orphan_record_count: q(format!(
      "SELECT COUNT(*) FROM {t} c
       WHERE c.status <> 'DELETED' AND c.is_current = 1
         AND c.parent_code IS NOT NULL
         AND (?2 IS NULL OR c.tenant_id = ?2)
         AND NOT EXISTS (
           SELECT 1 FROM organization_units p
           WHERE p.tenant_id = c.tenant_id AND p.code = c.parent_code
             AND p.status <> 'DELETED' AND p.is_current = 1)"
    ))?,
    ..Default::default()
  })
}

fn scan(tx: &Transaction<'_>, today: &str, tenant: Option<&str>) -> Result<MonitoringMetrics> {
  let mut total = MonitoringMetrics::default();
  for kind in EntityKind::ALL {
    let m = scan_table(tx, kind, today, tenant)?;
    total.total_entities += m.total_entities;
    total.current_record_count += m.current_record_count;
    total.future_record_count += m.future_record_count;
    total.historical_record_count += m.historical_record_count;
    total.duplicate_current_count += m.duplicate_current_count;
    total.missing_current_count += m.missing_current_count;
    total.timeline_overlap_count += m.timeline_overlap_count;
    total.inconsistent_flag_count += m.inconsistent_flag_count;
    total.orphan_record_count += m.orphan_record_count;
  }
  Ok(total)
}

// ─── ConsistencyMonitor impl ─────────────────────────────────────────────────

impl ConsistencyMonitor for SqliteMonitor {
  type Error = Error;

  async fn collect_metrics(&self, scope: Scope) -> Result<MonitoringMetrics> {
    let clock = &self.store.deps.clock;
    let today = encode_date(clock.today());
    let checked_at = clock.now();
    let tenant = scope.tenant().map(encode_uuid);

    let mut metrics = self
      .store
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        Ok(scan(&tx, &today, tenant.as_deref()))
      })
      .await??;
    metrics.last_check_time = checked_at;
    metrics.grade();

    tracing::info!(
      entities = metrics.total_entities,
      health_score = metrics.health_score,
      alert_level = %metrics.alert_level,
      "consistency scan finished"
    );
    Ok(metrics)
  }

  async fn check_alerts(&self, scope: Scope) -> Result<Vec<String>> {
    let metrics = self.collect_metrics(scope).await?;
    let alerts = self.evaluate(&metrics);
    for alert in &alerts {
      tracing::warn!(%alert, "consistency alert");
    }
    Ok(alerts)
  }
}
