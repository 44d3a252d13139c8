//! [`SqliteFacade`]: the SQLite implementation of [`TemporalFacade`].
//!
//! Each mutation is a single closure run on the connection thread:
//! `BEGIN IMMEDIATE`, entity lock, mutate, append audit events, commit.
//! Returning early with an error drops the transaction, which rolls it back.

use chrono::NaiveDate;
use orgline_core::{
  Error as CoreError, ErrorKind,
  audit::{AuditEvent, EventType, snapshot},
  context::OperationContext,
  health::Scope,
  metrics::{OperationKind, Outcome},
  store::{RecomputeReport, TemporalFacade},
  version::{
    EntityKey, EntityKind, Timeline, TimelineVersion, VersionPayload,
    VersionStatus, VersionSummary,
  },
};
use rusqlite::TransactionBehavior;
use serde_json::{Map, Value, json};
use tracing::Instrument as _;
use uuid::Uuid;

use crate::{
  Error, Result,
  encode::{decode_uuid, encode_uuid, table},
  guard,
  mutator::Session,
  store::{Deps, SqliteStore, load_versions},
};

/// Timeline operations for one entity kind.
///
/// Cloning is cheap.
#[derive(Clone)]
pub struct SqliteFacade {
  store: SqliteStore,
  kind:  EntityKind,
}

impl SqliteFacade {
  pub(crate) fn new(store: SqliteStore, kind: EntityKind) -> Self {
    Self { store, kind }
  }

  /// Run `f` in a locked transaction for `key`, then report the outcome.
  async fn mutate<T, F>(
    &self,
    op: OperationKind,
    key: EntityKey,
    ctx: OperationContext,
    f: F,
  ) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(&mut Session<'_, '_>) -> Result<T> + Send + 'static,
  {
    let span = tracing::info_span!(
      "timeline",
      operation = %op,
      kind = %self.kind,
      tenant = %key.tenant_id,
      code = %key.code,
      correlation_id = ctx.correlation_id.as_deref().unwrap_or(""),
    );

    let result = self.transact(key, ctx, f).instrument(span.clone()).await;
    span.in_scope(|| self.report(op, &result));
    result
  }

  fn report<T>(&self, op: OperationKind, result: &Result<T>) {
    let Err(e) = result else {
      self.store.deps.metrics.record_operation(op, Outcome::Success);
      tracing::debug!("committed");
      return;
    };
    let kind = e.kind();
    self.store.deps.metrics.record_operation(op, Outcome::Failure(kind));
    match kind {
      ErrorKind::Validation | ErrorKind::Conflict => {
        tracing::warn!(error = %e, error_kind = %kind, "rejected");
      }
      ErrorKind::Integrity | ErrorKind::Infrastructure => {
        tracing::error!(error = %e, error_kind = %kind, "failed");
      }
    }
  }

  async fn transact<T, F>(
    &self,
    key: EntityKey,
    ctx: OperationContext,
    f: F,
  ) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(&mut Session<'_, '_>) -> Result<T> + Send + 'static,
  {
    if key.code.trim().is_empty() {
      return Err(CoreError::InvalidPayload("empty entity code".into()).into());
    }
    ctx.check_deadline()?;

    let deps = self.store.deps.clone();
    let kind = self.kind;
    self
      .store
      .conn
      .call(move |conn| Ok(run_locked(conn, kind, &deps, &key, &ctx, f)))
      .await?
  }

  async fn entity_keys(&self, scope: Scope) -> Result<Vec<EntityKey>> {
    let sql = format!(
      "SELECT DISTINCT tenant_id, code FROM {}
       WHERE (?1 IS NULL OR tenant_id = ?1)
       ORDER BY tenant_id, code",
      table(self.kind)
    );
    let tenant = scope.tenant().map(encode_uuid);

    let raws: Vec<(String, String)> = self
      .store
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params![tenant], |row| {
            Ok((row.get(0)?, row.get(1)?))
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws
      .into_iter()
      .map(|(tenant, code)| Ok(EntityKey::new(decode_uuid(&tenant)?, code)))
      .collect()
  }
}

fn run_locked<T>(
  conn: &mut rusqlite::Connection,
  kind: EntityKind,
  deps: &Deps,
  key: &EntityKey,
  ctx: &OperationContext,
  f: impl FnOnce(&mut Session<'_, '_>) -> Result<T>,
) -> Result<T> {
  let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
  let now = deps.clock.now();
  guard::acquire(&tx, key, now)?;
  ctx.check_deadline()?;

  let mut session = Session {
    tx: &tx,
    kind,
    key,
    ctx,
    today: deps.clock.today(),
    now,
    policy: deps.policy,
    hierarchy: deps.hierarchy.as_ref(),
    events: Vec::new(),
  };
  let value = f(&mut session)?;
  let events = session.events;

  for event in &events {
    deps.audit.append(&tx, event).map_err(|e| match e {
      Error::Audit(_) => e,
      other => Error::Audit(other.to_string()),
    })?;
  }

  ctx.check_deadline()?;
  tx.commit()?;
  Ok(value)
}

fn read_timeline(
  conn: &rusqlite::Connection,
  kind: EntityKind,
  key: EntityKey,
  include_deleted: bool,
) -> Result<Timeline> {
  let mut versions = load_versions(conn, kind, &key, true)?;
  if versions.is_empty() {
    return Err(
      CoreError::EntityNotFound { tenant_id: key.tenant_id, code: key.code }
        .into(),
    );
  }
  if !include_deleted {
    versions.retain(TimelineVersion::is_live);
  }
  Ok(Timeline { key, versions })
}

/// An event about `resource_id`, stamped from the session.
fn event(
  s: &Session<'_, '_>,
  resource_id: Uuid,
  event_type: EventType,
  action: &str,
) -> AuditEvent {
  AuditEvent::new(
    s.ctx,
    s.kind,
    s.key.tenant_id,
    &s.key.code,
    resource_id,
    event_type,
    action,
    s.now,
  )
}

/// Boundary state of every row, keyed by record id.
fn boundaries(versions: &[TimelineVersion]) -> Map<String, Value> {
  versions
    .iter()
    .map(|v| {
      (
        v.record_id.to_string(),
        json!({ "end_date": v.end_date, "is_current": v.is_current }),
      )
    })
    .collect()
}

// ─── TemporalFacade impl ─────────────────────────────────────────────────────

impl TemporalFacade for SqliteFacade {
  type Error = Error;

  // ── Mutations ─────────────────────────────────────────────────────────────

  async fn insert_version(
    &self,
    key: EntityKey,
    effective_date: NaiveDate,
    payload: VersionPayload,
    ctx: OperationContext,
  ) -> Result<VersionSummary> {
    self
      .mutate(OperationKind::Insert, key, ctx, move |s| {
        let version = s.insert(effective_date, payload)?;
        let e = event(s, version.record_id, EventType::Create, "InsertVersion")
          .with_snapshots(Map::new(), snapshot(&version)?);
        s.record(e);
        Ok(VersionSummary::from(&version))
      })
      .await
  }

  async fn update_effective_date(
    &self,
    key: EntityKey,
    record_id: Uuid,
    new_date: NaiveDate,
    ctx: OperationContext,
  ) -> Result<VersionSummary> {
    self
      .mutate(OperationKind::UpdateEffectiveDate, key, ctx, move |s| {
        let target = s.find_live(record_id)?;
        s.ctx.check_revision(target.revision)?;
        s.ensure_free(new_date, Some(record_id))?;

        s.delete(&target)?;
        let moved = s.insert_data(new_date, target.data.clone())?;
        s.recompute()?;
        let moved = s.find(moved.record_id)?;

        let e = event(s, moved.record_id, EventType::Update, "UpdateEffectiveDate")
          .with_snapshots(snapshot(&target)?, snapshot(&moved)?);
        s.record(e);
        Ok(VersionSummary::from(&moved))
      })
      .await
  }

  async fn delete_version(
    &self,
    key: EntityKey,
    record_id: Uuid,
    ctx: OperationContext,
  ) -> Result<()> {
    self
      .mutate(OperationKind::Delete, key, ctx, move |s| {
        let target = s.find_live(record_id)?;
        s.ctx.check_revision(target.revision)?;
        let deleted = s.delete(&target)?;

        let e = event(s, record_id, EventType::Delete, "DeleteVersion")
          .with_snapshots(snapshot(&target)?, snapshot(&deleted)?);
        s.record(e);
        Ok(())
      })
      .await
  }

  async fn status_transition(
    &self,
    key: EntityKey,
    target: VersionStatus,
    effective_date: NaiveDate,
    ctx: OperationContext,
  ) -> Result<Timeline> {
    self
      .mutate(OperationKind::StatusTransition, key, ctx, move |s| {
        let live = s.load(false)?;
        if live.is_empty() {
          return Err(s.not_found().into());
        }

        let current = live.iter().find(|v| v.is_current).cloned();
        if let Some(current) = &current
          && current.data.status == target
        {
          tracing::debug!(status = %target, "status unchanged");
          return Ok(Timeline { key: s.key.clone(), versions: live });
        }

        let payload = VersionPayload::with_status(target);
        let version = match &current {
          Some(current) => s.insert_over(effective_date, payload, &current.data)?,
          None => s.insert(effective_date, payload)?,
        };
        let before = current.as_ref().map(snapshot).transpose()?.unwrap_or_default();
        let event_type = match target {
          VersionStatus::Inactive => EventType::Suspend,
          VersionStatus::Active => EventType::Activate,
          _ => EventType::Update,
        };
        let e = event(s, version.record_id, event_type, "StatusTransition")
          .with_snapshots(before, snapshot(&version)?);
        s.record(e);

        Ok(Timeline { key: s.key.clone(), versions: s.load(false)? })
      })
      .await
  }

  async fn recompute_timeline(
    &self,
    key: EntityKey,
    ctx: OperationContext,
  ) -> Result<()> {
    self
      .mutate(OperationKind::Recompute, key, ctx, move |s| {
        let before = s.load(true)?;
        if before.is_empty() {
          return Err(s.not_found().into());
        }

        let written = s.recompute()?;
        if written > 0 {
          let after = s.load(true)?;
          let resource = after
            .iter()
            .find(|v| v.is_current)
            .or_else(|| after.iter().rfind(|v| v.is_live()))
            .map_or(Uuid::nil(), |v| v.record_id);
          let e = event(s, resource, EventType::Recompute, "RecomputeTimeline")
            .with_snapshots(boundaries(&before), boundaries(&after));
          s.record(e);
          tracing::info!(rows = written, "timeline repaired");
        }
        Ok(())
      })
      .await
  }

  async fn recompute_all(&self, scope: Scope) -> Result<RecomputeReport<Error>> {
    let keys = self.entity_keys(scope).await?;
    let mut report = RecomputeReport::default();

    for key in keys {
      match self
        .recompute_timeline(key.clone(), OperationContext::system())
        .await
      {
        Ok(()) => report.completed += 1,
        Err(e) => {
          report.failed += 1;
          if report.first_error.is_none() {
            report.first_error = Some((key, e));
          }
        }
      }
    }

    tracing::info!(
      kind = %self.kind,
      completed = report.completed,
      failed = report.failed,
      "bulk recompute finished"
    );
    Ok(report)
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  async fn get_timeline(
    &self,
    key: EntityKey,
    include_deleted: bool,
  ) -> Result<Timeline> {
    let kind = self.kind;
    self
      .store
      .conn
      .call(move |conn| Ok(read_timeline(conn, kind, key, include_deleted)))
      .await?
  }

  async fn get_current(&self, key: EntityKey) -> Result<Option<TimelineVersion>> {
    let kind = self.kind;
    let versions = self
      .store
      .conn
      .call(move |conn| Ok(load_versions(conn, kind, &key, false)))
      .await??;
    Ok(versions.into_iter().find(|v| v.is_current))
  }
}
