//! Timeline mutations, run inside one locked transaction.
//!
//! A [`Session`] is created by the facade after the entity lock is held. It
//! applies structural changes to the entity's rows and collects the audit
//! events the facade appends before commit.

use chrono::{DateTime, NaiveDate, Utc};
use orgline_core::{
  Error as CoreError,
  audit::AuditEvent,
  config::RepairPolicy,
  context::OperationContext,
  timeline::{check_insert, day_before, plan_recompute},
  version::{
    EntityKey, EntityKind, TimelineVersion, VersionData, VersionPayload,
    VersionStatus,
  },
};
use rusqlite::{OptionalExtension as _, Transaction};
use uuid::Uuid;

use crate::{
  Result,
  adjacency::get_adjacent,
  encode::{
    RawVersion, VERSION_COLUMNS, decode_uuid, encode_date, encode_dt,
    encode_status, encode_uuid, table,
  },
  hierarchy::HierarchyPaths,
  store::load_versions,
};

pub struct Session<'a, 'c> {
  pub tx:        &'a Transaction<'c>,
  pub kind:      EntityKind,
  pub key:       &'a EntityKey,
  pub ctx:       &'a OperationContext,
  pub today:     NaiveDate,
  pub now:       DateTime<Utc>,
  pub policy:    RepairPolicy,
  pub hierarchy: &'a dyn HierarchyPaths,
  pub events:    Vec<AuditEvent>,
}

impl Session<'_, '_> {
  fn table(&self) -> &'static str { table(self.kind) }

  pub fn record(&mut self, event: AuditEvent) { self.events.push(event); }

  // ── Reads ─────────────────────────────────────────────────────────────────

  /// All versions of the entity ordered by effective date.
  pub fn load(&self, include_deleted: bool) -> Result<Vec<TimelineVersion>> {
    load_versions(self.tx, self.kind, self.key, include_deleted)
  }

  fn get(&self, record_id: Uuid) -> Result<Option<TimelineVersion>> {
    let sql = format!(
      "SELECT {VERSION_COLUMNS} FROM {}
       WHERE record_id = ?1 AND tenant_id = ?2 AND code = ?3",
      self.table()
    );
    self
      .tx
      .query_row(
        &sql,
        rusqlite::params![
          encode_uuid(record_id),
          encode_uuid(self.key.tenant_id),
          self.key.code
        ],
        RawVersion::from_row,
      )
      .optional()?
      .map(RawVersion::into_version)
      .transpose()
  }

  /// A version of this entity by record id, deleted or not.
  pub fn find(&self, record_id: Uuid) -> Result<TimelineVersion> {
    Ok(
      self
        .get(record_id)?
        .ok_or(CoreError::VersionNotFound(record_id))?,
    )
  }

  /// A live version of this entity. Distinguishes an unknown entity from an
  /// unknown or deleted version.
  pub fn find_live(&self, record_id: Uuid) -> Result<TimelineVersion> {
    match self.get(record_id)? {
      Some(v) if v.is_live() => Ok(v),
      _ if !self.exists()? => Err(self.not_found().into()),
      _ => Err(CoreError::VersionNotFound(record_id).into()),
    }
  }

  pub fn exists(&self) -> Result<bool> {
    let sql = format!(
      "SELECT EXISTS (SELECT 1 FROM {} WHERE tenant_id = ?1 AND code = ?2)",
      self.table()
    );
    Ok(self.tx.query_row(
      &sql,
      rusqlite::params![encode_uuid(self.key.tenant_id), self.key.code],
      |row| row.get(0),
    )?)
  }

  pub fn not_found(&self) -> CoreError {
    CoreError::EntityNotFound {
      tenant_id: self.key.tenant_id,
      code:      self.key.code.clone(),
    }
  }

  fn live_at(&self, date: NaiveDate) -> Result<Option<Uuid>> {
    let sql = format!(
      "SELECT record_id FROM {}
       WHERE tenant_id = ?1 AND code = ?2 AND effective_date = ?3
         AND status <> 'DELETED'",
      self.table()
    );
    let id: Option<String> = self
      .tx
      .query_row(
        &sql,
        rusqlite::params![
          encode_uuid(self.key.tenant_id),
          self.key.code,
          encode_date(date)
        ],
        |row| row.get(0),
      )
      .optional()?;
    id.as_deref().map(decode_uuid).transpose()
  }

  /// Fail with a point conflict if another live version starts on `date`.
  pub fn ensure_free(&self, date: NaiveDate, except: Option<Uuid>) -> Result<()> {
    match self.live_at(date)? {
      Some(id) if Some(id) != except => Err(
        CoreError::TemporalPointConflict { code: self.key.code.clone(), date }
          .into(),
      ),
      _ => Ok(()),
    }
  }

  /// Descriptive data in effect on `date`, the copy-forward source: the
  /// latest live version starting on or before it, else the latest one.
  fn data_at(&self, date: NaiveDate) -> Result<Option<VersionData>> {
    let mut live = self.load(false)?;
    let at = live
      .iter()
      .rposition(|v| v.effective_date <= date)
      .unwrap_or(live.len().saturating_sub(1));
    Ok((at < live.len()).then(|| live.swap_remove(at).data))
  }

  // ── Row writes ────────────────────────────────────────────────────────────

  fn insert_row(&self, v: &TimelineVersion) -> Result<()> {
    let sql = format!(
      "INSERT INTO {} ({VERSION_COLUMNS})
       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
      self.table()
    );
    self.tx.execute(
      &sql,
      rusqlite::params![
        encode_uuid(v.record_id),
        encode_uuid(v.tenant_id),
        v.code,
        encode_date(v.effective_date),
        v.end_date.map(encode_date),
        v.is_current,
        v.data.name,
        v.data.unit_type,
        encode_status(v.data.status),
        v.data.parent_code,
        v.data.sort_order,
        v.data.description,
        v.change_reason,
        v.revision,
        encode_dt(v.created_at),
        encode_dt(v.updated_at),
        v.deleted_at.map(encode_dt),
      ],
    )?;
    Ok(())
  }

  /// Set a row's derived boundary, bumping its revision.
  fn write_boundary(
    &self,
    record_id: Uuid,
    end_date: Option<NaiveDate>,
    is_current: bool,
  ) -> Result<()> {
    let sql = format!(
      "UPDATE {} SET end_date = ?2, is_current = ?3,
              revision = revision + 1, updated_at = ?4
       WHERE record_id = ?1",
      self.table()
    );
    self.tx.execute(
      &sql,
      rusqlite::params![
        encode_uuid(record_id),
        end_date.map(encode_date),
        is_current,
        encode_dt(self.now)
      ],
    )?;
    Ok(())
  }

  /// Write the boundary only if it differs from `v`'s. Returns whether a
  /// write happened.
  fn patch(
    &self,
    v: &TimelineVersion,
    end_date: Option<NaiveDate>,
    is_current: bool,
  ) -> Result<bool> {
    if v.end_date == end_date && v.is_current == is_current {
      return Ok(false);
    }
    self.write_boundary(v.record_id, end_date, is_current)?;
    Ok(true)
  }

  fn soft_delete(&self, record_id: Uuid) -> Result<()> {
    let sql = format!(
      "UPDATE {} SET status = ?2, is_current = 0, deleted_at = ?3,
              revision = revision + 1, updated_at = ?3
       WHERE record_id = ?1",
      self.table()
    );
    self.tx.execute(
      &sql,
      rusqlite::params![
        encode_uuid(record_id),
        encode_status(VersionStatus::Deleted),
        encode_dt(self.now)
      ],
    )?;
    Ok(())
  }

  // ── Structural changes ────────────────────────────────────────────────────

  /// Insert a version effective `date`, copying missing payload fields from
  /// the version in effect on that date. Returns the stored row.
  pub fn insert(
    &mut self,
    date: NaiveDate,
    payload: VersionPayload,
  ) -> Result<TimelineVersion> {
    let data = payload.resolve(self.data_at(date)?.as_ref())?;
    self.insert_data(date, data)
  }

  /// Insert a version effective `date`, copying missing payload fields from
  /// `base`.
  pub fn insert_over(
    &mut self,
    date: NaiveDate,
    payload: VersionPayload,
    base: &VersionData,
  ) -> Result<TimelineVersion> {
    let data = payload.resolve(Some(base))?;
    self.insert_data(date, data)
  }

  /// Insert a version carrying exactly `data`.
  pub fn insert_data(
    &mut self,
    date: NaiveDate,
    data: VersionData,
  ) -> Result<TimelineVersion> {
    self.ensure_free(date, None)?;
    let adj = get_adjacent(self.tx, self.table(), self.key, date)?;
    check_insert(
      &self.key.code,
      date,
      adj.prev.as_ref().map(|p| p.effective_date),
      adj.next.as_ref().map(|n| n.effective_date),
    )?;

    let end_date = adj
      .next
      .as_ref()
      .map(|n| day_before(n.effective_date))
      .transpose()?;
    let is_current = date <= self.today
      && adj.next.as_ref().is_none_or(|n| n.effective_date > self.today);
    let parent_changed = adj
      .prev
      .as_ref()
      .map_or(data.parent_code.is_some(), |p| {
        p.data.parent_code != data.parent_code
      });

    let version = TimelineVersion {
      record_id: Uuid::new_v4(),
      tenant_id: self.key.tenant_id,
      code: self.key.code.clone(),
      effective_date: date,
      end_date,
      is_current,
      data,
      change_reason: self.ctx.reason(),
      revision: 1,
      created_at: self.now,
      updated_at: self.now,
      deleted_at: None,
    };

    match self.policy {
      RepairPolicy::AlwaysRecompute => {
        self.insert_row(&version)?;
        self.recompute()?;
      }
      RepairPolicy::Incremental => {
        if let Some(prev) = &adj.prev {
          self.patch(
            prev,
            Some(day_before(date)?),
            prev.is_current && !is_current,
          )?;
        }
        self.insert_row(&version)?;
      }
    }

    if parent_changed {
      self.hierarchy.recompute_subtree(self.tx, self.kind, self.key)?;
    }

    self.find(version.record_id)
  }

  /// Soft-delete a live version and reconnect its neighbours. Returns the
  /// deleted row as stored afterwards.
  pub fn delete(&mut self, target: &TimelineVersion) -> Result<TimelineVersion> {
    let adj = get_adjacent(self.tx, self.table(), self.key, target.effective_date)?;
    self.soft_delete(target.record_id)?;

    match self.policy {
      RepairPolicy::AlwaysRecompute => {
        self.recompute()?;
      }
      RepairPolicy::Incremental => {
        self.bridge(target, adj.prev.as_ref(), adj.next.as_ref())?;
      }
    }

    self.find(target.record_id)
  }

  fn bridge(
    &mut self,
    target: &TimelineVersion,
    prev: Option<&TimelineVersion>,
    next: Option<&TimelineVersion>,
  ) -> Result<()> {
    if target.is_current {
      tracing::debug!(record_id = %target.record_id, "current version deleted, recomputing");
      self.recompute()?;
      return Ok(());
    }
    match (prev, next) {
      (Some(prev), Some(next)) => {
        let end = day_before(next.effective_date)?;
        if end < prev.effective_date {
          tracing::warn!(
            prev = %prev.record_id,
            next = %next.record_id,
            "inverted bridge, recomputing timeline"
          );
          self.recompute()?;
        } else {
          self.patch(prev, Some(end), prev.is_current)?;
        }
      }
      (Some(prev), None) => {
        self.patch(prev, None, prev.effective_date <= self.today)?;
      }
      (None, _) => {}
    }
    Ok(())
  }

  /// Rederive every boundary of the entity. Returns the number of rows
  /// written; zero when the timeline was already consistent.
  pub fn recompute(&mut self) -> Result<usize> {
    let all = self.load(true)?;
    let live: Vec<&TimelineVersion> = all.iter().filter(|v| v.is_live()).collect();
    let plan = plan_recompute(
      &live
        .iter()
        .map(|v| (v.record_id, v.effective_date))
        .collect::<Vec<_>>(),
      self.today,
    )?;

    let mut written = 0;
    for (v, b) in live.iter().zip(&plan) {
      if self.patch(v, b.end_date, b.is_current)? {
        written += 1;
      }
    }
    for v in all.iter().filter(|v| !v.is_live() && v.is_current) {
      self.write_boundary(v.record_id, v.end_date, false)?;
      written += 1;
    }
    Ok(written)
  }
}
