//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are RFC 3339 strings, calendar dates are `YYYY-MM-DD`, UUIDs
//! are hyphenated lowercase strings and enums use their upper-case names.

use chrono::{DateTime, NaiveDate, Utc};
use orgline_core::version::{
  EntityKind, TimelineVersion, VersionData, VersionStatus,
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Tables ──────────────────────────────────────────────────────────────────

pub fn table(kind: EntityKind) -> &'static str {
  match kind {
    EntityKind::OrganizationUnit => "organization_units",
    EntityKind::Position => "positions",
  }
}

/// Column list matching [`RawVersion::from_row`].
pub const VERSION_COLUMNS: &str = "record_id, tenant_id, code, effective_date, \
   end_date, is_current, name, unit_type, status, parent_code, sort_order, \
   description, change_reason, revision, created_at, updated_at, deleted_at";

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── NaiveDate ───────────────────────────────────────────────────────────────

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d")
    .map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

// ─── VersionStatus ───────────────────────────────────────────────────────────

pub fn encode_status(s: VersionStatus) -> &'static str {
  match s {
    VersionStatus::Active => "ACTIVE",
    VersionStatus::Inactive => "INACTIVE",
    VersionStatus::Planned => "PLANNED",
    VersionStatus::Deleted => "DELETED",
  }
}

pub fn decode_status(s: &str) -> Result<VersionStatus> {
  s.parse()
    .map_err(|_| Error::Decode(format!("unknown version status: {s:?}")))
}

// ─── Raw rows ────────────────────────────────────────────────────────────────

/// A version row as read from SQLite, before decoding.
pub struct RawVersion {
  pub record_id:      String,
  pub tenant_id:      String,
  pub code:           String,
  pub effective_date: String,
  pub end_date:       Option<String>,
  pub is_current:     bool,
  pub name:           String,
  pub unit_type:      String,
  pub status:         String,
  pub parent_code:    Option<String>,
  pub sort_order:     i64,
  pub description:    Option<String>,
  pub change_reason:  Option<String>,
  pub revision:       i64,
  pub created_at:     String,
  pub updated_at:     String,
  pub deleted_at:     Option<String>,
}

impl RawVersion {
  /// Read a row selected with [`VERSION_COLUMNS`].
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      record_id:      row.get(0)?,
      tenant_id:      row.get(1)?,
      code:           row.get(2)?,
      effective_date: row.get(3)?,
      end_date:       row.get(4)?,
      is_current:     row.get(5)?,
      name:           row.get(6)?,
      unit_type:      row.get(7)?,
      status:         row.get(8)?,
      parent_code:    row.get(9)?,
      sort_order:     row.get(10)?,
      description:    row.get(11)?,
      change_reason:  row.get(12)?,
      revision:       row.get(13)?,
      created_at:     row.get(14)?,
      updated_at:     row.get(15)?,
      deleted_at:     row.get(16)?,
    })
  }

  pub fn into_version(self) -> Result<TimelineVersion> {
    Ok(TimelineVersion {
      record_id:      decode_uuid(&self.record_id)?,
      tenant_id:      decode_uuid(&self.tenant_id)?,
      code:           self.code,
      effective_date: decode_date(&self.effective_date)?,
      end_date:       self.end_date.as_deref().map(decode_date).transpose()?,
      is_current:     self.is_current,
      data:           VersionData {
        name:        self.name,
        unit_type:   self.unit_type,
        status:      decode_status(&self.status)?,
        parent_code: self.parent_code,
        sort_order:  self.sort_order,
        description: self.description,
      },
      change_reason:  self.change_reason,
      revision:       self.revision,
      created_at:     decode_dt(&self.created_at)?,
      updated_at:     decode_dt(&self.updated_at)?,
      deleted_at:     self.deleted_at.as_deref().map(decode_dt).transpose()?,
    })
  }
}
