//! Timeline versions: the rows that make up an entity's history.
//!
//! A version covers the closed interval `[effective_date, end_date]`; an open
//! `end_date` means the version is the latest one. Interval boundaries are
//! never edited directly by callers; they are derived from the neighbouring
//! versions whenever the timeline changes.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Identity ────────────────────────────────────────────────────────────────

/// The kind of entity whose history a timeline tracks.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EntityKind {
  OrganizationUnit,
  Position,
}

impl EntityKind {
  pub const ALL: [EntityKind; 2] = [Self::OrganizationUnit, Self::Position];
}

/// Identifies one timeline: a business code within a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityKey {
  pub tenant_id: Uuid,
  pub code:      String,
}

impl EntityKey {
  pub fn new(tenant_id: Uuid, code: impl Into<String>) -> Self {
    Self { tenant_id, code: code.into() }
  }

  /// The name the per-entity lock is keyed on.
  pub fn lock_name(&self) -> String { format!("{}:{}", self.tenant_id, self.code) }
}

impl std::fmt::Display for EntityKey {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}/{}", self.tenant_id, self.code)
  }
}

// ─── Status ──────────────────────────────────────────────────────────────────

/// Lifecycle state carried by a version.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
  strum::AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum VersionStatus {
  Active,
  Inactive,
  Planned,
  /// Soft-deleted. Excluded from interval math but kept for history.
  Deleted,
}

// ─── Descriptive data ────────────────────────────────────────────────────────

/// The descriptive fields of a version, copied forward from one version to
/// the next unless a mutation changes them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionData {
  pub name:        String,
  pub unit_type:   String,
  pub status:      VersionStatus,
  pub parent_code: Option<String>,
  pub sort_order:  i64,
  pub description: Option<String>,
}

/// Input for a new version. Every `None` field is filled from the latest
/// existing version of the entity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VersionPayload {
  pub name:        Option<String>,
  pub unit_type:   Option<String>,
  pub status:      Option<VersionStatus>,
  /// `Some("")` detaches the entity from its parent.
  pub parent_code: Option<String>,
  pub sort_order:  Option<i64>,
  pub description: Option<String>,
}

impl VersionPayload {
  /// A payload that only changes the status.
  pub fn with_status(status: VersionStatus) -> Self {
    Self { status: Some(status), ..Default::default() }
  }

  /// Resolve against the latest existing data (copy-forward).
  ///
  /// Without a base, `name` and `unit_type` are mandatory and the status
  /// defaults to [`VersionStatus::Active`].
  pub fn resolve(self, base: Option<&VersionData>) -> Result<VersionData> {
    let name = non_blank(self.name)
      .or_else(|| base.map(|b| b.name.clone()))
      .ok_or_else(|| Error::InvalidPayload("missing name".into()))?;
    let unit_type = non_blank(self.unit_type)
      .or_else(|| base.map(|b| b.unit_type.clone()))
      .ok_or_else(|| Error::InvalidPayload("missing unit type".into()))?;

    let status = self
      .status
      .or_else(|| base.map(|b| b.status))
      .unwrap_or(VersionStatus::Active);
    if status == VersionStatus::Deleted {
      return Err(Error::InvalidPayload(
        "a version cannot be created as DELETED".into(),
      ));
    }

    let parent_code = match self.parent_code {
      Some(p) => non_blank(Some(p)),
      None => base.and_then(|b| b.parent_code.clone()),
    };

    Ok(VersionData {
      name,
      unit_type,
      status,
      parent_code,
      sort_order: self
        .sort_order
        .or_else(|| base.map(|b| b.sort_order))
        .unwrap_or(0),
      description: self
        .description
        .or_else(|| base.and_then(|b| b.description.clone())),
    })
  }
}

fn non_blank(value: Option<String>) -> Option<String> {
  value
    .map(|v| v.trim().to_owned())
    .filter(|v| !v.is_empty())
}

// ─── Version ─────────────────────────────────────────────────────────────────

/// One row of an entity's timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineVersion {
  pub record_id:      Uuid,
  pub tenant_id:      Uuid,
  pub code:           String,
  pub effective_date: NaiveDate,
  /// Last day (inclusive) this version applies; `None` for the latest one.
  pub end_date:       Option<NaiveDate>,
  pub is_current:     bool,
  #[serde(flatten)]
  pub data:           VersionData,
  pub change_reason:  Option<String>,
  /// Bumped on every write to the row; used as the optimistic-concurrency
  /// token.
  pub revision:       i64,
  pub created_at:     DateTime<Utc>,
  pub updated_at:     DateTime<Utc>,
  pub deleted_at:     Option<DateTime<Utc>>,
}

impl TimelineVersion {
  pub fn is_live(&self) -> bool {
    self.data.status != VersionStatus::Deleted && self.deleted_at.is_none()
  }

  /// Whether the interval contains `day`.
  pub fn covers(&self, day: NaiveDate) -> bool {
    self.effective_date <= day && self.end_date.is_none_or(|end| end >= day)
  }
}

/// The compact view of a version returned by mutating operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionSummary {
  pub record_id:      Uuid,
  pub code:           String,
  pub effective_date: NaiveDate,
  pub end_date:       Option<NaiveDate>,
  pub is_current:     bool,
  pub status:         VersionStatus,
  pub revision:       i64,
}

impl From<&TimelineVersion> for VersionSummary {
  fn from(v: &TimelineVersion) -> Self {
    Self {
      record_id:      v.record_id,
      code:           v.code.clone(),
      effective_date: v.effective_date,
      end_date:       v.end_date,
      is_current:     v.is_current,
      status:         v.data.status,
      revision:       v.revision,
    }
  }
}

/// An entity's versions, ordered by effective date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Timeline {
  pub key:      EntityKey,
  pub versions: Vec<TimelineVersion>,
}

impl Timeline {
  pub fn current(&self) -> Option<&TimelineVersion> {
    self.versions.iter().find(|v| v.is_current && v.is_live())
  }

  pub fn live(&self) -> impl Iterator<Item = &TimelineVersion> {
    self.versions.iter().filter(|v| v.is_live())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn base() -> VersionData {
    VersionData {
      name:        "Engineering".into(),
      unit_type:   "DEPARTMENT".into(),
      status:      VersionStatus::Active,
      parent_code: Some("1000000".into()),
      sort_order:  3,
      description: Some("builds things".into()),
    }
  }

  #[test]
  fn resolve_copies_missing_fields_forward() {
    let data = VersionPayload::with_status(VersionStatus::Inactive)
      .resolve(Some(&base()))
      .unwrap();
    assert_eq!(data.name, "Engineering");
    assert_eq!(data.status, VersionStatus::Inactive);
    assert_eq!(data.parent_code.as_deref(), Some("1000000"));
    assert_eq!(data.sort_order, 3);
    assert_eq!(data.description.as_deref(), Some("builds things"));
  }

  #[test]
  fn resolve_blank_parent_detaches() {
    let payload = VersionPayload {
      parent_code: Some("  ".into()),
      ..Default::default()
    };
    let data = payload.resolve(Some(&base())).unwrap();
    assert_eq!(data.parent_code, None);
  }

  #[test]
  fn resolve_without_base_requires_name() {
    let err = VersionPayload {
      unit_type: Some("DEPARTMENT".into()),
      ..Default::default()
    }
    .resolve(None)
    .unwrap_err();
    assert!(matches!(err, Error::InvalidPayload(_)));
  }

  #[test]
  fn resolve_rejects_deleted_status() {
    let err = VersionPayload::with_status(VersionStatus::Deleted)
      .resolve(Some(&base()))
      .unwrap_err();
    assert!(matches!(err, Error::InvalidPayload(_)));
  }

  #[test]
  fn status_round_trips_through_strings() {
    assert_eq!(VersionStatus::Inactive.to_string(), "INACTIVE");
    assert_eq!(
      "PLANNED".parse::<VersionStatus>().unwrap(),
      VersionStatus::Planned
    );
  }
}
