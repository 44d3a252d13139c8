//! Error types for `orgline-core`.

use chrono::NaiveDate;
use thiserror::Error;
use uuid::Uuid;

/// Broad classification of a failure, used by callers to decide how to
/// translate it and by metrics sinks to bucket outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
  /// A precondition on the request itself was violated.
  Validation,
  /// The request clashes with the stored timeline or a concurrent writer.
  Conflict,
  /// The stored timeline is in a state the engine cannot repair safely.
  Integrity,
  /// Transaction, lock, connection, or encoding failure.
  Infrastructure,
}

#[derive(Debug, Error)]
pub enum Error {
  #[error("TEMPORAL_POINT_CONFLICT: {code} already has a version effective {date}")]
  TemporalPointConflict { code: String, date: NaiveDate },

  #[error(
    "TEMPORAL_OVERLAP_CONFLICT: {code} effective {date} overlaps the version \
     starting {next}"
  )]
  TemporalOverlapConflict {
    code: String,
    date: NaiveDate,
    next: NaiveDate,
  },

  #[error("entity not found: {tenant_id}/{code}")]
  EntityNotFound { tenant_id: Uuid, code: String },

  #[error("version not found: {0}")]
  VersionNotFound(Uuid),

  #[error("precondition failed: expected revision {expected}, found {actual}")]
  PreconditionFailed { expected: i64, actual: i64 },

  #[error("invalid payload: {0}")]
  InvalidPayload(String),

  #[error("timeline integrity violation: {0}")]
  IntegrityViolation(String),

  #[error("operation deadline exceeded")]
  DeadlineExceeded,

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Error {
  pub fn kind(&self) -> ErrorKind {
    match self {
      Self::TemporalPointConflict { .. }
      | Self::EntityNotFound { .. }
      | Self::VersionNotFound(_)
      | Self::InvalidPayload(_) => ErrorKind::Validation,
      Self::TemporalOverlapConflict { .. } | Self::PreconditionFailed { .. } => {
        ErrorKind::Conflict
      }
      Self::IntegrityViolation(_) => ErrorKind::Integrity,
      Self::DeadlineExceeded | Self::Serialization(_) => {
        ErrorKind::Infrastructure
      }
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
