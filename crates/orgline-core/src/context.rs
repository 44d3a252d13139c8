//! Per-call context and the clock capability.

use std::time::Instant;

use chrono::{DateTime, NaiveDate, Utc};

use crate::{Error, Result};

/// Caller-supplied metadata carried through one facade operation.
#[derive(Debug, Clone, Default)]
pub struct OperationContext {
  /// Who is making the change. `None` or blank means the system itself.
  pub actor_id:          Option<String>,
  pub correlation_id:    Option<String>,
  /// Free-text reason stored on the new version and on the audit event.
  pub reason:            Option<String>,
  /// The operation is aborted and rolled back once this instant passes.
  pub deadline:          Option<Instant>,
  /// Optimistic-concurrency token for operations addressing an existing
  /// version by record id.
  pub expected_revision: Option<i64>,
}

impl OperationContext {
  pub fn system() -> Self { Self::default() }

  pub fn actor(actor_id: impl Into<String>) -> Self {
    Self { actor_id: Some(actor_id.into()), ..Default::default() }
  }

  pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
    self.reason = Some(reason.into());
    self
  }

  pub fn with_deadline(mut self, deadline: Instant) -> Self {
    self.deadline = Some(deadline);
    self
  }

  pub fn expecting_revision(mut self, revision: i64) -> Self {
    self.expected_revision = Some(revision);
    self
  }

  /// The trimmed reason, if any.
  pub fn reason(&self) -> Option<String> {
    self
      .reason
      .as_deref()
      .map(str::trim)
      .filter(|r| !r.is_empty())
      .map(str::to_owned)
  }

  pub fn check_deadline(&self) -> Result<()> {
    match self.deadline {
      Some(deadline) if Instant::now() >= deadline => {
        Err(Error::DeadlineExceeded)
      }
      _ => Ok(()),
    }
  }

  pub fn check_revision(&self, actual: i64) -> Result<()> {
    match self.expected_revision {
      Some(expected) if expected != actual => {
        Err(Error::PreconditionFailed { expected, actual })
      }
      _ => Ok(()),
    }
  }
}

// ─── Clock ───────────────────────────────────────────────────────────────────

/// Source of "now" and "today". Injected so tests can pin the calendar.
pub trait Clock: Send + Sync {
  fn now(&self) -> DateTime<Utc>;

  /// Today's calendar date in UTC.
  fn today(&self) -> NaiveDate { self.now().date_naive() }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> DateTime<Utc> { Utc::now() }
}

/// A clock frozen at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl FixedClock {
  /// Noon UTC on `date`.
  pub fn on(date: NaiveDate) -> Self {
    Self(date.and_hms_opt(12, 0, 0).unwrap_or_default().and_utc())
  }
}

impl Clock for FixedClock {
  fn now(&self) -> DateTime<Utc> { self.0 }
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use super::*;

  #[test]
  fn expired_deadline_is_reported() {
    let ctx = OperationContext::system().with_deadline(Instant::now());
    assert!(matches!(ctx.check_deadline(), Err(Error::DeadlineExceeded)));

    let ctx = OperationContext::system()
      .with_deadline(Instant::now() + Duration::from_secs(60));
    assert!(ctx.check_deadline().is_ok());
  }

  #[test]
  fn revision_mismatch_is_a_precondition_failure() {
    let ctx = OperationContext::system().expecting_revision(3);
    assert!(ctx.check_revision(3).is_ok());
    assert!(matches!(
      ctx.check_revision(4),
      Err(Error::PreconditionFailed { expected: 3, actual: 4 })
    ));
  }

  #[test]
  fn fixed_clock_reports_its_date() {
    let day: NaiveDate = "2024-06-01".parse().unwrap();
    assert_eq!(FixedClock::on(day).today(), day);
  }
}
