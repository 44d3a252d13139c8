//! Pure interval arithmetic shared by every storage backend.
//!
//! Backends load rows and apply the plans computed here; nothing in this
//! module touches storage.

use chrono::NaiveDate;
use uuid::Uuid;

use crate::{Error, Result, version::TimelineVersion};

/// The day before `next`, i.e. the end date of a version followed by a
/// version effective on `next`.
pub fn day_before(next: NaiveDate) -> Result<NaiveDate> {
  next.pred_opt().ok_or_else(|| {
    Error::IntegrityViolation(format!("no day precedes {next}"))
  })
}

/// Whether a version with the given interval is current on `today`.
pub fn derive_is_current(
  effective: NaiveDate,
  end: Option<NaiveDate>,
  today: NaiveDate,
) -> bool {
  effective <= today && end.is_none_or(|end| end >= today)
}

/// Preconditions for inserting a version effective `date` between the
/// adjacent live versions starting `prev` and `next`.
pub fn check_insert(
  code: &str,
  date: NaiveDate,
  prev: Option<NaiveDate>,
  next: Option<NaiveDate>,
) -> Result<()> {
  if prev == Some(date) || next == Some(date) {
    return Err(Error::TemporalPointConflict { code: code.to_owned(), date });
  }
  if let Some(next) = next
    && date >= next
  {
    return Err(Error::TemporalOverlapConflict {
      code: code.to_owned(),
      date,
      next,
    });
  }
  if let Some(prev) = prev
    && prev > date
  {
    return Err(Error::IntegrityViolation(format!(
      "{code}: previous version {prev} starts after {date}"
    )));
  }
  Ok(())
}

// ─── Recompute plan ──────────────────────────────────────────────────────────

/// The derived boundary state of one live version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Boundary {
  pub record_id:  Uuid,
  pub end_date:   Option<NaiveDate>,
  pub is_current: bool,
}

/// Derive end dates and the current flag for live versions sorted by
/// effective date.
///
/// Fails with [`Error::IntegrityViolation`] if two versions share an
/// effective date or the input is not sorted; such a timeline cannot be
/// repaired without a human deciding which version wins.
pub fn plan_recompute(
  versions: &[(Uuid, NaiveDate)],
  today: NaiveDate,
) -> Result<Vec<Boundary>> {
  for pair in versions.windows(2) {
    if pair[0].1 >= pair[1].1 {
      return Err(Error::IntegrityViolation(format!(
        "versions {} and {} are not strictly ordered ({} >= {})",
        pair[0].0, pair[1].0, pair[0].1, pair[1].1
      )));
    }
  }

  let current = versions.iter().rposition(|(_, eff)| *eff <= today);

  versions
    .iter()
    .enumerate()
    .map(|(i, (record_id, _))| {
      let end_date = versions
        .get(i + 1)
        .map(|(_, next)| day_before(*next))
        .transpose()?;
      Ok(Boundary {
        record_id:  *record_id,
        end_date,
        is_current: current == Some(i),
      })
    })
    .collect()
}

// ─── Verification ────────────────────────────────────────────────────────────

/// Check every timeline invariant over an entity's versions (deleted rows
/// included; they are filtered here). Returns a description of each
/// violation.
pub fn violations(
  versions: &[TimelineVersion],
  today: NaiveDate,
) -> Vec<String> {
  let mut live: Vec<&TimelineVersion> =
    versions.iter().filter(|v| v.is_live()).collect();
  live.sort_by_key(|v| v.effective_date);

  let mut found = Vec::new();

  for pair in live.windows(2) {
    let (a, b) = (pair[0], pair[1]);
    if a.effective_date == b.effective_date {
      found.push(format!("{} and {} share {}", a.record_id, b.record_id, a.effective_date));
      continue;
    }
    match a.end_date {
      Some(end) if Some(end) == b.effective_date.pred_opt() => {}
      other => found.push(format!(
        "{} ends {other:?}, expected the day before {}",
        a.record_id, b.effective_date
      )),
    }
  }
  if let Some(last) = live.last()
    && last.end_date.is_some()
  {
    found.push(format!("tail {} is not open-ended", last.record_id));
  }

  let current: Vec<_> = live.iter().filter(|v| v.is_current).collect();
  if current.len() > 1 {
    found.push(format!("{} versions flagged current", current.len()));
  }
  for v in &live {
    if v.is_current != v.covers(today) {
      found.push(format!(
        "{} is_current={} but covers(today)={}",
        v.record_id,
        v.is_current,
        v.covers(today)
      ));
    }
  }
  for v in versions.iter().filter(|v| !v.is_live() && v.is_current) {
    found.push(format!("deleted version {} flagged current", v.record_id));
  }

  found
}
