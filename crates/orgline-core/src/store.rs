//! The `TemporalFacade` and `ConsistencyMonitor` traits.
//!
//! Both are implemented by storage backends (e.g. `orgline-store-sqlite`).
//! Handlers and schedulers depend on these abstractions, not on any concrete
//! backend.

use std::future::Future;

use chrono::NaiveDate;
use uuid::Uuid;

use crate::{
  health::{MonitoringMetrics, Scope},
  context::OperationContext,
  version::{
    EntityKey, Timeline, TimelineVersion, VersionPayload, VersionStatus,
    VersionSummary,
  },
};

/// Outcome of a bulk recompute. Entities are repaired one transaction at a
/// time, so a failure leaves every earlier entity repaired.
#[derive(Debug)]
pub struct RecomputeReport<E> {
  pub completed:   usize,
  pub failed:      usize,
  pub first_error: Option<(EntityKey, E)>,
}

impl<E> Default for RecomputeReport<E> {
  fn default() -> Self { Self { completed: 0, failed: 0, first_error: None } }
}

// ─── Facade ──────────────────────────────────────────────────────────────────

/// The only entry point for timeline mutations.
///
/// Every mutating method runs in exactly one transaction: the per-entity lock
/// is taken first, the timeline is changed, the audit event is appended, and
/// the transaction commits. Any failure rolls all of it back.
pub trait TemporalFacade: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Mutations ─────────────────────────────────────────────────────────

  /// Insert a version effective `effective_date`, closing the previous
  /// version the day before. Missing payload fields are copied forward.
  fn insert_version(
    &self,
    key: EntityKey,
    effective_date: NaiveDate,
    payload: VersionPayload,
    ctx: OperationContext,
  ) -> impl Future<Output = Result<VersionSummary, Self::Error>> + Send + '_;

  /// Move a version to `new_date`: soft-delete it, insert a copy at the new
  /// date, and recompute the timeline.
  fn update_effective_date(
    &self,
    key: EntityKey,
    record_id: Uuid,
    new_date: NaiveDate,
    ctx: OperationContext,
  ) -> impl Future<Output = Result<VersionSummary, Self::Error>> + Send + '_;

  /// Soft-delete a version and reconnect its neighbours.
  fn delete_version(
    &self,
    key: EntityKey,
    record_id: Uuid,
    ctx: OperationContext,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Insert a version that only changes the status. A no-op when the current
  /// version already has `target`.
  fn status_transition(
    &self,
    key: EntityKey,
    target: VersionStatus,
    effective_date: NaiveDate,
    ctx: OperationContext,
  ) -> impl Future<Output = Result<Timeline, Self::Error>> + Send + '_;

  /// Rederive every end date and current flag of one entity.
  fn recompute_timeline(
    &self,
    key: EntityKey,
    ctx: OperationContext,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Recompute every entity in `scope`, one transaction per entity.
  fn recompute_all(
    &self,
    scope: Scope,
  ) -> impl Future<Output = Result<RecomputeReport<Self::Error>, Self::Error>>
  + Send
  + '_;

  // ── Reads (no lock) ───────────────────────────────────────────────────

  fn get_timeline(
    &self,
    key: EntityKey,
    include_deleted: bool,
  ) -> impl Future<Output = Result<Timeline, Self::Error>> + Send + '_;

  fn get_current(
    &self,
    key: EntityKey,
  ) -> impl Future<Output = Result<Option<TimelineVersion>, Self::Error>>
  + Send
  + '_;
}

// ─── Monitor ─────────────────────────────────────────────────────────────────

/// Read-only, dataset-wide invariant scan. Takes no locks and writes nothing;
/// repairs go through [`TemporalFacade::recompute_timeline`].
pub trait ConsistencyMonitor: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn collect_metrics(
    &self,
    scope: Scope,
  ) -> impl Future<Output = Result<MonitoringMetrics, Self::Error>> + Send + '_;

  /// Collect metrics and return the description of every alert rule that
  /// fires, in rule order.
  fn check_alerts(
    &self,
    scope: Scope,
  ) -> impl Future<Output = Result<Vec<String>, Self::Error>> + Send + '_;
}
