//! Operation metrics capability.
//!
//! The facade reports every operation outcome to an injected sink instead of
//! bumping process-wide counters.

use crate::error::ErrorKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum OperationKind {
  Insert,
  UpdateEffectiveDate,
  Delete,
  StatusTransition,
  Recompute,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
  Success,
  Failure(ErrorKind),
}

pub trait MetricsSink: Send + Sync {
  fn record_operation(&self, kind: OperationKind, outcome: Outcome);
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
  fn record_operation(&self, _kind: OperationKind, _outcome: Outcome) {}
}

/// Emits one `tracing` event per operation under the `orgline::metrics`
/// target, for deployments that scrape structured logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogMetrics;

impl MetricsSink for LogMetrics {
  fn record_operation(&self, kind: OperationKind, outcome: Outcome) {
    match outcome {
      Outcome::Success => {
        tracing::info!(target: "orgline::metrics", operation = %kind, outcome = "success");
      }
      Outcome::Failure(error_kind) => {
        tracing::info!(
          target: "orgline::metrics",
          operation = %kind,
          outcome = "failure",
          error_kind = %error_kind,
        );
      }
    }
  }
}
