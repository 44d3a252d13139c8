//! Dataset health metrics and the alert rules evaluated over them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which tenants a monitoring or bulk-repair pass covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "scope", content = "tenant_id", rename_all = "snake_case")]
pub enum Scope {
  #[default]
  All,
  Tenant(Uuid),
}

impl Scope {
  pub fn tenant(&self) -> Option<Uuid> {
    match self {
      Self::All => None,
      Self::Tenant(id) => Some(*id),
    }
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Default,
  Serialize,
  Deserialize,
  strum::Display,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertLevel {
  #[default]
  Healthy,
  Warning,
  Critical,
}

// ─── Metrics ─────────────────────────────────────────────────────────────────

/// One scan's worth of counts. Violation counts are zero on a healthy
/// dataset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringMetrics {
  pub total_entities:          i64,
  pub current_record_count:    i64,
  pub future_record_count:     i64,
  pub historical_record_count: i64,
  /// Entities with more than one current version.
  pub duplicate_current_count: i64,
  /// Entities with a started version but no current one.
  pub missing_current_count:   i64,
  /// Pairs of live versions of one entity whose intervals intersect.
  pub timeline_overlap_count:  i64,
  /// Versions whose stored flag disagrees with their interval.
  pub inconsistent_flag_count: i64,
  /// Versions whose parent has no live current version.
  pub orphan_record_count:     i64,
  pub health_score:            f64,
  pub alert_level:             AlertLevel,
  pub last_check_time:         DateTime<Utc>,
}

impl MonitoringMetrics {
  /// Fill in `health_score` and `alert_level` from the counts.
  pub fn grade(&mut self) {
    let mut score = 100.0;
    if self.duplicate_current_count > 0 {
      score -= 40.0;
    }
    if self.missing_current_count > 0 {
      score -= 40.0;
    }
    if self.timeline_overlap_count > 0 {
      score -= 30.0;
    }
    score -= self.inconsistent_flag_count as f64 * 2.0;
    score -= self.orphan_record_count as f64;
    self.health_score = f64::max(score, 0.0);

    let hard_violation = self.duplicate_current_count > 0
      || self.missing_current_count > 0
      || self.timeline_overlap_count > 0;

    self.alert_level = if self.health_score < 50.0 || hard_violation {
      AlertLevel::Critical
    } else if self.health_score < 85.0
      || self.inconsistent_flag_count > 5
      || self.orphan_record_count > 10
    {
      AlertLevel::Warning
    } else {
      AlertLevel::Healthy
    };
  }
}

// ─── Alert rules ─────────────────────────────────────────────────────────────

/// The metric an alert rule watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
  DuplicateCurrent,
  MissingCurrent,
  TimelineOverlaps,
  InconsistentFlags,
  OrphanRecords,
  /// Fires when the score drops *below* the threshold; every other metric
  /// fires when the count rises above it.
  HealthScore,
}

impl Metric {
  pub fn value(&self, m: &MonitoringMetrics) -> i64 {
    match self {
      Self::DuplicateCurrent => m.duplicate_current_count,
      Self::MissingCurrent => m.missing_current_count,
      Self::TimelineOverlaps => m.timeline_overlap_count,
      Self::InconsistentFlags => m.inconsistent_flag_count,
      Self::OrphanRecords => m.orphan_record_count,
      Self::HealthScore => m.health_score as i64,
    }
  }

  fn breached(&self, value: i64, threshold: i64) -> bool {
    match self {
      Self::HealthScore => value < threshold,
      _ => value > threshold,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
  pub name:        String,
  pub metric:      Metric,
  pub description: String,
  pub threshold:   i64,
  pub level:       AlertLevel,
}

impl AlertRule {
  fn new(
    name: &str,
    metric: Metric,
    description: &str,
    threshold: i64,
    level: AlertLevel,
  ) -> Self {
    Self {
      name: name.to_owned(),
      metric,
      description: description.to_owned(),
      threshold,
      level,
    }
  }

  /// The alert line for this rule, if it fires on `metrics`.
  pub fn check(&self, metrics: &MonitoringMetrics) -> Option<String> {
    let value = self.metric.value(metrics);
    self.metric.breached(value, self.threshold).then(|| {
      format!(
        "[{}] {}: current={}, threshold={}",
        self.level, self.description, value, self.threshold
      )
    })
  }
}

/// The stock rule set, in evaluation order.
pub fn default_rules() -> Vec<AlertRule> {
  use AlertLevel::{Critical, Warning};
  vec![
    AlertRule::new(
      "DUPLICATE_CURRENT_RECORDS",
      Metric::DuplicateCurrent,
      "entities with more than one current version",
      0,
      Critical,
    ),
    AlertRule::new(
      "MISSING_CURRENT_RECORDS",
      Metric::MissingCurrent,
      "entities missing a current version",
      0,
      Critical,
    ),
    AlertRule::new(
      "TIMELINE_OVERLAPS",
      Metric::TimelineOverlaps,
      "overlapping version pairs",
      0,
      Critical,
    ),
    AlertRule::new(
      "INCONSISTENT_FLAGS",
      Metric::InconsistentFlags,
      "versions whose current flag disagrees with their interval",
      5,
      Warning,
    ),
    AlertRule::new(
      "ORPHAN_RECORDS",
      Metric::OrphanRecords,
      "versions whose parent has no current version",
      10,
      Warning,
    ),
    AlertRule::new(
      "HEALTH_SCORE",
      Metric::HealthScore,
      "health score below threshold",
      85,
      Warning,
    ),
  ]
}

/// Evaluate `rules` in order and collect the lines of those that fire.
pub fn evaluate(metrics: &MonitoringMetrics, rules: &[AlertRule]) -> Vec<String> {
  rules.iter().filter_map(|r| r.check(metrics)).collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn clean_dataset_is_healthy() {
    let mut m = MonitoringMetrics { total_entities: 12, ..Default::default() };
    m.grade();
    assert_eq!(m.health_score, 100.0);
    assert_eq!(m.alert_level, AlertLevel::Healthy);
    assert!(evaluate(&m, &default_rules()).is_empty());
  }

  #[test]
  fn any_duplicate_current_is_critical() {
    let mut m =
      MonitoringMetrics { duplicate_current_count: 1, ..Default::default() };
    m.grade();
    assert_eq!(m.health_score, 60.0);
    assert_eq!(m.alert_level, AlertLevel::Critical);

    let alerts = evaluate(&m, &default_rules());
    assert_eq!(alerts.len(), 2);
    assert!(alerts[0].starts_with("[CRITICAL]"));
    assert!(alerts[1].contains("health score"));
  }

  #[test]
  fn few_inconsistent_flags_only_dent_the_score() {
    let mut m =
      MonitoringMetrics { inconsistent_flag_count: 3, ..Default::default() };
    m.grade();
    assert_eq!(m.health_score, 94.0);
    assert_eq!(m.alert_level, AlertLevel::Healthy);
  }

  #[test]
  fn many_orphans_warn() {
    let mut m = MonitoringMetrics { orphan_record_count: 11, ..Default::default() };
    m.grade();
    assert_eq!(m.health_score, 89.0);
    assert_eq!(m.alert_level, AlertLevel::Warning);
    let alerts = evaluate(&m, &default_rules());
    assert_eq!(alerts.len(), 1);
    assert!(alerts[0].starts_with("[WARNING]"));
  }

  #[test]
  fn score_never_goes_negative() {
    let mut m = MonitoringMetrics {
      duplicate_current_count: 3,
      missing_current_count:   2,
      timeline_overlap_count:  4,
      inconsistent_flag_count: 40,
      ..Default::default()
    };
    m.grade();
    assert_eq!(m.health_score, 0.0);
  }
}
