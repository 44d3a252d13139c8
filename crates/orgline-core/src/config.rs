//! Engine configuration, deserialised by the binary from `orgline.toml` and
//! `ORGLINE_*` environment variables. Every field has a default.

use std::{path::PathBuf, time::Duration};

use serde::Deserialize;

use crate::health::{AlertRule, default_rules};

/// How structural changes repair neighbouring versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairPolicy {
  /// Every insert and delete ends with a full recompute of the timeline.
  #[default]
  AlwaysRecompute,
  /// Patch only the adjacent versions, falling back to a full recompute
  /// when the patch cannot be shown to be sufficient.
  Incremental,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
  pub store_path:      PathBuf,
  pub busy_timeout_ms: u64,
  pub repair_policy:   RepairPolicy,
  pub monitor:         MonitorConfig,
  pub scheduler:       SchedulerConfig,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      store_path:      PathBuf::from("orgline.db"),
      busy_timeout_ms: 5_000,
      repair_policy:   RepairPolicy::default(),
      monitor:         MonitorConfig::default(),
      scheduler:       SchedulerConfig::default(),
    }
  }
}

impl EngineConfig {
  pub fn busy_timeout(&self) -> Duration {
    Duration::from_millis(self.busy_timeout_ms)
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
  /// Replaces the stock rule set when non-empty.
  pub alert_rules: Vec<AlertRule>,
}

impl MonitorConfig {
  pub fn rules(&self) -> Vec<AlertRule> {
    if self.alert_rules.is_empty() {
      default_rules()
    } else {
      self.alert_rules.clone()
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
  pub monitor_enabled:         bool,
  pub monitor_interval_secs:   u64,
  pub recompute_enabled:       bool,
  /// Full recompute sweep; keeps `is_current` right as days roll over.
  pub recompute_interval_secs: u64,
}

impl Default for SchedulerConfig {
  fn default() -> Self {
    Self {
      monitor_enabled:         true,
      monitor_interval_secs:   300,
      recompute_enabled:       true,
      recompute_interval_secs: 24 * 60 * 60,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn empty_table_yields_defaults() {
    let cfg: EngineConfig = serde_json::from_str("{}").unwrap();
    assert_eq!(cfg.repair_policy, RepairPolicy::AlwaysRecompute);
    assert_eq!(cfg.busy_timeout(), Duration::from_secs(5));
    assert_eq!(cfg.monitor.rules().len(), default_rules().len());
    assert_eq!(cfg.scheduler.monitor_interval_secs, 300);
  }

  #[test]
  fn policy_and_rules_are_overridable() {
    let cfg: EngineConfig = serde_json::from_str(
      r#"{
        "repair_policy": "incremental",
        "monitor": { "alert_rules": [{
          "name": "ORPHANS", "metric": "orphan_records",
          "description": "orphans", "threshold": 0, "level": "CRITICAL"
        }] }
      }"#,
    )
    .unwrap();
    assert_eq!(cfg.repair_policy, RepairPolicy::Incremental);
    assert_eq!(cfg.monitor.rules().len(), 1);
  }
}
