//! Audit events paired with every timeline mutation.
//!
//! An event is written in the same transaction as the change it describes;
//! storage backends reject the mutation if the event cannot be recorded.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::{context::OperationContext, version::EntityKind};

// ─── Classifiers ─────────────────────────────────────────────────────────────

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
  Create,
  Update,
  Delete,
  Suspend,
  Activate,
  Recompute,
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceType {
  Organization,
  Position,
}

impl From<EntityKind> for ResourceType {
  fn from(kind: EntityKind) -> Self {
    match kind {
      EntityKind::OrganizationUnit => Self::Organization,
      EntityKind::Position => Self::Position,
    }
  }
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ActorType {
  User,
  System,
}

// ─── Event ───────────────────────────────────────────────────────────────────

/// One changed field between the before and after snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
  pub field:     String,
  pub old_value: Value,
  pub new_value: Value,
}

/// An append-only record of one timeline mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
  pub event_id:        Uuid,
  pub tenant_id:       Uuid,
  pub event_type:      EventType,
  pub resource_type:   ResourceType,
  /// The record id of the version the event is about.
  pub resource_id:     Uuid,
  pub entity_code:     String,
  pub actor_id:        String,
  pub actor_type:      ActorType,
  pub action_name:     String,
  pub correlation_id:  Option<String>,
  pub reason:          Option<String>,
  pub recorded_at:     DateTime<Utc>,
  pub before:          Map<String, Value>,
  pub after:           Map<String, Value>,
  pub modified_fields: Vec<String>,
  pub changes:         Vec<FieldChange>,
}

impl AuditEvent {
  /// Build an event for `resource_id`, taking the actor, correlation id and
  /// reason from the operation context. A blank actor is recorded as the
  /// system actor.
  #[allow(clippy::too_many_arguments)]
  pub fn new(
    ctx: &OperationContext,
    kind: EntityKind,
    tenant_id: Uuid,
    entity_code: &str,
    resource_id: Uuid,
    event_type: EventType,
    action_name: &str,
    recorded_at: DateTime<Utc>,
  ) -> Self {
    let actor = ctx
      .actor_id
      .as_deref()
      .map(str::trim)
      .filter(|a| !a.is_empty());
    let (actor_id, actor_type) = match actor {
      Some(a) => (a.to_owned(), ActorType::User),
      None => ("system".to_owned(), ActorType::System),
    };

    Self {
      event_id: Uuid::new_v4(),
      tenant_id,
      event_type,
      resource_type: kind.into(),
      resource_id,
      entity_code: entity_code.to_owned(),
      actor_id,
      actor_type,
      action_name: action_name.to_owned(),
      correlation_id: ctx.correlation_id.clone(),
      reason: ctx.reason(),
      recorded_at,
      before: Map::new(),
      after: Map::new(),
      modified_fields: Vec::new(),
      changes: Vec::new(),
    }
  }

  /// Attach snapshots and derive the modified-field list by diffing them.
  pub fn with_snapshots(
    mut self,
    before: Map<String, Value>,
    after: Map<String, Value>,
  ) -> Self {
    self.changes = diff_fields(&before, &after);
    self.modified_fields =
      self.changes.iter().map(|c| c.field.clone()).collect();
    self.before = before;
    self.after = after;
    self
  }
}

/// Top-level field differences between two snapshots, in sorted field order.
/// Fields missing on one side compare as `null`.
pub fn diff_fields(
  before: &Map<String, Value>,
  after: &Map<String, Value>,
) -> Vec<FieldChange> {
  let mut fields: Vec<&String> = before.keys().chain(after.keys()).collect();
  fields.sort();
  fields.dedup();

  fields
    .into_iter()
    .filter_map(|field| {
      let old = before.get(field).cloned().unwrap_or(Value::Null);
      let new = after.get(field).cloned().unwrap_or(Value::Null);
      (old != new).then(|| FieldChange {
        field:     field.clone(),
        old_value: old,
        new_value: new,
      })
    })
    .collect()
}

/// Serialise a value into a snapshot map; non-object values produce an empty
/// snapshot.
pub fn snapshot<T: Serialize>(value: &T) -> crate::Result<Map<String, Value>> {
  Ok(match serde_json::to_value(value)? {
    Value::Object(map) => map,
    _ => Map::new(),
  })
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  fn obj(v: Value) -> Map<String, Value> {
    match v {
      Value::Object(m) => m,
      _ => unreachable!(),
    }
  }

  #[test]
  fn diff_reports_changed_added_and_removed_fields() {
    let before = obj(json!({ "status": "ACTIVE", "name": "Ops", "gone": 1 }));
    let after = obj(json!({ "status": "INACTIVE", "name": "Ops", "new": 2 }));

    let changes = diff_fields(&before, &after);
    let fields: Vec<_> = changes.iter().map(|c| c.field.as_str()).collect();
    assert_eq!(fields, ["gone", "new", "status"]);
    assert_eq!(changes[2].old_value, json!("ACTIVE"));
    assert_eq!(changes[2].new_value, json!("INACTIVE"));
  }

  #[test]
  fn blank_actor_is_recorded_as_system() {
    let ctx = OperationContext {
      actor_id: Some("   ".into()),
      ..Default::default()
    };
    let event = AuditEvent::new(
      &ctx,
      EntityKind::OrganizationUnit,
      Uuid::nil(),
      "1000001",
      Uuid::nil(),
      EventType::Create,
      "InsertVersion",
      Utc::now(),
    );
    assert_eq!(event.actor_id, "system");
    assert_eq!(event.actor_type, ActorType::System);
    assert_eq!(event.resource_type, ResourceType::Organization);
  }
}
