//! Audit recording.
//!
//! The recorder is handed the open mutation transaction, so an event is
//! committed together with the change it describes or not at all.

use orgline_core::{
  audit::{AuditEvent, FieldChange},
  version::EntityKey,
};
use rusqlite::{Connection, Transaction};

use crate::{
  Result,
  encode::{decode_dt, decode_uuid, encode_dt, encode_uuid},
};

/// Appends audit events inside a mutation's transaction. An error aborts
/// the mutation.
pub trait AuditRecorder: Send + Sync {
  fn append(&self, tx: &Transaction<'_>, event: &AuditEvent) -> Result<()>;
}

/// Writes events to the `audit_logs` table of the same database.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteAuditRecorder;

impl AuditRecorder for SqliteAuditRecorder {
  fn append(&self, tx: &Transaction<'_>, event: &AuditEvent) -> Result<()> {
    tx.execute(
      "INSERT INTO audit_logs (
         event_id, tenant_id, event_type, resource_type, resource_id,
         entity_code, actor_id, actor_type, action_name, correlation_id,
         reason, recorded_at, before_json, after_json, modified_fields,
         changes_json
       ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
      rusqlite::params![
        encode_uuid(event.event_id),
        encode_uuid(event.tenant_id),
        event.event_type.to_string(),
        event.resource_type.to_string(),
        encode_uuid(event.resource_id),
        event.entity_code,
        event.actor_id,
        event.actor_type.to_string(),
        event.action_name,
        event.correlation_id,
        event.reason,
        encode_dt(event.recorded_at),
        serde_json::to_string(&event.before)?,
        serde_json::to_string(&event.after)?,
        serde_json::to_string(&event.modified_fields)?,
        serde_json::to_string(&event.changes)?,
      ],
    )?;
    Ok(())
  }
}

// ─── History ─────────────────────────────────────────────────────────────────

struct RawEvent {
  event_id:        String,
  tenant_id:       String,
  event_type:      String,
  resource_type:   String,
  resource_id:     String,
  entity_code:     String,
  actor_id:        String,
  actor_type:      String,
  action_name:     String,
  correlation_id:  Option<String>,
  reason:          Option<String>,
  recorded_at:     String,
  before_json:     String,
  after_json:      String,
  modified_fields: String,
  changes_json:    String,
}

impl RawEvent {
  fn into_event(self) -> Result<AuditEvent> {
    let parse = |what: &str, s: &str| {
      crate::Error::Decode(format!("unknown {what}: {s:?}"))
    };
    Ok(AuditEvent {
      event_id:        decode_uuid(&self.event_id)?,
      tenant_id:       decode_uuid(&self.tenant_id)?,
      event_type:      self
        .event_type
        .parse()
        .map_err(|_| parse("event type", &self.event_type))?,
      resource_type:   self
        .resource_type
        .parse()
        .map_err(|_| parse("resource type", &self.resource_type))?,
      resource_id:     decode_uuid(&self.resource_id)?,
      entity_code:     self.entity_code,
      actor_id:        self.actor_id,
      actor_type:      self
        .actor_type
        .parse()
        .map_err(|_| parse("actor type", &self.actor_type))?,
      action_name:     self.action_name,
      correlation_id:  self.correlation_id,
      reason:          self.reason,
      recorded_at:     decode_dt(&self.recorded_at)?,
      before:          serde_json::from_str(&self.before_json)?,
      after:           serde_json::from_str(&self.after_json)?,
      modified_fields: serde_json::from_str(&self.modified_fields)?,
      changes:         serde_json::from_str::<Vec<FieldChange>>(
        &self.changes_json,
      )?,
    })
  }
}

/// Every recorded event for one entity, oldest first.
pub fn history(conn: &Connection, key: &EntityKey) -> Result<Vec<AuditEvent>> {
  let mut stmt = conn.prepare(
    "SELECT event_id, tenant_id, event_type, resource_type, resource_id,
            entity_code, actor_id, actor_type, action_name, correlation_id,
            reason, recorded_at, before_json, after_json, modified_fields,
            changes_json
     FROM audit_logs
     WHERE tenant_id = ?1 AND entity_code = ?2
     ORDER BY recorded_at, rowid",
  )?;

  let raws = stmt
    .query_map(
      rusqlite::params![encode_uuid(key.tenant_id), key.code],
      |row| {
        Ok(RawEvent {
          event_id:        row.get(0)?,
          tenant_id:       row.get(1)?,
          event_type:      row.get(2)?,
          resource_type:   row.get(3)?,
          resource_id:     row.get(4)?,
          entity_code:     row.get(5)?,
          actor_id:        row.get(6)?,
          actor_type:      row.get(7)?,
          action_name:     row.get(8)?,
          correlation_id:  row.get(9)?,
          reason:          row.get(10)?,
          recorded_at:     row.get(11)?,
          before_json:     row.get(12)?,
          after_json:      row.get(13)?,
          modified_fields: row.get(14)?,
          changes_json:    row.get(15)?,
        })
      },
    )?
    .collect::<rusqlite::Result<Vec<_>>>()?;

  raws.into_iter().map(RawEvent::into_event).collect()
}
