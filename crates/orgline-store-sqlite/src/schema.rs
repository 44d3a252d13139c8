//! SQL schema for the Orgline SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
///
/// Both version tables share one shape. Dates are `YYYY-MM-DD` text so that
/// string comparison is calendar comparison; `end_date` is the last day the
/// version applies.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS organization_units (
    record_id      TEXT PRIMARY KEY,
    tenant_id      TEXT NOT NULL,
    code           TEXT NOT NULL,
    effective_date TEXT NOT NULL,
    end_date       TEXT,
    is_current     INTEGER NOT NULL DEFAULT 0,
    name           TEXT NOT NULL,
    unit_type      TEXT NOT NULL,
    status         TEXT NOT NULL,   -- 'ACTIVE' | 'INACTIVE' | 'PLANNED' | 'DELETED'
    parent_code    TEXT,
    sort_order     INTEGER NOT NULL DEFAULT 0,
    description    TEXT,
    change_reason  TEXT,
    revision       INTEGER NOT NULL DEFAULT 1,
    created_at     TEXT NOT NULL,
    updated_at     TEXT NOT NULL,
    deleted_at     TEXT
);

CREATE TABLE IF NOT EXISTS positions (
    record_id      TEXT PRIMARY KEY,
    tenant_id      TEXT NOT NULL,
    code           TEXT NOT NULL,
    effective_date TEXT NOT NULL,
    end_date       TEXT,
    is_current     INTEGER NOT NULL DEFAULT 0,
    name           TEXT NOT NULL,
    unit_type      TEXT NOT NULL,
    status         TEXT NOT NULL,
    parent_code    TEXT,            -- organization unit code
    sort_order     INTEGER NOT NULL DEFAULT 0,
    description    TEXT,
    change_reason  TEXT,
    revision       INTEGER NOT NULL DEFAULT 1,
    created_at     TEXT NOT NULL,
    updated_at     TEXT NOT NULL,
    deleted_at     TEXT
);

-- One live version per entity and day. Deleted rows keep their dates.
CREATE UNIQUE INDEX IF NOT EXISTS organization_units_live_point_idx
    ON organization_units(tenant_id, code, effective_date)
    WHERE status <> 'DELETED';
CREATE UNIQUE INDEX IF NOT EXISTS positions_live_point_idx
    ON positions(tenant_id, code, effective_date)
    WHERE status <> 'DELETED';

CREATE INDEX IF NOT EXISTS organization_units_entity_idx
    ON organization_units(tenant_id, code);
CREATE INDEX IF NOT EXISTS positions_entity_idx
    ON positions(tenant_id, code);

-- Append-only. Written in the same transaction as the change it describes.
CREATE TABLE IF NOT EXISTS audit_logs (
    event_id        TEXT PRIMARY KEY,
    tenant_id       TEXT NOT NULL,
    event_type      TEXT NOT NULL,
    resource_type   TEXT NOT NULL,
    resource_id     TEXT NOT NULL,
    entity_code     TEXT NOT NULL,
    actor_id        TEXT NOT NULL,
    actor_type      TEXT NOT NULL,
    action_name     TEXT NOT NULL,
    correlation_id  TEXT,
    reason          TEXT,
    recorded_at     TEXT NOT NULL,
    before_json     TEXT NOT NULL,
    after_json      TEXT NOT NULL,
    modified_fields TEXT NOT NULL,   -- JSON array of field names
    changes_json    TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS audit_logs_entity_idx
    ON audit_logs(tenant_id, entity_code, recorded_at);

-- Per-entity writer lock. Upserted as the first statement of every
-- mutating transaction.
CREATE TABLE IF NOT EXISTS timeline_locks (
    lock_key    INTEGER PRIMARY KEY,
    lock_name   TEXT NOT NULL,
    acquired_at TEXT NOT NULL
);

PRAGMA user_version = 1;
";
