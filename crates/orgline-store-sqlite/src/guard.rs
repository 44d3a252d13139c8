//! Per-entity writer lock.
//!
//! Every mutating transaction upserts the entity's row in `timeline_locks`
//! before reading anything else. Transactions are opened `IMMEDIATE`, so the
//! database write lock is already held at that point and any other writer,
//! in this process or another, waits on `busy_timeout` until commit or
//! rollback. The upsert makes the lock visible and keyed per entity.

use chrono::{DateTime, Utc};
use orgline_core::version::EntityKey;
use rusqlite::Transaction;
use sha2::{Digest, Sha256};

use crate::{Result, encode::encode_dt};

/// A stable 63-bit key for `"{tenant}:{code}"`.
pub fn lock_key(key: &EntityKey) -> i64 {
  let digest = Sha256::digest(key.lock_name().as_bytes());
  let mut bytes = [0u8; 8];
  bytes.copy_from_slice(&digest[..8]);
  (u64::from_be_bytes(bytes) >> 1) as i64
}

/// Take the entity's lock for the rest of `tx`.
pub fn acquire(
  tx: &Transaction<'_>,
  key: &EntityKey,
  now: DateTime<Utc>,
) -> Result<()> {
  tx.execute(
    "INSERT INTO timeline_locks (lock_key, lock_name, acquired_at)
     VALUES (?1, ?2, ?3)
     ON CONFLICT(lock_key) DO UPDATE SET acquired_at = excluded.acquired_at",
    rusqlite::params![lock_key(key), key.lock_name(), encode_dt(now)],
  )?;
  tracing::trace!(entity = %key, "timeline lock acquired");
  Ok(())
}
