//! Neighbour lookup around a pivot date.

use chrono::NaiveDate;
use orgline_core::version::{EntityKey, TimelineVersion};
use rusqlite::{Connection, OptionalExtension as _};

use crate::{
  Result,
  encode::{RawVersion, VERSION_COLUMNS, encode_date, encode_uuid},
};

/// The closest live versions strictly before and strictly after a pivot.
#[derive(Debug, Default)]
pub struct Adjacent {
  pub prev: Option<TimelineVersion>,
  pub next: Option<TimelineVersion>,
}

/// Resolve the neighbours of `pivot`. Must run inside the entity's locked
/// transaction; the result is only stable while that lock is held.
pub fn get_adjacent(
  conn: &Connection,
  table: &str,
  key: &EntityKey,
  pivot: NaiveDate,
) -> Result<Adjacent> {
  let tenant = encode_uuid(key.tenant_id);
  let pivot = encode_date(pivot);

  let neighbour = |cmp: &str, order: &str| -> Result<Option<TimelineVersion>> {
    let sql = format!(
      "SELECT {VERSION_COLUMNS} FROM {table}
       WHERE tenant_id = ?1 AND code = ?2 AND status <> 'DELETED'
         AND effective_date {cmp} ?3
       ORDER BY effective_date {order}
       LIMIT 1"
    );
    conn
      .query_row(
        &sql,
        rusqlite::params![tenant, key.code, pivot],
        RawVersion::from_row,
      )
      .optional()?
      .map(RawVersion::into_version)
      .transpose()
  };

  Ok(Adjacent {
    prev: neighbour("<", "DESC")?,
    next: neighbour(">", "ASC")?,
  })
}
