//! Hook for maintaining materialised hierarchy paths.

use orgline_core::version::{EntityKey, EntityKind};
use rusqlite::Transaction;

use crate::Result;

/// Called inside the mutation's transaction whenever a new version changes
/// an entity's parent reference.
pub trait HierarchyPaths: Send + Sync {
  fn recompute_subtree(
    &self,
    tx: &Transaction<'_>,
    kind: EntityKind,
    key: &EntityKey,
  ) -> Result<()>;
}

/// Hierarchy paths are not materialised.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHierarchy;

impl HierarchyPaths for NoopHierarchy {
  fn recompute_subtree(
    &self,
    _tx: &Transaction<'_>,
    _kind: EntityKind,
    _key: &EntityKey,
  ) -> Result<()> {
    Ok(())
  }
}
