//! SQLite backend for the Orgline timeline engine.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated
//! thread without blocking the async runtime. Every mutation is one
//! `IMMEDIATE` transaction on that thread, which makes the per-entity lock
//! hold across processes sharing the database file.

mod adjacency;
mod encode;
mod facade;
mod guard;
mod monitor;
mod mutator;
mod schema;
mod store;

pub mod audit;
pub mod error;
pub mod hierarchy;

pub use audit::{AuditRecorder, SqliteAuditRecorder};
pub use error::{Error, Result};
pub use facade::SqliteFacade;
pub use hierarchy::{HierarchyPaths, NoopHierarchy};
pub use monitor::SqliteMonitor;
pub use store::SqliteStore;

#[cfg(test)]
mod proptests;
