//! Core types and trait definitions for the Orgline timeline engine.
//!
//! This crate is deliberately free of database dependencies. Interval
//! arithmetic, health grading and the error taxonomy live here; storage
//! backends implement the traits in [`store`].

pub mod audit;
pub mod config;
pub mod context;
pub mod error;
pub mod health;
pub mod metrics;
pub mod store;
pub mod timeline;
pub mod version;

pub use error::{Error, ErrorKind, Result};
