//! Persistence layer.
//!
//! One SQLite table holds every job; the [`JobStore`] is the thin contract
//! all queue components coordinate through. Schema DDL and the migration
//! runner live alongside it.

pub mod migrations;
pub mod schema;
pub mod store;

pub use migrations::{MigrationError, MigrationRunner};
pub use store::{JobStore, NewJob, StoreError};
