//! # lumen-store
//!
//! SQLite persistence for the Lumen platform: the formation catalog, sync
//! job records, and the analytics event log. Built on a pooled `rusqlite`
//! connection with WAL mode and embedded migrations.
//!
//! Layout follows a repository-per-table pattern: stateless repo structs
//! whose methods take `&Connection`, composed by the high-level [`Store`]
//! facade that owns the pool.
//!
//! Writes are expected to come from a single process; the sync orchestrator
//! serializes its own checkpoint writes. Concurrent external writers are
//! not coordinated beyond SQLite's busy timeout.

pub mod connection;
pub mod errors;
pub mod migrations;
pub mod repositories;
mod store;

pub use connection::{ConnectionConfig, ConnectionPool, PooledConnection};
pub use errors::{Result, StoreError};
pub use repositories::analytics::{AnalyticsEvent, AnalyticsRepo};
pub use repositories::formation::{FormationRepo, ListFormationsOptions};
pub use repositories::sync_job::SyncJobRepo;
pub use store::{BulkImportReport, Store};
