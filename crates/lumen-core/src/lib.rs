//! # lumen-core
//!
//! Shared domain types for the Lumen drone show platform: the canonical
//! [`Formation`] record, the [`SyncJob`] ingestion-run record, the sync
//! error taxonomy, and the retry/backoff building blocks used by the
//! orchestrator.
//!
//! This crate is deliberately free of I/O — persistence lives in
//! `lumen-store`, network access in `lumen-scraper`.

pub mod errors;
pub mod formation;
pub mod ids;
pub mod job;
pub mod retry;

pub use errors::{SyncError, SyncResult};
pub use formation::{DronePoint, Formation, FormationData, Frame, SyncStatus};
pub use job::{SyncErrorEntry, SyncJob, SyncJobStatus, SyncMode};
