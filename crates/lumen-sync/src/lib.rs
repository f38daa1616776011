//! # lumen-sync
//!
//! The formation ingestion pipeline: a stateful orchestrator that
//! authenticates against the marketplace, discovers candidates across
//! listing endpoints, deduplicates and filters them by sync mode, downloads
//! detail pages in bounded concurrent batches, and drives the durable
//! [`lumen_core::SyncJob`] state machine — plus the supervised background
//! service that exposes start/status/cancel to the HTTP surface.

pub mod orchestrator;
pub mod service;

pub use orchestrator::{CancellationFlag, SyncConfig, SyncOrchestrator};
pub use service::{StartSyncOptions, SyncService};
