//! Repository-per-table data access.
//!
//! Repos are stateless structs whose methods take `&Connection`; the
//! [`crate::Store`] facade owns the pool and composes them.

pub mod analytics;
pub mod formation;
pub mod sync_job;
