//! Job and batch state tracking.
//!
//! This crate provides:
//! - The [`JobStore`] trait for persisting ingestion jobs and batch records
//! - An in-memory store used by tests and single-node deployments
//! - [`BatchAggregator`], which folds concurrent child results into their
//!   parent batch through optimistic concurrency

pub mod aggregator;
pub mod error;
pub mod memory;
pub mod store;

pub use aggregator::BatchAggregator;
pub use error::{JobStoreError, JobStoreResult};
pub use memory::MemoryJobStore;
pub use store::JobStore;
