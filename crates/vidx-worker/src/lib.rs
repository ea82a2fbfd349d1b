//! Video ingestion worker.
//!
//! This crate provides:
//! - Upload intake with validation and batch dispatch
//! - The per-video ingestion orchestrator with compensating rollback
//! - Worker configuration and structured job logging

pub mod cache;
pub mod config;
pub mod error;
pub mod logging;
pub mod orchestrator;
pub mod upload;

#[cfg(test)]
pub(crate) mod testutil;

pub use cache::{NoopResultCache, ResultCache};
pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use logging::JobLogger;
pub use orchestrator::{IngestionOrchestrator, VideoPipeline};
pub use upload::{UploadHandler, UploadReceipt, UploadedFile};
