//! Shared data models for the VidIndex backend.
//!
//! This crate provides Serde-serializable types for:
//! - Video, job, batch and namespace identifiers
//! - Time-ranged chunks and their vector-index metadata
//! - Ingestion job records and terminal results
//! - Batch aggregation records with optimistic versioning
//! - Pipeline-level statistics

pub mod batch;
pub mod chunk;
pub mod ids;
pub mod job;
pub mod metadata;
pub mod stats;

// Re-export common types
pub use batch::{BatchJob, BatchStatus, CompletedChild, FailedChild};
pub use chunk::{chunk_id, parse_chunk_id, Chunk};
pub use ids::{BatchId, JobId, Namespace, VideoId};
pub use job::{ChunkDetail, IngestionJob, JobResult, JobStatus};
pub use metadata::{ChunkMetadata, FileInfo, TimestampRange};
pub use stats::PipelineStats;
