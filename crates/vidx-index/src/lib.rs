//! Pinecone vector index client.
//!
//! This crate provides:
//! - Chunk vector upsert with flattened metadata
//! - Bulk vector deletion for rollback
//! - The [`VectorIndex`] trait the ingestion pipeline consumes

pub mod client;
pub mod error;
pub mod types;

pub use client::{PineconeConfig, PineconeIndex, VectorIndex};
pub use error::{IndexError, IndexResult};
pub use types::{DeleteRequest, UpsertRequest, UpsertResponse, VectorRecord};
