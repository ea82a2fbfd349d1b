//! Cloudflare R2 blob storage.
//!
//! This crate provides:
//! - Upload and deletion of source video blobs
//! - The [`BlobStore`] trait the ingestion pipeline consumes

pub mod client;
pub mod error;
pub mod store;

pub use client::{R2Client, R2Config};
pub use error::{StorageError, StorageResult};
pub use store::{object_key, BlobStore, R2BlobStore};
