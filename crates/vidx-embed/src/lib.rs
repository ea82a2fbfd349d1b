//! Frame embedding service client.
//!
//! Turns a chunk's sampled frames into one vector via the external
//! embedding service. The service owns the model; this crate owns frame
//! selection, encoding and transport.

pub mod client;
pub mod error;
pub mod types;

pub use client::{EmbedConfig, Embedder, HttpEmbedder};
pub use error::{EmbedError, EmbedResult};
pub use types::{EmbedFrame, EmbedRequest, EmbedResponse};
