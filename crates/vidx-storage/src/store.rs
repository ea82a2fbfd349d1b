//! Blob store abstraction over the R2 client.

use async_trait::async_trait;
use tracing::{info, warn};
use vidx_models::Namespace;

use crate::client::R2Client;
use crate::error::{StorageError, StorageResult};

/// Storage for uploaded source videos, keyed by namespace and filename.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store bytes under `namespace/filename`, returning the object key
    /// that later identifies the blob.
    async fn put(
        &self,
        namespace: &Namespace,
        filename: &str,
        bytes: Vec<u8>,
    ) -> StorageResult<String>;

    /// Delete a stored blob. Returns false when the delete did not go
    /// through; callers treat that as best-effort.
    async fn delete(&self, identifier: &str) -> bool;
}

/// Object key for an upload.
pub fn object_key(namespace: &Namespace, filename: &str) -> StorageResult<String> {
    if filename.is_empty() {
        return Err(StorageError::invalid_key("empty filename"));
    }
    let ns = namespace.as_str();
    if ns.is_empty() {
        return Err(StorageError::invalid_key("empty namespace"));
    }
    Ok(format!("{ns}/{filename}"))
}

/// MIME type for a video filename, by extension.
fn content_type_for(filename: &str) -> &'static str {
    let ext = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "mp4" | "m4v" => "video/mp4",
        "mpeg" | "mpg" => "video/mpeg",
        "mov" => "video/quicktime",
        "avi" => "video/x-msvideo",
        "mkv" => "video/x-matroska",
        "webm" => "video/webm",
        "flv" => "video/x-flv",
        _ => "application/octet-stream",
    }
}

/// [`BlobStore`] backed by Cloudflare R2.
#[derive(Clone)]
pub struct R2BlobStore {
    client: R2Client,
}

impl R2BlobStore {
    pub fn new(client: R2Client) -> Self {
        Self { client }
    }

    pub fn from_env() -> StorageResult<Self> {
        Ok(Self::new(R2Client::from_env()?))
    }
}

#[async_trait]
impl BlobStore for R2BlobStore {
    async fn put(
        &self,
        namespace: &Namespace,
        filename: &str,
        bytes: Vec<u8>,
    ) -> StorageResult<String> {
        let key = object_key(namespace, filename)?;
        let content_type = content_type_for(filename);
        self.client
            .upload_bytes(bytes, &key, content_type)
            .await?;
        info!(key, "stored upload");
        Ok(key)
    }

    async fn delete(&self, identifier: &str) -> bool {
        match self.client.delete_object(identifier).await {
            Ok(()) => true,
            Err(err) => {
                warn!(identifier, error = %err, "blob delete failed");
                false
            }
        }
    }
}
