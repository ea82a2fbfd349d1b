//! Recording test doubles shared by the orchestration tests.
//!
//! Each double logs the calls it receives so tests can assert exactly
//! which writes and rollbacks happened, and can be armed to fail a
//! specific call.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{Map, Value};
use vidx_embed::{EmbedError, EmbedResult, Embedder};
use vidx_index::{IndexError, IndexResult, VectorIndex};
use vidx_media::{ChunkResult, Frame, MediaResult};
use vidx_models::{Chunk, ChunkMetadata, FileInfo, Namespace, TimestampRange, VideoId};
use vidx_storage::{BlobStore, StorageError, StorageResult};

use crate::cache::ResultCache;
use crate::orchestrator::VideoPipeline;

/// Pipeline double that yields a fixed number of canned chunks.
pub struct FakePipeline {
    chunk_count: usize,
}

impl FakePipeline {
    pub fn with_chunks(chunk_count: usize) -> Self {
        Self { chunk_count }
    }
}

#[async_trait]
impl VideoPipeline for FakePipeline {
    async fn process(
        &self,
        _video_bytes: &[u8],
        video_id: &VideoId,
        filename: &str,
        hashed_identifier: Option<&str>,
    ) -> MediaResult<Vec<ChunkResult>> {
        Ok((0..self.chunk_count)
            .map(|i| canned_chunk(video_id, filename, hashed_identifier, i))
            .collect())
    }
}

/// Build one plausible chunk result with a single gray frame.
pub fn canned_chunk(
    video_id: &VideoId,
    filename: &str,
    hashed_identifier: Option<&str>,
    index: usize,
) -> ChunkResult {
    let start = index as f64 * 5.0;
    let chunk = Chunk::new(video_id, index, start, start + 5.0);
    let frame = Frame::from_rgb24(8, 8, vec![128; 8 * 8 * 3]).unwrap();
    let metadata = ChunkMetadata {
        chunk_id: chunk.chunk_id.clone(),
        video_id: video_id.clone(),
        timestamp_range: TimestampRange {
            start: chunk.start_time,
            end: chunk.end_time,
        },
        duration: 5.0,
        frame_count: 1,
        sampling_fps: 0.2,
        complexity_score: 0.5,
        file_info: FileInfo::for_upload(filename, hashed_identifier.map(str::to_string)),
        processed_at: chrono::Utc::now(),
    };
    ChunkResult {
        chunk_id: chunk.chunk_id,
        frames: vec![frame],
        metadata,
        memory_mb: 0.2,
    }
}

/// Blob store double recording puts and deletes.
#[derive(Default)]
pub struct RecordingBlobStore {
    pub puts: Mutex<Vec<String>>,
    pub deletes: Mutex<Vec<String>>,
    fail_put: bool,
    fail_delete: bool,
}

impl RecordingBlobStore {
    pub fn failing_put() -> Self {
        Self {
            fail_put: true,
            ..Self::default()
        }
    }

    pub fn failing_delete() -> Self {
        Self {
            fail_delete: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl BlobStore for RecordingBlobStore {
    async fn put(
        &self,
        namespace: &Namespace,
        filename: &str,
        _bytes: Vec<u8>,
    ) -> StorageResult<String> {
        if self.fail_put {
            return Err(StorageError::upload_failed("injected put failure"));
        }
        let key = format!("{namespace}/{filename}");
        self.puts.lock().unwrap().push(key.clone());
        Ok(key)
    }

    async fn delete(&self, identifier: &str) -> bool {
        self.deletes.lock().unwrap().push(identifier.to_string());
        !self.fail_delete
    }
}

/// Embedder double returning a constant vector.
#[derive(Default)]
pub struct StubEmbedder {
    calls: AtomicUsize,
    fail_on_call: Option<usize>,
}

impl StubEmbedder {
    /// Fail the n-th embed call (1-based), succeed otherwise.
    pub fn failing_on(call: usize) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_on_call: Some(call),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for StubEmbedder {
    async fn embed(&self, _frames: &[Frame]) -> EmbedResult<Vec<f32>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on_call == Some(call) {
            return Err(EmbedError::RequestFailed("injected embed failure".into()));
        }
        Ok(vec![0.25; 8])
    }
}

/// Vector index double recording upserts and delete calls.
#[derive(Default)]
pub struct RecordingIndex {
    pub upserts: Mutex<Vec<String>>,
    pub delete_calls: Mutex<Vec<Vec<String>>>,
    fail_on_upsert: Option<usize>,
}

impl RecordingIndex {
    /// Fail the n-th upsert (1-based), succeed otherwise.
    pub fn failing_on_upsert(call: usize) -> Self {
        Self {
            fail_on_upsert: Some(call),
            ..Self::default()
        }
    }
}

#[async_trait]
impl VectorIndex for RecordingIndex {
    async fn upsert(
        &self,
        chunk_id: &str,
        _vector: &[f32],
        _namespace: &Namespace,
        _metadata: Map<String, Value>,
    ) -> IndexResult<()> {
        let mut upserts = self.upserts.lock().unwrap();
        if self.fail_on_upsert == Some(upserts.len() + 1) {
            return Err(IndexError::UpsertFailed("injected upsert failure".into()));
        }
        upserts.push(chunk_id.to_string());
        Ok(())
    }

    async fn delete_many(&self, chunk_ids: &[String], _namespace: &Namespace) -> IndexResult<()> {
        self.delete_calls.lock().unwrap().push(chunk_ids.to_vec());
        Ok(())
    }
}

/// Cache double recording invalidated namespaces.
#[derive(Default)]
pub struct RecordingCache {
    pub invalidations: Mutex<Vec<String>>,
}

#[async_trait]
impl ResultCache for RecordingCache {
    async fn invalidate(&self, namespace: &Namespace) {
        self.invalidations
            .lock()
            .unwrap()
            .push(namespace.cache_key().to_string());
    }
}
