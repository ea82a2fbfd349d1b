//! Aggregate pipeline statistics.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Aggregate statistics over one video's processed chunks.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct PipelineStats {
    /// Number of chunks that produced results
    pub chunks: usize,
    /// Total frames sampled
    pub total_frames: u64,
    /// Total sampled-frame memory in megabytes
    pub total_memory_mb: f64,
    /// Mean complexity score across chunks
    pub avg_complexity: f64,
}

impl PipelineStats {
    /// Fold one chunk's numbers into the aggregate, keeping the running
    /// complexity average exact.
    pub fn add_chunk(&mut self, frame_count: u32, memory_mb: f64, complexity: f64) {
        self.chunks += 1;
        self.total_frames += u64::from(frame_count);
        self.total_memory_mb += memory_mb;
        let n = self.chunks as f64;
        self.avg_complexity = (self.avg_complexity * (n - 1.0) + complexity) / n;
    }

    pub fn is_empty(&self) -> bool {
        self.chunks == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_fold() {
        let mut stats = PipelineStats::default();
        assert!(stats.is_empty());

        stats.add_chunk(10, 1.0, 0.2);
        stats.add_chunk(20, 2.0, 0.6);

        assert_eq!(stats.chunks, 2);
        assert_eq!(stats.total_frames, 30);
        assert!((stats.total_memory_mb - 3.0).abs() < 1e-9);
        assert!((stats.avg_complexity - 0.4).abs() < 1e-9);
    }
}
