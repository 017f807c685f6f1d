//! Size/duration analysis and chunk planning.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::command::{FfmpegProcessor, MediaProcessor};
use crate::error::MediaResult;

/// Ceilings the chunk plan must respect.
#[derive(Debug, Clone, Copy)]
pub struct ChunkLimits {
    /// Per-chunk byte ceiling (storage provider limit with safety margin)
    pub max_chunk_size: u64,
    /// Per-chunk duration cap in seconds (bounds transcode time)
    pub max_chunk_duration: f64,
}

impl Default for ChunkLimits {
    fn default() -> Self {
        Self {
            max_chunk_size: 85 * 1024 * 1024,
            max_chunk_duration: 300.0,
        }
    }
}

/// Output of the analyzer: whether to chunk, and how.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkPlan {
    /// Whether the file exceeds the per-chunk size ceiling
    pub needs_chunking: bool,
    /// Total duration in seconds
    pub total_duration: f64,
    /// Total file size in bytes
    pub file_size: u64,
    /// Number of chunks to produce (1 when no chunking is needed)
    pub chunk_count: u32,
    /// Nominal duration per chunk in seconds
    pub chunk_duration: f64,
}

/// Analyze a local file and compute its chunk plan.
///
/// Files at or under the size ceiling skip the probe entirely; a probe
/// failure on an oversized file is fatal.
pub async fn analyze(path: impl AsRef<Path>, limits: ChunkLimits) -> MediaResult<ChunkPlan> {
    analyze_with(&FfmpegProcessor, path.as_ref(), limits).await
}

/// [`analyze`] against an explicit [`MediaProcessor`].
pub async fn analyze_with(
    processor: &dyn MediaProcessor,
    path: &Path,
    limits: ChunkLimits,
) -> MediaResult<ChunkPlan> {
    let file_size = tokio::fs::metadata(path).await?.len();

    if file_size <= limits.max_chunk_size {
        return Ok(ChunkPlan {
            needs_chunking: false,
            total_duration: 0.0,
            file_size,
            chunk_count: 1,
            chunk_duration: 0.0,
        });
    }

    let info = processor.probe(path).await?;
    let plan = compute_plan(file_size, info.duration_secs, limits);

    info!(
        file_size = file_size,
        duration = info.duration_secs,
        chunk_count = plan.chunk_count,
        chunk_duration = plan.chunk_duration,
        "Video requires chunking"
    );

    Ok(plan)
}

/// Compute the chunk plan for an oversized file.
///
/// The chunk count is the max of the size-derived and duration-derived
/// counts, so neither the byte ceiling nor the duration cap is violated
/// by construction, independent of bitrate variance.
pub fn compute_plan(file_size: u64, total_duration: f64, limits: ChunkLimits) -> ChunkPlan {
    let size_based = (file_size as f64 / limits.max_chunk_size as f64).ceil() as u32;
    let duration_based = (total_duration / limits.max_chunk_duration).ceil() as u32;
    let chunk_count = size_based.max(duration_based).max(1);
    let chunk_duration = (total_duration / chunk_count as f64).min(limits.max_chunk_duration);

    ChunkPlan {
        needs_chunking: true,
        total_duration,
        file_size,
        chunk_count,
        chunk_duration,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MB: u64 = 1024 * 1024;

    fn limits() -> ChunkLimits {
        ChunkLimits {
            max_chunk_size: 85 * MB,
            max_chunk_duration: 300.0,
        }
    }

    #[test]
    fn test_dual_constraint_plan() {
        // 250 MB / 600 s: size wants 3 chunks, duration wants 2 -> 3 chunks of 200 s.
        let plan = compute_plan(250 * MB, 600.0, limits());
        assert_eq!(plan.chunk_count, 3);
        assert!((plan.chunk_duration - 200.0).abs() < 0.001);
    }

    #[test]
    fn test_duration_dominates() {
        // 100 MB / 1200 s: size wants 2 chunks, duration wants 4.
        let plan = compute_plan(100 * MB, 1200.0, limits());
        assert_eq!(plan.chunk_count, 4);
        assert!((plan.chunk_duration - 300.0).abs() < 0.001);
    }

    #[test]
    fn test_chunk_duration_capped() {
        // Few large-bitrate chunks must still respect the duration cap.
        let plan = compute_plan(90 * MB, 900.0, limits());
        assert_eq!(plan.chunk_count, 3);
        assert!(plan.chunk_duration <= 300.0);
    }

    #[tokio::test]
    async fn test_small_file_skips_chunking() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("small.mp4");
        tokio::fs::write(&path, vec![0u8; 1024]).await.unwrap();

        let plan = analyze(&path, limits()).await.unwrap();
        assert!(!plan.needs_chunking);
        assert_eq!(plan.chunk_count, 1);
        assert_eq!(plan.file_size, 1024);
    }
}
