//! Chunk metadata models.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::video::VideoId;

/// Tolerance when checking that chunks tile the original timeline.
pub const CHUNK_COVERAGE_EPSILON: f64 = 0.05;

/// Chunk upload/lifecycle status.
///
/// `Uploading -> Ready` on success, `Uploading -> Error` on failure.
/// Neither terminal state transitions further; chunks are only ever
/// deleted afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChunkStatus {
    /// Chunk bytes are in flight to remote storage
    #[default]
    Uploading,
    /// Chunk is stored and its record is authoritative
    Ready,
    /// Upload failed; the owning ingest is failed
    Error,
}

impl ChunkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkStatus::Uploading => "uploading",
            ChunkStatus::Ready => "ready",
            ChunkStatus::Error => "error",
        }
    }
}

impl fmt::Display for ChunkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Persisted metadata for one chunk of a video.
///
/// `start_secs`/`end_secs` are positions on the *original* video's
/// timeline. For a given video, chunks ordered by `index` must be
/// contiguous and non-overlapping, covering `[0, duration)` within
/// [`CHUNK_COVERAGE_EPSILON`].
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ChunkRecord {
    /// Owning video
    pub video_id: VideoId,

    /// Zero-based playback order
    pub index: u32,

    /// Start on the original timeline (seconds)
    pub start_secs: f64,

    /// End on the original timeline (seconds, exclusive)
    pub end_secs: f64,

    /// Remote storage key
    pub storage_key: String,

    /// Byte size of the stored chunk
    pub size_bytes: u64,

    /// Lifecycle status
    #[serde(default)]
    pub status: ChunkStatus,

    /// Whether this chunk came from the byte-split fallback and is not
    /// valid standalone media
    #[serde(default)]
    pub degraded: bool,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl ChunkRecord {
    /// Create a new record in the `Uploading` state.
    pub fn new(
        video_id: VideoId,
        index: u32,
        start_secs: f64,
        end_secs: f64,
        storage_key: impl Into<String>,
        size_bytes: u64,
    ) -> Self {
        Self {
            video_id,
            index,
            start_secs,
            end_secs,
            storage_key: storage_key.into(),
            size_bytes,
            status: ChunkStatus::Uploading,
            degraded: false,
            created_at: Utc::now(),
        }
    }

    /// Duration of this chunk in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.end_secs - self.start_secs
    }

    /// Mark as stored.
    pub fn ready(mut self) -> Self {
        self.status = ChunkStatus::Ready;
        self
    }

    /// Mark as failed.
    pub fn failed(mut self) -> Self {
        self.status = ChunkStatus::Error;
        self
    }

    /// Flag as a byte-split fallback chunk.
    pub fn degraded(mut self) -> Self {
        self.degraded = true;
        self
    }

    /// Interval-intersection test against a requested `[start, end)` range.
    pub fn overlaps(&self, start_secs: f64, end_secs: f64) -> bool {
        self.start_secs < end_secs && self.end_secs > start_secs
    }
}

/// Check that `chunks` (sorted by index) tile `[0, total_duration)` without
/// gaps or overlaps, within [`CHUNK_COVERAGE_EPSILON`].
pub fn verify_coverage(chunks: &[ChunkRecord], total_duration: f64) -> bool {
    if chunks.is_empty() {
        return false;
    }

    let mut expected_start = 0.0_f64;
    for (i, chunk) in chunks.iter().enumerate() {
        if chunk.index != i as u32 {
            return false;
        }
        if (chunk.start_secs - expected_start).abs() > CHUNK_COVERAGE_EPSILON {
            return false;
        }
        if chunk.end_secs <= chunk.start_secs {
            return false;
        }
        expected_start = chunk.end_secs;
    }

    (expected_start - total_duration).abs() <= CHUNK_COVERAGE_EPSILON
}
