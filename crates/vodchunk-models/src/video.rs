//! Video asset models.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a video.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct VideoId(pub String);

impl VideoId {
    /// Generate a new random video ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for VideoId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for VideoId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for VideoId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A video known to the pipeline.
///
/// `is_chunked`/`total_chunks` reflect what ingest produced; the engine's
/// reconciliation routine corrects them if the persisted chunk set ever
/// disagrees.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct VideoAsset {
    /// Unique video ID
    pub video_id: VideoId,

    /// Total duration of the original video in seconds
    pub duration_secs: f64,

    /// Total byte size of the original file
    pub size_bytes: u64,

    /// Whether the video was split into chunks at ingest
    #[serde(default)]
    pub is_chunked: bool,

    /// Number of chunks (1 for unchunked videos)
    #[serde(default = "default_total_chunks")]
    pub total_chunks: u32,
}

fn default_total_chunks() -> u32 {
    1
}

impl VideoAsset {
    /// Create a new unchunked asset.
    pub fn new(video_id: VideoId, duration_secs: f64, size_bytes: u64) -> Self {
        Self {
            video_id,
            duration_secs,
            size_bytes,
            is_chunked: false,
            total_chunks: 1,
        }
    }

    /// Record the chunking outcome on the asset.
    pub fn with_chunks(mut self, total_chunks: u32) -> Self {
        self.is_chunked = total_chunks > 1;
        self.total_chunks = total_chunks.max(1);
        self
    }
}
