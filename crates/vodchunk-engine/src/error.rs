//! Engine error types.

use thiserror::Error;
use vodchunk_media::MediaError;
use vodchunk_storage::StorageError;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur in the chunking, reassembly and clip pipelines.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Video not found: {0}")]
    VideoNotFound(String),

    #[error("No chunks overlap the requested range [{start_secs}s, {end_secs}s)")]
    NoChunksInRange { start_secs: f64, end_secs: f64 },

    #[error("Chunk {index} of video {video_id} is not ready (status: {status})")]
    ChunkNotReady {
        video_id: String,
        index: u32,
        status: String,
    },

    #[error("Video {video_id} was stored with the byte-split fallback and cannot serve clips")]
    DegradedSource { video_id: String },

    #[error("Upload failed for {key}: {message}")]
    UploadFailed { key: String, message: String },

    #[error("Chunk store error: {0}")]
    ChunkStore(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub fn chunk_store(msg: impl Into<String>) -> Self {
        Self::ChunkStore(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// True when the failure is the caller's fault rather than the
    /// pipeline's. These should not be retried as-is.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            EngineError::VideoNotFound(_) | EngineError::NoChunksInRange { .. }
        )
    }
}
