//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur during media processing.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFprobe not found in PATH")]
    FfprobeNotFound,

    #[error("FFmpeg command failed: {message}")]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("FFprobe command failed: {message}")]
    FfprobeFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("Concatenation failed: {0}")]
    ConcatFailed(String),

    #[error("Artifact is {size_bytes} bytes, exceeds {limit_bytes} byte ceiling after retry")]
    Oversize { size_bytes: u64, limit_bytes: u64 },

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Invalid video file: {0}")]
    InvalidVideo(String),

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl MediaError {
    /// Create an FFmpeg failure error.
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    /// Create an FFprobe failure error.
    pub fn ffprobe_failed(message: impl Into<String>, stderr: Option<String>) -> Self {
        Self::FfprobeFailed {
            message: message.into(),
            stderr,
        }
    }

    /// True when the encoder itself failed (as opposed to IO/timeout),
    /// which is what triggers the byte-split fallback during chunking.
    pub fn is_transcode_failure(&self) -> bool {
        matches!(self, MediaError::FfmpegFailed { .. })
    }
}
