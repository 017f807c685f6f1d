//! Structured progress events.
//!
//! Events are transport-agnostic: the engine's emitter forwards them to a
//! bound realtime channel or logs them, and callers never know which.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Named stage in the progress protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProgressPhase {
    /// Receiving the source file
    Upload,
    /// Probing size/duration and computing the chunk plan
    Analysis,
    /// Creating chunk files
    Chunking,
    /// Encoding (clip trim or recompression)
    Transcode,
    /// Pushing bytes to remote storage
    CloudUpload,
    /// Writing chunk metadata
    Persistence,
    /// Terminal success
    Complete,
    /// Catch-all processing stage
    Processing,
}

impl ProgressPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressPhase::Upload => "upload",
            ProgressPhase::Analysis => "analysis",
            ProgressPhase::Chunking => "chunking",
            ProgressPhase::Transcode => "transcode",
            ProgressPhase::CloudUpload => "cloud_upload",
            ProgressPhase::Persistence => "persistence",
            ProgressPhase::Complete => "complete",
            ProgressPhase::Processing => "processing",
        }
    }
}

impl fmt::Display for ProgressPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-chunk sub-progress attached to an event.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProgressDetail {
    /// Chunk being processed
    pub chunk_index: u32,
    /// Total chunks in the pipeline
    pub total_chunks: u32,
    /// 0-100 progress within this chunk
    pub chunk_progress: u8,
    /// Human label for the chunk operation
    pub operation: String,
}

/// A structured progress event for one video or upload.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    /// Owning video/upload id
    pub owner_id: String,

    /// Stage
    pub phase: ProgressPhase,

    /// Human message
    pub message: String,

    /// Overall progress, 0-100
    pub progress: u8,

    /// Current step within the phase
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_step: Option<u32>,

    /// Total steps within the phase
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_steps: Option<u32>,

    /// Optional per-chunk detail
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<ProgressDetail>,

    /// Emission timestamp
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    /// Create a phase event.
    pub fn phase(
        owner_id: impl Into<String>,
        phase: ProgressPhase,
        message: impl Into<String>,
        progress: u8,
    ) -> Self {
        Self {
            owner_id: owner_id.into(),
            phase,
            message: message.into(),
            progress: progress.min(100),
            current_step: None,
            total_steps: None,
            detail: None,
            timestamp: Utc::now(),
        }
    }

    /// Attach step counters.
    pub fn with_steps(mut self, current: u32, total: u32) -> Self {
        self.current_step = Some(current);
        self.total_steps = Some(total);
        self
    }

    /// Attach per-chunk detail.
    pub fn with_detail(mut self, detail: ProgressDetail) -> Self {
        self.detail = Some(detail);
        self
    }
}

/// Overall percentage for step `current` of `total`.
pub fn step_progress(current: u32, total: u32) -> u8 {
    if total == 0 {
        return 0;
    }
    let pct = (current as f64 / total as f64 * 100.0).round();
    (pct as u8).min(100)
}

/// Overall percentage for chunk `index` of `total` at `chunk_pct` within the
/// chunk. Advances smoothly across chunk boundaries instead of resetting.
pub fn chunk_overall_progress(index: u32, total: u32, chunk_pct: u8) -> u8 {
    if total == 0 {
        return 0;
    }
    let pct =
        ((index as f64 * 100.0 + chunk_pct.min(100) as f64) / total as f64).round();
    (pct as u8).min(100)
}
