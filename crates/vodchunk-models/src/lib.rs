//! Shared data models for the VodChunk pipeline.
//!
//! These types are the common vocabulary between the media layer, the
//! storage layer, and the engine: video assets, chunk records, clip
//! requests, encoding presets, and progress events.

pub mod chunk;
pub mod clip;
pub mod encoding;
pub mod progress;
pub mod video;

pub use chunk::{verify_coverage, ChunkRecord, ChunkStatus, CHUNK_COVERAGE_EPSILON};
pub use clip::{ClipRequest, InvalidClipRange, QualityTier};
pub use encoding::EncodingConfig;
pub use progress::{
    chunk_overall_progress, step_progress, ProgressDetail, ProgressEvent, ProgressPhase,
};
pub use video::{VideoAsset, VideoId};
