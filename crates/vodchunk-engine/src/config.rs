//! Engine configuration.
//!
//! Every ceiling and timeout has a default that matches production; env
//! vars override individual values for local runs and staging.

use std::path::PathBuf;
use std::time::Duration;

use vodchunk_media::{ChunkLimits, ChunkerOptions};

use crate::error::{EngineError, EngineResult};

/// Configuration for the chunking, reassembly and clip pipelines.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Per-chunk byte ceiling
    pub max_chunk_size: u64,
    /// Per-chunk duration cap in seconds
    pub max_chunk_duration: f64,
    /// Byte ceiling for extracted clips
    pub max_clip_size: u64,
    /// Wall-clock bound per chunk transcode
    pub chunk_transcode_timeout: Duration,
    /// Wall-clock bound for stream-copy concatenation
    pub concat_timeout: Duration,
    /// Wall-clock bound per clip encode attempt
    pub clip_transcode_timeout: Duration,
    /// Scratch directory for downloads and intermediate files
    pub work_dir: PathBuf,
    /// Directory holding reassembled source files
    pub cache_dir: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: 85 * 1024 * 1024,
            max_chunk_duration: 300.0,
            max_clip_size: 90 * 1024 * 1024,
            chunk_transcode_timeout: Duration::from_secs(180),
            concat_timeout: Duration::from_secs(600),
            clip_transcode_timeout: Duration::from_secs(300),
            work_dir: PathBuf::from("/tmp/vodchunk/work"),
            cache_dir: PathBuf::from("/tmp/vodchunk/cache"),
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset. Reads `.env` if present.
    pub fn from_env() -> EngineResult<Self> {
        dotenvy::dotenv().ok();

        let mut config = Self::default();

        if let Ok(v) = std::env::var("VODCHUNK_MAX_CHUNK_SIZE") {
            config.max_chunk_size = parse_var("VODCHUNK_MAX_CHUNK_SIZE", &v)?;
        }
        if let Ok(v) = std::env::var("VODCHUNK_MAX_CHUNK_DURATION_SECS") {
            config.max_chunk_duration = parse_var("VODCHUNK_MAX_CHUNK_DURATION_SECS", &v)?;
        }
        if let Ok(v) = std::env::var("VODCHUNK_MAX_CLIP_SIZE") {
            config.max_clip_size = parse_var("VODCHUNK_MAX_CLIP_SIZE", &v)?;
        }
        if let Ok(v) = std::env::var("VODCHUNK_CHUNK_TIMEOUT_SECS") {
            config.chunk_transcode_timeout =
                Duration::from_secs(parse_var("VODCHUNK_CHUNK_TIMEOUT_SECS", &v)?);
        }
        if let Ok(v) = std::env::var("VODCHUNK_CONCAT_TIMEOUT_SECS") {
            config.concat_timeout = Duration::from_secs(parse_var("VODCHUNK_CONCAT_TIMEOUT_SECS", &v)?);
        }
        if let Ok(v) = std::env::var("VODCHUNK_CLIP_TIMEOUT_SECS") {
            config.clip_transcode_timeout =
                Duration::from_secs(parse_var("VODCHUNK_CLIP_TIMEOUT_SECS", &v)?);
        }
        if let Ok(v) = std::env::var("VODCHUNK_WORK_DIR") {
            config.work_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("VODCHUNK_CACHE_DIR") {
            config.cache_dir = PathBuf::from(v);
        }

        Ok(config)
    }

    /// Ceilings for the chunk planner.
    pub fn chunk_limits(&self) -> ChunkLimits {
        ChunkLimits {
            max_chunk_size: self.max_chunk_size,
            max_chunk_duration: self.max_chunk_duration,
        }
    }

    /// Options for the chunk creator.
    pub fn chunker_options(&self) -> ChunkerOptions {
        ChunkerOptions {
            max_chunk_size: self.max_chunk_size,
            transcode_timeout: self.chunk_transcode_timeout,
            ..ChunkerOptions::default()
        }
    }

    /// Cache path of the reassembled source for a video.
    pub fn cached_source_path(&self, video_id: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.mp4", video_id))
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> EngineResult<T> {
    value
        .parse()
        .map_err(|_| EngineError::config(format!("invalid value for {}: {}", name, value)))
}
