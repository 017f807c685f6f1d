#![deny(unreachable_patterns)]
//! FFmpeg CLI wrapper for the chunking pipeline.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building with timeouts
//! - Progress parsing from `-progress pipe:2`
//! - Media probing (duration, container, codecs)
//! - Chunk planning and time-bounded chunk creation with fallbacks
//! - Stream-copy concatenation for lossless reassembly
//! - Clip trimming with size estimation and adaptive recompression

pub mod chunker;
pub mod clip;
pub mod command;
pub mod concat;
pub mod error;
pub mod fs_utils;
pub mod plan;
pub mod probe;
pub mod progress;

pub use chunker::{
    byte_split, chunk_windows, create_chunks, create_chunks_with, ChunkProgressFn, ChunkWindow,
    ChunkerOptions, CreatedChunk,
};
pub use clip::{clip_size_estimate, trim_clip, trim_clip_with, TrimOptions};
pub use command::{
    check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegProcessor, FfmpegRunner, MediaProcessor,
    ProgressSink,
};
pub use concat::{concat_stream_copy, write_concat_manifest};
pub use error::{MediaError, MediaResult};
pub use fs_utils::move_file;
pub use plan::{analyze, analyze_with, compute_plan, ChunkLimits, ChunkPlan};
pub use probe::{probe_media, MediaInfo};
pub use progress::FfmpegProgress;
