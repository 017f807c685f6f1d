//! S3-compatible object storage client (Cloudflare R2).
//!
//! This crate provides:
//! - File upload/download/delete against the chunk bucket
//! - Existence checks and prefix listing for cascade deletion
//! - The key layout for sources, chunks and clips

pub mod client;
pub mod error;
pub mod keys;

pub use client::{ObjectInfo, ObjectRef, R2Client, R2Config};
pub use error::{StorageError, StorageResult};
pub use keys::{chunk_key, clip_key, source_key, video_prefix};
