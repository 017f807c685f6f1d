//! Chunking, reassembly and clip extraction pipelines.
//!
//! The engine ties the media layer (FFmpeg), blob storage and chunk
//! metadata together:
//! - [`IngestPipeline`]: analyze a source, split oversized files into
//!   chunks, upload and record them
//! - [`Reassembler`]: rebuild the original source from chunks, with a
//!   local cache and atomic publication
//! - [`ClipEngine`]: cut clips across chunk boundaries, downloading only
//!   the chunks the range touches
//!
//! Pipelines report progress through [`ProgressEmitter`] sessions and
//! talk to persistence through the [`ChunkStore`]/[`BlobStore`] traits.

pub mod clips;
pub mod config;
pub mod emitter;
pub mod error;
pub mod ingest;
pub mod reassembly;
pub mod store;
pub mod telemetry;

#[cfg(test)]
pub(crate) mod test_support;

pub use clips::{local_offset, select_overlapping, ClipArtifact, ClipEngine};
pub use config::EngineConfig;
pub use emitter::{ProgressEmitter, ProgressSession, ProgressTransport, RecordingTransport};
pub use error::{EngineError, EngineResult};
pub use ingest::{DeletedVideo, IngestPipeline};
pub use reassembly::Reassembler;
pub use store::{BlobStore, ChunkStore, MemoryBlobStore, MemoryChunkStore};
pub use telemetry::init_tracing;
