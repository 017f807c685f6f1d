//! Cross-chunk clip extraction.
//!
//! A clip is cut from the smallest set of chunks that covers its range:
//! never more chunks than the request touches, never the whole source.
//! The selected chunks are downloaded, joined if there is more than one,
//! and trimmed with the requested quality tier under the clip size
//! ceiling.

use metrics::counter;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use vodchunk_media::{
    concat_stream_copy, trim_clip_with, FfmpegProcessor, MediaProcessor, TrimOptions,
};
use vodchunk_models::{ChunkRecord, ChunkStatus, ClipRequest, ProgressPhase};
use vodchunk_storage::{clip_key, source_key, ObjectRef};

use crate::config::EngineConfig;
use crate::emitter::ProgressEmitter;
use crate::error::{EngineError, EngineResult};
use crate::store::{BlobStore, ChunkStore};

/// An extracted clip: its local file plus the stored object.
#[derive(Debug, Clone)]
pub struct ClipArtifact {
    /// Local path of the produced clip
    pub local_path: PathBuf,
    /// Stored object reference
    pub object: ObjectRef,
}

/// Extracts clips from chunked and unchunked videos.
pub struct ClipEngine {
    config: EngineConfig,
    chunks: Arc<dyn ChunkStore>,
    blobs: Arc<dyn BlobStore>,
    emitter: ProgressEmitter,
    processor: Arc<dyn MediaProcessor>,
}

impl ClipEngine {
    pub fn new(
        config: EngineConfig,
        chunks: Arc<dyn ChunkStore>,
        blobs: Arc<dyn BlobStore>,
        emitter: ProgressEmitter,
    ) -> Self {
        Self {
            config,
            chunks,
            blobs,
            emitter,
            processor: Arc::new(FfmpegProcessor),
        }
    }

    /// Replace the FFmpeg-backed processor, mainly for tests.
    pub fn with_processor(mut self, processor: Arc<dyn MediaProcessor>) -> Self {
        self.processor = processor;
        self
    }

    /// Extract the clip described by `req` and upload it.
    pub async fn extract_clip(&self, req: &ClipRequest) -> EngineResult<ClipArtifact> {
        let video_id = &req.video_id;
        let session = self.emitter.session(video_id.as_str());

        let video = self
            .chunks
            .get_video(video_id)
            .await?
            .ok_or_else(|| EngineError::VideoNotFound(video_id.to_string()))?;

        tokio::fs::create_dir_all(&self.config.work_dir).await?;
        let scratch = tempfile::Builder::new()
            .prefix("clip-")
            .tempdir_in(&self.config.work_dir)?;

        let (input, offset_secs) = if video.is_chunked {
            self.prepare_chunked_input(req, scratch.path(), &session).await?
        } else {
            session.phase(ProgressPhase::Processing, "Fetching source", 10);
            let target = scratch.path().join("source.mp4");
            self.fetch_source(video_id.as_str(), &target).await?;
            (target, req.start_secs)
        };

        let key = clip_key(
            video_id.as_str(),
            req.start_secs,
            req.end_secs,
            req.quality.as_str(),
        );
        let clip_dir = self.config.work_dir.join("clips").join(video_id.as_str());
        tokio::fs::create_dir_all(&clip_dir).await?;
        let local_path = clip_dir.join(format!(
            "{}-{}_{}.mp4",
            (req.start_secs * 1000.0) as u64,
            (req.end_secs * 1000.0) as u64,
            req.quality.as_str()
        ));

        let duration_secs = req.duration_secs();
        let opts = TrimOptions {
            offset_secs,
            duration_secs,
            max_clip_size: self.config.max_clip_size,
            transcode_timeout: self.config.clip_transcode_timeout,
        };

        let encode_session = session.clone();
        let duration_ms = (duration_secs * 1000.0) as i64;
        let size_bytes = trim_clip_with(
            self.processor.as_ref(),
            &input,
            &local_path,
            req.quality,
            &opts,
            move |p| {
                encode_session.phase(
                    ProgressPhase::Transcode,
                    "Encoding clip",
                    p.percentage(duration_ms) as u8,
                );
            },
        )
        .await?;

        session.phase(ProgressPhase::CloudUpload, "Uploading clip", 90);
        let object = match self.blobs.upload_file(&local_path, &key, "video/mp4").await {
            Ok(object) => object,
            Err(e) => {
                // A clip that never made it to storage must not pile up
                // on local disk.
                let _ = tokio::fs::remove_file(&local_path).await;
                return Err(e);
            }
        };

        counter!("vodchunk_clips_extracted_total").increment(1);
        info!(
            video_id = %video_id,
            key = %object.key,
            size_bytes,
            quality = %req.quality,
            "Clip extracted"
        );
        session.complete("Clip ready");

        Ok(ClipArtifact { local_path, object })
    }

    /// Download the overlap set and join it, returning the trim input and
    /// the clip's offset local to that input.
    async fn prepare_chunked_input(
        &self,
        req: &ClipRequest,
        scratch: &std::path::Path,
        session: &crate::emitter::ProgressSession,
    ) -> EngineResult<(PathBuf, f64)> {
        let records = self.chunks.list_chunks(&req.video_id).await?;
        let selected = select_overlapping(&records, req.start_secs, req.end_secs);

        if selected.is_empty() {
            return Err(EngineError::NoChunksInRange {
                start_secs: req.start_secs,
                end_secs: req.end_secs,
            });
        }

        for record in &selected {
            if record.degraded {
                return Err(EngineError::DegradedSource {
                    video_id: req.video_id.to_string(),
                });
            }
            if record.status != ChunkStatus::Ready {
                return Err(EngineError::ChunkNotReady {
                    video_id: req.video_id.to_string(),
                    index: record.index,
                    status: record.status.to_string(),
                });
            }
        }

        let total = selected.len() as u32;
        let mut local_paths = Vec::with_capacity(selected.len());
        for (i, record) in selected.iter().enumerate() {
            session.chunk(ProgressPhase::Processing, "Fetching", i as u32, total, 0);
            let target = scratch.join(format!("chunk_{:05}.mp4", record.index));
            self.blobs.download_file(&record.storage_key, &target).await?;
            local_paths.push(target);
        }

        let offset_secs = local_offset(selected[0].start_secs, req.start_secs);

        if local_paths.len() == 1 {
            return Ok((local_paths.remove(0), offset_secs));
        }

        let joined = scratch.join("joined.mp4");
        concat_stream_copy(&local_paths, &joined, self.config.concat_timeout).await?;
        Ok((joined, offset_secs))
    }

    /// Prefer the local reassembly cache over a download.
    async fn fetch_source(&self, video_id: &str, target: &std::path::Path) -> EngineResult<()> {
        let cached = self.config.cached_source_path(video_id);
        if tokio::fs::try_exists(&cached).await? {
            tokio::fs::copy(&cached, target).await?;
            return Ok(());
        }
        self.blobs.download_file(&source_key(video_id), target).await
    }
}

/// Chunks whose `[start, end)` interval intersects the requested range,
/// in index order.
pub fn select_overlapping(records: &[ChunkRecord], start_secs: f64, end_secs: f64) -> Vec<ChunkRecord> {
    let mut selected: Vec<ChunkRecord> = records
        .iter()
        .filter(|c| c.overlaps(start_secs, end_secs))
        .cloned()
        .collect();
    selected.sort_by_key(|c| c.index);
    selected
}

/// Seek offset inside the joined overlap set for a clip starting at
/// `clip_start` on the original timeline.
pub fn local_offset(first_chunk_start: f64, clip_start: f64) -> f64 {
    (clip_start - first_chunk_start).max(0.0)
}
