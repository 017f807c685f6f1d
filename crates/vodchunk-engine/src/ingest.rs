//! Ingest pipeline: analyze, chunk, upload, persist.

use metrics::counter;
use std::sync::Arc;
use tracing::{info, warn};

use vodchunk_media::{
    analyze_with, create_chunks_with, CreatedChunk, FfmpegProcessor, MediaProcessor,
};
use vodchunk_models::{verify_coverage, ChunkRecord, ChunkStatus, ProgressPhase, VideoAsset, VideoId};
use vodchunk_storage::{chunk_key, source_key, video_prefix};

use crate::config::EngineConfig;
use crate::emitter::{ProgressEmitter, ProgressSession};
use crate::error::{EngineError, EngineResult};
use crate::store::{BlobStore, ChunkStore};

/// Outcome of a cascade deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeletedVideo {
    /// Chunk records removed
    pub chunk_records: u32,
    /// Storage objects removed
    pub objects: u32,
}

/// Takes a local source file through analysis, chunking, upload and
/// metadata persistence.
pub struct IngestPipeline {
    config: EngineConfig,
    chunks: Arc<dyn ChunkStore>,
    blobs: Arc<dyn BlobStore>,
    emitter: ProgressEmitter,
    processor: Arc<dyn MediaProcessor>,
}

impl IngestPipeline {
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

    /// Ingest a local source file under `video_id`.
    ///
    /// Files at or under the chunk size ceiling are uploaded whole. Larger
    /// files are split into chunks, each uploaded and recorded; a single
    /// failed chunk upload fails the whole ingest with its record left in
    /// the `Error` state for diagnosis.
    pub async fn ingest(
        &self,
        video_id: &VideoId,
        source_path: impl AsRef<std::path::Path>,
    ) -> EngineResult<VideoAsset> {
        let source_path = source_path.as_ref();
        let session = self.emitter.session(video_id.as_str());

        session.phase(ProgressPhase::Analysis, "Analyzing video", 2);
        let plan =
            analyze_with(self.processor.as_ref(), source_path, self.config.chunk_limits()).await?;

        if !plan.needs_chunking {
            return self.ingest_whole(video_id, source_path, plan.file_size, &session).await;
        }

        let asset = VideoAsset::new(video_id.clone(), plan.total_duration, plan.file_size);
        self.chunks.put_video(&asset).await?;

        session.phase(
            ProgressPhase::Chunking,
            format!("Splitting into {} chunks", plan.chunk_count),
            0,
        );

        let work_dir = self.config.work_dir.join(video_id.as_str());
        let outcome = self
            .chunk_and_publish(video_id, source_path, &plan, &work_dir, &session)
            .await;

        // Scratch chunk files are no longer needed whatever the outcome.
        let _ = tokio::fs::remove_dir_all(&work_dir).await;
        let records = outcome?;

        session.phase(ProgressPhase::Persistence, "Recording chunk metadata", 95);
        let asset = asset.with_chunks(records.len() as u32);
        self.chunks
            .update_video_chunk_flags(video_id, asset.is_chunked, asset.total_chunks)
            .await?;

        if !records.iter().any(|r| r.degraded)
            && !verify_coverage(&records, plan.total_duration)
        {
            warn!(video_id = %video_id, "Persisted chunks do not cover the full timeline");
        }

        counter!("vodchunk_videos_ingested_total").increment(1);
        session.complete("Video ingested");
        Ok(asset)
    }

    /// Upload an under-ceiling file as-is, without chunking.
    async fn ingest_whole(
        &self,
        video_id: &VideoId,
        source_path: &std::path::Path,
        file_size: u64,
        session: &ProgressSession,
    ) -> EngineResult<VideoAsset> {
        // Duration is informational for unchunked videos; a probe failure
        // must not fail the ingest.
        let duration_secs = match self.processor.probe(source_path).await {
            Ok(info) => info.duration_secs,
            Err(e) => {
                warn!(video_id = %video_id, error = %e, "Could not probe duration");
                0.0
            }
        };

        session.phase(ProgressPhase::CloudUpload, "Uploading video", 50);
        self.blobs
            .upload_file(source_path, &source_key(video_id.as_str()), "video/mp4")
            .await?;

        let asset = VideoAsset::new(video_id.clone(), duration_secs, file_size);
        self.chunks.put_video(&asset).await?;

        counter!("vodchunk_videos_ingested_total").increment(1);
        session.complete("Video ingested");
        Ok(asset)
    }

    /// Encode the plan's chunks into `work_dir` and publish them. The
    /// caller removes `work_dir` whatever this returns.
    async fn chunk_and_publish(
        &self,
        video_id: &VideoId,
        source_path: &std::path::Path,
        plan: &vodchunk_media::ChunkPlan,
        work_dir: &std::path::Path,
        session: &ProgressSession,
    ) -> EngineResult<Vec<ChunkRecord>> {
        let total = plan.chunk_count;
        let encode_session = session.clone();
        let created = create_chunks_with(
            self.processor.as_ref(),
            source_path,
            work_dir,
            plan,
            &self.config.chunker_options(),
            Arc::new(move |index, pct| {
                encode_session.chunk(ProgressPhase::Chunking, "Encoding", index, total, pct);
            }),
        )
        .await?;

        if created.iter().all(|c| !c.degraded) {
            let windows_ok = created
                .iter()
                .enumerate()
                .all(|(i, c)| c.index == i as u32 && c.end_secs > c.start_secs);
            if !windows_ok {
                warn!(video_id = %video_id, "Created chunks do not tile the plan windows");
            }
        }

        self.publish_chunks(video_id, &created, session).await
    }

    /// Record and upload every created chunk.
    ///
    /// Each record is created `Uploading`, flipped to `Ready` once its
    /// bytes are stored, or to `Error` if the upload fails.
    async fn publish_chunks(
        &self,
        video_id: &VideoId,
        created: &[CreatedChunk],
        session: &ProgressSession,
    ) -> EngineResult<Vec<ChunkRecord>> {
        let total = created.len() as u32;
        let mut records = Vec::with_capacity(created.len());

        for chunk in created {
            let key = chunk_key(video_id.as_str(), chunk.index);
            let mut record = ChunkRecord::new(
                video_id.clone(),
                chunk.index,
                chunk.start_secs,
                chunk.end_secs,
                &key,
                chunk.size_bytes,
            );
            if chunk.degraded {
                record = record.degraded();
            }
            self.chunks.create_chunk(&record).await?;

            session.chunk(ProgressPhase::CloudUpload, "Uploading", chunk.index, total, 0);

            if let Err(e) = self.blobs.upload_file(&chunk.path, &key, "video/mp4").await {
                self.chunks
                    .update_chunk_status(video_id, chunk.index, ChunkStatus::Error)
                    .await?;
                counter!("vodchunk_chunk_upload_failures_total").increment(1);
                return Err(EngineError::UploadFailed {
                    key,
                    message: e.to_string(),
                });
            }

            self.chunks
                .update_chunk_status(video_id, chunk.index, ChunkStatus::Ready)
                .await?;
            session.chunk(ProgressPhase::CloudUpload, "Uploading", chunk.index, total, 100);

            records.push(record.ready());
        }

        Ok(records)
    }

    /// Recompute a video's chunking flags from its persisted chunk set and
    /// correct the asset if they disagree.
    pub async fn reconcile_chunk_flags(&self, video_id: &VideoId) -> EngineResult<(bool, u32)> {
        let video = self
            .chunks
            .get_video(video_id)
            .await?
            .ok_or_else(|| EngineError::VideoNotFound(video_id.to_string()))?;

        let ready: Vec<_> = self
            .chunks
            .list_chunks(video_id)
            .await?
            .into_iter()
            .filter(|c| c.status == ChunkStatus::Ready)
            .collect();

        let is_chunked = ready.len() > 1;
        let total_chunks = (ready.len() as u32).max(1);

        if video.is_chunked != is_chunked || video.total_chunks != total_chunks {
            info!(
                video_id = %video_id,
                was_chunked = video.is_chunked,
                is_chunked,
                total_chunks,
                "Correcting stale chunking flags"
            );
            self.chunks
                .update_video_chunk_flags(video_id, is_chunked, total_chunks)
                .await?;
        }

        Ok((is_chunked, total_chunks))
    }

    /// Remove everything belonging to a video: chunk records, stored
    /// objects, the asset record and the local reassembly cache entry.
    pub async fn delete_video(&self, video_id: &VideoId) -> EngineResult<DeletedVideo> {
        let chunk_records = self.chunks.delete_chunks(video_id).await?;
        let objects = self
            .blobs
            .delete_prefix(&video_prefix(video_id.as_str()))
            .await?;
        self.chunks.delete_video(video_id).await?;

        let cached = self.config.cached_source_path(video_id.as_str());
        if let Err(e) = tokio::fs::remove_file(&cached).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(video_id = %video_id, error = %e, "Could not remove cached source");
            }
        }

        info!(video_id = %video_id, chunk_records, objects, "Video deleted");
        Ok(DeletedVideo {
            chunk_records,
            objects,
        })
    }
}
