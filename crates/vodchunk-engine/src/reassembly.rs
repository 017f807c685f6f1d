//! Lossless source reassembly with caching.
//!
//! Chunked videos are rebuilt by downloading every chunk and stream-copy
//! concatenating them in index order. The result is published into the
//! cache directory with an atomic move, so readers only ever see complete
//! files, and a per-video lock ensures one build at a time.

use metrics::counter;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use vodchunk_media::{concat_stream_copy, move_file};
use vodchunk_models::{ChunkStatus, VideoId};
use vodchunk_storage::source_key;

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::store::{BlobStore, ChunkStore};

/// Rebuilds original source files from their chunks.
pub struct Reassembler {
    config: EngineConfig,
    chunks: Arc<dyn ChunkStore>,
    blobs: Arc<dyn BlobStore>,
    build_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Reassembler {
    pub fn new(
        config: EngineConfig,
        chunks: Arc<dyn ChunkStore>,
        blobs: Arc<dyn BlobStore>,
    ) -> Self {
        Self {
            config,
            chunks,
            blobs,
            build_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Return a local path to the full source of `video_id`, rebuilding it
    /// from chunks if it is not already cached.
    pub async fn source_path(&self, video_id: &VideoId) -> EngineResult<PathBuf> {
        let cached = self.config.cached_source_path(video_id.as_str());
        if tokio::fs::try_exists(&cached).await? {
            counter!("vodchunk_reassembly_cache_hits_total").increment(1);
            return Ok(cached);
        }

        let lock = self.build_lock(video_id).await;
        let _guard = lock.lock().await;

        // Another task may have finished the build while we waited.
        if tokio::fs::try_exists(&cached).await? {
            counter!("vodchunk_reassembly_cache_hits_total").increment(1);
            return Ok(cached);
        }

        counter!("vodchunk_reassembly_cache_misses_total").increment(1);
        self.rebuild(video_id, &cached).await?;
        Ok(cached)
    }

    async fn build_lock(&self, video_id: &VideoId) -> Arc<Mutex<()>> {
        let mut locks = self.build_locks.lock().await;
        locks
            .entry(video_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Build the source into a scratch directory, then move it into the
    /// cache path. The scratch directory is removed on every exit path.
    async fn rebuild(&self, video_id: &VideoId, cached: &std::path::Path) -> EngineResult<()> {
        let video = self
            .chunks
            .get_video(video_id)
            .await?
            .ok_or_else(|| EngineError::VideoNotFound(video_id.to_string()))?;

        tokio::fs::create_dir_all(&self.config.work_dir).await?;
        let scratch = tempfile::Builder::new()
            .prefix("reassemble-")
            .tempdir_in(&self.config.work_dir)?;

        let built = if video.is_chunked {
            self.rebuild_from_chunks(video_id, scratch.path()).await?
        } else {
            let target = scratch.path().join("source.mp4");
            self.blobs
                .download_file(&source_key(video_id.as_str()), &target)
                .await?;
            target
        };

        move_file(&built, cached).await?;
        info!(video_id = %video_id, path = %cached.display(), "Source cached");
        Ok(())
    }

    async fn rebuild_from_chunks(
        &self,
        video_id: &VideoId,
        scratch: &std::path::Path,
    ) -> EngineResult<PathBuf> {
        let records = self.chunks.list_chunks(video_id).await?;
        if records.is_empty() {
            return Err(EngineError::chunk_store(format!(
                "video {} is flagged chunked but has no chunks",
                video_id
            )));
        }

        for record in &records {
            if record.status != ChunkStatus::Ready {
                return Err(EngineError::ChunkNotReady {
                    video_id: video_id.to_string(),
                    index: record.index,
                    status: record.status.to_string(),
                });
            }
        }

        let mut local_paths = Vec::with_capacity(records.len());
        for record in &records {
            let target = scratch.join(format!("chunk_{:05}.mp4", record.index));
            self.blobs.download_file(&record.storage_key, &target).await?;
            local_paths.push(target);
        }

        if local_paths.len() == 1 {
            return Ok(local_paths.remove(0));
        }

        let output = scratch.join("joined.mp4");
        if records.iter().any(|r| r.degraded) {
            // Byte-split chunks are raw ranges of the original file, so
            // joining them back is plain byte concatenation.
            byte_concat(&local_paths, &output).await?;
            info!(
                video_id = %video_id,
                chunk_count = local_paths.len(),
                "Degraded chunks reassembled by byte concatenation"
            );
        } else {
            concat_stream_copy(&local_paths, &output, self.config.concat_timeout).await?;
            info!(
                video_id = %video_id,
                chunk_count = local_paths.len(),
                "Chunks reassembled by stream copy"
            );
        }
        Ok(output)
    }
}

/// Append `inputs` verbatim, in order, into `output`.
async fn byte_concat(inputs: &[PathBuf], output: &std::path::Path) -> EngineResult<()> {
    let mut writer = tokio::fs::File::create(output).await?;
    for input in inputs {
        let mut reader = tokio::fs::File::open(input).await?;
        tokio::io::copy(&mut reader, &mut writer).await?;
    }
    writer.sync_all().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryBlobStore, MemoryChunkStore};
    use tempfile::TempDir;
    use vodchunk_models::{ChunkRecord, VideoAsset};

    struct Fixture {
        reassembler: Reassembler,
        chunks: Arc<MemoryChunkStore>,
        blobs: Arc<MemoryBlobStore>,
        _dir: TempDir,
        cache_dir: PathBuf,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let config = EngineConfig {
            work_dir: dir.path().join("work"),
            cache_dir: dir.path().join("cache"),
            ..EngineConfig::default()
        };
        let cache_dir = config.cache_dir.clone();
        let chunks = Arc::new(MemoryChunkStore::new());
        let blobs = Arc::new(MemoryBlobStore::new());
        let reassembler = Reassembler::new(config, chunks.clone(), blobs.clone());
        Fixture {
            reassembler,
            chunks,
            blobs,
            _dir: dir,
            cache_dir,
        }
    }

    #[tokio::test]
    async fn test_cache_hit_skips_all_downloads() {
        let f = fixture();
        let id = VideoId::from("v1");

        tokio::fs::create_dir_all(&f.cache_dir).await.unwrap();
        tokio::fs::write(f.cache_dir.join("v1.mp4"), b"cached").await.unwrap();

        let path = f.reassembler.source_path(&id).await.unwrap();
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"cached");
        assert!(f.blobs.downloads().is_empty());
    }

    #[tokio::test]
    async fn test_unchunked_video_downloads_source() {
        let f = fixture();
        let id = VideoId::from("v1");

        f.chunks
            .put_video(&VideoAsset::new(id.clone(), 30.0, 1024))
            .await
            .unwrap();
        f.blobs.put("videos/v1/source.mp4", b"original".to_vec());

        let path = f.reassembler.source_path(&id).await.unwrap();
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"original");
        assert_eq!(f.blobs.downloads(), vec!["videos/v1/source.mp4"]);

        // Second call is a cache hit.
        f.reassembler.source_path(&id).await.unwrap();
        assert_eq!(f.blobs.downloads().len(), 1);
    }

    #[tokio::test]
    async fn test_single_chunk_video_skips_concat() {
        let f = fixture();
        let id = VideoId::from("v1");

        f.chunks
            .put_video(&VideoAsset::new(id.clone(), 100.0, 1024).with_chunks(2))
            .await
            .unwrap();
        // Flagged chunked, but only one chunk record survives.
        f.chunks
            .create_chunk(
                &ChunkRecord::new(id.clone(), 0, 0.0, 100.0, "videos/v1/chunks/00000.mp4", 5)
                    .ready(),
            )
            .await
            .unwrap();
        f.blobs.put("videos/v1/chunks/00000.mp4", b"chunk".to_vec());

        let path = f.reassembler.source_path(&id).await.unwrap();
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"chunk");
    }

    #[tokio::test]
    async fn test_degraded_chunks_rebuilt_by_byte_concat() {
        let f = fixture();
        let id = VideoId::from("v1");

        f.chunks
            .put_video(&VideoAsset::new(id.clone(), 400.0, 10).with_chunks(2))
            .await
            .unwrap();
        f.chunks
            .create_chunk(
                &ChunkRecord::new(id.clone(), 0, 0.0, 200.0, "videos/v1/chunks/00000.mp4", 5)
                    .degraded()
                    .ready(),
            )
            .await
            .unwrap();
        f.chunks
            .create_chunk(
                &ChunkRecord::new(id.clone(), 1, 200.0, 400.0, "videos/v1/chunks/00001.mp4", 5)
                    .degraded()
                    .ready(),
            )
            .await
            .unwrap();
        f.blobs.put("videos/v1/chunks/00000.mp4", b"first".to_vec());
        f.blobs.put("videos/v1/chunks/00001.mp4", b"-second".to_vec());

        let path = f.reassembler.source_path(&id).await.unwrap();
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"first-second");
    }

    #[tokio::test]
    async fn test_unready_chunk_fails_rebuild() {
        let f = fixture();
        let id = VideoId::from("v1");

        f.chunks
            .put_video(&VideoAsset::new(id.clone(), 400.0, 1024).with_chunks(2))
            .await
            .unwrap();
        f.chunks
            .create_chunk(
                &ChunkRecord::new(id.clone(), 0, 0.0, 200.0, "videos/v1/chunks/00000.mp4", 5)
                    .ready(),
            )
            .await
            .unwrap();
        f.chunks
            .create_chunk(&ChunkRecord::new(
                id.clone(),
                1,
                200.0,
                400.0,
                "videos/v1/chunks/00001.mp4",
                5,
            ))
            .await
            .unwrap();

        let err = f.reassembler.source_path(&id).await.unwrap_err();
        assert!(matches!(err, EngineError::ChunkNotReady { index: 1, .. }));
        assert!(f.blobs.downloads().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_video_rejected() {
        let f = fixture();
        let err = f
            .reassembler
            .source_path(&VideoId::from("missing"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::VideoNotFound(_)));
    }
}
