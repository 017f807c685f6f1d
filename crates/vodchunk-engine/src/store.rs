//! Persistence seams.
//!
//! The pipelines talk to chunk metadata and blob storage through traits so
//! tests can run against in-memory fakes without a bucket or a database.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use vodchunk_models::{ChunkRecord, ChunkStatus, VideoAsset, VideoId};
use vodchunk_storage::{ObjectRef, R2Client, StorageError};

use crate::error::{EngineError, EngineResult};

/// Chunk and video metadata persistence.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    async fn put_video(&self, asset: &VideoAsset) -> EngineResult<()>;

    async fn get_video(&self, video_id: &VideoId) -> EngineResult<Option<VideoAsset>>;

    async fn create_chunk(&self, record: &ChunkRecord) -> EngineResult<()>;

    /// All chunks of a video, ordered by index.
    async fn list_chunks(&self, video_id: &VideoId) -> EngineResult<Vec<ChunkRecord>>;

    async fn update_chunk_status(
        &self,
        video_id: &VideoId,
        index: u32,
        status: ChunkStatus,
    ) -> EngineResult<()>;

    /// Correct the video's chunking flags, returning the previous values.
    async fn update_video_chunk_flags(
        &self,
        video_id: &VideoId,
        is_chunked: bool,
        total_chunks: u32,
    ) -> EngineResult<()>;

    /// Delete all chunk records of a video, returning how many were removed.
    async fn delete_chunks(&self, video_id: &VideoId) -> EngineResult<u32>;

    async fn delete_video(&self, video_id: &VideoId) -> EngineResult<()>;
}

/// Blob storage for sources, chunks and clips.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn upload_file(
        &self,
        path: &Path,
        key: &str,
        content_type: &str,
    ) -> EngineResult<ObjectRef>;

    async fn download_file(&self, key: &str, path: &Path) -> EngineResult<()>;

    async fn delete_prefix(&self, prefix: &str) -> EngineResult<u32>;

    async fn exists(&self, key: &str) -> EngineResult<bool>;
}

#[async_trait]
impl BlobStore for R2Client {
    async fn upload_file(
        &self,
        path: &Path,
        key: &str,
        content_type: &str,
    ) -> EngineResult<ObjectRef> {
        Ok(R2Client::upload_file(self, path, key, content_type).await?)
    }

    async fn download_file(&self, key: &str, path: &Path) -> EngineResult<()> {
        Ok(R2Client::download_file(self, key, path).await?)
    }

    async fn delete_prefix(&self, prefix: &str) -> EngineResult<u32> {
        let objects = self.list_objects(prefix).await?;
        if objects.is_empty() {
            return Ok(0);
        }
        let keys: Vec<_> = objects.into_iter().map(|o| o.key).collect();
        Ok(self.delete_objects(&keys).await?)
    }

    async fn exists(&self, key: &str) -> EngineResult<bool> {
        Ok(R2Client::exists(self, key).await?)
    }
}

/// In-memory [`ChunkStore`] for tests and local runs.
#[derive(Default)]
pub struct MemoryChunkStore {
    videos: Mutex<HashMap<String, VideoAsset>>,
    chunks: Mutex<HashMap<String, Vec<ChunkRecord>>>,
}

impl MemoryChunkStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_videos(&self) -> EngineResult<std::sync::MutexGuard<'_, HashMap<String, VideoAsset>>> {
        self.videos
            .lock()
            .map_err(|_| EngineError::chunk_store("video table lock poisoned"))
    }

    fn lock_chunks(
        &self,
    ) -> EngineResult<std::sync::MutexGuard<'_, HashMap<String, Vec<ChunkRecord>>>> {
        self.chunks
            .lock()
            .map_err(|_| EngineError::chunk_store("chunk table lock poisoned"))
    }
}

#[async_trait]
impl ChunkStore for MemoryChunkStore {
    async fn put_video(&self, asset: &VideoAsset) -> EngineResult<()> {
        self.lock_videos()?
            .insert(asset.video_id.to_string(), asset.clone());
        Ok(())
    }

    async fn get_video(&self, video_id: &VideoId) -> EngineResult<Option<VideoAsset>> {
        Ok(self.lock_videos()?.get(video_id.as_str()).cloned())
    }

    async fn create_chunk(&self, record: &ChunkRecord) -> EngineResult<()> {
        let mut chunks = self.lock_chunks()?;
        let entries = chunks.entry(record.video_id.to_string()).or_default();
        entries.retain(|c| c.index != record.index);
        entries.push(record.clone());
        entries.sort_by_key(|c| c.index);
        Ok(())
    }

    async fn list_chunks(&self, video_id: &VideoId) -> EngineResult<Vec<ChunkRecord>> {
        Ok(self
            .lock_chunks()?
            .get(video_id.as_str())
            .cloned()
            .unwrap_or_default())
    }

    async fn update_chunk_status(
        &self,
        video_id: &VideoId,
        index: u32,
        status: ChunkStatus,
    ) -> EngineResult<()> {
        let mut chunks = self.lock_chunks()?;
        let entries = chunks
            .get_mut(video_id.as_str())
            .ok_or_else(|| EngineError::chunk_store(format!("no chunks for {}", video_id)))?;
        let chunk = entries
            .iter_mut()
            .find(|c| c.index == index)
            .ok_or_else(|| {
                EngineError::chunk_store(format!("chunk {} of {} not found", index, video_id))
            })?;
        chunk.status = status;
        Ok(())
    }

    async fn update_video_chunk_flags(
        &self,
        video_id: &VideoId,
        is_chunked: bool,
        total_chunks: u32,
    ) -> EngineResult<()> {
        let mut videos = self.lock_videos()?;
        let video = videos
            .get_mut(video_id.as_str())
            .ok_or_else(|| EngineError::VideoNotFound(video_id.to_string()))?;
        video.is_chunked = is_chunked;
        video.total_chunks = total_chunks;
        Ok(())
    }

    async fn delete_chunks(&self, video_id: &VideoId) -> EngineResult<u32> {
        Ok(self
            .lock_chunks()?
            .remove(video_id.as_str())
            .map(|c| c.len() as u32)
            .unwrap_or(0))
    }

    async fn delete_video(&self, video_id: &VideoId) -> EngineResult<()> {
        self.lock_videos()?.remove(video_id.as_str());
        Ok(())
    }
}

/// In-memory [`BlobStore`] that records every call for assertions.
#[derive(Default)]
pub struct MemoryBlobStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    downloads: Mutex<Vec<String>>,
    /// Keys whose upload should fail, for error-path tests.
    failing_uploads: Mutex<Vec<String>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object directly.
    pub fn put(&self, key: &str, bytes: Vec<u8>) {
        if let Ok(mut objects) = self.objects.lock() {
            objects.insert(key.to_string(), bytes);
        }
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().ok()?.get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects
            .lock()
            .map(|o| {
                let mut keys: Vec<_> = o.keys().cloned().collect();
                keys.sort();
                keys
            })
            .unwrap_or_default()
    }

    /// Keys downloaded so far, in call order.
    pub fn downloads(&self) -> Vec<String> {
        self.downloads.lock().map(|d| d.clone()).unwrap_or_default()
    }

    /// Make uploads of `key` fail.
    pub fn fail_upload_of(&self, key: &str) {
        if let Ok(mut failing) = self.failing_uploads.lock() {
            failing.push(key.to_string());
        }
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload_file(
        &self,
        path: &Path,
        key: &str,
        _content_type: &str,
    ) -> EngineResult<ObjectRef> {
        let failing = self
            .failing_uploads
            .lock()
            .map(|f| f.iter().any(|k| k == key))
            .unwrap_or(false);
        if failing {
            return Err(EngineError::UploadFailed {
                key: key.to_string(),
                message: "injected failure".to_string(),
            });
        }

        let bytes = tokio::fs::read(path).await?;
        let size_bytes = bytes.len() as u64;
        self.put(key, bytes);
        Ok(ObjectRef {
            key: key.to_string(),
            size_bytes,
        })
    }

    async fn download_file(&self, key: &str, path: &Path) -> EngineResult<()> {
        if let Ok(mut downloads) = self.downloads.lock() {
            downloads.push(key.to_string());
        }
        let bytes = self
            .get(key)
            .ok_or_else(|| EngineError::Storage(StorageError::not_found(key)))?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, bytes).await?;
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> EngineResult<u32> {
        let mut objects = self
            .objects
            .lock()
            .map_err(|_| EngineError::chunk_store("object table lock poisoned"))?;
        let before = objects.len();
        objects.retain(|k, _| !k.starts_with(prefix));
        Ok((before - objects.len()) as u32)
    }

    async fn exists(&self, key: &str) -> EngineResult<bool> {
        Ok(self.get(key).is_some())
    }
}
