//! Test doubles shared by the engine's unit tests.

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

use vodchunk_media::{
    FfmpegCommand, MediaError, MediaInfo, MediaProcessor, MediaResult, ProgressSink,
};

/// What a [`FakeProcessor`] does on each transcode call.
pub(crate) enum TranscodeMode {
    /// Write an output file of this many bytes.
    WriteBytes(u64),
    /// Fail with a timeout (an error the chunker must propagate, not
    /// absorb into the byte-split fallback).
    FailTimeout,
}

/// Processor double: fixed probe duration, scripted transcodes.
pub(crate) struct FakeProcessor {
    pub duration_secs: f64,
    pub mode: TranscodeMode,
}

#[async_trait]
impl MediaProcessor for FakeProcessor {
    async fn transcode(
        &self,
        cmd: &FfmpegCommand,
        _timeout: Duration,
        _on_progress: ProgressSink,
    ) -> MediaResult<()> {
        match self.mode {
            TranscodeMode::WriteBytes(size) => {
                tokio::fs::write(cmd.output_path(), vec![0u8; size as usize]).await?;
                Ok(())
            }
            TranscodeMode::FailTimeout => Err(MediaError::Timeout(1)),
        }
    }

    async fn probe(&self, _path: &Path) -> MediaResult<MediaInfo> {
        Ok(MediaInfo {
            duration_secs: self.duration_secs,
            container: "mov,mp4,m4a,3gp,3g2,mj2".to_string(),
            video_codec: "h264".to_string(),
            audio_codec: Some("aac".to_string()),
            size_bytes: 0,
            bitrate: 0,
        })
    }
}
