//! FFprobe media information.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use crate::error::{MediaError, MediaResult};

/// Wall-clock bound for a metadata probe.
const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// Media file information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaInfo {
    /// Duration in seconds
    pub duration_secs: f64,
    /// Container format name (e.g., "mov,mp4,m4a,3gp,3g2,mj2")
    pub container: String,
    /// Video codec
    pub video_codec: String,
    /// Audio codec, if an audio stream exists
    pub audio_codec: Option<String>,
    /// File size in bytes
    pub size_bytes: u64,
    /// Container bitrate in bits/second
    pub bitrate: u64,
}

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    format_name: Option<String>,
    duration: Option<String>,
    size: Option<String>,
    bit_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    codec_name: Option<String>,
}

/// Probe a media file.
///
/// A missing duration is a probe failure, not a zero-duration video:
/// every chunk-plan decision depends on it.
pub async fn probe_media(path: impl AsRef<Path>) -> MediaResult<MediaInfo> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }

    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)?;

    let output_future = Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output();

    let output = tokio::time::timeout(PROBE_TIMEOUT, output_future)
        .await
        .map_err(|_| MediaError::Timeout(PROBE_TIMEOUT.as_secs()))??;

    if !output.status.success() {
        return Err(MediaError::ffprobe_failed(
            "FFprobe failed",
            Some(String::from_utf8_lossy(&output.stderr).to_string()),
        ));
    }

    let probe: FfprobeOutput = serde_json::from_slice(&output.stdout)?;

    let video_stream = probe
        .streams
        .iter()
        .find(|s| s.codec_type == "video")
        .ok_or_else(|| MediaError::InvalidVideo("No video stream found".to_string()))?;

    let audio_codec = probe
        .streams
        .iter()
        .find(|s| s.codec_type == "audio")
        .and_then(|s| s.codec_name.clone());

    let duration_secs = probe
        .format
        .duration
        .as_ref()
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| *d > 0.0)
        .ok_or_else(|| MediaError::InvalidVideo("Container reports no duration".to_string()))?;

    let size_bytes = probe
        .format
        .size
        .as_ref()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(0);

    let bitrate = probe
        .format
        .bit_rate
        .as_ref()
        .and_then(|b| b.parse::<u64>().ok())
        .unwrap_or(0);

    Ok(MediaInfo {
        duration_secs,
        container: probe.format.format_name.unwrap_or_default(),
        video_codec: video_stream.codec_name.clone().unwrap_or_default(),
        audio_codec,
        size_bytes,
        bitrate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_probe_missing_file() {
        let err = probe_media("/nonexistent/video.mp4").await.unwrap_err();
        assert!(matches!(err, MediaError::FileNotFound(_)));
    }

    #[test]
    fn test_parse_ffprobe_json() {
        let json = r#"{
            "format": {
                "format_name": "mov,mp4,m4a,3gp,3g2,mj2",
                "duration": "600.500000",
                "size": "250000000",
                "bit_rate": "3300000"
            },
            "streams": [
                {"codec_type": "video", "codec_name": "h264"},
                {"codec_type": "audio", "codec_name": "aac"}
            ]
        }"#;
        let probe: FfprobeOutput = serde_json::from_str(json).unwrap();
        assert_eq!(probe.streams.len(), 2);
        assert_eq!(probe.format.duration.as_deref(), Some("600.500000"));
    }
}
