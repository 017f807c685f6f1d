//! FFmpeg command builder and runner.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};
use crate::probe::MediaInfo;
use crate::progress::FfmpegProgress;

/// Shared progress callback handed to a [`MediaProcessor`].
pub type ProgressSink = Arc<dyn Fn(FfmpegProgress) + Send + Sync>;

/// Seam over the ffmpeg/ffprobe binaries.
///
/// The chunker and clip trimmer run their encodes through this trait, so
/// the retry and escalation logic can be driven in tests without an
/// encoder on PATH.
#[async_trait]
pub trait MediaProcessor: Send + Sync {
    /// Run a transcode to completion, reporting progress.
    async fn transcode(
        &self,
        cmd: &FfmpegCommand,
        timeout: Duration,
        on_progress: ProgressSink,
    ) -> MediaResult<()>;

    /// Probe a media file.
    async fn probe(&self, path: &Path) -> MediaResult<MediaInfo> {
        crate::probe::probe_media(path).await
    }
}

/// Production processor: shells out to ffmpeg via [`FfmpegRunner`].
#[derive(Debug, Clone, Copy, Default)]
pub struct FfmpegProcessor;

#[async_trait]
impl MediaProcessor for FfmpegProcessor {
    async fn transcode(
        &self,
        cmd: &FfmpegCommand,
        timeout: Duration,
        on_progress: ProgressSink,
    ) -> MediaResult<()> {
        FfmpegRunner::new()
            .with_timeout(timeout.as_secs())
            .run_with_progress(cmd, move |p| on_progress(p))
            .await
    }
}

/// Builder for FFmpeg commands.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    /// Input file path
    input: PathBuf,
    /// Output file path
    output: PathBuf,
    /// Input arguments (before -i)
    input_args: Vec<String>,
    /// Output arguments (after -i)
    output_args: Vec<String>,
    /// Log level
    log_level: String,
}

impl FfmpegCommand {
    /// Create a new FFmpeg command.
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            input_args: Vec::new(),
            output_args: Vec::new(),
            log_level: "error".to_string(),
        }
    }

    /// Add an input argument (before -i).
    pub fn input_arg(mut self, arg: impl Into<String>) -> Self {
        self.input_args.push(arg.into());
        self
    }

    /// Add multiple input arguments.
    pub fn input_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.input_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Add an output argument (after -i).
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Add multiple output arguments.
    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Seek before the input. For stream copy this lands on the nearest
    /// keyframe at or before the position, which is the only correct
    /// placement with `-c copy`.
    pub fn seek(self, seconds: f64) -> Self {
        self.input_arg("-ss").input_arg(format!("{:.3}", seconds))
    }

    /// Bound the output duration.
    pub fn duration(self, seconds: f64) -> Self {
        self.output_arg("-t").output_arg(format!("{:.3}", seconds))
    }

    /// Copy both streams without re-encoding.
    pub fn stream_copy(self) -> Self {
        self.output_arg("-c").output_arg("copy")
    }

    /// Read input as an ffconcat manifest.
    pub fn concat_manifest(self) -> Self {
        self.input_args(["-f", "concat", "-safe", "0"])
    }

    /// Optimize the container for streaming playback.
    pub fn faststart(self) -> Self {
        self.output_arg("-movflags").output_arg("+faststart")
    }

    /// Shift timestamps so stream copy never produces negative values.
    pub fn avoid_negative_ts(self) -> Self {
        self.output_arg("-avoid_negative_ts").output_arg("make_zero")
    }

    /// Set log level.
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// The output path this command writes to.
    pub fn output_path(&self) -> &Path {
        &self.output
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = vec![
            "-y".to_string(),
            "-hide_banner".to_string(),
            "-v".to_string(),
            self.log_level.clone(),
            "-progress".to_string(),
            "pipe:2".to_string(),
        ];

        args.extend(self.input_args.clone());
        args.push("-i".to_string());
        args.push(self.input.to_string_lossy().to_string());
        args.extend(self.output_args.clone());
        args.push(self.output.to_string_lossy().to_string());

        args
    }
}

/// Runner for FFmpeg commands with progress tracking and a wall-clock timeout.
#[derive(Default)]
pub struct FfmpegRunner {
    /// Timeout in seconds
    timeout_secs: Option<u64>,
}

impl FfmpegRunner {
    /// Create a new runner.
    pub fn new() -> Self {
        Self { timeout_secs: None }
    }

    /// Set timeout.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Run an FFmpeg command.
    pub async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<()> {
        self.run_with_progress(cmd, |_| {}).await
    }

    /// Run an FFmpeg command with progress callback.
    pub async fn run_with_progress<F>(
        &self,
        cmd: &FfmpegCommand,
        progress_callback: F,
    ) -> MediaResult<()>
    where
        F: Fn(FfmpegProgress) + Send + 'static,
    {
        which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)?;

        let args = cmd.build_args();
        debug!("Running FFmpeg: ffmpeg {}", args.join(" "));

        let mut child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let stderr = child.stderr.take().ok_or_else(|| {
            MediaError::ffmpeg_failed("stderr not captured", None, None)
        })?;
        let mut reader = BufReader::new(stderr).lines();

        let progress_handle = tokio::spawn(async move {
            let mut current = FfmpegProgress::default();
            let mut tail: Vec<String> = Vec::new();

            while let Ok(Some(line)) = reader.next_line().await {
                if let Some(progress) = parse_progress_line(&line, &mut current) {
                    progress_callback(progress);
                } else if !line.contains('=') {
                    // Non-progress stderr output, keep the last lines for diagnostics
                    if tail.len() >= 16 {
                        tail.remove(0);
                    }
                    tail.push(line);
                }
            }

            tail.join("\n")
        });

        let result = self.wait_for_completion(&mut child).await;
        let stderr_tail = progress_handle.await.unwrap_or_default();

        match result {
            Err(MediaError::FfmpegFailed {
                message,
                stderr: None,
                exit_code,
            }) => Err(MediaError::ffmpeg_failed(
                message,
                (!stderr_tail.is_empty()).then_some(stderr_tail),
                exit_code,
            )),
            other => other,
        }
    }

    /// Wait for the child process, enforcing the timeout.
    async fn wait_for_completion(&self, child: &mut Child) -> MediaResult<()> {
        let status = if let Some(timeout_secs) = self.timeout_secs {
            let timeout = tokio::time::timeout(
                std::time::Duration::from_secs(timeout_secs),
                child.wait(),
            );
            match timeout.await {
                Ok(result) => result?,
                Err(_) => {
                    warn!(
                        "FFmpeg timed out after {} seconds, killing process",
                        timeout_secs
                    );
                    let _ = child.kill().await;
                    return Err(MediaError::Timeout(timeout_secs));
                }
            }
        } else {
            child.wait().await?
        };

        if status.success() {
            Ok(())
        } else {
            Err(MediaError::ffmpeg_failed(
                "FFmpeg exited with non-zero status",
                None,
                status.code(),
            ))
        }
    }
}

/// Parse a progress line from FFmpeg's -progress output.
fn parse_progress_line(line: &str, current: &mut FfmpegProgress) -> Option<FfmpegProgress> {
    let line = line.trim();

    if let Some((key, value)) = line.split_once('=') {
        match key {
            "out_time_ms" | "out_time_us" => {
                // Both report microseconds in practice
                if let Ok(us) = value.parse::<i64>() {
                    current.out_time_ms = us / 1000;
                }
            }
            "speed" => {
                if value != "N/A" {
                    if let Some(speed_str) = value.strip_suffix('x') {
                        if let Ok(speed) = speed_str.parse() {
                            current.speed = speed;
                        }
                    }
                }
            }
            "progress" => {
                if value == "end" {
                    current.is_complete = true;
                }
                return Some(current.clone());
            }
            _ => {}
        }
    }

    None
}

/// Check if FFmpeg is available.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}

/// Check if FFprobe is available.
pub fn check_ffprobe() -> MediaResult<PathBuf> {
    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_builder_order() {
        let cmd = FfmpegCommand::new("input.mp4", "output.mp4")
            .seek(10.0)
            .duration(30.0)
            .stream_copy()
            .faststart();

        let args = cmd.build_args();
        let ss = args.iter().position(|a| a == "-ss").unwrap();
        let i = args.iter().position(|a| a == "-i").unwrap();
        assert!(ss < i, "-ss must precede -i for input seeking");
        assert!(args.contains(&"10.000".to_string()));
        assert!(args.contains(&"copy".to_string()));
        assert!(args.contains(&"+faststart".to_string()));
        assert_eq!(args.last().unwrap(), "output.mp4");
    }

    #[test]
    fn test_concat_manifest_flags() {
        let cmd = FfmpegCommand::new("list.txt", "out.mp4")
            .concat_manifest()
            .stream_copy();
        let args = cmd.build_args();
        let f = args.iter().position(|a| a == "-f").unwrap();
        let i = args.iter().position(|a| a == "-i").unwrap();
        assert!(f < i, "-f concat must precede -i");
        assert!(args.contains(&"concat".to_string()));
        assert!(args.contains(&"-safe".to_string()));
    }

    #[test]
    fn test_progress_parsing() {
        let mut progress = FfmpegProgress::default();

        parse_progress_line("out_time_ms=5000000", &mut progress);
        assert_eq!(progress.out_time_ms, 5000);

        parse_progress_line("speed=1.5x", &mut progress);
        assert!((progress.speed - 1.5).abs() < 0.01);

        let result = parse_progress_line("progress=end", &mut progress);
        assert!(result.is_some());
        assert!(progress.is_complete);
    }
}
