//! Clip trimming and size-guarded recompression.

use metrics::counter;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use vodchunk_models::{EncodingConfig, QualityTier};

use crate::command::{FfmpegCommand, FfmpegProcessor, MediaProcessor};
use crate::error::{MediaError, MediaResult};
use crate::progress::FfmpegProgress;

/// Compression-efficiency factor applied to the naive pro-rata estimate.
const ESTIMATE_CONSERVATIVE_FACTOR: f64 = 0.8;

/// Options for a clip trim.
#[derive(Debug, Clone)]
pub struct TrimOptions {
    /// Seek offset into the input, in seconds (local to the input file,
    /// not the original timeline)
    pub offset_secs: f64,
    /// Clip duration in seconds
    pub duration_secs: f64,
    /// Byte ceiling for the produced clip
    pub max_clip_size: u64,
    /// Wall-clock bound per encode attempt
    pub transcode_timeout: Duration,
}

/// Estimate the output size of a clip encode.
///
/// `input_size * (clip_duration / input_duration) * tier_multiplier * 0.8`;
/// the conservative factor accounts for compression efficiency.
pub fn clip_size_estimate(
    input_size: u64,
    input_duration: f64,
    clip_duration: f64,
    tier: QualityTier,
) -> u64 {
    if input_duration <= 0.0 {
        return input_size;
    }
    let fraction = (clip_duration / input_duration).min(1.0);
    (input_size as f64 * fraction * tier.size_multiplier() * ESTIMATE_CONSERVATIVE_FACTOR) as u64
}

/// Trim a clip out of `input` at the requested quality tier, guaranteeing
/// the output stays under `max_clip_size`.
///
/// If either the pre-encode estimate or the produced file breaches the
/// ceiling, the clip is re-encoded once with the aggressive preset (720p
/// cap, bounded bitrate, reduced frame rate and audio rate). A breach
/// after that is fatal; there is no iterative search.
pub async fn trim_clip<F>(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    tier: QualityTier,
    opts: &TrimOptions,
    progress_callback: F,
) -> MediaResult<u64>
where
    F: Fn(FfmpegProgress) + Send + Sync + 'static,
{
    trim_clip_with(
        &FfmpegProcessor,
        input.as_ref(),
        output.as_ref(),
        tier,
        opts,
        progress_callback,
    )
    .await
}

/// [`trim_clip`] against an explicit [`MediaProcessor`].
pub async fn trim_clip_with<F>(
    processor: &dyn MediaProcessor,
    input: &Path,
    output: &Path,
    tier: QualityTier,
    opts: &TrimOptions,
    progress_callback: F,
) -> MediaResult<u64>
where
    F: Fn(FfmpegProgress) + Send + Sync + 'static,
{
    let progress_callback: Arc<dyn Fn(FfmpegProgress) + Send + Sync> = Arc::new(progress_callback);

    let input_size = tokio::fs::metadata(input).await?.len();
    let input_duration = processor.probe(input).await?.duration_secs;

    let estimate = clip_size_estimate(input_size, input_duration, opts.duration_secs, tier);
    let mut aggressive = estimate > opts.max_clip_size;

    if aggressive {
        info!(
            estimate_bytes = estimate,
            limit_bytes = opts.max_clip_size,
            "Clip estimate exceeds ceiling, starting with aggressive preset"
        );
        counter!("vodchunk_clip_recompressions_total").increment(1);
    }

    let encoding = if aggressive {
        EncodingConfig::clip_fallback()
    } else {
        EncodingConfig::for_tier(tier)
    };

    let mut size = encode_trim(
        processor,
        input,
        output,
        &encoding,
        opts,
        Arc::clone(&progress_callback),
    )
    .await?;

    if size > opts.max_clip_size && !aggressive {
        // The estimate passed but the real artifact did not. One escalation.
        warn!(
            size_bytes = size,
            limit_bytes = opts.max_clip_size,
            "Clip oversize, re-encoding with aggressive preset"
        );
        counter!("vodchunk_clip_recompressions_total").increment(1);
        tokio::fs::remove_file(output).await?;

        size = encode_trim(
            processor,
            input,
            output,
            &EncodingConfig::clip_fallback(),
            opts,
            progress_callback,
        )
        .await?;
        aggressive = true;
    }

    if size > opts.max_clip_size {
        debug_assert!(aggressive);
        let _ = tokio::fs::remove_file(output).await;
        return Err(MediaError::Oversize {
            size_bytes: size,
            limit_bytes: opts.max_clip_size,
        });
    }

    Ok(size)
}

async fn encode_trim(
    processor: &dyn MediaProcessor,
    input: &Path,
    output: &Path,
    encoding: &EncodingConfig,
    opts: &TrimOptions,
    progress_callback: Arc<dyn Fn(FfmpegProgress) + Send + Sync>,
) -> MediaResult<u64> {
    let cmd = FfmpegCommand::new(input, output)
        .seek(opts.offset_secs)
        .duration(opts.duration_secs)
        .output_args(encoding.to_output_args())
        .faststart();

    processor
        .transcode(&cmd, opts.transcode_timeout, progress_callback)
        .await?;

    Ok(tokio::fs::metadata(output).await?.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MB: u64 = 1024 * 1024;

    #[test]
    fn test_estimate_pro_rata() {
        // 600 s / 300 MB input, 60 s high-tier clip: 30 MB * 0.8 = 24 MB.
        let estimate = clip_size_estimate(300 * MB, 600.0, 60.0, QualityTier::High);
        assert_eq!(estimate, 24 * MB);
    }

    #[test]
    fn test_estimate_triggers_aggressive_path() {
        // An estimate of ~120 MB against a 90 MB ceiling must exceed it.
        let estimate = clip_size_estimate(500 * MB, 600.0, 180.0, QualityTier::High);
        assert!(estimate > 90 * MB);
    }

    #[test]
    fn test_lower_tiers_estimate_smaller() {
        let high = clip_size_estimate(300 * MB, 600.0, 60.0, QualityTier::High);
        let medium = clip_size_estimate(300 * MB, 600.0, 60.0, QualityTier::Medium);
        let low = clip_size_estimate(300 * MB, 600.0, 60.0, QualityTier::Low);
        assert!(high > medium && medium > low);
    }

    #[test]
    fn test_estimate_clamps_fraction() {
        // Clip longer than the input never estimates above the input.
        let estimate = clip_size_estimate(100 * MB, 10.0, 60.0, QualityTier::High);
        assert!(estimate <= 100 * MB);
    }

    #[test]
    fn test_estimate_zero_duration_input() {
        assert_eq!(clip_size_estimate(5 * MB, 0.0, 10.0, QualityTier::Low), 5 * MB);
    }

    mod escalation {
        use super::*;
        use crate::command::ProgressSink;
        use crate::probe::MediaInfo;
        use async_trait::async_trait;
        use std::collections::VecDeque;
        use std::sync::Mutex;
        use std::time::Duration;

        /// Writes one scripted output size per transcode call; probes
        /// always report a fixed duration.
        struct ScriptedProcessor {
            duration_secs: f64,
            sizes: Mutex<VecDeque<u64>>,
            calls: Mutex<Vec<Vec<String>>>,
        }

        impl ScriptedProcessor {
            fn new(duration_secs: f64, sizes: Vec<u64>) -> Self {
                Self {
                    duration_secs,
                    sizes: Mutex::new(sizes.into()),
                    calls: Mutex::new(Vec::new()),
                }
            }

            fn call_count(&self) -> usize {
                self.calls.lock().unwrap().len()
            }

            fn crf_of_call(&self, i: usize) -> String {
                let args = self.calls.lock().unwrap()[i].clone();
                let crf = args.iter().position(|a| a == "-crf").unwrap();
                args[crf + 1].clone()
            }
        }

        #[async_trait]
        impl MediaProcessor for ScriptedProcessor {
            async fn transcode(
                &self,
                cmd: &FfmpegCommand,
                _timeout: Duration,
                _on_progress: ProgressSink,
            ) -> MediaResult<()> {
                self.calls.lock().unwrap().push(cmd.build_args());
                let size = self.sizes.lock().unwrap().pop_front().unwrap();
                std::fs::write(cmd.output_path(), vec![0u8; size as usize]).unwrap();
                Ok(())
            }

            async fn probe(&self, _path: &std::path::Path) -> MediaResult<MediaInfo> {
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

        fn opts(duration_secs: f64, max_clip_size: u64) -> TrimOptions {
            TrimOptions {
                offset_secs: 0.0,
                duration_secs,
                max_clip_size,
                transcode_timeout: Duration::from_secs(300),
            }
        }

        #[tokio::test]
        async fn test_estimate_breach_starts_aggressive() {
            let dir = tempfile::tempdir().unwrap();
            let input = dir.path().join("input.mp4");
            let output = dir.path().join("clip.mp4");
            tokio::fs::write(&input, vec![0u8; 1000]).await.unwrap();

            // 1000 * (50/100) * 1.0 * 0.8 = 400 > 100: aggressive from the start.
            let processor = ScriptedProcessor::new(100.0, vec![80]);
            let size = trim_clip_with(
                &processor,
                &input,
                &output,
                QualityTier::High,
                &opts(50.0, 100),
                |_| {},
            )
            .await
            .unwrap();

            assert_eq!(size, 80);
            assert_eq!(processor.call_count(), 1);
            assert_eq!(processor.crf_of_call(0), "30");
        }

        #[tokio::test]
        async fn test_actual_oversize_escalates_once() {
            let dir = tempfile::tempdir().unwrap();
            let input = dir.path().join("input.mp4");
            let output = dir.path().join("clip.mp4");
            tokio::fs::write(&input, vec![0u8; 1000]).await.unwrap();

            // Estimate 1000 * (10/100) * 1.0 * 0.8 = 80 <= 100, but the real
            // encode lands at 150: one escalation with the aggressive preset.
            let processor = ScriptedProcessor::new(100.0, vec![150, 90]);
            let size = trim_clip_with(
                &processor,
                &input,
                &output,
                QualityTier::High,
                &opts(10.0, 100),
                |_| {},
            )
            .await
            .unwrap();

            assert_eq!(size, 90);
            assert_eq!(processor.call_count(), 2);
            assert_eq!(processor.crf_of_call(0), "18");
            assert_eq!(processor.crf_of_call(1), "30");
        }

        #[tokio::test]
        async fn test_second_breach_is_fatal_and_cleans_output() {
            let dir = tempfile::tempdir().unwrap();
            let input = dir.path().join("input.mp4");
            let output = dir.path().join("clip.mp4");
            tokio::fs::write(&input, vec![0u8; 1000]).await.unwrap();

            let processor = ScriptedProcessor::new(100.0, vec![150, 140]);
            let err = trim_clip_with(
                &processor,
                &input,
                &output,
                QualityTier::High,
                &opts(10.0, 100),
                |_| {},
            )
            .await
            .unwrap_err();

            // Exactly two attempts, never a third; the reject is removed.
            assert_eq!(processor.call_count(), 2);
            assert!(matches!(
                err,
                MediaError::Oversize {
                    size_bytes: 140,
                    limit_bytes: 100
                }
            ));
            assert!(!output.exists());
        }
    }
}
