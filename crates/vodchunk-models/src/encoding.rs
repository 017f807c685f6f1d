//! Video encoding presets.
//!
//! One target container/codec pair (MP4 + H.264/AAC). Presets differ only
//! in speed/quality knobs and the caps used by the oversize fallbacks.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::clip::QualityTier;

/// Default video codec (H.264)
pub const DEFAULT_VIDEO_CODEC: &str = "libx264";
/// Default audio codec
pub const DEFAULT_AUDIO_CODEC: &str = "aac";
/// Default encoding preset
pub const DEFAULT_PRESET: &str = "veryfast";

/// Video encoding configuration.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct EncodingConfig {
    /// Video codec
    #[serde(default = "default_video_codec")]
    pub codec: String,

    /// Encoding preset (e.g., "veryfast", "medium")
    #[serde(default = "default_preset")]
    pub preset: String,

    /// Constant Rate Factor (quality, 0-51, lower is better)
    pub crf: u8,

    /// Audio codec
    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,

    /// Audio bitrate (e.g., "128k")
    pub audio_bitrate: String,

    /// Cap output height to this many pixels, preserving aspect ratio
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_height: Option<u32>,

    /// Cap video bitrate (sets -maxrate/-bufsize)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_video_bitrate: Option<String>,

    /// Force output frame rate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_rate: Option<u32>,

    /// Force audio sample rate in Hz
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_sample_rate: Option<u32>,
}

fn default_video_codec() -> String {
    DEFAULT_VIDEO_CODEC.to_string()
}
fn default_preset() -> String {
    DEFAULT_PRESET.to_string()
}
fn default_audio_codec() -> String {
    DEFAULT_AUDIO_CODEC.to_string()
}

impl EncodingConfig {
    fn base(crf: u8, audio_bitrate: &str) -> Self {
        Self {
            codec: DEFAULT_VIDEO_CODEC.to_string(),
            preset: DEFAULT_PRESET.to_string(),
            crf,
            audio_codec: DEFAULT_AUDIO_CODEC.to_string(),
            audio_bitrate: audio_bitrate.to_string(),
            max_height: None,
            max_video_bitrate: None,
            frame_rate: None,
            audio_sample_rate: None,
        }
    }

    /// Preset for ingest chunking: fast encode, acceptable quality.
    pub fn for_chunking() -> Self {
        Self::base(23, "128k")
    }

    /// Aggressive retry preset for chunks that came out oversize.
    pub fn chunking_fallback() -> Self {
        Self {
            max_height: Some(720),
            max_video_bitrate: Some("1500k".to_string()),
            ..Self::base(28, "96k")
        }
    }

    /// Preset for a clip quality tier.
    pub fn for_tier(tier: QualityTier) -> Self {
        match tier {
            QualityTier::High => Self::base(18, "192k"),
            QualityTier::Medium => Self {
                max_height: Some(1080),
                ..Self::base(23, "128k")
            },
            QualityTier::Low => Self {
                max_height: Some(720),
                max_video_bitrate: Some("1800k".to_string()),
                ..Self::base(28, "96k")
            },
        }
    }

    /// Escalation preset for clips that would breach the size ceiling.
    pub fn clip_fallback() -> Self {
        Self {
            max_height: Some(720),
            max_video_bitrate: Some("1200k".to_string()),
            frame_rate: Some(24),
            audio_sample_rate: Some(22050),
            ..Self::base(30, "64k")
        }
    }

    /// Convert to FFmpeg output arguments.
    pub fn to_output_args(&self) -> Vec<String> {
        let mut args = vec![
            "-c:v".to_string(),
            self.codec.clone(),
            "-preset".to_string(),
            self.preset.clone(),
            "-crf".to_string(),
            self.crf.to_string(),
        ];

        if let Some(height) = self.max_height {
            // -2 keeps the width divisible by 2 for H.264
            args.push("-vf".to_string());
            args.push(format!("scale=-2:'min({},ih)'", height));
        }

        if let Some(ref maxrate) = self.max_video_bitrate {
            args.push("-maxrate".to_string());
            args.push(maxrate.clone());
            args.push("-bufsize".to_string());
            args.push(double_bitrate(maxrate));
        }

        if let Some(fps) = self.frame_rate {
            args.push("-r".to_string());
            args.push(fps.to_string());
        }

        args.push("-c:a".to_string());
        args.push(self.audio_codec.clone());
        args.push("-b:a".to_string());
        args.push(self.audio_bitrate.clone());

        if let Some(rate) = self.audio_sample_rate {
            args.push("-ar".to_string());
            args.push(rate.to_string());
        }

        args
    }
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self::for_chunking()
    }
}

/// Double a bitrate string like "1500k" (used for -bufsize).
fn double_bitrate(rate: &str) -> String {
    let digits: String = rate.chars().take_while(|c| c.is_ascii_digit()).collect();
    let suffix: String = rate.chars().skip_while(|c| c.is_ascii_digit()).collect();
    match digits.parse::<u64>() {
        Ok(n) => format!("{}{}", n * 2, suffix),
        Err(_) => rate.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunking_preset_args() {
        let args = EncodingConfig::for_chunking().to_output_args();
        assert!(args.contains(&"-c:v".to_string()));
        assert!(args.contains(&"libx264".to_string()));
        assert!(args.contains(&"-crf".to_string()));
        assert!(args.contains(&"23".to_string()));
        assert!(!args.contains(&"-maxrate".to_string()));
    }

    #[test]
    fn test_fallback_caps_resolution_and_bitrate() {
        let args = EncodingConfig::chunking_fallback().to_output_args();
        assert!(args.iter().any(|a| a.contains("min(720,ih)")));
        assert!(args.contains(&"-maxrate".to_string()));
        assert!(args.contains(&"1500k".to_string()));
    }

    #[test]
    fn test_clip_fallback_reduces_fps_and_audio() {
        let args = EncodingConfig::clip_fallback().to_output_args();
        assert!(args.contains(&"-r".to_string()));
        assert!(args.contains(&"24".to_string()));
        assert!(args.contains(&"-ar".to_string()));
        assert!(args.contains(&"22050".to_string()));
        assert!(args.contains(&"64k".to_string()));
    }

    #[test]
    fn test_double_bitrate() {
        assert_eq!(double_bitrate("1500k"), "3000k");
        assert_eq!(double_bitrate("2M"), "4M");
    }

    #[test]
    fn test_tier_presets() {
        assert_eq!(EncodingConfig::for_tier(QualityTier::High).max_height, None);
        assert_eq!(
            EncodingConfig::for_tier(QualityTier::Medium).max_height,
            Some(1080)
        );
        assert_eq!(
            EncodingConfig::for_tier(QualityTier::Low).max_height,
            Some(720)
        );
    }
}
