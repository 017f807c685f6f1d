//! Clip request models and quality tiers.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::video::VideoId;

/// Quality tier for clip extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum QualityTier {
    /// Full resolution, near-transparent quality
    High,
    /// 1080p cap, balanced size/quality
    #[default]
    Medium,
    /// 720p cap, smallest output
    Low,
}

impl QualityTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityTier::High => "high",
            QualityTier::Medium => "medium",
            QualityTier::Low => "low",
        }
    }

    /// Expected output-size multiplier relative to the source bitrate.
    ///
    /// Used by the clip size estimator before committing to an encode.
    pub fn size_multiplier(&self) -> f64 {
        match self {
            QualityTier::High => 1.0,
            QualityTier::Medium => 0.6,
            QualityTier::Low => 0.35,
        }
    }
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Request end must be strictly after the start.
#[derive(Debug, Error)]
#[error("invalid clip range: start {start_secs}s must be before end {end_secs}s")]
pub struct InvalidClipRange {
    pub start_secs: f64,
    pub end_secs: f64,
}

/// A request to cut `[start, end)` out of a video at a quality tier.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ClipRequest {
    /// Owning video
    pub video_id: VideoId,

    /// Start on the original timeline (seconds)
    pub start_secs: f64,

    /// End on the original timeline (seconds, exclusive)
    pub end_secs: f64,

    /// Quality tier
    #[serde(default)]
    pub quality: QualityTier,
}

impl ClipRequest {
    /// Create a validated clip request.
    pub fn new(
        video_id: VideoId,
        start_secs: f64,
        end_secs: f64,
        quality: QualityTier,
    ) -> Result<Self, InvalidClipRange> {
        if end_secs <= start_secs || start_secs < 0.0 {
            return Err(InvalidClipRange {
                start_secs,
                end_secs,
            });
        }
        Ok(Self {
            video_id,
            start_secs,
            end_secs,
            quality,
        })
    }

    /// Requested clip duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.end_secs - self.start_secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_inverted_range() {
        assert!(ClipRequest::new(VideoId::from("v"), 10.0, 5.0, QualityTier::High).is_err());
        assert!(ClipRequest::new(VideoId::from("v"), 10.0, 10.0, QualityTier::High).is_err());
        assert!(ClipRequest::new(VideoId::from("v"), -1.0, 5.0, QualityTier::High).is_err());
    }

    #[test]
    fn test_duration() {
        let req = ClipRequest::new(VideoId::from("v"), 190.0, 210.0, QualityTier::Medium).unwrap();
        assert!((req.duration_secs() - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_tier_multipliers_ordered() {
        assert!(QualityTier::High.size_multiplier() > QualityTier::Medium.size_multiplier());
        assert!(QualityTier::Medium.size_multiplier() > QualityTier::Low.size_multiplier());
    }
}
