//! Object key layout.
//!
//! All objects for a video live under `videos/{video_id}/` so cascade
//! deletion is a single prefix listing.

/// Key for the original (unchunked) source file.
pub fn source_key(video_id: &str) -> String {
    format!("videos/{}/source.mp4", video_id)
}

/// Key for chunk `index` of a video. Zero-padded so lexicographic order
/// matches playback order.
pub fn chunk_key(video_id: &str, index: u32) -> String {
    format!("videos/{}/chunks/{:05}.mp4", video_id, index)
}

/// Key for an extracted clip.
pub fn clip_key(video_id: &str, start_secs: f64, end_secs: f64, tier: &str) -> String {
    format!(
        "videos/{}/clips/{}-{}_{}.mp4",
        video_id,
        (start_secs * 1000.0) as u64,
        (end_secs * 1000.0) as u64,
        tier
    )
}

/// Prefix covering every object belonging to a video.
pub fn video_prefix(video_id: &str) -> String {
    format!("videos/{}/", video_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_formats() {
        assert_eq!(source_key("v1"), "videos/v1/source.mp4");
        assert_eq!(chunk_key("v1", 2), "videos/v1/chunks/00002.mp4");
        assert_eq!(clip_key("v1", 190.0, 210.5, "medium"), "videos/v1/clips/190000-210500_medium.mp4");
    }

    #[test]
    fn test_chunk_keys_sort_in_playback_order() {
        let mut keys: Vec<String> = (0..12).rev().map(|i| chunk_key("v1", i)).collect();
        keys.sort();
        assert_eq!(keys[0], chunk_key("v1", 0));
        assert_eq!(keys[11], chunk_key("v1", 11));
    }

    #[test]
    fn test_prefix_covers_all_keys() {
        let prefix = video_prefix("v1");
        assert!(source_key("v1").starts_with(&prefix));
        assert!(chunk_key("v1", 0).starts_with(&prefix));
        assert!(clip_key("v1", 0.0, 1.0, "low").starts_with(&prefix));
    }
}
