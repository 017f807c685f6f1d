//! Filesystem utilities.
//!
//! The reassembly cache is published with `move_file`: build in a temp
//! directory, then move into the cache path. On one filesystem that is an
//! atomic rename; across filesystems it degrades to copy-into-temp plus
//! rename, which is still atomic on the destination side.

use std::path::Path;
use tokio::fs;

use crate::error::{MediaError, MediaResult};

/// Move a file from `src` to `dst`, handling cross-device moves.
pub async fn move_file(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> MediaResult<()> {
    let src = src.as_ref();
    let dst = dst.as_ref();

    if let Some(parent) = dst.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent).await?;
        }
    }

    match fs::rename(src, dst).await {
        Ok(()) => Ok(()),
        Err(e) if is_cross_device_error(&e) => {
            tracing::debug!(
                "Cross-device rename, falling back to copy+rename: {} -> {}",
                src.display(),
                dst.display()
            );
            copy_and_delete(src, dst).await
        }
        Err(e) => Err(MediaError::from(e)),
    }
}

/// EXDEV is error code 18 on Linux/macOS.
fn is_cross_device_error(e: &std::io::Error) -> bool {
    e.raw_os_error() == Some(18)
}

/// Copy to a temp file next to `dst`, rename into place, delete `src`.
async fn copy_and_delete(src: &Path, dst: &Path) -> MediaResult<()> {
    let tmp_dst = dst.with_extension("tmp");

    fs::copy(src, &tmp_dst).await?;

    if let Err(e) = fs::rename(&tmp_dst, dst).await {
        let _ = fs::remove_file(&tmp_dst).await;
        return Err(MediaError::from(e));
    }

    if let Err(e) = fs::remove_file(src).await {
        tracing::warn!(
            "Failed to remove source after cross-device move: {}: {}",
            src.display(),
            e
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_move_file_same_filesystem() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("source.mp4");
        let dst = dir.path().join("dest.mp4");

        fs::write(&src, b"chunk bytes").await.unwrap();
        move_file(&src, &dst).await.unwrap();

        assert!(!src.exists());
        assert_eq!(fs::read(&dst).await.unwrap(), b"chunk bytes");
    }

    #[tokio::test]
    async fn test_move_file_creates_parent() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("source.mp4");
        let dst = dir.path().join("cache").join("video1.mp4");

        fs::write(&src, b"x").await.unwrap();
        move_file(&src, &dst).await.unwrap();

        assert!(dst.exists());
    }

    #[tokio::test]
    async fn test_move_file_overwrites_destination() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("source.mp4");
        let dst = dir.path().join("dest.mp4");

        fs::write(&src, b"new").await.unwrap();
        fs::write(&dst, b"old").await.unwrap();
        move_file(&src, &dst).await.unwrap();

        assert_eq!(fs::read(&dst).await.unwrap(), b"new");
    }

    #[test]
    fn test_is_cross_device_error() {
        assert!(is_cross_device_error(&std::io::Error::from_raw_os_error(18)));
        assert!(!is_cross_device_error(&std::io::Error::from_raw_os_error(2)));
    }
}
