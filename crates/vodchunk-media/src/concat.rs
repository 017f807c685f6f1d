//! Stream-copy concatenation.
//!
//! Chunks are encoded with compatible parameters at ingest, so reassembly
//! copies both bitstreams verbatim through FFmpeg's concat demuxer. No
//! re-encode, no quality loss.

use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// Concatenate `inputs` in order into `output` by stream copy.
///
/// The concat manifest is written next to the output and removed on every
/// exit path.
pub async fn concat_stream_copy(
    inputs: &[PathBuf],
    output: impl AsRef<Path>,
    timeout: Duration,
) -> MediaResult<()> {
    let output = output.as_ref();

    if inputs.is_empty() {
        return Err(MediaError::ConcatFailed("no input files".to_string()));
    }
    for input in inputs {
        if !input.exists() {
            return Err(MediaError::FileNotFound(input.clone()));
        }
    }

    let manifest = output.with_extension("concat.txt");
    write_concat_manifest(inputs, &manifest).await?;

    let cmd = FfmpegCommand::new(&manifest, output)
        .concat_manifest()
        .stream_copy()
        .avoid_negative_ts()
        .faststart();

    let result = FfmpegRunner::new()
        .with_timeout(timeout.as_secs())
        .run(&cmd)
        .await;

    // Manifest cleanup happens on success and failure alike.
    let _ = tokio::fs::remove_file(&manifest).await;

    result.map_err(|e| match e {
        MediaError::FfmpegFailed { message, stderr, .. } => MediaError::ConcatFailed(format!(
            "{}{}",
            message,
            stderr.map(|s| format!(": {}", s)).unwrap_or_default()
        )),
        other => other,
    })?;

    info!(
        inputs = inputs.len(),
        output = %output.display(),
        "Stream-copy concatenation complete"
    );
    Ok(())
}

/// Write an ffconcat manifest listing `inputs` in order.
pub async fn write_concat_manifest(
    inputs: &[PathBuf],
    manifest: impl AsRef<Path>,
) -> MediaResult<()> {
    let mut lines = String::new();
    for input in inputs {
        lines.push_str(&format!("file '{}'\n", escape_concat_path(input)));
    }
    tokio::fs::write(manifest.as_ref(), lines).await?;
    Ok(())
}

/// Escape a path for the concat demuxer's single-quoted syntax.
fn escape_concat_path(path: &Path) -> String {
    path.to_string_lossy().replace('\'', r"'\''")
}
