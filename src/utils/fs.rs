//! Filesystem primitives: atomic writes, directory creation, and
//! content checksums.
//!
//! All writes that land at a final destination go through
//! [`atomic_write`], which stages content in a temporary sibling file and
//! renames it into place. A crash mid-write leaves either the old file or
//! the new file, never a torn mix.

use std::path::Path;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

/// Create `dir` and any missing parents.
pub async fn ensure_dir(dir: &Path) -> Result<()> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("failed to create directory: {}", dir.display()))
}

/// Write `content` to `path` atomically via a temporary sibling file.
///
/// The temp file lives in the destination's directory so the final
/// rename never crosses a filesystem boundary.
pub async fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .context("destination path has no file name")?;
    let temp_path = dir.join(format!(".{}.tmp-{}", file_name, std::process::id()));

    tokio::fs::write(&temp_path, content)
        .await
        .with_context(|| format!("failed to write temporary file: {}", temp_path.display()))?;

    if let Err(err) = tokio::fs::rename(&temp_path, path).await {
        // Leave no orphan behind before reporting
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(err).with_context(|| format!("failed to move into place: {}", path.display()));
    }
    Ok(())
}

/// Copy `from` to `to`, creating `to`'s parent directories as needed.
pub async fn copy_file(from: &Path, to: &Path) -> Result<u64> {
    if let Some(parent) = to.parent() {
        ensure_dir(parent).await?;
    }
    tokio::fs::copy(from, to)
        .await
        .with_context(|| format!("failed to copy {} to {}", from.display(), to.display()))
}

/// Hex-encoded SHA-256 of a file's bytes.
pub async fn calculate_checksum(path: &Path) -> Result<String> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read for checksum: {}", path.display()))?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

/// File size in bytes.
pub async fn file_size(path: &Path) -> Result<u64> {
    let meta = tokio::fs::metadata(path)
        .await
        .with_context(|| format!("failed to stat: {}", path.display()))?;
    Ok(meta.len())
}
