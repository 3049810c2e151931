//! Filesystem helpers for moving clips and writing files in place.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tokio::fs;

use crate::error::{MediaError, MediaResult};

/// Move a file from `src` to `dst`, replacing `dst` if it exists.
///
/// Falls back to copy-and-delete when the rename crosses filesystems.
pub async fn move_file(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> MediaResult<()> {
    let src = src.as_ref();
    let dst = dst.as_ref();

    ensure_parent(dst).await?;

    match fs::rename(src, dst).await {
        Ok(()) => Ok(()),
        Err(e) if is_cross_device_error(&e) => {
            tracing::debug!(
                "Cross-device rename, copying instead: {} -> {}",
                src.display(),
                dst.display()
            );
            copy_and_delete(src, dst).await
        }
        Err(e) => Err(MediaError::from(e)),
    }
}

/// Write `contents` to `dst` through a uniquely named temporary sibling and
/// a rename.
///
/// Readers see either the previous file or the complete new one, and
/// concurrent writers to the same destination never share a temp file; the
/// last rename wins.
pub async fn write_atomic(dst: impl AsRef<Path>, contents: impl AsRef<[u8]>) -> MediaResult<()> {
    let dst = dst.as_ref().to_path_buf();
    ensure_parent(&dst).await?;
    let contents = contents.as_ref().to_vec();

    tokio::task::spawn_blocking(move || {
        let mut tmp = NamedTempFile::new_in(parent_dir(&dst))?;
        tmp.write_all(&contents)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&dst).map_err(|e| e.error)?;
        Ok::<(), MediaError>(())
    })
    .await
    .map_err(|e| MediaError::internal(format!("atomic write task failed: {}", e)))?
}

/// Create the parent directory of `path` if it is missing.
pub async fn ensure_parent(path: &Path) -> MediaResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }
    Ok(())
}

/// Remove a file, ignoring "not found".
pub async fn remove_if_exists(path: &Path) -> MediaResult<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(MediaError::from(e)),
    }
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Check if an IO error is EXDEV (cross-device link).
fn is_cross_device_error(e: &std::io::Error) -> bool {
    // EXDEV is error code 18 on Linux/macOS
    e.raw_os_error() == Some(18)
}

async fn copy_and_delete(src: &Path, dst: &Path) -> MediaResult<()> {
    let (file, tmp_dst) = NamedTempFile::new_in(parent_dir(dst))?.into_parts();
    drop(file);

    fs::copy(src, &tmp_dst).await?;

    if let Err(e) = tmp_dst.persist(dst) {
        tracing::error!(
            "Failed to rename copied file: {} -> {}: {}",
            e.path.display(),
            dst.display(),
            e.error
        );
        return Err(MediaError::from(e.error));
    }

    if let Err(e) = fs::remove_file(src).await {
        tracing::warn!("Failed to remove {} after copy: {}", src.display(), e);
    }

    Ok(())
}
