//! Filesystem helpers for placing finished outputs.

use std::path::Path;
use tokio::fs;
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};

/// Move a staged file into its final location, handling cross-device
/// moves.
///
/// Tries a fast rename first; on EXDEV falls back to copying into a
/// `.partial` sibling of the destination and renaming it into place, so
/// the destination only ever appears complete.
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
            debug!(
                src = %src.display(),
                dst = %dst.display(),
                "cross-device rename, falling back to copy"
            );
            copy_into_place(src, dst).await
        }
        Err(e) => Err(MediaError::from(e)),
    }
}

/// EXDEV: rename across filesystem boundaries.
fn is_cross_device_error(e: &std::io::Error) -> bool {
    e.raw_os_error() == Some(18)
}

/// Copy via a `.partial` sibling on the destination filesystem, then
/// rename atomically and drop the source.
async fn copy_into_place(src: &Path, dst: &Path) -> MediaResult<()> {
    let partial = dst.with_extension("partial");

    fs::copy(src, &partial).await?;

    if let Err(e) = fs::rename(&partial, dst).await {
        let _ = fs::remove_file(&partial).await;
        return Err(MediaError::from(e));
    }

    if let Err(e) = fs::remove_file(src).await {
        warn!(src = %src.display(), error = %e, "failed to remove staged file after move");
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
        let src = dir.path().join("staged.mp4");
        let dst = dir.path().join("final.mp4");

        fs::write(&src, b"clip bytes").await.unwrap();
        move_file(&src, &dst).await.unwrap();

        assert!(!src.exists());
        assert_eq!(fs::read(&dst).await.unwrap(), b"clip bytes");
    }

    #[tokio::test]
    async fn test_move_file_creates_parent_directory() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("staged.mp4");
        let dst = dir.path().join("outputs").join("final.mp4");

        fs::write(&src, b"clip bytes").await.unwrap();
        move_file(&src, &dst).await.unwrap();

        assert!(dst.exists());
    }

    #[tokio::test]
    async fn test_move_file_overwrites_destination() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("staged.mp4");
        let dst = dir.path().join("final.mp4");

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
