//! Write-to-temporary-then-rename file replacement.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

/// How the final rename treats an existing file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Replace,
    NoClobber,
}

/// Atomically replace `path` with `contents`.
///
/// The temporary file lives in the destination directory so the final rename
/// never crosses a filesystem boundary; readers see the old file or the new
/// one, never a partial write.
pub async fn write_atomic(path: &Path, contents: Vec<u8>) -> io::Result<()> {
    write_with(path.to_path_buf(), contents, Mode::Replace).await
}

/// Like [`write_atomic`] but fails with `AlreadyExists` instead of replacing
pub async fn write_new(path: &Path, contents: Vec<u8>) -> io::Result<()> {
    write_with(path.to_path_buf(), contents, Mode::NoClobber).await
}

async fn write_with(path: PathBuf, contents: Vec<u8>, mode: Mode) -> io::Result<()> {
    tokio::task::spawn_blocking(move || write_blocking(&path, &contents, mode))
        .await
        .map_err(io::Error::other)?
}

fn write_blocking(path: &Path, contents: &[u8], mode: Mode) -> io::Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;

    match mode {
        Mode::Replace => tmp.persist(path).map_err(|e| e.error)?,
        Mode::NoClobber => tmp.persist_noclobber(path).map_err(|e| e.error)?,
    };

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_atomic_replaces() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("a.svg");

        write_atomic(&path, b"one".to_vec()).await.unwrap();
        write_atomic(&path, b"two".to_vec()).await.unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"two");
        // Only the target remains; no stray temporaries
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_write_new_refuses_existing() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("v1.svg");

        write_new(&path, b"first".to_vec()).await.unwrap();
        let err = write_new(&path, b"second".to_vec()).await.unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert_eq!(std::fs::read(&path).unwrap(), b"first");
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 1);
    }
}
