//! Filesystem helpers for build stages.

use crate::errors::Result;
use futures::future::BoxFuture;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Recursively copies a directory.
pub fn copy_directory<'a>(src: &'a Path, dst: &'a Path) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        fs::create_dir_all(dst).await?;

        let mut entries = fs::read_dir(src).await?;
        while let Some(entry) = entries.next_entry().await? {
            let src_path = entry.path();
            let dst_path = dst.join(entry.file_name());

            if entry.file_type().await?.is_dir() {
                copy_directory(&src_path, &dst_path).await?;
            } else {
                fs::copy(&src_path, &dst_path).await?;
            }
        }

        Ok(())
    })
}

/// A copy of `src` to `dst` as an owned future, for running several at once.
pub fn copy_job(src: PathBuf, dst: PathBuf) -> BoxFuture<'static, Result<()>> {
    Box::pin(async move { copy_path(&src, &dst).await })
}

/// A move of `src` to `dst` as an owned future.
pub fn move_job(src: PathBuf, dst: PathBuf) -> BoxFuture<'static, Result<()>> {
    Box::pin(async move { move_path(&src, &dst).await })
}

/// Copies a file, creating the destination's parent directories.
pub async fn copy_file(src: &Path, dst: &Path) -> Result<()> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).await?;
    }
    fs::copy(src, dst).await?;
    Ok(())
}

/// Copies a file or directory.
pub async fn copy_path(src: &Path, dst: &Path) -> Result<()> {
    if fs::metadata(src).await?.is_dir() {
        copy_directory(src, dst).await
    } else {
        copy_file(src, dst).await
    }
}

/// Moves a file or directory, copying when a rename is not possible.
pub async fn move_path(src: &Path, dst: &Path) -> Result<()> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).await?;
    }
    remove_path(dst).await?;
    if fs::rename(src, dst).await.is_ok() {
        return Ok(());
    }
    copy_path(src, dst).await?;
    remove_path(src).await
}

/// Removes a file or directory. A missing path is not an error.
pub async fn remove_path(path: &Path) -> Result<()> {
    let metadata = match fs::symlink_metadata(path).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    let result = if metadata.is_dir() {
        fs::remove_dir_all(path).await
    } else {
        fs::remove_file(path).await
    };
    match result {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
        _ => Ok(()),
    }
}

/// Removes every entry of `dir` except those named in `keep`. A missing
/// directory is not an error.
pub async fn clear_directory_except(dir: &Path, keep: &[&str]) -> Result<()> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        if keep.iter().any(|k| name.to_str() == Some(*k)) {
            continue;
        }
        remove_path(&entry.path()).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &TempDir, rel: &str, contents: &str) {
        let path = dir.path().join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    #[tokio::test]
    async fn test_copy_directory_recurses() {
        let dir = TempDir::new().unwrap();
        write(&dir, "src/a.js", "a");
        write(&dir, "src/nested/b.js", "b");

        copy_directory(&dir.path().join("src"), &dir.path().join("dst")).await.unwrap();

        assert_eq!(std::fs::read_to_string(dir.path().join("dst/nested/b.js")).unwrap(), "b");
        assert!(dir.path().join("src/a.js").exists());
    }

    #[tokio::test]
    async fn test_move_path_replaces_destination() {
        let dir = TempDir::new().unwrap();
        write(&dir, "out-vscode/main.js", "new");
        write(&dir, "build/out/stale.js", "old");

        move_path(&dir.path().join("out-vscode"), &dir.path().join("build/out")).await.unwrap();

        assert!(dir.path().join("build/out/main.js").exists());
        assert!(!dir.path().join("build/out/stale.js").exists());
        assert!(!dir.path().join("out-vscode").exists());
    }

    #[tokio::test]
    async fn test_remove_missing_path_is_ok() {
        let dir = TempDir::new().unwrap();
        remove_path(&dir.path().join("nothing")).await.unwrap();
        clear_directory_except(&dir.path().join("nothing"), &[]).await.unwrap();
    }

    #[tokio::test]
    async fn test_clear_directory_keeps_named_entries() {
        let dir = TempDir::new().unwrap();
        write(&dir, "build/lib/vscode/out/main.js", "keep");
        write(&dir, "build/out/node/entry.js", "drop");
        write(&dir, "build/package.json", "{}");

        clear_directory_except(&dir.path().join("build"), &["lib"]).await.unwrap();

        assert!(dir.path().join("build/lib/vscode/out/main.js").exists());
        assert!(!dir.path().join("build/out").exists());
        assert!(!dir.path().join("build/package.json").exists());
    }
}
