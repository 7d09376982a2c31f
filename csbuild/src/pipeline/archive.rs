//! Release archives and checksums.

use crate::errors::{BuildError, Result};
use flate2::write::GzEncoder;
use flate2::Compression;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// Archive container format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    /// `.zip`, used for macOS releases.
    Zip,
    /// `.tar.gz`, used everywhere else.
    TarGz,
}

impl ArchiveFormat {
    /// Returns the file extension without a leading dot.
    #[must_use]
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Zip => "zip",
            Self::TarGz => "tar.gz",
        }
    }
}

/// Archives `dir` so that its contents sit under a top-level folder named
/// after the directory. Returns the archive path, `<dir>.<ext>`.
pub async fn create_archive(dir: &Path, format: ArchiveFormat) -> Result<PathBuf> {
    let name = dir
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| BuildError::Archive(format!("{} has no name", dir.display())))?
        .to_string();
    let archive = dir.with_file_name(format!("{name}.{}", format.extension()));

    let source = dir.to_path_buf();
    let target = archive.clone();
    tokio::task::spawn_blocking(move || match format {
        ArchiveFormat::Zip => write_zip(&source, &name, &target),
        ArchiveFormat::TarGz => write_tar_gz(&source, &name, &target),
    })
    .await
    .map_err(|e| BuildError::Archive(format!("archive task failed: {e}")))??;

    Ok(archive)
}

/// Writes `<file>.sha256` containing `<hex digest>  <file name>`.
pub async fn write_checksum(file: &Path) -> Result<PathBuf> {
    let bytes = tokio::fs::read(file).await?;
    let digest = hex::encode(Sha256::digest(&bytes));
    let name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut checksum = file.as_os_str().to_owned();
    checksum.push(".sha256");
    let checksum = PathBuf::from(checksum);
    tokio::fs::write(&checksum, format!("{digest}  {name}\n")).await?;
    Ok(checksum)
}

fn write_tar_gz(source: &Path, name: &str, target: &Path) -> Result<()> {
    let file = File::create(target)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.follow_symlinks(false);
    builder.append_dir_all(name, source)?;
    builder.into_inner()?.finish()?.sync_all()?;
    Ok(())
}

fn write_zip(source: &Path, name: &str, target: &Path) -> Result<()> {
    let file = File::create(target)?;
    let mut zip = ZipWriter::new(file);
    zip.add_directory(format!("{name}/"), SimpleFileOptions::default())
        .map_err(zip_error)?;
    add_zip_entries(&mut zip, source, name)?;
    zip.finish().map_err(zip_error)?;
    Ok(())
}

fn add_zip_entries(zip: &mut ZipWriter<File>, dir: &Path, prefix: &str) -> Result<()> {
    let mut entries = std::fs::read_dir(dir)?.collect::<std::io::Result<Vec<_>>>()?;
    entries.sort_by_key(std::fs::DirEntry::file_name);

    for entry in entries {
        let path = entry.path();
        let entry_name = format!("{prefix}/{}", entry.file_name().to_string_lossy());
        let metadata = entry.metadata()?;
        let options = SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated)
            .unix_permissions(permissions(&metadata));

        if metadata.is_dir() {
            zip.add_directory(format!("{entry_name}/"), options)
                .map_err(zip_error)?;
            add_zip_entries(zip, &path, &entry_name)?;
        } else {
            zip.start_file(entry_name, options).map_err(zip_error)?;
            let contents = std::fs::read(&path)?;
            zip.write_all(&contents)?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn permissions(metadata: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o777
}

#[cfg(not(unix))]
fn permissions(metadata: &std::fs::Metadata) -> u32 {
    if metadata.is_dir() {
        0o755
    } else {
        0o644
    }
}

fn zip_error(e: zip::result::ZipError) -> BuildError {
    BuildError::Archive(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    const RELEASE_FILES: [&str; 4] =
        ["code-server", "README.md", "LICENSE.txt", "ThirdPartyNotices.txt"];

    fn release_dir(dir: &TempDir) -> PathBuf {
        let release = dir.path().join("code-server-4.9.0-linux-x86_64");
        std::fs::create_dir_all(&release).unwrap();
        for file in RELEASE_FILES {
            std::fs::write(release.join(file), file).unwrap();
        }
        release
    }

    fn expected() -> Vec<String> {
        let mut names: Vec<String> = RELEASE_FILES
            .iter()
            .map(|f| format!("code-server-4.9.0-linux-x86_64/{f}"))
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_tar_gz_holds_files_under_top_folder() {
        let dir = TempDir::new().unwrap();
        let release = release_dir(&dir);

        let archive = create_archive(&release, ArchiveFormat::TarGz).await.unwrap();
        assert_eq!(archive, dir.path().join("code-server-4.9.0-linux-x86_64.tar.gz"));

        let mut tar = tar::Archive::new(GzDecoder::new(File::open(&archive).unwrap()));
        let mut names: Vec<String> = tar
            .entries()
            .unwrap()
            .map(|e| e.unwrap())
            .filter(|e| e.header().entry_type().is_file())
            .map(|e| e.path().unwrap().to_string_lossy().into_owned())
            .collect();
        names.sort();

        assert_eq!(names, expected());
    }

    #[tokio::test]
    async fn test_zip_holds_files_under_top_folder() {
        let dir = TempDir::new().unwrap();
        let release = release_dir(&dir);

        let archive = create_archive(&release, ArchiveFormat::Zip).await.unwrap();

        let zip = zip::ZipArchive::new(File::open(&archive).unwrap()).unwrap();
        let mut names: Vec<String> = zip
            .file_names()
            .filter(|n| !n.ends_with('/'))
            .map(str::to_string)
            .collect();
        names.sort();

        assert_eq!(names, expected());
    }

    #[tokio::test]
    async fn test_checksum_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("release.tar.gz");
        std::fs::write(&file, b"abc").unwrap();

        let checksum = write_checksum(&file).await.unwrap();

        assert_eq!(checksum, dir.path().join("release.tar.gz.sha256"));
        assert_eq!(
            std::fs::read_to_string(checksum).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad  release.tar.gz\n"
        );
    }
}
