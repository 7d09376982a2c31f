//! Binary packing and release packaging.

use super::archive::{self, ArchiveFormat};
use super::fs::{self as build_fs, copy_job};
use super::{Pipeline, TaskRunner};
use crate::errors::{BuildError, Result};
use crate::platform::{BuildTarget, Target};
use crate::process::CommandSpec;
use futures::future::try_join_all;
use std::path::{Path, PathBuf};
use tracing::info;

/// Files shipped next to the binary in every release.
const RELEASE_DOCUMENTS: [&str; 3] = ["README.md", "LICENSE.txt", "ThirdPartyNotices.txt"];

impl Pipeline {
    /// Packs the build directory into `binaries/<artifact>`.
    pub(super) async fn binary(
        &self,
        runner: &TaskRunner,
        target: &BuildTarget,
    ) -> Result<PathBuf> {
        let build_dir = self.config.build_dir();
        if !tokio::fs::try_exists(&build_dir).await? {
            return Err(BuildError::config(format!(
                "{} does not exist; run the build task first",
                build_dir.display()
            )));
        }

        let output = self.config.binaries_dir().join(target.artifact_name());
        runner
            .stage("Building binary", || async {
                tokio::fs::create_dir_all(self.config.binaries_dir()).await?;
                let packer = packer_command(&self.config.root, &build_dir, &output, target);
                self.runner.run(&packer).await?;
                Ok(())
            })
            .await?;

        info!(path = %output.display(), "Binary ready");
        Ok(output)
    }

    /// Assembles `release/<artifact>/` and archives it with a checksum.
    pub(super) async fn package(
        &self,
        runner: &TaskRunner,
        target: &BuildTarget,
    ) -> Result<PathBuf> {
        let name = target.artifact_name();
        let release = self.config.release_dir().join(&name);

        runner
            .stage("Preparing release directory", || async {
                build_fs::remove_path(&release).await?;
                tokio::fs::create_dir_all(&release).await?;

                let mut jobs = vec![copy_job(
                    self.config.binaries_dir().join(&name),
                    release.join("code-server"),
                )];
                jobs.extend(
                    RELEASE_DOCUMENTS
                        .iter()
                        .map(|doc| copy_job(self.config.root.join(doc), release.join(doc))),
                );
                try_join_all(jobs).await?;
                Ok(())
            })
            .await?;

        let format = match target.target {
            Target::Darwin => ArchiveFormat::Zip,
            Target::Alpine | Target::Linux => ArchiveFormat::TarGz,
        };
        let archive = runner
            .stage("Archiving release", || archive::create_archive(&release, format))
            .await?;
        runner
            .stage("Writing checksum", || archive::write_checksum(&archive))
            .await?;

        info!(path = %archive.display(), "Release ready");
        Ok(archive)
    }
}

fn packer_command(
    root: &Path,
    build_dir: &Path,
    output: &Path,
    target: &BuildTarget,
) -> CommandSpec {
    CommandSpec::new("yarn")
        .args(["nbin", "build"])
        .arg(build_dir.to_string_lossy())
        .args(["--target", target.target.as_str(), "--arch", target.arch.as_str()])
        .arg("--output")
        .arg(output.to_string_lossy())
        .current_dir(root)
}
