//! The production build flow.

use super::fs::{self as build_fs, copy_job, move_job};
use super::{Pipeline, TaskRunner};
use crate::errors::{BuildError, Result};
use crate::platform::BuildTarget;
use crate::process::CommandSpec;
use futures::future::try_join_all;
use tracing::debug;

impl Pipeline {
    /// Cleans, compiles and assembles the build directory.
    pub(super) async fn build(&self, runner: &TaskRunner, target: &BuildTarget) -> Result<()> {
        runner
            .stage("Cleaning up build directory", || self.clean_build_dir())
            .await?;

        if self.config.skip_vscode {
            debug!("Reusing the existing VS Code build");
        } else {
            runner.stage("Building VS Code", || self.build_vscode()).await?;
            runner
                .stage("Copying VS Code build", || self.copy_vscode_build())
                .await?;
        }

        runner
            .stage("Building code-server", || async {
                let tsc = CommandSpec::new("tsc").current_dir(&self.config.root);
                self.runner.run(&tsc).await.map(drop)
            })
            .await?;
        runner
            .stage("Bundling browser assets", || self.bundler.bundle())
            .await?;
        runner
            .stage("Copying code-server build", || self.copy_server_build())
            .await?;
        runner
            .stage("Writing final package.json", || self.write_package_json(&target.version))
            .await?;

        if self.config.minify {
            runner
                .stage("Installing production dependencies", || {
                    self.install_production_dependencies()
                })
                .await?;
        }
        Ok(())
    }

    async fn clean_build_dir(&self) -> Result<()> {
        let build_dir = self.config.build_dir();
        let result = if self.config.skip_vscode {
            build_fs::clear_directory_except(&build_dir, &["lib"]).await
        } else {
            tokio::fs::remove_dir_all(&build_dir).await.map_err(BuildError::from)
        };
        match result {
            Err(e) if e.is_not_found() => {
                debug!(path = %build_dir.display(), "No previous build to clean");
                Ok(())
            }
            other => other,
        }
    }

    async fn build_vscode(&self) -> Result<()> {
        let vscode = self.config.vscode_dir();
        let node_options = self.config.node_options();
        let gulp = |args: &[&str]| {
            CommandSpec::new("yarn")
                .arg("gulp")
                .args(args.iter().copied())
                .current_dir(&vscode)
                .env("NODE_OPTIONS", node_options.as_str())
        };

        let mut steps = vec![
            gulp(&["compile-build"]),
            gulp(&["compile-extensions-build"]),
            gulp(&["optimize", "--gulpfile", "./coder.js"]),
        ];
        if self.config.minify {
            steps.push(gulp(&["minify", "--gulpfile", "./coder.js"]));
        }

        for step in &steps {
            self.runner.run(step).await?;
        }
        Ok(())
    }

    async fn copy_vscode_build(&self) -> Result<()> {
        let src = self.config.vscode_dir();
        let dst = self.config.build_dir().join("lib").join("vscode");
        let out = if self.config.minify { "out-vscode-min" } else { "out-vscode" };
        let icon = ["resources", "linux", "code.png"].iter().collect::<std::path::PathBuf>();

        try_join_all(vec![
            move_job(src.join(out), dst.join("out")),
            copy_job(src.join(".build").join("extensions"), dst.join("extensions")),
            copy_job(src.join(&icon), dst.join(&icon)),
            copy_job(src.join("package.json"), dst.join("package.json")),
            copy_job(src.join("yarn.lock"), dst.join("yarn.lock")),
        ])
        .await?;
        Ok(())
    }

    async fn copy_server_build(&self) -> Result<()> {
        let root = &self.config.root;
        let build = self.config.build_dir();
        let media = ["src", "browser", "media"].iter().collect::<std::path::PathBuf>();

        try_join_all(vec![
            copy_job(root.join("out"), build.join("out")),
            copy_job(root.join("dist"), build.join("dist")),
            copy_job(root.join("package.json"), build.join("package.json")),
            copy_job(root.join("yarn.lock"), build.join("yarn.lock")),
            copy_job(root.join(&media), build.join(&media)),
        ])
        .await?;
        Ok(())
    }

    async fn write_package_json(&self, version: &str) -> Result<()> {
        let source = self.config.root.join("package.json");
        let mut manifest: serde_json::Value =
            serde_json::from_str(&tokio::fs::read_to_string(&source).await?)?;
        let object = manifest.as_object_mut().ok_or_else(|| {
            BuildError::config(format!("{} is not a JSON object", source.display()))
        })?;
        object.insert("version".to_string(), serde_json::Value::from(version));

        let mut text = serde_json::to_string_pretty(&manifest)?;
        text.push('\n');
        tokio::fs::write(self.config.build_dir().join("package.json"), text).await?;
        Ok(())
    }

    async fn install_production_dependencies(&self) -> Result<()> {
        let build = self.config.build_dir();
        let vscode = build.join("lib").join("vscode");
        let install = |dir: &std::path::Path| {
            CommandSpec::new("yarn")
                .args(["--production", "--ignore-scripts"])
                .current_dir(dir)
        };
        let commands = [install(&build), install(&vscode)];

        try_join_all(commands.iter().map(|c| self.runner.run(c))).await?;

        try_join_all(vec![
            build_fs::remove_path(&build.join("yarn.lock")),
            build_fs::remove_path(&vscode.join("yarn.lock")),
        ])
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{pipeline, write};
    use super::super::BuildTask;
    use crate::config::BuildConfig;
    use crate::platform::Target;
    use crate::process::CommandOutput;
    use pretty_assertions::assert_eq;
    use std::path::Path;
    use tempfile::TempDir;

    fn source_tree(root: &Path) {
        write(root, "lib/vscode/out-vscode/vs/code.js", "code");
        write(root, "lib/vscode/out-vscode-min/vs/code.js", "min");
        write(root, "lib/vscode/.build/extensions/git/package.json", "{}");
        write(root, "lib/vscode/resources/linux/code.png", "png");
        write(root, "lib/vscode/package.json", "{}");
        write(root, "lib/vscode/yarn.lock", "");
        write(root, "out/node/entry.js", "entry");
        write(root, "dist/register.js", "register");
        write(root, "package.json", r#"{"name":"code-server","version":"0.0.0"}"#);
        write(root, "yarn.lock", "");
        write(root, "src/browser/media/favicon.svg", "svg");
    }

    #[tokio::test]
    async fn test_full_build_runs_stages_in_order() {
        let dir = TempDir::new().unwrap();
        source_tree(dir.path());
        write(dir.path(), "build/stale.txt", "old");
        let config = BuildConfig::new(dir.path()).with_minify(true);
        let (pipeline, fx) = pipeline(config, Target::Linux);

        assert_eq!(pipeline.run(BuildTask::Build).await.unwrap(), 0);

        let commands = fx.runner.commands();
        assert_eq!(
            commands[..5],
            [
                "yarn gulp compile-build",
                "yarn gulp compile-extensions-build",
                "yarn gulp optimize --gulpfile ./coder.js",
                "yarn gulp minify --gulpfile ./coder.js",
                "tsc",
            ]
        );
        assert_eq!(
            commands[5..],
            ["yarn --production --ignore-scripts", "yarn --production --ignore-scripts"]
        );
        for spec in &fx.runner.specs()[..4] {
            assert_eq!(spec.env_value("NODE_OPTIONS"), Some("--max_old_space_size=8192"));
        }
        assert_eq!(fx.bundler.bundle_count(), 1);

        let build = dir.path().join("build");
        assert!(!build.join("stale.txt").exists());
        assert_eq!(
            std::fs::read_to_string(build.join("lib/vscode/out/vs/code.js")).unwrap(),
            "min"
        );
        assert!(build.join("lib/vscode/extensions/git/package.json").exists());
        assert!(build.join("lib/vscode/resources/linux/code.png").exists());
        assert!(build.join("out/node/entry.js").exists());
        assert!(build.join("src/browser/media/favicon.svg").exists());
        assert!(!build.join("yarn.lock").exists());
        assert!(!build.join("lib/vscode/yarn.lock").exists());

        let text = std::fs::read_to_string(build.join("package.json")).unwrap();
        let manifest: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(manifest["version"], "4.9.0");
        assert_eq!(manifest["name"], "code-server");

        let stages: Vec<_> = fx
            .sink
            .events_of_type("stage.completed")
            .iter()
            .filter_map(|e| e.field_str("stage").map(str::to_string))
            .collect();
        assert_eq!(stages.len(), 8);
        assert_eq!(stages[0], "Cleaning up build directory");
    }

    #[tokio::test]
    async fn test_skip_vscode_keeps_existing_editor_build() {
        let dir = TempDir::new().unwrap();
        source_tree(dir.path());
        write(dir.path(), "build/lib/vscode/out/kept.js", "kept");
        write(dir.path(), "build/out/old.js", "old");
        let config = BuildConfig::new(dir.path()).with_skip_vscode(true);
        let (pipeline, fx) = pipeline(config, Target::Linux);

        pipeline.run(BuildTask::Build).await.unwrap();

        assert_eq!(fx.runner.commands(), vec!["tsc"]);
        let build = dir.path().join("build");
        assert!(build.join("lib/vscode/out/kept.js").exists());
        assert!(!build.join("out/old.js").exists());
        assert!(build.join("yarn.lock").exists());
    }

    #[tokio::test]
    async fn test_failed_compile_stops_the_build() {
        let dir = TempDir::new().unwrap();
        source_tree(dir.path());
        let config = BuildConfig::new(dir.path()).with_skip_vscode(true);
        let (pipeline, fx) = pipeline(config, Target::Linux);
        fx.runner.fail("tsc", 2, "src/node/cli.ts(3,1): error TS2304");

        let err = pipeline.run(BuildTask::Build).await.unwrap_err();

        assert!(err.to_string().starts_with("Building code-server failed"));
        assert_eq!(fx.bundler.bundle_count(), 0);
        assert_eq!(fx.sink.events_of_type("stage.failed").len(), 1);
        assert!(!dir.path().join("build/package.json").exists());
    }

    #[tokio::test]
    async fn test_compile_diagnostics_on_stdout_reach_the_error() {
        let dir = TempDir::new().unwrap();
        source_tree(dir.path());
        let config = BuildConfig::new(dir.path()).with_skip_vscode(true);
        let (pipeline, fx) = pipeline(config, Target::Linux);
        fx.runner.respond(
            "tsc",
            CommandOutput {
                code: Some(2),
                stdout: "src/node/cli.ts(3,1): error TS2304: Cannot find name 'x'.\n".to_string(),
                stderr: String::new(),
            },
        );

        let err = pipeline.run(BuildTask::Build).await.unwrap_err();

        let message = err.to_string();
        assert!(message.starts_with("Building code-server failed"));
        assert!(message.contains("error TS2304"));
    }

    #[tokio::test]
    async fn test_missing_editor_output_fails_copy() {
        let dir = TempDir::new().unwrap();
        source_tree(dir.path());
        std::fs::remove_dir_all(dir.path().join("lib/vscode/out-vscode")).unwrap();
        let (pipeline, fx) = pipeline(BuildConfig::new(dir.path()), Target::Linux);

        let err = pipeline.run(BuildTask::Build).await.unwrap_err();

        assert!(err.to_string().starts_with("Copying VS Code build failed"));
        assert!(!fx.runner.commands().contains(&"tsc".to_string()));
    }
}
