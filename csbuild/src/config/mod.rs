//! Build configuration.
//!
//! Settings come from the environment (`VERSION`, `SKIP_VSCODE`, `MINIFY`,
//! `AUTO_PATCH`, `MAX_OLD_SPACE_SIZE`) and are merged with CLI flags through
//! the `with_*` builders.

use crate::errors::{BuildError, Result};
use crate::process::CommandSpec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Default memory limit for node-based build steps, in megabytes.
pub const DEFAULT_MAX_OLD_SPACE_SIZE: u32 = 8192;

/// Orchestrator configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Repository root.
    pub root: PathBuf,
    /// Version override.
    pub version: Option<String>,
    /// Reuse an existing editor-core build.
    pub skip_vscode: bool,
    /// Minified editor output and production-only dependencies.
    pub minify: bool,
    /// Fire the patch generator once the editor client has compiled.
    pub auto_patch: bool,
    /// Memory limit for node-based build steps, in megabytes.
    pub max_old_space_size: u32,
    /// Arguments passed through to the development server.
    pub server_args: Vec<String>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            version: None,
            skip_vscode: false,
            minify: false,
            auto_patch: false,
            max_old_space_size: DEFAULT_MAX_OLD_SPACE_SIZE,
            server_args: Vec::new(),
        }
    }
}

impl BuildConfig {
    /// Creates a configuration rooted at the given directory.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Loads settings from the process environment.
    pub fn from_env(root: impl Into<PathBuf>) -> Result<Self> {
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_vars(root, &vars)
    }

    /// Loads settings from an explicit variable map.
    pub fn from_vars(root: impl Into<PathBuf>, vars: &HashMap<String, String>) -> Result<Self> {
        let flag = |key: &str| vars.get(key).is_some_and(|v| is_truthy(v));

        let max_old_space_size = match vars.get("MAX_OLD_SPACE_SIZE").map(|v| v.trim()) {
            None | Some("") => DEFAULT_MAX_OLD_SPACE_SIZE,
            Some(value) => value.parse().map_err(|_| {
                BuildError::config(format!("MAX_OLD_SPACE_SIZE must be a number, got \"{value}\""))
            })?,
        };

        Ok(Self {
            root: root.into(),
            version: vars.get("VERSION").filter(|v| !v.is_empty()).cloned(),
            skip_vscode: flag("SKIP_VSCODE"),
            minify: flag("MINIFY"),
            auto_patch: flag("AUTO_PATCH"),
            max_old_space_size,
            server_args: Vec::new(),
        })
    }

    /// Sets the version override.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Sets whether the editor-core build is skipped.
    #[must_use]
    pub fn with_skip_vscode(mut self, skip: bool) -> Self {
        self.skip_vscode = skip;
        self
    }

    /// Sets whether output is minified.
    #[must_use]
    pub fn with_minify(mut self, minify: bool) -> Self {
        self.minify = minify;
        self
    }

    /// Sets whether the patch generator fires in watch mode.
    #[must_use]
    pub fn with_auto_patch(mut self, auto_patch: bool) -> Self {
        self.auto_patch = auto_patch;
        self
    }

    /// Sets the server pass-through arguments.
    #[must_use]
    pub fn with_server_args(mut self, args: Vec<String>) -> Self {
        self.server_args = args;
        self
    }

    /// `lib/vscode` under the root.
    #[must_use]
    pub fn vscode_dir(&self) -> PathBuf {
        self.root.join("lib").join("vscode")
    }

    /// `build/` under the root.
    #[must_use]
    pub fn build_dir(&self) -> PathBuf {
        self.root.join("build")
    }

    /// `binaries/` under the root.
    #[must_use]
    pub fn binaries_dir(&self) -> PathBuf {
        self.root.join("binaries")
    }

    /// `release/` under the root.
    #[must_use]
    pub fn release_dir(&self) -> PathBuf {
        self.root.join("release")
    }

    /// `NODE_OPTIONS` value carrying the memory limit.
    #[must_use]
    pub fn node_options(&self) -> String {
        format!("--max_old_space_size={}", self.max_old_space_size)
    }

    /// Resolves the release version: the override, else `version` from the
    /// root `package.json`, else the crate version.
    pub async fn resolve_version(&self) -> Result<String> {
        if let Some(ref version) = self.version {
            return Ok(version.clone());
        }
        let manifest = self.root.join("package.json");
        match tokio::fs::read_to_string(&manifest).await {
            Ok(text) => {
                let json: serde_json::Value = serde_json::from_str(&text)?;
                Ok(json
                    .get("version")
                    .and_then(serde_json::Value::as_str)
                    .map_or_else(|| env!("CARGO_PKG_VERSION").to_string(), str::to_string))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok(env!("CARGO_PKG_VERSION").to_string())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Commands supervised in watch mode.
    #[must_use]
    pub fn watch_commands(&self) -> WatchCommands {
        WatchCommands::for_root(&self.root, &self.server_args)
            .with_node_options(&self.node_options())
    }
}

/// The command lines watch mode runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchCommands {
    /// Editor-core watcher.
    pub editor: CommandSpec,
    /// Type-checker watcher.
    pub type_checker: CommandSpec,
    /// Development server.
    pub server: CommandSpec,
    /// Patch generator fired once after the editor client compiles.
    pub patch: CommandSpec,
}

impl WatchCommands {
    /// Default commands for a repository root.
    #[must_use]
    pub fn for_root(root: &Path, server_args: &[String]) -> Self {
        Self {
            editor: CommandSpec::new("yarn")
                .arg("watch")
                .current_dir(root.join("lib").join("vscode")),
            type_checker: CommandSpec::new("tsc")
                .args(["--watch", "--pretty", "--preserveWatchOutput"])
                .current_dir(root),
            server: CommandSpec::new("node")
                .arg("out/node/entry.js")
                .args(server_args.iter().cloned())
                .current_dir(root)
                .inherit_stdio(),
            patch: CommandSpec::new("yarn")
                .arg("patch:generate")
                .current_dir(root),
        }
    }

    /// Applies the memory limit to the editor watcher.
    #[must_use]
    pub fn with_node_options(mut self, node_options: &str) -> Self {
        self.editor = self.editor.env("NODE_OPTIONS", node_options);
        self
    }
}

/// Returns true unless the value is empty, `0` or `false`.
#[must_use]
pub fn is_truthy(value: &str) -> bool {
    !matches!(value.trim(), "" | "0" | "false")
}
