//! Host platform and architecture resolution.
//!
//! The resolved [`Target`] selects build variants and names release
//! artifacts. Resolution happens at most once per [`PlatformResolver`].

mod probe;

pub use probe::{LddProbe, ProbeOutcome, VersionProbe};

use crate::errors::{BuildError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// Resolved platform identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    /// macOS.
    Darwin,
    /// musl-based Linux.
    Alpine,
    /// glibc-based Linux.
    Linux,
}

impl Target {
    /// Returns the release naming string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Darwin => "darwin",
            Self::Alpine => "alpine",
            Self::Linux => "linux",
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Target {
    type Err = BuildError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "darwin" => Ok(Self::Darwin),
            "alpine" => Ok(Self::Alpine),
            "linux" => Ok(Self::Linux),
            other => Err(BuildError::config(format!("Unknown target \"{other}\""))),
        }
    }
}

/// CPU architecture in release naming.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Arch(String);

impl Arch {
    /// Maps a Rust architecture name to its release name.
    #[must_use]
    pub fn from_rust_arch(arch: &str) -> Self {
        let name = match arch {
            "aarch64" => "arm64",
            "arm" => "armv7l",
            other => other,
        };
        Self(name.to_string())
    }

    /// Detects the architecture of the running binary.
    #[must_use]
    pub fn detect() -> Self {
        Self::from_rust_arch(std::env::consts::ARCH)
    }

    /// Returns the release name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Arch {
    type Err = BuildError;

    fn from_str(s: &str) -> Result<Self> {
        if s.is_empty() || s.contains(char::is_whitespace) {
            return Err(BuildError::config(format!("Invalid architecture \"{s}\"")));
        }
        Ok(Self(s.to_string()))
    }
}

/// Host operating system facts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostFacts {
    /// Operating system name as reported by the standard library.
    pub os: String,
    /// Value of the `OSTYPE` environment variable, if set.
    pub ostype: Option<String>,
}

impl HostFacts {
    /// Creates facts from explicit values.
    #[must_use]
    pub fn new(os: impl Into<String>, ostype: Option<String>) -> Self {
        Self {
            os: os.into(),
            ostype,
        }
    }

    /// Reads the facts of the running host.
    #[must_use]
    pub fn current() -> Self {
        Self::new(
            std::env::consts::OS,
            std::env::var("OSTYPE").ok().filter(|v| !v.is_empty()),
        )
    }

    /// Returns true for macOS hosts.
    #[must_use]
    pub fn is_darwin(&self) -> bool {
        matches!(self.os.as_str(), "macos" | "darwin")
            || self
                .ostype
                .as_deref()
                .is_some_and(|t| t.starts_with("darwin"))
    }
}

/// Platform, architecture and version of one build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildTarget {
    /// Resolved platform.
    pub target: Target,
    /// Architecture.
    pub arch: Arch,
    /// Release version.
    pub version: String,
}

impl BuildTarget {
    /// Returns `code-server-<version>-<target>-<arch>`.
    #[must_use]
    pub fn artifact_name(&self) -> String {
        format!("code-server-{}-{}-{}", self.version, self.target, self.arch)
    }
}

/// Resolves the build target once and caches it.
pub struct PlatformResolver {
    facts: HostFacts,
    probe: Arc<dyn VersionProbe>,
    target_override: Option<Target>,
    arch_override: Option<Arch>,
    target: OnceCell<Target>,
}

impl PlatformResolver {
    /// Creates a resolver for the given host facts and probe.
    #[must_use]
    pub fn new(facts: HostFacts, probe: Arc<dyn VersionProbe>) -> Self {
        Self {
            facts,
            probe,
            target_override: None,
            arch_override: None,
            target: OnceCell::new(),
        }
    }

    /// Uses a fixed target instead of detecting one.
    #[must_use]
    pub fn with_target(mut self, target: Option<Target>) -> Self {
        self.target_override = target;
        self
    }

    /// Uses a fixed architecture instead of detecting one.
    #[must_use]
    pub fn with_arch(mut self, arch: Option<Arch>) -> Self {
        self.arch_override = arch;
        self
    }

    /// Resolves the platform. The first call decides; later calls return
    /// the cached value.
    pub async fn resolve_target(&self) -> Result<Target> {
        self.target
            .get_or_try_init(|| async { self.detect_target().await })
            .await
            .copied()
    }

    /// Returns the architecture.
    #[must_use]
    pub fn resolve_arch(&self) -> Arch {
        self.arch_override.clone().unwrap_or_else(Arch::detect)
    }

    /// Combines target, arch and version.
    pub async fn resolve_build_target(&self, version: impl Into<String>) -> Result<BuildTarget> {
        Ok(BuildTarget {
            target: self.resolve_target().await?,
            arch: self.resolve_arch(),
            version: version.into(),
        })
    }

    async fn detect_target(&self) -> Result<Target> {
        if let Some(target) = self.target_override {
            debug!(target = %target, "Using target override");
            return Ok(target);
        }

        if self.facts.is_darwin() {
            return Ok(Target::Darwin);
        }

        let outcome = self.probe.probe().await;
        let target = match &outcome {
            ProbeOutcome::Unavailable(reason) => {
                warn!(reason = %reason, "C library probe unavailable, assuming glibc");
                Target::Linux
            }
            outcome if outcome.mentions_musl() => Target::Alpine,
            ProbeOutcome::Completed { code, .. } => {
                if *code != Some(0) {
                    warn!(code = ?code, "C library probe failed, assuming glibc");
                }
                Target::Linux
            }
        };

        info!(target = %target, os = %self.facts.os, "Resolved build target");
        Ok(target)
    }
}

impl fmt::Debug for PlatformResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlatformResolver")
            .field("facts", &self.facts)
            .field("target", &self.target.get())
            .finish_non_exhaustive()
    }
}
