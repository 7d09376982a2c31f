//! Launching long-running children.

use super::CommandSpec;
use crate::errors::{BuildError, Result};
use async_trait::async_trait;
use tokio::io::AsyncRead;

/// A boxed child output stream.
pub type OutputStream = Box<dyn AsyncRead + Send + Unpin>;

/// Control over a running child.
#[async_trait]
pub trait ChildControl: Send {
    /// Returns the OS process id, if known.
    fn id(&self) -> Option<u32>;

    /// Waits for the child to exit and returns its exit code.
    async fn wait(&mut self) -> std::io::Result<Option<i32>>;

    /// Sends the kill signal without waiting for the exit.
    fn start_kill(&mut self) -> std::io::Result<()>;
}

#[async_trait]
impl ChildControl for tokio::process::Child {
    fn id(&self) -> Option<u32> {
        tokio::process::Child::id(self)
    }

    async fn wait(&mut self) -> std::io::Result<Option<i32>> {
        tokio::process::Child::wait(self).await.map(|status| status.code())
    }

    fn start_kill(&mut self) -> std::io::Result<()> {
        tokio::process::Child::start_kill(self)
    }
}

/// A freshly spawned child with its output pipes.
pub struct SpawnedChild {
    /// Control handle.
    pub control: Box<dyn ChildControl>,
    /// Piped standard output, unless stdio is inherited.
    pub stdout: Option<OutputStream>,
    /// Piped standard error, unless stdio is inherited.
    pub stderr: Option<OutputStream>,
}

impl std::fmt::Debug for SpawnedChild {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpawnedChild")
            .field("pid", &self.control.id())
            .field("stdout", &self.stdout.is_some())
            .field("stderr", &self.stderr.is_some())
            .finish()
    }
}

/// Seam for spawning long-running children.
pub trait ProcessLauncher: Send + Sync {
    /// Spawns the command. Does not wait for readiness.
    fn launch(&self, command: &CommandSpec) -> Result<SpawnedChild>;
}

/// Spawns real OS processes through tokio.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemLauncher;

impl ProcessLauncher for SystemLauncher {
    fn launch(&self, command: &CommandSpec) -> Result<SpawnedChild> {
        let mut child = command
            .to_command()
            .spawn()
            .map_err(|e| BuildError::spawn(command.to_string(), e))?;

        let stdout = child.stdout.take().map(|s| Box::new(s) as OutputStream);
        let stderr = child.stderr.take().map(|s| Box::new(s) as OutputStream);

        Ok(SpawnedChild {
            control: Box::new(child),
            stdout,
            stderr,
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_system_launcher_pipes_output() {
        let spec = CommandSpec::new("sh").args(["-c", "echo ready"]);
        let mut child = SystemLauncher.launch(&spec).unwrap();

        assert!(child.control.id().is_some());

        let mut out = String::new();
        child.stdout.take().unwrap().read_to_string(&mut out).await.unwrap();
        assert_eq!(out, "ready\n");
        assert_eq!(child.control.wait().await.unwrap(), Some(0));
    }

    #[tokio::test]
    async fn test_system_launcher_kill() {
        let spec = CommandSpec::new("sleep").arg("30");
        let mut child = SystemLauncher.launch(&spec).unwrap();

        child.control.start_kill().unwrap();
        assert_eq!(child.control.wait().await.unwrap(), None);
    }

    #[test]
    fn test_inherited_stdio_has_no_pipes() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let spec = CommandSpec::new("true").inherit_stdio();
            let mut child = SystemLauncher.launch(&spec).unwrap();
            assert!(child.stdout.is_none());
            assert!(child.stderr.is_none());
            child.control.wait().await.unwrap();
        });
    }
}
