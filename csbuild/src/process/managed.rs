//! Supervisor-owned handles to long-running children.

use super::{CommandSpec, ProcessLauncher, SpawnedChild};
use crate::errors::Result;
use crate::stream::{self, OutputLine};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// The logical role of a supervised child. At most one child per role is
/// live at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessRole {
    /// The editor-core watcher (`yarn watch` in `lib/vscode`).
    Editor,
    /// The type-checker watcher (`tsc --watch`).
    TypeChecker,
    /// The running development server.
    Server,
    /// The browser asset bundler in watch mode.
    Bundler,
}

impl ProcessRole {
    /// Returns the console prefix tag for the role.
    #[must_use]
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Editor => "vscode",
            Self::TypeChecker => "tsc",
            Self::Server => "server",
            Self::Bundler => "bundler",
        }
    }
}

impl fmt::Display for ProcessRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Exit report of a managed child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitNotice {
    /// The role of the child.
    pub role: ProcessRole,
    /// The child's process id.
    pub pid: Option<u32>,
    /// The exit code, `None` when killed by a signal.
    pub code: Option<i32>,
}

/// A long-running child owned by the supervisor.
///
/// A monitor task owns the child's control handle, waits for it to exit or
/// for a kill request, and publishes the exit. Dropping the handle without
/// terminating it kills the child.
pub struct ManagedProcess {
    role: ProcessRole,
    command: String,
    cwd: Option<PathBuf>,
    pid: Option<u32>,
    kill_tx: Option<oneshot::Sender<()>>,
    exit_rx: watch::Receiver<Option<ExitNotice>>,
    detached: Arc<AtomicBool>,
    readers: Vec<JoinHandle<()>>,
}

impl ManagedProcess {
    /// Spawns the command for the given role.
    ///
    /// Stdout lines go to `on_line`; stderr is forwarded to this process's
    /// stderr untouched. `on_exit` runs once when the child exits, unless
    /// listeners were detached first.
    pub fn spawn<L, X>(
        role: ProcessRole,
        command: &CommandSpec,
        launcher: &dyn ProcessLauncher,
        on_line: L,
        on_exit: X,
    ) -> Result<Self>
    where
        L: FnMut(OutputLine) + Send + 'static,
        X: FnOnce(ExitNotice) + Send + 'static,
    {
        let SpawnedChild {
            mut control,
            stdout,
            stderr,
        } = launcher.launch(command)?;

        let pid = control.id();
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = stdout {
            readers.push(stream::attach(stdout, role.tag(), on_line));
        }
        if let Some(stderr) = stderr {
            readers.push(stream::passthrough(stderr, tokio::io::stderr(), role.tag()));
        }

        let (kill_tx, kill_rx) = oneshot::channel::<()>();
        let (exit_tx, exit_rx) = watch::channel(None);
        let detached = Arc::new(AtomicBool::new(false));
        let detached_flag = detached.clone();

        tokio::spawn(async move {
            let status = tokio::select! {
                status = control.wait() => status,
                _ = kill_rx => {
                    if let Err(e) = control.start_kill() {
                        warn!(role = %role, pid = ?pid, error = %e, "Failed to kill process");
                    }
                    control.wait().await
                }
            };

            let code = status.unwrap_or_else(|e| {
                warn!(role = %role, pid = ?pid, error = %e, "Failed to wait for process");
                None
            });
            info!(
                role = %role,
                pid = ?pid,
                code = ?code,
                "[{}] process {} exited",
                role,
                display_pid(pid)
            );

            let notice = ExitNotice { role, pid, code };
            let _ = exit_tx.send(Some(notice.clone()));
            if !detached_flag.load(Ordering::SeqCst) {
                on_exit(notice);
            }
        });

        Ok(Self {
            role,
            command: command.to_string(),
            cwd: command.cwd.clone(),
            pid,
            kill_tx: Some(kill_tx),
            exit_rx,
            detached,
            readers,
        })
    }

    /// Returns the role.
    #[must_use]
    pub fn role(&self) -> ProcessRole {
        self.role
    }

    /// Returns the process id.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Returns the command line.
    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Returns true until the child's exit has been observed.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.exit_rx.borrow().is_none()
    }

    /// Stops delivering output lines and exit notifications.
    pub fn detach(&mut self) {
        self.detached.store(true, Ordering::SeqCst);
        for reader in self.readers.drain(..) {
            reader.abort();
        }
    }

    /// Detaches listeners, kills the child and waits for its exit.
    pub async fn terminate(&mut self) -> Option<ExitNotice> {
        self.detach();
        if let Some(kill_tx) = self.kill_tx.take() {
            let _ = kill_tx.send(());
        }
        self.wait_exit().await
    }

    /// Waits until the child has exited.
    pub async fn wait_exit(&self) -> Option<ExitNotice> {
        let mut rx = self.exit_rx.clone();
        let result = rx.wait_for(Option::is_some).await;
        result.ok().and_then(|notice| (*notice).clone())
    }
}

impl fmt::Debug for ManagedProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedProcess")
            .field("role", &self.role)
            .field("command", &self.command)
            .field("cwd", &self.cwd)
            .field("pid", &self.pid)
            .field("alive", &self.is_alive())
            .finish()
    }
}

fn display_pid(pid: Option<u32>) -> String {
    pid.map_or_else(|| "?".to_string(), |p| p.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeLauncher;
    use parking_lot::Mutex;
    use std::time::Duration;

    #[test]
    fn test_role_tags() {
        assert_eq!(ProcessRole::Editor.to_string(), "vscode");
        assert_eq!(ProcessRole::TypeChecker.to_string(), "tsc");
        assert_eq!(ProcessRole::Server.tag(), "server");
        assert_eq!(ProcessRole::Bundler.tag(), "bundler");
    }

    #[tokio::test]
    async fn test_lines_and_exit_are_reported() {
        let launcher = FakeLauncher::new();
        let lines = Arc::new(Mutex::new(Vec::new()));
        let exits = Arc::new(Mutex::new(Vec::new()));
        let (l, e) = (lines.clone(), exits.clone());

        let process = ManagedProcess::spawn(
            ProcessRole::TypeChecker,
            &CommandSpec::new("tsc"),
            &launcher,
            move |line| l.lock().push(line.stripped),
            move |notice| e.lock().push(notice),
        )
        .unwrap();

        let child = launcher.child("tsc").unwrap();
        child.write_stdout("Watching for file changes.\n").await;
        child.exit(Some(2));

        let notice = process.wait_exit().await.unwrap();
        assert_eq!(notice.code, Some(2));
        assert!(!process.is_alive());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(*lines.lock(), vec!["Watching for file changes."]);
        assert_eq!(exits.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_terminate_suppresses_exit_callback() {
        let launcher = FakeLauncher::new();
        let exits = Arc::new(Mutex::new(Vec::new()));
        let e = exits.clone();

        let mut process = ManagedProcess::spawn(
            ProcessRole::Editor,
            &CommandSpec::new("yarn").arg("watch"),
            &launcher,
            |_| {},
            move |notice| e.lock().push(notice),
        )
        .unwrap();

        assert!(process.is_alive());
        let notice = process.terminate().await.unwrap();

        assert_eq!(notice.role, ProcessRole::Editor);
        assert_eq!(notice.code, None);
        assert!(!process.is_alive());
        assert!(exits.lock().is_empty());
        assert_eq!(launcher.kills(), vec!["yarn".to_string()]);
    }
}
