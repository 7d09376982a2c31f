//! In-memory process launcher.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio::sync::watch;

use crate::errors::{BuildError, Result};
use crate::process::{ChildControl, CommandSpec, OutputStream, ProcessLauncher, SpawnedChild};

const PIPE_CAPACITY: usize = 64 * 1024;

#[derive(Debug, Default)]
struct Counters {
    kills: Vec<String>,
    live: HashMap<String, usize>,
    max_live: HashMap<String, usize>,
}

/// A fake child controlled by the test.
#[derive(Debug)]
pub struct FakeChild {
    spec: CommandSpec,
    pid: u32,
    stdout: tokio::sync::Mutex<Option<DuplexStream>>,
    stderr: tokio::sync::Mutex<Option<DuplexStream>>,
    exit_tx: watch::Sender<Option<Option<i32>>>,
    exited: AtomicBool,
    counters: Arc<Mutex<Counters>>,
}

impl FakeChild {
    /// Returns the command the child was launched with.
    #[must_use]
    pub fn spec(&self) -> &CommandSpec {
        &self.spec
    }

    /// Returns the fake process id.
    #[must_use]
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Returns true until the child exits or is killed.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.exited.load(Ordering::SeqCst)
    }

    /// Writes text to the child's stdout.
    pub async fn write_stdout(&self, text: &str) {
        if let Some(pipe) = self.stdout.lock().await.as_mut() {
            let _ = pipe.write_all(text.as_bytes()).await;
            let _ = pipe.flush().await;
        }
    }

    /// Writes text to the child's stderr.
    pub async fn write_stderr(&self, text: &str) {
        if let Some(pipe) = self.stderr.lock().await.as_mut() {
            let _ = pipe.write_all(text.as_bytes()).await;
            let _ = pipe.flush().await;
        }
    }

    /// Makes the child exit with the given code.
    pub fn exit(&self, code: Option<i32>) {
        self.finish(code);
    }

    fn kill(&self) {
        if self.is_running() {
            self.counters.lock().kills.push(self.spec.program.clone());
        }
        self.finish(None);
    }

    fn finish(&self, code: Option<i32>) {
        if self.exited.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Ok(mut pipe) = self.stdout.try_lock() {
            pipe.take();
        }
        if let Ok(mut pipe) = self.stderr.try_lock() {
            pipe.take();
        }
        if let Some(live) = self.counters.lock().live.get_mut(&self.spec.program) {
            *live = live.saturating_sub(1);
        }
        self.exit_tx.send_replace(Some(code));
    }
}

struct FakeControl {
    child: Arc<FakeChild>,
    exit_rx: watch::Receiver<Option<Option<i32>>>,
}

#[async_trait]
impl ChildControl for FakeControl {
    fn id(&self) -> Option<u32> {
        Some(self.child.pid)
    }

    async fn wait(&mut self) -> std::io::Result<Option<i32>> {
        let code = self
            .exit_rx
            .wait_for(Option::is_some)
            .await
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::BrokenPipe, e))?;
        Ok((*code).flatten())
    }

    fn start_kill(&mut self) -> std::io::Result<()> {
        self.child.kill();
        Ok(())
    }
}

/// A launcher that creates [`FakeChild`]ren instead of OS processes.
#[derive(Debug, Default)]
pub struct FakeLauncher {
    children: Mutex<Vec<Arc<FakeChild>>>,
    counters: Arc<Mutex<Counters>>,
    failures: Mutex<HashSet<String>>,
}

impl FakeLauncher {
    /// Creates an empty launcher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes launching the program fail.
    pub fn fail_to_spawn(&self, program: impl Into<String>) {
        self.failures.lock().insert(program.into());
    }

    /// Returns the most recent child for the program.
    #[must_use]
    pub fn child(&self, program: &str) -> Option<Arc<FakeChild>> {
        self.children
            .lock()
            .iter()
            .rev()
            .find(|c| c.spec.program == program)
            .cloned()
    }

    /// Returns every child launched for the program, oldest first.
    #[must_use]
    pub fn children(&self, program: &str) -> Vec<Arc<FakeChild>> {
        self.children
            .lock()
            .iter()
            .filter(|c| c.spec.program == program)
            .cloned()
            .collect()
    }

    /// Returns the number of launches for the program.
    #[must_use]
    pub fn launch_count(&self, program: &str) -> usize {
        self.children(program).len()
    }

    /// Waits until the program has been launched `count` times and returns
    /// the latest child. Gives up after one second.
    pub async fn wait_for_launch(&self, program: &str, count: usize) -> Option<Arc<FakeChild>> {
        let poll = async {
            loop {
                if self.launch_count(program) >= count {
                    return self.children(program).get(count.saturating_sub(1)).cloned();
                }
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        };
        tokio::time::timeout(Duration::from_secs(1), poll)
            .await
            .ok()
            .flatten()
    }

    /// Returns the programs killed, in kill order.
    #[must_use]
    pub fn kills(&self) -> Vec<String> {
        self.counters.lock().kills.clone()
    }

    /// Returns the highest number of simultaneously live children of the
    /// program.
    #[must_use]
    pub fn max_live(&self, program: &str) -> usize {
        self.counters
            .lock()
            .max_live
            .get(program)
            .copied()
            .unwrap_or(0)
    }
}

impl ProcessLauncher for FakeLauncher {
    fn launch(&self, command: &CommandSpec) -> Result<SpawnedChild> {
        if self.failures.lock().contains(&command.program) {
            return Err(BuildError::spawn(
                command.to_string(),
                std::io::Error::new(std::io::ErrorKind::NotFound, "program not found"),
            ));
        }

        let (stdout, stdout_writer) = pipe(command);
        let (stderr, stderr_writer) = pipe(command);
        let (exit_tx, exit_rx) = watch::channel(None);

        let mut children = self.children.lock();
        let child = Arc::new(FakeChild {
            spec: command.clone(),
            pid: 1000 + u32::try_from(children.len()).unwrap_or(0),
            stdout: tokio::sync::Mutex::new(stdout_writer),
            stderr: tokio::sync::Mutex::new(stderr_writer),
            exit_tx,
            exited: AtomicBool::new(false),
            counters: self.counters.clone(),
        });
        children.push(child.clone());
        drop(children);

        {
            let mut counters = self.counters.lock();
            let live = counters.live.entry(command.program.clone()).or_insert(0);
            *live += 1;
            let live = *live;
            let max = counters.max_live.entry(command.program.clone()).or_insert(0);
            *max = (*max).max(live);
        }

        Ok(SpawnedChild {
            control: Box::new(FakeControl { child, exit_rx }),
            stdout,
            stderr,
        })
    }
}

fn pipe(command: &CommandSpec) -> (Option<OutputStream>, Option<DuplexStream>) {
    if command.inherit_stdio {
        return (None, None);
    }
    let (reader, writer) = tokio::io::duplex(PIPE_CAPACITY);
    (Some(Box::new(reader)), Some(writer))
}
