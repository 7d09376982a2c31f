//! Watch-mode process supervisor.
//!
//! The supervisor runs the editor watcher, the type-checker and the bundler
//! watch side by side, restarts the development server whenever the
//! type-checker finishes a compile, and tears everything down in a fixed
//! order on a signal or a fatal watcher exit.
//!
//! Every state change happens in one control loop fed by a
//! [`SupervisorMessage`] channel. Line readers, exit monitors, the bundler
//! event forwarder and signal handlers only post messages. Server restarts
//! run inline in the loop, so two restarts can never overlap.

mod signals;
mod state;
mod triggers;

pub use signals::{forward_signals, ShutdownSignal};
pub use state::SupervisorState;
pub use triggers::{
    EditorTrigger, TriggerAction, TypeCheckTrigger, CLIENT_WATCH_MARKER,
    COMPILATION_FINISHED_MARKER, TYPE_CHECK_READY_MARKER,
};

use crate::bundler::{BundleStatus, Bundler, BundlerEvent, BundlerWatch};
use crate::config::WatchCommands;
use crate::errors::Result;
use crate::events::{EventSink, NoOpEventSink};
use crate::process::{
    CommandRunner, CommandSpec, ExitNotice, ManagedProcess, ProcessLauncher, ProcessRole,
};
use crate::stream::OutputLine;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// Input of the supervisor control loop.
#[derive(Debug, Clone)]
pub enum SupervisorMessage {
    /// A line of child stdout.
    Line {
        /// Role of the child.
        role: ProcessRole,
        /// The line.
        line: OutputLine,
    },
    /// A child exited on its own.
    Exited(ExitNotice),
    /// Bundler watch progress.
    Bundler(BundlerEvent),
    /// Restart the server once the bundler is not building.
    RestartServer,
    /// The bundler is ready; restart the server now.
    RestartReady,
    /// A termination signal arrived.
    Signal(ShutdownSignal),
}

/// Cloneable handle for posting to a running supervisor.
#[derive(Debug, Clone)]
pub struct SupervisorHandle {
    tx: mpsc::UnboundedSender<SupervisorMessage>,
}

impl SupervisorHandle {
    /// Posts a message. Returns false once the supervisor is gone.
    pub fn send(&self, message: SupervisorMessage) -> bool {
        self.tx.send(message).is_ok()
    }

    /// Delivers a termination signal.
    pub fn signal(&self, signal: ShutdownSignal) -> bool {
        self.send(SupervisorMessage::Signal(signal))
    }

    /// Requests a server restart.
    pub fn restart_server(&self) -> bool {
        self.send(SupervisorMessage::RestartServer)
    }
}

/// The watch-mode supervisor.
pub struct Supervisor {
    commands: WatchCommands,
    launcher: Arc<dyn ProcessLauncher>,
    runner: Arc<dyn CommandRunner>,
    bundler: Arc<dyn Bundler>,
    sink: Arc<dyn EventSink>,
    state: SupervisorState,
    tx: mpsc::UnboundedSender<SupervisorMessage>,
    rx: mpsc::UnboundedReceiver<SupervisorMessage>,
    editor: Option<ManagedProcess>,
    type_checker: Option<ManagedProcess>,
    server: Option<ManagedProcess>,
    bundler_watch: Option<BundlerWatch>,
    bundle_status: watch::Sender<BundleStatus>,
    editor_trigger: EditorTrigger,
    type_check_trigger: TypeCheckTrigger,
    pending_restart: bool,
    restart_queued: bool,
    exit_code: Option<i32>,
}

impl Supervisor {
    /// Creates an idle supervisor.
    #[must_use]
    pub fn new(
        commands: WatchCommands,
        launcher: Arc<dyn ProcessLauncher>,
        runner: Arc<dyn CommandRunner>,
        bundler: Arc<dyn Bundler>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (bundle_status, _) = watch::channel(BundleStatus::Building);
        Self {
            commands,
            launcher,
            runner,
            bundler,
            sink: Arc::new(NoOpEventSink),
            state: SupervisorState::Idle,
            tx,
            rx,
            editor: None,
            type_checker: None,
            server: None,
            bundler_watch: None,
            bundle_status,
            editor_trigger: EditorTrigger::new(false),
            type_check_trigger: TypeCheckTrigger,
            pending_restart: false,
            restart_queued: false,
            exit_code: None,
        }
    }

    /// Enables the patch generator after the first client compilation.
    #[must_use]
    pub fn with_auto_patch(mut self, enabled: bool) -> Self {
        self.editor_trigger = EditorTrigger::new(enabled);
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Returns a handle for posting messages.
    #[must_use]
    pub fn handle(&self) -> SupervisorHandle {
        SupervisorHandle {
            tx: self.tx.clone(),
        }
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> SupervisorState {
        self.state
    }

    /// Starts the watchers and processes messages until shutdown.
    ///
    /// Returns the exit code chosen by the shutdown. A failure to start is
    /// returned as an error after whatever did start has been torn down.
    pub async fn run(mut self) -> Result<i32> {
        if let Err(e) = self.start().await {
            error!(error = %e, "Failed to start watch mode");
            self.shutdown(1).await;
            return Err(e);
        }

        while let Some(message) = self.rx.recv().await {
            if let Some(code) = self.handle_message(message).await {
                return Ok(code);
            }
        }
        Ok(self.shutdown(1).await)
    }

    /// Spawns the editor watcher and type-checker and starts the bundler
    /// watch. Does not wait for any of them to become ready.
    pub async fn start(&mut self) -> Result<()> {
        self.transition(SupervisorState::Starting);

        let editor = self.commands.editor.clone();
        self.editor = Some(self.spawn_process(ProcessRole::Editor, &editor)?);
        let type_checker = self.commands.type_checker.clone();
        self.type_checker = Some(self.spawn_process(ProcessRole::TypeChecker, &type_checker)?);

        let mut bundler_watch = self.bundler.watch().await?;
        if let Some(mut events) = bundler_watch.take_events() {
            let tx = self.tx.clone();
            tokio::spawn(async move {
                while let Some(event) = events.recv().await {
                    if tx.send(SupervisorMessage::Bundler(event)).is_err() {
                        break;
                    }
                }
            });
        }
        self.bundler_watch = Some(bundler_watch);

        self.transition(SupervisorState::Running);
        self.sink.emit_kind("supervisor.started", None);
        Ok(())
    }

    /// Replaces the running server, if any, with a fresh one.
    ///
    /// The old server's exit is awaited before the new one is spawned.
    pub async fn restart_server(&mut self) -> Result<()> {
        if let Some(mut old) = self.server.take() {
            let notice = old.terminate().await;
            self.emit_killed(ProcessRole::Server, notice.as_ref());
        }
        let command = self.commands.server.clone();
        self.server = Some(self.spawn_process(ProcessRole::Server, &command)?);
        Ok(())
    }

    /// Stops every child in order (editor watcher, type-checker, server,
    /// bundler watch) and returns the exit code for the run.
    ///
    /// Only the first call does anything; later calls return the code the
    /// first one chose.
    pub async fn shutdown(&mut self, code: i32) -> i32 {
        if let Some(code) = self.exit_code {
            return code;
        }
        self.exit_code = Some(code);
        self.transition(SupervisorState::Draining);
        info!(code, "Shutting down watch mode");

        let children = [self.editor.take(), self.type_checker.take(), self.server.take()];
        for mut process in children.into_iter().flatten() {
            let notice = process.terminate().await;
            self.emit_killed(process.role(), notice.as_ref());
        }

        if let Some(mut bundler_watch) = self.bundler_watch.take() {
            bundler_watch.stop().await;
            self.emit_killed(ProcessRole::Bundler, None);
        }

        self.transition(SupervisorState::Terminated);
        self.sink
            .emit_kind("supervisor.exit", Some(json!({ "code": code })));
        code
    }

    async fn handle_message(&mut self, message: SupervisorMessage) -> Option<i32> {
        if self.state.is_shutting_down() {
            return self.exit_code;
        }

        match message {
            SupervisorMessage::Line { role, line } => self.on_line(role, &line),
            SupervisorMessage::Exited(notice) => return self.on_exit(notice).await,
            SupervisorMessage::Bundler(event) => self.on_bundler_event(&event),
            SupervisorMessage::RestartServer => self.request_restart(),
            SupervisorMessage::RestartReady => self.on_restart_ready().await,
            SupervisorMessage::Signal(signal) => {
                info!(signal = %signal, "Stopping watch mode");
                return Some(self.shutdown(0).await);
            }
        }
        None
    }

    fn on_line(&mut self, role: ProcessRole, line: &OutputLine) {
        match role {
            ProcessRole::Editor => {
                echo(role, line);
                if let Some(TriggerAction::AutoPatch) = self.editor_trigger.evaluate(line) {
                    info!("[{}] client compiled, generating patch", role);
                    self.sink.emit_kind(
                        "trigger.auto_patch",
                        Some(json!({ "command": self.commands.patch.to_string() })),
                    );
                    self.runner.spawn_detached(self.commands.patch.clone());
                }
            }
            ProcessRole::TypeChecker => {
                if self.type_check_trigger.should_echo(line) {
                    echo(role, line);
                }
                if let Some(TriggerAction::RestartServer) = self.type_check_trigger.evaluate(line) {
                    self.request_restart();
                }
            }
            ProcessRole::Server | ProcessRole::Bundler => echo(role, line),
        }
    }

    async fn on_exit(&mut self, notice: ExitNotice) -> Option<i32> {
        self.sink.emit_kind(
            "process.exited",
            Some(json!({ "role": notice.role.tag(), "pid": notice.pid, "code": notice.code })),
        );

        match notice.role {
            ProcessRole::Server => {
                if self.server.as_ref().map(ManagedProcess::pid) == Some(notice.pid) {
                    self.server = None;
                }
                None
            }
            ProcessRole::Editor | ProcessRole::TypeChecker => {
                if self.state != SupervisorState::Running {
                    return None;
                }
                error!(code = ?notice.code, "[{}] terminated unexpectedly", notice.role);
                let code = notice.code.filter(|c| *c != 0).unwrap_or(1);
                Some(self.shutdown(code).await)
            }
            ProcessRole::Bundler => None,
        }
    }

    fn on_bundler_event(&mut self, event: &BundlerEvent) {
        self.bundle_status.send_replace(BundleStatus::after(event));
        match event {
            BundlerEvent::BuildStart => {
                println!("[bundler] bundling...");
                self.sink.emit_kind("bundler.build_start", None);
            }
            BundlerEvent::BuildEnd { duration } => {
                match duration {
                    Some(d) => println!("[bundler] bundled in {}ms", d.as_millis()),
                    None => println!("[bundler] bundled"),
                }
                self.sink.emit_kind(
                    "bundler.build_end",
                    Some(json!({ "duration_ms": duration.map(|d| d.as_millis() as u64) })),
                );
            }
            BundlerEvent::BuildError(message) => {
                error!("[bundler] {}", message);
                self.sink
                    .emit_kind("bundler.error", Some(json!({ "error": message })));
            }
        }
    }

    async fn on_restart_ready(&mut self) {
        // A new bundle may have started after the waiter fired.
        let building = *self.bundle_status.borrow() == BundleStatus::Building;
        if building {
            debug!("Bundler busy again, deferring server restart");
            self.wait_for_bundle();
            return;
        }

        self.pending_restart = false;
        if let Err(e) = self.restart_server().await {
            error!(error = %e, "[server] failed to start");
            self.sink.emit_kind(
                "process.spawn_failed",
                Some(json!({ "role": ProcessRole::Server.tag(), "error": e.to_string() })),
            );
        }

        if std::mem::take(&mut self.restart_queued) {
            self.request_restart();
        }
    }

    /// At most one restart waits for the bundler and one more queues behind
    /// it. Further requests fold into the queued one.
    fn request_restart(&mut self) {
        if self.state != SupervisorState::Running {
            return;
        }
        if self.pending_restart {
            if self.restart_queued {
                debug!("Server restart already queued");
                self.sink.emit_kind("server.restart_coalesced", None);
            } else {
                self.restart_queued = true;
                self.sink.emit_kind("server.restart_queued", None);
            }
            return;
        }
        self.pending_restart = true;
        self.sink.emit_kind("server.restart_requested", None);
        self.wait_for_bundle();
    }

    fn wait_for_bundle(&self) {
        let mut status = self.bundle_status.subscribe();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            if status.wait_for(|s| *s != BundleStatus::Building).await.is_ok() {
                let _ = tx.send(SupervisorMessage::RestartReady);
            }
        });
    }

    fn spawn_process(&self, role: ProcessRole, command: &CommandSpec) -> Result<ManagedProcess> {
        let line_tx = self.tx.clone();
        let exit_tx = self.tx.clone();
        let process = ManagedProcess::spawn(
            role,
            command,
            self.launcher.as_ref(),
            move |line| {
                let _ = line_tx.send(SupervisorMessage::Line { role, line });
            },
            move |notice| {
                let _ = exit_tx.send(SupervisorMessage::Exited(notice));
            },
        )?;

        let pid = process.pid();
        info!(command = %command, "[{}] spawned process {}", role, pid.unwrap_or_default());
        self.sink.emit_kind(
            "process.spawned",
            Some(json!({ "role": role.tag(), "pid": pid, "command": process.command() })),
        );
        Ok(process)
    }

    fn emit_killed(&self, role: ProcessRole, notice: Option<&ExitNotice>) {
        self.sink.emit_kind(
            "process.killed",
            Some(json!({ "role": role.tag(), "pid": notice.and_then(|n| n.pid) })),
        );
    }

    fn transition(&mut self, next: SupervisorState) {
        if self.state.can_transition_to(next) {
            debug!(from = %self.state, to = %next, "Supervisor state change");
            self.state = next;
        } else {
            warn!(from = %self.state, to = %next, "Ignored invalid supervisor state change");
        }
    }
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("state", &self.state)
            .field("editor", &self.editor)
            .field("type_checker", &self.type_checker)
            .field("server", &self.server)
            .field("pending_restart", &self.pending_restart)
            .field("restart_queued", &self.restart_queued)
            .finish_non_exhaustive()
    }
}

fn echo(role: ProcessRole, line: &OutputLine) {
    println!("[{role}] {}", line.raw);
}
