//! Termination signal forwarding.

use super::SupervisorHandle;
use crate::errors::Result;
use std::fmt;
use tokio::task::JoinHandle;
use tracing::info;

/// A termination signal delivered to the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// SIGINT or Ctrl-C.
    Interrupt,
    /// SIGTERM.
    Terminate,
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interrupt => write!(f, "SIGINT"),
            Self::Terminate => write!(f, "SIGTERM"),
        }
    }
}

/// Forwards SIGINT and SIGTERM to the supervisor until it goes away.
#[cfg(unix)]
pub fn forward_signals(handle: SupervisorHandle) -> Result<JoinHandle<()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt()).map_err(install_failed)?;
    let mut sigterm = signal(SignalKind::terminate()).map_err(install_failed)?;

    Ok(tokio::spawn(async move {
        loop {
            let received = tokio::select! {
                Some(()) = sigint.recv() => ShutdownSignal::Interrupt,
                Some(()) = sigterm.recv() => ShutdownSignal::Terminate,
                else => break,
            };
            info!(signal = %received, "Received signal");
            if !handle.signal(received) {
                break;
            }
        }
    }))
}

#[cfg(unix)]
fn install_failed(e: std::io::Error) -> crate::errors::BuildError {
    crate::errors::BuildError::Watch(format!("failed to install signal handler: {e}"))
}

/// Forwards Ctrl-C to the supervisor until it goes away.
#[cfg(not(unix))]
pub fn forward_signals(handle: SupervisorHandle) -> Result<JoinHandle<()>> {
    Ok(tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            info!(signal = %ShutdownSignal::Interrupt, "Received signal");
            if !handle.signal(ShutdownSignal::Interrupt) {
                break;
            }
        }
    }))
}
