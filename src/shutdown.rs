//! Process signal handling.
//!
//! The main task parks on `ShutdownController::wait` while the host serves
//! streams. SIGPIPE is ignored so a peer vanishing mid-write shows up as an
//! ordinary write error on that stream instead of killing the process.

use std::fmt;
use std::io;
use tracing::info;

/// Signal that ended the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// SIGINT / Ctrl-C
    Interrupt,
    /// SIGTERM
    Terminate,
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownReason::Interrupt => write!(f, "interrupt"),
            ShutdownReason::Terminate => write!(f, "terminated"),
        }
    }
}

/// Ignore SIGPIPE for the whole process.
#[cfg(unix)]
pub fn ignore_sigpipe() {
    // SAFETY: installing SIG_IGN has no handler code to race with.
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_IGN);
    }
}

#[cfg(not(unix))]
pub fn ignore_sigpipe() {}

/// Waits for the first termination signal.
///
/// Handlers are registered in `install`, so signals that arrive before
/// `wait` is polled are not lost.
pub struct ShutdownController {
    #[cfg(unix)]
    interrupt: tokio::signal::unix::Signal,
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
}

impl ShutdownController {
    /// Register interest in SIGINT and SIGTERM. Must be called inside a
    /// tokio runtime.
    #[cfg(unix)]
    pub fn install() -> io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    #[cfg(not(unix))]
    pub fn install() -> io::Result<Self> {
        Ok(Self {})
    }

    /// Block until a termination signal arrives.
    #[cfg(unix)]
    pub async fn wait(mut self) -> ShutdownReason {
        let reason = tokio::select! {
            _ = self.interrupt.recv() => ShutdownReason::Interrupt,
            _ = self.terminate.recv() => ShutdownReason::Terminate,
        };
        info!(%reason, "Received shutdown signal");
        reason
    }

    #[cfg(not(unix))]
    pub async fn wait(self) -> ShutdownReason {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        }
        let reason = ShutdownReason::Interrupt;
        info!(%reason, "Received shutdown signal");
        reason
    }
}
