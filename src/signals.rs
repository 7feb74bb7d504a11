//! External shutdown signals
//!
//! SIGINT and SIGTERM delivered to the supervisor end the run; they are a
//! shutdown trigger, not an error.

use std::fmt;

use nix::sys::signal::Signal;
use tokio::signal::unix::{signal, SignalKind};

use crate::Result;

/// Signal that asked the supervisor to stop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// SIGINT (Ctrl+C)
    Interrupt,
    /// SIGTERM (container stop)
    Terminate,
}

impl ShutdownSignal {
    /// The same signal, for forwarding to a child
    pub fn as_signal(self) -> Signal {
        match self {
            Self::Interrupt => Signal::SIGINT,
            Self::Terminate => Signal::SIGTERM,
        }
    }

    /// Shell convention: `128 + signal number`
    pub fn exit_code(self) -> i32 {
        128 + self.as_signal() as i32
    }
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_signal().as_str())
    }
}

/// Listens for SIGINT and SIGTERM.
///
/// Install it before any child is spawned: signals that arrive during startup
/// are buffered and observed once the server is running.
pub struct ShutdownListener {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
}

impl ShutdownListener {
    pub fn install() -> Result<Self> {
        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    /// Resolve with the first shutdown signal received
    pub async fn recv(mut self) -> ShutdownSignal {
        tokio::select! {
            _ = self.interrupt.recv() => ShutdownSignal::Interrupt,
            _ = self.terminate.recv() => ShutdownSignal::Terminate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_follow_shell_convention() {
        assert_eq!(ShutdownSignal::Interrupt.exit_code(), 130);
        assert_eq!(ShutdownSignal::Terminate.exit_code(), 143);
    }

    #[test]
    fn test_display_names_signal() {
        assert_eq!(ShutdownSignal::Terminate.to_string(), "SIGTERM");
    }

    #[tokio::test]
    async fn test_listener_observes_sigterm() {
        use std::time::Duration;

        // Installing first replaces the default action, so raising is safe
        let listener = ShutdownListener::install().unwrap();
        nix::sys::signal::raise(Signal::SIGTERM).unwrap();

        let received = tokio::time::timeout(Duration::from_secs(5), listener.recv())
            .await
            .unwrap();
        assert_eq!(received, ShutdownSignal::Terminate);
    }
}
