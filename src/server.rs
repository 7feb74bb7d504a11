//! Foreground web server launch
//!
//! The server runs until it exits on its own, a shutdown signal arrives, or
//! the worker dies. In the last two cases the server is asked to stop
//! gracefully and given its graceful timeout (plus a margin) to do so;
//! after that it is killed so shutdown stays bounded.

use std::future::Future;
use std::process::ExitStatus;
use std::time::Duration;

use nix::sys::signal::Signal;

use crate::config::SupervisorConfig;
use crate::entrypoint::ServiceEntrypoint;
use crate::error::EXIT_WORKER_LOST;
use crate::process::{self, ManagedChild, ProcessSpec};
use crate::signals::ShutdownSignal;
use crate::worker::WorkerGuard;
use crate::Result;

/// Slack on top of the graceful timeout before the server is killed
const SHUTDOWN_MARGIN: Duration = Duration::from_secs(5);

/// How the server run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerOutcome {
    /// The server exited on its own
    Exited(ExitStatus),

    /// A shutdown signal ended the run; `status` is `None` if the server
    /// could not be reaped
    Interrupted {
        signal: ShutdownSignal,
        status: Option<ExitStatus>,
    },

    /// The worker died while the server was running
    WorkerLost {
        worker: Option<ExitStatus>,
        status: Option<ExitStatus>,
    },
}

impl ServerOutcome {
    /// Exit code the supervisor reports for this outcome
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Exited(status) => process::exit_code(status),
            Self::Interrupted { signal, .. } => signal.exit_code(),
            Self::WorkerLost { .. } => EXIT_WORKER_LOST,
        }
    }
}

/// Command line for the server runtime
pub fn server_spec(config: &SupervisorConfig, entrypoint: &ServiceEntrypoint) -> ProcessSpec {
    let timeout = config.timeout.as_secs().to_string();
    ProcessSpec {
        program: config.server_program.clone(),
        args: vec![
            "--chdir".to_string(),
            config.app_root.display().to_string(),
            "--bind".to_string(),
            config.bind_address(),
            "--workers".to_string(),
            config.web_concurrency.to_string(),
            "--threads".to_string(),
            config.threads.to_string(),
            "--timeout".to_string(),
            timeout.clone(),
            "--graceful-timeout".to_string(),
            timeout,
            entrypoint.reference(),
        ],
        current_dir: config.app_root.clone(),
        env: config.child_env(),
    }
}

/// Launch the server runtime in the foreground
pub fn start_server(
    config: &SupervisorConfig,
    entrypoint: &ServiceEntrypoint,
) -> Result<ManagedChild> {
    tracing::info!(
        "Starting server (module={}, bind={}, workers={}, threads={}, timeout={}s)",
        entrypoint,
        config.bind_address(),
        config.web_concurrency,
        config.threads,
        config.timeout.as_secs()
    );

    let server = ManagedChild::spawn("server", &server_spec(config, entrypoint))?;
    tracing::info!("Server running with pid {:?}", server.pid());
    Ok(server)
}

/// Block until the server exits, `shutdown` resolves, or the worker dies
pub async fn run_server<F>(
    config: &SupervisorConfig,
    server: &mut ManagedChild,
    worker: &mut WorkerGuard,
    shutdown: F,
) -> Result<ServerOutcome>
where
    F: Future<Output = ShutdownSignal>,
{
    tracing::info!("Waiting for server to exit");

    tokio::select! {
        status = server.wait() => {
            let status = status?;
            tracing::info!("Server exited with status: {}", status);
            Ok(ServerOutcome::Exited(status))
        }
        signal = shutdown => {
            tracing::info!("Received {}, asking server to stop", signal);
            let status = stop_server(config, server, signal.as_signal()).await;
            Ok(ServerOutcome::Interrupted { signal, status })
        }
        worker_status = worker.wait() => {
            let worker_status = match worker_status {
                Ok(status) => {
                    tracing::error!("Worker exited unexpectedly with status: {}", status);
                    Some(status)
                }
                Err(e) => {
                    tracing::error!("Lost track of worker: {}", e);
                    None
                }
            };
            let status = stop_server(config, server, Signal::SIGTERM).await;
            Ok(ServerOutcome::WorkerLost { worker: worker_status, status })
        }
    }
}

/// Ask the server to stop with `sig`, killing it once the grace period runs out
async fn stop_server(
    config: &SupervisorConfig,
    server: &mut ManagedChild,
    sig: Signal,
) -> Option<ExitStatus> {
    if let Err(e) = server.signal(sig) {
        tracing::warn!("{}", e);
    }

    let grace = config.timeout + SHUTDOWN_MARGIN;
    match tokio::time::timeout(grace, server.wait()).await {
        Ok(Ok(status)) => {
            tracing::info!("Server stopped with status: {}", status);
            Some(status)
        }
        Ok(Err(e)) => {
            tracing::warn!("Failed to wait for server: {}", e);
            None
        }
        Err(_) => {
            tracing::warn!("Server still running after {:?}, killing it", grace);
            match server.kill().await {
                Ok(status) => status,
                Err(e) => {
                    tracing::warn!("Failed to kill server: {}", e);
                    None
                }
            }
        }
    }
}
