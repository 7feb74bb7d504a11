//! Supervisor orchestration
//!
//! Drives one run through its states:
//!
//! ```text
//! Initializing -> Preparing -> WorkerStarting -> ServerRunning -> ShuttingDown -> Terminated
//!                     |               |
//!                     +---------------+--> (startup failure) --> Terminated
//! ```
//!
//! The output directory and entrypoint are settled before anything is
//! spawned. The worker must be up before the server is launched, and it is
//! stopped only after the server has ended. A worker that dies mid-run
//! takes the server down with it.

use std::fmt;
use std::future::Future;

use crate::config::SupervisorConfig;
use crate::entrypoint::{locate_service_entrypoint, ServiceEntrypoint};
use crate::output::ensure_output_directory;
use crate::server::{run_server, start_server};
use crate::signals::ShutdownSignal;
use crate::worker::start_worker;
use crate::{Error, Result};

/// Lifecycle state of a supervisor run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Initializing,
    Preparing,
    WorkerStarting,
    ServerRunning,
    ShuttingDown,
    Terminated,
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Initializing => "initializing",
            Self::Preparing => "preparing",
            Self::WorkerStarting => "worker-starting",
            Self::ServerRunning => "server-running",
            Self::ShuttingDown => "shutting-down",
            Self::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// Summary of a finished run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Status the supervisor process should exit with
    pub exit_code: i32,

    /// Every state the run passed through, in order
    pub states: Vec<SupervisorState>,

    /// Children in launch order, as (role, pid)
    pub launches: Vec<(&'static str, Option<u32>)>,
}

impl RunReport {
    /// Pid of the worker, if one was launched
    pub fn worker_pid(&self) -> Option<u32> {
        self.launches
            .iter()
            .find(|(role, _)| *role == "worker")
            .and_then(|(_, pid)| *pid)
    }
}

/// Supervises the worker/server pair
pub struct Supervisor {
    config: SupervisorConfig,
    state: SupervisorState,
    states: Vec<SupervisorState>,
    launches: Vec<(&'static str, Option<u32>)>,
}

impl Supervisor {
    pub fn new(config: SupervisorConfig) -> Self {
        Self {
            config,
            state: SupervisorState::Initializing,
            states: vec![SupervisorState::Initializing],
            launches: Vec::new(),
        }
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    fn transition(&mut self, next: SupervisorState) {
        tracing::debug!("Supervisor {} -> {}", self.state, next);
        self.state = next;
        self.states.push(next);
    }

    /// Output directory and entrypoint, both required before any launch
    fn prepare(&self) -> Result<ServiceEntrypoint> {
        let output_dir = ensure_output_directory(&self.config.output_dir)?;
        tracing::info!("Output directory: {}", output_dir.display());

        let entrypoint = locate_service_entrypoint(&self.config)?;
        tracing::info!("Service entrypoint: {} ({})", entrypoint, entrypoint.source.display());

        Ok(entrypoint)
    }

    fn finish(mut self, exit_code: i32) -> RunReport {
        self.transition(SupervisorState::Terminated);
        tracing::info!("Supervisor exiting with status {}", exit_code);
        RunReport {
            exit_code,
            states: self.states,
            launches: self.launches,
        }
    }

    fn abort(self, error: Error) -> RunReport {
        tracing::error!("Startup failed: {}", error);
        let code = error.exit_code();
        self.finish(code)
    }

    /// Run until the server ends or `shutdown` resolves
    pub async fn run<F>(mut self, shutdown: F) -> RunReport
    where
        F: Future<Output = ShutdownSignal>,
    {
        self.transition(SupervisorState::Preparing);
        let entrypoint = match self.prepare() {
            Ok(entrypoint) => entrypoint,
            Err(e) => return self.abort(e),
        };

        self.transition(SupervisorState::WorkerStarting);
        let mut worker = match start_worker(&self.config).await {
            Ok(worker) => worker,
            Err(e) => {
                self.transition(SupervisorState::ShuttingDown);
                return self.abort(e);
            }
        };
        self.launches.push(("worker", worker.pid()));

        let mut server = match start_server(&self.config, &entrypoint) {
            Ok(server) => server,
            Err(e) => {
                self.transition(SupervisorState::ShuttingDown);
                worker.shutdown().await;
                return self.abort(e);
            }
        };
        self.launches.push(("server", server.pid()));
        self.transition(SupervisorState::ServerRunning);

        let outcome = run_server(&self.config, &mut server, &mut worker, shutdown).await;

        self.transition(SupervisorState::ShuttingDown);
        worker.shutdown().await;

        match outcome {
            Ok(outcome) => self.finish(outcome.exit_code()),
            Err(e) => self.abort(e),
        }
    }
}
