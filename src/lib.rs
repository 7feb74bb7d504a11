//! CCA Supervisor - runs the analysis queue worker next to the web server
//!
//! Launches the RQ worker in the background and Gunicorn in the foreground
//! from one container entry process, and makes sure the worker is stopped
//! whenever the server ends, including on SIGINT/SIGTERM.

pub mod config;
pub mod entrypoint;
pub mod logging;
pub mod output;
pub mod process;
pub mod server;
pub mod signals;
pub mod supervisor;
pub mod worker;

mod error;

pub use config::SupervisorConfig;
pub use error::{
    Error, Result, EXIT_CONFIGURATION, EXIT_FILESYSTEM, EXIT_PROCESS_LAUNCH, EXIT_WORKER_LOST,
};
pub use signals::{ShutdownListener, ShutdownSignal};
pub use supervisor::{RunReport, Supervisor, SupervisorState};
