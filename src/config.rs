//! Supervisor configuration
//!
//! Resolved once at startup from the environment, optionally layered over a
//! TOML file, and read-only afterwards. Resolution never fails: anything
//! missing or unparseable falls back to its default.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

pub const ENV_QUEUE_NAME: &str = "RQ_QUEUE_NAME";
pub const ENV_REDIS_URL: &str = "REDIS_URL";
pub const ENV_PORT: &str = "PORT";
pub const ENV_WEB_CONCURRENCY: &str = "WEB_CONCURRENCY";
pub const ENV_THREADS: &str = "GUNICORN_THREADS";
pub const ENV_TIMEOUT: &str = "GUNICORN_TIMEOUT";
pub const ENV_OUTPUT_DIR: &str = "OUTPUT_DIR";
pub const ENV_JOB_TIMEOUT: &str = "RQ_DEFAULT_TIMEOUT";
pub const ENV_APP_MODULE: &str = "APP_MODULE";
pub const ENV_APP_ROOT: &str = "APP_ROOT";
pub const ENV_WORKER_PROGRAM: &str = "RQ_BIN";
pub const ENV_SERVER_PROGRAM: &str = "GUNICORN_BIN";
pub const ENV_WORKER_STOP_TIMEOUT: &str = "WORKER_STOP_TIMEOUT";
pub const ENV_WORKER_SETTLE: &str = "WORKER_SETTLE_MS";
pub const ENV_CONFIG_FILE: &str = "CCA_SUPERVISOR_CONFIG";

pub const DEFAULT_QUEUE_NAME: &str = "constant_comparative_analysis";
pub const DEFAULT_REDIS_URL: &str = "redis://localhost:6379/0";
pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_WEB_CONCURRENCY: u32 = 2;
pub const DEFAULT_THREADS: u32 = 4;
/// Analysis runs are long; requests that poll them must not be cut short.
pub const DEFAULT_TIMEOUT_SECS: u64 = 3600;
pub const DEFAULT_JOB_TIMEOUT_SECS: u64 = 900;
pub const DEFAULT_OUTPUT_DIR_NAME: &str = "generated";
pub const DEFAULT_APP_MODULE: &str = "app:app";
pub const DEFAULT_WORKER_PROGRAM: &str = "rq";
pub const DEFAULT_SERVER_PROGRAM: &str = "gunicorn";
pub const DEFAULT_WORKER_STOP_TIMEOUT_SECS: u64 = 10;
/// `rq worker` exits within this window when the broker is unreachable.
pub const DEFAULT_WORKER_SETTLE_MS: u64 = 1000;

/// Immutable supervisor configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorConfig {
    /// Queue consumed by the worker and fed by the server
    pub queue_name: String,

    /// Broker connection string
    pub redis_url: String,

    /// Port the server binds on all interfaces
    pub port: u16,

    /// Number of server worker processes
    pub web_concurrency: u32,

    /// Threads per server worker process
    pub threads: u32,

    /// Request timeout, also used as the graceful shutdown timeout
    pub timeout: Duration,

    /// Artifact directory shared by worker and server
    pub output_dir: PathBuf,

    /// Job timeout handed to the queue client in both children
    pub job_timeout: Duration,

    /// Service entrypoint reference (`module:attribute`)
    pub app_module: String,

    /// Directory the application is importable from
    pub app_root: PathBuf,

    /// Worker executable name or path
    pub worker_program: String,

    /// Server executable name or path
    pub server_program: String,

    /// Bounded wait for the worker after SIGTERM
    pub worker_stop_timeout: Duration,

    /// How long the worker must stay up after spawn to count as started
    pub worker_settle: Duration,
}

/// Optional file layer, keys mirror [`SupervisorConfig`] fields
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub queue_name: Option<String>,
    pub redis_url: Option<String>,
    pub port: Option<u16>,
    pub web_concurrency: Option<u32>,
    pub threads: Option<u32>,
    pub timeout_secs: Option<u64>,
    pub output_dir: Option<PathBuf>,
    pub job_timeout_secs: Option<u64>,
    pub app_module: Option<String>,
    pub app_root: Option<PathBuf>,
    pub worker_program: Option<String>,
    pub server_program: Option<String>,
    pub worker_stop_timeout_secs: Option<u64>,
    pub worker_settle_ms: Option<u64>,
}

impl FileConfig {
    /// Load the file layer, falling back to an empty layer on any failure
    pub fn load(path: &Path) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!("Supervisor config {:?} not readable ({}), using defaults", path, e);
                return Self::default();
            }
        };

        match toml::from_str(&content) {
            Ok(config) => {
                tracing::debug!("Loaded supervisor config from {:?}", path);
                config
            }
            Err(e) => {
                tracing::warn!("Failed to parse supervisor config {:?}: {}", path, e);
                Self::default()
            }
        }
    }
}

impl SupervisorConfig {
    /// Resolve configuration from the process environment
    pub fn resolve() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        // Shell `${VAR:-default}` semantics: empty counts as unset.
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let file = var(ENV_CONFIG_FILE)
            .map(|path| FileConfig::load(Path::new(&path)))
            .unwrap_or_default();

        let app_root = var(ENV_APP_ROOT)
            .map(PathBuf::from)
            .or(file.app_root)
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

        let output_dir = var(ENV_OUTPUT_DIR)
            .map(PathBuf::from)
            .or(file.output_dir)
            .map(|dir| if dir.is_relative() { app_root.join(dir) } else { dir })
            .unwrap_or_else(|| app_root.join(DEFAULT_OUTPUT_DIR_NAME));

        Self {
            queue_name: var(ENV_QUEUE_NAME)
                .or(file.queue_name)
                .unwrap_or_else(|| DEFAULT_QUEUE_NAME.to_string()),
            redis_url: var(ENV_REDIS_URL)
                .or(file.redis_url)
                .unwrap_or_else(|| DEFAULT_REDIS_URL.to_string()),
            port: numeric(&var, ENV_PORT, file.port, DEFAULT_PORT, 1),
            web_concurrency: numeric(
                &var,
                ENV_WEB_CONCURRENCY,
                file.web_concurrency,
                DEFAULT_WEB_CONCURRENCY,
                1,
            ),
            threads: numeric(&var, ENV_THREADS, file.threads, DEFAULT_THREADS, 1),
            timeout: Duration::from_secs(numeric(
                &var,
                ENV_TIMEOUT,
                file.timeout_secs,
                DEFAULT_TIMEOUT_SECS,
                1,
            )),
            output_dir,
            job_timeout: Duration::from_secs(numeric(
                &var,
                ENV_JOB_TIMEOUT,
                file.job_timeout_secs,
                DEFAULT_JOB_TIMEOUT_SECS,
                1,
            )),
            app_module: var(ENV_APP_MODULE)
                .or(file.app_module)
                .unwrap_or_else(|| DEFAULT_APP_MODULE.to_string()),
            app_root,
            worker_program: var(ENV_WORKER_PROGRAM)
                .or(file.worker_program)
                .unwrap_or_else(|| DEFAULT_WORKER_PROGRAM.to_string()),
            server_program: var(ENV_SERVER_PROGRAM)
                .or(file.server_program)
                .unwrap_or_else(|| DEFAULT_SERVER_PROGRAM.to_string()),
            worker_stop_timeout: Duration::from_secs(numeric(
                &var,
                ENV_WORKER_STOP_TIMEOUT,
                file.worker_stop_timeout_secs,
                DEFAULT_WORKER_STOP_TIMEOUT_SECS,
                0,
            )),
            worker_settle: Duration::from_millis(numeric(
                &var,
                ENV_WORKER_SETTLE,
                file.worker_settle_ms,
                DEFAULT_WORKER_SETTLE_MS,
                0,
            )),
        }
    }

    /// Address the server binds to
    pub fn bind_address(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }

    /// Variables exported to both children so they agree on queue and directory
    pub fn child_env(&self) -> Vec<(&'static str, String)> {
        vec![
            (ENV_QUEUE_NAME, self.queue_name.clone()),
            (ENV_REDIS_URL, self.redis_url.clone()),
            (ENV_JOB_TIMEOUT, self.job_timeout.as_secs().to_string()),
            (ENV_OUTPUT_DIR, self.output_dir.display().to_string()),
        ]
    }
}

/// Parse a numeric setting: env beats file beats default, values below `min` are rejected
fn numeric<T, F>(var: &F, key: &str, file_value: Option<T>, default: T, min: T) -> T
where
    T: FromStr + PartialOrd + Copy + std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    let candidate = match var(key) {
        Some(raw) => match raw.trim().parse::<T>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring {}={:?}: not a valid number, using {}", key, raw, default);
                None
            }
        },
        None => file_value,
    };

    match candidate {
        Some(value) if value < min => {
            tracing::warn!("Ignoring {}={}: must be at least {}, using {}", key, value, min, default);
            default
        }
        Some(value) => value,
        None => default,
    }
}
