//! Queue worker launch and scoped cleanup

use std::process::ExitStatus;
use std::time::Duration;

use crate::config::SupervisorConfig;
use crate::process::{ManagedChild, ProcessSpec};
use crate::{Error, Result};

/// Command line for the queue worker
pub fn worker_spec(config: &SupervisorConfig) -> ProcessSpec {
    ProcessSpec {
        program: config.worker_program.clone(),
        args: vec![
            "worker".to_string(),
            "--url".to_string(),
            config.redis_url.clone(),
            "--path".to_string(),
            config.app_root.display().to_string(),
            config.queue_name.clone(),
        ],
        current_dir: config.app_root.clone(),
        env: config.child_env(),
    }
}

/// Launch the queue worker in the background.
///
/// The worker must survive the configured settle interval; `rq worker`
/// exits straight away when the broker is unreachable, and that counts as
/// a failed launch.
pub async fn start_worker(config: &SupervisorConfig) -> Result<WorkerGuard> {
    tracing::info!(
        "Starting worker (queue={}, broker={})",
        config.queue_name,
        config.redis_url
    );

    let mut child = ManagedChild::spawn("worker", &worker_spec(config))?;

    if !config.worker_settle.is_zero() {
        if let Ok(status) = tokio::time::timeout(config.worker_settle, child.wait()).await {
            let status = match status {
                Ok(status) => status.to_string(),
                Err(e) => e.to_string(),
            };
            return Err(Error::ProcessLaunch(format!(
                "worker exited during startup ({})",
                status
            )));
        }
    }
    if !child.is_alive() {
        return Err(Error::ProcessLaunch(format!(
            "worker exited during startup ({:?})",
            child.exit_status()
        )));
    }

    tracing::info!("Worker started with pid {:?}", child.pid());

    Ok(WorkerGuard {
        child: Some(child),
        stop_timeout: config.worker_stop_timeout,
    })
}

/// Owns the worker for the lifetime of a run.
///
/// `shutdown` is the orderly path; dropping the guard without it still
/// kills the worker. Both are safe to reach more than once.
pub struct WorkerGuard {
    child: Option<ManagedChild>,
    stop_timeout: Duration,
}

impl WorkerGuard {
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().and_then(ManagedChild::pid)
    }

    /// Whether the worker process is still running
    pub fn is_alive(&mut self) -> bool {
        self.child.as_mut().is_some_and(ManagedChild::is_alive)
    }

    /// Resolve when the worker exits; never resolves once shut down
    pub async fn wait(&mut self) -> Result<ExitStatus> {
        match self.child.as_mut() {
            Some(child) => child.wait().await,
            None => std::future::pending().await,
        }
    }

    /// Stop the worker; later calls are no-ops.
    ///
    /// Failures are logged rather than returned so cleanup never blocks exit.
    pub async fn shutdown(&mut self) {
        let Some(mut child) = self.child.take() else {
            tracing::debug!("Worker already shut down");
            return;
        };

        if !child.is_alive() {
            tracing::warn!(
                "Worker had already exited ({:?})",
                child.exit_status()
            );
            return;
        }

        if let Err(e) = child.terminate(self.stop_timeout).await {
            tracing::warn!("Worker cleanup failed: {}", e);
        }
    }
}

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        // Synchronous context: kill_on_drop on the child sends SIGKILL and
        // tokio reaps it in the background.
        if let Some(child) = self.child.as_mut() {
            if child.is_alive() {
                tracing::warn!("Worker guard dropped without shutdown, killing worker");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        ENV_APP_ROOT, ENV_QUEUE_NAME, ENV_REDIS_URL, ENV_WORKER_PROGRAM, ENV_WORKER_SETTLE,
    };
    use crate::process::pid_exists;
    use std::collections::HashMap;
    use std::path::Path;

    fn config_with(vars: &[(&str, &str)]) -> SupervisorConfig {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        SupervisorConfig::from_lookup(|key| map.get(key).cloned())
    }

    fn fake_worker(dir: &Path, body: &str) -> String {
        let path = dir.join("fake-rq");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_str().unwrap().to_string()
    }

    #[test]
    fn test_worker_command_binds_queue_and_broker() {
        let config = config_with(&[
            (ENV_APP_ROOT, "/srv/app"),
            (ENV_QUEUE_NAME, "test_q"),
            (ENV_REDIS_URL, "redis://localhost:6379/0"),
        ]);
        let spec = worker_spec(&config);
        assert_eq!(spec.program, "rq");
        assert_eq!(
            spec.args,
            vec!["worker", "--url", "redis://localhost:6379/0", "--path", "/srv/app", "test_q"]
        );
        assert_eq!(spec.current_dir, Path::new("/srv/app"));
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let program = fake_worker(dir.path(), "exec sleep 60");
        let config = config_with(&[
            (ENV_APP_ROOT, dir.path().to_str().unwrap()),
            (ENV_WORKER_PROGRAM, program.as_str()),
            (ENV_WORKER_SETTLE, "200"),
        ]);

        let mut guard = start_worker(&config).await.unwrap();
        let pid = guard.pid().unwrap();
        assert!(guard.is_alive());

        guard.shutdown().await;
        assert!(!pid_exists(pid));
        assert!(!guard.is_alive());

        // Second call (e.g. from a signal path) must not touch the dead pid
        guard.shutdown().await;
        assert_eq!(guard.pid(), None);
    }

    #[tokio::test]
    async fn test_missing_worker_binary_fails_launch() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_with(&[
            (ENV_APP_ROOT, dir.path().to_str().unwrap()),
            (ENV_WORKER_PROGRAM, "./no-such-rq"),
        ]);

        let err = start_worker(&config).await.err().unwrap();
        assert!(matches!(err, Error::ProcessLaunch(_)));
    }

    #[tokio::test]
    async fn test_worker_exiting_during_settle_is_launch_error() {
        let dir = tempfile::tempdir().unwrap();
        let program = fake_worker(dir.path(), "echo 'cannot connect to redis' >&2\nexit 1");
        let config = config_with(&[
            (ENV_APP_ROOT, dir.path().to_str().unwrap()),
            (ENV_WORKER_PROGRAM, program.as_str()),
            (ENV_WORKER_SETTLE, "500"),
        ]);

        let err = start_worker(&config).await.err().unwrap();
        assert!(matches!(err, Error::ProcessLaunch(_)));
        assert!(err.to_string().contains("exited during startup"));
    }

    #[tokio::test]
    async fn test_wait_resolves_when_worker_dies() {
        let dir = tempfile::tempdir().unwrap();
        let program = fake_worker(dir.path(), "sleep 0.5\nexit 4");
        let config = config_with(&[
            (ENV_APP_ROOT, dir.path().to_str().unwrap()),
            (ENV_WORKER_PROGRAM, program.as_str()),
            (ENV_WORKER_SETTLE, "100"),
        ]);

        let mut guard = start_worker(&config).await.unwrap();
        let status = tokio::time::timeout(Duration::from_secs(5), guard.wait())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(status.code(), Some(4));

        // Already exited: shutdown has nothing to signal
        guard.shutdown().await;
        assert_eq!(guard.pid(), None);
    }
}
