//! Child process handles
//!
//! Spawns and tracks the worker and server subprocesses, handling liveness
//! checks, signal delivery and bounded termination.

use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::process::Child;

use crate::{Error, Result};

/// Everything needed to launch one child
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    /// Executable name or path, resolved at spawn time
    pub program: String,

    /// Arguments after the program
    pub args: Vec<String>,

    /// Working directory of the child
    pub current_dir: PathBuf,

    /// Variables added to the inherited environment
    pub env: Vec<(&'static str, String)>,
}

/// Handle to a supervised subprocess
pub struct ManagedChild {
    /// Label used in diagnostics ("worker", "server")
    role: &'static str,

    /// The child process
    child: Child,

    /// Pid captured at spawn; tokio forgets it once the child is reaped
    pid: Option<u32>,

    /// Exit status once reaped
    status: Option<ExitStatus>,
}

impl ManagedChild {
    /// Spawn a child described by `spec`
    pub fn spawn(role: &'static str, spec: &ProcessSpec) -> Result<Self> {
        let program = resolve_program(&spec.program, &spec.current_dir)?;

        tracing::debug!("Spawning {} from {:?} with args {:?}", role, program, spec.args);

        let child = tokio::process::Command::new(&program)
            .args(&spec.args)
            .current_dir(&spec.current_dir)
            .envs(spec.env.iter().map(|(k, v)| (*k, v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                Error::ProcessLaunch(format!("Failed to spawn {} ({:?}): {}", role, program, e))
            })?;

        let pid = child.id();
        tracing::debug!("{} running with pid {:?}", role, pid);

        Ok(Self {
            role,
            child,
            pid,
            status: None,
        })
    }

    pub fn role(&self) -> &'static str {
        self.role
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Exit status, if the child has been reaped
    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.status
    }

    /// Check if the process is still running (non-blocking, reaps on exit)
    pub fn is_alive(&mut self) -> bool {
        if self.status.is_some() {
            return false;
        }
        match self.child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                self.status = Some(status);
                false
            }
            Err(e) => {
                tracing::warn!("Failed to poll {} status: {}", self.role, e);
                false
            }
        }
    }

    /// Wait for the process to exit
    pub async fn wait(&mut self) -> Result<ExitStatus> {
        if let Some(status) = self.status {
            return Ok(status);
        }
        let status = self.child.wait().await?;
        self.status = Some(status);
        Ok(status)
    }

    /// Deliver `sig` if the process is still running
    pub fn signal(&mut self, sig: Signal) -> Result<()> {
        if !self.is_alive() {
            return Ok(());
        }
        let Some(pid) = self.pid else {
            return Ok(());
        };
        signal::kill(Pid::from_raw(pid as i32), sig).map_err(|e| {
            Error::Io(std::io::Error::other(format!(
                "Failed to send {:?} to {} (pid {}): {}",
                sig, self.role, pid, e
            )))
        })
    }

    /// Stop the process: SIGTERM, bounded wait, then SIGKILL.
    ///
    /// Calling this on an already reaped handle returns the recorded status
    /// without signalling anything.
    pub async fn terminate(&mut self, timeout: Duration) -> Result<Option<ExitStatus>> {
        if !self.is_alive() {
            return Ok(self.status);
        }

        tracing::info!("Stopping {} (pid {:?})", self.role, self.pid);
        if let Err(e) = self.signal(Signal::SIGTERM) {
            tracing::warn!("{}", e);
        }

        match tokio::time::timeout(timeout, self.child.wait()).await {
            Ok(status) => {
                let status = status?;
                tracing::info!("{} exited with status: {}", self.role, status);
                self.status = Some(status);
            }
            Err(_) => {
                tracing::warn!("{} did not exit within {:?}, killing...", self.role, timeout);
                self.kill().await?;
            }
        }

        Ok(self.status)
    }

    /// SIGKILL the process and reap it; no-op once reaped
    pub async fn kill(&mut self) -> Result<Option<ExitStatus>> {
        if !self.is_alive() {
            return Ok(self.status);
        }
        self.child.kill().await?;
        let status = self.child.wait().await?;
        tracing::info!("{} killed ({})", self.role, status);
        self.status = Some(status);
        Ok(self.status)
    }
}

/// Map an exit status to a shell-style exit code (`128 + signal` when signalled)
pub fn exit_code(status: &ExitStatus) -> i32 {
    match (status.code(), status.signal()) {
        (Some(code), _) => code,
        (None, Some(sig)) => 128 + sig,
        (None, None) => 1,
    }
}

/// Find an executable in PATH or common locations
fn resolve_program(program: &str, app_root: &Path) -> Result<PathBuf> {
    if program.contains('/') {
        let path = PathBuf::from(program);
        let path = if path.is_relative() { app_root.join(path) } else { path };
        return if path.is_file() {
            Ok(path)
        } else {
            Err(Error::ProcessLaunch(format!("{:?} does not exist", path)))
        };
    }

    if let Ok(path) = which::which(program) {
        return Ok(path);
    }

    // Virtualenvs next to the app, then user-level installs
    let mut candidates = vec![
        app_root.join(".venv/bin").join(program),
        app_root.join("venv/bin").join(program),
    ];
    if let Some(home) = dirs::home_dir() {
        candidates.push(home.join(".local/bin").join(program));
    }
    candidates.push(PathBuf::from("/usr/local/bin").join(program));

    candidates
        .into_iter()
        .find(|path| path.is_file())
        .ok_or_else(|| {
            Error::ProcessLaunch(format!("'{}' not found in PATH or common locations", program))
        })
}

#[cfg(test)]
pub(crate) fn pid_exists(pid: u32) -> bool {
    signal::kill(Pid::from_raw(pid as i32), None).is_ok()
}
