//! Error types for the CCA supervisor

use std::path::PathBuf;

use thiserror::Error;

/// Exit code for a service entrypoint that cannot be resolved (sysexits `EX_CONFIG`).
pub const EXIT_CONFIGURATION: i32 = 78;

/// Exit code for an output directory that cannot be created or written (`EX_CANTCREAT`).
pub const EXIT_FILESYSTEM: i32 = 73;

/// Exit code for a worker or server process that failed to start (`EX_OSERR`).
pub const EXIT_PROCESS_LAUNCH: i32 = 71;

/// Exit code when the worker dies while the server is running (`EX_SOFTWARE`).
pub const EXIT_WORKER_LOST: i32 = 70;

/// Supervisor-wide error type
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Filesystem error at {}: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Process launch error: {0}")]
    ProcessLaunch(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Build a filesystem error for `path`
    pub fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Filesystem {
            path: path.into(),
            source,
        }
    }

    /// Exit status used when this error aborts startup.
    ///
    /// Each fatal class has its own code so an orchestrator can tell a bad
    /// deployment apart from a server that ran and failed.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration(_) => EXIT_CONFIGURATION,
            Self::Filesystem { .. } => EXIT_FILESYSTEM,
            Self::ProcessLaunch(_) | Self::Io(_) => EXIT_PROCESS_LAUNCH,
        }
    }
}

/// Result type alias for this crate
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_are_distinct_and_nonzero() {
        let codes = [
            Error::Configuration("entrypoint not found".into()).exit_code(),
            Error::filesystem("/x", std::io::Error::other("denied")).exit_code(),
            Error::ProcessLaunch("missing".into()).exit_code(),
            EXIT_WORKER_LOST,
        ];
        assert!(codes.iter().all(|c| *c != 0));
        for (i, a) in codes.iter().enumerate() {
            assert!(codes[i + 1..].iter().all(|b| a != b));
        }
    }

    #[test]
    fn test_filesystem_error_mentions_path() {
        let err = Error::filesystem(
            "/srv/generated",
            std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        );
        assert!(err.to_string().contains("/srv/generated"));
    }
}
