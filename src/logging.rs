//! Diagnostic logging setup
//!
//! All output goes to stderr so orchestrators can tell supervisor
//! diagnostics apart from the children's own output.

use tracing_subscriber::EnvFilter;

/// Directive applied when `RUST_LOG` is unset or invalid
pub const DEFAULT_DIRECTIVE: &str = "cca_supervisor=info";

/// Filter from `RUST_LOG`, falling back to [`DEFAULT_DIRECTIVE`]
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))
}

/// Install the global subscriber
pub fn init() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(env_filter())
        .init();
}
