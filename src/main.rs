use cca_supervisor::{logging, ShutdownListener, Supervisor, SupervisorConfig};

#[tokio::main]
async fn main() {
    logging::init();

    let config = SupervisorConfig::resolve();
    tracing::info!("Starting CCA supervisor {}", env!("CARGO_PKG_VERSION"));
    tracing::debug!("Resolved configuration: {:?}", config);

    let listener = match ShutdownListener::install() {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to install signal handlers: {}", e);
            std::process::exit(e.exit_code());
        }
    };

    let report = Supervisor::new(config).run(listener.recv()).await;
    std::process::exit(report.exit_code);
}
