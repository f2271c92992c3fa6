//! Headless cadence daemon.
//!
//! Loads configuration, initialises logging, opens the prompt store, and
//! runs the scheduler loop until interrupted. A presentation layer talks
//! to the same store through the service handle; this binary is the
//! always-on dispatch side.

use cadence::{CadenceConfig, CadenceService};
use std::path::PathBuf;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config()?;
    let _log_guard = init_logging(&config);

    preflight_agent(&config);

    let service = Arc::new(
        CadenceService::from_config(&config)
            .map_err(|e| anyhow::anyhow!("cannot start cadence: {e}"))?,
    );
    tracing::info!(
        store = %config.store.path.display(),
        tick_secs = config.scheduler.tick_interval_secs,
        "cadence daemon starting"
    );

    let loop_handle = service.spawn_loop();

    tokio::signal::ctrl_c().await?;
    tracing::info!("interrupt received, shutting down");
    loop_handle.abort();
    Ok(())
}

/// Resolve the config path (first CLI argument or the platform default)
/// and load it.
fn load_config() -> anyhow::Result<CadenceConfig> {
    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .or_else(CadenceConfig::default_path);

    match path {
        Some(path) => {
            CadenceConfig::load(&path).map_err(|e| anyhow::anyhow!("cannot load config: {e}"))
        }
        None => Ok(CadenceConfig::default()),
    }
}

/// Initialise tracing with the configured level, writing to the configured
/// log file when one is set and to stderr otherwise.
///
/// Returns the appender guard that must stay alive for the duration of the
/// process.
fn init_logging(config: &CadenceConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.logging.level.clone()));

    match &config.logging.file {
        Some(file) => {
            let dir = file.parent().unwrap_or_else(|| std::path::Path::new("."));
            let name = file.file_name().unwrap_or_else(|| "cadence.log".as_ref());
            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_writer(writer)
                .with_ansi(false)
                .with_env_filter(filter)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt()
                .with_writer(std::io::stderr)
                .with_env_filter(filter)
                .init();
            None
        }
    }
}

/// Warn early when the agent binary cannot be found. Dispatch handles the
/// failure per-run either way, so this is advisory only.
fn preflight_agent(config: &CadenceConfig) {
    let binary = &config.agent.binary;
    if which::which(binary).is_err() && !binary.exists() {
        tracing::warn!(
            binary = %binary.display(),
            "agent binary not found on PATH; scheduled dispatches will fail until it is installed"
        );
    }
}
