use anyhow::{Context, Result};
use qbt_rate_limiter::api::plex::PlexClient;
use qbt_rate_limiter::api::qbittorrent::QbtClient;
use qbt_rate_limiter::core::config::{load_env_file, Config, LoggingConfig, DOTENV_FILE};
use qbt_rate_limiter::core::poller::Poller;
use qbt_rate_limiter::core::tracing_init::init_tracing;
use std::path::Path;
use tracing::{debug, error, info, warn};

fn main() -> Result<()> {
    // Reported once logging is up
    let env_file = load_env_file(Path::new(DOTENV_FILE));

    let logging = LoggingConfig::from_env().context("Invalid logging configuration")?;

    // Initialize tracing/logging; the guard flushes the log file on exit
    let _guard = init_tracing(&logging)?;

    match env_file {
        Ok(true) => info!(path = DOTENV_FILE, "Loaded environment file"),
        Ok(false) => debug!(path = DOTENV_FILE, "No environment file found"),
        Err(e) => warn!(error = %e, "Ignoring environment file"),
    }

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Failed to load configuration");
            return Err(e);
        }
    };

    // One thread is all the loop needs
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build Tokio runtime")?;

    runtime.block_on(async_main(config, logging))
}

async fn async_main(config: Config, logging: LoggingConfig) -> Result<()> {
    let plex = PlexClient::new(&config.plex.url, config.plex.token.clone())
        .context("Failed to create Plex client")?;

    let qbittorrent = QbtClient::new(
        &config.qbittorrent.host,
        config.qbittorrent.username.clone(),
        config.qbittorrent.password.clone(),
    )
    .context("Failed to create qBittorrent client")?;

    info!(
        plex_endpoint = %plex.endpoint(),
        qbittorrent = %qbittorrent.base_url(),
        upload_limit = %config.limits.upload,
        download_limit = %config.limits.download,
        log_file = %logging.file.display(),
        "qBittorrent rate limiter starting"
    );

    let poller = Poller::new(plex, qbittorrent, config.limits.caps());
    info!(
        poll_interval_seconds = poller.interval().as_secs(),
        "Polling Plex for active sessions"
    );

    poller.run().await;

    Ok(())
}
