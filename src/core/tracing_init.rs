use anyhow::{Context, Result};
use std::path::Path;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::core::config::LoggingConfig;

/// Install the process-wide subscriber.
///
/// Two sinks: the log file receives this crate's debug events and everyone
/// else's info events, the console (stderr) receives whatever `RUST_LOG` or
/// the configured level lets through. The returned guard flushes the file
/// writer and must be held for as long as the process logs.
pub fn init_tracing(config: &LoggingConfig) -> Result<WorkerGuard> {
    let file_name = config
        .file
        .file_name()
        .context("Log file path must name a file")?;
    let directory = match config.file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    std::fs::create_dir_all(directory)
        .with_context(|| format!("Failed to create log directory: {}", directory.display()))?;

    let appender = tracing_appender::rolling::never(directory, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let file_layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .with_filter(
            Targets::new()
                .with_target(env!("CARGO_CRATE_NAME"), Level::DEBUG)
                .with_default(LevelFilter::INFO),
        );

    let use_json = config.format == "json";

    let console_json = use_json.then(|| {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_current_span(true)
            .with_filter(console_filter(config))
    });

    // Pretty console output for interactive runs
    let console_text = (!use_json).then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_level(true)
            .with_filter(console_filter(config))
    });

    tracing_subscriber::registry()
        .with(file_layer)
        .with(console_json)
        .with(console_text)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}

fn console_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tracing::{debug, info, trace};

    #[test]
    fn test_file_sink_keeps_debug_events() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("logs").join("limiter.log");
        let config = LoggingConfig {
            file: path.clone(),
            level: "info".to_string(),
            format: "console".to_string(),
        };

        let guard = init_tracing(&config).unwrap();
        info!(user = "alice", "Someone is streaming from Plex!");
        debug!("qBittorrent limit applied");
        trace!("too chatty for the file");
        drop(guard);

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("INFO"));
        assert!(contents.contains("Someone is streaming from Plex!"));
        assert!(contents.contains("user=\"alice\""));
        assert!(contents.contains("DEBUG"));
        assert!(contents.contains("qBittorrent limit applied"));
        assert!(!contents.contains("too chatty"));
        assert!(!contents.contains('\u{1b}'), "file sink must not contain ANSI escapes");

        // Only one global subscriber per process
        assert!(init_tracing(&config).is_err());
    }
}
