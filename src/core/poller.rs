use std::time::Duration;
use tracing::{debug, error, info};

use crate::core::error::{PlexError, QbtError};
use crate::models::policy::{BandwidthPolicy, SpeedLimit};
use crate::models::session::SessionSnapshot;

/// Wait between two polls of the media server
pub const POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Source of the active playback sessions
#[allow(async_fn_in_trait)]
pub trait SessionSource {
    async fn fetch_sessions(&self) -> Result<SessionSnapshot, PlexError>;
}

/// Sink for the global transfer limits
#[allow(async_fn_in_trait)]
pub trait SpeedLimiter {
    async fn set_upload_limit(&mut self, limit: SpeedLimit) -> Result<(), QbtError>;
    async fn set_download_limit(&mut self, limit: SpeedLimit) -> Result<(), QbtError>;
}

/// What a single poll did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationOutcome {
    /// Sessions could not be fetched, limits were left untouched
    Skipped,
    /// Policy was pushed; `failures` counts the setters that failed
    Applied {
        policy: BandwidthPolicy,
        failures: usize,
    },
}

/// Poll-and-apply loop
///
/// Every iteration fetches the sessions, picks the policy and pushes both
/// limits to the torrent client, even when they did not change.
pub struct Poller<S, L> {
    source: S,
    limiter: L,
    caps: BandwidthPolicy,
    interval: Duration,
}

impl<S: SessionSource, L: SpeedLimiter> Poller<S, L> {
    /// `caps` is the policy applied while someone is streaming
    pub fn new(source: S, limiter: L, caps: BandwidthPolicy) -> Self {
        Self {
            source,
            limiter,
            caps,
            interval: POLL_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn limiter(&self) -> &L {
        &self.limiter
    }

    /// Poll forever. Never returns; the process is stopped from outside.
    pub async fn run(mut self) {
        loop {
            let outcome = self.run_once().await;
            debug!(?outcome, sleep_seconds = self.interval.as_secs(), "Poll finished");

            tokio::time::sleep(self.interval).await;
        }
    }

    /// Run one fetch, classify, apply and report cycle
    pub async fn run_once(&mut self) -> IterationOutcome {
        let snapshot = match self.source.fetch_sessions().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!(error = %e, "Failed to retrieve sessions from Plex API");
                return IterationOutcome::Skipped;
            }
        };

        let streaming = snapshot.is_streaming();
        if streaming {
            info!(sessions = snapshot.count(), "Someone is streaming from Plex!");
        } else {
            info!("No one is currently streaming from Plex.");
        }

        let policy = BandwidthPolicy::classify(streaming, self.caps);
        let failures = self.apply(policy).await;

        report(&snapshot);

        IterationOutcome::Applied { policy, failures }
    }

    async fn apply(&mut self, policy: BandwidthPolicy) -> usize {
        let mut failures = 0;

        match self.limiter.set_upload_limit(policy.upload).await {
            Ok(()) if policy.upload.is_unlimited() => {
                info!("Removed upload speed limit in qBittorrent.")
            }
            Ok(()) => info!(limit = %policy.upload, "Upload speed limit set in qBittorrent."),
            Err(e) => {
                failures += 1;
                error!(error = %e, "Failed to set upload speed limit in qBittorrent");
            }
        }

        match self.limiter.set_download_limit(policy.download).await {
            Ok(()) if policy.download.is_unlimited() => {
                info!("Removed download speed limit in qBittorrent.")
            }
            Ok(()) => info!(limit = %policy.download, "Download speed limit set in qBittorrent."),
            Err(e) => {
                failures += 1;
                error!(error = %e, "Failed to set download speed limit in qBittorrent");
            }
        }

        failures
    }
}

fn report(snapshot: &SessionSnapshot) {
    for session in &snapshot.sessions {
        info!(
            kind = session.kind.as_str(),
            state = session.state.as_deref().unwrap_or("unknown"),
            "{}",
            session
        );
    }
}
