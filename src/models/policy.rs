use std::fmt;

use crate::utils::units::UNLIMITED;

/// A global transfer cap in bytes per second, `-1` meaning unlimited
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpeedLimit(i64);

impl SpeedLimit {
    pub const UNLIMITED: SpeedLimit = SpeedLimit(UNLIMITED);

    /// Wrap a bytes-per-second value. Zero and negative values collapse to
    /// the unlimited sentinel.
    pub fn from_bytes_per_sec(bps: i64) -> Self {
        if bps > 0 {
            SpeedLimit(bps)
        } else {
            Self::UNLIMITED
        }
    }

    pub fn is_unlimited(&self) -> bool {
        self.0 == UNLIMITED
    }

    /// Value as sent to the torrent client
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl Default for SpeedLimit {
    fn default() -> Self {
        Self::UNLIMITED
    }
}

impl fmt::Display for SpeedLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unlimited() {
            write!(f, "unlimited")
        } else {
            write!(f, "{} B/s", self.0)
        }
    }
}

/// Upload and download caps applied together
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BandwidthPolicy {
    pub upload: SpeedLimit,
    pub download: SpeedLimit,
}

impl BandwidthPolicy {
    pub const UNLIMITED: BandwidthPolicy = BandwidthPolicy {
        upload: SpeedLimit::UNLIMITED,
        download: SpeedLimit::UNLIMITED,
    };

    pub fn new(upload: SpeedLimit, download: SpeedLimit) -> Self {
        Self { upload, download }
    }

    /// Pick the policy for the latest poll: the configured caps while anyone
    /// is streaming, no limits otherwise.
    pub fn classify(streaming: bool, caps: BandwidthPolicy) -> Self {
        if streaming {
            caps
        } else {
            Self::UNLIMITED
        }
    }
}
