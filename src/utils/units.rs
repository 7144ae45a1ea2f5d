/// Bytes in one megabyte, as the limits are configured in MB/s
pub const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Sentinel understood by qBittorrent as "no limit"
pub const UNLIMITED: i64 = -1;

/// Convert a megabytes-per-second string into bytes per second.
///
/// The result is truncated to an integer, and anything that converts to zero
/// or less yields [`UNLIMITED`]. Returns `None` when the value is not a finite
/// number so the caller can report it.
pub fn mbps_to_bps(value: &str) -> Option<i64> {
    let mbps: f64 = value.trim().parse().ok()?;
    if !mbps.is_finite() {
        return None;
    }

    let bps = (mbps * BYTES_PER_MB) as i64;
    Some(if bps > 0 { bps } else { UNLIMITED })
}
