//! Timeout and interval constants (spec §5 "Cancellation and timeouts").

use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    /// Per-provisioning-step timeout. Default 5 min.
    pub step: Duration,
    /// Total provisioning timeout across all steps. Default 20 min.
    pub total_provision: Duration,
    /// How stale a heartbeat may be before a host is considered offline.
    pub heartbeat_stale: chrono::Duration,
    /// Host agent heartbeat interval. Default 30s.
    pub heartbeat_interval: Duration,
    /// Upstream proxy pool entry TTL. Default 30s.
    pub proxy_cache_ttl: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            step: Duration::from_secs(5 * 60),
            total_provision: Duration::from_secs(20 * 60),
            heartbeat_stale: chrono::Duration::seconds(90),
            heartbeat_interval: Duration::from_secs(30),
            proxy_cache_ttl: Duration::from_secs(30),
        }
    }
}

impl Timeouts {
    pub fn from_env() -> Self {
        let mut timeouts = Self::default();
        if let Ok(ms) = std::env::var("HEARTBEAT_INTERVAL_MS") {
            if let Ok(ms) = ms.parse::<u64>() {
                timeouts.heartbeat_interval = Duration::from_millis(ms);
                // A host is considered stale after missing three heartbeats.
                timeouts.heartbeat_stale = chrono::Duration::milliseconds((ms * 3) as i64);
            }
        }
        if let Ok(ms) = std::env::var("PROXY_CACHE_TTL_MS") {
            if let Ok(ms) = ms.parse::<u64>() {
                timeouts.proxy_cache_ttl = Duration::from_millis(ms);
            }
        }
        timeouts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_proxy_cache_ttl_matches_spec() {
        assert_eq!(Timeouts::default().proxy_cache_ttl, Duration::from_secs(30));
    }
}
