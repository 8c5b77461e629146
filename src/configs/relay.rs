use serde::{Deserialize, Serialize};

/// Tuning knobs for the relay loop.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RelayConfig {
    /// Tick period in milliseconds.
    #[serde(default = "default_period_ms")]
    pub period_ms: u64,
    /// Two samples of the same track whose implied start offsets differ
    /// by less than this are treated as the same dispatch.
    #[serde(default = "default_dedup_tolerance_ms")]
    pub dedup_tolerance_ms: u64,
    /// Consecutive dispatch failures before the sink is marked unhealthy.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Ingested samples older than this are treated as "no data".
    #[serde(default = "default_sample_freshness_ms")]
    pub sample_freshness_ms: u64,
    /// Upper bound on a single reachability probe.
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    /// Upper bound on the best-effort presence clear at shutdown.
    #[serde(default = "default_shutdown_clear_timeout_ms")]
    pub shutdown_clear_timeout_ms: u64,
    /// Clear the presence when playback transitions to paused/stopped.
    /// Off by default: the scraper cannot reliably tell "paused" from
    /// "no signal yet", so standing presence is the safer default.
    #[serde(default)]
    pub clear_on_pause: bool,
}

fn default_period_ms() -> u64 {
    5000
}

fn default_dedup_tolerance_ms() -> u64 {
    2000
}

fn default_failure_threshold() -> u32 {
    1
}

fn default_sample_freshness_ms() -> u64 {
    15000
}

fn default_probe_timeout_ms() -> u64 {
    2000
}

fn default_shutdown_clear_timeout_ms() -> u64 {
    1500
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            period_ms: default_period_ms(),
            dedup_tolerance_ms: default_dedup_tolerance_ms(),
            failure_threshold: default_failure_threshold(),
            sample_freshness_ms: default_sample_freshness_ms(),
            probe_timeout_ms: default_probe_timeout_ms(),
            shutdown_clear_timeout_ms: default_shutdown_clear_timeout_ms(),
            clear_on_pause: false,
        }
    }
}
