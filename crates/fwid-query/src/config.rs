//! Scan configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tuning for firmware scans
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Per-query response timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Presence probe timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub probe_timeout_ms: u64,
    /// Maximum addresses per transport call
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Attached bus adapters; each exposes four buses
    #[serde(default = "default_num_adapters")]
    pub num_adapters: u8,
    /// Ask the transport for per-frame tracing
    #[serde(default)]
    pub debug: bool,
    /// Upper bound on waiting for the gateway to acknowledge a
    /// multiplexing change, in milliseconds
    #[serde(default = "default_multiplexing_ack_timeout_ms")]
    pub multiplexing_ack_timeout_ms: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            probe_timeout_ms: default_timeout_ms(),
            chunk_size: default_chunk_size(),
            num_adapters: default_num_adapters(),
            debug: false,
            multiplexing_ack_timeout_ms: default_multiplexing_ack_timeout_ms(),
        }
    }
}

fn default_timeout_ms() -> u64 {
    100
}

fn default_chunk_size() -> usize {
    128
}

fn default_num_adapters() -> u8 {
    1
}

fn default_multiplexing_ack_timeout_ms() -> u64 {
    5000
}

impl ScanConfig {
    /// Parse from a TOML document; missing fields take their defaults
    pub fn from_toml(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn multiplexing_ack_timeout(&self) -> Duration {
        Duration::from_millis(self.multiplexing_ack_timeout_ms)
    }

    /// Whether `bus` exists on the attached adapters
    pub fn bus_available(&self, bus: u8) -> bool {
        u32::from(bus) < u32::from(self.num_adapters) * 4
    }
}
