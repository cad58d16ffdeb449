use std::env;
use std::str::FromStr;

use log::warn;

/// Environment variable overriding [`DemuxerConfig::chunk_packets`]
pub const ENV_CHUNK_PACKETS: &str = "TSDEMUX_CHUNK_PACKETS";
/// Environment variable overriding [`DemuxerConfig::probe_packets`]
pub const ENV_PROBE_PACKETS: &str = "TSDEMUX_PROBE_PACKETS";
/// Environment variable overriding [`DemuxerConfig::verify_crc`]
pub const ENV_VERIFY_CRC: &str = "TSDEMUX_VERIFY_CRC";

/// Tunables for a demuxing run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemuxerConfig {
    /// Number of packets read from the input per bulk read.
    pub chunk_packets: usize,
    /// Size of the synchronization probe window, in 204-byte packets.
    pub probe_packets: usize,
    /// Verify the CRC-32 trailing every PAT/PMT section.
    pub verify_crc: bool,
}

impl Default for DemuxerConfig {
    fn default() -> Self {
        Self {
            chunk_packets: 1024,
            probe_packets: 6,
            verify_crc: false,
        }
    }
}

impl DemuxerConfig {
    /// Default configuration with `TSDEMUX_*` environment overrides applied.
    ///
    /// Values that fail to parse are ignored with a warning.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(n) = env_value::<usize>(ENV_CHUNK_PACKETS) {
            config = config.with_chunk_packets(n);
        }
        if let Some(n) = env_value::<usize>(ENV_PROBE_PACKETS) {
            config = config.with_probe_packets(n);
        }
        if let Ok(raw) = env::var(ENV_VERIFY_CRC) {
            match parse_flag(&raw) {
                Some(flag) => config.verify_crc = flag,
                None => warn!("Ignoring {}={:?}: expected a boolean", ENV_VERIFY_CRC, raw),
            }
        }

        config
    }

    /// Sets the bulk read size; clamped to at least one packet.
    pub fn with_chunk_packets(mut self, packets: usize) -> Self {
        self.chunk_packets = packets.max(1);
        self
    }

    /// Sets the probe window; clamped to at least two packets.
    pub fn with_probe_packets(mut self, packets: usize) -> Self {
        self.probe_packets = packets.max(2);
        self
    }

    /// Enables or disables PSI checksum verification.
    pub fn with_verify_crc(mut self, verify: bool) -> Self {
        self.verify_crc = verify;
        self
    }
}

fn env_value<T: FromStr>(name: &str) -> Option<T> {
    let raw = env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring {}={:?}: not a valid number", name, raw);
            None
        }
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
