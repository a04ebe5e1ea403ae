//! Configuration structures.
//!
//! Configuration is loaded from environment variables and config files.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default collector port.
pub const DEFAULT_PMCD_PORT: u16 = 44321;

/// Global library configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Host (remote collector) context configuration.
    #[serde(default)]
    pub host: HostConfig,

    /// Local (in-process agent) context configuration.
    #[serde(default)]
    pub local: LocalConfig,

    /// PDU buffer and frame limits.
    #[serde(default)]
    pub pdu: PduConfig,

    /// Debug bitmask. Overrides `$PCP_DEBUG` when set.
    #[serde(default)]
    pub debug: Option<u32>,
}

impl Config {
    /// Defaults overlaid with `PMCD_PORT`, `PMCD_CONNECT_TIMEOUT` and
    /// `PMCD_REQUEST_TIMEOUT`. Malformed values are ignored with a warning.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(port) = env_parse::<u16>("PMCD_PORT") {
            config.host.default_port = port;
        }
        if let Some(secs) = env_parse::<f64>("PMCD_CONNECT_TIMEOUT").and_then(secs_to_duration) {
            config.host.connect_timeout = secs;
        }
        if let Some(secs) = env_parse::<f64>("PMCD_REQUEST_TIMEOUT").and_then(secs_to_duration) {
            config.host.request_timeout = secs;
        }
        config
    }

    /// Load a JSON config file. Missing sections take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!("${}={} is not valid, ignored", name, raw);
            None
        }
    }
}

fn secs_to_duration(secs: f64) -> Option<Duration> {
    match Duration::try_from_secs_f64(secs) {
        Ok(d) if !d.is_zero() => Some(d),
        _ => {
            tracing::warn!("timeout of {} seconds is not usable, ignored", secs);
            None
        }
    }
}

/// Host context configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    /// Port used when the source names no port.
    pub default_port: u16,

    /// Upper bound on connection establishment and version handshake.
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Receive timeout for each response PDU.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            default_port: DEFAULT_PMCD_PORT,
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Local context configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LocalConfig {
    /// Refuse local agent calls with `Error::Thread` once a second thread
    /// has been seen, instead of only logging the violation.
    pub strict_single_thread: bool,
}

/// PDU configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PduConfig {
    /// Largest PDU accepted from a peer, header included.
    pub max_pdu_bytes: u32,

    /// Number of idle buffers kept for reuse.
    pub pool_capacity: usize,
}

impl Default for PduConfig {
    fn default() -> Self {
        Self {
            max_pdu_bytes: 1024 * 1024,
            pool_capacity: 8,
        }
    }
}

/// Collector daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorConfig {
    /// TCP bind address.
    pub listen_addr: String,

    /// Maximum concurrent client connections.
    pub max_connections: usize,

    /// Idle time allowed between request PDUs.
    #[serde(with = "humantime_serde")]
    pub read_timeout: Duration,

    /// Time allowed to flush one response PDU.
    #[serde(with = "humantime_serde")]
    pub write_timeout: Duration,

    /// Largest request PDU accepted.
    pub max_pdu_bytes: u32,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            listen_addr: format!("127.0.0.1:{}", DEFAULT_PMCD_PORT),
            max_connections: 256,
            read_timeout: Duration::from_secs(300),
            write_timeout: Duration::from_secs(10),
            max_pdu_bytes: 64 * 1024,
        }
    }
}
