//! Log output for `pmtextd` and other programs built on this crate.
//!
//! The library only emits `tracing` events; installing a subscriber is left
//! to the program. [`init_tracing`] is the one `pmtextd` uses:
//!
//! - `RUST_LOG` selects what is shown. Without it the filter is
//!   [`DEFAULT_FILTER`], which keeps lock traces (target `pmapi_core::lock`)
//!   at `debug` so that `PCP_DEBUG` lock categories are visible without
//!   further setup. Everything else logs at `info`.
//! - `PMAPI_LOG_FORMAT=json` writes one JSON object per event; any other
//!   value, or none, writes compact text.

use std::sync::OnceLock;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info,pmapi_core::lock=debug";

static TRACING_INIT: OnceLock<()> = OnceLock::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl LogFormat {
    /// Format named by a `PMAPI_LOG_FORMAT` value.
    pub fn from_setting(value: Option<&str>) -> Self {
        match value {
            Some(v) if v.trim().eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Compact,
        }
    }

    fn from_env() -> Self {
        Self::from_setting(std::env::var("PMAPI_LOG_FORMAT").ok().as_deref())
    }
}

fn filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global subscriber. Later calls are no-ops, and a subscriber
/// installed by someone else is left alone.
pub fn init_tracing() {
    TRACING_INIT.get_or_init(|| {
        let registry = tracing_subscriber::registry().with(filter());
        let result = match LogFormat::from_env() {
            LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
            LogFormat::Compact => registry.with(fmt::layer().compact()).try_init(),
        };
        if let Err(err) = result {
            eprintln!("pmapi-core: tracing init skipped: {err}");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_format_setting() {
        assert_eq!(LogFormat::from_setting(None), LogFormat::Compact);
        assert_eq!(LogFormat::from_setting(Some("JSON")), LogFormat::Json);
        assert_eq!(LogFormat::from_setting(Some(" json ")), LogFormat::Json);
        assert_eq!(LogFormat::from_setting(Some("pretty")), LogFormat::Compact);
    }

    #[test]
    fn default_filter_parses() {
        assert!(EnvFilter::try_new(DEFAULT_FILTER).is_ok());
    }

    #[test]
    fn init_tracing_is_idempotent() {
        init_tracing();
        init_tracing();
    }
}
