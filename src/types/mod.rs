//! Core types shared by every layer.
//!
//! - **IDs**: context handles, metric ids, instance domains, text requests
//! - **Errors**: the fixed negative-code error set and its string table
//! - **Config**: host, local, PDU and collector configuration

mod config;
mod errors;
mod ids;

pub use config::{Config, CollectorConfig, HostConfig, LocalConfig, PduConfig, DEFAULT_PMCD_PORT};
pub(crate) use errors::from_io;
pub use errors::{err_str, Error, Result};
pub use ids::{
    Handle, InDom, Pmid, TextLevel, TextRequest, TextTarget, DYNAMIC_DOMAIN, TEXT_HELP,
    TEXT_INDOM, TEXT_ONELINE, TEXT_PMID,
};
