//! Help text collector daemon.
//!
//! Speaks the collector side of the PDU protocol: greets each connection
//! with its protocol version, then answers `TEXT_REQ` from a
//! [`HelpCatalogue`](crate::catalogue::HelpCatalogue). Used by the `pmtextd`
//! binary and as the peer in integration tests.

pub mod codec;
pub mod server;

pub use server::Collector;
