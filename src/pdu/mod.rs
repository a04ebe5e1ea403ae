//! PDU wire protocol between host contexts and a collector.
//!
//! - [`codec`]: header and body encoding, bit-exact for the text exchange
//! - [`buffer`]: pooled receive buffers with scope-bound pins
//! - [`transport`]: blocking send, deadline-bounded receive, handshake

pub mod buffer;
pub mod codec;
pub mod transport;

pub use buffer::{PduPool, PinnedPdu, PoolStats};
pub use codec::{Decode, Encode, ErrorPdu, PduHeader, TextPdu, TextReqPdu};
pub use transport::Connection;
