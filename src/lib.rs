//! # pmapi-core - metrics client context and transport core
//!
//! Client-side core of a performance metrics API:
//! - Context table mapping integer handles to metric sources (remote
//!   collector, in-process agents, or archives)
//! - Lock registry with a recursive global lock, error-checking subsystem
//!   and per-context locks, call-site tracing and a multi-thread witness
//! - PDU codec and blocking transport with pinned, pooled receive buffers
//! - Dispatch of help text lookups by context kind, with a bounded
//!   help → one-line fallback
//! - A tokio collector daemon answering text requests from a catalogue
//!
//! ## Architecture
//!
//! ```text
//!   Client ──► ContextTable ──► Context[N] ──► Backend
//!     │            │               │            ├── Host     ──► Connection ──► collector
//!     │            │               │            ├── Local    ──► AgentTable[domain]
//!     │            │               │            └── Archive  ──► NotHost
//!     └────────────┴── LockRegistry (global, scoped, context[N]) + thread-private current
//! ```

#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]
#![warn(rust_2018_idioms)]

pub mod agent;
pub mod archive;
pub mod catalogue;
pub mod client;
pub mod collector;
pub mod context;
mod dispatch;
pub mod lock;
pub mod pdu;
pub mod types;

pub mod observability;

pub use agent::{Agent, AgentTable, StaticAgent};
pub use catalogue::{HelpCatalogue, HelpEntry};
pub use client::Client;
pub use context::{Context, ContextKind};
pub use types::{err_str, Config, Error, Handle, InDom, Pmid, Result, TextLevel, TextRequest};
