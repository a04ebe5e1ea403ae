//! Contexts: client-side handles bound to one metric source.
//!
//! A [`Context`] is shared (`Arc`) between the table and callers that looked
//! it up. Its `kind` and `source` are fixed at creation; the backend state
//! is mutable and only reachable while the context's own lock is held by
//! the calling thread.

mod table;

pub use table::ContextTable;

use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

use crate::agent::AgentTable;
use crate::archive::ArchiveSource;
use crate::lock::{LockEntry, LockGuard};
use crate::pdu::Connection;
use crate::types::{Error, Handle, Result};

/// Kind of metric source behind a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextKind {
    /// A remote collector reached over the PDU protocol.
    Host,
    /// A recorded archive.
    Archive,
    /// Agents linked into this process.
    Local,
    /// Not a creatable kind; rejected with `NoContext`.
    Undefined,
}

impl fmt::Display for ContextKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ContextKind::Host => "host",
            ContextKind::Archive => "archive",
            ContextKind::Local => "local",
            ContextKind::Undefined => "undefined",
        };
        f.write_str(name)
    }
}

/// Per-kind backend state.
#[derive(Debug)]
pub(crate) enum Backend {
    /// `None` once the connection has been dropped and not yet re-established.
    Host(Option<Connection>),
    Local(Arc<AgentTable>),
    Archive(ArchiveSource),
    Closed,
}

impl Backend {
    /// Release backend resources. Idempotent.
    pub(crate) fn close(&mut self) {
        if let Backend::Host(Some(conn)) = self {
            conn.close();
        }
        *self = Backend::Closed;
    }
}

/// One live context.
pub struct Context {
    handle: Handle,
    kind: ContextKind,
    source: String,
    lock: LockEntry,
    backend: Mutex<Backend>,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("handle", &self.handle)
            .field("kind", &self.kind)
            .field("source", &self.source)
            .field("lock", &self.lock)
            .finish()
    }
}

impl Context {
    pub(crate) fn new(
        handle: Handle,
        kind: ContextKind,
        source: String,
        lock: LockEntry,
        backend: Backend,
    ) -> Self {
        Self {
            handle,
            kind,
            source,
            lock,
            backend: Mutex::new(backend),
        }
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub fn kind(&self) -> ContextKind {
        self.kind
    }

    /// Host name, archive path, or empty for local contexts.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn lock_entry(&self) -> &LockEntry {
        &self.lock
    }

    #[track_caller]
    pub fn lock(&self) -> Result<()> {
        self.lock.lock_at(Location::caller())
    }

    #[track_caller]
    pub fn unlock(&self) -> Result<()> {
        self.lock.unlock_at(Location::caller())
    }

    #[track_caller]
    pub fn guard(&self) -> Result<LockGuard<'_>> {
        self.lock.guard()
    }

    /// Backend state. Fails with `Lock` unless the caller holds this
    /// context's lock.
    pub(crate) fn backend(&self) -> Result<MutexGuard<'_, Backend>> {
        if !self.lock.held_by_current_thread() {
            tracing::warn!("backend of context {} touched without its lock", self.handle);
            return Err(Error::Lock);
        }
        Ok(self.backend.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::LockRegistry;
    use crate::types::Config;

    fn local_context() -> Context {
        let registry = LockRegistry::init(&Config::default());
        let handle = Handle::from_raw(0);
        Context::new(
            handle,
            ContextKind::Local,
            String::new(),
            registry.context_lock(handle),
            Backend::Local(Arc::new(AgentTable::new())),
        )
    }

    #[test]
    fn backend_requires_the_context_lock() {
        let ctx = local_context();
        assert_eq!(ctx.backend().unwrap_err(), Error::Lock);
        let _guard = ctx.guard().unwrap();
        assert!(matches!(*ctx.backend().unwrap(), Backend::Local(_)));
    }

    #[test]
    fn backend_close_is_idempotent() {
        let ctx = local_context();
        ctx.lock().unwrap();
        ctx.backend().unwrap().close();
        ctx.backend().unwrap().close();
        assert!(matches!(*ctx.backend().unwrap(), Backend::Closed));
        ctx.unlock().unwrap();
        assert!(ctx.lock_entry().check_is_unlocked());
    }

    #[test]
    fn kind_names() {
        assert_eq!(ContextKind::Host.to_string(), "host");
        assert_eq!(serde_json::to_string(&ContextKind::Archive).unwrap(), "\"archive\"");
    }
}
