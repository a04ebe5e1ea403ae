//! Client service object.
//!
//! A [`Client`] owns the lock registry, the context table, the PDU buffer
//! pool and the local agent table. Every API call goes through it, and
//! callers pass it explicitly; two clients share no contexts, locks or
//! buffers.

use std::panic::Location;
use std::sync::{Arc, OnceLock};

use crate::agent::AgentTable;
use crate::archive::ArchiveSource;
use crate::context::{Backend, Context, ContextKind, ContextTable};
use crate::dispatch::Router;
use crate::lock::{LockRegistry, Scope};
use crate::pdu::{Connection, PduPool, PoolStats};
use crate::types::{Config, Error, Handle, InDom, Pmid, Result, TextLevel, TextRequest};

static GLOBAL: OnceLock<Client> = OnceLock::new();

#[derive(Debug)]
pub struct Client {
    config: Config,
    registry: Arc<LockRegistry>,
    contexts: ContextTable,
    pool: PduPool,
    agents: Arc<AgentTable>,
}

impl Client {
    pub fn new(config: Config) -> Self {
        Self::with_agents(config, Arc::new(AgentTable::new()))
    }

    /// A client whose local contexts dispatch through `agents`.
    pub fn with_agents(config: Config, agents: Arc<AgentTable>) -> Self {
        let registry = Arc::new(LockRegistry::init(&config));
        let pool = PduPool::new(Arc::clone(&registry), config.pdu.pool_capacity);
        Self {
            contexts: ContextTable::new(Arc::clone(&registry)),
            config,
            registry,
            pool,
            agents,
        }
    }

    /// Process-wide client configured from the environment on first use.
    ///
    /// Optional. Nothing in this crate calls it, and a client built with
    /// [`Client::new`] is fully independent of it. It exists for callers
    /// with no natural place to keep a `Client`.
    pub fn global() -> &'static Client {
        GLOBAL.get_or_init(|| Client::new(Config::from_env()))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &LockRegistry {
        &self.registry
    }

    pub fn contexts(&self) -> &ContextTable {
        &self.contexts
    }

    pub fn agents(&self) -> &Arc<AgentTable> {
        &self.agents
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Open a context of `kind` on `source` and make it current for the
    /// calling thread.
    ///
    /// `source` is `host[:port]` for hosts and a path for archives; it is
    /// ignored for local contexts.
    pub fn create(&self, kind: ContextKind, source: &str) -> Result<Handle> {
        let backend = match kind {
            ContextKind::Host => Backend::Host(Some(self.connect(source)?)),
            ContextKind::Local => Backend::Local(Arc::clone(&self.agents)),
            ContextKind::Archive => Backend::Archive(ArchiveSource::open(source)?),
            ContextKind::Undefined => return Err(Error::NoContext),
        };
        let handle = self.contexts.create(kind, source, backend)?;
        self.contexts.set_current(handle);
        Ok(handle)
    }

    fn connect(&self, source: &str) -> Result<Connection> {
        Connection::open(
            source,
            &self.config.host,
            self.config.pdu.max_pdu_bytes,
            &self.registry,
            &self.pool,
        )
    }

    pub fn destroy(&self, handle: Handle) -> Result<()> {
        self.contexts.destroy(handle)
    }

    pub fn lookup(&self, handle: Handle) -> Result<Arc<Context>> {
        self.contexts.lookup(handle)
    }

    /// Make `handle` the calling thread's current context.
    pub fn use_context(&self, handle: Handle) -> Result<()> {
        self.contexts.lookup(handle)?;
        self.contexts.set_current(handle);
        Ok(())
    }

    /// The calling thread's current context.
    pub fn which_context(&self) -> Result<Handle> {
        self.contexts.current().ok_or(Error::NoContext)
    }

    pub fn context_kind(&self, handle: Handle) -> Result<ContextKind> {
        Ok(self.contexts.lookup(handle)?.kind())
    }

    pub fn source(&self, handle: Handle) -> Result<String> {
        Ok(self.contexts.lookup(handle)?.source().to_string())
    }

    /// Drop a host context's connection and dial again. The context keeps
    /// its handle; on failure it is left without a connection and lookups
    /// fail with `NotConn` until a later reconnect succeeds.
    pub fn reconnect(&self, handle: Handle) -> Result<()> {
        let ctx = self.contexts.lookup(handle)?;
        if ctx.kind() != ContextKind::Host {
            return Err(Error::NotHost);
        }
        let _guard = ctx.guard()?;
        let mut backend = ctx.backend()?;
        let Backend::Host(slot) = &mut *backend else {
            return Err(Error::NoContext);
        };
        if let Some(old) = slot.take() {
            old.close();
        }
        let conn = self.connect(ctx.source())?;
        tracing::debug!("context {} reconnected to {}", handle, conn.peer());
        *slot = Some(conn);
        Ok(())
    }

    /// Acquire `handle`'s lock for a multi-step operation.
    #[track_caller]
    pub fn lock_context(&self, handle: Handle) -> Result<()> {
        self.contexts.lookup(handle)?.lock_entry().lock_at(Location::caller())
    }

    #[track_caller]
    pub fn unlock_context(&self, handle: Handle) -> Result<()> {
        self.contexts.lookup(handle)?.lock_entry().unlock_at(Location::caller())
    }

    /// Run `f` with `handle`'s lock held.
    #[track_caller]
    pub fn with_context_locked<T>(&self, handle: Handle, f: impl FnOnce(&Context) -> T) -> Result<T> {
        let ctx = self.contexts.lookup(handle)?;
        let _guard = ctx.guard()?;
        Ok(f(&ctx))
    }

    /// Help or one-line text for a metric, from the current context.
    pub fn lookup_text(&self, pmid: Pmid, level: TextLevel) -> Result<String> {
        if pmid.is_derived() {
            return Err(Error::Text);
        }
        self.lookup_text_in(self.which_context()?, TextRequest::pmid(pmid, level))
    }

    /// Help or one-line text for an instance domain, from the current context.
    pub fn lookup_indom_text(&self, indom: InDom, level: TextLevel) -> Result<String> {
        self.lookup_text_in(self.which_context()?, TextRequest::indom(indom, level))
    }

    /// Text lookup against an explicit context.
    pub fn lookup_text_in(&self, handle: Handle, request: TextRequest) -> Result<String> {
        let ctx = self.contexts.lookup(handle)?;
        Router {
            registry: &self.registry,
            pool: &self.pool,
            local: &self.config.local,
        }
        .lookup_text(&ctx, request)
    }

    /// See [`LockRegistry::witness_scope`].
    pub fn witness_scope(&self, scope: Scope) -> bool {
        self.registry.witness_scope(scope)
    }
}
