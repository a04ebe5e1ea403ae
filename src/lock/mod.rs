//! Lock registry.
//!
//! A small, statically known set of named locks: one recursive global lock
//! plus a pool of error-checking subsystem locks, and the factory for
//! per-context locks. Each [`LockEntry`] carries ownership and trace
//! diagnostics; any data it guards sits behind a plain `parking_lot` mutex
//! that is only taken while the entry is held, so that inner mutex never
//! contends.
//!
//! ```text
//!   LockRegistry
//!   ├── global            (Recursive)  context table membership
//!   ├── scoped[contexts]  (ErrorCheck) handle allocation
//!   ├── scoped[pdubuf]    (ErrorCheck) PDU buffer pool
//!   ├── scoped[connect]   (ErrorCheck) host name resolution
//!   ├── scoped[witness]   (ErrorCheck) multi-thread witness
//!   ├── scoped[extcall]   (ErrorCheck) environment access
//!   └── context[N]        (ErrorCheck) one per live context
//! ```

mod debug;
mod entry;
pub(crate) mod tpd;
mod witness;

pub use debug::DebugFlags;
pub use entry::{LockEntry, LockGuard, LockKind, LockMode, Site};
pub use witness::Scope;

use std::sync::atomic::{AtomicU64, Ordering};

use crate::types::{Config, Handle};
use witness::Witness;

static NEXT_REGISTRY_ID: AtomicU64 = AtomicU64::new(1);

/// Subsystem locks in the fixed pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopedLock {
    Contexts,
    PduBuf,
    Connect,
    Witness,
    ExtCall,
}

impl ScopedLock {
    const ALL: [ScopedLock; 5] = [
        ScopedLock::Contexts,
        ScopedLock::PduBuf,
        ScopedLock::Connect,
        ScopedLock::Witness,
        ScopedLock::ExtCall,
    ];

    pub const fn tag(self) -> &'static str {
        match self {
            ScopedLock::Contexts => "contexts",
            ScopedLock::PduBuf => "pdubuf",
            ScopedLock::Connect => "connect",
            ScopedLock::Witness => "witness",
            ScopedLock::ExtCall => "extcall",
        }
    }

    const fn index(self) -> usize {
        self as usize
    }
}

/// The library's locks and lock diagnostics.
#[derive(Debug)]
pub struct LockRegistry {
    id: u64,
    debug: DebugFlags,
    global: LockEntry,
    scoped: Vec<LockEntry>,
    witness: Witness,
}

impl LockRegistry {
    /// One-trip setup for a client.
    ///
    /// Reads the debug bitmask (the environment is consulted once per
    /// process), builds the global and scoped locks and creates the calling
    /// thread's private data. A failure here leaves shared state half-built,
    /// so it terminates the process.
    pub fn init(config: &Config) -> Self {
        let bootstrap = LockEntry::new(
            ScopedLock::ExtCall.tag(),
            LockKind::Scoped,
            LockMode::ErrorCheck,
            DebugFlags::default(),
        );
        let debug = match bootstrap.guard() {
            Ok(_guard) => config
                .debug
                .map(DebugFlags::from_bits)
                .unwrap_or_else(DebugFlags::process),
            Err(e) => fatal(&format!("LockRegistry::init: extcall lock failed: {}", e)),
        };

        let global = LockEntry::new("global", LockKind::Global, LockMode::Recursive, debug);
        let scoped = ScopedLock::ALL
            .iter()
            .map(|s| LockEntry::new(s.tag(), LockKind::Scoped, LockMode::ErrorCheck, debug))
            .collect();
        tpd::touch();

        let id = NEXT_REGISTRY_ID.fetch_add(1, Ordering::Relaxed);
        let bits = debug.bits();
        tracing::debug!(registry = id, debug_mask = bits, "lock registry initialised");
        Self {
            id,
            debug,
            global,
            scoped,
            witness: Witness::default(),
        }
    }

    /// Unique id of this registry; keys thread-private data.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn debug(&self) -> DebugFlags {
        self.debug
    }

    /// The big library lock.
    pub fn global(&self) -> &LockEntry {
        &self.global
    }

    pub fn scoped(&self, which: ScopedLock) -> &LockEntry {
        &self.scoped[which.index()]
    }

    /// A fresh lock for the context with `handle`.
    pub(crate) fn context_lock(&self, handle: Handle) -> LockEntry {
        LockEntry::new(
            format!("context[{}]", handle),
            LockKind::Context,
            LockMode::ErrorCheck,
            self.debug,
        )
    }

    /// Record the caller against `scope`. Returns `true` when a thread
    /// other than the first one seen has entered the scope.
    pub fn witness_scope(&self, scope: Scope) -> bool {
        match self.scoped(ScopedLock::Witness).guard() {
            Ok(_guard) => self.witness.observe(scope),
            Err(e) => {
                tracing::warn!("witness lock failed: {}", e);
                false
            }
        }
    }
}

/// Report an unrecoverable setup failure and exit.
pub(crate) fn fatal(msg: &str) -> ! {
    tracing::error!("{}", msg);
    eprintln!("{}", msg);
    std::process::exit(4)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> LockRegistry {
        LockRegistry::init(&Config::default())
    }

    #[test]
    fn registries_have_distinct_ids() {
        assert_ne!(registry().id(), registry().id());
    }

    #[test]
    fn pool_tags_and_modes() {
        let reg = registry();
        assert_eq!(reg.global().mode(), LockMode::Recursive);
        assert_eq!(reg.global().kind(), LockKind::Global);
        for which in ScopedLock::ALL {
            let entry = reg.scoped(which);
            assert_eq!(entry.tag(), which.tag());
            assert_eq!(entry.mode(), LockMode::ErrorCheck);
        }
        let ctx = reg.context_lock(Handle::from_raw(4));
        assert_eq!(ctx.tag(), "context[4]");
        assert_eq!(ctx.kind(), LockKind::Context);
    }

    #[test]
    fn config_overrides_debug_mask() {
        let config = Config {
            debug: Some(DebugFlags::LOCK),
            ..Config::default()
        };
        let reg = LockRegistry::init(&config);
        assert!(reg.debug().contains(DebugFlags::LOCK));
    }

    #[test]
    fn witness_scope_two_threads() {
        let reg = std::sync::Arc::new(registry());
        assert!(!reg.witness_scope(Scope::LocalAgent));
        assert!(!reg.witness_scope(Scope::LocalAgent));
        let other = std::sync::Arc::clone(&reg);
        let raised = std::thread::spawn(move || other.witness_scope(Scope::LocalAgent))
            .join()
            .unwrap();
        assert!(raised);
    }

    #[tracing_test::traced_test]
    #[test]
    fn lock_tracing_reports_site_tag_and_count() {
        let config = Config {
            debug: Some(DebugFlags::LOCK),
            ..Config::default()
        };
        let reg = LockRegistry::init(&config);
        reg.global().lock().unwrap();
        reg.global().lock().unwrap();
        reg.global().unlock().unwrap();
        reg.global().unlock().unwrap();

        assert!(logs_contain("lock(global)"));
        assert!(logs_contain("[count=2]"));
        assert!(logs_contain("lock/mod.rs"));
    }

    #[tracing_test::traced_test]
    #[test]
    fn init_logs_debug_mask() {
        let config = Config {
            debug: Some(DebugFlags::CONTEXT | DebugFlags::LOCK),
            ..Config::default()
        };
        let reg = LockRegistry::init(&config);
        assert!(logs_contain("lock registry initialised"));
        assert!(logs_contain("debug_mask=6"));
        assert!(logs_contain(&format!("registry={}", reg.id())));
    }
}
