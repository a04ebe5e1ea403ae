//! Handle → context registry.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::{Backend, Context, ContextKind};
use crate::lock::{tpd, DebugFlags, LockRegistry, ScopedLock};
use crate::types::{Error, Handle, Result};

/// Live contexts of one client.
///
/// Membership changes happen under the registry's global lock; handle
/// allocation additionally takes the `contexts` scoped lock. Handles are
/// never reused within a table.
#[derive(Debug)]
pub struct ContextTable {
    registry: Arc<LockRegistry>,
    slots: Mutex<BTreeMap<i32, Arc<Context>>>,
    next_handle: Mutex<i32>,
}

impl ContextTable {
    pub fn new(registry: Arc<LockRegistry>) -> Self {
        Self {
            registry,
            slots: Mutex::new(BTreeMap::new()),
            next_handle: Mutex::new(0),
        }
    }

    fn allocate(&self) -> Result<Handle> {
        let _guard = self.registry.scoped(ScopedLock::Contexts).guard()?;
        let mut next = self.next_handle.lock();
        let handle = *next;
        *next = handle.checked_add(1).ok_or(Error::NoContext)?;
        Ok(Handle::from_raw(handle))
    }

    /// Insert a context over an already opened backend and return its handle.
    pub(crate) fn create(&self, kind: ContextKind, source: &str, backend: Backend) -> Result<Handle> {
        let _global = self.registry.global().guard()?;
        let handle = self.allocate()?;
        let ctx = Context::new(
            handle,
            kind,
            source.to_string(),
            self.registry.context_lock(handle),
            backend,
        );
        self.slots.lock().insert(handle.as_raw(), Arc::new(ctx));
        if self.registry.debug().contains(DebugFlags::CONTEXT) {
            tracing::debug!("create context {} kind={} source={:?}", handle, kind, source);
        }
        Ok(handle)
    }

    /// The live context for `handle`. Does not lock it.
    pub fn lookup(&self, handle: Handle) -> Result<Arc<Context>> {
        if handle.as_raw() < 0 {
            return Err(Error::NoContext);
        }
        let _global = self.registry.global().guard()?;
        let slots = self.slots.lock();
        slots.get(&handle.as_raw()).cloned().ok_or(Error::NoContext)
    }

    /// Wait for any exchange in flight on `handle`, unlink it, then release
    /// its backend. The calling thread's current context is cleared if it
    /// was `handle`.
    ///
    /// The context lock is taken while the context is still in the table,
    /// so a holder can release it through its handle. A caller that already
    /// holds the lock gets `Lock` and the table is left as it was.
    pub fn destroy(&self, handle: Handle) -> Result<()> {
        let ctx = self.lookup(handle)?;
        let _ctx_guard = ctx.guard()?;
        {
            let _global = self.registry.global().guard()?;
            let mut slots = self.slots.lock();
            match slots.get(&handle.as_raw()) {
                Some(live) if Arc::ptr_eq(live, &ctx) => {
                    slots.remove(&handle.as_raw());
                }
                // lost a race with another destroy
                _ => return Err(Error::NoContext),
            }
        }
        ctx.backend()?.close();
        tpd::clear_current(self.registry.id(), handle);
        if self.registry.debug().contains(DebugFlags::CONTEXT) {
            tracing::debug!("destroy context {}", handle);
        }
        Ok(())
    }

    /// The calling thread's current context, if any.
    pub fn current(&self) -> Option<Handle> {
        tpd::current(self.registry.id())
    }

    pub(crate) fn set_current(&self, handle: Handle) {
        tpd::set_current(self.registry.id(), handle);
    }

    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }

    /// Live handles in ascending order.
    pub fn handles(&self) -> Vec<Handle> {
        self.slots.lock().keys().copied().map(Handle::from_raw).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentTable;
    use crate::types::Config;

    fn table() -> ContextTable {
        ContextTable::new(Arc::new(LockRegistry::init(&Config::default())))
    }

    fn local() -> Backend {
        Backend::Local(Arc::new(AgentTable::new()))
    }

    #[test]
    fn handles_are_sequential_and_not_reused() {
        let table = table();
        let a = table.create(ContextKind::Local, "", local()).unwrap();
        let b = table.create(ContextKind::Local, "", local()).unwrap();
        assert_eq!((a.as_raw(), b.as_raw()), (0, 1));
        table.destroy(a).unwrap();
        let c = table.create(ContextKind::Local, "", local()).unwrap();
        assert_eq!(c.as_raw(), 2);
        assert_eq!(table.handles(), vec![b, c]);
    }

    #[test]
    fn lookup_rejects_dead_and_negative_handles() {
        let table = table();
        let h = table.create(ContextKind::Local, "", local()).unwrap();
        assert_eq!(table.lookup(h).unwrap().kind(), ContextKind::Local);
        assert_eq!(table.lookup(Handle::from_raw(-1)).unwrap_err(), Error::NoContext);
        assert_eq!(table.lookup(Handle::from_raw(7)).unwrap_err(), Error::NoContext);
        table.destroy(h).unwrap();
        assert_eq!(table.lookup(h).unwrap_err(), Error::NoContext);
        assert_eq!(table.destroy(h).unwrap_err(), Error::NoContext);
        assert!(table.is_empty());
    }

    #[test]
    fn destroy_closes_backend_held_by_other_references() {
        let table = table();
        let h = table.create(ContextKind::Local, "", local()).unwrap();
        let ctx = table.lookup(h).unwrap();
        table.destroy(h).unwrap();
        let _guard = ctx.guard().unwrap();
        assert!(matches!(*ctx.backend().unwrap(), Backend::Closed));
    }

    #[test]
    fn destroy_clears_current_only_when_matching() {
        let table = table();
        let a = table.create(ContextKind::Local, "", local()).unwrap();
        let b = table.create(ContextKind::Local, "", local()).unwrap();
        table.set_current(a);
        table.destroy(b).unwrap();
        assert_eq!(table.current(), Some(a));
        table.destroy(a).unwrap();
        assert_eq!(table.current(), None);
    }

    #[test]
    fn destroy_waits_for_context_lock() {
        let table = Arc::new(table());
        let h = table.create(ContextKind::Local, "", local()).unwrap();
        let ctx = table.lookup(h).unwrap();
        ctx.lock().unwrap();

        let (tx, rx) = std::sync::mpsc::channel();
        let other = Arc::clone(&table);
        let destroyer = std::thread::spawn(move || {
            let res = other.destroy(h);
            tx.send(()).unwrap();
            res
        });
        assert!(rx.recv_timeout(std::time::Duration::from_millis(100)).is_err());
        // still reachable while the destroyer waits
        assert!(table.lookup(h).is_ok());
        ctx.unlock().unwrap();
        destroyer.join().unwrap().unwrap();
        assert!(rx.try_recv().is_ok());
        assert_eq!(table.lookup(h).unwrap_err(), Error::NoContext);
    }

    #[test]
    fn racing_destroys_succeed_once() {
        let table = Arc::new(table());
        let h = table.create(ContextKind::Local, "", local()).unwrap();
        let ctx = table.lookup(h).unwrap();
        ctx.lock().unwrap();

        let destroyers: Vec<_> = (0..2)
            .map(|_| {
                let other = Arc::clone(&table);
                std::thread::spawn(move || other.destroy(h))
            })
            .collect();
        std::thread::sleep(std::time::Duration::from_millis(50));
        ctx.unlock().unwrap();

        let mut results: Vec<_> = destroyers.into_iter().map(|t| t.join().unwrap()).collect();
        results.sort_by_key(|r| r.is_err());
        assert_eq!(results, vec![Ok(()), Err(Error::NoContext)]);
        assert!(table.is_empty());
    }

    #[cfg(not(feature = "lock-asserts"))]
    #[test]
    fn destroy_by_lock_holder_leaves_table_intact() {
        let table = table();
        let h = table.create(ContextKind::Local, "", local()).unwrap();
        table.set_current(h);
        let ctx = table.lookup(h).unwrap();
        ctx.lock().unwrap();

        assert_eq!(table.destroy(h).unwrap_err(), Error::Lock);
        assert!(table.lookup(h).is_ok());
        assert_eq!(table.current(), Some(h));

        ctx.unlock().unwrap();
        table.destroy(h).unwrap();
        assert_eq!(table.current(), None);
    }
}
