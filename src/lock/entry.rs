//! Named lock with explicit lock/unlock and trace support.

use parking_lot::{Condvar, Mutex};
use std::borrow::Cow;
use std::fmt;
use std::panic::Location;
use std::sync::atomic::{AtomicI64, Ordering};
use std::thread::{self, ThreadId};

use super::debug::DebugFlags;
use crate::types::{Error, Result};

/// Call site recorded in lock traces.
pub type Site = &'static Location<'static>;

/// Which family a lock belongs to. Selects the trace category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockKind {
    /// The library-wide big lock.
    Global,
    /// A subsystem lock from the fixed pool.
    Scoped,
    /// One context's own lock.
    Context,
}

impl LockKind {
    const fn trace_category(self) -> u32 {
        match self {
            LockKind::Global => DebugFlags::LOCK_GLOBAL,
            LockKind::Context => DebugFlags::LOCK_CONTEXT,
            LockKind::Scoped => DebugFlags::LOCK_OTHER,
        }
    }
}

/// Re-acquisition behaviour for the owning thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// The owner may lock again; each lock needs a matching unlock.
    Recursive,
    /// Relocking by the owner, or unlocking by anyone else, is an error.
    ErrorCheck,
}

#[derive(Debug, Default)]
struct Ownership {
    owner: Option<ThreadId>,
    depth: u32,
}

#[derive(Debug, Clone, Copy)]
enum Op {
    Lock,
    Unlock,
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::Lock => f.write_str("lock"),
            Op::Unlock => f.write_str("unlock"),
        }
    }
}

/// A mutual-exclusion primitive that is locked and unlocked by separate
/// calls, possibly in different functions.
///
/// Ownership is tracked per thread so misuse is reported as
/// [`Error::Lock`] rather than undefined behaviour.
pub struct LockEntry {
    tag: Cow<'static, str>,
    kind: LockKind,
    mode: LockMode,
    state: Mutex<Ownership>,
    released: Condvar,
    debug_count: AtomicI64,
    debug: DebugFlags,
}

impl fmt::Debug for LockEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockEntry")
            .field("tag", &self.tag)
            .field("kind", &self.kind)
            .field("mode", &self.mode)
            .field("debug_count", &self.debug_count())
            .finish()
    }
}

impl LockEntry {
    pub(crate) fn new(
        tag: impl Into<Cow<'static, str>>,
        kind: LockKind,
        mode: LockMode,
        debug: DebugFlags,
    ) -> Self {
        Self {
            tag: tag.into(),
            kind,
            mode,
            state: Mutex::new(Ownership::default()),
            released: Condvar::new(),
            debug_count: AtomicI64::new(0),
            debug,
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn kind(&self) -> LockKind {
        self.kind
    }

    pub fn mode(&self) -> LockMode {
        self.mode
    }

    /// Running count of acquisitions minus releases.
    pub fn debug_count(&self) -> i64 {
        self.debug_count.load(Ordering::Relaxed)
    }

    /// Acquire, blocking while another thread holds the lock.
    #[track_caller]
    pub fn lock(&self) -> Result<()> {
        self.lock_at(Location::caller())
    }

    pub fn lock_at(&self, site: Site) -> Result<()> {
        let me = thread::current().id();
        let mut state = self.state.lock();
        let sts = loop {
            match state.owner {
                None => {
                    state.owner = Some(me);
                    state.depth = 1;
                    break Ok(());
                }
                Some(owner) if owner == me => match self.mode {
                    LockMode::Recursive => {
                        state.depth += 1;
                        break Ok(());
                    }
                    LockMode::ErrorCheck => break Err(Error::Lock),
                },
                Some(_) => self.released.wait(&mut state),
            }
        };
        drop(state);

        match sts {
            Ok(()) => self.trace(Op::Lock, site),
            Err(e) => self.report_failure(Op::Lock, site, "already held by this thread", e),
        }
        sts
    }

    /// Acquire only if immediately available. Returns `Ok(false)` when
    /// another thread holds the lock.
    #[track_caller]
    pub fn try_lock(&self) -> Result<bool> {
        let site = Location::caller();
        let me = thread::current().id();
        let mut state = self.state.lock();
        let sts = match state.owner {
            None => {
                state.owner = Some(me);
                state.depth = 1;
                Ok(true)
            }
            Some(owner) if owner == me && self.mode == LockMode::Recursive => {
                state.depth += 1;
                Ok(true)
            }
            Some(owner) if owner == me => Err(Error::Lock),
            Some(_) => Ok(false),
        };
        drop(state);

        match sts {
            Ok(true) => self.trace(Op::Lock, site),
            Ok(false) => {}
            Err(e) => self.report_failure(Op::Lock, site, "already held by this thread", e),
        }
        sts
    }

    /// Release one level of ownership.
    #[track_caller]
    pub fn unlock(&self) -> Result<()> {
        self.unlock_at(Location::caller())
    }

    pub fn unlock_at(&self, site: Site) -> Result<()> {
        let me = thread::current().id();
        let mut state = self.state.lock();
        let sts = match state.owner {
            Some(owner) if owner == me => {
                state.depth -= 1;
                if state.depth == 0 {
                    state.owner = None;
                    self.released.notify_one();
                }
                Ok(())
            }
            _ => Err(Error::Lock),
        };
        drop(state);

        match sts {
            Ok(()) => self.trace(Op::Unlock, site),
            Err(e) => self.report_failure(Op::Unlock, site, "not held by this thread", e),
        }
        sts
    }

    /// Acquire and return a guard that unlocks on drop.
    #[track_caller]
    pub fn guard(&self) -> Result<LockGuard<'_>> {
        let site = Location::caller();
        self.lock_at(site)?;
        Ok(LockGuard { entry: self, site })
    }

    /// Whether any thread currently holds the lock.
    pub fn is_locked(&self) -> bool {
        self.state.lock().owner.is_some()
    }

    pub fn held_by_current_thread(&self) -> bool {
        self.state.lock().owner == Some(thread::current().id())
    }

    /// Diagnostic check: log a warning if the lock is held at `site`.
    /// Returns `true` when the lock was free.
    #[track_caller]
    pub fn check_is_unlocked(&self) -> bool {
        let site = Location::caller();
        let state = self.state.lock();
        match state.owner {
            None => true,
            Some(owner) => {
                tracing::warn!(
                    target: "pmapi_core::lock",
                    "check_is_unlocked({}): [{}:{}] locked by {:?} depth={}",
                    self.tag,
                    site.file(),
                    site.line(),
                    owner,
                    state.depth,
                );
                false
            }
        }
    }

    fn trace(&self, op: Op, site: Site) {
        let count = match op {
            Op::Lock => self.debug_count.fetch_add(1, Ordering::Relaxed) + 1,
            Op::Unlock => self.debug_count.fetch_sub(1, Ordering::Relaxed) - 1,
        };
        if !self.debug.reports_lock(self.kind.trace_category()) {
            return;
        }
        let settled = match op {
            Op::Lock => 1,
            Op::Unlock => 0,
        };
        if count == settled {
            tracing::debug!(
                target: "pmapi_core::lock",
                "{}:{} {}({})",
                site.file(),
                site.line(),
                op,
                self.tag
            );
        } else {
            tracing::debug!(
                target: "pmapi_core::lock",
                "{}:{} {}({}) [count={}]",
                site.file(),
                site.line(),
                op,
                self.tag,
                count
            );
        }
    }

    fn report_failure(&self, op: Op, site: Site, reason: &str, err: Error) {
        if self.debug.contains(DebugFlags::DESPERATE) {
            let backtrace = std::backtrace::Backtrace::force_capture();
            tracing::error!(
                target: "pmapi_core::lock",
                "{}:{}: {}({}) failed: {}: {}\nbacktrace:\n{}",
                site.file(),
                site.line(),
                op,
                self.tag,
                reason,
                err,
                backtrace
            );
        } else {
            tracing::debug!(
                target: "pmapi_core::lock",
                "{}:{}: {}({}) failed: {}",
                site.file(),
                site.line(),
                op,
                self.tag,
                reason
            );
        }
        #[cfg(feature = "lock-asserts")]
        panic!(
            "{}:{}: {}({}) failed: {}",
            site.file(),
            site.line(),
            op,
            self.tag,
            reason
        );
    }
}

/// Scope-bound ownership of a [`LockEntry`].
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct LockGuard<'a> {
    entry: &'a LockEntry,
    site: Site,
}

impl fmt::Debug for LockGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockGuard")
            .field("tag", &self.entry.tag)
            .field("site", &self.site)
            .finish()
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.entry.unlock_at(self.site) {
            tracing::warn!("guard release of {} failed: {}", self.entry.tag, e);
        }
    }
}
