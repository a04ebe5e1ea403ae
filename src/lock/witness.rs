//! "Seen by more than one thread" detector.
//!
//! Purely diagnostic: nothing here excludes anybody. Code paths that are
//! documented as single-thread-only ask the witness whether a second thread
//! has turned up.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::thread::{self, ThreadId};

/// A code path with a single-thread contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Direct calls into in-process agents.
    LocalAgent,
    /// Higher-level subsystems built on the library.
    Named(&'static str),
}

#[derive(Debug, Default)]
pub(crate) struct Witness {
    claimed_by: Mutex<HashMap<Scope, ThreadId>>,
}

impl Witness {
    /// Claim `scope` for the caller on first use. Returns `true` when the
    /// caller is not the thread that claimed it.
    pub(crate) fn observe(&self, scope: Scope) -> bool {
        let me = thread::current().id();
        let mut claimed = self.claimed_by.lock();
        let owner = *claimed.entry(scope).or_insert(me);
        owner != me
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn same_thread_never_raises() {
        let witness = Witness::default();
        assert!(!witness.observe(Scope::LocalAgent));
        assert!(!witness.observe(Scope::LocalAgent));
    }

    #[test]
    fn second_thread_raises() {
        let witness = Arc::new(Witness::default());
        assert!(!witness.observe(Scope::LocalAgent));
        let other = Arc::clone(&witness);
        let raised = std::thread::spawn(move || other.observe(Scope::LocalAgent))
            .join()
            .unwrap();
        assert!(raised);
    }

    #[test]
    fn scopes_are_independent() {
        let witness = Arc::new(Witness::default());
        assert!(!witness.observe(Scope::Named("fetch")));
        let other = Arc::clone(&witness);
        let raised = std::thread::spawn(move || other.observe(Scope::LocalAgent))
            .join()
            .unwrap();
        assert!(!raised);
    }
}
