//! Thread-private data.
//!
//! Each OS thread gets its own record on first use; it is dropped when the
//! thread exits. The record holds the thread's current context for every
//! live client, keyed by the client's registry id.

use std::cell::RefCell;
use std::collections::HashMap;

use crate::types::Handle;

#[derive(Debug, Default)]
struct ThreadPrivate {
    current: HashMap<u64, Handle>,
}

impl Drop for ThreadPrivate {
    fn drop(&mut self) {
        if !self.current.is_empty() {
            tracing::trace!(
                "thread exit releases {} current context(s)",
                self.current.len()
            );
        }
    }
}

thread_local! {
    static TPD: RefCell<ThreadPrivate> = RefCell::new(ThreadPrivate::default());
}

/// Make sure the calling thread's record exists.
pub(crate) fn touch() {
    let _ = TPD.try_with(|_| ());
}

pub(crate) fn current(registry: u64) -> Option<Handle> {
    TPD.try_with(|tpd| tpd.borrow().current.get(&registry).copied())
        .ok()
        .flatten()
}

pub(crate) fn set_current(registry: u64, handle: Handle) {
    let _ = TPD.try_with(|tpd| {
        tpd.borrow_mut().current.insert(registry, handle);
    });
}

/// Forget the current context if it is `handle`.
pub(crate) fn clear_current(registry: u64, handle: Handle) {
    let _ = TPD.try_with(|tpd| {
        let mut tpd = tpd.borrow_mut();
        if tpd.current.get(&registry) == Some(&handle) {
            tpd.current.remove(&registry);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_thread_and_per_registry() {
        set_current(1, Handle::from_raw(3));
        set_current(2, Handle::from_raw(9));
        assert_eq!(current(1), Some(Handle::from_raw(3)));
        assert_eq!(current(2), Some(Handle::from_raw(9)));

        let other = std::thread::spawn(|| current(1)).join().unwrap();
        assert_eq!(other, None);
    }

    #[test]
    fn clear_only_matching_handle() {
        set_current(7, Handle::from_raw(1));
        clear_current(7, Handle::from_raw(2));
        assert_eq!(current(7), Some(Handle::from_raw(1)));
        clear_current(7, Handle::from_raw(1));
        assert_eq!(current(7), None);
    }
}
