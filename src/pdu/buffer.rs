//! Pinned PDU buffers.
//!
//! A received PDU lives in a pool buffer that stays valid while at least one
//! [`PinnedPdu`] guard refers to it. Guards unpin on drop, so every exit path
//! (including `?` returns) releases the buffer; the last unpin hands the
//! storage back to the pool.

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use super::codec::{Decode, PduHeader};
use crate::lock::{LockRegistry, ScopedLock};
use crate::types::{Error, Result};

/// Pool usage counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Buffers with a non-zero pin count right now.
    pub pinned: usize,
    /// Buffers created because the free list was empty.
    pub allocated: u64,
    /// Buffers returned to the free list.
    pub recycled: u64,
}

struct PoolInner {
    registry: Arc<LockRegistry>,
    free: Mutex<Vec<Vec<u8>>>,
    capacity: usize,
    pinned: AtomicUsize,
    allocated: AtomicU64,
    recycled: AtomicU64,
}

impl PoolInner {
    fn take(&self, len: usize) -> Vec<u8> {
        let reused = match self.registry.scoped(ScopedLock::PduBuf).guard() {
            Ok(_guard) => self.free.lock().pop(),
            Err(e) => {
                tracing::warn!("pdubuf lock failed: {}", e);
                None
            }
        };
        let mut buf = reused.unwrap_or_else(|| {
            self.allocated.fetch_add(1, Ordering::Relaxed);
            Vec::with_capacity(len)
        });
        buf.clear();
        buf.resize(len, 0);
        buf
    }

    fn give_back(&self, buf: Vec<u8>) {
        if let Ok(_guard) = self.registry.scoped(ScopedLock::PduBuf).guard() {
            let mut free = self.free.lock();
            if free.len() < self.capacity {
                free.push(buf);
                self.recycled.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

/// Source of PDU buffers.
#[derive(Clone)]
pub struct PduPool {
    inner: Arc<PoolInner>,
}

impl fmt::Debug for PduPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PduPool").field("stats", &self.stats()).finish()
    }
}

impl PduPool {
    pub fn new(registry: Arc<LockRegistry>, capacity: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                registry,
                free: Mutex::new(Vec::with_capacity(capacity)),
                capacity,
                pinned: AtomicUsize::new(0),
                allocated: AtomicU64::new(0),
                recycled: AtomicU64::new(0),
            }),
        }
    }

    /// A zeroed buffer of `len` bytes to receive into.
    pub(crate) fn take(&self, len: usize) -> Vec<u8> {
        self.inner.take(len)
    }

    /// Return an unpinned buffer that was never filled.
    pub(crate) fn give_back(&self, buf: Vec<u8>) {
        self.inner.give_back(buf);
    }

    /// Wrap a complete PDU; the result starts with one pin.
    pub(crate) fn pin(&self, data: Vec<u8>) -> PinnedPdu {
        self.inner.pinned.fetch_add(1, Ordering::AcqRel);
        PinnedPdu {
            buf: Some(Arc::new(PduBuf {
                data,
                pins: AtomicU32::new(1),
            })),
            pool: Arc::clone(&self.inner),
        }
    }

    /// Copy a complete, well-framed PDU into a pool buffer and pin it.
    pub fn pin_copy(&self, pdu: &[u8]) -> Result<PinnedPdu> {
        let header = PduHeader::decode(pdu, u32::MAX)?;
        if header.len as usize != pdu.len() {
            return Err(Error::Ipc);
        }
        let mut buf = self.take(pdu.len());
        buf.copy_from_slice(pdu);
        Ok(self.pin(buf))
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            pinned: self.inner.pinned.load(Ordering::Acquire),
            allocated: self.inner.allocated.load(Ordering::Relaxed),
            recycled: self.inner.recycled.load(Ordering::Relaxed),
        }
    }
}

struct PduBuf {
    data: Vec<u8>,
    pins: AtomicU32,
}

/// One pin on a received PDU.
pub struct PinnedPdu {
    buf: Option<Arc<PduBuf>>,
    pool: Arc<PoolInner>,
}

impl fmt::Debug for PinnedPdu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PinnedPdu")
            .field("len", &self.as_bytes().len())
            .field("pins", &self.pin_count())
            .finish()
    }
}

impl PinnedPdu {
    pub fn as_bytes(&self) -> &[u8] {
        self.buf.as_ref().map(|b| b.data.as_slice()).unwrap_or(&[])
    }

    /// Header of the held PDU. Buffers are only pinned after the header
    /// has been validated, so this cannot fail on pool-produced PDUs.
    pub fn header(&self) -> Result<PduHeader> {
        PduHeader::decode(self.as_bytes(), u32::MAX)
    }

    /// Decode the body as `T`. The result may borrow from this pin.
    pub fn decode<'a, T: Decode<'a>>(&'a self) -> Result<T> {
        T::decode(self.as_bytes())
    }

    /// Take another pin on the same buffer.
    pub fn pin(&self) -> PinnedPdu {
        if let Some(buf) = &self.buf {
            buf.pins.fetch_add(1, Ordering::AcqRel);
        }
        PinnedPdu {
            buf: self.buf.clone(),
            pool: Arc::clone(&self.pool),
        }
    }

    pub fn pin_count(&self) -> u32 {
        self.buf
            .as_ref()
            .map(|b| b.pins.load(Ordering::Acquire))
            .unwrap_or(0)
    }

    /// Release this pin. Returns the number of pins still held.
    pub fn unpin(mut self) -> u32 {
        self.release()
    }

    fn release(&mut self) -> u32 {
        let Some(buf) = self.buf.take() else {
            return 0;
        };
        let remaining = buf.pins.fetch_sub(1, Ordering::AcqRel) - 1;
        if let Some(last) = Arc::into_inner(buf) {
            self.pool.pinned.fetch_sub(1, Ordering::AcqRel);
            self.pool.give_back(last.data);
        }
        remaining
    }
}

impl Drop for PinnedPdu {
    fn drop(&mut self) {
        self.release();
    }
}
