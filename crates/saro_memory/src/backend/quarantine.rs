//! # Quarantine Backend
//!
//! Delays the real release of freed regions.
//!
//! Freed regions are parked in a FIFO of fixed depth. Only when the FIFO
//! overflows is the oldest region handed back to the inner backend. While a
//! region is parked it stays mapped, so a guarded heap can still read its
//! poisoned envelope and report a double free instead of touching memory the
//! platform already reclaimed.

#![allow(unsafe_code)]

use std::collections::VecDeque;
use std::ptr::NonNull;

use parking_lot::{const_mutex, Mutex};

use super::Backend;
use crate::error::MemoryResult;

/// Parked region. Only the owning quarantine ever dereferences it.
struct Parked(NonNull<u8>);

// SAFETY: a parked pointer is exclusively owned by the quarantine.
unsafe impl Send for Parked {}

/// Backend wrapper that defers releases.
pub struct QuarantineBackend<B: Backend> {
    inner: B,
    depth: usize,
    parked: Mutex<VecDeque<Parked>>,
}

impl<B: Backend> QuarantineBackend<B> {
    /// Wraps `inner`, keeping up to `depth` freed regions alive.
    ///
    /// A depth of zero releases immediately. Usable in `static` items.
    #[must_use]
    pub const fn new(inner: B, depth: usize) -> Self {
        Self {
            inner,
            depth,
            parked: const_mutex(VecDeque::new()),
        }
    }

    /// Maximum number of parked regions.
    #[inline]
    #[must_use]
    pub const fn depth(&self) -> usize {
        self.depth
    }

    /// Number of regions currently parked.
    #[must_use]
    pub fn parked(&self) -> usize {
        self.parked.lock().len()
    }

    /// Releases every parked region to the inner backend.
    pub fn flush(&self) {
        let drained: Vec<Parked> = self.parked.lock().drain(..).collect();
        for Parked(ptr) in drained {
            // SAFETY: parked regions are live and owned by the quarantine.
            unsafe { self.inner.release(ptr) };
        }
    }
}

// SAFETY: allocation is delegated; released regions are parked, never handed
// out again, and eventually released to the inner backend exactly once.
unsafe impl<B: Backend> Backend for QuarantineBackend<B> {
    #[inline]
    fn allocate(&self, bytes: usize, alignment: usize) -> MemoryResult<NonNull<u8>> {
        self.inner.allocate(bytes, alignment)
    }

    unsafe fn release(&self, ptr: NonNull<u8>) {
        let evicted = {
            let mut parked = self.parked.lock();
            parked.push_back(Parked(ptr));
            if parked.len() > self.depth {
                parked.pop_front()
            } else {
                None
            }
        };
        if let Some(Parked(oldest)) = evicted {
            // SAFETY: the oldest parked region is live and owned by us.
            unsafe { self.inner.release(oldest) };
        }
    }

    fn name(&self) -> &'static str {
        "quarantine"
    }
}

impl<B: Backend> Drop for QuarantineBackend<B> {
    fn drop(&mut self) {
        self.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::NativeBackend;

    #[test]
    fn test_release_is_deferred() {
        let quarantine = QuarantineBackend::new(NativeBackend::new(), 2);
        let a = quarantine.allocate(16, 16).unwrap();
        let b = quarantine.allocate(16, 16).unwrap();
        let c = quarantine.allocate(16, 16).unwrap();

        // SAFETY: all three are live regions from this backend.
        unsafe {
            quarantine.release(a);
            quarantine.release(b);
            assert_eq!(quarantine.parked(), 2);
            quarantine.release(c);
        }
        assert_eq!(quarantine.parked(), 2);

        quarantine.flush();
        assert_eq!(quarantine.parked(), 0);
    }

    #[test]
    fn test_zero_depth_releases_immediately() {
        let quarantine = QuarantineBackend::new(NativeBackend::new(), 0);
        let a = quarantine.allocate(8, 8).unwrap();
        // SAFETY: live region from this backend.
        unsafe { quarantine.release(a) };
        assert_eq!(quarantine.parked(), 0);
    }
}
