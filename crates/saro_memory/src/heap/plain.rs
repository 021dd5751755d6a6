//! # Plain Heap
//!
//! Release-mode heap: no envelope, no checks, zero per-allocation overhead.

#![allow(unsafe_code)]

use super::{check_alignment, copy_with, route_alloc, zero_with, Heap, OPTIMAL_ALIGNMENT};
use crate::address::Address;
use crate::backend::{Backend, NativeBackend};
use crate::error::MemoryResult;
use crate::kind::AllocatorKind;

/// Heap that forwards straight to its backend.
///
/// # Example
///
/// ```rust,ignore
/// let heap = PlainHeap::new(NativeBackend::new());
/// let addr = heap.alloc_typed::<u32>(4, AllocatorKind::Persistent, true)?;
/// unsafe { heap.free(addr, AllocatorKind::Persistent) };
/// ```
#[derive(Debug)]
pub struct PlainHeap<B: Backend = NativeBackend> {
    backend: B,
    alignment: usize,
}

impl<B: Backend> PlainHeap<B> {
    /// Creates a heap over `backend` with [`OPTIMAL_ALIGNMENT`].
    #[must_use]
    pub const fn new(backend: B) -> Self {
        Self {
            backend,
            alignment: OPTIMAL_ALIGNMENT,
        }
    }

    /// Creates a heap with a custom alignment.
    ///
    /// # Errors
    ///
    /// `Config` if `alignment` is not a power of two of at least the word
    /// size.
    pub fn with_alignment(backend: B, alignment: usize) -> MemoryResult<Self> {
        Ok(Self {
            backend,
            alignment: check_alignment(alignment)?,
        })
    }

    /// The backing backend.
    #[inline]
    #[must_use]
    pub const fn backend(&self) -> &B {
        &self.backend
    }
}

impl<B: Backend> Heap for PlainHeap<B> {
    fn alloc(&self, bytes: usize, kind: AllocatorKind, clear: bool) -> MemoryResult<Address> {
        if !route_alloc(kind)? {
            return Ok(Address::null());
        }

        let ptr = self.backend.allocate(bytes, self.alignment)?;
        if clear && bytes > 0 {
            // SAFETY: `ptr` is a fresh region of `bytes` bytes.
            unsafe { self.backend.zero(ptr, bytes) };
        }

        let address = Address::from_non_null(ptr);
        tracing::trace!("alloc {} bytes at {} ({:?})", bytes, address, kind);
        Ok(address)
    }

    unsafe fn free(&self, address: Address, kind: AllocatorKind) {
        let Some(ptr) = address.non_null() else {
            return;
        };
        if !kind.is_heap() {
            tracing::warn!("ignoring free of {} with allocator {:?}", address, kind);
            return;
        }

        tracing::trace!("free {} ({:?})", address, kind);
        // SAFETY: forwarded to the caller.
        unsafe { self.backend.release(ptr) };
    }

    fn alignment(&self) -> usize {
        self.alignment
    }

    fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    unsafe fn backend_copy(&self, source: Address, destination: Address, bytes: usize) {
        // SAFETY: forwarded to the caller.
        unsafe { copy_with(&self.backend, source, destination, bytes) }
    }

    unsafe fn backend_zero(&self, destination: Address, bytes: usize) {
        // SAFETY: forwarded to the caller.
        unsafe { zero_with(&self.backend, destination, bytes) }
    }
}
