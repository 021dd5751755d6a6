//! # Allocator Backends
//!
//! Raw sources of native memory. A backend knows nothing about allocator
//! kinds, zeroing policy or debug envelopes; those live in [`crate::heap`].
//!
//! ## Implementations
//!
//! - [`NativeBackend`]: the platform heap.
//! - [`QuarantineBackend`]: defers the release of freed regions so that
//!   use-after-free and double-free can be observed in debug builds.

#![allow(unsafe_code)]

mod native;
mod quarantine;

use std::ptr::NonNull;

use crate::error::MemoryResult;

pub use native::NativeBackend;
pub use quarantine::QuarantineBackend;

/// A source of raw, aligned memory regions.
///
/// # Safety
///
/// Implementors must return regions that are valid for reads and writes of
/// at least the requested byte count, aligned to the requested alignment,
/// and disjoint from every other live region. A region stays valid until it
/// is passed to [`Backend::release`].
pub unsafe trait Backend: Send + Sync {
    /// Returns a fresh region of at least `bytes` bytes aligned to
    /// `alignment` (a power of two).
    ///
    /// A zero-byte request still yields a unique non-null address.
    ///
    /// # Errors
    ///
    /// `OutOfMemory` when the platform refuses the request, `InvalidLayout`
    /// when the size/alignment pair is not representable.
    fn allocate(&self, bytes: usize, alignment: usize) -> MemoryResult<NonNull<u8>>;

    /// Releases a region returned by [`Backend::allocate`].
    ///
    /// # Safety
    ///
    /// `ptr` must be live and come from this backend. It must not be used
    /// afterwards.
    unsafe fn release(&self, ptr: NonNull<u8>);

    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Fills `bytes` bytes at `ptr` with zero.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for writes of `bytes` bytes.
    #[inline]
    unsafe fn zero(&self, ptr: NonNull<u8>, bytes: usize) {
        // SAFETY: forwarded to the caller.
        unsafe { std::ptr::write_bytes(ptr.as_ptr(), 0, bytes) }
    }

    /// Copies `bytes` bytes from `src` to `dst`.
    ///
    /// # Safety
    ///
    /// Both pointers must be valid for `bytes` bytes and the ranges must not
    /// overlap.
    #[inline]
    unsafe fn copy(&self, src: NonNull<u8>, dst: NonNull<u8>, bytes: usize) {
        // SAFETY: forwarded to the caller.
        unsafe { std::ptr::copy_nonoverlapping(src.as_ptr(), dst.as_ptr(), bytes) }
    }
}

// SAFETY: delegates every call to the boxed backend.
unsafe impl<B: Backend + ?Sized> Backend for Box<B> {
    #[inline]
    fn allocate(&self, bytes: usize, alignment: usize) -> MemoryResult<NonNull<u8>> {
        (**self).allocate(bytes, alignment)
    }

    #[inline]
    unsafe fn release(&self, ptr: NonNull<u8>) {
        // SAFETY: forwarded to the caller.
        unsafe { (**self).release(ptr) }
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }

    #[inline]
    unsafe fn zero(&self, ptr: NonNull<u8>, bytes: usize) {
        // SAFETY: forwarded to the caller.
        unsafe { (**self).zero(ptr, bytes) }
    }

    #[inline]
    unsafe fn copy(&self, src: NonNull<u8>, dst: NonNull<u8>, bytes: usize) {
        // SAFETY: forwarded to the caller.
        unsafe { (**self).copy(src, dst, bytes) }
    }
}

/// Type-erased backend, used when the backend is chosen from configuration.
pub type DynBackend = Box<dyn Backend>;
