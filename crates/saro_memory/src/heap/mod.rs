//! # Heaps
//!
//! The allocation API: kind routing, zeroing policy and copy-preserving
//! growth on top of a [`Backend`](crate::backend::Backend).
//!
//! ## Implementations
//!
//! ```text
//!                 ┌──────────────┐
//!                 │  trait Heap  │  alloc / realloc / free / verify
//!                 └──────┬───────┘
//!          ┌─────────────┼───────────────┐
//!          ▼             ▼               ▼
//!   ┌────────────┐ ┌─────────────┐ ┌────────────────┐
//!   │ PlainHeap  │ │ GuardedHeap │ │ ConfiguredHeap │
//!   │ (no check) │ │  (canaries) │ │ (from config)  │
//!   └────────────┘ └─────────────┘ └────────────────┘
//! ```
//!
//! Both concrete heaps return addresses of identical shape; the guarded one
//! only adds a fixed envelope around each region and verifies it on free.

#![allow(unsafe_code)]

mod configured;
mod guarded;
mod plain;

use crate::address::Address;
use crate::backend::Backend;
use crate::error::{MemoryError, MemoryResult};
use crate::kind::AllocatorKind;
use crate::sizing;

pub use configured::ConfiguredHeap;
pub use guarded::{GuardedHeap, CANARY, ENVELOPE_BYTES, FREED_MARK, HEADER_BYTES, TRAILER_BYTES};
pub use plain::PlainHeap;

/// Alignment of every region handed out by a heap: 16 bytes on 64-bit
/// targets, 8 otherwise.
#[cfg(target_pointer_width = "64")]
pub const OPTIMAL_ALIGNMENT: usize = 16;

/// Alignment of every region handed out by a heap: 16 bytes on 64-bit
/// targets, 8 otherwise.
#[cfg(not(target_pointer_width = "64"))]
pub const OPTIMAL_ALIGNMENT: usize = 8;

/// Checks a heap alignment: a power of two no smaller than the word size.
pub(crate) fn check_alignment(alignment: usize) -> MemoryResult<usize> {
    if alignment.is_power_of_two() && alignment >= std::mem::size_of::<usize>() {
        Ok(alignment)
    } else {
        Err(MemoryError::Config(format!(
            "alignment {alignment} must be a power of two of at least {}",
            std::mem::size_of::<usize>()
        )))
    }
}

/// Manual allocation API over raw addresses.
///
/// The API is not self-describing: every region has a byte length known only
/// to the caller, and passing a different length to later operations is
/// undefined behavior.
pub trait Heap: Send + Sync {
    /// Allocates `bytes` bytes for an allocation of `kind`.
    ///
    /// # Arguments
    ///
    /// * `bytes` - Usable size of the region
    /// * `kind` - Lifetime class of the allocation
    /// * `clear` - Zero the region before returning it
    ///
    /// # Returns
    ///
    /// A fresh address, or the null address for `None` and `Managed` kinds
    /// (nothing to allocate).
    ///
    /// # Errors
    ///
    /// `OutOfMemory` from the backend, `InvalidUsage` for the `Invalid` kind.
    fn alloc(&self, bytes: usize, kind: AllocatorKind, clear: bool) -> MemoryResult<Address>;

    /// Frees a region returned by [`Heap::alloc`].
    ///
    /// Freeing the null address is a no-op.
    ///
    /// # Safety
    ///
    /// `address` must be live, come from this heap, and have been allocated
    /// with a heap-backed kind. It must not be used afterwards.
    ///
    /// # Panics
    ///
    /// Guarded heaps panic when the envelope around `address` is damaged.
    unsafe fn free(&self, address: Address, kind: AllocatorKind);

    /// Checks the debug envelope of a live region without freeing it.
    ///
    /// Heaps without envelopes perform no check at all. The null address
    /// always passes.
    ///
    /// # Safety
    ///
    /// `address` must be null or a region from this heap whose envelope is
    /// still mapped.
    ///
    /// # Errors
    ///
    /// `BoundaryViolation` naming the first damaged canary word.
    unsafe fn verify(&self, address: Address) -> MemoryResult<()> {
        let _ = address;
        Ok(())
    }

    /// Bytes of instrumentation added to every allocation.
    fn envelope_bytes(&self) -> usize {
        0
    }

    /// Alignment of returned regions.
    fn alignment(&self) -> usize;

    /// Name of the backing backend, for logs.
    fn backend_name(&self) -> &'static str;

    /// Copies `bytes` bytes with the backend's copy primitive.
    ///
    /// Null addresses and zero-byte copies are no-ops.
    ///
    /// # Safety
    ///
    /// Both addresses must be valid for `bytes` bytes and must not overlap.
    unsafe fn backend_copy(&self, source: Address, destination: Address, bytes: usize);

    /// Zeroes `bytes` bytes with the backend's zero primitive.
    ///
    /// A null address or a zero-byte request is a no-op.
    ///
    /// # Safety
    ///
    /// `destination` must be valid for writes of `bytes` bytes.
    unsafe fn backend_zero(&self, destination: Address, bytes: usize);

    /// Allocates `count` values of `T`.
    ///
    /// # Errors
    ///
    /// `SizeOverflow` when the byte count does not fit, otherwise as
    /// [`Heap::alloc`].
    #[inline]
    fn alloc_typed<T: 'static>(
        &self,
        count: usize,
        kind: AllocatorKind,
        clear: bool,
    ) -> MemoryResult<Address>
    where
        Self: Sized,
    {
        self.alloc(sizing::bytes_for::<T>(count)?, kind, clear)
    }

    /// Moves a region into a new allocation of `new_bytes` bytes.
    ///
    /// The new region is cleared up front only when `!copy && mem_clear`.
    /// With `copy`, the first `min(new_bytes, copy_bytes)` bytes are carried
    /// over and, with `mem_clear`, the rest is zeroed. The old region is
    /// always freed afterwards. A null `old` allocates without copying.
    ///
    /// # Safety
    ///
    /// `old` must be null or a live region from this heap of at least
    /// `copy_bytes` bytes (when `copy`), allocated with `kind`.
    ///
    /// # Errors
    ///
    /// `InvalidUsage` when `old` is non-null and `kind` is not heap-backed,
    /// otherwise as [`Heap::alloc`]. On error `old` is untouched and still
    /// owned by the caller.
    unsafe fn realloc(
        &self,
        old: Address,
        new_bytes: usize,
        kind: AllocatorKind,
        copy_bytes: usize,
        copy: bool,
        mem_clear: bool,
    ) -> MemoryResult<Address>
    where
        Self: Sized,
    {
        if !old.is_null() && !kind.is_heap() {
            return Err(MemoryError::InvalidUsage {
                kind,
                operation: "realloc",
            });
        }

        let new = self.alloc(new_bytes, kind, !copy && mem_clear)?;

        if !new.is_null() {
            let copied = if copy && !old.is_null() {
                copy_bytes.min(new_bytes)
            } else {
                0
            };
            // SAFETY: `new` is fresh and `old` is valid for `copy_bytes`
            // bytes, so both cover `copied` bytes and cannot overlap.
            unsafe {
                self.backend_copy(old, new, copied);
                if copy && mem_clear && copied < new_bytes {
                    self.backend_zero(new.offset(copied), new_bytes - copied);
                }
            }
        }

        tracing::trace!(
            "realloc {} -> {} ({} bytes, copy={}, {:?})",
            old,
            new,
            new_bytes,
            copy,
            kind
        );

        if !old.is_null() {
            // SAFETY: forwarded to the caller.
            unsafe { self.free(old, kind) };
        }
        Ok(new)
    }

    /// Typed form of [`Heap::realloc`], counting in values of `T`.
    ///
    /// # Safety
    ///
    /// As [`Heap::realloc`], with byte counts scaled by the size of `T`.
    ///
    /// # Errors
    ///
    /// `SizeOverflow` when either count does not fit, otherwise as
    /// [`Heap::realloc`].
    unsafe fn realloc_typed<T: 'static>(
        &self,
        old: Address,
        new_count: usize,
        kind: AllocatorKind,
        copy_count: usize,
        copy: bool,
        mem_clear: bool,
    ) -> MemoryResult<Address>
    where
        Self: Sized,
    {
        let new_bytes = sizing::bytes_for::<T>(new_count)?;
        let copy_bytes = sizing::bytes_for::<T>(copy_count)?;
        // SAFETY: forwarded to the caller.
        unsafe { self.realloc(old, new_bytes, kind, copy_bytes, copy, mem_clear) }
    }
}

/// Shared body of [`Heap::backend_copy`] for heaps over a [`Backend`].
///
/// # Safety
///
/// As [`Heap::backend_copy`].
pub(crate) unsafe fn copy_with<B: Backend>(
    backend: &B,
    source: Address,
    destination: Address,
    bytes: usize,
) {
    if bytes == 0 {
        return;
    }
    if let (Some(src), Some(dst)) = (source.non_null(), destination.non_null()) {
        // SAFETY: forwarded to the caller.
        unsafe { backend.copy(src, dst, bytes) };
    }
}

/// Shared body of [`Heap::backend_zero`] for heaps over a [`Backend`].
///
/// # Safety
///
/// As [`Heap::backend_zero`].
pub(crate) unsafe fn zero_with<B: Backend>(backend: &B, destination: Address, bytes: usize) {
    if bytes == 0 {
        return;
    }
    if let Some(dst) = destination.non_null() {
        // SAFETY: forwarded to the caller.
        unsafe { backend.zero(dst, bytes) };
    }
}

/// Routes an allocation request by kind.
///
/// Returns `Ok(true)` when the backend must serve it, `Ok(false)` when there
/// is nothing to allocate.
pub(crate) fn route_alloc(kind: AllocatorKind) -> MemoryResult<bool> {
    if kind.is_heap() {
        Ok(true)
    } else if kind.is_unallocated() {
        Ok(false)
    } else {
        Err(MemoryError::InvalidUsage {
            kind,
            operation: "alloc",
        })
    }
}
