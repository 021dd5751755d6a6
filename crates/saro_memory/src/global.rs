//! # Process-Wide Heap
//!
//! A default heap shared by the whole process, plus free functions that
//! forward to it. The `debug-memory` feature swaps the plain heap for the
//! guarded one without changing any signature.

#![allow(unsafe_code)]

use crate::address::Address;
use crate::backend::NativeBackend;
use crate::error::MemoryResult;
use crate::heap::Heap;
use crate::kind::AllocatorKind;

/// Freed regions the process-wide guarded heap keeps mapped, so that a
/// second free of any of them reads the poisoned header.
#[cfg(feature = "debug-memory")]
pub const GLOBAL_QUARANTINE_DEPTH: usize = 1024;

/// Heap type behind [`heap`].
#[cfg(feature = "debug-memory")]
pub type DefaultHeap =
    crate::heap::GuardedHeap<crate::backend::QuarantineBackend<NativeBackend>>;

/// Heap type behind [`heap`].
#[cfg(not(feature = "debug-memory"))]
pub type DefaultHeap = crate::heap::PlainHeap<NativeBackend>;

#[cfg(feature = "debug-memory")]
static HEAP: DefaultHeap = DefaultHeap::new(crate::backend::QuarantineBackend::new(
    NativeBackend::new(),
    GLOBAL_QUARANTINE_DEPTH,
));

#[cfg(not(feature = "debug-memory"))]
static HEAP: DefaultHeap = DefaultHeap::new(NativeBackend::new());

/// The process-wide heap.
#[inline]
#[must_use]
pub fn heap() -> &'static DefaultHeap {
    &HEAP
}

/// Allocates `bytes` bytes from the process-wide heap.
///
/// # Errors
///
/// See [`Heap::alloc`].
#[inline]
pub fn alloc(bytes: usize, kind: AllocatorKind, clear: bool) -> MemoryResult<Address> {
    HEAP.alloc(bytes, kind, clear)
}

/// Allocates `count` values of `T` from the process-wide heap.
///
/// # Errors
///
/// See [`Heap::alloc_typed`].
#[inline]
pub fn alloc_typed<T: 'static>(
    count: usize,
    kind: AllocatorKind,
    clear: bool,
) -> MemoryResult<Address> {
    HEAP.alloc_typed::<T>(count, kind, clear)
}

/// Reallocates a region of the process-wide heap.
///
/// # Safety
///
/// See [`Heap::realloc`].
///
/// # Errors
///
/// See [`Heap::realloc`].
#[inline]
pub unsafe fn realloc(
    old: Address,
    new_bytes: usize,
    kind: AllocatorKind,
    copy_bytes: usize,
    copy: bool,
    mem_clear: bool,
) -> MemoryResult<Address> {
    // SAFETY: forwarded to the caller.
    unsafe { HEAP.realloc(old, new_bytes, kind, copy_bytes, copy, mem_clear) }
}

/// Reallocates a region of the process-wide heap, counting in `T`.
///
/// # Safety
///
/// See [`Heap::realloc_typed`].
///
/// # Errors
///
/// See [`Heap::realloc_typed`].
#[inline]
pub unsafe fn realloc_typed<T: 'static>(
    old: Address,
    new_count: usize,
    kind: AllocatorKind,
    copy_count: usize,
    copy: bool,
    mem_clear: bool,
) -> MemoryResult<Address> {
    // SAFETY: forwarded to the caller.
    unsafe { HEAP.realloc_typed::<T>(old, new_count, kind, copy_count, copy, mem_clear) }
}

/// Frees a region of the process-wide heap.
///
/// # Safety
///
/// See [`Heap::free`].
#[inline]
pub unsafe fn free(address: Address, kind: AllocatorKind) {
    // SAFETY: forwarded to the caller.
    unsafe { HEAP.free(address, kind) }
}

/// Checks the envelope of a live region without freeing it.
///
/// Always `Ok` unless built with `debug-memory`.
///
/// # Safety
///
/// See [`Heap::verify`].
///
/// # Errors
///
/// `BoundaryViolation` if a canary was overwritten.
#[inline]
pub unsafe fn verify(address: Address) -> MemoryResult<()> {
    // SAFETY: forwarded to the caller.
    unsafe { HEAP.verify(address) }
}
