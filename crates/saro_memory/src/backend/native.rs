//! # Native Backend
//!
//! Platform heap through `std::alloc`.
//!
//! `std::alloc::dealloc` needs the original layout, but callers of
//! [`Backend::release`] only hold an address. Every block therefore carries a
//! hidden prefix right in front of the returned pointer:
//!
//! ```text
//! base                                 returned pointer
//! │                                    │
//! ▼                                    ▼
//! ┌──────────────┬──────────┬──────────┬──────────────────────┐
//! │ padding      │ size     │ align    │ usable region ...    │
//! └──────────────┴──────────┴──────────┴──────────────────────┘
//! │◄──────────── header (multiple of align) ─────────►│
//! ```

#![allow(unsafe_code)]

use std::alloc::{self, Layout};
use std::mem;
use std::ptr::NonNull;

use super::Backend;
use crate::error::{MemoryError, MemoryResult};

/// Bytes of bookkeeping stored right before the usable region.
const PREFIX_BYTES: usize = 2 * mem::size_of::<usize>();

/// The platform heap.
#[derive(Clone, Copy, Debug, Default)]
pub struct NativeBackend;

impl NativeBackend {
    /// Creates the native backend.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Header size for a given alignment. Always a multiple of `alignment`
    /// and large enough for the prefix, since both are powers of two.
    #[inline]
    const fn header_bytes(alignment: usize) -> usize {
        if alignment > PREFIX_BYTES {
            alignment
        } else {
            PREFIX_BYTES
        }
    }

    fn layout_for(bytes: usize, alignment: usize) -> MemoryResult<Layout> {
        let invalid = MemoryError::InvalidLayout { bytes, alignment };
        if !alignment.is_power_of_two() {
            return Err(invalid);
        }
        let alignment = alignment.max(mem::align_of::<usize>());
        let total = bytes
            .checked_add(Self::header_bytes(alignment))
            .ok_or(MemoryError::InvalidLayout { bytes, alignment })?;
        Layout::from_size_align(total, alignment).map_err(|_| invalid)
    }
}

// SAFETY: every region comes from `std::alloc::alloc` with a layout that
// covers the header plus the requested bytes, and is returned exactly once.
unsafe impl Backend for NativeBackend {
    fn allocate(&self, bytes: usize, alignment: usize) -> MemoryResult<NonNull<u8>> {
        let layout = Self::layout_for(bytes, alignment)?;
        let header = Self::header_bytes(layout.align());

        // SAFETY: the layout has a non-zero size (the header is never empty).
        let base = unsafe { alloc::alloc(layout) };
        let Some(base) = NonNull::new(base) else {
            return Err(MemoryError::OutOfMemory {
                requested: bytes,
                alignment,
            });
        };

        // SAFETY: `header <= layout.size()`, so the user pointer and the
        // prefix words in front of it are inside the block. The prefix is
        // usize-aligned because the user pointer is aligned to at least
        // `align_of::<usize>()` and `PREFIX_BYTES` is a multiple of it.
        unsafe {
            let user = base.as_ptr().add(header);
            let prefix = user.sub(PREFIX_BYTES).cast::<usize>();
            prefix.write(layout.size());
            prefix.add(1).write(layout.align());
            Ok(NonNull::new_unchecked(user))
        }
    }

    unsafe fn release(&self, ptr: NonNull<u8>) {
        // SAFETY: `ptr` came from `allocate`, so the prefix in front of it
        // holds the layout the block was allocated with.
        unsafe {
            let prefix = ptr.as_ptr().sub(PREFIX_BYTES).cast::<usize>();
            let size = prefix.read();
            let align = prefix.add(1).read();
            let base = ptr.as_ptr().sub(Self::header_bytes(align));
            alloc::dealloc(base, Layout::from_size_align_unchecked(size, align));
        }
    }

    fn name(&self) -> &'static str {
        "native"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_respects_alignment() {
        let backend = NativeBackend::new();
        for alignment in [1, 8, 16, 64, 256, 4096] {
            let ptr = backend.allocate(100, alignment).unwrap();
            assert_eq!(ptr.as_ptr() as usize % alignment, 0);
            // SAFETY: fresh 100-byte region.
            unsafe {
                backend.zero(ptr, 100);
                backend.release(ptr);
            }
        }
    }

    #[test]
    fn test_zero_byte_allocations_are_unique() {
        let backend = NativeBackend::new();
        let a = backend.allocate(0, 16).unwrap();
        let b = backend.allocate(0, 16).unwrap();
        assert_ne!(a, b);
        // SAFETY: both live and from this backend.
        unsafe {
            backend.release(a);
            backend.release(b);
        }
    }

    #[test]
    fn test_rejects_bad_alignment() {
        let backend = NativeBackend::new();
        assert!(matches!(
            backend.allocate(8, 3),
            Err(MemoryError::InvalidLayout { .. })
        ));
    }

    #[test]
    fn test_rejects_unrepresentable_size() {
        let backend = NativeBackend::new();
        assert!(matches!(
            backend.allocate(usize::MAX - 4, 16),
            Err(MemoryError::InvalidLayout { .. })
        ));
    }

    #[test]
    fn test_region_is_writable() {
        let backend = NativeBackend::new();
        let src = backend.allocate(32, 16).unwrap();
        let dst = backend.allocate(32, 16).unwrap();
        // SAFETY: both regions are 32 bytes and disjoint.
        unsafe {
            std::ptr::write_bytes(src.as_ptr(), 0xAB, 32);
            backend.copy(src, dst, 32);
            let view = std::slice::from_raw_parts(dst.as_ptr(), 32);
            assert!(view.iter().all(|&b| b == 0xAB));
            backend.release(src);
            backend.release(dst);
        }
    }
}
