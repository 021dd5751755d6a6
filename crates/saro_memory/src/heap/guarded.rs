//! # Guarded Heap
//!
//! Debug heap that signs every allocation with boundary canaries.
//!
//! ## Envelope
//!
//! ```text
//! base                                  returned address
//! │                                     │
//! ▼                                     ▼
//! ┌───────────────────────┬────────────┬──────────────────┬───────────────────────┐
//! │ 15 × 0xDEADBEEF       │ capacity   │ usable region    │ 16 × 0xDEADBEEF       │
//! │ (60 bytes)            │ (u32)      │ (capacity bytes) │ (64 bytes)            │
//! └───────────────────────┴────────────┴──────────────────┴───────────────────────┘
//! ```
//!
//! Per allocation: `Unsigned -> Signed` on alloc, `Signed -> Freed` on free.
//! Free verifies every canary word before releasing and overwrites the
//! leading words with [`FREED_MARK`], so freeing the same address again
//! fails verification as long as the memory is still mapped (see
//! [`QuarantineBackend`](crate::backend::QuarantineBackend)).
//!
//! Any mismatch is fatal: the violation is logged and the heap panics rather
//! than hand corrupted memory back to the backend.

#![allow(unsafe_code)]

use std::ptr::NonNull;

use super::{check_alignment, copy_with, route_alloc, zero_with, Heap, OPTIMAL_ALIGNMENT};
use crate::address::Address;
use crate::backend::{Backend, NativeBackend};
use crate::error::{EnvelopeRegion, MemoryError, MemoryResult};
use crate::kind::AllocatorKind;

/// Sentinel written into every canary word.
pub const CANARY: u32 = 0xDEAD_BEEF;

/// Value written over the leading canaries when a region is freed.
pub const FREED_MARK: u32 = 0xFEEE_FEEE;

const WORD: usize = std::mem::size_of::<u32>();
const LEADING_WORDS: usize = 15;
const TRAILING_WORDS: usize = 16;

/// Canary words plus the capacity field in front of the usable region.
pub const HEADER_BYTES: usize = LEADING_WORDS * WORD + WORD;

/// Canary words behind the usable region.
pub const TRAILER_BYTES: usize = TRAILING_WORDS * WORD;

/// Total per-allocation overhead of the envelope.
pub const ENVELOPE_BYTES: usize = HEADER_BYTES + TRAILER_BYTES;

/// Heap that wraps every region in a verified canary envelope.
///
/// Returned addresses have the same alignment as a [`PlainHeap`]'s because
/// the header length is a multiple of the alignment.
///
/// [`PlainHeap`]: super::PlainHeap
#[derive(Debug)]
pub struct GuardedHeap<B: Backend = NativeBackend> {
    backend: B,
    alignment: usize,
}

impl<B: Backend> GuardedHeap<B> {
    /// Creates a guarded heap over `backend` with [`OPTIMAL_ALIGNMENT`].
    #[must_use]
    pub const fn new(backend: B) -> Self {
        Self {
            backend,
            alignment: OPTIMAL_ALIGNMENT,
        }
    }

    /// Creates a guarded heap with a custom alignment.
    ///
    /// # Errors
    ///
    /// `Config` if `alignment` is not a power of two of at least the word
    /// size, or exceeds [`HEADER_BYTES`].
    pub fn with_alignment(backend: B, alignment: usize) -> MemoryResult<Self> {
        let alignment = check_alignment(alignment)?;
        if alignment > HEADER_BYTES {
            return Err(MemoryError::Config(format!(
                "guarded heaps support alignments up to {HEADER_BYTES}, got {alignment}"
            )));
        }
        Ok(Self { backend, alignment })
    }

    /// The backing backend.
    #[inline]
    #[must_use]
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    /// Writes the envelope around a region of `capacity` usable bytes.
    ///
    /// # Safety
    ///
    /// `base` must be valid for `capacity + ENVELOPE_BYTES` bytes and
    /// aligned to at least 4.
    unsafe fn sign(base: NonNull<u8>, capacity: u32) -> Address {
        let base = base.as_ptr();
        // SAFETY: all writes stay inside `capacity + ENVELOPE_BYTES` bytes.
        // Leading words are 4-aligned; trailing words may not be.
        unsafe {
            let leading = base.cast::<u32>();
            for i in 0..LEADING_WORDS {
                leading.add(i).write(CANARY);
            }
            leading.add(LEADING_WORDS).write(capacity);

            let trailing = base.add(HEADER_BYTES + capacity as usize);
            for i in 0..TRAILING_WORDS {
                trailing.add(i * WORD).cast::<u32>().write_unaligned(CANARY);
            }

            Address::from_non_null(NonNull::new_unchecked(base.add(HEADER_BYTES)))
        }
    }

    /// Verifies the envelope and returns the base pointer.
    ///
    /// # Safety
    ///
    /// `address` must be non-null and point `HEADER_BYTES` past a mapped
    /// envelope produced by this heap.
    unsafe fn unsign(address: Address) -> MemoryResult<NonNull<u8>> {
        // SAFETY: the caller guarantees the header in front of `address` is
        // mapped; the capacity field then bounds the trailer read.
        unsafe {
            let base = address.as_ptr().sub(HEADER_BYTES);
            let leading = base.cast::<u32>();
            for i in 0..LEADING_WORDS {
                let found = leading.add(i).read();
                if found != CANARY {
                    return Err(MemoryError::BoundaryViolation {
                        address: address.addr(),
                        region: EnvelopeRegion::Leading,
                        offset: i * WORD,
                        found,
                    });
                }
            }

            let capacity = leading.add(LEADING_WORDS).read() as usize;
            let trailing = base.add(HEADER_BYTES + capacity);
            for i in 0..TRAILING_WORDS {
                let found = trailing.add(i * WORD).cast::<u32>().read_unaligned();
                if found != CANARY {
                    return Err(MemoryError::BoundaryViolation {
                        address: address.addr(),
                        region: EnvelopeRegion::Trailing,
                        offset: i * WORD,
                        found,
                    });
                }
            }

            Ok(NonNull::new_unchecked(base))
        }
    }

    /// Logs and aborts on a broken allocation contract.
    #[cold]
    #[inline(never)]
    fn fatal(err: &MemoryError) -> ! {
        match err {
            MemoryError::BoundaryViolation { found, .. } if *found == FREED_MARK => {
                tracing::error!("{} (region already freed)", err);
            }
            _ => tracing::error!("{}", err),
        }
        panic!("{err}");
    }
}

impl<B: Backend> Heap for GuardedHeap<B> {
    fn alloc(&self, bytes: usize, kind: AllocatorKind, clear: bool) -> MemoryResult<Address> {
        if !route_alloc(kind)? {
            return Ok(Address::null());
        }

        let invalid = MemoryError::InvalidLayout {
            bytes,
            alignment: self.alignment,
        };
        let capacity = u32::try_from(bytes).map_err(|_| invalid)?;
        let total = bytes
            .checked_add(ENVELOPE_BYTES)
            .ok_or(MemoryError::InvalidLayout {
                bytes,
                alignment: self.alignment,
            })?;

        let base = self.backend.allocate(total, self.alignment)?;
        // SAFETY: `base` is a fresh region of `total` bytes, aligned to at
        // least 8.
        let address = unsafe {
            if clear && bytes > 0 {
                self.backend
                    .zero(NonNull::new_unchecked(base.as_ptr().add(HEADER_BYTES)), bytes);
            }
            Self::sign(base, capacity)
        };

        tracing::trace!(
            "alloc {} bytes at {} ({:?}, guarded)",
            bytes,
            address,
            kind
        );
        Ok(address)
    }

    unsafe fn free(&self, address: Address, kind: AllocatorKind) {
        if address.is_null() {
            return;
        }
        if !kind.is_heap() {
            Self::fatal(&MemoryError::InvalidUsage {
                kind,
                operation: "free",
            });
        }

        // SAFETY: forwarded to the caller; a region freed earlier but still
        // parked in a quarantine is mapped and fails on `FREED_MARK`.
        let base = match unsafe { Self::unsign(address) } {
            Ok(base) => base,
            Err(err) => Self::fatal(&err),
        };

        // SAFETY: the header was just verified, so it is ours to overwrite.
        unsafe {
            let leading = base.as_ptr().cast::<u32>();
            for i in 0..LEADING_WORDS {
                leading.add(i).write(FREED_MARK);
            }
        }

        tracing::trace!("free {} ({:?}, guarded)", address, kind);
        // SAFETY: `base` is the pointer the backend returned for this region.
        unsafe { self.backend.release(base) };
    }

    unsafe fn verify(&self, address: Address) -> MemoryResult<()> {
        if address.is_null() {
            return Ok(());
        }
        // SAFETY: forwarded to the caller.
        unsafe { Self::unsign(address) }.map(|_| ())
    }

    fn envelope_bytes(&self) -> usize {
        ENVELOPE_BYTES
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::QuarantineBackend;

    fn quarantined() -> GuardedHeap<QuarantineBackend<NativeBackend>> {
        GuardedHeap::new(QuarantineBackend::new(NativeBackend::new(), 8))
    }

    #[test]
    fn test_envelope_constants() {
        assert_eq!(HEADER_BYTES, 64);
        assert_eq!(TRAILER_BYTES, 64);
        assert_eq!(ENVELOPE_BYTES, 128);
        assert_eq!(HEADER_BYTES % OPTIMAL_ALIGNMENT, 0);
    }

    #[test]
    fn test_alloc_is_aligned_and_verified() {
        let heap = GuardedHeap::new(NativeBackend::new());
        for n in [0, 1, 3, 17, 64, 1000] {
            let addr = heap.alloc(n, AllocatorKind::Persistent, true).unwrap();
            assert_eq!(addr.addr() % OPTIMAL_ALIGNMENT, 0);
            // SAFETY: live region of `n` bytes from `heap`.
            unsafe {
                assert!(addr.as_slice(n).iter().all(|&b| b == 0));
                heap.verify(addr).unwrap();
                heap.free(addr, AllocatorKind::Persistent);
            }
        }
    }

    #[test]
    fn test_full_usable_region_is_safe_to_write() {
        let heap = GuardedHeap::new(NativeBackend::new());
        let addr = heap.alloc(33, AllocatorKind::Persistent, false).unwrap();
        // SAFETY: writes stay inside the 33 usable bytes.
        unsafe {
            addr.as_mut_slice(33).fill(0xCC);
            heap.verify(addr).unwrap();
            heap.free(addr, AllocatorKind::Persistent);
        }
    }

    #[test]
    fn test_verify_reports_trailing_overrun() {
        let heap = GuardedHeap::new(NativeBackend::new());
        let addr = heap.alloc(10, AllocatorKind::Persistent, true).unwrap();
        // SAFETY: the overrun byte is inside the trailer, which is mapped.
        unsafe {
            *addr.byte_add(10) = 0x00;
            let err = heap.verify(addr).unwrap_err();
            assert!(matches!(
                err,
                MemoryError::BoundaryViolation {
                    region: EnvelopeRegion::Trailing,
                    offset: 0,
                    ..
                }
            ));
            // Repair so the region can be released normally.
            *addr.byte_add(10) = CANARY.to_ne_bytes()[0];
            heap.free(addr, AllocatorKind::Persistent);
        }
    }

    #[test]
    fn test_verify_reports_leading_underrun() {
        let heap = GuardedHeap::new(NativeBackend::new());
        let addr = heap.alloc(10, AllocatorKind::Persistent, true).unwrap();
        // SAFETY: the leading canaries sit inside the envelope.
        unsafe {
            let word = addr.as_ptr().sub(HEADER_BYTES).cast::<u32>();
            word.write(0x1234_5678);
            let err = heap.verify(addr).unwrap_err();
            assert!(matches!(
                err,
                MemoryError::BoundaryViolation {
                    region: EnvelopeRegion::Leading,
                    found: 0x1234_5678,
                    ..
                }
            ));
            word.write(CANARY);
            heap.free(addr, AllocatorKind::Persistent);
        }
    }

    #[test]
    #[should_panic(expected = "memory boundary violated")]
    fn test_free_panics_on_trailing_overrun() {
        let heap = quarantined();
        let addr = heap.alloc(16, AllocatorKind::Persistent, true).unwrap();
        // SAFETY: the overwritten word is inside the trailer.
        unsafe {
            addr.byte_add(16 + 8).cast::<u32>().write_unaligned(0);
            heap.free(addr, AllocatorKind::Persistent);
        }
    }

    #[test]
    #[should_panic(expected = "memory boundary violated")]
    fn test_double_free_is_detected() {
        let heap = quarantined();
        let addr = heap.alloc(16, AllocatorKind::Persistent, true).unwrap();
        // SAFETY: the quarantine keeps the region mapped after the first free.
        unsafe {
            heap.free(addr, AllocatorKind::Persistent);
            heap.free(addr, AllocatorKind::Persistent);
        }
    }

    #[test]
    #[should_panic(expected = "invalid usage")]
    fn test_free_managed_is_fatal() {
        let heap = quarantined();
        let addr = heap.alloc(16, AllocatorKind::Persistent, true).unwrap();
        // SAFETY: the call panics before touching the region.
        unsafe { heap.free(addr, AllocatorKind::Managed) };
    }

    #[test]
    fn test_envelope_bytes() {
        let heap = GuardedHeap::new(NativeBackend::new());
        assert_eq!(heap.envelope_bytes(), ENVELOPE_BYTES);
    }

    #[test]
    fn test_with_alignment_bounds() {
        assert!(GuardedHeap::with_alignment(NativeBackend::new(), 64).is_ok());
        assert!(GuardedHeap::with_alignment(NativeBackend::new(), 128).is_err());
    }
}
