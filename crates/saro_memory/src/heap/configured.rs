//! # Configured Heap
//!
//! Heap whose guard mode and backend are picked at construction time from a
//! [`MemoryConfig`].

#![allow(unsafe_code)]

use super::{GuardedHeap, Heap, PlainHeap};
use crate::address::Address;
use crate::backend::{DynBackend, NativeBackend, QuarantineBackend};
use crate::config::MemoryConfig;
use crate::error::MemoryResult;
use crate::kind::AllocatorKind;

/// A plain or guarded heap over a type-erased backend.
pub enum ConfiguredHeap {
    /// No envelope.
    Plain(PlainHeap<DynBackend>),
    /// Canary envelope on every allocation.
    Guarded(GuardedHeap<DynBackend>),
}

impl ConfiguredHeap {
    /// Builds the heap described by `config`.
    ///
    /// # Errors
    ///
    /// `Config` if the configuration does not validate.
    pub fn from_config(config: &MemoryConfig) -> MemoryResult<Self> {
        config.validate()?;

        let backend: DynBackend = if config.quarantine_depth > 0 {
            Box::new(QuarantineBackend::new(
                NativeBackend::new(),
                config.quarantine_depth,
            ))
        } else {
            Box::new(NativeBackend::new())
        };
        let alignment = config.alignment();

        let heap = if config.guard_boundaries {
            Self::Guarded(GuardedHeap::with_alignment(backend, alignment)?)
        } else {
            Self::Plain(PlainHeap::with_alignment(backend, alignment)?)
        };

        tracing::debug!(
            "built {} heap: backend={} alignment={} envelope={}",
            if heap.is_guarded() { "guarded" } else { "plain" },
            heap.backend_name(),
            heap.alignment(),
            heap.envelope_bytes()
        );
        Ok(heap)
    }

    /// Whether allocations carry a canary envelope.
    #[inline]
    #[must_use]
    pub const fn is_guarded(&self) -> bool {
        matches!(self, Self::Guarded(_))
    }
}

impl Heap for ConfiguredHeap {
    fn alloc(&self, bytes: usize, kind: AllocatorKind, clear: bool) -> MemoryResult<Address> {
        match self {
            Self::Plain(heap) => heap.alloc(bytes, kind, clear),
            Self::Guarded(heap) => heap.alloc(bytes, kind, clear),
        }
    }

    unsafe fn free(&self, address: Address, kind: AllocatorKind) {
        // SAFETY: forwarded to the caller.
        unsafe {
            match self {
                Self::Plain(heap) => heap.free(address, kind),
                Self::Guarded(heap) => heap.free(address, kind),
            }
        }
    }

    unsafe fn verify(&self, address: Address) -> MemoryResult<()> {
        // SAFETY: forwarded to the caller.
        unsafe {
            match self {
                Self::Plain(heap) => heap.verify(address),
                Self::Guarded(heap) => heap.verify(address),
            }
        }
    }

    fn envelope_bytes(&self) -> usize {
        match self {
            Self::Plain(heap) => heap.envelope_bytes(),
            Self::Guarded(heap) => heap.envelope_bytes(),
        }
    }

    fn alignment(&self) -> usize {
        match self {
            Self::Plain(heap) => heap.alignment(),
            Self::Guarded(heap) => heap.alignment(),
        }
    }

    fn backend_name(&self) -> &'static str {
        match self {
            Self::Plain(heap) => heap.backend_name(),
            Self::Guarded(heap) => heap.backend_name(),
        }
    }

    unsafe fn backend_copy(&self, source: Address, destination: Address, bytes: usize) {
        // SAFETY: forwarded to the caller.
        unsafe {
            match self {
                Self::Plain(heap) => heap.backend_copy(source, destination, bytes),
                Self::Guarded(heap) => heap.backend_copy(source, destination, bytes),
            }
        }
    }

    unsafe fn backend_zero(&self, destination: Address, bytes: usize) {
        // SAFETY: forwarded to the caller.
        unsafe {
            match self {
                Self::Plain(heap) => heap.backend_zero(destination, bytes),
                Self::Guarded(heap) => heap.backend_zero(destination, bytes),
            }
        }
    }
}
