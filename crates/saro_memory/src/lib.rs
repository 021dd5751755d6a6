//! # SARO Memory
//!
//! Unmanaged memory primitives for engine code that works on raw regions:
//! - Allocation, reallocation and release tagged with an [`AllocatorKind`]
//! - Raw clear/set/move/copy over typed element ranges
//! - Cached per-type sizes and 4-byte alignment helpers
//! - Plain-old-data marshalling between structs and byte buffers
//! - An optional canary envelope that catches overruns and double frees
//!
//! ## Architecture Rules
//!
//! 1. **One heap contract** - Plain and guarded heaps share [`Heap`]
//! 2. **Backends are swappable** - The system allocator sits behind [`Backend`]
//! 3. **Checks cost nothing when off** - Guards are a type, not a branch
//!
//! ## Example
//!
//! ```rust
//! # #![allow(unsafe_code)]
//! use saro_memory::{global, AllocatorKind};
//!
//! let data = global::alloc_typed::<u32>(4, AllocatorKind::Persistent, true).unwrap();
//! // SAFETY: `data` holds four zeroed u32 values.
//! unsafe {
//!     assert!(data.as_slice(16).iter().all(|&b| b == 0));
//!     global::free(data, AllocatorKind::Persistent);
//! }
//! ```

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]
#![allow(clippy::module_name_repetitions)]

pub mod address;
pub mod backend;
pub mod config;
pub mod error;
pub mod global;
pub mod heap;
pub mod kind;
pub mod ops;
pub mod sizing;

pub use address::Address;
pub use backend::{Backend, DynBackend, NativeBackend, QuarantineBackend};
pub use config::MemoryConfig;
pub use error::{EnvelopeRegion, MemoryError, MemoryResult};
pub use global::DefaultHeap;
pub use heap::{
    ConfiguredHeap, GuardedHeap, Heap, PlainHeap, CANARY, ENVELOPE_BYTES, OPTIMAL_ALIGNMENT,
};
pub use kind::AllocatorKind;
pub use ops::{
    bytes_to_struct, element_mut, mem_clear, mem_clear_typed, mem_copy, mem_move, mem_set,
    struct_to_bytes, write_struct, write_u32_bytes,
};
pub use sizing::{align4, pad4, size_of, size_of_aligned, type_layout, TypeLayout};
