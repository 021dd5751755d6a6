//! # Allocator Kinds
//!
//! Tags attached to every allocation describing who owns its lifetime.

use serde::{Deserialize, Serialize};

/// Lifetime class of an allocation.
///
/// Only the heap-backed kinds (`Temporary`, `TemporaryJob`, `Persistent`)
/// reach the backend. `Temporary` and `TemporaryJob` are scheduling hints for
/// the host runtime and behave exactly like `Persistent` here: the caller
/// must free them explicitly.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum AllocatorKind {
    /// Not a usable allocator.
    #[default]
    Invalid = 0,
    /// No allocation needed.
    None = 1,
    /// Frame-scoped scratch allocation.
    Temporary = 2,
    /// Task-scoped scratch allocation.
    TemporaryJob = 3,
    /// Native allocation that must be freed explicitly.
    Persistent = 4,
    /// Memory owned by a garbage-collected object. Never freed here.
    Managed = 5,
}

impl AllocatorKind {
    /// Whether allocations of this kind are served by the backend.
    #[inline]
    #[must_use]
    pub const fn is_heap(self) -> bool {
        matches!(self, Self::Temporary | Self::TemporaryJob | Self::Persistent)
    }

    /// Whether this kind means "nothing to allocate" rather than an error.
    #[inline]
    #[must_use]
    pub const fn is_unallocated(self) -> bool {
        matches!(self, Self::None | Self::Managed)
    }

    /// Converts from u8 to an allocator kind. Unknown values are `Invalid`.
    #[inline]
    #[must_use]
    pub const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::None,
            2 => Self::Temporary,
            3 => Self::TemporaryJob,
            4 => Self::Persistent,
            5 => Self::Managed,
            _ => Self::Invalid,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heap_kinds() {
        assert!(AllocatorKind::Persistent.is_heap());
        assert!(AllocatorKind::Temporary.is_heap());
        assert!(AllocatorKind::TemporaryJob.is_heap());
        assert!(!AllocatorKind::Managed.is_heap());
        assert!(!AllocatorKind::None.is_heap());
        assert!(!AllocatorKind::Invalid.is_heap());
    }

    #[test]
    fn test_from_u8() {
        for kind in [
            AllocatorKind::Invalid,
            AllocatorKind::None,
            AllocatorKind::Temporary,
            AllocatorKind::TemporaryJob,
            AllocatorKind::Persistent,
            AllocatorKind::Managed,
        ] {
            assert_eq!(AllocatorKind::from_u8(kind as u8), kind);
        }
        assert_eq!(AllocatorKind::from_u8(200), AllocatorKind::Invalid);
    }
}
