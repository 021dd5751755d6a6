//! # Memory Error Types
//!
//! All errors that can occur in the memory layer.

use thiserror::Error;

use crate::kind::AllocatorKind;

/// Which side of a debug envelope failed verification.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnvelopeRegion {
    /// The canary words in front of the usable region.
    Leading,
    /// The canary words behind the usable region.
    Trailing,
}

impl std::fmt::Display for EnvelopeRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Leading => f.write_str("leading"),
            Self::Trailing => f.write_str("trailing"),
        }
    }
}

/// Errors that can occur in the memory layer.
#[derive(Error, Debug)]
pub enum MemoryError {
    /// The backend could not satisfy an allocation request.
    #[error("out of memory: requested {requested} bytes aligned to {alignment}")]
    OutOfMemory {
        /// Number of bytes requested from the backend.
        requested: usize,
        /// Requested alignment.
        alignment: usize,
    },

    /// The size/alignment pair cannot be described as a layout.
    #[error("invalid layout: {bytes} bytes aligned to {alignment}")]
    InvalidLayout {
        /// Number of bytes requested.
        bytes: usize,
        /// Requested alignment.
        alignment: usize,
    },

    /// Converting an element count into bytes overflowed.
    #[error("size overflow: {count} elements of {element_size} bytes")]
    SizeOverflow {
        /// Element count.
        count: usize,
        /// Size of one element in bytes.
        element_size: u32,
    },

    /// The caller broke the allocation contract.
    #[error("invalid usage: {operation} with allocator {kind:?}")]
    InvalidUsage {
        /// Allocator kind passed by the caller.
        kind: AllocatorKind,
        /// Operation that was attempted.
        operation: &'static str,
    },

    /// A canary word of a debug envelope was overwritten.
    #[error(
        "memory boundary violated: {region} canary at {address:#x}+{offset} was {found:#010x}"
    )]
    BoundaryViolation {
        /// Usable address the caller passed in.
        address: usize,
        /// Envelope side that failed.
        region: EnvelopeRegion,
        /// Byte offset of the bad word inside that region.
        offset: usize,
        /// Value found instead of the canary.
        found: u32,
    },

    /// A byte range does not fit inside the caller's buffer.
    #[error("out of bounds: {start}..{start}+{length} in buffer of {buffer_len} bytes")]
    OutOfBounds {
        /// Start index.
        start: usize,
        /// Number of bytes.
        length: usize,
        /// Length of the buffer.
        buffer_len: usize,
    },

    /// A marshalling length larger than the value it describes.
    #[error("invalid length: {length} bytes for a value of {size} bytes")]
    InvalidLength {
        /// Requested length.
        length: usize,
        /// Size of the value type.
        size: usize,
    },

    /// Invalid configuration file.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Configuration file could not be read.
    #[error("config io: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for memory operations.
pub type MemoryResult<T> = Result<T, MemoryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundary_violation_message() {
        let err = MemoryError::BoundaryViolation {
            address: 0x1000,
            region: EnvelopeRegion::Trailing,
            offset: 8,
            found: 0x4141_4141,
        };
        let msg = err.to_string();
        assert!(msg.starts_with("memory boundary violated"));
        assert!(msg.contains("trailing"));
        assert!(msg.contains("0x41414141"));
    }

    #[test]
    fn test_invalid_usage_names_kind() {
        let err = MemoryError::InvalidUsage {
            kind: AllocatorKind::Managed,
            operation: "free",
        };
        assert_eq!(err.to_string(), "invalid usage: free with allocator Managed");
    }
}
