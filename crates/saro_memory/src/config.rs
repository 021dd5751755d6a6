//! # Memory Configuration
//!
//! Heap settings loaded once at startup from TOML.
//!
//! ```toml
//! guard_boundaries = true
//! quarantine_depth = 64
//! alignment = 16
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{MemoryError, MemoryResult};
use crate::heap::{HEADER_BYTES, OPTIMAL_ALIGNMENT};

/// Largest alignment a configured heap accepts.
pub const MAX_ALIGNMENT: usize = 4096;

/// Largest quarantine a configured heap accepts.
pub const MAX_QUARANTINE_DEPTH: usize = 1 << 20;

/// Settings for a [`ConfiguredHeap`](crate::heap::ConfiguredHeap).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MemoryConfig {
    /// Wrap every allocation in a canary envelope.
    ///
    /// Default: on when built with the `debug-memory` feature.
    pub guard_boundaries: bool,

    /// Number of freed regions kept mapped before their real release.
    ///
    /// Default: 0 (release immediately).
    pub quarantine_depth: usize,

    /// Alignment of returned regions.
    ///
    /// Default: [`OPTIMAL_ALIGNMENT`].
    pub alignment: Option<usize>,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            guard_boundaries: cfg!(feature = "debug-memory"),
            quarantine_depth: 0,
            alignment: None,
        }
    }
}

impl MemoryConfig {
    /// Parses a configuration from TOML text.
    ///
    /// # Errors
    ///
    /// `Config` on malformed TOML or values that do not validate.
    pub fn from_toml_str(text: &str) -> MemoryResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| MemoryError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a configuration file.
    ///
    /// # Errors
    ///
    /// `Io` if the file cannot be read, otherwise as
    /// [`MemoryConfig::from_toml_str`].
    pub fn from_toml(path: impl AsRef<Path>) -> MemoryResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        tracing::debug!("loading memory config from {}", path.display());
        Self::from_toml_str(&text)
    }

    /// Effective alignment.
    #[inline]
    #[must_use]
    pub fn alignment(&self) -> usize {
        self.alignment.unwrap_or(OPTIMAL_ALIGNMENT)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// `Config` naming the first offending field.
    pub fn validate(&self) -> MemoryResult<()> {
        let alignment = self.alignment();
        if !alignment.is_power_of_two()
            || alignment < std::mem::size_of::<usize>()
            || alignment > MAX_ALIGNMENT
        {
            return Err(MemoryError::Config(format!(
                "alignment must be a power of two between {} and {MAX_ALIGNMENT}, got {alignment}",
                std::mem::size_of::<usize>()
            )));
        }
        if self.guard_boundaries && alignment > HEADER_BYTES {
            return Err(MemoryError::Config(format!(
                "guard_boundaries supports alignments up to {HEADER_BYTES}, got {alignment}"
            )));
        }
        if self.quarantine_depth > MAX_QUARANTINE_DEPTH {
            return Err(MemoryError::Config(format!(
                "quarantine_depth must be at most {MAX_QUARANTINE_DEPTH}, got {}",
                self.quarantine_depth
            )));
        }
        Ok(())
    }
}
