//! # Typed Sizing
//!
//! Converts element counts into byte counts. Sizes are computed once per type
//! and memoized in a process-wide table keyed by [`TypeId`].
//!
//! The table is append-only: an entry is never changed after it is written,
//! so concurrent first lookups of the same type may both insert and the last
//! writer wins with an identical value.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::OnceLock;

use parking_lot::RwLock;

/// Cached layout facts about one concrete type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TypeLayout {
    /// Size of one value in bytes.
    pub size: u32,
    /// `size` rounded up to a multiple of 4.
    pub size_aligned: u32,
    /// Natural alignment of the type.
    pub align: u32,
    /// Type name, for diagnostics only.
    pub name: &'static str,
}

fn cache() -> &'static RwLock<HashMap<TypeId, TypeLayout>> {
    static CACHE: OnceLock<RwLock<HashMap<TypeId, TypeLayout>>> = OnceLock::new();
    CACHE.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Returns the cached layout of `T`, computing it on first use.
///
/// Sizes above `u32::MAX` saturate; no such value can be allocated through
/// this layer anyway.
#[must_use]
pub fn type_layout<T: 'static>() -> TypeLayout {
    let id = TypeId::of::<T>();
    if let Some(layout) = cache().read().get(&id) {
        return *layout;
    }

    let size = u32::try_from(std::mem::size_of::<T>()).unwrap_or(u32::MAX);
    let layout = TypeLayout {
        size,
        size_aligned: align4(size),
        align: u32::try_from(std::mem::align_of::<T>()).unwrap_or(u32::MAX),
        name: std::any::type_name::<T>(),
    };
    tracing::debug!(
        "cached layout for {}: size={} aligned={}",
        layout.name,
        layout.size,
        layout.size_aligned
    );
    cache().write().insert(id, layout);
    layout
}

/// Byte size of one `T`.
#[inline]
#[must_use]
pub fn size_of<T: 'static>() -> u32 {
    type_layout::<T>().size
}

/// Byte size of one `T`, rounded up to a multiple of 4.
#[inline]
#[must_use]
pub fn size_of_aligned<T: 'static>() -> u32 {
    type_layout::<T>().size_aligned
}

/// Number of distinct types currently memoized.
#[must_use]
pub fn cached_type_count() -> usize {
    cache().read().len()
}

/// Rounds `x` up to the next multiple of 4.
///
/// Values within 3 of `u32::MAX` wrap to zero.
#[inline]
#[must_use]
pub const fn align4(x: u32) -> u32 {
    x.wrapping_add(3) & !3
}

/// Padding bytes needed to bring `x` to a multiple of 4.
#[inline]
#[must_use]
pub const fn pad4(x: u32) -> u32 {
    x.wrapping_neg() & 3
}

/// Byte count of `count` values of `T`.
pub(crate) fn bytes_for<T: 'static>(count: usize) -> crate::MemoryResult<usize> {
    let element_size = size_of::<T>();
    (element_size as usize)
        .checked_mul(count)
        .ok_or(crate::MemoryError::SizeOverflow {
            count,
            element_size,
        })
}
