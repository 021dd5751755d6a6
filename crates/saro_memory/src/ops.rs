//! # Bulk Memory Operations
//!
//! Clear, fill, move and copy over raw addresses, plus marshalling of plain
//! data through native scratch buffers.
//!
//! Element-indexed operations scale every index and count by the cached size
//! of `T` (see [`crate::sizing`]).

#![allow(unsafe_code)]

use bytemuck::Pod;

use crate::address::Address;
use crate::error::{MemoryError, MemoryResult};
use crate::global;
use crate::heap::Heap;
use crate::kind::AllocatorKind;
use crate::sizing;

/// Zeroes `bytes` bytes at `destination`.
///
/// # Safety
///
/// `destination` must be live and valid for `bytes` bytes, and not freed
/// concurrently.
#[inline]
pub unsafe fn mem_clear(destination: Address, bytes: usize) {
    if bytes == 0 {
        return;
    }
    // SAFETY: forwarded to the caller.
    unsafe { std::ptr::write_bytes(destination.as_ptr(), 0, bytes) }
}

/// Zeroes `count` values of `T` at `destination`.
///
/// # Safety
///
/// `destination` must be valid for `count` values of `T`.
///
/// # Errors
///
/// `SizeOverflow` if the byte count does not fit in `usize`. Nothing is
/// written in that case.
#[inline]
pub unsafe fn mem_clear_typed<T: 'static>(destination: Address, count: usize) -> MemoryResult<()> {
    let bytes = sizing::bytes_for::<T>(count)?;
    // SAFETY: forwarded to the caller.
    unsafe { mem_clear(destination, bytes) };
    Ok(())
}

/// Fills `bytes` bytes at `destination` with `value`.
///
/// # Safety
///
/// `destination` must be live and valid for `bytes` bytes.
#[inline]
pub unsafe fn mem_set(destination: Address, bytes: usize, value: u8) {
    if bytes == 0 {
        return;
    }
    // SAFETY: forwarded to the caller.
    unsafe { std::ptr::write_bytes(destination.as_ptr(), value, bytes) }
}

/// Moves `count` values of `T` inside one region, from element
/// `source_index` to element `destination_index`.
///
/// The ranges may overlap; the result equals copying through a temporary.
///
/// # Safety
///
/// `source` must be valid for both element ranges.
///
/// # Errors
///
/// `SizeOverflow` if an index or the count does not fit in `usize` once
/// scaled to bytes. Nothing is moved in that case.
#[inline]
pub unsafe fn mem_move<T: 'static>(
    source: Address,
    source_index: usize,
    destination_index: usize,
    count: usize,
) -> MemoryResult<()> {
    let bytes = sizing::bytes_for::<T>(count)?;
    let from = sizing::bytes_for::<T>(source_index)?;
    let to = sizing::bytes_for::<T>(destination_index)?;
    if bytes == 0 {
        return Ok(());
    }
    // SAFETY: forwarded to the caller; `ptr::copy` handles overlap.
    unsafe { std::ptr::copy(source.byte_add(from), source.byte_add(to), bytes) };
    Ok(())
}

/// Copies `count` values of `T` from element `source_index` of `source` to
/// element `destination_index` of `destination`.
///
/// # Safety
///
/// Both ranges must be valid and must not overlap. Overlapping ranges are
/// undefined behavior; use [`mem_move`] for those.
///
/// # Errors
///
/// As [`mem_move`].
#[inline]
pub unsafe fn mem_copy<T: 'static>(
    source: Address,
    source_index: usize,
    destination: Address,
    destination_index: usize,
    count: usize,
) -> MemoryResult<()> {
    let bytes = sizing::bytes_for::<T>(count)?;
    let from = sizing::bytes_for::<T>(source_index)?;
    let to = sizing::bytes_for::<T>(destination_index)?;
    if bytes == 0 {
        return Ok(());
    }
    // SAFETY: forwarded to the caller.
    unsafe {
        std::ptr::copy_nonoverlapping(source.byte_add(from), destination.byte_add(to), bytes);
    }
    Ok(())
}

/// Stores `value` at `destination`.
///
/// # Safety
///
/// `destination` must be valid for one `T`. No alignment is required.
#[inline]
pub unsafe fn write_struct<T: Copy>(destination: Address, value: T) {
    // SAFETY: forwarded to the caller.
    unsafe { destination.as_ptr().cast::<T>().write_unaligned(value) }
}

/// Mutable view of element `index` of a `T` array at `data`.
///
/// # Safety
///
/// `data` must hold at least `index + 1` initialised values of `T`, be
/// aligned for `T`, and the element must not be aliased for `'a`.
#[inline]
#[must_use]
pub unsafe fn element_mut<'a, T>(data: Address, index: usize) -> &'a mut T {
    // SAFETY: forwarded to the caller.
    unsafe { &mut *data.as_ptr().cast::<T>().add(index) }
}

/// Writes `value` into the first four bytes of `out` in native byte order.
///
/// # Errors
///
/// `OutOfBounds` if `out` is shorter than four bytes.
pub fn write_u32_bytes(value: u32, out: &mut [u8]) -> MemoryResult<()> {
    let Some(head) = out.get_mut(..4) else {
        return Err(MemoryError::OutOfBounds {
            start: 0,
            length: 4,
            buffer_len: out.len(),
        });
    };
    head.copy_from_slice(&value.to_ne_bytes());
    Ok(())
}

/// Scratch region released on every exit path.
struct Scratch<'h, H: Heap> {
    heap: &'h H,
    address: Address,
}

impl<'h, H: Heap> Scratch<'h, H> {
    fn new(heap: &'h H, bytes: usize, clear: bool) -> MemoryResult<Self> {
        let address = heap.alloc(bytes, AllocatorKind::Persistent, clear)?;
        Ok(Self { heap, address })
    }
}

impl<H: Heap> Drop for Scratch<'_, H> {
    fn drop(&mut self) {
        // SAFETY: the scratch region is owned by this guard and freed once.
        unsafe { self.heap.free(self.address, AllocatorKind::Persistent) };
    }
}

fn check_marshal_range(
    start: usize,
    length: usize,
    buffer_len: usize,
    size: usize,
) -> MemoryResult<()> {
    if length > size {
        return Err(MemoryError::InvalidLength { length, size });
    }
    match start.checked_add(length) {
        Some(end) if end <= buffer_len => Ok(()),
        _ => Err(MemoryError::OutOfBounds {
            start,
            length,
            buffer_len,
        }),
    }
}

/// Serialises `value` into `out[start..start + length]` through a native
/// scratch buffer.
///
/// A `length` shorter than `T` keeps only the leading bytes.
///
/// # Errors
///
/// `InvalidLength` if `length` exceeds the size of `T`, `OutOfBounds` if the
/// range does not fit in `out`, or an allocation error for the scratch
/// buffer.
pub fn struct_to_bytes<T: Pod>(
    value: &T,
    out: &mut [u8],
    start: usize,
    length: usize,
) -> MemoryResult<()> {
    let size = sizing::size_of::<T>() as usize;
    check_marshal_range(start, length, out.len(), size)?;

    let scratch = Scratch::new(global::heap(), size, false)?;
    // SAFETY: the scratch region holds `size` bytes and is owned here.
    let staged = unsafe { scratch.address.as_mut_slice(size) };
    staged.copy_from_slice(bytemuck::bytes_of(value));
    out[start..start + length].copy_from_slice(&staged[..length]);
    Ok(())
}

/// Deserialises a `T` from `buffer[start..start + length]` through a native
/// scratch buffer.
///
/// A `length` shorter than `T` zero-fills the remaining bytes.
///
/// # Errors
///
/// As [`struct_to_bytes`].
pub fn bytes_to_struct<T: Pod>(buffer: &[u8], start: usize, length: usize) -> MemoryResult<T> {
    let size = sizing::size_of::<T>() as usize;
    check_marshal_range(start, length, buffer.len(), size)?;

    let scratch = Scratch::new(global::heap(), size, true)?;
    // SAFETY: the scratch region holds `size` zeroed bytes and is owned here.
    let staged = unsafe { scratch.address.as_mut_slice(size) };
    staged[..length].copy_from_slice(&buffer[start..start + length]);
    Ok(bytemuck::pod_read_unaligned(staged))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytemuck::Zeroable;

    #[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
    #[repr(C)]
    struct Sample {
        id: u32,
        flags: u32,
        weight: f32,
        tick: u32,
    }

    fn sample() -> Sample {
        Sample {
            id: 0xA1B2_C3D4,
            flags: 7,
            weight: -1.5,
            tick: u32::MAX,
        }
    }

    fn with_region<F: FnOnce(Address)>(bytes: usize, f: F) {
        let heap = global::heap();
        let addr = heap.alloc(bytes, AllocatorKind::Persistent, true).unwrap();
        f(addr);
        // SAFETY: `addr` is live and from the global heap.
        unsafe { heap.free(addr, AllocatorKind::Persistent) };
    }

    #[test]
    fn test_mem_set_and_clear() {
        with_region(64, |addr| unsafe {
            mem_set(addr, 64, 0xEE);
            assert!(addr.as_slice(64).iter().all(|&b| b == 0xEE));
            mem_clear(addr, 32);
            let view = addr.as_slice(64);
            assert!(view[..32].iter().all(|&b| b == 0));
            assert!(view[32..].iter().all(|&b| b == 0xEE));
            mem_clear_typed::<u64>(addr, 8).unwrap();
            assert!(addr.as_slice(64).iter().all(|&b| b == 0));
        });
    }

    fn reference_move(data: &mut [u32], src: usize, dst: usize, count: usize) {
        let copy: Vec<u32> = data[src..src + count].to_vec();
        data[dst..dst + count].copy_from_slice(&copy);
    }

    #[test]
    fn test_mem_move_overlap_matches_reference() {
        let len = 32;
        for (src, dst, count) in [(0, 3, 20), (5, 1, 25), (4, 4, 10), (0, 16, 16), (16, 0, 16)] {
            with_region(len * 4, |addr| unsafe {
                let words = std::slice::from_raw_parts_mut(addr.as_ptr().cast::<u32>(), len);
                for (i, w) in words.iter_mut().enumerate() {
                    *w = i as u32 * 3 + 1;
                }
                let mut expected = words.to_vec();
                reference_move(&mut expected, src, dst, count);

                mem_move::<u32>(addr, src, dst, count).unwrap();
                let words = std::slice::from_raw_parts(addr.as_ptr().cast::<u32>(), len);
                assert_eq!(words, expected.as_slice(), "src={src} dst={dst} count={count}");
            });
        }
    }

    #[test]
    fn test_mem_copy_between_regions() {
        with_region(16, |src| {
            with_region(32, |dst| unsafe {
                src.as_mut_slice(16).copy_from_slice(&[9u8; 16]);
                mem_copy::<u32>(src, 1, dst, 4, 2).unwrap();
                let view = dst.as_slice(32);
                assert!(view[..16].iter().all(|&b| b == 0));
                assert!(view[16..24].iter().all(|&b| b == 9));
                assert!(view[24..].iter().all(|&b| b == 0));
            });
        });
    }

    #[test]
    fn test_scaled_overflow_is_rejected_before_touching_memory() {
        with_region(16, |addr| unsafe {
            addr.as_mut_slice(16).fill(0x5A);
            let huge = usize::MAX / 2;
            assert!(matches!(
                mem_move::<u32>(addr, 0, 1, huge),
                Err(MemoryError::SizeOverflow { count, element_size: 4 }) if count == huge
            ));
            assert!(matches!(
                mem_move::<u32>(addr, huge, 0, 1),
                Err(MemoryError::SizeOverflow { .. })
            ));
            assert!(matches!(
                mem_copy::<u64>(addr, 0, addr, huge, 1),
                Err(MemoryError::SizeOverflow { .. })
            ));
            assert!(matches!(
                mem_clear_typed::<u64>(addr, huge),
                Err(MemoryError::SizeOverflow { .. })
            ));
            assert!(addr.as_slice(16).iter().all(|&b| b == 0x5A));
        });
    }

    #[test]
    fn test_write_struct_and_element_mut() {
        with_region(4 * 16, |addr| unsafe {
            write_struct(addr, sample());
            let first: &mut Sample = element_mut(addr, 0);
            assert_eq!(*first, sample());
            first.flags = 99;
            let second: &mut Sample = element_mut(addr, 1);
            assert_eq!(*second, Sample::zeroed());
            assert_eq!(element_mut::<Sample>(addr, 0).flags, 99);
        });
    }

    #[test]
    fn test_write_u32_bytes() {
        let mut out = [0u8; 6];
        write_u32_bytes(0x0102_0304, &mut out).unwrap();
        assert_eq!(u32::from_ne_bytes([out[0], out[1], out[2], out[3]]), 0x0102_0304);
        assert_eq!(&out[4..], &[0, 0]);
        assert!(write_u32_bytes(1, &mut out[..3]).is_err());
    }

    #[test]
    fn test_struct_round_trip() {
        let mut bytes = vec![0u8; 40];
        struct_to_bytes(&sample(), &mut bytes, 8, 16).unwrap();
        assert!(bytes[..8].iter().all(|&b| b == 0));
        assert!(bytes[24..].iter().all(|&b| b == 0));
        let back: Sample = bytes_to_struct(&bytes, 8, 16).unwrap();
        assert_eq!(bytemuck::bytes_of(&back), bytemuck::bytes_of(&sample()));
    }

    #[test]
    fn test_short_length_truncates_and_zero_fills() {
        let mut bytes = [0xFFu8; 4];
        struct_to_bytes(&sample(), &mut bytes, 0, 4).unwrap();
        let back: Sample = bytes_to_struct(&bytes, 0, 4).unwrap();
        assert_eq!(back.id, sample().id);
        assert_eq!(back.flags, 0);
        assert_eq!(back.tick, 0);
    }

    #[test]
    fn test_marshal_rejects_bad_ranges() {
        let mut bytes = [0u8; 16];
        assert!(matches!(
            struct_to_bytes(&sample(), &mut bytes, 4, 16),
            Err(MemoryError::OutOfBounds { .. })
        ));
        assert!(matches!(
            struct_to_bytes(&7u32, &mut bytes, 0, 8),
            Err(MemoryError::InvalidLength { .. })
        ));
        assert!(matches!(
            bytes_to_struct::<Sample>(&bytes, usize::MAX, 1),
            Err(MemoryError::OutOfBounds { .. })
        ));
    }
}
