//! # Opaque Addresses
//!
//! Handles returned by the allocation API. Callers hold an [`Address`] plus
//! the byte count they negotiated at allocation time; all offset arithmetic
//! stays inside this crate.

#![allow(unsafe_code)]

use std::fmt;
use std::ptr::NonNull;

/// Opaque handle to a native memory region.
///
/// The handle is not self-describing: the region length is part of the
/// caller's contract with the allocator. The null address means
/// "no allocation" and is accepted by `free` as a no-op.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Address(Option<NonNull<u8>>);

// SAFETY: an Address is a plain handle. Every dereference goes through an
// `unsafe fn` whose caller upholds exclusivity for the region.
unsafe impl Send for Address {}
// SAFETY: see above.
unsafe impl Sync for Address {}

impl Address {
    /// The null address.
    #[inline]
    #[must_use]
    pub const fn null() -> Self {
        Self(None)
    }

    /// Whether this is the null address.
    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0.is_none()
    }

    #[inline]
    pub(crate) const fn from_non_null(ptr: NonNull<u8>) -> Self {
        Self(Some(ptr))
    }

    #[inline]
    pub(crate) const fn non_null(self) -> Option<NonNull<u8>> {
        self.0
    }

    /// Raw pointer to the first byte (null for the null address).
    #[inline]
    #[must_use]
    pub fn as_ptr(self) -> *mut u8 {
        match self.0 {
            Some(ptr) => ptr.as_ptr(),
            None => std::ptr::null_mut(),
        }
    }

    /// Numeric value of the address, used in diagnostics.
    #[inline]
    #[must_use]
    pub fn addr(self) -> usize {
        self.as_ptr() as usize
    }

    /// Pointer `bytes` past this address.
    ///
    /// # Safety
    ///
    /// The address must be non-null and the result must stay inside (or one
    /// past) the region it was allocated for.
    #[inline]
    pub(crate) unsafe fn byte_add(self, bytes: usize) -> *mut u8 {
        // SAFETY: forwarded to the caller.
        unsafe { self.as_ptr().add(bytes) }
    }

    /// Address `bytes` past this one. The null address stays null.
    ///
    /// # Safety
    ///
    /// The result must stay inside (or one past) the region this address
    /// was allocated for.
    #[inline]
    pub(crate) unsafe fn offset(self, bytes: usize) -> Self {
        match self.0 {
            // SAFETY: forwarded to the caller; an in-bounds offset of a
            // non-null pointer is non-null.
            Some(ptr) => unsafe { Self(Some(NonNull::new_unchecked(ptr.as_ptr().add(bytes)))) },
            None => self,
        }
    }

    /// Views `len` bytes starting at this address.
    ///
    /// # Safety
    ///
    /// The address must be live, valid for `len` bytes, and not written
    /// through any other handle while the slice exists.
    #[inline]
    #[must_use]
    pub unsafe fn as_slice<'a>(self, len: usize) -> &'a [u8] {
        if len == 0 || self.is_null() {
            return &[];
        }
        // SAFETY: forwarded to the caller.
        unsafe { std::slice::from_raw_parts(self.as_ptr(), len) }
    }

    /// Mutably views `len` bytes starting at this address.
    ///
    /// # Safety
    ///
    /// The address must be live, valid for `len` bytes, and not accessed
    /// through any other handle while the slice exists.
    #[inline]
    #[must_use]
    pub unsafe fn as_mut_slice<'a>(self, len: usize) -> &'a mut [u8] {
        if len == 0 || self.is_null() {
            return &mut [];
        }
        // SAFETY: forwarded to the caller.
        unsafe { std::slice::from_raw_parts_mut(self.as_ptr(), len) }
    }
}

impl Default for Address {
    fn default() -> Self {
        Self::null()
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({:#x})", self.addr())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.addr())
    }
}
