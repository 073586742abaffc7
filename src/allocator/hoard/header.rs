//! The per-allocation sidecar header.
//!
//! Every user-visible pointer `p` is preceded, at `p - HEADER_SIZE`, by one
//! pointer-sized word holding either the address of the owning superblock,
//! or a null sentinel meaning "this is a large allocation, owned directly by
//! the system allocator".

use std::mem;
use std::ptr::NonNull;

use super::superblock::Superblock;

/// Size in bytes of the sidecar header prefixed to every allocation.
pub const HEADER_SIZE: usize = mem::size_of::<*mut Superblock>();

/// Writes `owner` (or null for a large allocation) into the header word at
/// `base`, and returns the user-visible pointer just past it.
///
/// # Safety
/// `base` must point to at least `HEADER_SIZE` writable, properly aligned
/// bytes.
pub unsafe fn write(base: *mut u8, owner: Option<NonNull<Superblock>>) -> *mut u8 {
    let header_ptr = base as *mut *mut Superblock;
    let raw = owner.map_or(std::ptr::null_mut(), NonNull::as_ptr);
    unsafe { header_ptr.write(raw) };
    unsafe { base.add(HEADER_SIZE) }
}

/// Reads the header word preceding `user_ptr`.
///
/// # Safety
/// `user_ptr` must have been produced by [`write`] (i.e. it must point
/// `HEADER_SIZE` bytes past a valid header word).
pub unsafe fn read(user_ptr: *mut u8) -> Option<NonNull<Superblock>> {
    let header_ptr = unsafe { user_ptr.sub(HEADER_SIZE) } as *mut *mut Superblock;
    NonNull::new(unsafe { header_ptr.read() })
}

/// Recovers the raw, header-including base pointer from a user pointer.
///
/// # Safety
/// `user_ptr` must have been produced by [`write`].
pub unsafe fn base_of(user_ptr: *mut u8) -> *mut u8 {
    unsafe { user_ptr.sub(HEADER_SIZE) }
}

/// Extra bytes reserved ahead of the null-sentinel word for large
/// allocations, to hold the original request size.
///
/// Unlike the source's C `malloc`/`free` pair, `std::alloc::System::dealloc`
/// requires a `Layout` matching the one used at `alloc` time, so the large
/// path must be able to recover the size it originally reserved from the
/// pointer alone.
pub const LARGE_PREFIX_SIZE: usize = mem::size_of::<usize>();

/// Writes the large-allocation header (`total_size`, then the null
/// sentinel) at `base`, and returns the user-visible pointer past both.
///
/// # Safety
/// `base` must point to at least `LARGE_PREFIX_SIZE + HEADER_SIZE` writable,
/// properly aligned bytes.
pub unsafe fn write_large(base: *mut u8, total_size: usize) -> *mut u8 {
    let size_ptr = base as *mut usize;
    unsafe { size_ptr.write(total_size) };
    unsafe { write(base.add(LARGE_PREFIX_SIZE), None) }
}

/// Reads back the original `total_size` passed to [`write_large`].
///
/// # Safety
/// `user_ptr` must have been produced by [`write_large`].
pub unsafe fn read_large_size(user_ptr: *mut u8) -> usize {
    let size_ptr = unsafe { base_of(user_ptr).sub(LARGE_PREFIX_SIZE) } as *mut usize;
    unsafe { size_ptr.read() }
}

/// Recovers the raw allocation base (as originally returned by the system
/// allocator) from a user pointer produced by [`write_large`].
///
/// # Safety
/// `user_ptr` must have been produced by [`write_large`].
pub unsafe fn large_base_of(user_ptr: *mut u8) -> *mut u8 {
    unsafe { base_of(user_ptr).sub(LARGE_PREFIX_SIZE) }
}
