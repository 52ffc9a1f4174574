//! `malloc`, `calloc`, `realloc` and `free` with C linkage, backed by
//! [`BRK_ALLOCATOR`].
//!
//! Linking these in replaces the C library's allocator for the whole
//! process. `posix_memalign`, `aligned_alloc` and friends are not provided,
//! so anything they return must not be passed to [`free`] here.

use libc::c_void;

use crate::{allocator::BRK_ALLOCATOR, logger::FdWriter};

#[unsafe(no_mangle)]
pub extern "C" fn malloc(size: usize) -> *mut c_void {
  BRK_ALLOCATOR.allocate(size).cast()
}

#[unsafe(no_mangle)]
pub extern "C" fn calloc(
  count: usize,
  elem_size: usize,
) -> *mut c_void {
  BRK_ALLOCATOR.zero_allocate(count, elem_size).cast()
}

/// # Safety
///
/// `ptr` must be null or come from this module's allocation functions.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn realloc(
  ptr: *mut c_void,
  size: usize,
) -> *mut c_void {
  unsafe { BRK_ALLOCATOR.resize(ptr.cast(), size).cast() }
}

/// # Safety
///
/// `ptr` must be null or come from this module's allocation functions.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn free(ptr: *mut c_void) {
  unsafe { BRK_ALLOCATOR.release(ptr.cast()) }
}

/// Dumps the block list to stderr without allocating.
#[unsafe(no_mangle)]
pub extern "C" fn print_mem_list() {
  let mut out = FdWriter::stderr();
  let _ = BRK_ALLOCATOR.dump_state(&mut out);
}
