//! Sources of raw memory.
//!
//! Everything the allocator hands out comes from moving a program break. The
//! real one belongs to the process and is driven through `sbrk(2)`; the
//! simulated one lives inside an owned buffer so that independent heaps can
//! exist side by side (tests being the main user).

use std::ptr::{self, NonNull};

use libc::{c_void, intptr_t, sbrk};

use crate::{
  block::HEADER_ALIGN,
  error::{Error, Result},
};

/// A data-segment boundary that can be moved up and down.
pub trait ProgramBreak {
  /// The current break address.
  fn current(&self) -> *mut u8;

  /// Moves the break by `increment` bytes and returns the previous break,
  /// which is the base of the new memory when growing.
  ///
  /// # Safety
  ///
  /// A negative `increment` unmaps memory; nothing may still be using the
  /// released range.
  unsafe fn adjust(
    &mut self,
    increment: isize,
  ) -> Result<*mut u8>;
}

/// The process break, driven through `sbrk(2)`.
///
/// The break is process-wide state. Only one allocator may own it, and any
/// other code that moves it (the C library's `malloc`, for one) can have its
/// memory handed back to the OS when this allocator releases its tail block.
#[derive(Debug)]
pub struct Sbrk {
  _owned: (),
}

impl Sbrk {
  /// # Safety
  ///
  /// No other [`Sbrk`] may be in use for the lifetime of this one.
  pub const unsafe fn new() -> Self {
    Self { _owned: () }
  }
}

impl ProgramBreak for Sbrk {
  fn current(&self) -> *mut u8 {
    unsafe { sbrk(0) as *mut u8 }
  }

  unsafe fn adjust(
    &mut self,
    increment: isize,
  ) -> Result<*mut u8> {
    let previous = unsafe { sbrk(increment as intptr_t) };

    if previous == usize::MAX as *mut c_void {
      return Err(Error::OutOfMemory {
        requested: increment,
      });
    }

    Ok(previous as *mut u8)
  }
}

#[derive(Clone, Copy)]
#[repr(C, align(16))]
struct Chunk([u8; HEADER_ALIGN]);

/// A break that moves inside a fixed, heap-owned buffer.
///
/// Growth past the capacity and retraction below the base are refused the
/// same way the OS refuses `sbrk`: the break stays where it was.
pub struct ArenaBreak {
  storage: NonNull<Chunk>,
  chunks: usize,
  top: usize,
}

// The buffer is owned exclusively, like a `Box`.
unsafe impl Send for ArenaBreak {}

impl ArenaBreak {
  /// Capacity is rounded up to a multiple of 16 bytes.
  pub fn with_capacity(bytes: usize) -> Self {
    let chunks = bytes.div_ceil(HEADER_ALIGN);
    let storage = Box::leak(vec![Chunk([0; HEADER_ALIGN]); chunks].into_boxed_slice());

    Self {
      storage: NonNull::from(storage).cast(),
      chunks,
      top: 0,
    }
  }

  /// Same as [`ArenaBreak::with_capacity`], but with the break starting
  /// `skew` bytes past the aligned base.
  pub fn skewed(
    bytes: usize,
    skew: usize,
  ) -> Self {
    let mut arena = Self::with_capacity(bytes + skew);
    arena.top = skew;
    arena
  }

  pub fn base(&self) -> *mut u8 {
    self.storage.as_ptr() as *mut u8
  }

  pub fn capacity(&self) -> usize {
    self.chunks * HEADER_ALIGN
  }

  /// Bytes between the base and the break.
  pub fn used(&self) -> usize {
    self.top
  }
}

impl Drop for ArenaBreak {
  fn drop(&mut self) {
    let storage = ptr::slice_from_raw_parts_mut(self.storage.as_ptr(), self.chunks);
    drop(unsafe { Box::from_raw(storage) });
  }
}

impl ProgramBreak for ArenaBreak {
  fn current(&self) -> *mut u8 {
    self.base().wrapping_add(self.top)
  }

  unsafe fn adjust(
    &mut self,
    increment: isize,
  ) -> Result<*mut u8> {
    let refused = Error::OutOfMemory {
      requested: increment,
    };

    let top = self
      .top
      .checked_add_signed(increment)
      .filter(|top| *top <= self.capacity())
      .ok_or(refused)?;

    let previous = self.current();
    self.top = top;

    // Fresh memory is never zeroed by a real break either.
    if increment > 0 {
      unsafe { ptr::write_bytes(previous, 0xAA, increment as usize) };
    }

    Ok(previous)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_arena_grows_and_retracts() {
    let mut arena = ArenaBreak::with_capacity(100);
    assert_eq!(arena.capacity(), 112);
    assert_eq!(arena.base() as usize % HEADER_ALIGN, 0);

    unsafe {
      let start = arena.current();
      let first = arena.adjust(48).unwrap();
      assert_eq!(first, start);
      assert_eq!(arena.current(), start.add(48));

      let previous = arena.adjust(-48).unwrap();
      assert_eq!(previous, start.add(48));
      assert_eq!(arena.current(), start);
    }
  }

  #[test]
  fn test_arena_refuses_past_bounds() {
    let mut arena = ArenaBreak::with_capacity(64);

    unsafe {
      assert_eq!(
        arena.adjust(65),
        Err(Error::OutOfMemory { requested: 65 })
      );
      assert_eq!(arena.used(), 0);

      arena.adjust(64).unwrap();
      assert_eq!(arena.adjust(1), Err(Error::OutOfMemory { requested: 1 }));
      assert_eq!(
        arena.adjust(-65),
        Err(Error::OutOfMemory { requested: -65 })
      );
      assert_eq!(arena.used(), 64);
    }
  }

  #[test]
  fn test_skewed_arena_starts_misaligned() {
    let arena = ArenaBreak::skewed(64, 8);
    assert_eq!(arena.current() as usize % HEADER_ALIGN, 8);
    assert_eq!(arena.used(), 8);
  }

  #[test]
  fn test_sbrk_reports_break() {
    let brk = unsafe { Sbrk::new() };
    assert!(!brk.current().is_null());
  }
}
