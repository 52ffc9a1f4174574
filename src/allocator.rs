use std::{
  alloc::{GlobalAlloc, Layout},
  fmt,
  ptr::{self, NonNull},
};

use log::Level;
use parking_lot::{Mutex, const_mutex};

use crate::{
  block::{Block, HEADER_ALIGN},
  brk::{ProgramBreak, Sbrk},
  error::{Error, Result},
  heap::{Allocation, BlockInfo, Heap, Release, Source},
};

/// The allocator that owns the process break.
///
/// Every other user of `sbrk(2)` in the process (the C library's `malloc`,
/// most notably) is invisible to it; see [`Sbrk`].
pub static BRK_ALLOCATOR: Allocator<Sbrk> = Allocator::new(unsafe { Sbrk::new() });

/// A heap behind a single lock.
///
/// Every operation takes the lock once for its whole critical section, so
/// list and break updates from different threads never interleave. The lock
/// is never held while logging.
pub struct Allocator<B> {
  heap: Mutex<Heap<B>>,
}

impl<B: ProgramBreak> Allocator<B> {
  pub const fn new(brk: B) -> Self {
    Self {
      heap: const_mutex(Heap::new(brk)),
    }
  }

  pub fn try_allocate(
    &self,
    size: usize,
  ) -> Result<NonNull<u8>> {
    if size == 0 {
      return Err(Error::ZeroSize);
    }

    let allocation = self.heap.lock().allocate(size);
    log_allocation(size, &allocation);

    allocation.map(|allocation| allocation.payload)
  }

  /// `malloc`: at least `size` bytes, 16-byte aligned, or null.
  pub fn allocate(
    &self,
    size: usize,
  ) -> *mut u8 {
    sentinel(self.try_allocate(size))
  }

  pub fn try_zero_allocate(
    &self,
    count: usize,
    elem_size: usize,
  ) -> Result<NonNull<u8>> {
    if count == 0 || elem_size == 0 {
      return Err(Error::ZeroSize);
    }

    let size = count.wrapping_mul(elem_size);
    if size / count != elem_size {
      heap_log!(Level::Debug, "calloc({count}, {elem_size}) overflows");
      return Err(Error::Overflow { count, elem_size });
    }

    let payload = self.try_allocate(size)?;
    unsafe { ptr::write_bytes(payload.as_ptr(), 0, size) };

    Ok(payload)
  }

  /// `calloc`: `count * elem_size` zeroed bytes, or null.
  pub fn zero_allocate(
    &self,
    count: usize,
    elem_size: usize,
  ) -> *mut u8 {
    sentinel(self.try_zero_allocate(count, elem_size))
  }

  /// Blocks never shrink: a block that already holds `new_size` bytes is
  /// returned as is. Otherwise the contents move to a new block and the old
  /// one is released. On failure the old block is left untouched.
  ///
  /// # Safety
  ///
  /// `payload` must be null or a live pointer from this allocator.
  pub unsafe fn try_resize(
    &self,
    payload: *mut u8,
    new_size: usize,
  ) -> Result<NonNull<u8>> {
    let Some(old) = NonNull::new(payload).filter(|_| new_size != 0) else {
      return self.try_allocate(new_size);
    };

    let mut heap = self.heap.lock();

    let old_size = unsafe { (*Block::from_payload(old.as_ptr())).size };
    if old_size >= new_size {
      return Ok(old);
    }

    let allocation = heap.allocate(new_size);

    let release = match allocation {
      Ok(allocation) => unsafe {
        ptr::copy_nonoverlapping(
          old.as_ptr(),
          allocation.payload.as_ptr(),
          old_size.min(new_size),
        );
        Some(heap.release(old))
      },
      Err(_) => None,
    };

    drop(heap);

    log_allocation(new_size, &allocation);
    if let Some(release) = release {
      log_release(old, release);
    }

    allocation.map(|allocation| allocation.payload)
  }

  /// `realloc`: a block of at least `new_size` bytes starting with the old
  /// contents, or null.
  ///
  /// # Safety
  ///
  /// `payload` must be null or a live pointer from this allocator.
  pub unsafe fn resize(
    &self,
    payload: *mut u8,
    new_size: usize,
  ) -> *mut u8 {
    sentinel(unsafe { self.try_resize(payload, new_size) })
  }

  /// `free`. Null is ignored.
  ///
  /// # Safety
  ///
  /// `payload` must be null or a live pointer from this allocator.
  pub unsafe fn release(
    &self,
    payload: *mut u8,
  ) {
    let Some(payload) = NonNull::new(payload) else {
      return;
    };

    let release = unsafe { self.heap.lock().release(payload) };
    log_release(payload, release);
  }

  /// Runs `inspect` with the heap locked.
  ///
  /// Allocating from this same allocator inside `inspect` deadlocks.
  pub fn inspect<R>(
    &self,
    inspect: impl FnOnce(&Heap<B>) -> R,
  ) -> R {
    inspect(&self.heap.lock())
  }

  /// Number of blocks in the list, free or not.
  pub fn len(&self) -> usize {
    self.inspect(Heap::len)
  }

  pub fn is_empty(&self) -> bool {
    self.inspect(Heap::is_empty)
  }

  /// Copies every block header out, in list order.
  ///
  /// The copy is allocated with the lock held, so this is not for the
  /// allocator installed as `#[global_allocator]`.
  pub fn blocks(&self) -> Vec<BlockInfo> {
    self.inspect(|heap| heap.blocks().collect())
  }

  /// Writes the block list to `out` with the lock held.
  ///
  /// `out` must not allocate from this allocator; an
  /// [`FdWriter`](crate::logger::FdWriter) never does.
  pub fn dump_state(
    &self,
    out: &mut impl fmt::Write,
  ) -> fmt::Result {
    self.inspect(|heap| heap.dump(out))
  }
}

fn sentinel(result: Result<NonNull<u8>>) -> *mut u8 {
  result.map_or(ptr::null_mut(), NonNull::as_ptr)
}

fn log_allocation(
  size: usize,
  allocation: &Result<Allocation>,
) {
  match *allocation {
    Ok(Allocation {
      payload,
      source: Source::Reused { capacity },
    }) => heap_log!(
      Level::Trace,
      "reused {capacity}-byte block at {payload:p} for {size} bytes"
    ),
    Ok(Allocation {
      payload,
      source: Source::Grown { increment },
    }) => heap_log!(
      Level::Trace,
      "grew break by {increment} bytes for {size} bytes at {payload:p}"
    ),
    Err(error) => heap_log!(Level::Warn, "allocation of {size} bytes failed: {error}"),
  }
}

fn log_release(
  payload: NonNull<u8>,
  release: Release,
) {
  match release {
    Release::MarkedFree => heap_log!(Level::Trace, "block at {payload:p} marked free"),
    Release::Retracted { decrement } => heap_log!(
      Level::Debug,
      "tail block at {payload:p} released, break moved down by {decrement} bytes"
    ),
  }
}

unsafe impl<B: ProgramBreak + Send> GlobalAlloc for Allocator<B> {
  unsafe fn alloc(
    &self,
    layout: Layout,
  ) -> *mut u8 {
    if layout.align() > HEADER_ALIGN {
      return ptr::null_mut();
    }

    self.allocate(layout.size())
  }

  unsafe fn alloc_zeroed(
    &self,
    layout: Layout,
  ) -> *mut u8 {
    if layout.align() > HEADER_ALIGN {
      return ptr::null_mut();
    }

    self.zero_allocate(1, layout.size())
  }

  unsafe fn dealloc(
    &self,
    ptr: *mut u8,
    _layout: Layout,
  ) {
    unsafe { self.release(ptr) }
  }

  unsafe fn realloc(
    &self,
    ptr: *mut u8,
    _layout: Layout,
    new_size: usize,
  ) -> *mut u8 {
    unsafe { self.resize(ptr, new_size) }
  }
}

#[cfg(test)]
mod tests {
  use std::{slice, sync::Arc, thread};

  use super::*;
  use crate::{block::HEADER_SIZE, brk::ArenaBreak};

  fn allocator(capacity: usize) -> Allocator<ArenaBreak> {
    Allocator::new(ArenaBreak::with_capacity(capacity))
  }

  fn used(allocator: &Allocator<ArenaBreak>) -> usize {
    allocator.inspect(|heap| heap.brk().used())
  }

  #[test]
  fn test_zero_size_touches_nothing() {
    let allocator = allocator(1024);

    assert!(allocator.allocate(0).is_null());
    assert_eq!(allocator.try_allocate(0), Err(Error::ZeroSize));
    assert!(allocator.zero_allocate(0, 8).is_null());
    assert!(allocator.zero_allocate(8, 0).is_null());
    assert_eq!(allocator.len(), 0);
    assert_eq!(used(&allocator), 0);
  }

  #[test]
  fn test_zero_allocate_clears_reused_block() {
    let allocator = allocator(1024);

    unsafe {
      let dirty = allocator.allocate(40);
      ptr::write_bytes(dirty, 0xFF, 40);
      let _tail = allocator.allocate(8);
      allocator.release(dirty);

      let zeroed = allocator.zero_allocate(10, 4);
      assert_eq!(zeroed, dirty);
      assert!(slice::from_raw_parts(zeroed, 40).iter().all(|b| *b == 0));
    }
  }

  #[test]
  fn test_zero_allocate_rejects_overflow() {
    let allocator = allocator(1024);

    assert_eq!(
      allocator.try_zero_allocate(usize::MAX, 2),
      Err(Error::Overflow {
        count: usize::MAX,
        elem_size: 2
      })
    );
    assert!(allocator.is_empty());
  }

  #[test]
  fn test_resize_null_or_zero_allocates() {
    let allocator = allocator(1024);

    unsafe {
      let fresh = allocator.resize(ptr::null_mut(), 24);
      assert!(!fresh.is_null());
      assert_eq!(allocator.len(), 1);

      assert!(allocator.resize(fresh, 0).is_null());
      assert_eq!(allocator.len(), 1);
      assert!(!allocator.blocks()[0].is_free);
    }
  }

  #[test]
  fn test_resize_moves_and_releases_old_block() {
    let allocator = allocator(1024);

    unsafe {
      let old = allocator.allocate(8);
      ptr::copy_nonoverlapping(b"brkalloc".as_ptr(), old, 8);

      let new = allocator.resize(old, 64);
      assert_ne!(new, old);
      assert_eq!(slice::from_raw_parts(new, 8), b"brkalloc");

      let blocks = allocator.blocks();
      assert_eq!(blocks.len(), 2);
      assert!(blocks[0].is_free);
      assert_eq!(blocks[1].payload(), new as usize);
      assert_eq!(blocks[1].size, 64);
    }
  }

  #[test]
  fn test_failed_resize_keeps_old_block() {
    let allocator = allocator(HEADER_SIZE + 16);

    unsafe {
      let old = allocator.allocate(16);
      ptr::write_bytes(old, 0x5A, 16);

      assert_eq!(
        allocator.try_resize(old, 32),
        Err(Error::OutOfMemory {
          requested: (HEADER_SIZE + 32) as isize
        })
      );

      let blocks = allocator.blocks();
      assert_eq!(blocks.len(), 1);
      assert!(!blocks[0].is_free);
      assert!(slice::from_raw_parts(old, 16).iter().all(|b| *b == 0x5A));
    }
  }

  #[test]
  fn test_release_null_is_noop() {
    let allocator = allocator(1024);
    unsafe { allocator.release(ptr::null_mut()) };
    assert!(allocator.is_empty());
  }

  #[test]
  fn test_global_alloc_rejects_wide_alignment() {
    let allocator = allocator(1024);

    unsafe {
      let layout = Layout::from_size_align(64, 64).unwrap();
      assert!(allocator.alloc(layout).is_null());

      let layout = Layout::from_size_align(24, 8).unwrap();
      let ptr = allocator.alloc_zeroed(layout);
      assert_eq!(ptr as usize % HEADER_ALIGN, 0);
      assert!(slice::from_raw_parts(ptr, 24).iter().all(|b| *b == 0));

      let grown = allocator.realloc(ptr, layout, 48);
      allocator.dealloc(grown, Layout::from_size_align(48, 8).unwrap());
    }
  }

  #[test]
  fn test_dump_state_header_line() {
    let allocator = allocator(1024);
    allocator.allocate(8);

    let mut out = String::new();
    allocator.dump_state(&mut out).unwrap();

    assert_eq!(out.lines().count(), 2);
    assert!(out.contains("size = 8, is_free = false"));
  }

  #[test]
  fn test_threads_share_one_heap() {
    let allocator = Arc::new(allocator(64 * 1024));

    let workers: Vec<_> = (0..4u8)
      .map(|id| {
        let allocator = Arc::clone(&allocator);
        thread::spawn(move || {
          for round in 0..200usize {
            let size = 1 + (round * 7 + id as usize) % 48;
            let ptr = allocator.allocate(size);
            assert!(!ptr.is_null());

            unsafe {
              ptr::write_bytes(ptr, id, size);
              assert!(slice::from_raw_parts(ptr, size).iter().all(|b| *b == id));
              allocator.release(ptr);
            }
          }
        })
      })
      .collect();

    for worker in workers {
      worker.join().unwrap();
    }

    allocator.inspect(|heap| {
      let blocks: Vec<BlockInfo> = heap.blocks().collect();
      assert!(blocks.iter().all(|block| block.is_free));
      for pair in blocks.windows(2) {
        assert_eq!(pair[0].end(), pair[1].address);
      }
      if let Some(last) = blocks.last() {
        assert_eq!(last.end(), heap.brk().current() as usize);
      }
    });
  }
}
