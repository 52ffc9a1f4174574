use std::{
  fmt,
  marker::PhantomData,
  ptr::{self, NonNull},
};

use crate::{
  align::checked_align_to,
  align_to,
  block::{Block, HEADER_ALIGN, HEADER_SIZE},
  brk::ProgramBreak,
  error::{Error, Result},
};

/// Where the memory for an allocation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
  /// A free block found by the first-fit scan.
  Reused { capacity: usize },
  /// A new block appended after moving the break up by `increment` bytes.
  Grown { increment: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
  pub payload: NonNull<u8>,
  pub source: Source,
}

/// What releasing a block did to the heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
  /// The block stays in the list, flagged free.
  MarkedFree,
  /// The block was the tail; it was unlinked and the break moved down by
  /// `decrement` bytes, back to where it stood before the block was grown.
  Retracted { decrement: usize },
}

/// A copy of one block header, detached from the heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
  pub address: usize,
  pub size: usize,
  pub is_free: bool,
  pub next: usize,
}

impl BlockInfo {
  pub fn payload(&self) -> usize {
    self.address + HEADER_SIZE
  }

  pub fn end(&self) -> usize {
    self.payload() + align_to!(self.size, HEADER_ALIGN)
  }
}

impl fmt::Display for BlockInfo {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    write!(
      f,
      "addr = {:#x}, size = {}, is_free = {}, next = {:#x}",
      self.address, self.size, self.is_free, self.next
    )
  }
}

/// The block list together with the break it was carved from.
///
/// Blocks are appended in break order, so walking from `head` visits them
/// by ascending address, and `tail` is the block that ends at the break.
/// Nothing here is synchronized; [`crate::Allocator`] puts it behind a lock.
pub struct Heap<B> {
  head: *mut Block,
  tail: *mut Block,
  brk: B,
}

// Every block is owned by the heap and reachable only through it.
unsafe impl<B: Send> Send for Heap<B> {}

impl<B: ProgramBreak> Heap<B> {
  pub const fn new(brk: B) -> Self {
    Self {
      head: ptr::null_mut(),
      tail: ptr::null_mut(),
      brk,
    }
  }

  pub fn brk(&self) -> &B {
    &self.brk
  }

  pub fn len(&self) -> usize {
    self.blocks().count()
  }

  pub fn is_empty(&self) -> bool {
    self.head.is_null()
  }

  pub fn blocks(&self) -> Blocks<'_> {
    Blocks {
      current: self.head,
      _heap: PhantomData,
    }
  }

  /// First-fit: the first free block, in list order, with room for `size`.
  pub fn find_free_block(
    &self,
    size: usize,
  ) -> Option<NonNull<Block>> {
    let mut current = self.head;

    while !current.is_null() {
      unsafe {
        if (*current).is_free && (*current).size >= size {
          return NonNull::new(current);
        }
        current = (*current).next;
      }
    }

    None
  }

  /// Hands out a free block if one fits, otherwise grows the break.
  ///
  /// Zero is accepted here and yields a block with an empty payload; the
  /// allocator rejects it before it gets this far.
  pub fn allocate(
    &mut self,
    size: usize,
  ) -> Result<Allocation> {
    if let Some(block) = self.find_free_block(size) {
      let block = block.as_ptr();

      unsafe {
        (*block).is_free = false;

        return Ok(Allocation {
          payload: NonNull::new_unchecked(Block::payload(block)),
          source: Source::Reused {
            capacity: (*block).size,
          },
        });
      }
    }

    self.grow(size)
  }

  fn grow(
    &mut self,
    size: usize,
  ) -> Result<Allocation> {
    let padding = (self.brk.current() as usize).wrapping_neg() & (HEADER_ALIGN - 1);

    let increment = checked_align_to(size, HEADER_ALIGN)
      .and_then(|span| span.checked_add(HEADER_SIZE + padding))
      .and_then(|total| isize::try_from(total).ok())
      .ok_or(Error::OutOfMemory {
        requested: isize::MAX,
      })?;

    let address = unsafe { self.brk.adjust(increment)? };

    let block = unsafe { address.add(padding) } as *mut Block;

    unsafe {
      block.write(Block::new(size, padding));

      if self.head.is_null() {
        self.head = block;
      } else {
        (*self.tail).next = block;
      }
      self.tail = block;

      Ok(Allocation {
        payload: NonNull::new_unchecked(Block::payload(block)),
        source: Source::Grown {
          increment: increment as usize,
        },
      })
    }
  }

  /// Gives a block back.
  ///
  /// A block that ends exactly at the break is the tail: it is unlinked and
  /// its memory returned by moving the break down. Any other block is only
  /// flagged free. If the break refuses to move, the tail is kept and
  /// flagged free as well.
  ///
  /// The break is read and then moved in two steps. Code outside this heap
  /// that grows the break in between loses that memory.
  ///
  /// # Safety
  ///
  /// `payload` must come from this heap and not have been released since.
  pub unsafe fn release(
    &mut self,
    payload: NonNull<u8>,
  ) -> Release {
    unsafe {
      let block = Block::from_payload(payload.as_ptr());

      if Block::end(block) != self.brk.current() {
        (*block).is_free = true;
        return Release::MarkedFree;
      }

      debug_assert_eq!(block, self.tail);

      let decrement = (*block).extent();

      if self.brk.adjust(-(decrement as isize)).is_err() {
        (*block).is_free = true;
        return Release::MarkedFree;
      }

      self.unlink_tail();

      Release::Retracted { decrement }
    }
  }

  fn unlink_tail(&mut self) {
    if self.head == self.tail {
      self.head = ptr::null_mut();
      self.tail = ptr::null_mut();
      return;
    }

    let mut current = self.head;

    while !current.is_null() {
      unsafe {
        if (*current).next == self.tail {
          (*current).next = ptr::null_mut();
          self.tail = current;
          return;
        }
        current = (*current).next;
      }
    }
  }

  /// Writes `head`/`tail` followed by one line per block, in list order.
  pub fn dump(
    &self,
    out: &mut impl fmt::Write,
  ) -> fmt::Result {
    writeln!(out, "head = {:p}, tail = {:p}", self.head, self.tail)?;

    for block in self.blocks() {
      writeln!(out, "{block}")?;
    }

    Ok(())
  }
}

/// Walks the list from `head`, copying out each header.
pub struct Blocks<'a> {
  current: *mut Block,
  _heap: PhantomData<&'a ()>,
}

impl Iterator for Blocks<'_> {
  type Item = BlockInfo;

  fn next(&mut self) -> Option<BlockInfo> {
    if self.current.is_null() {
      return None;
    }

    let block = self.current;

    unsafe {
      self.current = (*block).next;

      Some(BlockInfo {
        address: block as usize,
        size: (*block).size,
        is_free: (*block).is_free,
        next: (*block).next as usize,
      })
    }
  }
}
