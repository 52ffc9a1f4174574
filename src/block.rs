use std::{mem, ptr};

use crate::align_to;

/// Alignment of every block header and, since headers are a multiple of it,
/// of every payload handed out.
pub const HEADER_ALIGN: usize = 16;

/// Bytes between the start of a block and its payload.
pub const HEADER_SIZE: usize = mem::size_of::<Block>();

/// Header written in front of every payload, in break memory.
#[repr(C, align(16))]
pub struct Block {
  pub size: usize,
  pub is_free: bool,
  pub next: *mut Block,
  /// Bytes skipped in front of the header to realign a misaligned break.
  pub padding: usize,
}

impl Block {
  pub fn new(
    size: usize,
    padding: usize,
  ) -> Self {
    Self {
      size,
      is_free: false,
      next: ptr::null_mut(),
      padding,
    }
  }

  /// Bytes the payload occupies once rounded up to [`HEADER_ALIGN`].
  pub fn payload_span(&self) -> usize {
    align_to!(self.size, HEADER_ALIGN)
  }

  /// Header plus padded payload.
  pub fn footprint(&self) -> usize {
    HEADER_SIZE + self.payload_span()
  }

  /// What the break grew by for this block, alignment padding included.
  pub fn extent(&self) -> usize {
    self.padding + self.footprint()
  }

  /// # Safety
  ///
  /// `block` must point to a live header.
  pub unsafe fn payload(block: *mut Block) -> *mut u8 {
    unsafe { (block as *mut u8).add(HEADER_SIZE) }
  }

  /// # Safety
  ///
  /// `payload` must have been produced by [`Block::payload`].
  pub unsafe fn from_payload(payload: *mut u8) -> *mut Block {
    unsafe { payload.sub(HEADER_SIZE) as *mut Block }
  }

  /// First byte past the padded payload.
  ///
  /// # Safety
  ///
  /// `block` must point to a live header.
  pub unsafe fn end(block: *mut Block) -> *mut u8 {
    unsafe { Block::payload(block).add((*block).payload_span()) }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_header_keeps_payload_aligned() {
    assert_eq!(mem::align_of::<Block>(), HEADER_ALIGN);
    assert_eq!(HEADER_SIZE % HEADER_ALIGN, 0);
  }

  #[test]
  fn test_footprint_rounds_payload() {
    let block = Block::new(1, 0);
    assert_eq!(block.payload_span(), 16);
    assert_eq!(block.footprint(), HEADER_SIZE + 16);

    let block = Block::new(48, 8);
    assert_eq!(block.footprint(), HEADER_SIZE + 48);
    assert_eq!(block.extent(), 8 + HEADER_SIZE + 48);
  }

  #[test]
  fn test_payload_round_trips_to_header() {
    let mut block = Block::new(24, 0);
    let header = &mut block as *mut Block;

    unsafe {
      let payload = Block::payload(header);
      assert_eq!(payload as usize - header as usize, HEADER_SIZE);
      assert_eq!(Block::from_payload(payload), header);
    }
  }
}
