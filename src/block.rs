use std::mem;

use crate::error::{AllocatorError, Result};

/// Sentinel written into the header of every block handed out by a strategy.
pub const BLOCK_TAG: u32 = 0x1234_5678;

/// Link value marking the end of the free list.
pub const NIL: usize = usize::MAX;

/// Bytes occupied by a header in front of every payload.
pub const HEADER_SIZE: usize = crate::align!(mem::size_of::<BlockHeader>());

const FREED: u32 = 1;
const IN_USE: u32 = 0;

/// In-band metadata stored immediately before each payload.
///
/// Every field is a plain integer: `release` reads headers at offsets derived
/// from caller-supplied pointers, so any bit pattern must be a valid value.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockHeader {
  /// Payload bytes, header excluded.
  pub size: usize,
  /// Offset of the next free block, or [`NIL`].
  pub next: usize,
  pub tag: u32,
  pub is_freed: u32,
}

impl BlockHeader {
  pub fn new(
    size: usize,
    next: usize,
    tag: u32,
    is_freed: bool,
  ) -> Self {
    Self {
      size,
      next,
      tag,
      is_freed: if is_freed { FREED } else { IN_USE },
    }
  }

  /// Header for a block about to be linked into the free list.
  pub fn free(
    size: usize,
    next: usize,
  ) -> Self {
    Self::new(size, next, 0, true)
  }

  #[cfg(test)]
  pub fn allocated(size: usize) -> Self {
    Self::new(size, NIL, BLOCK_TAG, false)
  }

  pub fn is_freed(&self) -> bool {
    self.is_freed != IN_USE
  }

  /// True only for a header stamped by an allocation and not yet released.
  pub fn is_allocated(&self) -> bool {
    self.tag == BLOCK_TAG && !self.is_freed()
  }

  pub fn mark_allocated(&mut self) {
    self.tag = BLOCK_TAG;
    self.is_freed = IN_USE;
  }

  pub fn mark_freed(&mut self) {
    self.is_freed = FREED;
  }

  /// Header plus payload.
  pub fn span(&self) -> usize {
    HEADER_SIZE.saturating_add(self.size)
  }
}

/// A header together with the offset it was read from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Block {
  pub offset: usize,
  pub header: BlockHeader,
}

impl Block {
  pub fn new(
    offset: usize,
    header: BlockHeader,
  ) -> Self {
    Self { offset, header }
  }

  pub fn size(&self) -> usize {
    self.header.size
  }

  /// First byte past the payload, which is where a byte-adjacent block starts.
  pub fn end(&self) -> usize {
    self.offset.saturating_add(self.header.span())
  }

  pub fn fits(
    &self,
    size: usize,
  ) -> bool {
    self.header.size >= size
  }

  pub fn next(&self) -> Option<usize> {
    link(self.header.next)
  }
}

/// Decodes a stored link.
pub fn link(raw: usize) -> Option<usize> {
  (raw != NIL).then_some(raw)
}

/// Encodes a link for storage.
pub fn raw_link(link: Option<usize>) -> usize {
  link.unwrap_or(NIL)
}

/// Offset of the payload belonging to the header at `header`.
pub fn payload_offset(header: usize) -> Result<usize> {
  header
    .checked_add(HEADER_SIZE)
    .ok_or(AllocatorError::InvalidPointer)
}

/// Offset of the header that precedes the payload at `payload`.
pub fn header_offset(payload: usize) -> Result<usize> {
  if payload % mem::align_of::<BlockHeader>() != 0 {
    return Err(AllocatorError::InvalidPointer);
  }

  payload
    .checked_sub(HEADER_SIZE)
    .ok_or(AllocatorError::InvalidPointer)
}
