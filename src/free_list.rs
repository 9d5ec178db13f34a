//! Address-ordered free list threaded through the block headers.

use tracing::trace;

use crate::{
  arena::Arena,
  block::{self, Block, BlockHeader, HEADER_SIZE, NIL},
  error::{AllocatorError, Result},
  lock::LockGuard,
};

/// Arena-resident control block of the free list.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FreeListControl {
  pub head: usize,
  /// Block the next-fit strategy resumes from. [`NIL`] means `head`.
  pub next_free_block: usize,
}

impl FreeListControl {
  pub fn starting_at(head: usize) -> Self {
    Self {
      head,
      next_free_block: head,
    }
  }
}

/// A free block together with the free block linked in front of it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Candidate {
  pub block: Block,
  pub prev: Option<usize>,
}

/// Working view of the free list.
///
/// The control block is copied out on construction; the owner stores
/// [`FreeList::control`] back once the operation is complete.
pub struct FreeList<'a> {
  arena: &'a Arena,
  control: FreeListControl,
}

impl<'a> FreeList<'a> {
  /// View over a list nobody else can reach yet. Only used while bootstrapping
  /// an arena, before its mutex exists.
  pub(crate) fn detached(
    arena: &'a Arena,
    control: FreeListControl,
  ) -> Self {
    Self { arena, control }
  }

  /// Loads the list stored at `control_at`. Requires the arena mutex.
  pub(crate) fn locked(
    arena: &'a Arena,
    control_at: usize,
    _guard: &LockGuard<'_>,
  ) -> Result<Self> {
    let control = arena.read::<FreeListControl>(control_at)?;

    Ok(Self { arena, control })
  }

  pub fn control(&self) -> FreeListControl {
    self.control
  }

  pub fn arena(&self) -> &'a Arena {
    self.arena
  }

  pub fn head(&self) -> Option<usize> {
    block::link(self.control.head)
  }

  pub fn cursor(&self) -> Option<usize> {
    block::link(self.control.next_free_block)
  }

  pub(crate) fn set_cursor(
    &mut self,
    cursor: Option<usize>,
  ) {
    self.control.next_free_block = block::raw_link(cursor);
  }

  pub fn block(
    &self,
    offset: usize,
  ) -> Result<Block> {
    Ok(Block::new(offset, self.arena.read::<BlockHeader>(offset)?))
  }

  /// Iterates the list from `head`.
  pub fn walk(&self) -> Walk<'_, 'a> {
    Walk {
      list: self,
      current: self.control.head,
      prev: None,
    }
  }

  /// Iterates the list from an already located entry to the tail.
  pub fn walk_from(
    &self,
    start: Candidate,
  ) -> Walk<'_, 'a> {
    Walk {
      list: self,
      current: start.block.offset,
      prev: start.prev,
    }
  }

  /// Finds the entry at `offset`, if it is on the list.
  pub fn locate(
    &self,
    offset: usize,
  ) -> Result<Option<Candidate>> {
    for candidate in self.walk() {
      let candidate = candidate?;
      if candidate.block.offset == offset {
        return Ok(Some(candidate));
      }
      if candidate.block.offset > offset {
        break;
      }
    }

    Ok(None)
  }

  /// Carves `size` payload bytes out of the front of `candidate`.
  ///
  /// A remainder that could not hold at least one payload byte after its
  /// header stays with the allocation.
  pub fn split(
    &mut self,
    candidate: Candidate,
    size: usize,
  ) -> Result<()> {
    let Candidate { block, prev } = candidate;
    let mut header = block.header;

    let follower = if header.size > size.saturating_add(HEADER_SIZE) {
      let remainder_at = block.offset + HEADER_SIZE + size;
      let remainder = BlockHeader::free(header.size - size - HEADER_SIZE, header.next);
      self.arena.write(remainder_at, remainder)?;
      header.size = size;

      trace!(
        block = block.offset,
        size,
        remainder = remainder_at,
        remainder_size = remainder.size,
        "split free block"
      );
      Some(remainder_at)
    } else {
      trace!(block = block.offset, size = header.size, "consumed whole free block");
      block.next()
    };

    self.relink(prev, follower)?;

    header.next = NIL;
    self.arena.write(block.offset, header)?;

    let cursor = follower.or(self.head());
    self.set_cursor(cursor);

    Ok(())
  }

  /// Stamps the block at `offset` as a live allocation.
  pub fn stamp(
    &mut self,
    offset: usize,
  ) -> Result<()> {
    let mut header = self.arena.read::<BlockHeader>(offset)?;
    header.mark_allocated();
    self.arena.write(offset, header)
  }

  /// Validates the allocation owning `payload` and returns it to the list,
  /// merging it with byte-adjacent free neighbours. Nothing is modified when
  /// validation fails.
  pub fn release(
    &mut self,
    payload: usize,
  ) -> Result<Block> {
    let at = block::header_offset(payload)?;
    let mut header = self.arena.read::<BlockHeader>(at)?;

    if !header.is_allocated() || !self.arena.contains(at, header.span()) {
      return Err(AllocatorError::InvalidPointer);
    }

    let freed = Block::new(at, header);
    let (prev, next) = self.neighbours(&freed)?;

    header.mark_freed();
    header.next = block::raw_link(next.map(|block| block.offset));
    self.arena.write(at, header)?;
    self.relink(prev.map(|block| block.offset), Some(at))?;

    let survivor = self.coalesce(
      at,
      prev.map(|block| block.offset),
      next.map(|block| block.offset),
    )?;

    self.block(survivor)
  }

  /// Merges the freshly linked block at `freed` with its list neighbours when
  /// they touch it. Returns the offset of the block that now covers `freed`.
  pub fn coalesce(
    &mut self,
    freed: usize,
    prev: Option<usize>,
    next: Option<usize>,
  ) -> Result<usize> {
    let mut merged = self.block(freed)?;
    let mut survivor = freed;

    if let Some(next) = next {
      let successor = self.block(next)?;
      if merged.end() == successor.offset {
        merged.header.size += successor.header.span();
        merged.header.next = successor.header.next;
        self.arena.write(freed, merged.header)?;

        if self.cursor() == Some(next) {
          self.set_cursor(Some(freed));
        }
        trace!(block = freed, absorbed = next, size = merged.size(), "coalesced with successor");
      }
    }

    if let Some(prev) = prev {
      let mut predecessor = self.block(prev)?;
      if predecessor.end() == freed {
        predecessor.header.size += merged.header.span();
        predecessor.header.next = merged.header.next;
        self.arena.write(prev, predecessor.header)?;

        if self.cursor() == Some(freed) {
          self.set_cursor(Some(prev));
        }
        survivor = prev;
        trace!(
          block = prev,
          absorbed = freed,
          size = predecessor.size(),
          "coalesced with predecessor"
        );
      }
    }

    Ok(survivor)
  }

  /// Free entries immediately below and above `freed` in address order.
  ///
  /// Walks the whole list so the insertion point keeps strict ascending
  /// order even when `freed` lies past the current tail.
  fn neighbours(
    &self,
    freed: &Block,
  ) -> Result<(Option<Block>, Option<Block>)> {
    let mut prev: Option<Block> = None;
    let mut next = None;

    for candidate in self.walk() {
      let Candidate { block, .. } = candidate?;

      if block.offset == freed.offset {
        return Err(AllocatorError::InvalidPointer);
      }
      if block.offset > freed.offset {
        next = Some(block);
        break;
      }
      prev = Some(block);
    }

    let overlaps_prev = prev.is_some_and(|prev| prev.end() > freed.offset);
    let overlaps_next = next.is_some_and(|next| freed.end() > next.offset);
    if overlaps_prev || overlaps_next {
      return Err(AllocatorError::InvalidPointer);
    }

    Ok((prev, next))
  }

  /// Points `prev`'s link (or `head`) at `target`.
  fn relink(
    &mut self,
    prev: Option<usize>,
    target: Option<usize>,
  ) -> Result<()> {
    match prev {
      Some(prev) => {
        let mut header = self.arena.read::<BlockHeader>(prev)?;
        header.next = block::raw_link(target);
        self.arena.write(prev, header)
      }
      None => {
        self.control.head = block::raw_link(target);
        Ok(())
      }
    }
  }
}

/// Iterator over free-list entries. Yields an error and stops if a link
/// points outside the arena.
pub struct Walk<'l, 'a> {
  list: &'l FreeList<'a>,
  current: usize,
  prev: Option<usize>,
}

impl Iterator for Walk<'_, '_> {
  type Item = Result<Candidate>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.current == NIL {
      return None;
    }

    let offset = self.current;

    match self.list.block(offset) {
      Ok(block) => {
        let candidate = Candidate {
          block,
          prev: self.prev,
        };
        self.prev = Some(offset);
        self.current = block.header.next;
        Some(Ok(candidate))
      }
      Err(err) => {
        self.current = NIL;
        Some(Err(err))
      }
    }
  }
}


#[cfg(test)]
mod tests {
  use super::{fixtures::*, *};
  use crate::block::payload_offset;

  fn arena() -> Arena {
    Arena::reserve(4096).unwrap()
  }

  #[test]
  fn test_split_leaves_remainder_in_place() {
    let arena = arena();
    let capacity = arena.capacity();
    let (control, _) = lay_out(&arena, &[(0, true)]);
    let mut list = FreeList::detached(&arena, control);

    let candidate = list.locate(0).unwrap().unwrap();
    list.split(candidate, 64).unwrap();

    let remainder_at = HEADER_SIZE + 64;
    assert_eq!(list.head(), Some(remainder_at));
    assert_eq!(list.cursor(), Some(remainder_at));
    assert_eq!(
      entries(&list),
      vec![(remainder_at, capacity - 2 * HEADER_SIZE - 64)]
    );
    assert_eq!(list.block(0).unwrap().size(), 64);
  }

  #[test]
  fn test_split_hands_out_slack_when_remainder_too_small() {
    let arena = arena();
    let (control, offsets) = lay_out(&arena, &[(64, true), (32, false), (0, true)]);
    let mut list = FreeList::detached(&arena, control);

    let candidate = list.locate(0).unwrap().unwrap();
    list.split(candidate, 64 - HEADER_SIZE).unwrap();

    assert_eq!(list.block(0).unwrap().size(), 64);
    assert_eq!(list.head(), Some(offsets[2]));
    assert_eq!(list.cursor(), Some(offsets[2]));
  }

  #[test]
  fn test_split_of_tail_resets_cursor_to_head() {
    let arena = arena();
    let (control, offsets) = lay_out(&arena, &[(64, true), (32, false), (0, true)]);
    let mut list = FreeList::detached(&arena, control);
    let tail = list.block(offsets[2]).unwrap();

    let candidate = list.locate(offsets[2]).unwrap().unwrap();
    list.split(candidate, tail.size()).unwrap();

    assert_eq!(entries(&list), vec![(0, 64)]);
    assert_eq!(list.cursor(), Some(0));
  }

  #[test]
  fn test_consuming_last_entry_empties_list() {
    let arena = arena();
    let (control, _) = lay_out(&arena, &[(0, true)]);
    let mut list = FreeList::detached(&arena, control);
    let whole = list.block(0).unwrap().size();

    let candidate = list.locate(0).unwrap().unwrap();
    list.split(candidate, whole).unwrap();

    assert_eq!(list.head(), None);
    assert_eq!(list.cursor(), None);
  }

  #[test]
  fn test_release_into_empty_list() {
    let arena = arena();
    let (control, _) = lay_out(&arena, &[(0, false)]);
    let mut list = FreeList::detached(&arena, control);

    let released = list.release(payload_offset(0).unwrap()).unwrap();

    assert_eq!(released.offset, 0);
    assert_eq!(list.head(), Some(0));
    assert!(list.block(0).unwrap().header.is_freed());
  }

  #[test]
  fn test_release_merges_with_successor_and_moves_cursor() {
    let arena = arena();
    let (control, offsets) = lay_out(&arena, &[(40, false), (48, true), (16, false), (0, true)]);
    let mut list = FreeList::detached(&arena, control);
    list.set_cursor(Some(offsets[1]));

    let merged = list.release(payload_offset(offsets[0]).unwrap()).unwrap();

    assert_eq!(merged.offset, 0);
    assert_eq!(merged.size(), 40 + HEADER_SIZE + 48);
    assert_eq!(list.cursor(), Some(0));
    assert_eq!(list.head(), Some(0));
    assert_eq!(merged.next(), Some(offsets[3]));
  }

  #[test]
  fn test_release_merges_with_predecessor() {
    let arena = arena();
    let (control, offsets) = lay_out(&arena, &[(40, true), (48, false), (16, false), (0, true)]);
    let mut list = FreeList::detached(&arena, control);

    let merged = list.release(payload_offset(offsets[1]).unwrap()).unwrap();

    assert_eq!(merged.offset, 0);
    assert_eq!(merged.size(), 40 + HEADER_SIZE + 48);
    assert_eq!(merged.next(), Some(offsets[3]));
  }

  #[test]
  fn test_release_merges_three_ways() {
    let arena = arena();
    let (control, offsets) = lay_out(&arena, &[(40, true), (48, false), (16, true), (0, false)]);
    let mut list = FreeList::detached(&arena, control);
    list.set_cursor(Some(offsets[2]));

    let merged = list.release(payload_offset(offsets[1]).unwrap()).unwrap();

    assert_eq!(merged.offset, 0);
    assert_eq!(merged.size(), 40 + 48 + 16 + 2 * HEADER_SIZE);
    assert_eq!(entries(&list), vec![(0, merged.size())]);
    assert_eq!(list.cursor(), Some(0));
  }

  #[test]
  fn test_release_without_adjacent_neighbours() {
    let arena = arena();
    let (control, offsets) =
      lay_out(&arena, &[(40, true), (8, false), (48, false), (8, false), (0, true)]);
    let mut list = FreeList::detached(&arena, control);

    list.release(payload_offset(offsets[2]).unwrap()).unwrap();

    assert_eq!(
      entries(&list).iter().map(|(offset, _)| *offset).collect::<Vec<_>>(),
      vec![0, offsets[2], offsets[4]]
    );
  }

  #[test]
  fn test_release_past_tail_appends_in_order() {
    let arena = arena();
    let (control, offsets) =
      lay_out(&arena, &[(40, true), (8, false), (32, true), (8, false), (0, false)]);
    let mut list = FreeList::detached(&arena, control);

    list.release(payload_offset(offsets[4]).unwrap()).unwrap();

    let order: Vec<usize> = entries(&list).iter().map(|(offset, _)| *offset).collect();
    assert_eq!(order, vec![0, offsets[2], offsets[4]]);
  }

  #[test]
  fn test_release_past_single_head_appends_in_order() {
    let arena = arena();
    let (control, offsets) = lay_out(&arena, &[(40, true), (8, false), (0, false)]);
    let mut list = FreeList::detached(&arena, control);

    list.release(payload_offset(offsets[2]).unwrap()).unwrap();

    let order: Vec<usize> = entries(&list).iter().map(|(offset, _)| *offset).collect();
    assert_eq!(order, vec![0, offsets[2]]);
  }

  #[test]
  fn test_release_rejects_free_block() {
    let arena = arena();
    let (control, offsets) = lay_out(&arena, &[(40, false), (0, true)]);
    let mut list = FreeList::detached(&arena, control);

    let err = list.release(payload_offset(offsets[1]).unwrap()).unwrap_err();

    assert!(matches!(err, AllocatorError::InvalidPointer));
    assert_eq!(entries(&list).len(), 1);
  }

  #[test]
  fn test_release_rejects_header_overlapping_free_block() {
    let arena = arena();
    let (control, _) = lay_out(&arena, &[(0, true)]);
    let mut list = FreeList::detached(&arena, control);

    // Forge a valid-looking header inside the free block.
    arena.write(64, BlockHeader::allocated(16)).unwrap();

    let err = list.release(payload_offset(64).unwrap()).unwrap_err();
    assert!(matches!(err, AllocatorError::InvalidPointer));
  }

  #[test]
  fn test_release_rejects_header_inside_free_block_before_tail() {
    let arena = arena();
    let (control, offsets) = lay_out(&arena, &[(256, true), (8, false), (0, true)]);
    let mut list = FreeList::detached(&arena, control);
    let before = entries(&list);

    arena.write(64, BlockHeader::allocated(16)).unwrap();

    let err = list.release(payload_offset(64).unwrap()).unwrap_err();
    assert!(matches!(err, AllocatorError::InvalidPointer));
    assert_eq!(entries(&list), before);
    assert_eq!(list.head(), Some(0));
    assert_eq!(list.block(0).unwrap().next(), Some(offsets[2]));
  }

  #[test]
  fn test_release_rejects_header_running_into_successor() {
    let arena = arena();
    let (control, offsets) = lay_out(&arena, &[(40, false), (0, true)]);
    let mut list = FreeList::detached(&arena, control);

    arena.write(0, BlockHeader::allocated(40 + HEADER_SIZE)).unwrap();

    let err = list.release(payload_offset(offsets[0]).unwrap()).unwrap_err();
    assert!(matches!(err, AllocatorError::InvalidPointer));
    assert_eq!(list.head(), Some(offsets[1]));
  }

  #[test]
  fn test_walk_stops_on_out_of_range_link() {
    let arena = arena();
    let (control, _) = lay_out(&arena, &[(0, true)]);
    arena.write(0, BlockHeader::free(16, arena.capacity() + 64)).unwrap();
    let list = FreeList::detached(&arena, control);

    let results: Vec<_> = list.walk().collect();
    assert_eq!(results.len(), 2);
    assert!(results[1].is_err());
  }
}
