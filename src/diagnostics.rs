//! Observational views of the arena layout.

use std::{fmt, io};

use crate::{block::HEADER_SIZE, error::Result, free_list::FreeList};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegionStatus {
  Free,
  Full,
}

impl fmt::Display for RegionStatus {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    match self {
      RegionStatus::Free => f.write_str("Free"),
      RegionStatus::Full => f.write_str("Full"),
    }
  }
}

/// A byte range of the arena. Free regions include their header; full
/// regions are the gaps between free entries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Region {
  pub offset: usize,
  pub size: usize,
  pub status: RegionStatus,
}

impl Region {
  pub fn free(
    offset: usize,
    size: usize,
  ) -> Self {
    Self {
      offset,
      size,
      status: RegionStatus::Free,
    }
  }

  pub fn full(
    offset: usize,
    size: usize,
  ) -> Self {
    Self {
      offset,
      size,
      status: RegionStatus::Full,
    }
  }
}

impl fmt::Display for Region {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    write!(
      f,
      "Address: {}, Size: {}, Status: {}",
      self.offset, self.size, self.status
    )
  }
}

/// One free-list entry: header offset and payload size.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FreeBlock {
  pub offset: usize,
  pub size: usize,
}

impl FreeBlock {
  /// Bytes covered including the header.
  pub fn span(&self) -> usize {
    HEADER_SIZE + self.size
  }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HeapStats {
  pub capacity: usize,
  /// Free bytes including the headers of free blocks.
  pub free_bytes: usize,
  pub used_bytes: usize,
  pub free_blocks: usize,
  /// Largest request that can currently succeed.
  pub largest_free: usize,
}

pub(crate) fn free_blocks(list: &FreeList<'_>) -> Result<Vec<FreeBlock>> {
  list
    .walk()
    .map(|candidate| {
      candidate.map(|candidate| FreeBlock {
        offset: candidate.block.offset,
        size: candidate.block.size(),
      })
    })
    .collect()
}

/// Alternating free and full ranges from the arena base to its end.
pub(crate) fn regions(list: &FreeList<'_>) -> Result<Vec<Region>> {
  let capacity = list.arena().capacity();
  let mut regions = Vec::new();
  let mut covered = 0;

  for candidate in list.walk() {
    let block = candidate?.block;

    if block.offset > covered {
      regions.push(Region::full(covered, block.offset - covered));
    }
    regions.push(Region::free(block.offset, block.header.span()));
    covered = block.end();
  }

  if covered < capacity {
    regions.push(Region::full(covered, capacity - covered));
  }

  Ok(regions)
}

pub(crate) fn stats(list: &FreeList<'_>) -> Result<HeapStats> {
  let capacity = list.arena().capacity();
  let mut stats = HeapStats {
    capacity,
    ..HeapStats::default()
  };

  for candidate in list.walk() {
    let block = candidate?.block;
    stats.free_bytes += block.header.span();
    stats.free_blocks += 1;
    stats.largest_free = stats.largest_free.max(block.size());
  }
  stats.used_bytes = capacity.saturating_sub(stats.free_bytes);

  Ok(stats)
}

/// Writes one `Address: .., Size: .., Status: ..` line per region.
pub fn write_regions<W: io::Write>(
  out: &mut W,
  regions: &[Region],
) -> io::Result<()> {
  for region in regions {
    writeln!(out, "{region}")?;
  }

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{arena::Arena, free_list::fixtures::lay_out};

  #[test]
  fn test_region_display() {
    assert_eq!(
      Region::free(96, 4000).to_string(),
      "Address: 96, Size: 4000, Status: Free"
    );
    assert_eq!(Region::full(0, 96).to_string(), "Address: 0, Size: 96, Status: Full");
  }

  #[test]
  fn test_regions_alternate_and_cover_capacity() {
    let arena = Arena::reserve(4096).unwrap();
    let (control, offsets) = lay_out(&arena, &[(32, false), (40, true), (16, false), (0, true)]);
    let list = FreeList::detached(&arena, control);

    let regions = regions(&list).unwrap();

    assert_eq!(
      regions,
      vec![
        Region::full(0, offsets[1]),
        Region::free(offsets[1], HEADER_SIZE + 40),
        Region::full(offsets[2], HEADER_SIZE + 16),
        Region::free(offsets[3], arena.capacity() - offsets[3]),
      ]
    );
    assert_eq!(regions.iter().map(|r| r.size).sum::<usize>(), arena.capacity());
  }

  #[test]
  fn test_regions_of_full_arena() {
    let arena = Arena::reserve(4096).unwrap();
    let (control, _) = lay_out(&arena, &[(0, false)]);
    let list = FreeList::detached(&arena, control);

    assert_eq!(regions(&list).unwrap(), vec![Region::full(0, arena.capacity())]);
  }

  #[test]
  fn test_stats() {
    let arena = Arena::reserve(4096).unwrap();
    let (control, offsets) = lay_out(&arena, &[(32, false), (40, true), (16, false), (0, true)]);
    let list = FreeList::detached(&arena, control);
    let tail = arena.capacity() - offsets[3] - HEADER_SIZE;

    let stats = stats(&list).unwrap();

    assert_eq!(stats.free_blocks, 2);
    assert_eq!(stats.free_bytes, 2 * HEADER_SIZE + 40 + tail);
    assert_eq!(stats.used_bytes + stats.free_bytes, arena.capacity());
    assert_eq!(stats.largest_free, tail);
  }

  #[test]
  fn test_write_regions() {
    let mut out = Vec::new();
    write_regions(&mut out, &[Region::full(0, 8), Region::free(8, 24)]).unwrap();

    assert_eq!(
      String::from_utf8(out).unwrap(),
      "Address: 0, Size: 8, Status: Full\nAddress: 8, Size: 24, Status: Free\n"
    );
  }
}
