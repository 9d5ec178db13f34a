//! Shared anonymous mapping backing the heap.
//!
//! The region is mapped `MAP_SHARED | MAP_ANONYMOUS`, so a process duplicated
//! with `fork(2)` keeps the same pages at the same address and every write is
//! visible to all of them. All access goes through byte offsets that are
//! checked against the capacity before any memory is touched.

use std::{
  io, mem,
  ptr::{self, NonNull},
};

use tracing::{debug, warn};

use crate::{
  align,
  error::{AllocatorError, Result},
};

/// Size of a page as reported by `sysconf(_SC_PAGESIZE)`.
pub fn page_size() -> usize {
  let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };

  if size <= 0 { 4096 } else { size as usize }
}

/// A fixed-capacity shared byte region.
pub struct Arena {
  base: NonNull<u8>,
  capacity: usize,
}

impl Arena {
  /// Maps at least `requested` bytes, rounded up to a whole number of pages.
  pub fn reserve(requested: usize) -> Result<Self> {
    if requested == 0 {
      return Err(AllocatorError::InvalidSize(requested));
    }

    let capacity =
      align::align_up(requested, page_size()).ok_or(AllocatorError::InvalidSize(requested))?;

    let address = unsafe {
      libc::mmap(
        ptr::null_mut(),
        capacity,
        libc::PROT_READ | libc::PROT_WRITE,
        libc::MAP_SHARED | libc::MAP_ANONYMOUS,
        -1,
        0,
      )
    };

    if address == libc::MAP_FAILED {
      return Err(AllocatorError::ReservationFailed(io::Error::last_os_error()));
    }

    let base = NonNull::new(address.cast::<u8>())
      .ok_or_else(|| AllocatorError::ReservationFailed(io::Error::other("mmap returned null")))?;

    debug!(requested, capacity, base = ?base, "mapped shared arena");

    Ok(Self { base, capacity })
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }

  /// Whether `[offset, offset + len)` lies inside the arena.
  pub fn contains(
    &self,
    offset: usize,
    len: usize,
  ) -> bool {
    offset
      .checked_add(len)
      .is_some_and(|end| end <= self.capacity)
  }

  /// Displacement of `pointer` from the base. The one-past-the-end address is
  /// accepted since a zero-byte payload can sit there.
  pub fn offset_of(
    &self,
    pointer: *const u8,
  ) -> Result<usize> {
    let base = self.base.as_ptr() as usize;
    let address = pointer as usize;

    match address.checked_sub(base) {
      Some(offset) if offset <= self.capacity => Ok(offset),
      _ => Err(AllocatorError::InvalidPointer),
    }
  }

  /// Address of the byte at `offset`.
  pub fn pointer_at(
    &self,
    offset: usize,
  ) -> Result<NonNull<u8>> {
    if offset > self.capacity {
      return Err(AllocatorError::InvalidPointer);
    }

    // SAFETY: `offset <= capacity`, so the result is within or one past the mapping.
    Ok(unsafe { self.base.add(offset) })
  }

  /// Typed view of a `T` stored at `offset`.
  pub fn slot<T>(
    &self,
    offset: usize,
  ) -> Result<NonNull<T>> {
    if offset % mem::align_of::<T>() != 0 || !self.contains(offset, mem::size_of::<T>()) {
      return Err(AllocatorError::InvalidPointer);
    }

    Ok(self.pointer_at(offset)?.cast::<T>())
  }

  /// Copies a `T` out of the arena. `T` must accept any bit pattern.
  pub fn read<T: Copy>(
    &self,
    offset: usize,
  ) -> Result<T> {
    let slot = self.slot::<T>(offset)?;

    // SAFETY: the slot is aligned, in bounds and mapped for the arena's lifetime.
    Ok(unsafe { ptr::read(slot.as_ptr()) })
  }

  pub fn write<T: Copy>(
    &self,
    offset: usize,
    value: T,
  ) -> Result<()> {
    let slot = self.slot::<T>(offset)?;

    // SAFETY: as in `read`; mutation happens under the arena mutex.
    unsafe { ptr::write(slot.as_ptr(), value) };

    Ok(())
  }
}

impl Drop for Arena {
  fn drop(&mut self) {
    let rc = unsafe { libc::munmap(self.base.as_ptr().cast(), self.capacity) };

    if rc != 0 {
      warn!(error = %io::Error::last_os_error(), "munmap of shared arena failed");
    } else {
      debug!(capacity = self.capacity, "unmapped shared arena");
    }
  }
}

// SAFETY: the mapping is process-shared memory with no thread affinity. Every
// mutation of arena-resident structures is serialised by the arena mutex.
unsafe impl Send for Arena {}
unsafe impl Sync for Arena {}
