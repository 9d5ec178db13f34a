use std::{
  io::{self, Write},
  mem, process,
  ptr::NonNull,
};

use tracing::{debug, trace, warn};

use crate::{
  align,
  arena::Arena,
  block::{BlockHeader, HEADER_SIZE, NIL},
  config::HeapConfig,
  diagnostics::{self, FreeBlock, HeapStats, Region},
  error::{AllocatorError, Result},
  free_list::{FreeList, FreeListControl},
  lock::{RawMutex, SharedMutex},
  strategy::Strategy,
};

/// A heap over one shared arena.
///
/// The free-list control block and the mutex are the first two allocations in
/// the arena, so a forked child that inherits this handle operates on exactly
/// the same state as its parent.
pub struct SharedHeap {
  arena: Arena,
  control: usize,
  mutex: SharedMutex,
  default_strategy: Strategy,
  owner: u32,
  lock_destroyed: bool,
}

impl SharedHeap {
  /// Maps an arena of at least `capacity` bytes with default settings.
  pub fn new(capacity: usize) -> Result<Self> {
    Self::with_config(HeapConfig::new(capacity))
  }

  pub fn with_config(config: HeapConfig) -> Result<Self> {
    let arena = Arena::reserve(config.capacity)?;
    let capacity = arena.capacity();

    arena.write(0, BlockHeader::free(capacity - HEADER_SIZE, NIL))?;

    let mut list = FreeList::detached(&arena, FreeListControl::starting_at(0));
    let control = bootstrap(&mut list, mem::size_of::<FreeListControl>(), capacity)?;
    let mutex_at = bootstrap(&mut list, mem::size_of::<RawMutex>(), capacity)?;
    arena.write(control, list.control())?;

    let mutex = unsafe { SharedMutex::init(arena.slot::<RawMutex>(mutex_at)?)? };

    debug!(
      capacity,
      control,
      mutex = mutex_at,
      strategy = %config.default_strategy,
      "initialized shared heap"
    );

    Ok(Self {
      arena,
      control,
      mutex,
      default_strategy: config.default_strategy,
      owner: process::id(),
      lock_destroyed: false,
    })
  }

  /// Allocates `size` bytes, rounded up to the machine word.
  pub fn allocate(
    &self,
    size: usize,
    strategy: Strategy,
  ) -> Result<NonNull<u8>> {
    let rounded = align::align_word(size).ok_or(AllocatorError::NoFitFound { requested: size })?;
    let payload = self.mutate(|list| strategy.place(list, rounded))?;

    trace!(size, %strategy, offset = payload, "allocated");

    self.arena.pointer_at(payload)
  }

  /// Allocates with the configured default strategy.
  pub fn allocate_default(
    &self,
    size: usize,
  ) -> Result<NonNull<u8>> {
    self.allocate(size, self.default_strategy)
  }

  /// Returns the block owning `pointer` to the free list.
  ///
  /// Null pointers, pointers outside the arena, pointers that are not the
  /// start of a live allocation and already released pointers are rejected
  /// with [`AllocatorError::InvalidPointer`] and leave the heap untouched.
  pub fn release(
    &self,
    pointer: *mut u8,
  ) -> Result<()> {
    let outcome = self.mutate(|list| {
      if pointer.is_null() {
        return Err(AllocatorError::InvalidPointer);
      }

      let payload = self.arena.offset_of(pointer)?;
      list.release(payload)
    });

    match outcome {
      Ok(merged) => {
        trace!(?pointer, block = merged.offset, size = merged.size(), "released");
        Ok(())
      }
      Err(err) => {
        warn!(?pointer, error = %err, "rejected release");
        Err(err)
      }
    }
  }

  /// Displacement of `pointer` from the arena base. Unlike raw addresses,
  /// offsets mean the same thing in every process sharing the arena.
  pub fn address_offset(
    &self,
    pointer: *const u8,
  ) -> Result<usize> {
    self.arena.offset_of(pointer)
  }

  /// Address of the byte at `offset` in this process.
  pub fn pointer_at(
    &self,
    offset: usize,
  ) -> Result<NonNull<u8>> {
    self.arena.pointer_at(offset)
  }

  pub fn capacity(&self) -> usize {
    self.arena.capacity()
  }

  pub fn default_strategy(&self) -> Strategy {
    self.default_strategy
  }

  pub fn free_blocks(&self) -> Result<Vec<FreeBlock>> {
    self.inspect(diagnostics::free_blocks)
  }

  pub fn regions(&self) -> Result<Vec<Region>> {
    self.inspect(diagnostics::regions)
  }

  pub fn stats(&self) -> Result<HeapStats> {
    self.inspect(diagnostics::stats)
  }

  /// Prints the layout to stdout.
  pub fn dump_free_list(&self) -> Result<()> {
    self.dump_free_list_to(&mut io::stdout().lock())
  }

  pub fn dump_free_list_to<W: Write>(
    &self,
    out: &mut W,
  ) -> Result<()> {
    let regions = self.regions()?;
    diagnostics::write_regions(out, &regions)?;

    Ok(())
  }

  /// Destroys the mutex and unmaps the arena. Every pointer handed out by
  /// this heap dangles afterwards.
  pub fn teardown(mut self) -> Result<()> {
    self.destroy_lock()
  }

  /// Runs `op` on the free list under the arena mutex and stores the control
  /// block back before unlocking.
  fn mutate<T>(
    &self,
    op: impl FnOnce(&mut FreeList<'_>) -> Result<T>,
  ) -> Result<T> {
    let guard = self.mutex.lock()?;
    let mut list = FreeList::locked(&self.arena, self.control, &guard)?;

    let outcome = op(&mut list);
    self.arena.write(self.control, list.control())?;

    outcome
  }

  fn inspect<T>(
    &self,
    op: impl FnOnce(&FreeList<'_>) -> Result<T>,
  ) -> Result<T> {
    let guard = self.mutex.lock()?;
    let list = FreeList::locked(&self.arena, self.control, &guard)?;

    op(&list)
  }

  /// Only the creating process destroys the mutex; forked children merely
  /// unmap their view of the arena.
  fn destroy_lock(&mut self) -> Result<()> {
    if self.lock_destroyed || self.owner != process::id() {
      return Ok(());
    }

    self.lock_destroyed = true;
    debug!(capacity = self.arena.capacity(), "tearing down shared heap");

    unsafe { self.mutex.destroy() }
  }
}

impl Drop for SharedHeap {
  fn drop(&mut self) {
    if let Err(err) = self.destroy_lock() {
      warn!(error = %err, "failed to destroy heap mutex");
    }
  }
}

/// Carves bookkeeping out of a fresh arena with the ordinary allocation path.
fn bootstrap(
  list: &mut FreeList<'_>,
  size: usize,
  capacity: usize,
) -> Result<usize> {
  Strategy::FirstFit
    .place(list, crate::align!(size))
    .map_err(|err| match err {
      AllocatorError::NoFitFound { .. } => AllocatorError::InvalidSize(capacity),
      other => other,
    })
}
