//! Process-wide allocator state.
//!
//! One [`SharedHeap`] per process group, reachable through free functions.
//! Children created with `fork(2)` after [`initialize`] inherit the handle
//! and therefore the same arena, free list and mutex.

use std::ptr::NonNull;

use parking_lot::RwLock;

use crate::{
  config::HeapConfig,
  error::{AllocatorError, Result},
  heap::SharedHeap,
  strategy::Strategy,
};

static HEAP: RwLock<Option<SharedHeap>> = RwLock::new(None);

/// Maps the process-wide arena. Fails if one is already live.
pub fn initialize(size: usize) -> Result<()> {
  initialize_with(HeapConfig::new(size))
}

pub fn initialize_with(config: HeapConfig) -> Result<()> {
  let mut slot = HEAP.write();

  if slot.is_some() {
    return Err(AllocatorError::AlreadyInitialized);
  }

  *slot = Some(SharedHeap::with_config(config)?);

  Ok(())
}

pub fn is_initialized() -> bool {
  HEAP.read().is_some()
}

/// Runs `op` against the live heap.
pub fn with_heap<T>(op: impl FnOnce(&SharedHeap) -> Result<T>) -> Result<T> {
  let slot = HEAP.read();
  let heap = slot.as_ref().ok_or(AllocatorError::NotInitialized)?;

  op(heap)
}

pub fn allocate(
  size: usize,
  strategy: Strategy,
) -> Result<NonNull<u8>> {
  with_heap(|heap| heap.allocate(size, strategy))
}

pub fn release(pointer: *mut u8) -> Result<()> {
  with_heap(|heap| heap.release(pointer))
}

pub fn address_offset(pointer: *const u8) -> Result<usize> {
  with_heap(|heap| heap.address_offset(pointer))
}

pub fn dump_free_list() -> Result<()> {
  with_heap(SharedHeap::dump_free_list)
}

/// Unmaps the arena and returns to the uninitialized state.
pub fn teardown() -> Result<()> {
  let heap = HEAP.write().take().ok_or(AllocatorError::NotInitialized)?;

  heap.teardown()
}
