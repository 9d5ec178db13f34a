//! # shmalloc - A Shared-Arena Heap Allocator
//!
//! This crate provides a **free-list allocator** over one fixed-size memory
//! arena that is shared by cooperating processes. The arena is an anonymous
//! `MAP_SHARED` mapping, so a process duplicated with `fork(2)` keeps
//! allocating from, and releasing into, the very same heap as its parent.
//!
//! ## Overview
//!
//! ```text
//!   Shared Arena (one mapping, visible to parent and forked children):
//!
//!   ┌──────────────────────────────────────────────────────────────────────┐
//!   │                          SHARED ARENA                                │
//!   │                                                                      │
//!   │   ┌──────┬──────┬─────┬───────┬─────┬──────────┬─────┬───────────┐   │
//!   │   │ ctrl │ mutex│  A  │ free  │  B  │   free   │  C  │   free    │   │
//!   │   └──────┴──────┴─────┴───────┴─────┴──────────┴─────┴───────────┘   │
//!   │      ▲                  │  ▲              │  ▲                 │     │
//!   │      │ head             └──┼──────────────┘  └─────────────────┘     │
//!   │      └─────────────────────┘         next links (ascending)          │
//!   │                                                                      │
//!   └──────────────────────────────────────────────────────────────────────┘
//!
//!   Free blocks are chained in ascending address order. The control block
//!   holding `head` and the mutex guarding it are ordinary allocations
//!   carved out of the arena itself.
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   shmalloc
//!   ├── align        - Alignment macro and helpers (align!, align_up)
//!   ├── arena        - Shared mapping and checked offset conversions (internal)
//!   ├── block        - Block header layout (internal)
//!   ├── free_list    - Split, insert and coalesce (internal)
//!   ├── strategy     - First, next, best and worst fit
//!   ├── lock         - Process-shared pthread mutex (internal)
//!   ├── diagnostics  - Free/Full region views and dumps
//!   ├── config       - HeapConfig and environment overrides
//!   ├── heap         - SharedHeap
//!   └── global       - Process-wide initialize/allocate/release/teardown
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use shmalloc::{SharedHeap, Strategy};
//!
//! fn main() -> shmalloc::Result<()> {
//!     let heap = SharedHeap::new(4096)?;
//!
//!     // Allocate memory for a u64
//!     let ptr = heap.allocate(8, Strategy::BestFit)?;
//!
//!     // Use the memory
//!     unsafe { ptr.cast::<u64>().write(42) };
//!
//!     // Free the memory
//!     heap.release(ptr.as_ptr())?;
//!
//!     heap.dump_free_list()?;
//!     heap.teardown()
//! }
//! ```
//!
//! ## How It Works
//!
//! Each block carries its metadata inline, immediately before the payload:
//!
//! ```text
//!   Single Allocation:
//!   ┌───────────────────────┬────────────────────────────────┐
//!   │    Block Header       │         User Data              │
//!   │  ┌─────────────────┐  │                                │
//!   │  │ size: N         │  │  ┌──────────────────────────┐  │
//!   │  │ next: offset    │  │  │                          │  │
//!   │  │ tag: 0x12345678 │  │  │     N bytes usable       │  │
//!   │  │ is_freed: 0     │  │  │                          │  │
//!   │  └─────────────────┘  │  └──────────────────────────┘  │
//!   │      24 bytes         │                                │
//!   └───────────────────────┴────────────────────────────────┘
//!                           ▲
//!                           └── Pointer returned to user
//! ```
//!
//! Links are byte offsets from the arena base rather than addresses, and
//! every offset is bounds-checked before it is dereferenced.
//!
//! Allocation picks a free block with the chosen [`Strategy`] and **splits**
//! it when the leftover can hold another header:
//!
//! ```text
//!   before:  ┌──────┬──────────────────────────────────────┐
//!            │ hdr  │              free (S)                │
//!            └──────┴──────────────────────────────────────┘
//!   after:   ┌──────┬─────────┬──────┬─────────────────────┐
//!            │ hdr  │ used(N) │ hdr  │  free (S - N - hdr) │
//!            └──────┴─────────┴──────┴─────────────────────┘
//! ```
//!
//! Release validates the header, inserts the block at its address-ordered
//! position and **coalesces** it with byte-adjacent free neighbours.
//!
//! ## Features
//!
//! - **Four placement strategies**: first, next, best and worst fit
//! - **Cross-process**: arena, free list and mutex all live in shared memory
//! - **Robust locking**: a process dying with the lock held does not wedge the heap (Linux)
//! - **Checked release**: null, foreign, misaligned and double frees are rejected
//!
//! ## Limitations
//!
//! - **Fixed capacity**: the arena never grows
//! - **Word alignment only**: payloads are aligned to `usize`, nothing stronger
//! - **Unix-only**: requires `libc`, `mmap` and process-shared pthread mutexes
//!
//! ## Safety
//!
//! Allocation and release are safe to call: every pointer is validated
//! against the arena before it is read. Writing through a returned pointer is
//! `unsafe` as with any raw allocation, and pointers dangle once the heap is
//! torn down.

pub mod align;
mod arena;
mod block;
pub mod config;
mod diagnostics;
mod error;
mod free_list;
pub mod global;
mod heap;
mod lock;
mod strategy;

pub use arena::page_size;
pub use block::{BLOCK_TAG, HEADER_SIZE};
pub use config::HeapConfig;
pub use diagnostics::{FreeBlock, HeapStats, Region, RegionStatus};
pub use error::{AllocatorError, Result, status_of};
pub use heap::SharedHeap;
pub use strategy::Strategy;
