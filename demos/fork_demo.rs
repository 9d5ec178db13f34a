use std::ptr::NonNull;

use clap::Parser;
use shmalloc::{AllocatorError, HeapConfig, Strategy, global};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Walks every placement strategy over one shared arena, then lets forked
/// children allocate from it.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
  /// Arena size in bytes. Defaults to SHMALLOC_ARENA_BYTES or 4096.
  #[arg(long)]
  arena_bytes: Option<usize>,

  /// Number of children to fork.
  #[arg(long, default_value_t = 4)]
  children: usize,
}

fn main() -> shmalloc::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .init();

  let args = Args::parse();

  let mut config = HeapConfig::from_env()?;
  if let Some(bytes) = args.arena_bytes {
    config.capacity = bytes;
  }
  global::initialize_with(config)?;

  for strategy in Strategy::ALL {
    run_scenario(strategy)?;
  }

  fork_children(args.children)?;
  show_invalid_release()?;

  global::teardown()?;
  match global::allocate(8, Strategy::FirstFit) {
    Err(AllocatorError::NotInitialized) => println!("\nallocate after teardown: not initialized"),
    other => error!(?other, "allocate after teardown should fail"),
  }

  Ok(())
}

/// Three small blocks, the middle one freed and refilled, then everything freed.
fn run_scenario(strategy: Strategy) -> shmalloc::Result<()> {
  println!("\n== {strategy} ==");

  let a = global::allocate(10, strategy)?;
  let b = global::allocate(10, strategy)?;
  let c = global::allocate(10, strategy)?;
  global::dump_free_list()?;

  global::release(b.as_ptr())?;
  println!("-- after freeing the middle block");
  global::dump_free_list()?;

  let d = global::allocate(10, strategy)?;
  println!(
    "-- reallocated at offset {} (freed block was at {})",
    global::address_offset(d.as_ptr())?,
    global::address_offset(b.as_ptr())?
  );

  for pointer in [a, c, d] {
    global::release(pointer.as_ptr())?;
  }
  println!("-- after freeing everything");
  global::dump_free_list()
}

fn fork_children(count: usize) -> shmalloc::Result<()> {
  println!("\n== fork ==");

  let table = global::allocate(count * size_of::<usize>(), Strategy::FirstFit)?.cast::<usize>();
  unsafe { table.as_ptr().write_bytes(0, count) };
  let mut pids = Vec::with_capacity(count);

  for i in 0..count {
    let strategy = Strategy::ALL[i % Strategy::ALL.len()];
    let size = 32 * (i + 1);

    match unsafe { libc::fork() } {
      -1 => return Err(AllocatorError::Io(std::io::Error::last_os_error())),
      0 => {
        let code = match child(table, i, size, strategy) {
          Ok(()) => 0,
          Err(err) => err.status().abs(),
        };
        unsafe { libc::_exit(code) }
      }
      pid => pids.push(pid),
    }
  }

  for pid in pids {
    let mut status = 0;
    unsafe { libc::waitpid(pid, &mut status, 0) };

    if !libc::WIFEXITED(status) || libc::WEXITSTATUS(status) != 0 {
      error!(pid, status, "child failed");
    }
  }

  global::dump_free_list()?;

  for i in 0..count {
    let offset = unsafe { table.as_ptr().add(i).read() };
    if offset == 0 {
      continue;
    }

    let pointer = global::with_heap(|heap| heap.pointer_at(offset))?;
    println!("child {i} block at offset {offset}");
    global::release(pointer.as_ptr())?;
  }
  global::release(table.as_ptr().cast())?;

  println!("-- after freeing the children's blocks");
  global::dump_free_list()
}

fn child(
  table: NonNull<usize>,
  index: usize,
  size: usize,
  strategy: Strategy,
) -> shmalloc::Result<()> {
  let pointer = global::allocate(size, strategy)?;
  let offset = global::address_offset(pointer.as_ptr())?;

  info!(pid = std::process::id(), %strategy, size, offset, "child allocated");

  unsafe {
    pointer.as_ptr().write_bytes(index as u8, size);
    table.as_ptr().add(index).write(offset);
  }

  Ok(())
}

fn show_invalid_release() -> shmalloc::Result<()> {
  println!("\n== invalid release ==");

  let pointer = global::allocate(64, Strategy::BestFit)?;
  let inside = pointer.as_ptr().wrapping_add(10);

  match global::release(inside) {
    Err(err) => println!("release(pointer + 10) rejected: {err} (status {})", err.status()),
    Ok(()) => error!("interior pointer was accepted"),
  }

  global::release(pointer.as_ptr())?;
  global::dump_free_list()
}
