//! Process-shared mutex living inside the arena.
//!
//! The mutex is initialised with `PTHREAD_PROCESS_SHARED`, so the parent and
//! every forked descendant contend on the same lock word. On Linux it is also
//! robust: if a process dies while holding it, the next locker recovers it.

use std::ptr::NonNull;

use tracing::warn;

use crate::error::{AllocatorError, Result};

pub type RawMutex = libc::pthread_mutex_t;

/// Handle to a `pthread_mutex_t` stored in shared memory.
pub struct SharedMutex {
  raw: NonNull<RawMutex>,
}

impl SharedMutex {
  /// Initialises a new process-shared mutex in `slot`.
  ///
  /// # Safety
  ///
  /// `slot` must be aligned, sized for a `pthread_mutex_t`, stay mapped for
  /// as long as the returned handle is used, and no other process may be
  /// using it yet.
  pub unsafe fn init(slot: NonNull<RawMutex>) -> Result<Self> {
    unsafe {
      let mut attr: libc::pthread_mutexattr_t = std::mem::zeroed();

      check(libc::pthread_mutexattr_init(&mut attr))?;

      let configured = check(libc::pthread_mutexattr_setpshared(
        &mut attr,
        libc::PTHREAD_PROCESS_SHARED,
      ))
      .and_then(|()| set_robust(&mut attr))
      .and_then(|()| check(libc::pthread_mutex_init(slot.as_ptr(), &attr)));

      libc::pthread_mutexattr_destroy(&mut attr);

      configured?;
    }

    Ok(Self { raw: slot })
  }

  /// Blocks until this process owns the mutex.
  pub fn lock(&self) -> Result<LockGuard<'_>> {
    let rc = unsafe { libc::pthread_mutex_lock(self.raw.as_ptr()) };

    match rc {
      0 => Ok(LockGuard { mutex: self }),
      #[cfg(target_os = "linux")]
      libc::EOWNERDEAD => {
        warn!("previous owner of the heap mutex died while holding it, recovering");
        let guard = LockGuard { mutex: self };
        check(unsafe { libc::pthread_mutex_consistent(self.raw.as_ptr()) })?;
        Ok(guard)
      }
      code => Err(AllocatorError::lock(code)),
    }
  }

  /// Destroys the mutex.
  ///
  /// # Safety
  ///
  /// No process may hold or later use the mutex.
  pub unsafe fn destroy(&self) -> Result<()> {
    check(unsafe { libc::pthread_mutex_destroy(self.raw.as_ptr()) })
  }
}

// SAFETY: the pthread mutex is designed for concurrent use from any thread and,
// being process-shared, from any process.
unsafe impl Send for SharedMutex {}
unsafe impl Sync for SharedMutex {}

/// Proof that the arena mutex is held. Unlocks on drop.
pub struct LockGuard<'m> {
  mutex: &'m SharedMutex,
}

impl Drop for LockGuard<'_> {
  fn drop(&mut self) {
    let rc = unsafe { libc::pthread_mutex_unlock(self.mutex.raw.as_ptr()) };

    if rc != 0 {
      warn!(error = %AllocatorError::lock(rc), "failed to unlock heap mutex");
    }
  }
}

fn check(rc: i32) -> Result<()> {
  if rc == 0 { Ok(()) } else { Err(AllocatorError::lock(rc)) }
}

#[cfg(target_os = "linux")]
unsafe fn set_robust(attr: &mut libc::pthread_mutexattr_t) -> Result<()> {
  check(unsafe { libc::pthread_mutexattr_setrobust(attr, libc::PTHREAD_MUTEX_ROBUST) })
}

#[cfg(not(target_os = "linux"))]
unsafe fn set_robust(_attr: &mut libc::pthread_mutexattr_t) -> Result<()> {
  Ok(())
}
