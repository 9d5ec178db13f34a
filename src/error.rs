//! Error types for the shared heap.

use std::io;

use thiserror::Error;

/// Result type alias using [`AllocatorError`].
pub type Result<T> = std::result::Result<T, AllocatorError>;

/// Failure of a heap operation. None of these abort the process; the caller
/// decides how to react.
#[derive(Error, Debug)]
pub enum AllocatorError {
  /// `initialize` was called while an arena is live.
  #[error("heap is already initialized")]
  AlreadyInitialized,

  /// An operation ran before `initialize` or after `teardown`.
  #[error("heap is not initialized")]
  NotInitialized,

  /// Requested arena capacity cannot be used.
  #[error("invalid heap size: {0} bytes")]
  InvalidSize(usize),

  /// The operating system declined to map the shared region.
  #[error("failed to reserve shared arena: {0}")]
  ReservationFailed(#[source] io::Error),

  /// Null, outside the arena, not an allocation boundary, or already freed.
  #[error("invalid pointer")]
  InvalidPointer,

  /// No free block is large enough under the chosen strategy.
  #[error("no free block fits a request of {requested} bytes")]
  NoFitFound { requested: usize },

  /// A pthread call on the arena mutex failed.
  #[error("shared mutex operation failed: {0}")]
  Lock(#[source] io::Error),

  /// Strategy name or numeric code not recognised.
  #[error("unknown placement strategy: {0}")]
  UnknownStrategy(String),

  /// Configuration value could not be parsed.
  #[error("invalid configuration: {0}")]
  InvalidConfig(String),

  /// Writing a diagnostic dump failed.
  #[error("I/O error: {0}")]
  Io(#[from] io::Error),
}

impl AllocatorError {
  /// Integer status for callers that speak return codes: `0` is success and
  /// every failure maps to a distinct negative value.
  pub fn status(&self) -> i32 {
    match self {
      AllocatorError::AlreadyInitialized => -1,
      AllocatorError::NotInitialized => -2,
      AllocatorError::InvalidSize(_) => -3,
      AllocatorError::ReservationFailed(_) => -4,
      AllocatorError::InvalidPointer => -5,
      AllocatorError::NoFitFound { .. } => -6,
      AllocatorError::Lock(_) => -7,
      AllocatorError::UnknownStrategy(_) => -8,
      AllocatorError::InvalidConfig(_) => -9,
      AllocatorError::Io(_) => -10,
    }
  }

  pub(crate) fn lock(code: i32) -> Self {
    AllocatorError::Lock(io::Error::from_raw_os_error(code))
  }
}

/// Collapses a result into the integer status convention.
pub fn status_of<T>(result: &Result<T>) -> i32 {
  match result {
    Ok(_) => 0,
    Err(err) => err.status(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_status_codes_are_negative_and_distinct() {
    let errors = [
      AllocatorError::AlreadyInitialized,
      AllocatorError::NotInitialized,
      AllocatorError::InvalidSize(0),
      AllocatorError::ReservationFailed(io::Error::from_raw_os_error(libc::ENOMEM)),
      AllocatorError::InvalidPointer,
      AllocatorError::NoFitFound { requested: 8 },
      AllocatorError::lock(libc::EINVAL),
      AllocatorError::UnknownStrategy("random".into()),
      AllocatorError::InvalidConfig("bad".into()),
      AllocatorError::Io(io::Error::other("closed")),
    ];

    let mut codes: Vec<i32> = errors.iter().map(AllocatorError::status).collect();
    assert!(codes.iter().all(|code| *code < 0));

    codes.sort_unstable();
    codes.dedup();
    assert_eq!(codes.len(), errors.len());
  }

  #[test]
  fn test_status_of() {
    assert_eq!(status_of(&Ok::<(), AllocatorError>(())), 0);
    assert_eq!(status_of::<()>(&Err(AllocatorError::InvalidPointer)), -5);
  }

  #[test]
  fn test_display() {
    let err = AllocatorError::NoFitFound { requested: 4000 };
    assert_eq!(err.to_string(), "no free block fits a request of 4000 bytes");
  }
}
