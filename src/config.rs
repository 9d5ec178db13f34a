//! Heap configuration.

use std::env;

use crate::{
  error::{AllocatorError, Result},
  strategy::Strategy,
};

/// Capacity used when nothing else is configured.
pub const DEFAULT_CAPACITY: usize = 4096;

/// Environment variable overriding the arena capacity in bytes.
pub const ARENA_BYTES_ENV: &str = "SHMALLOC_ARENA_BYTES";

/// Environment variable overriding the default placement strategy.
pub const STRATEGY_ENV: &str = "SHMALLOC_STRATEGY";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeapConfig {
  /// Requested arena size; rounded up to whole pages.
  pub capacity: usize,
  /// Strategy used by `allocate_default`.
  pub default_strategy: Strategy,
}

impl Default for HeapConfig {
  fn default() -> Self {
    Self {
      capacity: DEFAULT_CAPACITY,
      default_strategy: Strategy::default(),
    }
  }
}

impl HeapConfig {
  pub fn new(capacity: usize) -> Self {
    Self {
      capacity,
      ..Self::default()
    }
  }

  pub fn with_strategy(
    mut self,
    strategy: Strategy,
  ) -> Self {
    self.default_strategy = strategy;
    self
  }

  /// Defaults overridden by `SHMALLOC_ARENA_BYTES` and `SHMALLOC_STRATEGY`.
  pub fn from_env() -> Result<Self> {
    Self::from_lookup(|key| env::var(key).ok())
  }

  /// Like [`HeapConfig::from_env`], reading values through `lookup`.
  pub fn from_lookup<F>(lookup: F) -> Result<Self>
  where
    F: Fn(&str) -> Option<String>,
  {
    let mut config = Self::default();

    if let Some(raw) = lookup(ARENA_BYTES_ENV) {
      config.capacity = raw.trim().parse().map_err(|_| {
        AllocatorError::InvalidConfig(format!("{ARENA_BYTES_ENV}={raw:?} is not a byte count"))
      })?;
    }

    if let Some(raw) = lookup(STRATEGY_ENV) {
      config.default_strategy = raw.parse()?;
    }

    Ok(config)
  }
}

#[cfg(test)]
mod tests {
  use std::collections::HashMap;

  use super::*;

  fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let values: HashMap<String, String> = pairs
      .iter()
      .map(|(key, value)| (key.to_string(), value.to_string()))
      .collect();

    move |key: &str| values.get(key).cloned()
  }

  #[test]
  fn test_defaults() {
    let config = HeapConfig::from_lookup(lookup(&[])).unwrap();

    assert_eq!(config, HeapConfig::default());
    assert_eq!(config.capacity, 4096);
    assert_eq!(config.default_strategy, Strategy::FirstFit);
  }

  #[test]
  fn test_overrides() {
    let config = HeapConfig::from_lookup(lookup(&[
      (ARENA_BYTES_ENV, " 65536 "),
      (STRATEGY_ENV, "worst-fit"),
    ]))
    .unwrap();

    assert_eq!(config.capacity, 65536);
    assert_eq!(config.default_strategy, Strategy::WorstFit);
  }

  #[test]
  fn test_bad_capacity() {
    let err = HeapConfig::from_lookup(lookup(&[(ARENA_BYTES_ENV, "lots")])).unwrap_err();

    assert!(matches!(err, AllocatorError::InvalidConfig(_)));
  }

  #[test]
  fn test_bad_strategy() {
    let err = HeapConfig::from_lookup(lookup(&[(STRATEGY_ENV, "random")])).unwrap_err();

    assert!(matches!(err, AllocatorError::UnknownStrategy(_)));
  }

  #[test]
  fn test_builder() {
    let config = HeapConfig::new(8192).with_strategy(Strategy::NextFit);

    assert_eq!(config.capacity, 8192);
    assert_eq!(config.default_strategy, Strategy::NextFit);
  }
}
