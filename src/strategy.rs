//! Block placement strategies.

use std::{fmt, str::FromStr};

use tracing::trace;

use crate::{
  block,
  error::{AllocatorError, Result},
  free_list::{Candidate, FreeList},
};

/// How a free block is chosen for an allocation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Strategy {
  /// First block from `head` that is large enough.
  #[default]
  FirstFit,
  /// Like first-fit, but resumes from where the previous allocation ended and
  /// wraps around once.
  NextFit,
  /// Smallest block that is large enough.
  BestFit,
  /// Largest block that is large enough.
  WorstFit,
}

impl Strategy {
  pub const ALL: [Strategy; 4] = [
    Strategy::FirstFit,
    Strategy::NextFit,
    Strategy::BestFit,
    Strategy::WorstFit,
  ];

  pub fn name(self) -> &'static str {
    match self {
      Strategy::FirstFit => "first-fit",
      Strategy::NextFit => "next-fit",
      Strategy::BestFit => "best-fit",
      Strategy::WorstFit => "worst-fit",
    }
  }

  /// Picks a free block of at least `size` payload bytes without modifying
  /// the list.
  pub(crate) fn select(
    self,
    list: &FreeList<'_>,
    size: usize,
  ) -> Result<Option<Candidate>> {
    match self {
      Strategy::FirstFit => first_fit(list, size),
      Strategy::NextFit => next_fit(list, size),
      Strategy::BestFit => best_fit(list, size),
      Strategy::WorstFit => worst_fit(list, size),
    }
  }

  /// Selects a block, splits it and stamps it as allocated. Returns the
  /// payload offset.
  pub(crate) fn place(
    self,
    list: &mut FreeList<'_>,
    size: usize,
  ) -> Result<usize> {
    let candidate = self
      .select(list, size)?
      .ok_or(AllocatorError::NoFitFound { requested: size })?;

    trace!(
      strategy = self.name(),
      size,
      block = candidate.block.offset,
      block_size = candidate.block.size(),
      "selected free block"
    );

    list.split(candidate, size)?;
    list.stamp(candidate.block.offset)?;

    block::payload_offset(candidate.block.offset)
  }
}

fn first_fit(
  list: &FreeList<'_>,
  size: usize,
) -> Result<Option<Candidate>> {
  for candidate in list.walk() {
    let candidate = candidate?;
    if candidate.block.fits(size) {
      return Ok(Some(candidate));
    }
  }

  Ok(None)
}

fn next_fit(
  list: &FreeList<'_>,
  size: usize,
) -> Result<Option<Candidate>> {
  let start = match list.cursor() {
    Some(cursor) => list.locate(cursor)?,
    None => None,
  };

  let Some(start) = start else {
    return first_fit(list, size);
  };

  for candidate in list.walk_from(start) {
    let candidate = candidate?;
    if candidate.block.fits(size) {
      return Ok(Some(candidate));
    }
  }

  for candidate in list.walk() {
    let candidate = candidate?;
    if candidate.block.offset == start.block.offset {
      break;
    }
    if candidate.block.fits(size) {
      return Ok(Some(candidate));
    }
  }

  Ok(None)
}

fn best_fit(
  list: &FreeList<'_>,
  size: usize,
) -> Result<Option<Candidate>> {
  let mut best: Option<Candidate> = None;

  for candidate in list.walk() {
    let candidate = candidate?;
    if candidate.block.fits(size)
      && best.is_none_or(|best| candidate.block.size() < best.block.size())
    {
      best = Some(candidate);
    }
  }

  Ok(best)
}

fn worst_fit(
  list: &FreeList<'_>,
  size: usize,
) -> Result<Option<Candidate>> {
  let mut worst: Option<Candidate> = None;

  for candidate in list.walk() {
    let candidate = candidate?;
    if candidate.block.fits(size)
      && worst.is_none_or(|worst| candidate.block.size() > worst.block.size())
    {
      worst = Some(candidate);
    }
  }

  Ok(worst)
}

impl fmt::Display for Strategy {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    f.write_str(self.name())
  }
}

impl FromStr for Strategy {
  type Err = AllocatorError;

  /// Accepts `first-fit`, `first_fit`, `firstfit` or just `first`, in any case.
  fn from_str(value: &str) -> Result<Self> {
    let normalized: String = value
      .trim()
      .to_ascii_lowercase()
      .chars()
      .filter(|c| !matches!(c, '-' | '_' | ' '))
      .collect();
    let normalized = normalized.strip_suffix("fit").unwrap_or(&normalized);

    match normalized {
      "first" => Ok(Strategy::FirstFit),
      "next" => Ok(Strategy::NextFit),
      "best" => Ok(Strategy::BestFit),
      "worst" => Ok(Strategy::WorstFit),
      _ => Err(AllocatorError::UnknownStrategy(value.to_string())),
    }
  }
}

/// Numeric strategy codes: `0` best, `1` worst, `2` first, `3` next.
impl TryFrom<i32> for Strategy {
  type Error = AllocatorError;

  fn try_from(code: i32) -> Result<Self> {
    match code {
      0 => Ok(Strategy::BestFit),
      1 => Ok(Strategy::WorstFit),
      2 => Ok(Strategy::FirstFit),
      3 => Ok(Strategy::NextFit),
      _ => Err(AllocatorError::UnknownStrategy(code.to_string())),
    }
  }
}
