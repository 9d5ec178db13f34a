/// Calculates the machine word alignment for the given size.
///
/// Block headers are word aligned, so every payload size that goes through
/// this macro keeps the next header on a natural boundary. Usable in `const`
/// context.
///
/// # Examples
///
/// ```rust
/// use shmalloc::align;
///
/// match std::mem::size_of::<usize>() {
///     8 => assert_eq!(align!(13), 16), // 64 bit machine.
///     4 => assert_eq!(align!(11), 12), // 32 bit machine.
///     _ => {},
/// };
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    ($value + ::core::mem::size_of::<usize>() - 1) & !(::core::mem::size_of::<usize>() - 1)
  };
}

/// Rounds `value` up to the next multiple of `multiple`, which must be a power
/// of two. Returns `None` if the result does not fit in a `usize`.
pub fn align_up(
  value: usize,
  multiple: usize,
) -> Option<usize> {
  debug_assert!(multiple.is_power_of_two());

  value
    .checked_add(multiple - 1)
    .map(|padded| padded & !(multiple - 1))
}

/// Word alignment of a requested payload size, rejecting sizes close enough to
/// `usize::MAX` to overflow.
pub fn align_word(value: usize) -> Option<usize> {
  align_up(value, core::mem::size_of::<usize>())
}
