/// Rounds `value` up to the next multiple of `alignment`, which must be a
/// power of two.
///
/// ```rust
/// use brkalloc::align_to;
///
/// assert_eq!(align_to!(1, 16), 16);
/// assert_eq!(align_to!(32, 16), 32);
/// assert_eq!(align_to!(33, 16), 48);
/// ```
#[macro_export]
macro_rules! align_to {
  ($value:expr, $alignment:expr) => {
    ($value + $alignment - 1) & !($alignment - 1)
  };
}

/// Like [`align_to!`] but returns `None` instead of wrapping when `value` is
/// within `alignment` of `usize::MAX`.
pub(crate) const fn checked_align_to(
  value: usize,
  alignment: usize,
) -> Option<usize> {
  match value.checked_add(alignment - 1) {
    Some(bumped) => Some(bumped & !(alignment - 1)),
    None => None,
  }
}
