/// Rounds `value` up to the machine word size.
///
/// # Examples
///
/// ```rust
/// use rpool::align;
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

/// Same as [`align!`], but returns `None` instead of wrapping around.
pub const fn checked_align(value: usize) -> Option<usize> {
  let word = core::mem::size_of::<usize>();
  match value.checked_add(word - 1) {
    Some(v) => Some(v & !(word - 1)),
    None => None,
  }
}
