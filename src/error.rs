use thiserror::Error;

/// Why an allocation request produced no memory.
///
/// The pointer-returning operations collapse all of these into a null
/// pointer; the `try_*` operations hand them back unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Error {
  #[error("zero-sized allocation request")]
  ZeroSize,

  #[error("{count} elements of {elem_size} bytes overflow usize")]
  Overflow { count: usize, elem_size: usize },

  #[error("program break refused to move by {requested} bytes")]
  OutOfMemory { requested: isize },
}

pub type Result<T> = core::result::Result<T, Error>;
