//! Error types returned by the pool.

use thiserror::Error;

/// Errors that can occur while building or using a [`Pool`](crate::Pool).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolError {
  /// The requested pool cannot hold even one block header.
  #[error("pool size {requested} is smaller than one {minimum}-byte block header")]
  TooSmall {
    /// Size passed at construction.
    requested: usize,
    /// Smallest usable pool size.
    minimum: usize,
  },

  /// The environment refused to provide the pool buffer.
  #[error("environment could not provide a {size}-byte buffer")]
  Unavailable {
    /// Size of the buffer that was asked for.
    size: usize,
  },

  /// No free block is large enough for the request.
  #[error("out of memory: no free block fits a {requested}-byte request")]
  OutOfMemory {
    /// Payload size the caller asked for.
    requested: usize,
  },

  /// The handle does not name a live allocation of this pool.
  #[error("handle at offset {offset} does not refer to a live allocation")]
  InvalidHandle {
    /// Payload offset carried by the handle.
    offset: usize,
  },

  /// A block header failed to decode or an invariant check failed.
  #[error("pool corrupted at offset {offset}: {reason}")]
  Corrupted {
    /// Offset of the offending block.
    offset: usize,
    /// What was wrong.
    reason: &'static str,
  },
}

/// Result type for pool operations.
pub type PoolResult<T> = Result<T, PoolError>;
