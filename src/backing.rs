//! Memory sources a [`Pool`](crate::Pool) can be carved out of.
//!
//! The pool asks its backing for one contiguous buffer when it is built and
//! gives it back when it is dropped. Nothing else touches the environment.

use core::{ptr::NonNull, slice};

use libc::{c_void, calloc, free};

use crate::error::{PoolError, PoolResult};

/// A contiguous byte buffer owned by a pool.
pub trait Backing {
  /// The whole buffer. Its length is the pool capacity and must not change.
  fn bytes(&self) -> &[u8];

  fn bytes_mut(&mut self) -> &mut [u8];
}

impl Backing for Box<[u8]> {
  fn bytes(&self) -> &[u8] {
    self
  }

  fn bytes_mut(&mut self) -> &mut [u8] {
    self
  }
}

impl Backing for Vec<u8> {
  fn bytes(&self) -> &[u8] {
    self
  }

  fn bytes_mut(&mut self) -> &mut [u8] {
    self
  }
}

/// A buffer obtained straight from the C heap with `calloc(3)` and returned
/// with `free(3)` on drop.
pub struct MallocBacking {
  ptr: NonNull<u8>,
  len: usize,
}

// The allocation is uniquely owned by this value.
unsafe impl Send for MallocBacking {}

impl MallocBacking {
  /// Requests `len` zeroed bytes from libc.
  pub fn new(len: usize) -> PoolResult<Self> {
    if len == 0 {
      return Ok(Self {
        ptr: NonNull::dangling(),
        len,
      });
    }

    let address = unsafe { calloc(len, 1) } as *mut u8;

    match NonNull::new(address) {
      Some(ptr) => Ok(Self { ptr, len }),
      None => Err(PoolError::Unavailable { size: len }),
    }
  }
}

impl Backing for MallocBacking {
  fn bytes(&self) -> &[u8] {
    // SAFETY: `ptr` points to `len` initialized bytes owned by `self`.
    unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
  }

  fn bytes_mut(&mut self) -> &mut [u8] {
    // SAFETY: as above, and `&mut self` guarantees exclusive access.
    unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
  }
}

impl Drop for MallocBacking {
  fn drop(&mut self) {
    if self.len > 0 {
      unsafe { free(self.ptr.as_ptr() as *mut c_void) };
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_malloc_backing() {
    let mut backing = MallocBacking::new(64).unwrap();

    assert_eq!(backing.bytes().len(), 64);
    assert!(backing.bytes().iter().all(|&b| b == 0));

    backing.bytes_mut()[63] = 0xAB;
    assert_eq!(backing.bytes()[63], 0xAB);
  }

  #[test]
  fn test_empty_malloc_backing() {
    let backing = MallocBacking::new(0).unwrap();

    assert!(backing.bytes().is_empty());
  }

  #[test]
  fn test_boxed_backing() {
    let mut backing: Box<[u8]> = vec![0u8; 16].into_boxed_slice();
    backing.bytes_mut()[0] = 1;

    assert_eq!(backing.bytes().len(), 16);
    assert_eq!(backing.bytes()[0], 1);
  }
}
