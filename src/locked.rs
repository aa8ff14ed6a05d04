//! A [`Pool`] shared behind a single lock.

use parking_lot::{Mutex, MutexGuard};

use crate::{
  backing::Backing,
  error::PoolResult,
  pool::{FreeBlock, Handle, Pool, Stats},
};

/// A pool that can be shared between threads.
///
/// Every operation takes the one lock for its whole duration, so the free
/// list is only ever touched by one caller at a time.
pub struct LockedPool<B: Backing = Box<[u8]>> {
  inner: Mutex<Pool<B>>,
}

impl LockedPool {
  pub fn new(pool_size: usize) -> PoolResult<Self> {
    Pool::new(pool_size).map(Self::from_pool)
  }
}

impl<B: Backing> LockedPool<B> {
  pub fn from_pool(pool: Pool<B>) -> Self {
    Self {
      inner: Mutex::new(pool),
    }
  }

  /// Locks the pool for a sequence of operations.
  pub fn lock(&self) -> MutexGuard<'_, Pool<B>> {
    self.inner.lock()
  }

  pub fn allocate(
    &self,
    size: usize,
  ) -> PoolResult<Option<Handle>> {
    self.lock().allocate(size)
  }

  pub fn release<H: Into<Option<Handle>>>(
    &self,
    handle: H,
  ) -> PoolResult<()> {
    self.lock().release(handle)
  }

  /// Snapshot of the free list taken under the lock.
  pub fn free_blocks(&self) -> Vec<FreeBlock> {
    self.lock().free_blocks().collect()
  }

  pub fn stats(&self) -> Stats {
    self.lock().stats()
  }

  pub fn into_inner(self) -> Pool<B> {
    self.inner.into_inner()
  }
}

#[cfg(test)]
mod tests {
  use std::thread;

  use super::*;
  use crate::backing::MallocBacking;

  #[test]
  fn test_concurrent_allocate_release() {
    let pool = LockedPool::new(64 * 1024).unwrap();

    thread::scope(|scope| {
      for t in 0..4 {
        let pool = &pool;

        scope.spawn(move || {
          for i in 0..200 {
            let size = 1 + (t * 31 + i * 7) % 96;
            let handle = pool.allocate(size).unwrap().unwrap();

            pool.lock().bytes_mut(handle).unwrap().fill(t as u8);
            assert!(pool.lock().bytes(handle).unwrap().iter().all(|&b| b == t as u8));

            pool.release(handle).unwrap();
          }
        });
      }
    });

    let pool = pool.into_inner();
    pool.check().unwrap();
    assert!(pool.is_empty());
    assert_eq!(pool.free_blocks().count(), 1);
  }

  #[test]
  fn test_malloc_backed_locked_pool() {
    let pool = LockedPool::from_pool(Pool::<MallocBacking>::from_malloc(512).unwrap());

    let handle = pool.allocate(64).unwrap();
    assert_eq!(pool.stats().live_allocations, 1);

    pool.release(handle).unwrap();
    assert_eq!(pool.free_blocks(), vec![FreeBlock { offset: 0, size: 512 }]);
  }
}
