//! Property tests for allocate/release invariants.
//!
//! After any sequence of operations the blocks tile the pool exactly, no two
//! free blocks touch, and the free list matches the blocks tagged free.

use proptest::prelude::*;
use rpool::{FreeBlock, HEADER_SIZE, Handle, Pool, PoolError};

const POOL_SIZE: usize = 4096;

#[derive(Debug, Clone)]
enum Op {
  Allocate(usize),
  Release(usize),
}

fn op() -> impl Strategy<Value = Op> {
  prop_oneof![
    (0usize..600).prop_map(Op::Allocate),
    any::<usize>().prop_map(Op::Release),
  ]
}

fn sorted(blocks: impl Iterator<Item = FreeBlock>) -> Vec<FreeBlock> {
  let mut blocks: Vec<_> = blocks.collect();
  blocks.sort_unstable();
  blocks
}

proptest! {
  #![proptest_config(ProptestConfig::with_cases(200))]

  #[test]
  fn invariants_hold_after_every_operation(ops in proptest::collection::vec(op(), 1..80)) {
    let mut pool = Pool::new(POOL_SIZE).unwrap();
    let mut live: Vec<Handle> = Vec::new();

    for op in ops {
      match op {
        Op::Allocate(size) => {
          let before: Vec<_> = pool.free_blocks().collect();

          match pool.allocate(size) {
            Ok(Some(handle)) => {
              prop_assert!(pool.usable_size(handle).unwrap() >= size);
              live.push(handle);
            }
            Ok(None) => prop_assert_eq!(size, 0),
            Err(PoolError::OutOfMemory { requested }) => {
              prop_assert_eq!(requested, size);
              prop_assert_eq!(pool.free_blocks().collect::<Vec<_>>(), before);
            }
            Err(other) => prop_assert!(false, "unexpected error {other}"),
          }
        }
        Op::Release(pick) if !live.is_empty() => {
          let handle = live.swap_remove(pick % live.len());
          pool.release(handle).unwrap();
        }
        Op::Release(_) => {}
      }

      prop_assert!(pool.check().is_ok(), "{:?}", pool.check());
      prop_assert_eq!(pool.blocks().map(|b| b.size).sum::<usize>(), POOL_SIZE);
      prop_assert_eq!(pool.stats().live_allocations, live.len());
    }

    for handle in live.drain(..) {
      pool.release(handle).unwrap();
    }

    prop_assert_eq!(
      pool.free_blocks().collect::<Vec<_>>(),
      vec![FreeBlock { offset: 0, size: POOL_SIZE }]
    );
  }

  #[test]
  fn allocate_then_release_restores_free_blocks(
    warmup in proptest::collection::vec(1usize..300, 0..8),
    holes in proptest::collection::vec(any::<bool>(), 0..8),
    size in 1usize..1500,
  ) {
    let mut pool = Pool::new(POOL_SIZE).unwrap();
    let handles: Vec<_> = warmup.iter().map(|&n| pool.allocate(n).unwrap()).collect();

    for (handle, free) in handles.iter().zip(&holes) {
      if *free {
        pool.release(*handle).unwrap();
      }
    }

    let before = sorted(pool.free_blocks());

    if let Ok(handle) = pool.allocate(size) {
      pool.release(handle).unwrap();
    }

    prop_assert_eq!(sorted(pool.free_blocks()), before);
  }

  #[test]
  fn oversized_requests_always_fail(size in (POOL_SIZE - HEADER_SIZE + 1)..usize::MAX) {
    let mut pool = Pool::new(POOL_SIZE).unwrap();

    prop_assert_eq!(pool.allocate(size), Err(PoolError::OutOfMemory { requested: size }));
    prop_assert_eq!(
      pool.free_blocks().collect::<Vec<_>>(),
      vec![FreeBlock { offset: 0, size: POOL_SIZE }]
    );
  }

  #[test]
  fn double_release_is_detected(
    sizes in proptest::collection::vec(1usize..200, 1..10),
    pick in any::<usize>(),
  ) {
    let mut pool = Pool::new(POOL_SIZE).unwrap();
    let handles: Vec<_> = sizes.iter().map(|&n| pool.allocate(n).unwrap().unwrap()).collect();
    let victim = handles[pick % handles.len()];

    pool.release(victim).unwrap();

    prop_assert_eq!(
      pool.release(victim),
      Err(PoolError::InvalidHandle { offset: victim.offset() })
    );
    prop_assert!(pool.check().is_ok());
  }
}
