//! # rpool - A Fixed-Size Memory Pool Allocator
//!
//! This crate carves one contiguous buffer, obtained once from the
//! environment, into variable-sized regions handed out with
//! [`Pool::allocate`] and given back with [`Pool::release`].
//!
//! ## Overview
//!
//! The pool starts as a single free block. Free blocks are chained into a
//! doubly linked list whose links are stored inside the free blocks
//! themselves:
//!
//! ```text
//!   Pool Layout:
//!
//!   ┌──────────────────────────────────────────────────────────────────────┐
//!   │                              POOL                                    │
//!   │                                                                      │
//!   │   ┌──────┬──────────┬──────┬─────────────┬──────┬─────────────────┐  │
//!   │   │ hdr  │  A (used)│ hdr  │  free       │ hdr  │  free           │  │
//!   │   └──────┴──────────┴──────┴─────────────┴──────┴─────────────────┘  │
//!   │                        ▲                    ▲                        │
//!   │                        │   next / prev      │                        │
//!   │                        └────────────────────┘                        │
//!   │   head ─────────────────────────────────────┘                        │
//!   └──────────────────────────────────────────────────────────────────────┘
//!
//!   Allocation: first-fit walk from the head, splitting big blocks.
//!   Release: merge with the free block on the right, then on the left.
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   rpool
//!   ├── align      - Word alignment (align!, checked_align)
//!   ├── header     - Block header codec (internal)
//!   ├── backing    - Where the pool buffer comes from
//!   ├── error      - PoolError
//!   ├── pool       - Pool, Handle and the inspection types
//!   └── locked     - LockedPool, a Pool behind a mutex
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use rpool::Pool;
//!
//! let mut pool = Pool::new(1024)?;
//!
//! let handle = pool.allocate(100)?.expect("non-zero request");
//! pool.bytes_mut(handle)?[..5].copy_from_slice(b"hello");
//! assert_eq!(&pool.bytes(handle)?[..5], b"hello");
//!
//! pool.release(handle)?;
//! assert_eq!(pool.free_blocks().count(), 1);
//! # Ok::<(), rpool::PoolError>(())
//! ```
//!
//! ## How It Works
//!
//! Every block, free or allocated, is prefixed by a header:
//!
//! ```text
//!   Single Allocation:
//!   ┌───────────────────────┬────────────────────────────────┐
//!   │    Block Header       │         User Data              │
//!   │  ┌─────────────────┐  │                                │
//!   │  │ size: N + hdr   │  │  ┌──────────────────────────┐  │
//!   │  │ tag: USED       │  │  │                          │  │
//!   │  │ next: -         │  │  │  N bytes usable          │  │
//!   │  │ prev: -         │  │  │  (rounded up to a word)  │  │
//!   │  └─────────────────┘  │  └──────────────────────────┘  │
//!   │   4 machine words     │                                │
//!   └───────────────────────┴────────────────────────────────┘
//!                           ▲
//!                           └── Handle returned to user
//! ```
//!
//! Links are byte offsets into the pool, never raw pointers, and every
//! neighbor computation is bounds-checked.
//!
//! ## Limitations
//!
//! - **Single owner**: `Pool` needs `&mut self`; use [`LockedPool`] to share
//! - **Fixed size**: the pool never grows
//! - **Word alignment only**: no support for larger alignments
//! - **Best-effort misuse detection**: double release and erased headers are
//!   caught, a forged handle pointing into live data may not be

pub mod align;
mod backing;
mod error;
mod header;
mod locked;
mod pool;

pub use backing::{Backing, MallocBacking};
pub use error::{PoolError, PoolResult};
pub use header::HEADER_SIZE;
pub use locked::LockedPool;
pub use pool::{BlockInfo, Blocks, FreeBlock, FreeBlocks, Handle, Pool, Stats};
