use core::{fmt, num::NonZeroUsize};

use tracing::{debug, trace, warn};

use crate::{
  align::checked_align,
  backing::{Backing, MallocBacking},
  error::{PoolError, PoolResult},
  header::{HEADER_SIZE, Header, State},
};

/// Handle to an allocated region of a [`Pool`].
///
/// Holds the offset of the first usable byte, right past the block header.
/// A handle stays valid until it is passed to [`Pool::release`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Handle(NonZeroUsize);

impl Handle {
  /// Offset of the usable region from the start of the pool.
  pub fn offset(&self) -> usize {
    self.0.get()
  }

  pub(crate) fn from_offset(offset: usize) -> Option<Self> {
    NonZeroUsize::new(offset).map(Self)
  }

  fn for_block(block: usize) -> Option<Self> {
    Self::from_offset(block.checked_add(HEADER_SIZE)?)
  }

  fn block(&self) -> Option<usize> {
    self.offset().checked_sub(HEADER_SIZE)
  }
}

/// A free block as seen by [`Pool::free_blocks`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FreeBlock {
  /// Offset of the block header.
  pub offset: usize,
  /// Size of the block, header included.
  pub size: usize,
}

impl FreeBlock {
  pub fn end(&self) -> usize {
    self.offset + self.size
  }
}

/// Any block, free or allocated, as seen by [`Pool::blocks`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockInfo {
  pub offset: usize,
  pub size: usize,
  pub free: bool,
}

/// Point-in-time usage summary.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Stats {
  pub capacity: usize,
  pub free_bytes: usize,
  pub free_blocks: usize,
  pub largest_free: usize,
  pub live_allocations: usize,
}

/// A first-fit allocator over one fixed buffer.
///
/// Free blocks form a doubly linked list whose links live inside the free
/// blocks themselves; the pool only remembers the head.
pub struct Pool<B: Backing = Box<[u8]>> {
  memory: B,
  head: Option<usize>,
  live: usize,
}

impl Pool {
  /// Creates a pool of `pool_size` bytes on the global heap.
  pub fn new(pool_size: usize) -> PoolResult<Self> {
    if pool_size < HEADER_SIZE {
      return Err(too_small(pool_size));
    }

    let mut memory = Vec::new();
    if memory.try_reserve_exact(pool_size).is_err() {
      warn!(pool_size, "environment refused the pool buffer");
      return Err(PoolError::Unavailable { size: pool_size });
    }
    memory.resize(pool_size, 0);

    Self::with_backing(memory.into_boxed_slice())
  }

  /// Creates a pool with no memory at all. Every allocation fails.
  pub fn empty() -> Self {
    Self {
      memory: Box::default(),
      head: None,
      live: 0,
    }
  }
}

impl Pool<MallocBacking> {
  /// Creates a pool of `pool_size` bytes obtained from libc.
  pub fn from_malloc(pool_size: usize) -> PoolResult<Self> {
    if pool_size < HEADER_SIZE {
      return Err(too_small(pool_size));
    }

    Self::with_backing(MallocBacking::new(pool_size)?)
  }
}

fn too_small(pool_size: usize) -> PoolError {
  warn!(pool_size, minimum = HEADER_SIZE, "pool size is too small");

  PoolError::TooSmall {
    requested: pool_size,
    minimum: HEADER_SIZE,
  }
}

impl<B: Backing> Pool<B> {
  /// Turns `memory` into a pool made of a single free block.
  pub fn with_backing(mut memory: B) -> PoolResult<Self> {
    let capacity = memory.bytes().len();

    if capacity < HEADER_SIZE {
      return Err(too_small(capacity));
    }

    Header::free(capacity, None, None).write(memory.bytes_mut(), 0);
    debug!(capacity, "pool created");

    Ok(Self {
      memory,
      head: Some(0),
      live: 0,
    })
  }

  /// Total size of the pool in bytes, headers included.
  pub fn capacity(&self) -> usize {
    self.memory.bytes().len()
  }

  /// Returns `true` when no allocation is outstanding.
  pub fn is_empty(&self) -> bool {
    self.live == 0
  }

  /// Allocates `size` usable bytes.
  ///
  /// Returns `Ok(None)` for a zero-size request. On failure the pool is left
  /// exactly as it was.
  pub fn allocate(
    &mut self,
    size: usize,
  ) -> PoolResult<Option<Handle>> {
    if size == 0 {
      trace!("zero-size request ignored");
      return Ok(None);
    }

    let minimum = size
      .checked_add(HEADER_SIZE)
      .filter(|&minimum| minimum <= self.capacity());

    let Some(minimum) = minimum else {
      return Err(self.out_of_memory(size));
    };

    let Some(block) = self.find_free_block(minimum)? else {
      return Err(self.out_of_memory(size));
    };

    // Carve a word-rounded block so headers after it stay aligned, unless the
    // rounding would spill past the chosen block.
    let needed = checked_align(size)
      .and_then(|payload| payload.checked_add(HEADER_SIZE))
      .map_or(block.size, |needed| needed.min(block.size));

    let State::Free { next, prev } = block.state else {
      return Err(PoolError::Corrupted {
        offset: block.offset,
        reason: "allocated block on free list",
      });
    };

    let total = if block.size > needed + HEADER_SIZE {
      let remainder = block.offset + needed;

      Header::free(block.size - needed, next, prev).write(self.memory.bytes_mut(), remainder);
      self.set_next(prev, Some(remainder))?;
      self.set_prev(next, Some(remainder))?;

      debug!(offset = block.offset, size = needed, remainder, "split block");
      needed
    } else {
      self.set_next(prev, next)?;
      self.set_prev(next, prev)?;

      debug!(offset = block.offset, size = block.size, "took whole block");
      block.size
    };

    Header::allocated(total).write(self.memory.bytes_mut(), block.offset);
    self.live += 1;

    Ok(Handle::for_block(block.offset))
  }

  /// Returns a region to the pool, merging it with free physical neighbors.
  ///
  /// Accepts either a [`Handle`] or an `Option<Handle>`; `None` is a no-op.
  pub fn release<H: Into<Option<Handle>>>(
    &mut self,
    handle: H,
  ) -> PoolResult<()> {
    let Some(handle) = handle.into() else {
      return Ok(());
    };

    let (offset, header) = self.live_block(handle)?;
    let mut size = header.size;

    // Right neighbor.
    let right = offset + size;
    if right < self.capacity() {
      let neighbor = self.header(right)?;

      if let State::Free { next, prev } = neighbor.state {
        self.set_next(prev, next)?;
        self.set_prev(next, prev)?;
        Header::erase(self.memory.bytes_mut(), right);

        size += neighbor.size;
        debug!(offset, right, size, "merged right neighbor");
      }
    }

    // Left neighbor, found by scanning the free list.
    let left = self.free_blocks().find(|block| block.end() == offset);

    match left {
      Some(left) => {
        let mut merged = self.header(left.offset)?;
        merged.size += size;
        merged.write(self.memory.bytes_mut(), left.offset);
        Header::erase(self.memory.bytes_mut(), offset);

        debug!(offset = left.offset, size = merged.size, "merged into left neighbor");
      }
      None => {
        self.push_front(offset, size)?;
        debug!(offset, size, "released block");
      }
    }

    self.live = self.live.saturating_sub(1);

    Ok(())
  }

  /// Usable bytes of a live allocation.
  pub fn bytes(
    &self,
    handle: Handle,
  ) -> PoolResult<&[u8]> {
    let (offset, header) = self.live_block(handle)?;

    Ok(&self.memory.bytes()[offset + HEADER_SIZE..offset + header.size])
  }

  /// Usable bytes of a live allocation, mutably.
  pub fn bytes_mut(
    &mut self,
    handle: Handle,
  ) -> PoolResult<&mut [u8]> {
    let (offset, header) = self.live_block(handle)?;

    Ok(&mut self.memory.bytes_mut()[offset + HEADER_SIZE..offset + header.size])
  }

  /// Number of usable bytes granted to `handle`. May exceed the request.
  pub fn usable_size(
    &self,
    handle: Handle,
  ) -> PoolResult<usize> {
    self.live_block(handle).map(|(_, header)| header.size - HEADER_SIZE)
  }

  /// Walks the free list in its current order.
  pub fn free_blocks(&self) -> FreeBlocks<'_> {
    FreeBlocks {
      bytes: self.memory.bytes(),
      cursor: self.head,
      budget: self.capacity() / HEADER_SIZE,
    }
  }

  /// Walks every block in address order.
  pub fn blocks(&self) -> Blocks<'_> {
    Blocks {
      bytes: self.memory.bytes(),
      cursor: 0,
    }
  }

  pub fn stats(&self) -> Stats {
    let mut stats = Stats {
      capacity: self.capacity(),
      live_allocations: self.live,
      ..Stats::default()
    };

    for block in self.free_blocks() {
      stats.free_bytes += block.size;
      stats.free_blocks += 1;
      stats.largest_free = stats.largest_free.max(block.size);
    }

    stats
  }

  /// Verifies the pool's structural invariants.
  ///
  /// Blocks must tile the buffer exactly, no two free blocks may touch, the
  /// free list must hold exactly the blocks tagged free, and its links must
  /// agree in both directions.
  pub fn check(&self) -> PoolResult<()> {
    let capacity = self.capacity();
    let mut cursor = 0;
    let mut previous_free = false;
    let mut tagged_free = Vec::new();
    let mut allocated = 0;

    while cursor < capacity {
      let header = self.header(cursor)?;

      if cursor.checked_add(header.size).is_none_or(|end| end > capacity) {
        return Err(corrupted(cursor, "block runs past the end of the pool"));
      }

      if header.is_free() {
        if previous_free {
          return Err(corrupted(cursor, "adjacent free blocks"));
        }
        tagged_free.push(cursor);
      } else {
        allocated += 1;
      }

      previous_free = header.is_free();
      cursor += header.size;
    }

    if allocated != self.live {
      return Err(corrupted(0, "live allocation count mismatch"));
    }

    let mut listed = Vec::new();
    let mut expected_prev = None;
    let mut link = self.head;

    while let Some(offset) = link {
      if listed.len() > tagged_free.len() {
        return Err(corrupted(offset, "free list is longer than the free blocks"));
      }

      let State::Free { next, prev } = self.header(offset)?.state else {
        return Err(corrupted(offset, "allocated block on free list"));
      };

      if prev != expected_prev {
        return Err(corrupted(offset, "broken prev link"));
      }

      listed.push(offset);
      expected_prev = Some(offset);
      link = next;
    }

    listed.sort_unstable();

    if listed != tagged_free {
      return Err(corrupted(0, "free list does not match free blocks"));
    }

    Ok(())
  }

  fn out_of_memory(
    &self,
    size: usize,
  ) -> PoolError {
    warn!(size, capacity = self.capacity(), "out of memory");
    PoolError::OutOfMemory { requested: size }
  }

  fn header(
    &self,
    offset: usize,
  ) -> PoolResult<Header> {
    Header::read(self.memory.bytes(), offset)
      .ok_or_else(|| corrupted(offset, "unreadable block header"))
  }

  /// Resolves `handle` to its block, rejecting anything that is not a live
  /// allocation.
  fn live_block(
    &self,
    handle: Handle,
  ) -> PoolResult<(usize, Header)> {
    let invalid = || {
      warn!(offset = handle.offset(), "rejected handle");
      PoolError::InvalidHandle {
        offset: handle.offset(),
      }
    };

    let offset = handle.block().ok_or_else(invalid)?;

    match Header::read(self.memory.bytes(), offset) {
      Some(header)
        if header.state == State::Allocated
          && offset.checked_add(header.size).is_some_and(|end| end <= self.capacity()) =>
      {
        Ok((offset, header))
      }
      _ => Err(invalid()),
    }
  }

  fn find_free_block(
    &self,
    needed: usize,
  ) -> PoolResult<Option<Candidate>> {
    let mut link = self.head;

    while let Some(offset) = link {
      let header = self.header(offset)?;
      trace!(offset, size = header.size, needed, "first-fit candidate");

      if header.size >= needed {
        return Ok(Some(Candidate {
          offset,
          size: header.size,
          state: header.state,
        }));
      }

      link = match header.state {
        State::Free { next, .. } => next,
        State::Allocated => return Err(corrupted(offset, "allocated block on free list")),
      };
    }

    Ok(None)
  }

  /// Points `at`'s next link to `next`, or moves the head when `at` is none.
  fn set_next(
    &mut self,
    at: Option<usize>,
    next: Option<usize>,
  ) -> PoolResult<()> {
    let Some(at) = at else {
      self.head = next;
      return Ok(());
    };

    match self.header(at)? {
      Header {
        size,
        state: State::Free { prev, .. },
      } => {
        Header::free(size, next, prev).write(self.memory.bytes_mut(), at);
        Ok(())
      }
      _ => Err(corrupted(at, "allocated block on free list")),
    }
  }

  fn set_prev(
    &mut self,
    at: Option<usize>,
    prev: Option<usize>,
  ) -> PoolResult<()> {
    let Some(at) = at else {
      return Ok(());
    };

    match self.header(at)? {
      Header {
        size,
        state: State::Free { next, .. },
      } => {
        Header::free(size, next, prev).write(self.memory.bytes_mut(), at);
        Ok(())
      }
      _ => Err(corrupted(at, "allocated block on free list")),
    }
  }

  fn push_front(
    &mut self,
    offset: usize,
    size: usize,
  ) -> PoolResult<()> {
    let old_head = self.head;

    Header::free(size, old_head, None).write(self.memory.bytes_mut(), offset);
    self.set_prev(old_head, Some(offset))?;
    self.head = Some(offset);

    Ok(())
  }
}

impl<B: Backing> Drop for Pool<B> {
  fn drop(&mut self) {
    if self.live > 0 {
      debug!(live = self.live, "pool dropped with outstanding allocations");
    }
  }
}

impl<B: Backing> fmt::Debug for Pool<B> {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    f.debug_struct("Pool")
      .field("capacity", &self.capacity())
      .field("head", &self.head)
      .field("live", &self.live)
      .finish()
  }
}

impl<B: Backing> fmt::Display for Pool<B> {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    writeln!(f, "--- Free List Status ---")?;

    if self.head.is_none() {
      return writeln!(f, "[EMPTY]");
    }

    for (i, block) in self.free_blocks().enumerate() {
      writeln!(
        f,
        "Block {:>2}: Offset = {:#06x}, Size = {:>5} bytes",
        i, block.offset, block.size
      )?;
    }

    writeln!(f, "------------------------")
  }
}

fn corrupted(
  offset: usize,
  reason: &'static str,
) -> PoolError {
  PoolError::Corrupted { offset, reason }
}

struct Candidate {
  offset: usize,
  size: usize,
  state: State,
}

/// Iterator over the free list, see [`Pool::free_blocks`].
pub struct FreeBlocks<'a> {
  bytes: &'a [u8],
  cursor: Option<usize>,
  budget: usize,
}

impl Iterator for FreeBlocks<'_> {
  type Item = FreeBlock;

  fn next(&mut self) -> Option<Self::Item> {
    let offset = self.cursor?;

    // A pool of n bytes holds at most n / HEADER_SIZE blocks; running past
    // that means the links loop.
    if self.budget == 0 {
      self.cursor = None;
      return None;
    }
    self.budget -= 1;

    match Header::read(self.bytes, offset) {
      Some(Header {
        size,
        state: State::Free { next, .. },
      }) => {
        self.cursor = next;
        Some(FreeBlock { offset, size })
      }
      _ => {
        self.cursor = None;
        None
      }
    }
  }
}

/// Iterator over every block in address order, see [`Pool::blocks`].
pub struct Blocks<'a> {
  bytes: &'a [u8],
  cursor: usize,
}

impl Iterator for Blocks<'_> {
  type Item = BlockInfo;

  fn next(&mut self) -> Option<Self::Item> {
    if self.cursor >= self.bytes.len() {
      return None;
    }

    let offset = self.cursor;

    match Header::read(self.bytes, offset) {
      Some(header) => {
        self.cursor = offset.saturating_add(header.size);
        Some(BlockInfo {
          offset,
          size: header.size,
          free: header.is_free(),
        })
      }
      None => {
        self.cursor = self.bytes.len();
        None
      }
    }
  }
}
