//! In-buffer block header.
//!
//! Every block starts with four machine words:
//!
//! ```text
//!   ┌────────────┬────────────┬────────────┬────────────┐
//!   │ total_size │    tag     │    next    │    prev    │
//!   └────────────┴────────────┴────────────┴────────────┘
//! ```
//!
//! `next`/`prev` are offsets into the pool and only mean something while the
//! block is free. `NIL` stands for "no link".

use core::mem;

pub(crate) const WORD: usize = mem::size_of::<usize>();

/// Size in bytes of the header placed in front of every block.
pub const HEADER_SIZE: usize = 4 * WORD;

const FREE_TAG: usize = 0x4652_4545;
const USED_TAG: usize = 0x5553_4544;
const NIL: usize = usize::MAX;

const SIZE_SLOT: usize = 0;
const TAG_SLOT: usize = WORD;
const NEXT_SLOT: usize = 2 * WORD;
const PREV_SLOT: usize = 3 * WORD;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum State {
  Free {
    next: Option<usize>,
    prev: Option<usize>,
  },
  Allocated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Header {
  pub size: usize,
  pub state: State,
}

impl Header {
  pub fn free(
    size: usize,
    next: Option<usize>,
    prev: Option<usize>,
  ) -> Self {
    Self {
      size,
      state: State::Free { next, prev },
    }
  }

  pub fn allocated(size: usize) -> Self {
    Self {
      size,
      state: State::Allocated,
    }
  }

  pub fn is_free(&self) -> bool {
    matches!(self.state, State::Free { .. })
  }

  /// Decodes the header at `offset`.
  ///
  /// Returns `None` if the header does not fit in `bytes`, the tag is not a
  /// known one, or the recorded size is smaller than a header.
  pub fn read(
    bytes: &[u8],
    offset: usize,
  ) -> Option<Self> {
    let size = read_word(bytes, offset.checked_add(SIZE_SLOT)?)?;
    let tag = read_word(bytes, offset.checked_add(TAG_SLOT)?)?;

    if size < HEADER_SIZE {
      return None;
    }

    let state = match tag {
      FREE_TAG => State::Free {
        next: link(read_word(bytes, offset.checked_add(NEXT_SLOT)?)?),
        prev: link(read_word(bytes, offset.checked_add(PREV_SLOT)?)?),
      },
      USED_TAG => State::Allocated,
      _ => return None,
    };

    Some(Self { size, state })
  }

  /// Encodes the header at `offset`. The caller guarantees the slot is in
  /// bounds.
  pub fn write(
    self,
    bytes: &mut [u8],
    offset: usize,
  ) {
    write_word(bytes, offset + SIZE_SLOT, self.size);

    match self.state {
      State::Free { next, prev } => {
        write_word(bytes, offset + TAG_SLOT, FREE_TAG);
        write_word(bytes, offset + NEXT_SLOT, next.unwrap_or(NIL));
        write_word(bytes, offset + PREV_SLOT, prev.unwrap_or(NIL));
      }
      State::Allocated => write_word(bytes, offset + TAG_SLOT, USED_TAG),
    }
  }

  /// Wipes the header at `offset` after the block was merged into a
  /// neighbor, so stale handles to it no longer decode.
  pub fn erase(
    bytes: &mut [u8],
    offset: usize,
  ) {
    bytes[offset..offset + HEADER_SIZE].fill(0);
  }
}

fn link(raw: usize) -> Option<usize> {
  (raw != NIL).then_some(raw)
}

fn read_word(
  bytes: &[u8],
  at: usize,
) -> Option<usize> {
  let slot = bytes.get(at..at.checked_add(WORD)?)?;
  Some(usize::from_ne_bytes(slot.try_into().ok()?))
}

fn write_word(
  bytes: &mut [u8],
  at: usize,
  value: usize,
) {
  bytes[at..at + WORD].copy_from_slice(&value.to_ne_bytes());
}
