use std::{env, io::Read};

use rpool::{MallocBacking, Pool, PoolResult};
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_POOL_SIZE: usize = 1024;

/// Waits until the user presses ENTER.
/// Handy when following the free list step by step.
fn block_until_enter_pressed(step: bool) {
  if step {
    println!("\n>>> Press ENTER to continue...");
    let _ = std::io::stdin().bytes().next();
  }
}

fn show(
  label: &str,
  pool: &Pool<MallocBacking>,
) {
  println!("{label}:");
  print!("{pool}");
  println!();
}

fn main() -> PoolResult<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  let mut step = false;
  let mut pool_size = DEFAULT_POOL_SIZE;

  for arg in env::args().skip(1) {
    match arg.as_str() {
      "--step" => step = true,
      other => match other.parse() {
        Ok(size) => pool_size = size,
        Err(_) => eprintln!("ignoring argument {other:?}, expected a pool size or --step"),
      },
    }
  }

  let mut pool = Pool::from_malloc(pool_size)?;
  info!(pool_size, "pool ready");

  show("Initial state", &pool);
  block_until_enter_pressed(step);

  // --------------------------------------------------------------------
  // 1) Allocate 100, 200 and 50 bytes. Each request splits the single
  //    free block and leaves the remainder at the same list position.
  // --------------------------------------------------------------------
  println!("--- Test 1: Allocating 100, 200, and 50 bytes ---");
  let p1 = pool.allocate(100)?;
  let p2 = pool.allocate(200)?;
  let p3 = pool.allocate(50)?;

  if let Some(handle) = p1 {
    pool.bytes_mut(handle)?.fill(0xAB);
  }

  show("State after allocations", &pool);
  block_until_enter_pressed(step);

  // --------------------------------------------------------------------
  // 2) Release the middle block, then the first, then the last. The free
  //    list shrinks back to one block covering the whole pool.
  // --------------------------------------------------------------------
  println!("--- Test 2: Freeing the middle block (p2) ---");
  pool.release(p2)?;
  show("State after freeing p2", &pool);

  println!("--- Freeing the first block (p1) ---");
  pool.release(p1)?;
  show("State after freeing p1 (coalesced with p2's old space)", &pool);

  println!("--- Freeing the last block (p3) ---");
  pool.release(p3)?;
  show("State after freeing p3 (one large block)", &pool);
  block_until_enter_pressed(step);

  // --------------------------------------------------------------------
  // 3) Five equal blocks; free 1 and 3, then 2 merges all three.
  // --------------------------------------------------------------------
  println!("--- Test 3: Stress Test ---");
  let mut handles = Vec::new();
  for _ in 0..5 {
    handles.push(pool.allocate(60)?);
  }
  show("State after five allocations", &pool);

  pool.release(handles[1])?;
  pool.release(handles[3])?;
  show("State after freeing handles 1 and 3", &pool);

  pool.release(handles[2])?;
  show("State after freeing handle 2 (coalesces 1, 2 and 3)", &pool);

  pool.release(handles[0])?;
  pool.release(handles[4])?;
  show("Final state after all cleanup", &pool);

  let stats = pool.stats();
  info!(
    free_bytes = stats.free_bytes,
    free_blocks = stats.free_blocks,
    live = stats.live_allocations,
    "done"
  );

  Ok(())
}
