//! The allocation façade: shards requests across the region table, bypasses
//! oversized or over-aligned requests straight to the OS adapter, and
//! releases claimed ranges back on `free`.

use std::ptr;
use std::sync::atomic::Ordering;

use log::{debug, trace, warn};

use crate::block::{block_count, block_mask, good_commit_size, round_up_saturating};
use crate::claim::{self, Claim};
use crate::consts::{BITS, BLOCK_SIZE, REGION_COUNT_MAX, REGION_MAX_ALLOC};
use crate::id::{self, ID_BYPASS};
use crate::options::eager_region_commit;
use crate::os::OsAdapter;
use crate::region::RegionTable;
use crate::reserve::reserve_and_commit;
use crate::stats::Stats;

/// `alloc_aligned(size, alignment, commit)` against an explicit table and
/// OS adapter, parameterized so unit tests never touch process-global
/// state.
pub(crate) fn alloc_aligned_with(
  os: &dyn OsAdapter,
  stats: &Stats,
  table: &RegionTable,
  size: usize,
  alignment: usize,
  commit: bool,
) -> (*mut u8, usize) {
  debug_assert!(size > 0);

  if size > REGION_MAX_ALLOC || alignment > BLOCK_SIZE {
    return bypass(os, stats, size, alignment, commit);
  }

  let rounded = round_up_saturating(size, os.page_size());
  let need = block_count(rounded);

  if let Some(result) = scan_populated(os, stats, table, need, rounded, commit) {
    return result;
  }
  if let Some(result) = scan_growth(os, stats, table, need, rounded, commit) {
    return result;
  }

  bypass(os, stats, size, alignment, commit)
}

/// `alloc(size, commit)`, equivalent to `alloc_aligned(size, 0, commit)`.
pub(crate) fn alloc_with(
  os: &dyn OsAdapter,
  stats: &Stats,
  table: &RegionTable,
  size: usize,
  commit: bool,
) -> (*mut u8, usize) {
  alloc_aligned_with(os, stats, table, size, 0, commit)
}

/// Releases an allocation obtained from [`alloc_with`] or
/// [`alloc_aligned_with`]. A no-op on any malformed input, matching the
/// defensive posture of the rest of the release path.
pub(crate) fn free_with(os: &dyn OsAdapter, stats: &Stats, table: &RegionTable, ptr: *mut u8, size: usize, id: usize) {
  if ptr.is_null() || size == 0 {
    trace!("free no-op: null pointer or zero size");
    return;
  }

  if id::is_bypass(id) {
    os.free(ptr, size);
    debug!("released bypass allocation of {} bytes at {:p}", size, ptr);
    return;
  }

  if size > REGION_MAX_ALLOC {
    trace!("free no-op: {} bytes exceeds REGION_MAX_ALLOC", size);
    return;
  }

  let rounded = round_up_saturating(size, os.page_size());
  let (idx, bitidx) = id::decode(id);

  if idx >= REGION_COUNT_MAX {
    trace!("free no-op: region index {} out of range", idx);
    return;
  }

  let blocks = block_count(rounded);
  if bitidx + blocks > BITS {
    trace!("free no-op: range {}..{} overflows the bitmap", bitidx, bitidx + blocks);
    return;
  }

  let desc = &table.regions[idx];
  let start = desc.start.load(Ordering::Acquire);
  if start.is_null() {
    trace!("free no-op: region {} was never backed", idx);
    return;
  }

  let block_ptr = unsafe { start.add(bitidx * BLOCK_SIZE) };
  if block_ptr != ptr {
    trace!("free no-op: pointer {:p} does not match derived {:p}", ptr, block_ptr);
    return;
  }

  let release_result = if eager_region_commit() {
    os.reset(ptr, rounded)
  } else {
    os.decommit(ptr, rounded)
  };

  match release_result {
    Ok(()) => {
      stats.bytes_released.fetch_add(rounded as u64, Ordering::Relaxed);
      debug!("released {} bytes at {:p} (region {}, bits {}..{})", rounded, ptr, idx, bitidx, bitidx + blocks);
    }
    Err(err) => warn!("release of {} bytes at {:p} failed: {}", rounded, ptr, err),
  }

  claim::rollback(desc, blocks, bitidx);
}

/// Scans the populated prefix of the table (indices `0..count`), starting
/// at the advisory `next_idx` hint, wrapping modulo `count`.
fn scan_populated(
  os: &dyn OsAdapter,
  stats: &Stats,
  table: &RegionTable,
  need: usize,
  size: usize,
  commit: bool,
) -> Option<(*mut u8, usize)> {
  let count = table.count.load(Ordering::Acquire);
  if count == 0 {
    return None;
  }

  let start = table.next_idx.load(Ordering::Relaxed) % count;
  let indices = (0..count).map(|offset| (start + offset) % count);

  scan(os, stats, table, indices, need, size, commit)
}

/// Scans the never-yet-backed suffix of the table (indices
/// `count..REGION_COUNT_MAX`), growing the populated prefix on success.
fn scan_growth(
  os: &dyn OsAdapter,
  stats: &Stats,
  table: &RegionTable,
  need: usize,
  size: usize,
  commit: bool,
) -> Option<(*mut u8, usize)> {
  let count = table.count.load(Ordering::Acquire);
  scan(os, stats, table, count..REGION_COUNT_MAX, need, size, commit)
}

fn scan(
  os: &dyn OsAdapter,
  stats: &Stats,
  table: &RegionTable,
  indices: impl Iterator<Item = usize>,
  need: usize,
  size: usize,
  commit: bool,
) -> Option<(*mut u8, usize)> {
  for idx in indices {
    let desc = &table.regions[idx];
    match claim::try_claim(desc, need) {
      Claim::Claimed(bitidx) => {
        return Some(
          reserve_and_commit(os, stats, table, idx, bitidx, need, size, commit)
            .unwrap_or((ptr::null_mut(), ID_BYPASS)),
        );
      }
      Claim::NoRoom => continue,
    }
  }

  None
}

/// Delegates a request the arena cannot serve itself (oversized,
/// over-aligned, or the table is exhausted) straight to the OS adapter.
fn bypass(os: &dyn OsAdapter, stats: &Stats, size: usize, alignment: usize, commit: bool) -> (*mut u8, usize) {
  let commit_size = good_commit_size(size, os.large_page_size());

  match os.alloc_aligned(commit_size, alignment.max(1), commit) {
    Some(ptr) => {
      stats.os_bypasses.fetch_add(1, Ordering::Relaxed);
      if commit {
        stats.bytes_committed.fetch_add(commit_size as u64, Ordering::Relaxed);
      }
      (ptr, ID_BYPASS)
    }
    None => (ptr::null_mut(), ID_BYPASS),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::os::mock::MockOs;
  use crate::consts::REGION_SIZE;

  // Mirrors S1 from the design's concrete-scenario table.
  #[test]
  fn first_small_alloc_claims_bit_zero_of_region_zero() {
    let table = RegionTable::new();
    let os = MockOs::new();
    let stats = Stats::new();

    let (ptr, id) = alloc_with(&os, &stats, &table, BLOCK_SIZE, true);

    assert!(!ptr.is_null());
    assert_eq!(id, id::encode(0, 0));
    assert_eq!(table.regions[0].map.load(Ordering::Relaxed), 1);
    assert_eq!(table.count.load(Ordering::Relaxed), 1);
  }

  // Mirrors S2.
  #[test]
  fn three_sequential_allocs_claim_consecutive_bits() {
    let table = RegionTable::new();
    let os = MockOs::new();
    let stats = Stats::new();

    let (_, id0) = alloc_with(&os, &stats, &table, BLOCK_SIZE, true);
    let (_, id1) = alloc_with(&os, &stats, &table, BLOCK_SIZE, true);
    let (_, id2) = alloc_with(&os, &stats, &table, BLOCK_SIZE, true);

    assert_eq!((id0, id1, id2), (id::encode(0, 0), id::encode(0, 1), id::encode(0, 2)));
    assert_eq!(table.regions[0].map.load(Ordering::Relaxed), 0b111);
  }

  // Mirrors S3.
  #[test]
  fn freeing_and_reallocating_the_same_size_reuses_the_range() {
    let table = RegionTable::new();
    let os = MockOs::new();
    let stats = Stats::new();
    let size = BLOCK_SIZE * 4;

    let (ptr1, id1) = alloc_with(&os, &stats, &table, size, true);
    assert_eq!(table.regions[0].map.load(Ordering::Relaxed), 0b1111);

    free_with(&os, &stats, &table, ptr1, size, id1);
    assert_eq!(table.regions[0].map.load(Ordering::Relaxed), 0);

    let (ptr2, id2) = alloc_with(&os, &stats, &table, size, true);
    assert_eq!(ptr1, ptr2);
    assert_eq!(id1, id2);
    assert_eq!(table.regions[0].map.load(Ordering::Relaxed), 0b1111);
    assert!(!table.regions[0].start.load(Ordering::Relaxed).is_null());
  }

  // Mirrors S4.
  #[test]
  fn oversized_request_bypasses_with_the_sentinel_id() {
    let table = RegionTable::new();
    let os = MockOs::new();
    let stats = Stats::new();

    let (ptr, id) = alloc_with(&os, &stats, &table, REGION_MAX_ALLOC * 2, true);

    assert!(!ptr.is_null());
    assert_eq!(id, ID_BYPASS);
    assert_eq!(table.count.load(Ordering::Relaxed), 0);
    assert_eq!(stats.os_bypasses(), 1);
  }

  #[test]
  fn over_aligned_request_bypasses_even_when_small() {
    let table = RegionTable::new();
    let os = MockOs::new();
    let stats = Stats::new();

    let (ptr, id) = alloc_aligned_with(&os, &stats, &table, BLOCK_SIZE, REGION_SIZE, true);

    assert!(!ptr.is_null());
    assert_eq!(id, ID_BYPASS);
  }

  // Mirrors S5: fill region 0 completely, then spill into region 1.
  #[test]
  fn filling_a_region_spills_into_the_next_one() {
    let table = RegionTable::new();
    let os = MockOs::new();
    let stats = Stats::new();

    for _ in 0..BITS {
      alloc_with(&os, &stats, &table, BLOCK_SIZE, true);
    }
    assert_eq!(table.regions[0].map.load(Ordering::Relaxed), usize::MAX);
    assert_eq!(table.count.load(Ordering::Relaxed), 1);

    let (ptr, id) = alloc_with(&os, &stats, &table, BLOCK_SIZE, true);

    assert!(!ptr.is_null());
    assert_eq!(id, id::encode(1, 0));
    assert_eq!(table.count.load(Ordering::Relaxed), 2);
  }

  #[test]
  fn free_of_a_null_pointer_is_a_no_op() {
    let table = RegionTable::new();
    let os = MockOs::new();
    let stats = Stats::new();

    free_with(&os, &stats, &table, ptr::null_mut(), BLOCK_SIZE, 0);
  }

  #[test]
  fn free_with_a_mismatched_pointer_is_a_no_op() {
    let table = RegionTable::new();
    let os = MockOs::new();
    let stats = Stats::new();

    let (ptr, id) = alloc_with(&os, &stats, &table, BLOCK_SIZE, true);
    let bogus = unsafe { ptr.add(BLOCK_SIZE) };

    free_with(&os, &stats, &table, bogus, BLOCK_SIZE, id);

    assert_eq!(table.regions[0].map.load(Ordering::Relaxed), 1, "mismatched free must not clear the bit");
  }

  // Mirrors S6.
  #[test]
  fn concurrent_allocs_never_overlap_and_reservations_are_shared() {
    use std::sync::Arc;
    use std::thread;

    let table = Arc::new(RegionTable::new());
    let os = Arc::new(MockOs::new());
    let stats = Arc::new(Stats::new());

    let threads: Vec<_> = (0..BITS)
      .map(|_| {
        let table = Arc::clone(&table);
        let os = Arc::clone(&os);
        let stats = Arc::clone(&stats);
        thread::spawn(move || alloc_with(os.as_ref(), stats.as_ref(), table.as_ref(), BLOCK_SIZE, true))
      })
      .collect();

    let mut ids = Vec::new();
    for handle in threads {
      let (ptr, id) = handle.join().unwrap();
      assert!(!ptr.is_null());
      ids.push(id);
    }

    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), BITS);
    assert_eq!(table.regions[0].map.load(Ordering::Relaxed), usize::MAX);
    assert_eq!(table.count.load(Ordering::Relaxed), 1, "one region must serve all BITS allocations");
  }
}
