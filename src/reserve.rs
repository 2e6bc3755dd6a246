//! The reservation engine: lazily backs a region with OS virtual memory and
//! commits the sub-range a claim needs.
//!
//! Runs after [`crate::claim::try_claim`] has already won a bit range. The
//! slow path here (an OS reservation) happens at most once per region over
//! the life of the process; every other call through this function finds
//! `region.start` already installed and falls straight to the commit step.

use std::ptr;
use std::sync::atomic::Ordering;

use log::{debug, trace, warn};

use crate::block::good_commit_size;
use crate::claim;
use crate::consts::{BLOCK_SIZE, REGION_SIZE};
use crate::id;
use crate::options::eager_region_commit;
use crate::os::OsAdapter;
use crate::region::RegionTable;
use crate::stats::Stats;

/// Ensures `table.regions[idx]` is backed, commits the `blocks`-wide range
/// starting at `bitidx` when `commit` is requested, and returns the
/// resulting pointer and opaque id.
///
/// On OS reservation failure the claim is rolled back and `None` is
/// returned; the bits are free again for the next claimant. A failure to
/// commit, by contrast, is not rolled back — the caller still gets a
/// non-null pointer into a possibly-uncommitted range, matching the
/// documented tolerance for this one failure mode.
pub(crate) fn reserve_and_commit(
  os: &dyn OsAdapter,
  stats: &Stats,
  table: &RegionTable,
  idx: usize,
  bitidx: usize,
  blocks: usize,
  size: usize,
  commit: bool,
) -> Option<(*mut u8, usize)> {
  let desc = &table.regions[idx];
  let mut start = desc.start.load(Ordering::Acquire);

  if start.is_null() {
    trace!("region {} unbacked, reserving {} bytes", idx, REGION_SIZE);
    let reserve_commit = eager_region_commit();

    let reserved = match os.alloc_aligned(REGION_SIZE, REGION_SIZE, reserve_commit) {
      Some(ptr) => ptr,
      None => {
        warn!("OS reservation failed for region {}", idx);
        claim::rollback(desc, blocks, bitidx);
        return None;
      }
    };

    match desc
      .start
      .compare_exchange(ptr::null_mut(), reserved, Ordering::AcqRel, Ordering::Acquire)
    {
      Ok(_) => {
        table.count.fetch_add(1, Ordering::AcqRel);
        stats.regions_reserved.fetch_add(1, Ordering::Relaxed);
        debug!("region {} backed at {:p}", idx, reserved);
        start = reserved;
      }
      Err(installed) => {
        // Lost the publish race: another thread already installed a
        // pointer. Ours is surplus, give it back.
        trace!("region {} already backed, releasing redundant reservation", idx);
        os.free(reserved, REGION_SIZE);
        start = installed;
      }
    }
  }

  let block_ptr = unsafe { start.add(bitidx * BLOCK_SIZE) };

  if commit && !eager_region_commit() {
    let commit_size = good_commit_size(size, os.large_page_size());
    match os.commit(block_ptr, commit_size) {
      Ok(()) => stats.bytes_committed.fetch_add(commit_size as u64, Ordering::Relaxed),
      Err(err) => {
        warn!("commit of {} bytes at {:p} failed: {}", commit_size, block_ptr, err);
      }
    };
  }

  table.next_idx.store(idx, Ordering::Relaxed);

  Some((block_ptr, id::encode(idx, bitidx)))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::os::mock::MockOs;
  use std::sync::atomic::Ordering::Relaxed;

  #[test]
  fn first_reservation_backs_the_region_and_commits() {
    let _guard = crate::options::test_lock();
    let table = RegionTable::new();
    let os = MockOs::new();
    let stats = Stats::new();

    let (ptr, id) = reserve_and_commit(&os, &stats, &table, 0, 0, 1, BLOCK_SIZE, true).unwrap();

    assert!(!ptr.is_null());
    assert_eq!(id, crate::id::encode(0, 0));
    assert!(!table.regions[0].start.load(Relaxed).is_null());
    assert_eq!(table.count.load(Relaxed), 1);
    assert_eq!(stats.regions_reserved(), 1);
    assert!(stats.bytes_committed() > 0);
  }

  #[test]
  fn second_claim_in_the_same_region_skips_reservation() {
    let table = RegionTable::new();
    let os = MockOs::new();
    let stats = Stats::new();

    reserve_and_commit(&os, &stats, &table, 0, 0, 1, BLOCK_SIZE, true).unwrap();
    reserve_and_commit(&os, &stats, &table, 0, 1, 1, BLOCK_SIZE, true).unwrap();

    assert_eq!(stats.regions_reserved(), 1);
  }

  #[test]
  fn reservation_failure_rolls_back_the_claim() {
    let table = RegionTable::new();
    let os = MockOs::new();
    let stats = Stats::new();
    let desc = &table.regions[0];

    desc.map.store(0b1, Relaxed);
    os.fail_next_alloc();

    let result = reserve_and_commit(&os, &stats, &table, 0, 0, 1, BLOCK_SIZE, true);

    assert!(result.is_none());
    assert_eq!(desc.map.load(Relaxed), 0, "claimed bit must be cleared on OOM");
    assert!(desc.start.load(Relaxed).is_null());
  }

  #[test]
  fn commit_size_is_rounded_up_to_the_large_page_size() {
    let _guard = crate::options::test_lock();
    let table = RegionTable::new();
    let os = MockOs::new();
    let stats = Stats::new();

    reserve_and_commit(&os, &stats, &table, 0, 0, 1, 1, true).unwrap();

    assert_eq!(stats.bytes_committed(), os.large_page_size() as u64);
  }

  #[test]
  fn skips_commit_when_caller_does_not_request_it() {
    let table = RegionTable::new();
    let os = MockOs::new();
    let stats = Stats::new();

    reserve_and_commit(&os, &stats, &table, 0, 0, 1, BLOCK_SIZE, false).unwrap();

    assert_eq!(stats.bytes_committed(), 0);
  }
}
