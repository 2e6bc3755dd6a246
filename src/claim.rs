//! Lock-free claim of a contiguous run of free bits in a region's bitmap.

use std::sync::atomic::Ordering;

use log::trace;

use crate::block::block_mask;
use crate::consts::BITS;
use crate::region::RegionDescriptor;

/// Outcome of a claim attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
  /// A run was claimed starting at this bit index.
  Claimed(usize),
  /// No qualifying free run exists in the current bitmap.
  NoRoom,
}

/// Attempts to claim a contiguous run of `blocks` zero bits in `desc.map`.
///
/// Claiming itself is infallible: it either finds room and wins the CAS, or
/// it doesn't find room. A failed CAS simply means another claim narrowed
/// the free set first, so the scan restarts from a fresh snapshot.
pub fn try_claim(desc: &RegionDescriptor, blocks: usize) -> Claim {
  debug_assert!(blocks > 0 && blocks <= BITS);

  loop {
    let snapshot = desc.map.load(Ordering::Acquire);
    trace!("claim attempt: {} blocks against map {:#x}", blocks, snapshot);

    let bitidx = match find_free_run(snapshot, blocks) {
      Some(bitidx) => bitidx,
      None => return Claim::NoRoom,
    };

    let mask = block_mask(blocks, bitidx);
    let newmap = snapshot | mask;

    match desc
      .map
      .compare_exchange_weak(snapshot, newmap, Ordering::AcqRel, Ordering::Relaxed)
    {
      Ok(_) => return Claim::Claimed(bitidx),
      Err(actual) => {
        trace!("CAS retry: map changed to {:#x} mid-claim", actual);
        continue;
      }
    }
  }
}

/// Rolls back a claim: clears the bits claimed at `bitidx..bitidx+blocks`.
///
/// The only rollback path in the arena: used when a claim succeeds but the
/// OS reservation backing the region subsequently fails.
pub fn rollback(desc: &RegionDescriptor, blocks: usize, bitidx: usize) {
  desc.clear_mask(block_mask(blocks, bitidx));
}

/// Scans `map` from bit 0 upward for the first run of `blocks` zero bits.
fn find_free_run(map: usize, blocks: usize) -> Option<usize> {
  let mut bit = 0;

  while bit + blocks <= BITS {
    if map & (1 << bit) != 0 {
      bit += 1;
      continue;
    }

    let mut run = 0;
    while bit + run < BITS && map & (1 << (bit + run)) == 0 {
      run += 1;
    }

    if run >= blocks {
      return Some(bit);
    }

    bit += run;
  }

  None
}
