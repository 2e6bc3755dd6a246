//! Packing and unpacking of `(region_index, bit_index)` allocation ids.

use crate::consts::BITS;

/// Sentinel id for allocations satisfied directly by the OS adapter (the
/// request was oversized or over-aligned for the arena's own regions).
pub const ID_BYPASS: usize = usize::MAX;

/// Packs a region index and bit index into an opaque id.
#[inline]
pub fn encode(idx: usize, bitidx: usize) -> usize {
  debug_assert!(bitidx < BITS);
  idx * BITS + bitidx
}

/// Unpacks an id into its region index and bit index.
#[inline]
pub fn decode(id: usize) -> (usize, usize) {
  (id / BITS, id % BITS)
}

/// Returns whether `id` is the bypass sentinel.
#[inline]
pub fn is_bypass(id: usize) -> bool {
  id == ID_BYPASS
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::consts::REGION_COUNT_MAX;
  use proptest::prelude::*;

  #[test]
  fn bypass_never_collides_with_the_highest_valid_encoding() {
    let highest = encode(REGION_COUNT_MAX - 1, BITS - 1);
    assert!(!is_bypass(highest));
    assert!(is_bypass(ID_BYPASS));
  }

  proptest! {
    #[test]
    fn round_trips_over_the_valid_domain(
      idx in 0..REGION_COUNT_MAX,
      bitidx in 0..BITS,
    ) {
      let id = encode(idx, bitidx);
      prop_assert_ne!(id, ID_BYPASS);
      prop_assert_eq!(decode(id), (idx, bitidx));
    }
  }
}
