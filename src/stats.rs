//! Opaque statistics sink threaded through the OS-adapter call sites.
//!
//! The arena increments these counters on every commit/decommit/reset/free
//! and OS bypass it performs, but never inspects them. They exist purely for
//! an external caller — a segment allocator, a diagnostics endpoint — to
//! read.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

/// A handle to a set of allocation counters.
#[derive(Debug, Default)]
pub struct Stats {
  pub(crate) regions_reserved: AtomicU64,
  pub(crate) bytes_committed: AtomicU64,
  pub(crate) bytes_released: AtomicU64,
  pub(crate) os_bypasses: AtomicU64,
}

impl Stats {
  /// Creates a private counter set, useful for tests that want to assert on
  /// call counts without cross-talk with other tests sharing [`global`].
  ///
  /// [`global`]: Stats::global
  pub(crate) fn new() -> Self {
    Self::default()
  }

  /// Returns the process-wide instance used by the public arena surface.
  pub fn global() -> &'static Stats {
    static GLOBAL: OnceLock<Stats> = OnceLock::new();
    GLOBAL.get_or_init(Stats::default)
  }

  /// Number of regions that have had OS memory reserved for them.
  pub fn regions_reserved(&self) -> u64 {
    self.regions_reserved.load(Ordering::Relaxed)
  }

  /// Total bytes committed via the OS adapter.
  pub fn bytes_committed(&self) -> u64 {
    self.bytes_committed.load(Ordering::Relaxed)
  }

  /// Total bytes released (decommitted or reset) via the OS adapter.
  pub fn bytes_released(&self) -> u64 {
    self.bytes_released.load(Ordering::Relaxed)
  }

  /// Number of allocations that bypassed the arena's own regions.
  pub fn os_bypasses(&self) -> u64 {
    self.os_bypasses.load(Ordering::Relaxed)
  }
}
