//! Process-wide, read-only-after-set configuration.
//!
//! The arena has no CLI and no environment variables; this is the entire
//! configuration surface, mirroring `mi_option_t` in spirit but scoped down
//! to the one option this arena consults.

use std::sync::atomic::{AtomicBool, Ordering};

static EAGER_REGION_COMMIT: AtomicBool = AtomicBool::new(false);

/// Returns whether newly reserved regions should be committed immediately,
/// and whether `free` should use `reset` (rather than `decommit`) when
/// releasing a region's working set.
#[inline]
pub fn eager_region_commit() -> bool {
  EAGER_REGION_COMMIT.load(Ordering::Relaxed)
}

/// Enables or disables eager commit of newly reserved regions.
///
/// This is advisory configuration, not a data handoff between threads, so a
/// relaxed store is sufficient: callers that flip this after the arena is
/// already in use should not expect the change to apply atomically to any
/// reservation already in flight.
pub fn set_eager_region_commit(enabled: bool) {
  EAGER_REGION_COMMIT.store(enabled, Ordering::Relaxed);
}

/// Serializes every test, in this module or elsewhere, that reads or writes
/// [`EAGER_REGION_COMMIT`]. The flag is process-wide, so a test that flips it
/// must hold this lock for the duration, and any test whose assertions
/// depend on its value must hold it too — otherwise `cargo test`'s default
/// parallel runner can interleave the two and the read sees a transient
/// value neither test wrote.
#[cfg(test)]
pub(crate) fn test_lock() -> std::sync::MutexGuard<'static, ()> {
  static LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
  LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
