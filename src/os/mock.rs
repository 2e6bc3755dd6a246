//! An in-memory [`OsAdapter`] backing this crate's own concurrency tests.
//!
//! Real `mmap`/`VirtualAlloc` reservations are expensive and, at
//! `REGION_SIZE` granularity, wasteful to spin up per test. `MockOs` stands
//! in for the real adapter so the claim/reserve/free engines can be
//! exercised directly, including OOM injection, without touching the OS.

use std::alloc::{self, Layout};
use std::collections::HashMap;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::error::Error;
use crate::os::OsAdapter;
use crate::{Protection, Result};

/// Backs allocations with the process heap (`std::alloc`) instead of raw OS
/// pages, while still honoring the `OsAdapter` contract (alignment,
/// commit/decommit bookkeeping, OOM simulation).
///
/// `std::alloc::dealloc` requires the exact `Layout` an allocation was made
/// with, so every live pointer's layout is tracked in a side table rather
/// than recomputed from `(ptr, size)` at `free` time.
pub(crate) struct MockOs {
  layouts: Mutex<HashMap<usize, Layout>>,
  fail_next_alloc: AtomicBool,
  bytes_committed: AtomicUsize,
  bytes_released: AtomicUsize,
}

impl MockOs {
  pub(crate) fn new() -> Self {
    MockOs {
      layouts: Mutex::new(HashMap::new()),
      fail_next_alloc: AtomicBool::new(false),
      bytes_committed: AtomicUsize::new(0),
      bytes_released: AtomicUsize::new(0),
    }
  }

  /// Makes the next `alloc_aligned` call fail, simulating OS exhaustion.
  pub(crate) fn fail_next_alloc(&self) {
    self.fail_next_alloc.store(true, Ordering::SeqCst);
  }

  pub(crate) fn bytes_committed(&self) -> usize {
    self.bytes_committed.load(Ordering::SeqCst)
  }

  pub(crate) fn bytes_released(&self) -> usize {
    self.bytes_released.load(Ordering::SeqCst)
  }
}

impl OsAdapter for MockOs {
  fn alloc_aligned(&self, size: usize, align: usize, _commit: bool) -> Option<*mut u8> {
    if self.fail_next_alloc.swap(false, Ordering::SeqCst) {
      return None;
    }

    let layout = Layout::from_size_align(size, align).ok()?;
    let ptr = unsafe { alloc::alloc_zeroed(layout) };
    if ptr.is_null() {
      return None;
    }

    self.layouts.lock().unwrap().insert(ptr as usize, layout);
    Some(ptr)
  }

  fn free(&self, ptr: *mut u8, _size: usize) {
    if let Some(layout) = self.layouts.lock().unwrap().remove(&(ptr as usize)) {
      unsafe { alloc::dealloc(ptr, layout) };
    }
  }

  fn commit(&self, _ptr: *mut u8, size: usize) -> Result<()> {
    self.bytes_committed.fetch_add(size, Ordering::SeqCst);
    Ok(())
  }

  fn decommit(&self, _ptr: *mut u8, size: usize) -> Result<()> {
    self.bytes_released.fetch_add(size, Ordering::SeqCst);
    Ok(())
  }

  fn reset(&self, _ptr: *mut u8, size: usize) -> Result<()> {
    self.bytes_released.fetch_add(size, Ordering::SeqCst);
    Ok(())
  }

  fn unreset(&self, _ptr: *mut u8, _size: usize) -> Result<()> {
    Ok(())
  }

  fn protect(&self, ptr: *mut u8, _size: usize, _protection: Protection) -> Result<()> {
    if ptr.is_null() {
      Err(Error::NullAddress)
    } else {
      Ok(())
    }
  }

  fn unprotect(&self, ptr: *mut u8, size: usize, protection: Protection) -> Result<()> {
    self.protect(ptr, size, protection)
  }

  fn page_size(&self) -> usize {
    4096
  }

  fn large_page_size(&self) -> usize {
    2 * 1024 * 1024
  }
}

impl Drop for MockOs {
  fn drop(&mut self) {
    let mut layouts = self.layouts.lock().unwrap();
    for (ptr, layout) in layouts.drain() {
      unsafe { alloc::dealloc(ptr as *mut u8, layout) };
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn alloc_then_free_round_trips_cleanly() {
    let os = MockOs::new();
    let p = os.alloc_aligned(4096, 4096, true).unwrap();
    assert_eq!(p as usize % 4096, 0);
    os.free(p, 4096);
  }

  #[test]
  fn fail_next_alloc_fails_exactly_one_call() {
    let os = MockOs::new();
    os.fail_next_alloc();
    assert!(os.alloc_aligned(4096, 4096, true).is_none());
    assert!(os.alloc_aligned(4096, 4096, true).is_some());
  }

  #[test]
  fn commit_and_decommit_are_tallied() {
    let os = MockOs::new();
    os.commit(ptr::null_mut(), 100).unwrap();
    os.decommit(ptr::null_mut(), 40).unwrap();
    assert_eq!(os.bytes_committed(), 100);
    assert_eq!(os.bytes_released(), 40);
  }

  #[test]
  fn protect_rejects_a_null_address() {
    let os = MockOs::new();
    assert!(os.protect(ptr::null_mut(), 4096, Protection::READ).is_err());
  }
}
