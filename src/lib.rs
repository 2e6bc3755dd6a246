#![deny(
  clippy::all,
  clippy::missing_inline_in_public_items,
  clippy::ptr_as_ptr,
  clippy::print_stdout,
  missing_docs,
  nonstandard_style,
  unused
)]
//! A lock-free region arena for medium-to-large virtual memory requests.
//!
//! This crate sits between raw OS virtual-memory primitives
//! (reserve/commit/decommit/reset/protect) and a higher-level allocator that
//! wants large, aligned chunks without paying for an OS call on every
//! request. It amortizes OS reservations by tracking a process-wide table of
//! fixed-size regions, each carved into blocks tracked by a single atomic
//! bitmap word, and reuses address space handed back via [`free`].
//!
//! Allocation below [`REGION_MAX_ALLOC`](consts::REGION_MAX_ALLOC) and at or
//! under the block size in alignment is served from this table; anything
//! larger, or more strictly aligned, bypasses straight to the OS adapter and
//! is tagged with a sentinel id so [`free`] knows to route it there too.
//!
//! # Examples
//!
//! ```
//! let (ptr, id) = region_arena::alloc(4 * 1024 * 1024, true);
//! assert!(!ptr.is_null());
//! region_arena::free(ptr, 4 * 1024 * 1024, id);
//! ```
//!
//! # Parallelism
//!
//! Every operation here is lock-free: claiming a block range is a single CAS
//! loop over a region's bitmap, and backing a region with OS memory is a
//! write-once pointer published under CAS. No arena call ever blocks on
//! another arena call; the only blocking is inside the OS adapter itself.

mod arena;
mod block;
mod claim;
pub mod consts;
mod error;
mod id;
pub mod options;
mod os;
mod protection;
mod region;
mod reserve;
mod stats;

pub use error::{Error, Result};
pub use protection::Protection;
pub use stats::Stats;

use os::{system, OsAdapter};
use region::RegionTable;

/// Allocates at least `size` bytes, aligned to at least
/// [`consts::BLOCK_SIZE`], optionally committing the range immediately.
///
/// Equivalent to `alloc_aligned(size, 0, commit)`.
#[inline]
pub fn alloc(size: usize, commit: bool) -> (*mut u8, usize) {
  alloc_aligned(size, 0, commit)
}

/// Allocates at least `size` bytes aligned to at least `alignment`.
///
/// Requests above [`consts::REGION_MAX_ALLOC`] or with `alignment` above
/// [`consts::BLOCK_SIZE`] bypass the arena's own table and go straight to
/// the OS adapter; [`is_bypass`] on the returned id is `true` in that case.
///
/// Returns a null pointer if the OS adapter could not satisfy the request,
/// at any point in the scan.
///
/// # Panics
///
/// Panics in debug builds if `size` is zero.
#[inline]
pub fn alloc_aligned(size: usize, alignment: usize, commit: bool) -> (*mut u8, usize) {
  arena::alloc_aligned_with(&system(), Stats::global(), RegionTable::global(), size, alignment, commit)
}

/// Releases an allocation obtained from [`alloc`] or [`alloc_aligned`].
///
/// A no-op if `ptr` is null, `size` is zero, or `(ptr, size, id)` is not a
/// live allocation this arena produced.
#[inline]
pub fn free(ptr: *mut u8, size: usize, id: usize) {
  arena::free_with(&system(), Stats::global(), RegionTable::global(), ptr, size, id)
}

/// Backs `[ptr, ptr+size)` with physical memory. Forwarded unchanged to the
/// OS adapter; does not consult arena state.
#[inline]
pub fn commit(ptr: *mut u8, size: usize) -> Result<()> {
  system().commit(ptr, size)
}

/// Returns the physical memory backing `[ptr, ptr+size)` to the OS while
/// retaining the virtual reservation.
#[inline]
pub fn decommit(ptr: *mut u8, size: usize) -> Result<()> {
  system().decommit(ptr, size)
}

/// Hints that the contents of `[ptr, ptr+size)` may be discarded.
#[inline]
pub fn reset(ptr: *mut u8, size: usize) -> Result<()> {
  system().reset(ptr, size)
}

/// Inverse of [`reset`].
#[inline]
pub fn unreset(ptr: *mut u8, size: usize) -> Result<()> {
  system().unreset(ptr, size)
}

/// Changes the protection of `[ptr, ptr+size)`.
#[inline]
pub fn protect(ptr: *mut u8, size: usize, protection: Protection) -> Result<()> {
  system().protect(ptr, size, protection)
}

/// Restores the protection of `[ptr, ptr+size)`.
#[inline]
pub fn unprotect(ptr: *mut u8, size: usize, protection: Protection) -> Result<()> {
  system().unprotect(ptr, size, protection)
}

/// Returns whether `id` denotes an allocation that bypassed the arena's own
/// table and must be released through the OS adapter directly.
#[inline]
pub fn is_bypass(id: usize) -> bool {
  id::is_bypass(id)
}
