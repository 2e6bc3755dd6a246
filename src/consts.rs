//! Platform-parameterized sizing constants for the region arena.
//!
//! These mirror the constants a segment allocator would hand-tune per target:
//! the block granule, the bitmap word width, and the aggregate virtual
//! address ceiling the arena is allowed to claim over the life of the
//! process.

/// The segment granule. All arena-internal allocations are a multiple of
/// this size.
pub const BLOCK_SIZE: usize = 4 * 1024 * 1024;

/// Width of the bitmap word backing a single region, i.e. the number of
/// blocks a region holds.
pub const BITS: usize = usize::BITS as usize;

/// Size of a single region: one bitmap word's worth of blocks.
pub const REGION_SIZE: usize = BLOCK_SIZE * BITS;

/// The largest request the arena will serve out of its own regions.
/// Anything larger bypasses straight to the OS adapter.
pub const REGION_MAX_ALLOC: usize = (BITS / 4) * BLOCK_SIZE;

/// Ceiling on aggregate arena virtual address use.
#[cfg(target_pointer_width = "64")]
pub const HEAP_MAX: usize = 256 * 1024 * 1024 * 1024;

/// Ceiling on aggregate arena virtual address use.
#[cfg(target_pointer_width = "32")]
pub const HEAP_MAX: usize = 3 * 1024 * 1024 * 1024;

/// Size of the region descriptor table.
pub const REGION_COUNT_MAX: usize = HEAP_MAX / REGION_SIZE;
