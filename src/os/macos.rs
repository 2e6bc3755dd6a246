//! macOS-specific overrides on top of the generic POSIX backend.

pub use super::unix::{
  alloc_aligned, commit, decommit, free, page_size, protect, reset, unprotect, unreset,
};

/// macOS exposes superpages only as a fixed 2 MiB size (`VM_FLAGS_SUPERPAGE_SIZE_2MB`),
/// unlike Linux's queryable `/proc/meminfo` default. There is no sysctl that
/// reports it, so it is hardcoded.
const SUPERPAGE_SIZE: usize = 2 * 1024 * 1024;

pub fn large_page_size() -> usize {
  SUPERPAGE_SIZE
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn superpage_size_is_a_multiple_of_the_page_size() {
    assert_eq!(SUPERPAGE_SIZE % super::super::unix::page_size(), 0);
  }
}
