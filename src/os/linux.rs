//! Linux-specific overrides on top of the generic POSIX backend.

pub use super::unix::{
  alloc_aligned, commit, decommit, free, page_size, protect, reset, unprotect, unreset,
};

use std::fs::File;
use std::io::{BufRead, BufReader};

/// Reads the default huge page size from `/proc/meminfo`'s `Hugepagesize`
/// line (reported in kB). Falls back to the regular page size if the file
/// is unreadable or the line is missing, which is the case on kernels built
/// without `CONFIG_HUGETLB_PAGE` or inside some containers.
pub fn large_page_size() -> usize {
  read_hugepage_size().unwrap_or_else(super::unix::page_size)
}

fn read_hugepage_size() -> Option<usize> {
  let file = File::open("/proc/meminfo").ok()?;
  let reader = BufReader::new(file);

  for line in reader.lines() {
    let line = line.ok()?;
    if let Some(size) = parse_hugepagesize_line(&line) {
      return Some(size);
    }
  }

  None
}

fn parse_hugepagesize_line(line: &str) -> Option<usize> {
  let rest = line.strip_prefix("Hugepagesize:")?;
  let kb: usize = rest.trim().trim_end_matches("kB").trim().parse().ok()?;
  Some(kb * 1024)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_a_well_formed_meminfo_line() {
    assert_eq!(
      parse_hugepagesize_line("Hugepagesize:    2048 kB"),
      Some(2048 * 1024)
    );
  }

  #[test]
  fn rejects_an_unrelated_line() {
    assert_eq!(parse_hugepagesize_line("MemTotal:       16384000 kB"), None);
  }
}
