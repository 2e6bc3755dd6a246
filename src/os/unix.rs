//! POSIX backend: `mmap`/`munmap`/`mprotect`/`madvise`. Shared by every unix
//! target family; Linux and macOS layer a platform-specific
//! [`large_page_size`] on top.

use std::ptr;
use std::sync::OnceLock;

use crate::error::Error;
use crate::{Protection, Result};

/// Reserves `size` bytes aligned to `align`, optionally pre-committed.
///
/// `mmap` only guarantees page alignment, so a coarser alignment (the arena
/// asks for `REGION_SIZE`) is obtained by over-reserving and trimming the
/// slack on either side — the classic aligned-mmap trick.
pub fn alloc_aligned(size: usize, align: usize, commit: bool) -> Option<*mut u8> {
  let prot = native_prot(if commit {
    Protection::READ_WRITE
  } else {
    Protection::NONE
  });
  let flags = libc::MAP_PRIVATE | libc::MAP_ANON;

  unsafe {
    if align <= page_size() {
      let p = libc::mmap(ptr::null_mut(), size, prot, flags, -1, 0);
      return if p == libc::MAP_FAILED {
        None
      } else {
        Some(p as *mut u8)
      };
    }

    let padded = size.checked_add(align)?;
    let p = libc::mmap(ptr::null_mut(), padded, prot, flags, -1, 0);
    if p == libc::MAP_FAILED {
      return None;
    }

    let base = p as usize;
    let aligned = (base + align - 1) & !(align - 1);
    let front_slack = aligned - base;
    let back_slack = padded - front_slack - size;

    if front_slack > 0 {
      libc::munmap(p, front_slack);
    }
    if back_slack > 0 {
      libc::munmap((aligned + size) as *mut libc::c_void, back_slack);
    }

    Some(aligned as *mut u8)
  }
}

pub fn free(ptr: *mut u8, size: usize) {
  unsafe {
    libc::munmap(ptr as *mut libc::c_void, size);
  }
}

pub fn commit(ptr: *mut u8, size: usize) -> Result<()> {
  let ret = unsafe { libc::mprotect(ptr as *mut libc::c_void, size, native_prot(Protection::READ_WRITE)) };
  system_result(ret)
}

/// Unmaps the range and re-maps it `PROT_NONE`, returning the physical
/// pages to the OS while keeping the virtual reservation intact.
pub fn decommit(ptr: *mut u8, size: usize) -> Result<()> {
  let flags = libc::MAP_PRIVATE | libc::MAP_ANON | libc::MAP_FIXED;
  let ret = unsafe {
    libc::mmap(ptr as *mut libc::c_void, size, libc::PROT_NONE, flags, -1, 0)
  };

  if ret == libc::MAP_FAILED {
    Err(Error::SystemCall(errno::errno()))
  } else {
    Ok(())
  }
}

pub fn reset(ptr: *mut u8, size: usize) -> Result<()> {
  let ret = unsafe { libc::madvise(ptr as *mut libc::c_void, size, reset_advice()) };
  system_result(ret)
}

/// POSIX has no direct inverse of `madvise(MADV_FREE)`; touching the pages
/// again on next write is sufficient to bring them back, so this is a no-op.
pub fn unreset(_ptr: *mut u8, _size: usize) -> Result<()> {
  Ok(())
}

pub fn protect(ptr: *mut u8, size: usize, protection: Protection) -> Result<()> {
  let ret = unsafe { libc::mprotect(ptr as *mut libc::c_void, size, native_prot(protection)) };
  system_result(ret)
}

pub fn unprotect(ptr: *mut u8, size: usize, protection: Protection) -> Result<()> {
  protect(ptr, size, protection)
}

pub fn page_size() -> usize {
  static PAGE_SIZE: OnceLock<usize> = OnceLock::new();
  *PAGE_SIZE.get_or_init(|| unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize })
}

/// Generic fallback for unix targets without a known large-page size:
/// commit sizes simply round to the regular page size.
pub fn large_page_size() -> usize {
  page_size()
}

fn native_prot(protection: Protection) -> libc::c_int {
  let mut native = libc::PROT_NONE;

  if protection.contains(Protection::READ) {
    native |= libc::PROT_READ;
  }
  if protection.contains(Protection::WRITE) {
    native |= libc::PROT_WRITE;
  }
  if protection.contains(Protection::EXECUTE) {
    native |= libc::PROT_EXEC;
  }

  native
}

#[cfg(target_os = "linux")]
fn reset_advice() -> libc::c_int {
  libc::MADV_FREE
}

#[cfg(not(target_os = "linux"))]
fn reset_advice() -> libc::c_int {
  libc::MADV_DONTNEED
}

fn system_result(ret: libc::c_int) -> Result<()> {
  if ret == 0 {
    Ok(())
  } else {
    Err(Error::SystemCall(errno::errno()))
  }
}
