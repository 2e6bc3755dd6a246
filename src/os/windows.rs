//! Windows backend: `VirtualAlloc`/`VirtualFree`/`VirtualProtect`.

use std::ptr;
use std::sync::OnceLock;

use winapi::shared::basetsd::SIZE_T;
use winapi::shared::minwindef::{DWORD, LPVOID};
use winapi::um::errhandlingapi::GetLastError;
use winapi::um::memoryapi::{VirtualAlloc, VirtualFree, VirtualProtect};
use winapi::um::sysinfoapi::{GetLargePageMinimum, GetSystemInfo, SYSTEM_INFO};
use winapi::um::winnt::{
  MEM_COMMIT, MEM_DECOMMIT, MEM_RELEASE, MEM_RESERVE, MEM_RESET, MEM_RESET_UNDO, PAGE_EXECUTE,
  PAGE_EXECUTE_READ, PAGE_EXECUTE_READWRITE, PAGE_NOACCESS, PAGE_READONLY, PAGE_READWRITE,
};

use crate::error::Error;
use crate::{Protection, Result};

/// Reserves `size` bytes aligned to `align`. `VirtualAlloc` only guarantees
/// allocation-granularity alignment (64 KiB), so coarser alignments are
/// obtained with the standard over-reserve / free / re-reserve-at-aligned
/// retry: Windows has no atomic "reserve at an aligned address" call, so the
/// address returned by the first (unaligned) reservation is freed and
/// immediately re-requested at its rounded-up address. This has a narrow
/// race window against other threads claiming that address first; a failed
/// retry simply surfaces as `None`, and the caller treats that identically
/// to any other reservation failure.
pub fn alloc_aligned(size: usize, align: usize, commit: bool) -> Option<*mut u8> {
  let alloc_type = if commit {
    MEM_RESERVE | MEM_COMMIT
  } else {
    MEM_RESERVE
  };
  let prot = native_prot(if commit {
    Protection::READ_WRITE
  } else {
    Protection::NONE
  });

  unsafe {
    let probe = VirtualAlloc(ptr::null_mut(), size as SIZE_T, alloc_type, prot);
    if probe.is_null() {
      return None;
    }

    if align <= page_size() {
      return Some(probe as *mut u8);
    }

    VirtualFree(probe, 0, MEM_RELEASE);

    let base = probe as usize;
    let aligned = (base + align - 1) & !(align - 1);
    let p = VirtualAlloc(aligned as LPVOID, size as SIZE_T, alloc_type, prot);

    if p.is_null() {
      None
    } else {
      Some(p as *mut u8)
    }
  }
}

pub fn free(ptr: *mut u8, _size: usize) {
  unsafe {
    VirtualFree(ptr as LPVOID, 0, MEM_RELEASE);
  }
}

pub fn commit(ptr: *mut u8, size: usize) -> Result<()> {
  let result = unsafe {
    VirtualAlloc(
      ptr as LPVOID,
      size as SIZE_T,
      MEM_COMMIT,
      native_prot(Protection::READ_WRITE),
    )
  };
  bool_result(!result.is_null())
}

pub fn decommit(ptr: *mut u8, size: usize) -> Result<()> {
  let result = unsafe { VirtualFree(ptr as LPVOID, size as SIZE_T, MEM_DECOMMIT) };
  bool_result(result != 0)
}

pub fn reset(ptr: *mut u8, size: usize) -> Result<()> {
  let result = unsafe {
    VirtualAlloc(
      ptr as LPVOID,
      size as SIZE_T,
      MEM_RESET,
      native_prot(Protection::READ_WRITE),
    )
  };
  bool_result(!result.is_null())
}

pub fn unreset(ptr: *mut u8, size: usize) -> Result<()> {
  let result = unsafe {
    VirtualAlloc(
      ptr as LPVOID,
      size as SIZE_T,
      MEM_RESET_UNDO,
      native_prot(Protection::READ_WRITE),
    )
  };
  bool_result(!result.is_null())
}

pub fn protect(ptr: *mut u8, size: usize, protection: Protection) -> Result<()> {
  let mut previous: DWORD = 0;
  let result =
    unsafe { VirtualProtect(ptr as LPVOID, size as SIZE_T, native_prot(protection), &mut previous) };
  bool_result(result != 0)
}

pub fn unprotect(ptr: *mut u8, size: usize, protection: Protection) -> Result<()> {
  protect(ptr, size, protection)
}

pub fn page_size() -> usize {
  static PAGE_SIZE: OnceLock<usize> = OnceLock::new();
  *PAGE_SIZE.get_or_init(|| unsafe {
    let mut info: SYSTEM_INFO = std::mem::zeroed();
    GetSystemInfo(&mut info);
    info.dwPageSize as usize
  })
}

pub fn large_page_size() -> usize {
  static LARGE_PAGE_SIZE: OnceLock<usize> = OnceLock::new();
  *LARGE_PAGE_SIZE.get_or_init(|| {
    let min = unsafe { GetLargePageMinimum() } as usize;
    if min == 0 {
      page_size()
    } else {
      min
    }
  })
}

fn native_prot(protection: Protection) -> DWORD {
  if protection.contains(Protection::READ_WRITE_EXECUTE) {
    PAGE_EXECUTE_READWRITE
  } else if protection.contains(Protection::READ_EXECUTE) {
    PAGE_EXECUTE_READ
  } else if protection.contains(Protection::EXECUTE) {
    PAGE_EXECUTE
  } else if protection.contains(Protection::READ_WRITE) {
    PAGE_READWRITE
  } else if protection.contains(Protection::READ) {
    PAGE_READONLY
  } else {
    PAGE_NOACCESS
  }
}

fn bool_result(ok: bool) -> Result<()> {
  if ok {
    Ok(())
  } else {
    let code = unsafe { GetLastError() };
    Err(Error::SystemCall(errno::Errno(code as i32)))
  }
}
