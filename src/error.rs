//! Error types for the OS-adapter boundary.
//!
//! The arena's own allocation surface is infallible by convention (§7 of the
//! design: null return, silent no-op free); these errors only ever surface
//! internally, where the reservation engine converts a genuine OS failure
//! into a rollback-and-report-OOM.

use failure::Fail;

/// The result type used at the OS-adapter boundary.
pub type Result<T> = ::std::result::Result<T, Error>;

/// A collection of possible OS-adapter failures.
#[derive(Debug, Fail)]
pub enum Error {
  /// The supplied address is null.
  #[fail(display = "address must not be null")]
  NullAddress,
  /// The supplied size is zero.
  #[fail(display = "size must not be zero")]
  EmptyRange,
  /// A system call failed.
  #[fail(display = "system call failed with: {}", _0)]
  SystemCall(::errno::Errno),
  /// The OS adapter could not satisfy a reservation or commit request.
  #[fail(display = "out of memory")]
  OutOfMemory,
}
