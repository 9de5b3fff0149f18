//! Locks shared between processes, named by strings, backed by System V
//! semaphores.
//!
//! ```no_run
//! # extern crate semlock;
//! # fn main() -> Result<(), semlock::LockError> {
//! let mut lock = semlock::SemLock::new("nightly-report")?;
//! if lock.acquire()? {
//!     // only one process on this host gets here at a time
//!     lock.release()?;
//! }
//! # Ok(())
//! # }
//! ```

#[cfg(not(unix))]
compile_error!("semlock needs System V semaphores");

extern crate cast;
extern crate crc32fast;
#[macro_use]
extern crate failure;
extern crate libc;
#[macro_use]
extern crate log;

mod error;
mod ident;
mod lock;
mod semaphore;

pub use error::LockError;
pub use error::Result;
pub use ident::Identifier;
pub use lock::Builder;
pub use lock::SemLock;
