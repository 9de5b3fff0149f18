//! Mapping lock names onto the kernel's numeric IPC namespace.
//!
//! The identifier is the CRC-32 (IEEE) of the key bytes, so any process
//! that knows the name finds the same semaphore. It is a 32-bit checksum:
//! distinct names can and do collide, and colliding names share one lock.

use std::fmt;

use crc32fast;
use libc;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identifier(u32);

impl Identifier {
    pub fn from_key(key: &str) -> Identifier {
        Identifier(crc32fast::hash(key.as_bytes()))
    }

    pub fn value(self) -> u32 {
        self.0
    }

    /// `IPC_PRIVATE` always creates a fresh set, so it can't name a shared one.
    pub fn is_private(self) -> bool {
        self.ipc_key() == libc::IPC_PRIVATE
    }

    /// The checksum reinterpreted as a `key_t`; high values wrap negative.
    pub fn ipc_key(self) -> libc::key_t {
        self.0 as libc::key_t
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}
