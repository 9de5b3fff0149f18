use std::io;
use std::result;

use libc;

pub type Result<T> = result::Result<T, LockError>;

#[derive(Debug, Fail)]
pub enum LockError {
    #[fail(display = "invalid parameter: {}", _0)]
    InvalidParameter(String),

    #[fail(display = "semaphore {} failed: {}", op, cause)]
    Resource {
        op: &'static str,
        #[cause]
        cause: io::Error,
    },
}

impl LockError {
    pub(crate) fn resource(op: &'static str, cause: io::Error) -> LockError {
        LockError::Resource { op, cause }
    }

    /// There's no live kernel object behind this handle any more.
    pub(crate) fn removed(op: &'static str) -> LockError {
        LockError::resource(op, io::Error::from_raw_os_error(libc::EIDRM))
    }

    pub fn is_invalid_parameter(&self) -> bool {
        match *self {
            LockError::InvalidParameter(_) => true,
            _ => false,
        }
    }

    pub fn is_resource(&self) -> bool {
        match *self {
            LockError::Resource { .. } => true,
            _ => false,
        }
    }
}
