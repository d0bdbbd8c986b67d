//! System call surface
//!
//! Uniform return convention: a non-negative result is success, `E_FAIL`
//! is failure. No distinct error code crosses this boundary; the richer
//! internal [`FsError`](crate::fs::FsError) is logged and collapsed.

pub mod fs;

use crate::fs::FsResult;

pub const E_OK: isize = 0;
pub const E_FAIL: isize = -1;

/// Collapse an internal result onto the syscall convention.
pub(crate) fn ret(name: &str, res: FsResult<usize>) -> isize {
    match res {
        Ok(n) => n as isize,
        Err(err) => {
            log::debug!("{}: failed: {:?}", name, err);
            E_FAIL
        }
    }
}
