//! Process view of the file layer
//!
//! One `Process` owns a descriptor table, a working directory and a flat
//! user address space. The `SyscallFrame` fetchers are the argument
//! marshaling collaborators: every pointer and string is validated against
//! the caller's address space before a handler touches it.

use alloc::vec;
use alloc::vec::Vec;

use crate::fs::{FdTable, FsError, FsResult, Ino, ROOT_INO};

/// Caller address space stand-in: a flat, fully mapped byte range.
pub struct UserMem {
    bytes: Vec<u8>,
}

impl UserMem {
    pub fn new(size: usize) -> Self {
        Self { bytes: vec![0; size] }
    }

    /// Fail unless `[addr, addr + len)` is backed.
    pub fn check(&self, addr: usize, len: usize) -> FsResult<()> {
        let end = addr.checked_add(len).ok_or(FsError::BadAddress)?;
        if end > self.bytes.len() {
            return Err(FsError::BadAddress);
        }
        Ok(())
    }

    pub fn read(&self, addr: usize, len: usize) -> FsResult<&[u8]> {
        self.check(addr, len)?;
        Ok(&self.bytes[addr..addr + len])
    }

    pub fn write(&mut self, addr: usize, data: &[u8]) -> FsResult<()> {
        self.check(addr, data.len())?;
        self.bytes[addr..addr + data.len()].copy_from_slice(data);
        Ok(())
    }

    /// Fetch a NUL-terminated string; the terminator must lie inside the
    /// backed range.
    pub fn read_str(&self, addr: usize) -> FsResult<&str> {
        if addr >= self.bytes.len() {
            return Err(FsError::BadAddress);
        }
        let rest = &self.bytes[addr..];
        let nul = rest.iter().position(|&b| b == 0).ok_or(FsError::BadAddress)?;
        core::str::from_utf8(&rest[..nul]).map_err(|_| FsError::InvalidArgument)
    }

    /// Place a NUL-terminated string, for callers staging syscall arguments.
    pub fn write_str(&mut self, addr: usize, s: &str) -> FsResult<()> {
        self.check(addr, s.len() + 1)?;
        self.bytes[addr..addr + s.len()].copy_from_slice(s.as_bytes());
        self.bytes[addr + s.len()] = 0;
        Ok(())
    }
}

/// Raw syscall argument frame
#[derive(Debug, Clone, Copy, Default)]
pub struct SyscallFrame {
    args: [usize; 6],
}

impl SyscallFrame {
    pub fn new(args: [usize; 6]) -> Self {
        Self { args }
    }

    /// Fetch-integer: raw argument word.
    pub fn arg(&self, n: usize) -> usize {
        self.args[n]
    }

    /// Fetch-validated-pointer: argument `n` as an address with `len`
    /// usable bytes behind it.
    pub fn arg_ptr(&self, n: usize, len: usize, mem: &UserMem) -> FsResult<usize> {
        let addr = self.args[n];
        mem.check(addr, len)?;
        Ok(addr)
    }

    /// Fetch-validated-string: argument `n` as a NUL-terminated string.
    pub fn arg_str<'m>(&self, n: usize, mem: &'m UserMem) -> FsResult<&'m str> {
        mem.read_str(self.args[n])
    }
}

/// One process: descriptor table, working directory, address space.
pub struct Process {
    pub fds: FdTable,
    pub cwd: Ino,
    pub mem: UserMem,
}

impl Process {
    pub fn new(mem_size: usize) -> Self {
        Self { fds: FdTable::new(), cwd: ROOT_INO, mem: UserMem::new(mem_size) }
    }
}
