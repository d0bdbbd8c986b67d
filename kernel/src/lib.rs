//! krill-os kernel file layer
//!
//! Per-process file descriptor tables, shared open-file objects and the
//! inode link/unlink transaction core, backed by an in-memory disk image.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod fs;
pub mod process;
pub mod syscalls;
