//! File system core
//!
//! Leaves first: the disk image, inode cells and their locks, directory
//! entries, path resolution, then the open-file layer on top.

pub mod dir;
pub mod disk;
pub mod file;
pub mod inode;
pub mod path;

pub use disk::{Disk, DiskInode, Ino, ROOT_INO};
pub use file::{FdTable, File, OpenFlags, NOFILE};
pub use inode::{FileMode, FileSystem, Inode, InodeCell, Stat, lock_pair, STAT_SIZE};

/// File system error types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    NotFound,
    NotDirectory,
    IsDirectory,
    NotEmpty,
    Exists,
    NameTooLong,
    InvalidArgument,
    BadDescriptor,
    TooManyFiles,
    BadAddress,
    PermissionDenied,
    NoSpace,
}

pub type FsResult<T> = Result<T, FsError>;
