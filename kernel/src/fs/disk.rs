//! In-memory disk image
//!
//! Holds the persistent side of the file system: the inode table and the
//! per-inode data bytes. Everything the in-core layer wants to survive a
//! process goes through `write_inode`/`write_at` explicitly; nothing is
//! persisted as a side effect of mutating in-core state.

use alloc::vec::Vec;

use hashbrown::HashMap;

use super::inode::FileMode;

/// On-disk inode number
pub type Ino = u32;

/// Inode number of the root directory
pub const ROOT_INO: Ino = 1;

/// Per-file data cap; writes past this come up short
pub const FILE_MAX_BYTES: usize = 1 << 20;

/// Persisted inode metadata
#[derive(Debug, Clone, Copy)]
pub struct DiskInode {
    pub mode: FileMode,
    pub nlinks: u16,
    pub size: u32,
}

/// The backing image: inode table plus data bytes, keyed by inode number
pub struct Disk {
    inodes: HashMap<Ino, DiskInode>,
    data: HashMap<Ino, Vec<u8>>,
    next_ino: Ino,
}

impl Disk {
    pub fn new() -> Self {
        Self {
            inodes: HashMap::new(),
            data: HashMap::new(),
            next_ino: ROOT_INO,
        }
    }

    /// Allocate a fresh inode with no links and no data
    pub fn alloc_inode(&mut self, mode: FileMode) -> Ino {
        let ino = self.next_ino;
        self.next_ino += 1;
        self.inodes.insert(ino, DiskInode { mode, nlinks: 0, size: 0 });
        ino
    }

    /// Drop an inode and its data from the image
    pub fn free_inode(&mut self, ino: Ino) {
        self.inodes.remove(&ino);
        self.data.remove(&ino);
    }

    pub fn read_inode(&self, ino: Ino) -> Option<DiskInode> {
        self.inodes.get(&ino).copied()
    }

    /// Persist inode metadata (the `iupdate` primitive)
    pub fn write_inode(&mut self, ino: Ino, di: DiskInode) {
        self.inodes.insert(ino, di);
    }

    /// Read up to `buf.len()` bytes at `off`; returns the count actually read
    pub fn read_at(&self, ino: Ino, off: usize, buf: &mut [u8]) -> usize {
        let Some(data) = self.data.get(&ino) else {
            return 0;
        };
        if off >= data.len() {
            return 0;
        }
        let n = core::cmp::min(buf.len(), data.len() - off);
        buf[..n].copy_from_slice(&data[off..off + n]);
        n
    }

    /// Write `buf` at `off`, zero-filling any gap; returns the count actually
    /// written, which is short of `buf.len()` when the write runs into the
    /// per-file cap.
    pub fn write_at(&mut self, ino: Ino, off: usize, buf: &[u8]) -> usize {
        if !self.inodes.contains_key(&ino) || off >= FILE_MAX_BYTES {
            return 0;
        }
        let n = core::cmp::min(buf.len(), FILE_MAX_BYTES - off);
        let data = self.data.entry(ino).or_default();
        if data.len() < off + n {
            data.resize(off + n, 0);
        }
        data[off..off + n].copy_from_slice(&buf[..n]);
        n
    }
}

impl Default for Disk {
    fn default() -> Self {
        Self::new()
    }
}
