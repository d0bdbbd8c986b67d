//! In-core inodes and the inode lock/link-count manager
//!
//! Every inode is represented at most once in core, as an `InodeCell` whose
//! mutex guards the mutable metadata (mode, nlinks, size). Mutations are
//! persisted explicitly through [`FileSystem::update`] while the lock is
//! still held; nothing writes back on unlock.

use alloc::sync::Arc;

use hashbrown::HashMap;
use spin::{Mutex, MutexGuard};

use super::{
    dir,
    disk::{Disk, DiskInode, Ino, ROOT_INO},
    FsError, FsResult,
};

/// File mode and permission bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileMode(pub u32);

impl FileMode {
    pub const S_IFMT: u32 = 0o170000; // Type mask
    pub const S_IFREG: u32 = 0o100000; // Regular file
    pub const S_IFDIR: u32 = 0o040000; // Directory

    pub fn new(mode: u32) -> Self {
        Self(mode)
    }

    pub fn is_dir(&self) -> bool {
        self.0 & Self::S_IFMT == Self::S_IFDIR
    }

    pub fn is_regular(&self) -> bool {
        self.0 & Self::S_IFMT == Self::S_IFREG
    }

    pub fn permissions(&self) -> u32 {
        self.0 & 0o777
    }
}

/// In-core copy of an inode's mutable metadata
#[derive(Debug, Clone, Copy)]
pub struct Inode {
    pub ino: Ino,
    pub mode: FileMode,
    pub nlinks: u16,
    pub size: u32,
}

/// One in-core inode: number plus the lock guarding its metadata.
///
/// The lock must be held for the whole span of any multi-step transaction
/// touching the inode; this is what makes link/unlink appear atomic to
/// other processes.
pub struct InodeCell {
    ino: Ino,
    inner: Mutex<Inode>,
}

impl InodeCell {
    fn new(inode: Inode) -> Self {
        Self { ino: inode.ino, inner: Mutex::new(inode) }
    }

    pub fn ino(&self) -> Ino {
        self.ino
    }

    pub fn lock(&self) -> MutexGuard<'_, Inode> {
        self.inner.lock()
    }
}

/// Acquire two distinct inode locks in the canonical order (by inode
/// number), whichever way the caller discovered them. Returns the guards in
/// argument order.
pub fn lock_pair<'a>(
    a: &'a InodeCell,
    b: &'a InodeCell,
) -> (MutexGuard<'a, Inode>, MutexGuard<'a, Inode>) {
    debug_assert_ne!(a.ino(), b.ino());
    if a.ino() < b.ino() {
        let ga = a.lock();
        let gb = b.lock();
        (ga, gb)
    } else {
        let gb = b.lock();
        let ga = a.lock();
        (ga, gb)
    }
}

/// The in-core file system: disk image plus the cache of inode cells
pub struct FileSystem {
    disk: Mutex<Disk>,
    cache: Mutex<HashMap<Ino, Arc<InodeCell>>>,
}

impl FileSystem {
    /// Build a fresh image holding only the root directory.
    pub fn new() -> Self {
        let mut disk = Disk::new();
        let mode = FileMode::new(FileMode::S_IFDIR | 0o755);
        let root = disk.alloc_inode(mode);
        debug_assert_eq!(root, ROOT_INO);
        let records = dir::init_records(root, root);
        disk.write_at(root, 0, &records);
        disk.write_inode(
            root,
            DiskInode { mode, nlinks: 2, size: records.len() as u32 },
        );
        Self { disk: Mutex::new(disk), cache: Mutex::new(HashMap::new()) }
    }

    /// Fetch the in-core cell for `ino`, loading it from disk on a miss.
    pub fn iget(&self, ino: Ino) -> FsResult<Arc<InodeCell>> {
        let mut cache = self.cache.lock();
        if let Some(cell) = cache.get(&ino) {
            return Ok(Arc::clone(cell));
        }
        let di = self.disk.lock().read_inode(ino).ok_or(FsError::NotFound)?;
        let cell = Arc::new(InodeCell::new(Inode {
            ino,
            mode: di.mode,
            nlinks: di.nlinks,
            size: di.size,
        }));
        cache.insert(ino, Arc::clone(&cell));
        Ok(cell)
    }

    /// External create path: allocate an inode with no links yet.
    pub fn alloc(&self, mode: FileMode) -> Arc<InodeCell> {
        let mut cache = self.cache.lock();
        let ino = self.disk.lock().alloc_inode(mode);
        let cell = Arc::new(InodeCell::new(Inode { ino, mode, nlinks: 0, size: 0 }));
        cache.insert(ino, Arc::clone(&cell));
        cell
    }

    /// Persist an inode's metadata. Call after each mutation, with the
    /// inode lock held.
    pub fn update(&self, ip: &Inode) {
        self.disk.lock().write_inode(
            ip.ino,
            DiskInode { mode: ip.mode, nlinks: ip.nlinks, size: ip.size },
        );
    }

    /// Release a reference to an in-core inode. When nothing else holds the
    /// cell and the persisted link count is zero, the inode is reclaimed
    /// from the image.
    pub fn put(&self, cell: Arc<InodeCell>) {
        let ino = cell.ino();
        drop(cell);
        let mut cache = self.cache.lock();
        let reclaim = match cache.get(&ino) {
            Some(entry) if Arc::strong_count(entry) == 1 => self
                .disk
                .lock()
                .read_inode(ino)
                .is_some_and(|di| di.nlinks == 0),
            _ => false,
        };
        if reclaim {
            cache.remove(&ino);
            self.disk.lock().free_inode(ino);
            log::debug!("fs: reclaimed inode {}", ino);
        }
    }

    /// Bounded data read at a byte offset; count actually read.
    pub fn read_at(&self, ino: Ino, off: usize, buf: &mut [u8]) -> usize {
        self.disk.lock().read_at(ino, off, buf)
    }

    /// Bounded data write at a byte offset; count actually written.
    pub fn write_at(&self, ino: Ino, off: usize, buf: &[u8]) -> usize {
        self.disk.lock().write_at(ino, off, buf)
    }

    /// Write the `.`/`..` records of a fresh, not yet published directory.
    pub(crate) fn init_dir_data(&self, ino: Ino, parent: Ino) {
        let records = dir::init_records(ino, parent);
        self.disk.lock().write_at(ino, 0, &records);
    }

    /// Peek at the persisted metadata for `ino`, if it is still allocated.
    pub fn disk_inode(&self, ino: Ino) -> Option<DiskInode> {
        self.disk.lock().read_inode(ino)
    }
}

impl Default for FileSystem {
    fn default() -> Self {
        Self::new()
    }
}

/// Inode metadata as copied out by fstat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    pub ino: Ino,
    pub mode: FileMode,
    pub nlinks: u16,
    pub size: u32,
}

/// Byte size of the encoded stat record
pub const STAT_SIZE: usize = 16;

impl Stat {
    /// Fixed little-endian layout: ino, mode, nlinks, pad, size.
    pub fn encode(&self) -> [u8; STAT_SIZE] {
        let mut raw = [0u8; STAT_SIZE];
        raw[0..4].copy_from_slice(&self.ino.to_le_bytes());
        raw[4..8].copy_from_slice(&self.mode.0.to_le_bytes());
        raw[8..10].copy_from_slice(&self.nlinks.to_le_bytes());
        raw[12..16].copy_from_slice(&self.size.to_le_bytes());
        raw
    }

    pub fn decode(raw: &[u8; STAT_SIZE]) -> Self {
        Self {
            ino: u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]),
            mode: FileMode(u32::from_le_bytes([raw[4], raw[5], raw[6], raw[7]])),
            nlinks: u16::from_le_bytes([raw[8], raw[9]]),
            size: u32::from_le_bytes([raw[12], raw[13], raw[14], raw[15]]),
        }
    }
}
