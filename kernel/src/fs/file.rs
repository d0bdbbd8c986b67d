//! Open-file objects and the per-process descriptor table

use alloc::sync::Arc;
use core::sync::atomic::{AtomicI32, Ordering};

use bitflags::bitflags;
use spin::Mutex;

use super::{
    inode::{FileSystem, InodeCell, Stat},
    FsError, FsResult,
};

/// Maximum open files per process
pub const NOFILE: usize = 16;

bitflags! {
    /// Open flags; absence of `WRONLY`/`RDWR` means read-only.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OpenFlags: u32 {
        const WRONLY = 1 << 0;
        const RDWR   = 1 << 1;
        const CREATE = 1 << 9;
    }
}

impl OpenFlags {
    pub fn readable(self) -> bool {
        !self.contains(Self::WRONLY) || self.contains(Self::RDWR)
    }

    pub fn writable(self) -> bool {
        self.intersects(Self::WRONLY | Self::RDWR)
    }
}

/// A shared open-file object: one inode reference plus a cursor, handed out
/// to as many descriptors as it has been duplicated into.
///
/// `refs` counts descriptors, not memory; the object is released (and its
/// inode reference dropped) exactly when the count reaches zero on close.
/// The counter is atomic so descriptor operations on the same object cannot
/// race it.
pub struct File {
    inode: Arc<InodeCell>,
    readable: bool,
    writable: bool,
    refs: AtomicI32,
    offset: Mutex<usize>,
}

impl File {
    /// External open path: wrap an inode with a fresh cursor, one reference.
    pub fn open(inode: Arc<InodeCell>, readable: bool, writable: bool) -> Arc<Self> {
        Arc::new(Self {
            inode,
            readable,
            writable,
            refs: AtomicI32::new(1),
            offset: Mutex::new(0),
        })
    }

    pub fn inode(&self) -> &Arc<InodeCell> {
        &self.inode
    }

    /// Current descriptor reference count.
    pub fn refs(&self) -> i32 {
        self.refs.load(Ordering::Acquire)
    }

    /// Counted increment; pairs with one future `close`.
    pub fn add_ref(&self) {
        self.refs.fetch_add(1, Ordering::Relaxed);
    }

    /// Drop one descriptor reference. The caller must already have emptied
    /// its table slot. On the last reference the inode reference is released
    /// through the file system, which may reclaim an unlinked inode.
    pub fn close(self: Arc<Self>, fs: &FileSystem) {
        if self.refs.fetch_sub(1, Ordering::AcqRel) == 1 {
            let inode = Arc::clone(&self.inode);
            drop(self);
            fs.put(inode);
        }
    }

    /// Bounded read at the shared cursor; advances by the count transferred.
    pub fn read(&self, fs: &FileSystem, buf: &mut [u8]) -> FsResult<usize> {
        if !self.readable {
            return Err(FsError::PermissionDenied);
        }
        let mut off = self.offset.lock();
        let ip = self.inode.lock();
        let size = ip.size as usize;
        let n = if *off >= size {
            0
        } else {
            let want = core::cmp::min(buf.len(), size - *off);
            fs.read_at(ip.ino, *off, &mut buf[..want])
        };
        drop(ip);
        *off += n;
        Ok(n)
    }

    /// Bounded write at the shared cursor; advances by the count transferred
    /// and persists the new size when the file grew.
    pub fn write(&self, fs: &FileSystem, buf: &[u8]) -> FsResult<usize> {
        if !self.writable {
            return Err(FsError::PermissionDenied);
        }
        let mut off = self.offset.lock();
        let mut ip = self.inode.lock();
        let n = fs.write_at(ip.ino, *off, buf);
        if *off + n > ip.size as usize {
            ip.size = (*off + n) as u32;
            fs.update(&ip);
        }
        drop(ip);
        *off += n;
        Ok(n)
    }

    /// Snapshot of the associated inode's metadata.
    pub fn stat(&self) -> Stat {
        let ip = self.inode.lock();
        Stat { ino: ip.ino, mode: ip.mode, nlinks: ip.nlinks, size: ip.size }
    }
}

/// Per-process descriptor table: a fixed array of optional references to
/// open-file objects, owned by exactly one process and only ever reached
/// through these three operations.
pub struct FdTable {
    slots: [Option<Arc<File>>; NOFILE],
}

impl FdTable {
    pub fn new() -> Self {
        Self { slots: core::array::from_fn(|_| None) }
    }

    /// Bind `file` into the lowest-numbered empty slot.
    pub fn alloc(&mut self, file: &Arc<File>) -> FsResult<usize> {
        for (fd, slot) in self.slots.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(Arc::clone(file));
                return Ok(fd);
            }
        }
        Err(FsError::TooManyFiles)
    }

    pub fn get(&self, fd: usize) -> FsResult<&Arc<File>> {
        self.slots
            .get(fd)
            .and_then(|slot| slot.as_ref())
            .ok_or(FsError::BadDescriptor)
    }

    /// Empty the slot, handing the reference back to the caller. Descriptor
    /// numbers freed here are immediately reusable.
    pub fn take(&mut self, fd: usize) -> FsResult<Arc<File>> {
        self.slots
            .get_mut(fd)
            .and_then(|slot| slot.take())
            .ok_or(FsError::BadDescriptor)
    }
}

impl Default for FdTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::inode::FileMode;
    use crate::fs::ROOT_INO;

    fn open_on_root(fs: &FileSystem) -> Arc<File> {
        File::open(fs.iget(ROOT_INO).unwrap(), true, false)
    }

    #[test]
    fn alloc_lowest_and_reuse_after_take() {
        let fs = FileSystem::new();
        let f = open_on_root(&fs);
        let mut fds = FdTable::new();
        assert_eq!(fds.alloc(&f).unwrap(), 0);
        assert_eq!(fds.alloc(&f).unwrap(), 1);
        assert_eq!(fds.alloc(&f).unwrap(), 2);
        fds.take(1).unwrap();
        assert_eq!(fds.alloc(&f).unwrap(), 1);
    }

    #[test]
    fn table_full() {
        let fs = FileSystem::new();
        let f = open_on_root(&fs);
        let mut fds = FdTable::new();
        for fd in 0..NOFILE {
            assert_eq!(fds.alloc(&f).unwrap(), fd);
        }
        assert_eq!(fds.alloc(&f), Err(FsError::TooManyFiles));
    }

    #[test]
    fn get_and_take_reject_bad_fds() {
        let mut fds = FdTable::new();
        assert_eq!(fds.get(0).err(), Some(FsError::BadDescriptor));
        assert_eq!(fds.take(NOFILE + 3).err(), Some(FsError::BadDescriptor));
    }

    #[test]
    fn open_flags_access() {
        assert!(OpenFlags::empty().readable());
        assert!(!OpenFlags::empty().writable());
        assert!(!OpenFlags::WRONLY.readable());
        assert!(OpenFlags::WRONLY.writable());
        assert!(OpenFlags::RDWR.readable() && OpenFlags::RDWR.writable());
    }

    #[test]
    fn dup_shares_one_cursor() {
        let fs = FileSystem::new();
        let cell = fs.alloc(FileMode::new(FileMode::S_IFREG | 0o644));
        {
            let mut g = cell.lock();
            g.nlinks = 1;
            fs.update(&g);
        }
        let a = File::open(Arc::clone(&cell), true, true);
        a.write(&fs, b"abcdef").unwrap();
        // cursor sits at 6; a fresh handle has its own cursor
        let b = File::open(cell, true, true);
        let mut buf = [0u8; 3];
        assert_eq!(b.read(&fs, &mut buf).unwrap(), 3);
        assert_eq!(&buf, b"abc");
        a.add_ref();
        let dup = Arc::clone(&a);
        assert_eq!(dup.refs(), 2);
        // the duplicate continues where the original left off
        assert_eq!(dup.read(&fs, &mut buf).unwrap(), 0);
    }
}
