//! Directory entries
//!
//! A directory's data is a flat array of fixed 32-byte records: a
//! little-endian inode number followed by a NUL-padded name. A zeroed inode
//! number marks a free slot. All mutators here run under the parent inode's
//! lock, held by the caller.

use static_assertions::const_assert_eq;

use super::{
    disk::Ino,
    inode::{FileSystem, Inode},
    FsError, FsResult,
};

/// Longest entry name, in bytes
pub const NAME_MAX: usize = 28;

/// On-disk size of one directory entry
pub const DIRENT_SIZE: usize = 32;

const_assert_eq!(DIRENT_SIZE, 4 + NAME_MAX);

/// Encode one entry record; rejects empty and over-long names.
pub fn encode(ino: Ino, name: &str) -> FsResult<[u8; DIRENT_SIZE]> {
    let bytes = name.as_bytes();
    if bytes.is_empty() {
        return Err(FsError::InvalidArgument);
    }
    if bytes.len() > NAME_MAX {
        return Err(FsError::NameTooLong);
    }
    let mut rec = [0u8; DIRENT_SIZE];
    rec[..4].copy_from_slice(&ino.to_le_bytes());
    rec[4..4 + bytes.len()].copy_from_slice(bytes);
    Ok(rec)
}

fn entry_ino(rec: &[u8; DIRENT_SIZE]) -> Ino {
    u32::from_le_bytes([rec[0], rec[1], rec[2], rec[3]])
}

fn entry_name(rec: &[u8; DIRENT_SIZE]) -> &[u8] {
    let mut end = 4;
    while end < DIRENT_SIZE && rec[end] != 0 {
        end += 1;
    }
    &rec[4..end]
}

/// The initial `.` and `..` records of a fresh directory.
pub(crate) fn init_records(dir: Ino, parent: Ino) -> [u8; 2 * DIRENT_SIZE] {
    let mut buf = [0u8; 2 * DIRENT_SIZE];
    buf[..4].copy_from_slice(&dir.to_le_bytes());
    buf[4] = b'.';
    buf[DIRENT_SIZE..DIRENT_SIZE + 4].copy_from_slice(&parent.to_le_bytes());
    buf[DIRENT_SIZE + 4] = b'.';
    buf[DIRENT_SIZE + 5] = b'.';
    buf
}

/// Look `name` up in `dir`; returns the bound inode number and the byte
/// offset of the entry inside the directory data.
pub fn lookup(fs: &FileSystem, dir: &Inode, name: &str) -> Option<(Ino, u32)> {
    let mut rec = [0u8; DIRENT_SIZE];
    let mut off = 0u32;
    while off < dir.size {
        let n = fs.read_at(dir.ino, off as usize, &mut rec);
        debug_assert_eq!(n, DIRENT_SIZE);
        let ino = entry_ino(&rec);
        if ino != 0 && entry_name(&rec) == name.as_bytes() {
            return Some((ino, off));
        }
        off += DIRENT_SIZE as u32;
    }
    None
}

/// Bind `name` to `ino` inside `dir`, reusing a free slot when one exists.
/// Fails on a name collision or when the directory cannot grow.
pub fn link(fs: &FileSystem, dir: &mut Inode, name: &str, ino: Ino) -> FsResult<()> {
    let rec = encode(ino, name)?;
    let mut cur = [0u8; DIRENT_SIZE];
    let mut free: Option<u32> = None;
    let mut off = 0u32;
    while off < dir.size {
        let n = fs.read_at(dir.ino, off as usize, &mut cur);
        debug_assert_eq!(n, DIRENT_SIZE);
        if entry_ino(&cur) == 0 {
            if free.is_none() {
                free = Some(off);
            }
        } else if entry_name(&cur) == name.as_bytes() {
            return Err(FsError::Exists);
        }
        off += DIRENT_SIZE as u32;
    }
    let slot = free.unwrap_or(dir.size);
    if fs.write_at(dir.ino, slot as usize, &rec) != DIRENT_SIZE {
        // ran into the data cap while growing: directory full
        return Err(FsError::NoSpace);
    }
    if slot == dir.size {
        dir.size += DIRENT_SIZE as u32;
        fs.update(dir);
    }
    Ok(())
}

/// Zero the record at `off`, freeing the slot. A partially zeroed record
/// would leave the directory corrupt and the image can no longer be
/// trusted, so a short write halts instead of returning.
pub fn unbind(fs: &FileSystem, dir: &Inode, off: u32) {
    let zero = [0u8; DIRENT_SIZE];
    if fs.write_at(dir.ino, off as usize, &zero) != DIRENT_SIZE {
        panic!("dir: short write zeroing entry at {} in dir {}", off, dir.ino);
    }
}

/// A directory is empty when only `.` and `..` remain bound.
pub fn is_empty(fs: &FileSystem, dir: &Inode) -> bool {
    let mut rec = [0u8; DIRENT_SIZE];
    let mut off = 0u32;
    while off < dir.size {
        let n = fs.read_at(dir.ino, off as usize, &mut rec);
        debug_assert_eq!(n, DIRENT_SIZE);
        let name = entry_name(&rec);
        if entry_ino(&rec) != 0 && name != b"." && name != b".." {
            return false;
        }
        off += DIRENT_SIZE as u32;
    }
    true
}
