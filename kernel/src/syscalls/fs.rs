//! File system system calls
//!
//! dup, read, write, close, fstat, link, unlink, open, mkdir, chdir.
//!
//! link and unlink are the multi-inode transactions. Both resolve first,
//! then take every lock they need in the canonical order (`lock_pair`,
//! by inode number) and keep them for the whole transaction; any failure
//! after the provisional nlinks change rolls it back, persisted, before a
//! lock is released. Persistence is immediate but uncoordinated across the
//! two inodes, so a crash between steps can leave an orphaned link count;
//! that is accepted here, not masked.

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec;

use log::debug;

use super::ret;
use crate::fs::{
    dir, lock_pair, path, FileMode, FileSystem, File, FsError, FsResult, Ino, InodeCell,
    OpenFlags, STAT_SIZE,
};
use crate::process::{Process, SyscallFrame};

/// Resolve argument `n` as a file descriptor (the `argfd` fetcher).
fn arg_fd(proc: &Process, frame: &SyscallFrame, n: usize) -> FsResult<(usize, Arc<File>)> {
    let fd = frame.arg(n);
    let file = proc.fds.get(fd)?;
    Ok((fd, Arc::clone(file)))
}

/// int dup(int fd);
pub fn sys_dup(_fs: &FileSystem, proc: &mut Process, frame: &SyscallFrame) -> isize {
    ret("sys_dup", dup(proc, frame))
}

fn dup(proc: &mut Process, frame: &SyscallFrame) -> FsResult<usize> {
    let (_, file) = arg_fd(proc, frame, 0)?;
    let fd = proc.fds.alloc(&file)?;
    // counted increment only once the new descriptor is bound
    file.add_ref();
    Ok(fd)
}

/// int read(int fd, char *buf, int n);
pub fn sys_read(fs: &FileSystem, proc: &mut Process, frame: &SyscallFrame) -> isize {
    ret("sys_read", read(fs, proc, frame))
}

fn read(fs: &FileSystem, proc: &mut Process, frame: &SyscallFrame) -> FsResult<usize> {
    let (_, file) = arg_fd(proc, frame, 0)?;
    let n = frame.arg(2);
    let addr = frame.arg_ptr(1, n, &proc.mem)?;
    let mut buf = vec![0u8; n];
    let moved = file.read(fs, &mut buf)?;
    proc.mem.write(addr, &buf[..moved])?;
    Ok(moved)
}

/// int write(int fd, char *buf, int n);
pub fn sys_write(fs: &FileSystem, proc: &mut Process, frame: &SyscallFrame) -> isize {
    ret("sys_write", write(fs, proc, frame))
}

fn write(fs: &FileSystem, proc: &mut Process, frame: &SyscallFrame) -> FsResult<usize> {
    let (_, file) = arg_fd(proc, frame, 0)?;
    let n = frame.arg(2);
    let addr = frame.arg_ptr(1, n, &proc.mem)?;
    let data = proc.mem.read(addr, n)?.to_vec();
    file.write(fs, &data)
}

/// int close(int fd);
pub fn sys_close(fs: &FileSystem, proc: &mut Process, frame: &SyscallFrame) -> isize {
    ret("sys_close", close(fs, proc, frame))
}

fn close(fs: &FileSystem, proc: &mut Process, frame: &SyscallFrame) -> FsResult<usize> {
    // the slot is emptied before the reference count drops, so a reused fd
    // number never observes the object mid-release
    let file = proc.fds.take(frame.arg(0))?;
    file.close(fs);
    Ok(0)
}

/// int fstat(int fd, struct stat *st);
pub fn sys_fstat(_fs: &FileSystem, proc: &mut Process, frame: &SyscallFrame) -> isize {
    ret("sys_fstat", fstat(proc, frame))
}

fn fstat(proc: &mut Process, frame: &SyscallFrame) -> FsResult<usize> {
    let (_, file) = arg_fd(proc, frame, 0)?;
    let addr = frame.arg_ptr(1, STAT_SIZE, &proc.mem)?;
    let st = file.stat();
    proc.mem.write(addr, &st.encode())?;
    Ok(0)
}

/// int link(char *old, char *new);
pub fn sys_link(fs: &FileSystem, proc: &mut Process, frame: &SyscallFrame) -> isize {
    ret("sys_link", link(fs, proc, frame))
}

fn link(fs: &FileSystem, proc: &mut Process, frame: &SyscallFrame) -> FsResult<usize> {
    let old = String::from(frame.arg_str(0, &proc.mem)?);
    let new = String::from(frame.arg_str(1, &proc.mem)?);
    debug!("sys_link: old [{}] new [{}]", old, new);

    let ip = path::resolve(fs, proc.cwd, &old)?;
    let (dp, name) = path::resolve_parent(fs, proc.cwd, &new)?;
    if ip.ino() == dp.ino() {
        // only a directory can be its own new parent
        return Err(FsError::IsDirectory);
    }

    let (mut ig, mut dg) = lock_pair(&ip, &dp);
    if ig.mode.is_dir() {
        // a directory's nlinks is reserved for the self/parent convention
        return Err(FsError::IsDirectory);
    }
    // provisional: persisted now, rolled back (and persisted again) below
    // if the entry cannot be inserted
    ig.nlinks += 1;
    fs.update(&ig);
    if let Err(err) = dir::link(fs, &mut dg, &name, ig.ino) {
        ig.nlinks -= 1;
        fs.update(&ig);
        return Err(err);
    }
    Ok(0)
}

/// int unlink(char *path);
pub fn sys_unlink(fs: &FileSystem, proc: &mut Process, frame: &SyscallFrame) -> isize {
    ret("sys_unlink", unlink(fs, proc, frame))
}

fn unlink(fs: &FileSystem, proc: &mut Process, frame: &SyscallFrame) -> FsResult<usize> {
    let target = String::from(frame.arg_str(0, &proc.mem)?);
    debug!("sys_unlink: [{}]", target);

    let (dp, name) = path::resolve_parent(fs, proc.cwd, &target)?;
    if name == "." || name == ".." {
        return Err(FsError::InvalidArgument);
    }
    let t_ino = {
        let dg = dp.lock();
        dir::lookup(fs, &dg, &name).ok_or(FsError::NotFound)?.0
    };
    if t_ino == dp.ino() {
        return Err(FsError::InvalidArgument);
    }
    let ip = fs.iget(t_ino)?;

    let (mut dg, mut ig) = lock_pair(&dp, &ip);
    // the parent lock was dropped to order the acquisition; revalidate
    let off = match dir::lookup(fs, &dg, &name) {
        Some((ino, off)) if ino == t_ino => off,
        _ => return Err(FsError::NotFound),
    };
    assert!(ig.nlinks >= 1, "unlink: inode {} nlinks < 1", ig.ino);
    if ig.mode.is_dir() && !dir::is_empty(fs, &ig) {
        return Err(FsError::NotEmpty);
    }

    dir::unbind(fs, &dg, off);

    if ig.mode.is_dir() {
        // the removed directory's ".." no longer references the parent
        dg.nlinks -= 1;
        fs.update(&dg);
    }
    drop(dg);

    ig.nlinks -= 1;
    fs.update(&ig);
    drop(ig);
    fs.put(ip);
    Ok(0)
}

/// Create the leaf of `path` with the given mode, xv6-style: shared by
/// open(O_CREATE) and mkdir. Returns the existing inode only for a regular
/// file reopened with a regular mode.
fn create(fs: &FileSystem, cwd: Ino, path: &str, mode: FileMode) -> FsResult<Arc<InodeCell>> {
    let (dp, name) = path::resolve_parent(fs, cwd, path)?;
    let mut dg = dp.lock();
    if let Some((ino, _)) = dir::lookup(fs, &dg, &name) {
        drop(dg);
        let ip = fs.iget(ino)?;
        if mode.is_dir() || ip.lock().mode.is_dir() {
            return Err(FsError::Exists);
        }
        return Ok(ip);
    }

    let ip = fs.alloc(mode);
    // fresh and unpublished: no other path can reach this inode yet, so
    // locking it after the parent cannot invert the canonical order
    let mut ig = ip.lock();
    if mode.is_dir() {
        fs.init_dir_data(ig.ino, dg.ino);
        ig.size = (2 * dir::DIRENT_SIZE) as u32;
        ig.nlinks = 2; // parent entry plus its own "."
        fs.update(&ig);
        dg.nlinks += 1; // the new ".." references the parent
        fs.update(&dg);
    } else {
        ig.nlinks = 1;
        fs.update(&ig);
    }
    if let Err(err) = dir::link(fs, &mut dg, &name, ig.ino) {
        if mode.is_dir() {
            dg.nlinks -= 1;
            fs.update(&dg);
        }
        ig.nlinks = 0;
        fs.update(&ig);
        drop(ig);
        drop(dg);
        // the handle itself goes back, so the unpublished inode is reclaimed
        fs.put(ip);
        return Err(err);
    }
    drop(ig);
    drop(dg);
    Ok(ip)
}

/// int open(char *path, int flags);
pub fn sys_open(fs: &FileSystem, proc: &mut Process, frame: &SyscallFrame) -> isize {
    ret("sys_open", open(fs, proc, frame))
}

fn open(fs: &FileSystem, proc: &mut Process, frame: &SyscallFrame) -> FsResult<usize> {
    let path = String::from(frame.arg_str(0, &proc.mem)?);
    let flags = OpenFlags::from_bits_truncate(frame.arg(1) as u32);

    let ip = match path::resolve(fs, proc.cwd, &path) {
        Ok(ip) => ip,
        Err(FsError::NotFound) if flags.contains(OpenFlags::CREATE) => {
            create(fs, proc.cwd, &path, FileMode::new(FileMode::S_IFREG | 0o644))?
        }
        Err(err) => return Err(err),
    };
    if ip.lock().mode.is_dir() && flags.writable() {
        return Err(FsError::IsDirectory);
    }

    let file = File::open(ip, flags.readable(), flags.writable());
    match proc.fds.alloc(&file) {
        Ok(fd) => Ok(fd),
        Err(err) => {
            file.close(fs);
            Err(err)
        }
    }
}

/// int mkdir(char *path);
pub fn sys_mkdir(fs: &FileSystem, proc: &mut Process, frame: &SyscallFrame) -> isize {
    ret("sys_mkdir", mkdir(fs, proc, frame))
}

fn mkdir(fs: &FileSystem, proc: &mut Process, frame: &SyscallFrame) -> FsResult<usize> {
    let path = String::from(frame.arg_str(0, &proc.mem)?);
    create(fs, proc.cwd, &path, FileMode::new(FileMode::S_IFDIR | 0o755))?;
    Ok(0)
}

/// int chdir(char *path);
pub fn sys_chdir(fs: &FileSystem, proc: &mut Process, frame: &SyscallFrame) -> isize {
    ret("sys_chdir", chdir(fs, proc, frame))
}

fn chdir(fs: &FileSystem, proc: &mut Process, frame: &SyscallFrame) -> FsResult<usize> {
    let path = String::from(frame.arg_str(0, &proc.mem)?);
    let ip = path::resolve(fs, proc.cwd, &path)?;
    if !ip.lock().mode.is_dir() {
        return Err(FsError::NotDirectory);
    }
    proc.cwd = ip.ino();
    Ok(0)
}
