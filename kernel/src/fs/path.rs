//! Path resolution
//!
//! Component walk from the root (absolute paths) or the calling process's
//! working directory. `.` and `..` go through the real directory entries,
//! so a parent walk out of the root stays at the root.

use alloc::string::String;
use alloc::sync::Arc;

use super::{
    dir,
    disk::{Ino, ROOT_INO},
    inode::{FileSystem, InodeCell},
    FsError, FsResult,
};

fn start(fs: &FileSystem, cwd: Ino, path: &str) -> FsResult<Arc<InodeCell>> {
    if path.starts_with('/') {
        fs.iget(ROOT_INO)
    } else {
        fs.iget(cwd)
    }
}

fn step(fs: &FileSystem, cur: &Arc<InodeCell>, name: &str) -> FsResult<Arc<InodeCell>> {
    let next = {
        let g = cur.lock();
        if !g.mode.is_dir() {
            return Err(FsError::NotDirectory);
        }
        dir::lookup(fs, &g, name).ok_or(FsError::NotFound)?.0
    };
    fs.iget(next)
}

/// Resolve a path to its inode (the `p2i` collaborator).
pub fn resolve(fs: &FileSystem, cwd: Ino, path: &str) -> FsResult<Arc<InodeCell>> {
    if path.is_empty() {
        return Err(FsError::InvalidArgument);
    }
    let mut cur = start(fs, cwd, path)?;
    for comp in path.split('/').filter(|c| !c.is_empty()) {
        cur = step(fs, &cur, comp)?;
    }
    Ok(cur)
}

/// Resolve a path to its parent directory and leaf name (the `p2ip`
/// collaborator). The leaf is returned verbatim, `.`/`..` included, and is
/// not required to exist.
pub fn resolve_parent(
    fs: &FileSystem,
    cwd: Ino,
    path: &str,
) -> FsResult<(Arc<InodeCell>, String)> {
    let comps: alloc::vec::Vec<&str> = path.split('/').filter(|c| !c.is_empty()).collect();
    let Some((leaf, dirs)) = comps.split_last() else {
        // "" or "/": no leaf to name
        return Err(FsError::InvalidArgument);
    };
    let mut cur = start(fs, cwd, path)?;
    for comp in dirs {
        cur = step(fs, &cur, comp)?;
    }
    if !cur.lock().mode.is_dir() {
        return Err(FsError::NotDirectory);
    }
    Ok((cur, String::from(*leaf)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::inode::FileMode;

    fn fs_with(name: &str) -> (FileSystem, Ino) {
        let fs = FileSystem::new();
        let cell = fs.alloc(FileMode::new(FileMode::S_IFREG | 0o644));
        let root = fs.iget(ROOT_INO).unwrap();
        let mut g = root.lock();
        dir::link(&fs, &mut g, name, cell.ino()).unwrap();
        (fs, cell.ino())
    }

    #[test]
    fn resolve_root() {
        let fs = FileSystem::new();
        assert_eq!(resolve(&fs, ROOT_INO, "/").unwrap().ino(), ROOT_INO);
        assert_eq!(resolve(&fs, ROOT_INO, ".").unwrap().ino(), ROOT_INO);
        assert_eq!(resolve(&fs, ROOT_INO, "/..").unwrap().ino(), ROOT_INO);
        assert_eq!(resolve(&fs, ROOT_INO, "").err(), Some(FsError::InvalidArgument));
    }

    #[test]
    fn resolve_entry_and_missing() {
        let (fs, ino) = fs_with("f");
        assert_eq!(resolve(&fs, ROOT_INO, "/f").unwrap().ino(), ino);
        assert_eq!(resolve(&fs, ROOT_INO, "f").unwrap().ino(), ino);
        assert_eq!(resolve(&fs, ROOT_INO, "/g").err(), Some(FsError::NotFound));
        // a regular file used as a directory component
        assert_eq!(resolve(&fs, ROOT_INO, "/f/x").err(), Some(FsError::NotDirectory));
    }

    #[test]
    fn resolve_parent_leaf() {
        let (fs, _) = fs_with("f");
        let (dp, leaf) = resolve_parent(&fs, ROOT_INO, "/f").unwrap();
        assert_eq!(dp.ino(), ROOT_INO);
        assert_eq!(leaf, "f");
        // the leaf need not exist
        let (_, leaf) = resolve_parent(&fs, ROOT_INO, "/brand-new").unwrap();
        assert_eq!(leaf, "brand-new");
        // ".." leaves come back verbatim
        let (_, leaf) = resolve_parent(&fs, ROOT_INO, "/..").unwrap();
        assert_eq!(leaf, "..");
        assert_eq!(resolve_parent(&fs, ROOT_INO, "/").map(|(_, l)| l), Err(FsError::InvalidArgument));
        assert_eq!(
            resolve_parent(&fs, ROOT_INO, "/missing/f").map(|(_, l)| l),
            Err(FsError::NotFound)
        );
    }
}
