// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! The capability contract implemented by every store and layer.
//!
//! Methods mirror the kernel callbacks but report failures as [`FsError`]
//! instead of errno values. Every operation defaults to
//! [`FsError::Unsupported`]; implementors override what they provide and
//! list it in [`FuseboxFs::supported_operations`].
//!
//! Paths are always normalized: no trailing `/`, root is `/`.

use crate::error::{FsError, FsResult};
use crate::ops::{Operation, OperationSet};
use crate::types::{
    ConnectionSettings, DirEntry, FileAttributes, FileInfo, StatvfsData, TimeSpec,
};

fn unsupported<T>(op: Operation) -> FsResult<T> {
    Err(FsError::Unsupported(op))
}

pub trait FuseboxFs: Send + Sync {
    fn supported_operations(&self) -> OperationSet;

    fn init(&self, _conn: &mut ConnectionSettings) {}

    fn statfs(&self, _path: &str) -> FsResult<StatvfsData> {
        unsupported(Operation::Statfs)
    }

    fn getattr(&self, _path: &str, _fi: Option<&FileInfo>) -> FsResult<FileAttributes> {
        unsupported(Operation::Getattr)
    }

    fn getxattr(&self, _path: &str, _name: &str) -> FsResult<Vec<u8>> {
        unsupported(Operation::Getxattr)
    }

    fn setxattr(&self, _path: &str, _name: &str, _value: &[u8], _flags: i32) -> FsResult<()> {
        unsupported(Operation::Setxattr)
    }

    fn listxattr(&self, _path: &str) -> FsResult<Vec<String>> {
        unsupported(Operation::Listxattr)
    }

    fn removexattr(&self, _path: &str, _name: &str) -> FsResult<()> {
        unsupported(Operation::Removexattr)
    }

    /// `mask` is a combination of `R_OK`, `W_OK`, `X_OK`, or `F_OK`.
    fn access(&self, _path: &str, _mask: i32) -> FsResult<()> {
        unsupported(Operation::Access)
    }

    fn chmod(&self, _path: &str, _mode: u32, _fi: Option<&FileInfo>) -> FsResult<()> {
        unsupported(Operation::Chmod)
    }

    /// `u32::MAX` leaves the respective id unchanged.
    fn chown(&self, _path: &str, _uid: u32, _gid: u32, _fi: Option<&FileInfo>) -> FsResult<()> {
        unsupported(Operation::Chown)
    }

    fn utimens(
        &self,
        _path: &str,
        _atime: TimeSpec,
        _mtime: TimeSpec,
        _fi: Option<&FileInfo>,
    ) -> FsResult<()> {
        unsupported(Operation::Utimens)
    }

    fn readlink(&self, _path: &str) -> FsResult<String> {
        unsupported(Operation::Readlink)
    }

    /// Creates `linkname` pointing at `target`. `target` is stored verbatim.
    fn symlink(&self, _target: &str, _linkname: &str) -> FsResult<()> {
        unsupported(Operation::Symlink)
    }

    fn mkdir(&self, _path: &str, _mode: u32) -> FsResult<()> {
        unsupported(Operation::Mkdir)
    }

    fn opendir(&self, _path: &str, _fi: &mut FileInfo) -> FsResult<()> {
        unsupported(Operation::Opendir)
    }

    /// Children of `path`, without `.` and `..`.
    fn readdir(&self, _path: &str) -> FsResult<Vec<DirEntry>> {
        unsupported(Operation::Readdir)
    }

    fn releasedir(&self, _path: Option<&str>, _fi: &FileInfo) -> FsResult<()> {
        unsupported(Operation::Releasedir)
    }

    fn rmdir(&self, _path: &str) -> FsResult<()> {
        unsupported(Operation::Rmdir)
    }

    /// Creates and opens `path`, storing the new handle in `fi.fh`.
    fn create(&self, _path: &str, _mode: u32, _fi: &mut FileInfo) -> FsResult<()> {
        unsupported(Operation::Create)
    }

    /// Opens `path` with `fi.flags`, storing the new handle in `fi.fh`.
    fn open(&self, _path: &str, _fi: &mut FileInfo) -> FsResult<()> {
        unsupported(Operation::Open)
    }

    /// Reads up to `buf.len()` bytes at `offset`. Returns the count, 0 at EOF.
    fn read(&self, _path: &str, _buf: &mut [u8], _offset: u64, _fi: &FileInfo) -> FsResult<usize> {
        unsupported(Operation::Read)
    }

    fn write(&self, _path: &str, _data: &[u8], _offset: u64, _fi: &FileInfo) -> FsResult<usize> {
        unsupported(Operation::Write)
    }

    fn truncate(&self, _path: &str, _size: u64, _fi: Option<&FileInfo>) -> FsResult<()> {
        unsupported(Operation::Truncate)
    }

    fn release(&self, _path: &str, _fi: &FileInfo) -> FsResult<()> {
        unsupported(Operation::Release)
    }

    fn unlink(&self, _path: &str) -> FsResult<()> {
        unsupported(Operation::Unlink)
    }

    /// `flags` may only contain [`RENAME_NOREPLACE`].
    fn rename(&self, _old_path: &str, _new_path: &str, _flags: u32) -> FsResult<()> {
        unsupported(Operation::Rename)
    }

    fn destroy(&self) {}

    fn flush(&self, _path: &str, _fi: &FileInfo) -> FsResult<()> {
        unsupported(Operation::Flush)
    }

    fn fsync(&self, _path: &str, _datasync: bool, _fi: &FileInfo) -> FsResult<()> {
        unsupported(Operation::Fsync)
    }

    fn fsyncdir(&self, _path: Option<&str>, _datasync: bool, _fi: &FileInfo) -> FsResult<()> {
        unsupported(Operation::Fsyncdir)
    }
}

/// The only rename flag honored by stores.
pub const RENAME_NOREPLACE: u32 = 1;

/// Path relative to root, without the leading `/`. Root maps to `""`.
pub fn relative(path: &str) -> &str {
    path.strip_prefix('/').unwrap_or(path)
}

/// Relative path of the parent directory; `""` for root and its children.
pub fn parent_relative(path: &str) -> &str {
    let rel = relative(path);
    match rel.rfind('/') {
        Some(idx) => &rel[..idx],
        None => "",
    }
}

/// Joins a directory path and a child name into an absolute path.
pub fn child_path(dir: &str, name: &str) -> String {
    if dir == "/" {
        format!("/{name}")
    } else {
        format!("{dir}/{name}")
    }
}

/// Joins a relative directory path and a child name into a relative path.
pub fn child_relative(dir_rel: &str, name: &str) -> String {
    if dir_rel.is_empty() {
        name.to_string()
    } else {
        format!("{dir_rel}/{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Nothing;

    impl FuseboxFs for Nothing {
        fn supported_operations(&self) -> OperationSet {
            OperationSet::empty()
        }
    }

    #[test]
    fn defaults_report_the_operation() {
        let fs = Nothing;
        match fs.getattr("/", None) {
            Err(FsError::Unsupported(op)) => assert_eq!(op, Operation::Getattr),
            other => panic!("unexpected: {other:?}"),
        }
        assert!(fs.rename("/a", "/b", 0).unwrap_err().is_unsupported());
    }

    #[test]
    fn path_helpers() {
        assert_eq!(relative("/"), "");
        assert_eq!(relative("/a/b"), "a/b");
        assert_eq!(parent_relative("/"), "");
        assert_eq!(parent_relative("/a"), "");
        assert_eq!(parent_relative("/a/b/c"), "a/b");
        assert_eq!(child_path("/", "x"), "/x");
        assert_eq!(child_path("/d", "x"), "/d/x");
        assert_eq!(child_relative("", "x"), "x");
        assert_eq!(child_relative("d/e", "x"), "d/e/x");
    }
}
