// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Whole-tree write protection.

use crate::decorate::Layer;
use crate::error::{FsError, FsResult};
use crate::fs::FuseboxFs;
use crate::ops::{Operation, OperationSet};
use crate::types::{FileAttributes, FileInfo, TimeSpec};

/// Operations that mutate the tree. They fail with EROFS and are not declared.
pub const BLOCKED: [Operation; 13] = [
    Operation::Write,
    Operation::Create,
    Operation::Mkdir,
    Operation::Rmdir,
    Operation::Unlink,
    Operation::Rename,
    Operation::Symlink,
    Operation::Chmod,
    Operation::Chown,
    Operation::Utimens,
    Operation::Setxattr,
    Operation::Removexattr,
    Operation::Truncate,
];

pub struct ReadOnly;

impl Layer for ReadOnly {
    fn supported_operations(&self, inner: &dyn FuseboxFs) -> OperationSet {
        inner.supported_operations().difference(OperationSet::of(&BLOCKED))
    }

    fn getattr(
        &self,
        inner: &dyn FuseboxFs,
        path: &str,
        fi: Option<&FileInfo>,
    ) -> FsResult<FileAttributes> {
        Ok(inner.getattr(path, fi)?.read_only())
    }

    fn access(&self, inner: &dyn FuseboxFs, path: &str, mask: i32) -> FsResult<()> {
        if mask & libc::W_OK != 0 {
            return Err(FsError::ReadOnly);
        }
        inner.access(path, mask)
    }

    fn open(&self, inner: &dyn FuseboxFs, path: &str, fi: &mut FileInfo) -> FsResult<()> {
        if fi.has_write_intent() {
            return Err(FsError::ReadOnly);
        }
        inner.open(path, fi)
    }

    fn write(
        &self,
        _inner: &dyn FuseboxFs,
        _path: &str,
        _data: &[u8],
        _offset: u64,
        _fi: &FileInfo,
    ) -> FsResult<usize> {
        Err(FsError::ReadOnly)
    }

    fn create(
        &self,
        _inner: &dyn FuseboxFs,
        _path: &str,
        _mode: u32,
        _fi: &mut FileInfo,
    ) -> FsResult<()> {
        Err(FsError::ReadOnly)
    }

    fn mkdir(&self, _inner: &dyn FuseboxFs, _path: &str, _mode: u32) -> FsResult<()> {
        Err(FsError::ReadOnly)
    }

    fn rmdir(&self, _inner: &dyn FuseboxFs, _path: &str) -> FsResult<()> {
        Err(FsError::ReadOnly)
    }

    fn unlink(&self, _inner: &dyn FuseboxFs, _path: &str) -> FsResult<()> {
        Err(FsError::ReadOnly)
    }

    fn rename(&self, _inner: &dyn FuseboxFs, _old: &str, _new: &str, _flags: u32) -> FsResult<()> {
        Err(FsError::ReadOnly)
    }

    fn symlink(&self, _inner: &dyn FuseboxFs, _target: &str, _linkname: &str) -> FsResult<()> {
        Err(FsError::ReadOnly)
    }

    fn chmod(
        &self,
        _inner: &dyn FuseboxFs,
        _path: &str,
        _mode: u32,
        _fi: Option<&FileInfo>,
    ) -> FsResult<()> {
        Err(FsError::ReadOnly)
    }

    fn chown(
        &self,
        _inner: &dyn FuseboxFs,
        _path: &str,
        _uid: u32,
        _gid: u32,
        _fi: Option<&FileInfo>,
    ) -> FsResult<()> {
        Err(FsError::ReadOnly)
    }

    fn utimens(
        &self,
        _inner: &dyn FuseboxFs,
        _path: &str,
        _atime: TimeSpec,
        _mtime: TimeSpec,
        _fi: Option<&FileInfo>,
    ) -> FsResult<()> {
        Err(FsError::ReadOnly)
    }

    fn setxattr(
        &self,
        _inner: &dyn FuseboxFs,
        _path: &str,
        _name: &str,
        _value: &[u8],
        _flags: i32,
    ) -> FsResult<()> {
        Err(FsError::ReadOnly)
    }

    fn removexattr(&self, _inner: &dyn FuseboxFs, _path: &str, _name: &str) -> FsResult<()> {
        Err(FsError::ReadOnly)
    }

    fn truncate(
        &self,
        _inner: &dyn FuseboxFs,
        _path: &str,
        _size: u64,
        _fi: Option<&FileInfo>,
    ) -> FsResult<()> {
        Err(FsError::ReadOnly)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errno::to_errno;
    use crate::testing::RecordingFs;
    use crate::transform::FuseboxFsExt;

    fn hello() -> RecordingFs {
        RecordingFs::new()
            .with_file("/hello.txt", b"hello")
            .with_file("/dir/nested.txt", b"nested")
    }

    #[test]
    fn hello_scenario() {
        let fs = hello().read_only();

        let mut fi = FileInfo::with_flags(libc::O_WRONLY);
        assert!(matches!(fs.open("/hello.txt", &mut fi), Err(FsError::ReadOnly)));

        let mut fi = FileInfo::with_flags(libc::O_RDONLY);
        fs.open("/hello.txt", &mut fi).unwrap();
        let mut buf = [0u8; 5];
        assert_eq!(fs.read("/hello.txt", &mut buf, 0, &fi).unwrap(), 5);
        assert_eq!(&buf, b"hello");

        assert_eq!(to_errno(&fs.unlink("/dir/nested.txt").unwrap_err()), -libc::EROFS);
    }

    #[test]
    fn blocked_operations_fail_and_are_undeclared() {
        let inner = hello();
        let calls = inner.calls();
        let fs = inner.read_only();
        let mut fi = FileInfo::default();

        assert!(matches!(fs.write("/hello.txt", b"x", 0, &fi), Err(FsError::ReadOnly)));
        assert!(matches!(fs.create("/new", 0o644, &mut fi), Err(FsError::ReadOnly)));
        assert!(matches!(fs.mkdir("/d2", 0o755), Err(FsError::ReadOnly)));
        assert!(matches!(fs.rmdir("/dir"), Err(FsError::ReadOnly)));
        assert!(matches!(fs.rename("/hello.txt", "/x", 0), Err(FsError::ReadOnly)));
        assert!(matches!(fs.symlink("/hello.txt", "/l"), Err(FsError::ReadOnly)));
        assert!(matches!(fs.chmod("/hello.txt", 0o777, None), Err(FsError::ReadOnly)));
        assert!(matches!(fs.chown("/hello.txt", 1, 1, None), Err(FsError::ReadOnly)));
        assert!(matches!(
            fs.utimens("/hello.txt", TimeSpec::Now, TimeSpec::Now, None),
            Err(FsError::ReadOnly)
        ));
        assert!(matches!(fs.setxattr("/hello.txt", "user.a", b"", 0), Err(FsError::ReadOnly)));
        assert!(matches!(fs.removexattr("/hello.txt", "user.a"), Err(FsError::ReadOnly)));
        assert!(matches!(fs.truncate("/hello.txt", 0, None), Err(FsError::ReadOnly)));
        assert!(calls.lock().unwrap().is_empty());

        let declared = fs.supported_operations();
        for op in BLOCKED {
            assert!(!declared.contains(op), "{op} still declared");
        }
        assert!(declared.contains(Operation::Read));
        assert!(declared.contains(Operation::Getattr));
    }

    #[test]
    fn write_bits_are_masked() {
        let fs = hello().read_only();
        assert_eq!(fs.getattr("/hello.txt", None).unwrap().perms, 0o444);
        assert_eq!(fs.getattr("/dir", None).unwrap().perms, 0o555);
    }

    #[test]
    fn access_forwards_only_without_write() {
        let inner = hello();
        let calls = inner.calls();
        let fs = inner.read_only();

        fs.access("/hello.txt", libc::R_OK).unwrap();
        assert!(matches!(
            fs.access("/hello.txt", libc::R_OK | libc::W_OK),
            Err(FsError::ReadOnly)
        ));
        assert_eq!(*calls.lock().unwrap(), vec!["access:/hello.txt"]);
    }

    #[test]
    fn write_intent_flags_are_refused() {
        let fs = hello().read_only();
        for flags in [libc::O_RDWR, libc::O_APPEND, libc::O_CREAT, libc::O_TRUNC] {
            let mut fi = FileInfo::with_flags(flags);
            assert!(matches!(fs.open("/hello.txt", &mut fi), Err(FsError::ReadOnly)), "{flags:#o}");
        }
    }
}
