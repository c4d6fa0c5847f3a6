// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Path-level callback protocol between a kernel binding and a chain.
//!
//! Every callback normalizes its path, calls the chain, and returns `0` (or a
//! byte count) on success and `-errno` on failure. This is the single place
//! where [`FsError`]s become errno values.
//!
//! Buffers follow the C conventions of the kernel interface: xattr callbacks
//! given an empty buffer report the required length, and `readlink` always
//! NUL-terminates.

use std::borrow::Cow;
use std::time::{SystemTime, UNIX_EPOCH};

use libc::c_int;
use tracing::debug;

use crate::errno::to_errno;
use crate::error::FsResult;
use crate::fs::FuseboxFs;
use crate::ops::{Operation, OperationSet};
use crate::types::{ConnectionSettings, FileAttributes, FileInfo, StatvfsData, TimeSpec};

/// Strips trailing slashes; the empty result is root.
pub fn normalize_path(path: &str) -> Cow<'_, str> {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        Cow::Borrowed("/")
    } else {
        Cow::Borrowed(trimmed)
    }
}

/// Receives directory entries; a non-zero return stops the listing.
pub trait DirFiller {
    fn fill(&mut self, name: &str) -> c_int;
}

impl DirFiller for Vec<String> {
    fn fill(&mut self, name: &str) -> c_int {
        self.push(name.to_string());
        0
    }
}

/// `stat` fields reported for a path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Stat {
    pub mode: u32,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    pub atime: SystemTime,
    pub mtime: SystemTime,
    pub ctime: SystemTime,
    pub crtime: Option<SystemTime>,
}

impl Default for Stat {
    fn default() -> Self {
        Self {
            mode: 0,
            nlink: 0,
            uid: 0,
            gid: 0,
            size: 0,
            atime: UNIX_EPOCH,
            mtime: UNIX_EPOCH,
            ctime: UNIX_EPOCH,
            crtime: None,
        }
    }
}

impl From<&FileAttributes> for Stat {
    fn from(attrs: &FileAttributes) -> Self {
        Self {
            mode: attrs.mode(),
            // Subdirectory counts are not tracked.
            nlink: if attrs.is_directory() { 2 } else { 1 },
            uid: attrs.uid,
            gid: attrs.gid,
            size: attrs.size,
            atime: attrs.atime,
            mtime: attrs.mtime,
            ctime: attrs.ctime,
            crtime: attrs.crtime,
        }
    }
}

fn copy_out(bytes: &[u8], buf: &mut [u8]) -> c_int {
    if buf.is_empty() {
        bytes.len() as c_int
    } else if buf.len() < bytes.len() {
        -libc::ERANGE
    } else {
        buf[..bytes.len()].copy_from_slice(bytes);
        bytes.len() as c_int
    }
}

pub struct FuseboxOperations {
    fs: Box<dyn FuseboxFs>,
}

impl FuseboxOperations {
    pub fn new(fs: Box<dyn FuseboxFs>) -> Self {
        Self { fs }
    }

    pub fn fs(&self) -> &dyn FuseboxFs {
        self.fs.as_ref()
    }

    pub fn supported_operations(&self) -> OperationSet {
        self.fs.supported_operations()
    }

    fn status(&self, op: Operation, path: &str, result: FsResult<c_int>) -> c_int {
        match result {
            Ok(n) => n,
            Err(err) => {
                let errno = to_errno(&err);
                if errno == -libc::EIO {
                    debug!(target: "fusebox::fuse", %op, path, error = %err, "untranslated failure");
                }
                errno
            }
        }
    }

    pub fn init(&self, conn: &mut ConnectionSettings) {
        self.fs.init(conn);
        debug!(
            target: "fusebox::fuse",
            supported = ?self.supported_operations(),
            "initialized filesystem chain"
        );
    }

    pub fn statfs(&self, path: &str, out: &mut StatvfsData) -> c_int {
        let path = normalize_path(path);
        self.status(Operation::Statfs, &path, self.fs.statfs(&path).map(|st| {
            *out = st;
            0
        }))
    }

    pub fn getattr(&self, path: &str, out: &mut Stat, fi: Option<&FileInfo>) -> c_int {
        let path = normalize_path(path);
        self.status(Operation::Getattr, &path, self.fs.getattr(&path, fi).map(|attrs| {
            *out = Stat::from(&attrs);
            0
        }))
    }

    pub fn getxattr(&self, path: &str, name: &str, value: &mut [u8]) -> c_int {
        let path = normalize_path(path);
        let result = self.fs.getxattr(&path, name).map(|bytes| copy_out(&bytes, value));
        self.status(Operation::Getxattr, &path, result)
    }

    pub fn setxattr(&self, path: &str, name: &str, value: &[u8], flags: c_int) -> c_int {
        let path = normalize_path(path);
        let result = self.fs.setxattr(&path, name, value, flags).map(|()| 0);
        self.status(Operation::Setxattr, &path, result)
    }

    /// Names are reported as consecutive NUL-terminated strings.
    pub fn listxattr(&self, path: &str, list: &mut [u8]) -> c_int {
        let path = normalize_path(path);
        let result = self.fs.listxattr(&path).map(|names| {
            let mut packed = Vec::with_capacity(names.iter().map(|n| n.len() + 1).sum());
            for name in &names {
                packed.extend_from_slice(name.as_bytes());
                packed.push(0);
            }
            copy_out(&packed, list)
        });
        self.status(Operation::Listxattr, &path, result)
    }

    pub fn removexattr(&self, path: &str, name: &str) -> c_int {
        let path = normalize_path(path);
        let result = self.fs.removexattr(&path, name).map(|()| 0);
        self.status(Operation::Removexattr, &path, result)
    }

    pub fn access(&self, path: &str, mask: c_int) -> c_int {
        let path = normalize_path(path);
        self.status(Operation::Access, &path, self.fs.access(&path, mask).map(|()| 0))
    }

    pub fn chmod(&self, path: &str, mode: u32, fi: Option<&FileInfo>) -> c_int {
        let path = normalize_path(path);
        self.status(Operation::Chmod, &path, self.fs.chmod(&path, mode, fi).map(|()| 0))
    }

    pub fn chown(&self, path: &str, uid: u32, gid: u32, fi: Option<&FileInfo>) -> c_int {
        let path = normalize_path(path);
        self.status(Operation::Chown, &path, self.fs.chown(&path, uid, gid, fi).map(|()| 0))
    }

    pub fn utimens(
        &self,
        path: &str,
        atime: TimeSpec,
        mtime: TimeSpec,
        fi: Option<&FileInfo>,
    ) -> c_int {
        let path = normalize_path(path);
        let result = self.fs.utimens(&path, atime, mtime, fi).map(|()| 0);
        self.status(Operation::Utimens, &path, result)
    }

    /// Copies at most `buf.len() - 1` bytes of the target and NUL-terminates.
    pub fn readlink(&self, path: &str, buf: &mut [u8]) -> c_int {
        let path = normalize_path(path);
        let result = self.fs.readlink(&path).map(|target| {
            let bytes = target.as_bytes();
            if let Some(room) = buf.len().checked_sub(1) {
                let n = bytes.len().min(room);
                buf[..n].copy_from_slice(&bytes[..n]);
                buf[n] = 0;
            }
            0
        });
        self.status(Operation::Readlink, &path, result)
    }

    /// The target is stored as given; only the link path is normalized.
    pub fn symlink(&self, target: &str, linkname: &str) -> c_int {
        let linkname = normalize_path(linkname);
        let result = self.fs.symlink(target, &linkname).map(|()| 0);
        self.status(Operation::Symlink, &linkname, result)
    }

    pub fn mkdir(&self, path: &str, mode: u32) -> c_int {
        let path = normalize_path(path);
        self.status(Operation::Mkdir, &path, self.fs.mkdir(&path, mode).map(|()| 0))
    }

    pub fn opendir(&self, path: &str, fi: &mut FileInfo) -> c_int {
        let path = normalize_path(path);
        self.status(Operation::Opendir, &path, self.fs.opendir(&path, fi).map(|()| 0))
    }

    /// Emits `.`, `..`, then the chain's entries.
    pub fn readdir(&self, path: &str, filler: &mut dyn DirFiller) -> c_int {
        let path = normalize_path(path);
        for dot in [".", ".."] {
            if filler.fill(dot) != 0 {
                return -libc::EIO;
            }
        }
        let result = self.fs.readdir(&path).map(|entries| {
            for entry in &entries {
                if filler.fill(&entry.name) != 0 {
                    return -libc::EIO;
                }
            }
            0
        });
        self.status(Operation::Readdir, &path, result)
    }

    pub fn releasedir(&self, path: Option<&str>, fi: &FileInfo) -> c_int {
        let path = path.map(normalize_path);
        let path = path.as_deref();
        let result = self.fs.releasedir(path, fi).map(|()| 0);
        self.status(Operation::Releasedir, path.unwrap_or(""), result)
    }

    pub fn rmdir(&self, path: &str) -> c_int {
        let path = normalize_path(path);
        self.status(Operation::Rmdir, &path, self.fs.rmdir(&path).map(|()| 0))
    }

    pub fn create(&self, path: &str, mode: u32, fi: &mut FileInfo) -> c_int {
        let path = normalize_path(path);
        self.status(Operation::Create, &path, self.fs.create(&path, mode, fi).map(|()| 0))
    }

    pub fn open(&self, path: &str, fi: &mut FileInfo) -> c_int {
        let path = normalize_path(path);
        self.status(Operation::Open, &path, self.fs.open(&path, fi).map(|()| 0))
    }

    /// Returns the number of bytes read.
    pub fn read(&self, path: &str, buf: &mut [u8], offset: u64, fi: &FileInfo) -> c_int {
        let path = normalize_path(path);
        let result = self.fs.read(&path, buf, offset, fi).map(|n| n as c_int);
        self.status(Operation::Read, &path, result)
    }

    /// Returns the number of bytes written.
    pub fn write(&self, path: &str, data: &[u8], offset: u64, fi: &FileInfo) -> c_int {
        let path = normalize_path(path);
        let result = self.fs.write(&path, data, offset, fi).map(|n| n as c_int);
        self.status(Operation::Write, &path, result)
    }

    pub fn truncate(&self, path: &str, size: u64, fi: Option<&FileInfo>) -> c_int {
        let path = normalize_path(path);
        self.status(Operation::Truncate, &path, self.fs.truncate(&path, size, fi).map(|()| 0))
    }

    pub fn release(&self, path: &str, fi: &FileInfo) -> c_int {
        let path = normalize_path(path);
        self.status(Operation::Release, &path, self.fs.release(&path, fi).map(|()| 0))
    }

    pub fn unlink(&self, path: &str) -> c_int {
        let path = normalize_path(path);
        self.status(Operation::Unlink, &path, self.fs.unlink(&path).map(|()| 0))
    }

    pub fn rename(&self, old_path: &str, new_path: &str, flags: u32) -> c_int {
        let old_path = normalize_path(old_path);
        let new_path = normalize_path(new_path);
        let result = self.fs.rename(&old_path, &new_path, flags).map(|()| 0);
        self.status(Operation::Rename, &old_path, result)
    }

    pub fn destroy(&self) {
        self.fs.destroy();
    }

    pub fn flush(&self, path: &str, fi: &FileInfo) -> c_int {
        let path = normalize_path(path);
        self.status(Operation::Flush, &path, self.fs.flush(&path, fi).map(|()| 0))
    }

    pub fn fsync(&self, path: &str, datasync: bool, fi: &FileInfo) -> c_int {
        let path = normalize_path(path);
        self.status(Operation::Fsync, &path, self.fs.fsync(&path, datasync, fi).map(|()| 0))
    }

    pub fn fsyncdir(&self, path: Option<&str>, datasync: bool, fi: &FileInfo) -> c_int {
        let path = path.map(normalize_path);
        let path = path.as_deref();
        let result = self.fs.fsyncdir(path, datasync, fi).map(|()| 0);
        self.status(Operation::Fsyncdir, path.unwrap_or(""), result)
    }
}

impl From<Box<dyn FuseboxFs>> for FuseboxOperations {
    fn from(fs: Box<dyn FuseboxFs>) -> Self {
        Self::new(fs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingFs;
    use crate::transform::FuseboxFsExt;
    use crate::types::FileType;

    fn ops(fs: RecordingFs) -> FuseboxOperations {
        FuseboxOperations::new(Box::new(fs))
    }

    #[test]
    fn paths_are_normalized() {
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path("//"), "/");
        assert_eq!(normalize_path(""), "/");
        assert_eq!(normalize_path("/a/"), "/a");
        assert_eq!(normalize_path("/a/b"), "/a/b");
    }

    #[test]
    fn normalized_paths_reach_the_chain() {
        let inner = RecordingFs::new().with_dir("/a");
        let calls = inner.calls();
        let ops = ops(inner);
        let mut stat = Stat::default();
        assert_eq!(ops.getattr("/a/", &mut stat, None), 0);
        assert_eq!(*calls.lock().unwrap(), vec!["getattr:/a"]);
    }

    #[test]
    fn failures_are_negative_errno() {
        let ops = ops(RecordingFs::new());
        let mut stat = Stat::default();
        assert_eq!(ops.getattr("/missing", &mut stat, None), -libc::ENOENT);
        assert_eq!(ops.unlink("/missing"), -libc::ENOENT);
    }

    #[test]
    fn read_only_chain_reports_erofs() {
        let ops = FuseboxOperations::new(Box::new(
            RecordingFs::new().with_file("/f", b"data").read_only(),
        ));
        assert_eq!(ops.unlink("/f"), -libc::EROFS);
        let mut buf = [0u8; 8];
        let mut fi = FileInfo::with_flags(libc::O_RDONLY);
        assert_eq!(ops.open("/f", &mut fi), 0);
        assert_eq!(ops.read("/f", &mut buf, 0, &fi), 4);
    }

    #[test]
    fn nlink_depends_on_type() {
        let ops = ops(RecordingFs::new().with_file("/d/f", b"xyz"));
        let mut stat = Stat::default();
        ops.getattr("/d", &mut stat, None);
        assert_eq!(stat.nlink, 2);
        assert_eq!(stat.mode & crate::types::S_IFMT, FileType::Directory.mask());
        ops.getattr("/d/f", &mut stat, None);
        assert_eq!(stat.nlink, 1);
        assert_eq!(stat.size, 3);
    }

    #[test]
    fn directories_start_with_dot_entries() {
        let ops = ops(RecordingFs::new().with_file("/a", b""));
        let mut names = Vec::new();
        assert_eq!(ops.readdir("/", &mut names), 0);
        assert_eq!(names, vec![".", "..", "a"]);
    }

    #[test]
    fn filler_refusal_is_eio() {
        struct Full;
        impl DirFiller for Full {
            fn fill(&mut self, _name: &str) -> c_int {
                1
            }
        }
        let ops = ops(RecordingFs::new());
        assert_eq!(ops.readdir("/", &mut Full), -libc::EIO);
    }

    #[test]
    fn xattr_buffers_report_size_then_fill() {
        let ops = ops(
            RecordingFs::new()
                .with_file("/f", b"")
                .with_xattr("/f", "user.a", b"hello")
                .with_xattr("/f", "user", b""),
        );

        assert_eq!(ops.getxattr("/f", "user.a", &mut []), 5);
        let mut small = [0u8; 2];
        assert_eq!(ops.getxattr("/f", "user.a", &mut small), -libc::ERANGE);
        let mut value = [0u8; 8];
        assert_eq!(ops.getxattr("/f", "user.a", &mut value), 5);
        assert_eq!(&value[..5], b"hello");

        assert_eq!(ops.listxattr("/f", &mut []), 12);
        let mut list = [0u8; 12];
        assert_eq!(ops.listxattr("/f", &mut list), 12);
        assert_eq!(&list, b"user\0user.a\0");
        assert_eq!(ops.listxattr("/f", &mut [0u8; 3]), -libc::ERANGE);

        assert_eq!(ops.getxattr("/f", "user.none", &mut []), -crate::errno::ENOATTR);
    }

    #[test]
    fn listxattr_counts_one_nul_per_name() {
        let ops = ops(
            RecordingFs::new()
                .with_file("/f", b"")
                .with_xattr("/f", "user.a", b"1")
                .with_xattr("/f", "user.", b"2"),
        );

        assert_eq!(ops.listxattr("/f", &mut []), 13);
        assert_eq!(ops.listxattr("/f", &mut [0u8; 12]), -libc::ERANGE);
        let mut list = [0u8; 13];
        assert_eq!(ops.listxattr("/f", &mut list), 13);
        assert_eq!(&list, b"user.\0user.a\0");
    }

    #[test]
    fn readlink_truncates_and_terminates() {
        let ops = ops(RecordingFs::new().with_symlink("/l", "target"));
        let mut buf = [0xffu8; 4];
        assert_eq!(ops.readlink("/l", &mut buf), 0);
        assert_eq!(&buf, b"tar\0");

        let mut roomy = [0xffu8; 10];
        assert_eq!(ops.readlink("/l", &mut roomy), 0);
        assert_eq!(&roomy[..7], b"target\0");
    }

    #[test]
    #[should_panic(expected = "illegal state")]
    fn programmer_errors_are_not_translated() {
        let fs = RecordingFs::new()
            .with_file("/.a", b"")
            .with_file("/a", b"")
            .map_file_names(crate::transform::NameMapper::strip_prefix("."));
        let ops = FuseboxOperations::new(Box::new(fs));
        let mut names = Vec::new();
        ops.readdir("/", &mut names);
    }
}
