// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Hides every path the predicate rejects.

use crate::decorate::Layer;
use crate::error::{FsError, FsResult};
use crate::fs::{child_relative, relative, FuseboxFs};
use crate::transform::PathPredicate;
use crate::types::{DirEntry, FileAttributes, FileInfo, StatvfsData, TimeSpec};

/// Path-visibility filter.
///
/// The predicate sees paths relative to root without the leading `/`
/// (`"dir/file.txt"`). Root itself is always visible. Everything else the
/// predicate rejects behaves as if it did not exist.
pub struct Filtered {
    allow: PathPredicate,
}

impl Filtered {
    pub fn new(allow: PathPredicate) -> Self {
        Self { allow }
    }

    fn check(&self, path: &str) -> FsResult<()> {
        if path == "/" || (self.allow)(relative(path)) {
            Ok(())
        } else {
            Err(FsError::NotFound)
        }
    }
}

impl Layer for Filtered {
    fn statfs(&self, inner: &dyn FuseboxFs, path: &str) -> FsResult<StatvfsData> {
        self.check(path)?;
        inner.statfs(path)
    }

    fn getattr(
        &self,
        inner: &dyn FuseboxFs,
        path: &str,
        fi: Option<&FileInfo>,
    ) -> FsResult<FileAttributes> {
        self.check(path)?;
        inner.getattr(path, fi)
    }

    fn getxattr(&self, inner: &dyn FuseboxFs, path: &str, name: &str) -> FsResult<Vec<u8>> {
        self.check(path)?;
        inner.getxattr(path, name)
    }

    fn setxattr(
        &self,
        inner: &dyn FuseboxFs,
        path: &str,
        name: &str,
        value: &[u8],
        flags: i32,
    ) -> FsResult<()> {
        self.check(path)?;
        inner.setxattr(path, name, value, flags)
    }

    fn listxattr(&self, inner: &dyn FuseboxFs, path: &str) -> FsResult<Vec<String>> {
        self.check(path)?;
        inner.listxattr(path)
    }

    fn removexattr(&self, inner: &dyn FuseboxFs, path: &str, name: &str) -> FsResult<()> {
        self.check(path)?;
        inner.removexattr(path, name)
    }

    fn access(&self, inner: &dyn FuseboxFs, path: &str, mask: i32) -> FsResult<()> {
        self.check(path)?;
        inner.access(path, mask)
    }

    fn chmod(
        &self,
        inner: &dyn FuseboxFs,
        path: &str,
        mode: u32,
        fi: Option<&FileInfo>,
    ) -> FsResult<()> {
        self.check(path)?;
        inner.chmod(path, mode, fi)
    }

    fn chown(
        &self,
        inner: &dyn FuseboxFs,
        path: &str,
        uid: u32,
        gid: u32,
        fi: Option<&FileInfo>,
    ) -> FsResult<()> {
        self.check(path)?;
        inner.chown(path, uid, gid, fi)
    }

    fn utimens(
        &self,
        inner: &dyn FuseboxFs,
        path: &str,
        atime: TimeSpec,
        mtime: TimeSpec,
        fi: Option<&FileInfo>,
    ) -> FsResult<()> {
        self.check(path)?;
        inner.utimens(path, atime, mtime, fi)
    }

    fn readlink(&self, inner: &dyn FuseboxFs, path: &str) -> FsResult<String> {
        self.check(path)?;
        inner.readlink(path)
    }

    fn symlink(&self, inner: &dyn FuseboxFs, target: &str, linkname: &str) -> FsResult<()> {
        self.check(linkname)?;
        inner.symlink(target, linkname)
    }

    fn mkdir(&self, inner: &dyn FuseboxFs, path: &str, mode: u32) -> FsResult<()> {
        self.check(path)?;
        inner.mkdir(path, mode)
    }

    fn opendir(&self, inner: &dyn FuseboxFs, path: &str, fi: &mut FileInfo) -> FsResult<()> {
        self.check(path)?;
        inner.opendir(path, fi)
    }

    fn readdir(&self, inner: &dyn FuseboxFs, path: &str) -> FsResult<Vec<DirEntry>> {
        self.check(path)?;
        let dir_rel = relative(path);
        let mut entries = inner.readdir(path)?;
        entries.retain(|entry| (self.allow)(&child_relative(dir_rel, &entry.name)));
        Ok(entries)
    }

    fn releasedir(&self, inner: &dyn FuseboxFs, path: Option<&str>, fi: &FileInfo) -> FsResult<()> {
        if let Some(p) = path {
            self.check(p)?;
        }
        inner.releasedir(path, fi)
    }

    fn rmdir(&self, inner: &dyn FuseboxFs, path: &str) -> FsResult<()> {
        self.check(path)?;
        inner.rmdir(path)
    }

    fn create(
        &self,
        inner: &dyn FuseboxFs,
        path: &str,
        mode: u32,
        fi: &mut FileInfo,
    ) -> FsResult<()> {
        self.check(path)?;
        inner.create(path, mode, fi)
    }

    fn open(&self, inner: &dyn FuseboxFs, path: &str, fi: &mut FileInfo) -> FsResult<()> {
        self.check(path)?;
        inner.open(path, fi)
    }

    fn read(
        &self,
        inner: &dyn FuseboxFs,
        path: &str,
        buf: &mut [u8],
        offset: u64,
        fi: &FileInfo,
    ) -> FsResult<usize> {
        self.check(path)?;
        inner.read(path, buf, offset, fi)
    }

    fn write(
        &self,
        inner: &dyn FuseboxFs,
        path: &str,
        data: &[u8],
        offset: u64,
        fi: &FileInfo,
    ) -> FsResult<usize> {
        self.check(path)?;
        inner.write(path, data, offset, fi)
    }

    fn truncate(
        &self,
        inner: &dyn FuseboxFs,
        path: &str,
        size: u64,
        fi: Option<&FileInfo>,
    ) -> FsResult<()> {
        self.check(path)?;
        inner.truncate(path, size, fi)
    }

    fn release(&self, inner: &dyn FuseboxFs, path: &str, fi: &FileInfo) -> FsResult<()> {
        self.check(path)?;
        inner.release(path, fi)
    }

    fn unlink(&self, inner: &dyn FuseboxFs, path: &str) -> FsResult<()> {
        self.check(path)?;
        inner.unlink(path)
    }

    fn rename(
        &self,
        inner: &dyn FuseboxFs,
        old_path: &str,
        new_path: &str,
        flags: u32,
    ) -> FsResult<()> {
        self.check(old_path)?;
        self.check(new_path)?;
        inner.rename(old_path, new_path, flags)
    }

    fn flush(&self, inner: &dyn FuseboxFs, path: &str, fi: &FileInfo) -> FsResult<()> {
        self.check(path)?;
        inner.flush(path, fi)
    }

    fn fsync(
        &self,
        inner: &dyn FuseboxFs,
        path: &str,
        datasync: bool,
        fi: &FileInfo,
    ) -> FsResult<()> {
        self.check(path)?;
        inner.fsync(path, datasync, fi)
    }

    fn fsyncdir(
        &self,
        inner: &dyn FuseboxFs,
        path: Option<&str>,
        datasync: bool,
        fi: &FileInfo,
    ) -> FsResult<()> {
        if let Some(p) = path {
            self.check(p)?;
        }
        inner.fsyncdir(path, datasync, fi)
    }
}
