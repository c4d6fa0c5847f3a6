// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Composition of layers over an inner store.
//!
//! A [`Layer`] receives the inner store on every call and forwards by default,
//! so a transform only overrides the operations it changes. [`Decorated`]
//! turns a layer plus an inner store into a [`FuseboxFs`].
//!
//! A [`SelectiveLayer`] additionally decides per path whether a call falls
//! under its jurisdiction. Calls in jurisdiction go to the `decorated_*`
//! variant; the rest pass straight through. Wrap it in [`Selective`] to use it
//! as a layer.

use std::any::type_name;

use tracing::debug;

use crate::error::FsResult;
use crate::fs::FuseboxFs;
use crate::ops::OperationSet;
use crate::types::{
    ConnectionSettings, DirEntry, FileAttributes, FileInfo, StatvfsData, TimeSpec,
};

pub trait Layer: Send + Sync {
    fn supported_operations(&self, inner: &dyn FuseboxFs) -> OperationSet {
        inner.supported_operations()
    }

    fn init(&self, inner: &dyn FuseboxFs, conn: &mut ConnectionSettings) {
        inner.init(conn)
    }

    fn statfs(&self, inner: &dyn FuseboxFs, path: &str) -> FsResult<StatvfsData> {
        inner.statfs(path)
    }

    fn getattr(
        &self,
        inner: &dyn FuseboxFs,
        path: &str,
        fi: Option<&FileInfo>,
    ) -> FsResult<FileAttributes> {
        inner.getattr(path, fi)
    }

    fn getxattr(&self, inner: &dyn FuseboxFs, path: &str, name: &str) -> FsResult<Vec<u8>> {
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
        inner.setxattr(path, name, value, flags)
    }

    fn listxattr(&self, inner: &dyn FuseboxFs, path: &str) -> FsResult<Vec<String>> {
        inner.listxattr(path)
    }

    fn removexattr(&self, inner: &dyn FuseboxFs, path: &str, name: &str) -> FsResult<()> {
        inner.removexattr(path, name)
    }

    fn access(&self, inner: &dyn FuseboxFs, path: &str, mask: i32) -> FsResult<()> {
        inner.access(path, mask)
    }

    fn chmod(
        &self,
        inner: &dyn FuseboxFs,
        path: &str,
        mode: u32,
        fi: Option<&FileInfo>,
    ) -> FsResult<()> {
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
        inner.utimens(path, atime, mtime, fi)
    }

    fn readlink(&self, inner: &dyn FuseboxFs, path: &str) -> FsResult<String> {
        inner.readlink(path)
    }

    fn symlink(&self, inner: &dyn FuseboxFs, target: &str, linkname: &str) -> FsResult<()> {
        inner.symlink(target, linkname)
    }

    fn mkdir(&self, inner: &dyn FuseboxFs, path: &str, mode: u32) -> FsResult<()> {
        inner.mkdir(path, mode)
    }

    fn opendir(&self, inner: &dyn FuseboxFs, path: &str, fi: &mut FileInfo) -> FsResult<()> {
        inner.opendir(path, fi)
    }

    fn readdir(&self, inner: &dyn FuseboxFs, path: &str) -> FsResult<Vec<DirEntry>> {
        inner.readdir(path)
    }

    fn releasedir(&self, inner: &dyn FuseboxFs, path: Option<&str>, fi: &FileInfo) -> FsResult<()> {
        inner.releasedir(path, fi)
    }

    fn rmdir(&self, inner: &dyn FuseboxFs, path: &str) -> FsResult<()> {
        inner.rmdir(path)
    }

    fn create(
        &self,
        inner: &dyn FuseboxFs,
        path: &str,
        mode: u32,
        fi: &mut FileInfo,
    ) -> FsResult<()> {
        inner.create(path, mode, fi)
    }

    fn open(&self, inner: &dyn FuseboxFs, path: &str, fi: &mut FileInfo) -> FsResult<()> {
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
        inner.write(path, data, offset, fi)
    }

    fn truncate(
        &self,
        inner: &dyn FuseboxFs,
        path: &str,
        size: u64,
        fi: Option<&FileInfo>,
    ) -> FsResult<()> {
        inner.truncate(path, size, fi)
    }

    fn release(&self, inner: &dyn FuseboxFs, path: &str, fi: &FileInfo) -> FsResult<()> {
        inner.release(path, fi)
    }

    fn unlink(&self, inner: &dyn FuseboxFs, path: &str) -> FsResult<()> {
        inner.unlink(path)
    }

    fn rename(
        &self,
        inner: &dyn FuseboxFs,
        old_path: &str,
        new_path: &str,
        flags: u32,
    ) -> FsResult<()> {
        inner.rename(old_path, new_path, flags)
    }

    fn destroy(&self, inner: &dyn FuseboxFs) {
        inner.destroy()
    }

    fn flush(&self, inner: &dyn FuseboxFs, path: &str, fi: &FileInfo) -> FsResult<()> {
        inner.flush(path, fi)
    }

    fn fsync(
        &self,
        inner: &dyn FuseboxFs,
        path: &str,
        datasync: bool,
        fi: &FileInfo,
    ) -> FsResult<()> {
        inner.fsync(path, datasync, fi)
    }

    fn fsyncdir(
        &self,
        inner: &dyn FuseboxFs,
        path: Option<&str>,
        datasync: bool,
        fi: &FileInfo,
    ) -> FsResult<()> {
        inner.fsyncdir(path, datasync, fi)
    }
}

/// A layer stacked on an inner store.
pub struct Decorated<L> {
    layer: L,
    inner: Box<dyn FuseboxFs>,
}

impl<L: Layer> Decorated<L> {
    pub fn new(layer: L, inner: Box<dyn FuseboxFs>) -> Self {
        Self { layer, inner }
    }

    pub fn layer(&self) -> &L {
        &self.layer
    }

    pub fn inner(&self) -> &dyn FuseboxFs {
        self.inner.as_ref()
    }
}

impl<L: Layer> FuseboxFs for Decorated<L> {
    fn supported_operations(&self) -> OperationSet {
        self.layer.supported_operations(self.inner.as_ref())
    }

    fn init(&self, conn: &mut ConnectionSettings) {
        debug!(target: "fusebox::layer", layer = type_name::<L>(), "initializing");
        self.layer.init(self.inner.as_ref(), conn)
    }

    fn statfs(&self, path: &str) -> FsResult<StatvfsData> {
        self.layer.statfs(self.inner.as_ref(), path)
    }

    fn getattr(&self, path: &str, fi: Option<&FileInfo>) -> FsResult<FileAttributes> {
        self.layer.getattr(self.inner.as_ref(), path, fi)
    }

    fn getxattr(&self, path: &str, name: &str) -> FsResult<Vec<u8>> {
        self.layer.getxattr(self.inner.as_ref(), path, name)
    }

    fn setxattr(&self, path: &str, name: &str, value: &[u8], flags: i32) -> FsResult<()> {
        self.layer.setxattr(self.inner.as_ref(), path, name, value, flags)
    }

    fn listxattr(&self, path: &str) -> FsResult<Vec<String>> {
        self.layer.listxattr(self.inner.as_ref(), path)
    }

    fn removexattr(&self, path: &str, name: &str) -> FsResult<()> {
        self.layer.removexattr(self.inner.as_ref(), path, name)
    }

    fn access(&self, path: &str, mask: i32) -> FsResult<()> {
        self.layer.access(self.inner.as_ref(), path, mask)
    }

    fn chmod(&self, path: &str, mode: u32, fi: Option<&FileInfo>) -> FsResult<()> {
        self.layer.chmod(self.inner.as_ref(), path, mode, fi)
    }

    fn chown(&self, path: &str, uid: u32, gid: u32, fi: Option<&FileInfo>) -> FsResult<()> {
        self.layer.chown(self.inner.as_ref(), path, uid, gid, fi)
    }

    fn utimens(
        &self,
        path: &str,
        atime: TimeSpec,
        mtime: TimeSpec,
        fi: Option<&FileInfo>,
    ) -> FsResult<()> {
        self.layer.utimens(self.inner.as_ref(), path, atime, mtime, fi)
    }

    fn readlink(&self, path: &str) -> FsResult<String> {
        self.layer.readlink(self.inner.as_ref(), path)
    }

    fn symlink(&self, target: &str, linkname: &str) -> FsResult<()> {
        self.layer.symlink(self.inner.as_ref(), target, linkname)
    }

    fn mkdir(&self, path: &str, mode: u32) -> FsResult<()> {
        self.layer.mkdir(self.inner.as_ref(), path, mode)
    }

    fn opendir(&self, path: &str, fi: &mut FileInfo) -> FsResult<()> {
        self.layer.opendir(self.inner.as_ref(), path, fi)
    }

    fn readdir(&self, path: &str) -> FsResult<Vec<DirEntry>> {
        self.layer.readdir(self.inner.as_ref(), path)
    }

    fn releasedir(&self, path: Option<&str>, fi: &FileInfo) -> FsResult<()> {
        self.layer.releasedir(self.inner.as_ref(), path, fi)
    }

    fn rmdir(&self, path: &str) -> FsResult<()> {
        self.layer.rmdir(self.inner.as_ref(), path)
    }

    fn create(&self, path: &str, mode: u32, fi: &mut FileInfo) -> FsResult<()> {
        self.layer.create(self.inner.as_ref(), path, mode, fi)
    }

    fn open(&self, path: &str, fi: &mut FileInfo) -> FsResult<()> {
        self.layer.open(self.inner.as_ref(), path, fi)
    }

    fn read(&self, path: &str, buf: &mut [u8], offset: u64, fi: &FileInfo) -> FsResult<usize> {
        self.layer.read(self.inner.as_ref(), path, buf, offset, fi)
    }

    fn write(&self, path: &str, data: &[u8], offset: u64, fi: &FileInfo) -> FsResult<usize> {
        self.layer.write(self.inner.as_ref(), path, data, offset, fi)
    }

    fn truncate(&self, path: &str, size: u64, fi: Option<&FileInfo>) -> FsResult<()> {
        self.layer.truncate(self.inner.as_ref(), path, size, fi)
    }

    fn release(&self, path: &str, fi: &FileInfo) -> FsResult<()> {
        self.layer.release(self.inner.as_ref(), path, fi)
    }

    fn unlink(&self, path: &str) -> FsResult<()> {
        self.layer.unlink(self.inner.as_ref(), path)
    }

    fn rename(&self, old_path: &str, new_path: &str, flags: u32) -> FsResult<()> {
        self.layer.rename(self.inner.as_ref(), old_path, new_path, flags)
    }

    fn destroy(&self) {
        self.layer.destroy(self.inner.as_ref())
    }

    fn flush(&self, path: &str, fi: &FileInfo) -> FsResult<()> {
        self.layer.flush(self.inner.as_ref(), path, fi)
    }

    fn fsync(&self, path: &str, datasync: bool, fi: &FileInfo) -> FsResult<()> {
        self.layer.fsync(self.inner.as_ref(), path, datasync, fi)
    }

    fn fsyncdir(&self, path: Option<&str>, datasync: bool, fi: &FileInfo) -> FsResult<()> {
        self.layer.fsyncdir(self.inner.as_ref(), path, datasync, fi)
    }
}

/// Layer whose behavior applies only to paths it selects.
///
/// Each operation checks [`SelectiveLayer::should_decorate`] and dispatches to
/// the matching `decorated_*` method, or straight to the inner store.
/// Operations that must change regardless of jurisdiction override the
/// undecorated entry point instead.
pub trait SelectiveLayer: Send + Sync {
    fn should_decorate(&self, inner: &dyn FuseboxFs, path: &str) -> bool;

    fn supported_operations(&self, inner: &dyn FuseboxFs) -> OperationSet {
        inner.supported_operations()
    }

    fn statfs(&self, inner: &dyn FuseboxFs, path: &str) -> FsResult<StatvfsData> {
        if self.should_decorate(inner, path) {
            self.decorated_statfs(inner, path)
        } else {
            inner.statfs(path)
        }
    }

    fn decorated_statfs(&self, inner: &dyn FuseboxFs, path: &str) -> FsResult<StatvfsData> {
        inner.statfs(path)
    }

    fn getattr(
        &self,
        inner: &dyn FuseboxFs,
        path: &str,
        fi: Option<&FileInfo>,
    ) -> FsResult<FileAttributes> {
        if self.should_decorate(inner, path) {
            self.decorated_getattr(inner, path, fi)
        } else {
            inner.getattr(path, fi)
        }
    }

    fn decorated_getattr(
        &self,
        inner: &dyn FuseboxFs,
        path: &str,
        fi: Option<&FileInfo>,
    ) -> FsResult<FileAttributes> {
        inner.getattr(path, fi)
    }

    fn getxattr(&self, inner: &dyn FuseboxFs, path: &str, name: &str) -> FsResult<Vec<u8>> {
        if self.should_decorate(inner, path) {
            self.decorated_getxattr(inner, path, name)
        } else {
            inner.getxattr(path, name)
        }
    }

    fn decorated_getxattr(
        &self,
        inner: &dyn FuseboxFs,
        path: &str,
        name: &str,
    ) -> FsResult<Vec<u8>> {
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
        if self.should_decorate(inner, path) {
            self.decorated_setxattr(inner, path, name, value, flags)
        } else {
            inner.setxattr(path, name, value, flags)
        }
    }

    fn decorated_setxattr(
        &self,
        inner: &dyn FuseboxFs,
        path: &str,
        name: &str,
        value: &[u8],
        flags: i32,
    ) -> FsResult<()> {
        inner.setxattr(path, name, value, flags)
    }

    fn listxattr(&self, inner: &dyn FuseboxFs, path: &str) -> FsResult<Vec<String>> {
        if self.should_decorate(inner, path) {
            self.decorated_listxattr(inner, path)
        } else {
            inner.listxattr(path)
        }
    }

    fn decorated_listxattr(&self, inner: &dyn FuseboxFs, path: &str) -> FsResult<Vec<String>> {
        inner.listxattr(path)
    }

    fn removexattr(&self, inner: &dyn FuseboxFs, path: &str, name: &str) -> FsResult<()> {
        if self.should_decorate(inner, path) {
            self.decorated_removexattr(inner, path, name)
        } else {
            inner.removexattr(path, name)
        }
    }

    fn decorated_removexattr(&self, inner: &dyn FuseboxFs, path: &str, name: &str) -> FsResult<()> {
        inner.removexattr(path, name)
    }

    fn access(&self, inner: &dyn FuseboxFs, path: &str, mask: i32) -> FsResult<()> {
        if self.should_decorate(inner, path) {
            self.decorated_access(inner, path, mask)
        } else {
            inner.access(path, mask)
        }
    }

    fn decorated_access(&self, inner: &dyn FuseboxFs, path: &str, mask: i32) -> FsResult<()> {
        inner.access(path, mask)
    }

    fn chmod(
        &self,
        inner: &dyn FuseboxFs,
        path: &str,
        mode: u32,
        fi: Option<&FileInfo>,
    ) -> FsResult<()> {
        if self.should_decorate(inner, path) {
            self.decorated_chmod(inner, path, mode, fi)
        } else {
            inner.chmod(path, mode, fi)
        }
    }

    fn decorated_chmod(
        &self,
        inner: &dyn FuseboxFs,
        path: &str,
        mode: u32,
        fi: Option<&FileInfo>,
    ) -> FsResult<()> {
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
        if self.should_decorate(inner, path) {
            self.decorated_chown(inner, path, uid, gid, fi)
        } else {
            inner.chown(path, uid, gid, fi)
        }
    }

    fn decorated_chown(
        &self,
        inner: &dyn FuseboxFs,
        path: &str,
        uid: u32,
        gid: u32,
        fi: Option<&FileInfo>,
    ) -> FsResult<()> {
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
        if self.should_decorate(inner, path) {
            self.decorated_utimens(inner, path, atime, mtime, fi)
        } else {
            inner.utimens(path, atime, mtime, fi)
        }
    }

    fn decorated_utimens(
        &self,
        inner: &dyn FuseboxFs,
        path: &str,
        atime: TimeSpec,
        mtime: TimeSpec,
        fi: Option<&FileInfo>,
    ) -> FsResult<()> {
        inner.utimens(path, atime, mtime, fi)
    }

    fn readlink(&self, inner: &dyn FuseboxFs, path: &str) -> FsResult<String> {
        if self.should_decorate(inner, path) {
            self.decorated_readlink(inner, path)
        } else {
            inner.readlink(path)
        }
    }

    fn decorated_readlink(&self, inner: &dyn FuseboxFs, path: &str) -> FsResult<String> {
        inner.readlink(path)
    }

    /// Jurisdiction is decided on the link path, not the target.
    fn symlink(&self, inner: &dyn FuseboxFs, target: &str, linkname: &str) -> FsResult<()> {
        if self.should_decorate(inner, linkname) {
            self.decorated_symlink(inner, target, linkname)
        } else {
            inner.symlink(target, linkname)
        }
    }

    fn decorated_symlink(&self, inner: &dyn FuseboxFs, target: &str, linkname: &str) -> FsResult<()> {
        inner.symlink(target, linkname)
    }

    fn mkdir(&self, inner: &dyn FuseboxFs, path: &str, mode: u32) -> FsResult<()> {
        if self.should_decorate(inner, path) {
            self.decorated_mkdir(inner, path, mode)
        } else {
            inner.mkdir(path, mode)
        }
    }

    fn decorated_mkdir(&self, inner: &dyn FuseboxFs, path: &str, mode: u32) -> FsResult<()> {
        inner.mkdir(path, mode)
    }

    fn opendir(&self, inner: &dyn FuseboxFs, path: &str, fi: &mut FileInfo) -> FsResult<()> {
        if self.should_decorate(inner, path) {
            self.decorated_opendir(inner, path, fi)
        } else {
            inner.opendir(path, fi)
        }
    }

    fn decorated_opendir(
        &self,
        inner: &dyn FuseboxFs,
        path: &str,
        fi: &mut FileInfo,
    ) -> FsResult<()> {
        inner.opendir(path, fi)
    }

    fn readdir(&self, inner: &dyn FuseboxFs, path: &str) -> FsResult<Vec<DirEntry>> {
        if self.should_decorate(inner, path) {
            self.decorated_readdir(inner, path)
        } else {
            inner.readdir(path)
        }
    }

    fn decorated_readdir(&self, inner: &dyn FuseboxFs, path: &str) -> FsResult<Vec<DirEntry>> {
        inner.readdir(path)
    }

    fn releasedir(&self, inner: &dyn FuseboxFs, path: Option<&str>, fi: &FileInfo) -> FsResult<()> {
        match path {
            Some(p) if self.should_decorate(inner, p) => self.decorated_releasedir(inner, path, fi),
            _ => inner.releasedir(path, fi),
        }
    }

    fn decorated_releasedir(
        &self,
        inner: &dyn FuseboxFs,
        path: Option<&str>,
        fi: &FileInfo,
    ) -> FsResult<()> {
        inner.releasedir(path, fi)
    }

    fn rmdir(&self, inner: &dyn FuseboxFs, path: &str) -> FsResult<()> {
        if self.should_decorate(inner, path) {
            self.decorated_rmdir(inner, path)
        } else {
            inner.rmdir(path)
        }
    }

    fn decorated_rmdir(&self, inner: &dyn FuseboxFs, path: &str) -> FsResult<()> {
        inner.rmdir(path)
    }

    fn create(
        &self,
        inner: &dyn FuseboxFs,
        path: &str,
        mode: u32,
        fi: &mut FileInfo,
    ) -> FsResult<()> {
        if self.should_decorate(inner, path) {
            self.decorated_create(inner, path, mode, fi)
        } else {
            inner.create(path, mode, fi)
        }
    }

    fn decorated_create(
        &self,
        inner: &dyn FuseboxFs,
        path: &str,
        mode: u32,
        fi: &mut FileInfo,
    ) -> FsResult<()> {
        inner.create(path, mode, fi)
    }

    fn open(&self, inner: &dyn FuseboxFs, path: &str, fi: &mut FileInfo) -> FsResult<()> {
        if self.should_decorate(inner, path) {
            self.decorated_open(inner, path, fi)
        } else {
            inner.open(path, fi)
        }
    }

    fn decorated_open(&self, inner: &dyn FuseboxFs, path: &str, fi: &mut FileInfo) -> FsResult<()> {
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
        if self.should_decorate(inner, path) {
            self.decorated_read(inner, path, buf, offset, fi)
        } else {
            inner.read(path, buf, offset, fi)
        }
    }

    fn decorated_read(
        &self,
        inner: &dyn FuseboxFs,
        path: &str,
        buf: &mut [u8],
        offset: u64,
        fi: &FileInfo,
    ) -> FsResult<usize> {
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
        if self.should_decorate(inner, path) {
            self.decorated_write(inner, path, data, offset, fi)
        } else {
            inner.write(path, data, offset, fi)
        }
    }

    fn decorated_write(
        &self,
        inner: &dyn FuseboxFs,
        path: &str,
        data: &[u8],
        offset: u64,
        fi: &FileInfo,
    ) -> FsResult<usize> {
        inner.write(path, data, offset, fi)
    }

    fn truncate(
        &self,
        inner: &dyn FuseboxFs,
        path: &str,
        size: u64,
        fi: Option<&FileInfo>,
    ) -> FsResult<()> {
        if self.should_decorate(inner, path) {
            self.decorated_truncate(inner, path, size, fi)
        } else {
            inner.truncate(path, size, fi)
        }
    }

    fn decorated_truncate(
        &self,
        inner: &dyn FuseboxFs,
        path: &str,
        size: u64,
        fi: Option<&FileInfo>,
    ) -> FsResult<()> {
        inner.truncate(path, size, fi)
    }

    fn release(&self, inner: &dyn FuseboxFs, path: &str, fi: &FileInfo) -> FsResult<()> {
        if self.should_decorate(inner, path) {
            self.decorated_release(inner, path, fi)
        } else {
            inner.release(path, fi)
        }
    }

    fn decorated_release(&self, inner: &dyn FuseboxFs, path: &str, fi: &FileInfo) -> FsResult<()> {
        inner.release(path, fi)
    }

    fn unlink(&self, inner: &dyn FuseboxFs, path: &str) -> FsResult<()> {
        if self.should_decorate(inner, path) {
            self.decorated_unlink(inner, path)
        } else {
            inner.unlink(path)
        }
    }

    fn decorated_unlink(&self, inner: &dyn FuseboxFs, path: &str) -> FsResult<()> {
        inner.unlink(path)
    }

    /// Decorated when either path is in jurisdiction.
    fn rename(
        &self,
        inner: &dyn FuseboxFs,
        old_path: &str,
        new_path: &str,
        flags: u32,
    ) -> FsResult<()> {
        if self.should_decorate(inner, old_path) || self.should_decorate(inner, new_path) {
            self.decorated_rename(inner, old_path, new_path, flags)
        } else {
            inner.rename(old_path, new_path, flags)
        }
    }

    fn decorated_rename(
        &self,
        inner: &dyn FuseboxFs,
        old_path: &str,
        new_path: &str,
        flags: u32,
    ) -> FsResult<()> {
        inner.rename(old_path, new_path, flags)
    }

    fn flush(&self, inner: &dyn FuseboxFs, path: &str, fi: &FileInfo) -> FsResult<()> {
        if self.should_decorate(inner, path) {
            self.decorated_flush(inner, path, fi)
        } else {
            inner.flush(path, fi)
        }
    }

    fn decorated_flush(&self, inner: &dyn FuseboxFs, path: &str, fi: &FileInfo) -> FsResult<()> {
        inner.flush(path, fi)
    }

    fn fsync(
        &self,
        inner: &dyn FuseboxFs,
        path: &str,
        datasync: bool,
        fi: &FileInfo,
    ) -> FsResult<()> {
        if self.should_decorate(inner, path) {
            self.decorated_fsync(inner, path, datasync, fi)
        } else {
            inner.fsync(path, datasync, fi)
        }
    }

    fn decorated_fsync(
        &self,
        inner: &dyn FuseboxFs,
        path: &str,
        datasync: bool,
        fi: &FileInfo,
    ) -> FsResult<()> {
        inner.fsync(path, datasync, fi)
    }

    fn fsyncdir(
        &self,
        inner: &dyn FuseboxFs,
        path: Option<&str>,
        datasync: bool,
        fi: &FileInfo,
    ) -> FsResult<()> {
        match path {
            Some(p) if self.should_decorate(inner, p) => {
                self.decorated_fsyncdir(inner, path, datasync, fi)
            }
            _ => inner.fsyncdir(path, datasync, fi),
        }
    }

    fn decorated_fsyncdir(
        &self,
        inner: &dyn FuseboxFs,
        path: Option<&str>,
        datasync: bool,
        fi: &FileInfo,
    ) -> FsResult<()> {
        inner.fsyncdir(path, datasync, fi)
    }
}

/// Adapts a [`SelectiveLayer`] into a [`Layer`].
pub struct Selective<S>(pub S);

impl<S: SelectiveLayer> Layer for Selective<S> {
    fn supported_operations(&self, inner: &dyn FuseboxFs) -> OperationSet {
        self.0.supported_operations(inner)
    }

    fn statfs(&self, inner: &dyn FuseboxFs, path: &str) -> FsResult<StatvfsData> {
        self.0.statfs(inner, path)
    }

    fn getattr(
        &self,
        inner: &dyn FuseboxFs,
        path: &str,
        fi: Option<&FileInfo>,
    ) -> FsResult<FileAttributes> {
        self.0.getattr(inner, path, fi)
    }

    fn getxattr(&self, inner: &dyn FuseboxFs, path: &str, name: &str) -> FsResult<Vec<u8>> {
        self.0.getxattr(inner, path, name)
    }

    fn setxattr(
        &self,
        inner: &dyn FuseboxFs,
        path: &str,
        name: &str,
        value: &[u8],
        flags: i32,
    ) -> FsResult<()> {
        self.0.setxattr(inner, path, name, value, flags)
    }

    fn listxattr(&self, inner: &dyn FuseboxFs, path: &str) -> FsResult<Vec<String>> {
        self.0.listxattr(inner, path)
    }

    fn removexattr(&self, inner: &dyn FuseboxFs, path: &str, name: &str) -> FsResult<()> {
        self.0.removexattr(inner, path, name)
    }

    fn access(&self, inner: &dyn FuseboxFs, path: &str, mask: i32) -> FsResult<()> {
        self.0.access(inner, path, mask)
    }

    fn chmod(
        &self,
        inner: &dyn FuseboxFs,
        path: &str,
        mode: u32,
        fi: Option<&FileInfo>,
    ) -> FsResult<()> {
        self.0.chmod(inner, path, mode, fi)
    }

    fn chown(
        &self,
        inner: &dyn FuseboxFs,
        path: &str,
        uid: u32,
        gid: u32,
        fi: Option<&FileInfo>,
    ) -> FsResult<()> {
        self.0.chown(inner, path, uid, gid, fi)
    }

    fn utimens(
        &self,
        inner: &dyn FuseboxFs,
        path: &str,
        atime: TimeSpec,
        mtime: TimeSpec,
        fi: Option<&FileInfo>,
    ) -> FsResult<()> {
        self.0.utimens(inner, path, atime, mtime, fi)
    }

    fn readlink(&self, inner: &dyn FuseboxFs, path: &str) -> FsResult<String> {
        self.0.readlink(inner, path)
    }

    fn symlink(&self, inner: &dyn FuseboxFs, target: &str, linkname: &str) -> FsResult<()> {
        self.0.symlink(inner, target, linkname)
    }

    fn mkdir(&self, inner: &dyn FuseboxFs, path: &str, mode: u32) -> FsResult<()> {
        self.0.mkdir(inner, path, mode)
    }

    fn opendir(&self, inner: &dyn FuseboxFs, path: &str, fi: &mut FileInfo) -> FsResult<()> {
        self.0.opendir(inner, path, fi)
    }

    fn readdir(&self, inner: &dyn FuseboxFs, path: &str) -> FsResult<Vec<DirEntry>> {
        self.0.readdir(inner, path)
    }

    fn releasedir(&self, inner: &dyn FuseboxFs, path: Option<&str>, fi: &FileInfo) -> FsResult<()> {
        self.0.releasedir(inner, path, fi)
    }

    fn rmdir(&self, inner: &dyn FuseboxFs, path: &str) -> FsResult<()> {
        self.0.rmdir(inner, path)
    }

    fn create(
        &self,
        inner: &dyn FuseboxFs,
        path: &str,
        mode: u32,
        fi: &mut FileInfo,
    ) -> FsResult<()> {
        self.0.create(inner, path, mode, fi)
    }

    fn open(&self, inner: &dyn FuseboxFs, path: &str, fi: &mut FileInfo) -> FsResult<()> {
        self.0.open(inner, path, fi)
    }

    fn read(
        &self,
        inner: &dyn FuseboxFs,
        path: &str,
        buf: &mut [u8],
        offset: u64,
        fi: &FileInfo,
    ) -> FsResult<usize> {
        self.0.read(inner, path, buf, offset, fi)
    }

    fn write(
        &self,
        inner: &dyn FuseboxFs,
        path: &str,
        data: &[u8],
        offset: u64,
        fi: &FileInfo,
    ) -> FsResult<usize> {
        self.0.write(inner, path, data, offset, fi)
    }

    fn truncate(
        &self,
        inner: &dyn FuseboxFs,
        path: &str,
        size: u64,
        fi: Option<&FileInfo>,
    ) -> FsResult<()> {
        self.0.truncate(inner, path, size, fi)
    }

    fn release(&self, inner: &dyn FuseboxFs, path: &str, fi: &FileInfo) -> FsResult<()> {
        self.0.release(inner, path, fi)
    }

    fn unlink(&self, inner: &dyn FuseboxFs, path: &str) -> FsResult<()> {
        self.0.unlink(inner, path)
    }

    fn rename(
        &self,
        inner: &dyn FuseboxFs,
        old_path: &str,
        new_path: &str,
        flags: u32,
    ) -> FsResult<()> {
        self.0.rename(inner, old_path, new_path, flags)
    }

    fn flush(&self, inner: &dyn FuseboxFs, path: &str, fi: &FileInfo) -> FsResult<()> {
        self.0.flush(inner, path, fi)
    }

    fn fsync(
        &self,
        inner: &dyn FuseboxFs,
        path: &str,
        datasync: bool,
        fi: &FileInfo,
    ) -> FsResult<()> {
        self.0.fsync(inner, path, datasync, fi)
    }

    fn fsyncdir(
        &self,
        inner: &dyn FuseboxFs,
        path: Option<&str>,
        datasync: bool,
        fi: &FileInfo,
    ) -> FsResult<()> {
        self.0.fsyncdir(inner, path, datasync, fi)
    }
}
