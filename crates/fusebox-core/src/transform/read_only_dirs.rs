// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Freezes the entry set of selected directories.
//!
//! Entries inside a selected directory cannot be created, removed or renamed,
//! and the directory itself reports no write bits. Existing files inside stay
//! writable; only the namespace is frozen.

use crate::decorate::SelectiveLayer;
use crate::error::{FsError, FsResult};
use crate::fs::{parent_relative, relative, FuseboxFs};
use crate::transform::PathPredicate;
use crate::types::{FileAttributes, FileInfo};

pub struct ReadOnlyDirs {
    selector: PathPredicate,
}

impl ReadOnlyDirs {
    pub fn new(selector: PathPredicate) -> Self {
        Self { selector }
    }

    fn is_selected_dir(&self, inner: &dyn FuseboxFs, path: &str) -> bool {
        (self.selector)(relative(path))
            && inner
                .getattr(path, None)
                .map(|attrs| attrs.is_directory())
                .unwrap_or(false)
    }
}

impl SelectiveLayer for ReadOnlyDirs {
    /// Children of selected directories. Root has no parent and is never selected.
    fn should_decorate(&self, _inner: &dyn FuseboxFs, path: &str) -> bool {
        path != "/" && (self.selector)(parent_relative(path))
    }

    fn getattr(
        &self,
        inner: &dyn FuseboxFs,
        path: &str,
        fi: Option<&FileInfo>,
    ) -> FsResult<FileAttributes> {
        let attrs = inner.getattr(path, fi)?;
        if attrs.is_directory() && (self.selector)(relative(path)) {
            Ok(attrs.read_only())
        } else {
            Ok(attrs)
        }
    }

    fn setxattr(
        &self,
        inner: &dyn FuseboxFs,
        path: &str,
        name: &str,
        value: &[u8],
        flags: i32,
    ) -> FsResult<()> {
        if self.is_selected_dir(inner, path) {
            return Err(FsError::AccessDenied);
        }
        inner.setxattr(path, name, value, flags)
    }

    fn removexattr(&self, inner: &dyn FuseboxFs, path: &str, name: &str) -> FsResult<()> {
        if self.is_selected_dir(inner, path) {
            return Err(FsError::AccessDenied);
        }
        inner.removexattr(path, name)
    }

    fn access(&self, inner: &dyn FuseboxFs, path: &str, mask: i32) -> FsResult<()> {
        if mask & libc::W_OK != 0 && self.is_selected_dir(inner, path) {
            return Err(FsError::AccessDenied);
        }
        inner.access(path, mask)
    }

    fn decorated_symlink(&self, _inner: &dyn FuseboxFs, _target: &str, _linkname: &str) -> FsResult<()> {
        Err(FsError::AccessDenied)
    }

    fn decorated_mkdir(&self, _inner: &dyn FuseboxFs, _path: &str, _mode: u32) -> FsResult<()> {
        Err(FsError::AccessDenied)
    }

    fn decorated_rmdir(&self, _inner: &dyn FuseboxFs, _path: &str) -> FsResult<()> {
        Err(FsError::AccessDenied)
    }

    fn decorated_create(
        &self,
        _inner: &dyn FuseboxFs,
        _path: &str,
        _mode: u32,
        _fi: &mut FileInfo,
    ) -> FsResult<()> {
        Err(FsError::AccessDenied)
    }

    fn decorated_unlink(&self, _inner: &dyn FuseboxFs, _path: &str) -> FsResult<()> {
        Err(FsError::AccessDenied)
    }

    fn decorated_rename(
        &self,
        _inner: &dyn FuseboxFs,
        _old_path: &str,
        _new_path: &str,
        _flags: u32,
    ) -> FsResult<()> {
        Err(FsError::AccessDenied)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::testing::RecordingFs;
    use crate::transform::FuseboxFsExt;

    fn store() -> RecordingFs {
        RecordingFs::new()
            .with_file("/frozen/a.txt", b"a")
            .with_dir("/frozen/sub")
            .with_file("/open/b.txt", b"b")
            .with_file("/frozen.txt", b"f")
    }

    fn frozen() -> PathPredicate {
        Arc::new(|rel: &str| rel == "frozen" || rel == "frozen.txt")
    }

    #[test]
    fn namespace_changes_inside_selected_dirs_are_denied() {
        let inner = store();
        let calls = inner.calls();
        let fs = inner.with_read_only_dirs(frozen());
        let mut fi = FileInfo::default();

        assert!(matches!(fs.create("/frozen/new", 0o644, &mut fi), Err(FsError::AccessDenied)));
        assert!(matches!(fs.mkdir("/frozen/d", 0o755), Err(FsError::AccessDenied)));
        assert!(matches!(fs.rmdir("/frozen/sub"), Err(FsError::AccessDenied)));
        assert!(matches!(fs.unlink("/frozen/a.txt"), Err(FsError::AccessDenied)));
        assert!(matches!(fs.symlink("x", "/frozen/l"), Err(FsError::AccessDenied)));
        assert!(matches!(fs.rename("/frozen/a.txt", "/open/a.txt", 0), Err(FsError::AccessDenied)));
        assert!(matches!(fs.rename("/open/b.txt", "/frozen/b.txt", 0), Err(FsError::AccessDenied)));
        assert!(calls.lock().unwrap().is_empty());
    }

    #[test]
    fn siblings_and_file_contents_are_unaffected() {
        let fs = store().with_read_only_dirs(frozen());
        let mut fi = FileInfo::default();

        fs.create("/open/c.txt", 0o644, &mut fi).unwrap();
        fs.unlink("/open/b.txt").unwrap();
        fs.write("/frozen/a.txt", b"A", 0, &fi).unwrap();
        fs.mkdir("/other", 0o755).unwrap();
    }

    #[test]
    fn selected_dirs_report_no_write_bits() {
        let fs = store().with_read_only_dirs(frozen());
        assert_eq!(fs.getattr("/frozen", None).unwrap().perms, 0o555);
        assert_eq!(fs.getattr("/frozen.txt", None).unwrap().perms, 0o644);
        assert_eq!(fs.getattr("/open", None).unwrap().perms, 0o755);
        assert_eq!(fs.getattr("/frozen/a.txt", None).unwrap().perms, 0o644);
    }

    #[test]
    fn xattrs_and_write_access_on_selected_dirs_are_denied() {
        let fs = store()
            .with_xattr("/frozen", "user.k", b"v")
            .with_read_only_dirs(frozen());

        assert!(matches!(fs.setxattr("/frozen", "user.k", b"w", 0), Err(FsError::AccessDenied)));
        assert!(matches!(fs.removexattr("/frozen", "user.k"), Err(FsError::AccessDenied)));
        assert!(matches!(fs.access("/frozen", libc::W_OK), Err(FsError::AccessDenied)));
        fs.access("/frozen", libc::R_OK | libc::X_OK).unwrap();
        assert_eq!(fs.getxattr("/frozen", "user.k").unwrap(), b"v");
        fs.setxattr("/frozen.txt", "user.k", b"w", 0).unwrap();
    }

    #[test]
    fn root_itself_is_never_in_jurisdiction() {
        let inner = store();
        let calls = inner.calls();
        let fs = inner.with_read_only_dirs(Arc::new(|rel: &str| rel.is_empty()));

        assert!(matches!(fs.mkdir("/top", 0o755), Err(FsError::AccessDenied)));
        assert_eq!(fs.getattr("/", None).unwrap().perms, 0o555);
        fs.mkdir("/open/deeper", 0o755).unwrap();
        let _ = fs.rmdir("/");
        assert!(calls.lock().unwrap().iter().any(|c| c == "rmdir:/"));
    }
}
