// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Bidirectional renaming of path segments.
//!
//! Paths arriving from the kernel are "mount" paths; paths handed to the inner
//! store are "orig" paths. Each direction has a selector, tested on the
//! relative path accumulated so far, and a function applied to the selected
//! segment. Only selected segments change, so renaming a directory does not
//! rename everything below it.

use std::collections::HashSet;
use std::sync::Arc;

use crate::decorate::Layer;
use crate::error::{FsError, FsResult};
use crate::fs::{child_path, child_relative, relative, FuseboxFs};
use crate::transform::{NameFn, PathPredicate};
use crate::types::{DirEntry, FileAttributes, FileInfo, StatvfsData, TimeSpec};

#[derive(Clone)]
pub struct NameMapper {
    orig_selector: PathPredicate,
    to_mount: NameFn,
    mount_selector: PathPredicate,
    to_orig: NameFn,
    relative_links: bool,
}

impl NameMapper {
    /// `orig_selector`/`to_mount` apply to names coming out of the store,
    /// `mount_selector`/`to_orig` to names going into it.
    pub fn new(
        orig_selector: PathPredicate,
        to_mount: NameFn,
        mount_selector: PathPredicate,
        to_orig: NameFn,
    ) -> Self {
        Self {
            orig_selector,
            to_mount,
            mount_selector,
            to_orig,
            relative_links: false,
        }
    }

    /// Shows `<prefix>name` entries as `name`, for stores whose every entry carries the prefix.
    pub fn strip_prefix(prefix: &str) -> Self {
        let out = prefix.to_string();
        let back = prefix.to_string();
        let test = prefix.to_string();
        Self::new(
            Arc::new(move |rel: &str| last_segment(rel).starts_with(test.as_str())),
            Arc::new(move |name: &str| name.strip_prefix(out.as_str()).unwrap_or(name).to_string()),
            Arc::new(|_: &str| true),
            Arc::new(move |name: &str| format!("{back}{name}")),
        )
    }

    /// Shows every `name` as `<prefix>name`; the inverse of [`NameMapper::strip_prefix`].
    pub fn add_prefix(prefix: &str) -> Self {
        let out = prefix.to_string();
        let back = prefix.to_string();
        let test = prefix.to_string();
        Self::new(
            Arc::new(|_: &str| true),
            Arc::new(move |name: &str| format!("{out}{name}")),
            Arc::new(move |rel: &str| last_segment(rel).starts_with(test.as_str())),
            Arc::new(move |name: &str| name.strip_prefix(back.as_str()).unwrap_or(name).to_string()),
        )
    }

    /// Also rewrite relative symlink targets read through this layer.
    pub fn translating_relative_link_targets(mut self) -> Self {
        self.relative_links = true;
        self
    }

    /// Original name of the mount-side segment at `mount_rel`.
    pub fn unmap(&self, mount_rel: &str, name: &str) -> String {
        if (self.mount_selector)(mount_rel) {
            (self.to_orig)(name)
        } else {
            name.to_string()
        }
    }

    /// Mount-side name of the original segment at `orig_rel`.
    pub fn map(&self, orig_rel: &str, name: &str) -> String {
        if (self.orig_selector)(orig_rel) {
            (self.to_mount)(name)
        } else {
            name.to_string()
        }
    }

    pub fn to_orig_path(&self, mount_path: &str) -> String {
        self.translate(mount_path, |prefix, seg| self.unmap(prefix, seg))
    }

    pub fn to_mount_path(&self, orig_path: &str) -> String {
        self.translate(orig_path, |prefix, seg| self.map(prefix, seg))
    }

    /// Rewrites every segment, feeding `f` the source-side relative prefix ending in that segment.
    fn translate(&self, path: &str, f: impl Fn(&str, &str) -> String) -> String {
        let rel = relative(path);
        if rel.is_empty() {
            return "/".to_string();
        }
        let mut out = String::with_capacity(path.len() + 8);
        let mut prefix_end = 0;
        for seg in rel.split('/') {
            prefix_end += seg.len();
            out.push('/');
            out.push_str(&f(&rel[..prefix_end], seg));
            prefix_end += 1;
        }
        out
    }
}

fn last_segment(rel: &str) -> &str {
    rel.rsplit('/').next().unwrap_or(rel)
}

fn parent_path(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(idx) => &path[..idx],
    }
}

/// Resolves `.` and `..` in an absolute path. `None` if it climbs above root.
fn normalize(path: &str) -> Option<String> {
    let mut segments: Vec<&str> = Vec::new();
    for seg in path.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                segments.pop()?;
            }
            other => segments.push(other),
        }
    }
    Some(format!("/{}", segments.join("/")))
}

/// Relative path leading from directory `from_dir` to `to`. Both absolute and normalized.
fn relativize(from_dir: &str, to: &str) -> String {
    let from: Vec<&str> = relative(from_dir).split('/').filter(|s| !s.is_empty()).collect();
    let to: Vec<&str> = relative(to).split('/').filter(|s| !s.is_empty()).collect();
    let common = from.iter().zip(&to).take_while(|(a, b)| a == b).count();
    let mut parts: Vec<&str> = vec![".."; from.len() - common];
    parts.extend(&to[common..]);
    if parts.is_empty() {
        ".".to_string()
    } else {
        parts.join("/")
    }
}

pub struct Renamed {
    mapper: NameMapper,
}

impl Renamed {
    pub fn new(mapper: NameMapper) -> Self {
        Self { mapper }
    }

    fn orig(&self, path: &str) -> String {
        self.mapper.to_orig_path(path)
    }

    fn translate_link_target(&self, mount_path: &str, orig_path: &str, target: String) -> String {
        if target.starts_with('/') {
            return target;
        }
        let joined = format!("{}/{}", parent_path(orig_path), target);
        match normalize(&joined) {
            Some(resolved) => {
                let mount_target = self.mapper.to_mount_path(&resolved);
                relativize(parent_path(mount_path), &mount_target)
            }
            None => target,
        }
    }
}

impl Layer for Renamed {
    fn statfs(&self, inner: &dyn FuseboxFs, path: &str) -> FsResult<StatvfsData> {
        inner.statfs(&self.orig(path))
    }

    fn getattr(
        &self,
        inner: &dyn FuseboxFs,
        path: &str,
        fi: Option<&FileInfo>,
    ) -> FsResult<FileAttributes> {
        inner.getattr(&self.orig(path), fi)
    }

    fn getxattr(&self, inner: &dyn FuseboxFs, path: &str, name: &str) -> FsResult<Vec<u8>> {
        inner.getxattr(&self.orig(path), name)
    }

    fn setxattr(
        &self,
        inner: &dyn FuseboxFs,
        path: &str,
        name: &str,
        value: &[u8],
        flags: i32,
    ) -> FsResult<()> {
        inner.setxattr(&self.orig(path), name, value, flags)
    }

    fn listxattr(&self, inner: &dyn FuseboxFs, path: &str) -> FsResult<Vec<String>> {
        inner.listxattr(&self.orig(path))
    }

    fn removexattr(&self, inner: &dyn FuseboxFs, path: &str, name: &str) -> FsResult<()> {
        inner.removexattr(&self.orig(path), name)
    }

    fn access(&self, inner: &dyn FuseboxFs, path: &str, mask: i32) -> FsResult<()> {
        inner.access(&self.orig(path), mask)
    }

    fn chmod(
        &self,
        inner: &dyn FuseboxFs,
        path: &str,
        mode: u32,
        fi: Option<&FileInfo>,
    ) -> FsResult<()> {
        inner.chmod(&self.orig(path), mode, fi)
    }

    fn chown(
        &self,
        inner: &dyn FuseboxFs,
        path: &str,
        uid: u32,
        gid: u32,
        fi: Option<&FileInfo>,
    ) -> FsResult<()> {
        inner.chown(&self.orig(path), uid, gid, fi)
    }

    fn utimens(
        &self,
        inner: &dyn FuseboxFs,
        path: &str,
        atime: TimeSpec,
        mtime: TimeSpec,
        fi: Option<&FileInfo>,
    ) -> FsResult<()> {
        inner.utimens(&self.orig(path), atime, mtime, fi)
    }

    fn readlink(&self, inner: &dyn FuseboxFs, path: &str) -> FsResult<String> {
        let orig = self.orig(path);
        let target = inner.readlink(&orig)?;
        if self.mapper.relative_links {
            Ok(self.translate_link_target(path, &orig, target))
        } else {
            Ok(target)
        }
    }

    // The target is stored verbatim.
    fn symlink(&self, inner: &dyn FuseboxFs, target: &str, linkname: &str) -> FsResult<()> {
        inner.symlink(target, &self.orig(linkname))
    }

    fn mkdir(&self, inner: &dyn FuseboxFs, path: &str, mode: u32) -> FsResult<()> {
        inner.mkdir(&self.orig(path), mode)
    }

    fn opendir(&self, inner: &dyn FuseboxFs, path: &str, fi: &mut FileInfo) -> FsResult<()> {
        inner.opendir(&self.orig(path), fi)
    }

    fn readdir(&self, inner: &dyn FuseboxFs, path: &str) -> FsResult<Vec<DirEntry>> {
        let orig = self.orig(path);
        let orig_rel = relative(&orig);
        let entries = inner.readdir(&orig)?;
        let mut seen = HashSet::with_capacity(entries.len());
        let mut out = Vec::with_capacity(entries.len());
        for entry in entries {
            let visible = self.mapper.map(&child_relative(orig_rel, &entry.name), &entry.name);
            if !seen.insert(visible.clone()) {
                return Err(FsError::illegal_state(format!(
                    "name mapping produced duplicate entry {} in {}",
                    child_path(path, &visible),
                    path
                )));
            }
            out.push(entry.with_name(visible));
        }
        Ok(out)
    }

    fn releasedir(&self, inner: &dyn FuseboxFs, path: Option<&str>, fi: &FileInfo) -> FsResult<()> {
        let orig = path.map(|p| self.orig(p));
        inner.releasedir(orig.as_deref(), fi)
    }

    fn rmdir(&self, inner: &dyn FuseboxFs, path: &str) -> FsResult<()> {
        inner.rmdir(&self.orig(path))
    }

    fn create(
        &self,
        inner: &dyn FuseboxFs,
        path: &str,
        mode: u32,
        fi: &mut FileInfo,
    ) -> FsResult<()> {
        inner.create(&self.orig(path), mode, fi)
    }

    fn open(&self, inner: &dyn FuseboxFs, path: &str, fi: &mut FileInfo) -> FsResult<()> {
        inner.open(&self.orig(path), fi)
    }

    fn read(
        &self,
        inner: &dyn FuseboxFs,
        path: &str,
        buf: &mut [u8],
        offset: u64,
        fi: &FileInfo,
    ) -> FsResult<usize> {
        inner.read(&self.orig(path), buf, offset, fi)
    }

    fn write(
        &self,
        inner: &dyn FuseboxFs,
        path: &str,
        data: &[u8],
        offset: u64,
        fi: &FileInfo,
    ) -> FsResult<usize> {
        inner.write(&self.orig(path), data, offset, fi)
    }

    fn truncate(
        &self,
        inner: &dyn FuseboxFs,
        path: &str,
        size: u64,
        fi: Option<&FileInfo>,
    ) -> FsResult<()> {
        inner.truncate(&self.orig(path), size, fi)
    }

    fn release(&self, inner: &dyn FuseboxFs, path: &str, fi: &FileInfo) -> FsResult<()> {
        inner.release(&self.orig(path), fi)
    }

    fn unlink(&self, inner: &dyn FuseboxFs, path: &str) -> FsResult<()> {
        inner.unlink(&self.orig(path))
    }

    fn rename(
        &self,
        inner: &dyn FuseboxFs,
        old_path: &str,
        new_path: &str,
        flags: u32,
    ) -> FsResult<()> {
        inner.rename(&self.orig(old_path), &self.orig(new_path), flags)
    }

    fn flush(&self, inner: &dyn FuseboxFs, path: &str, fi: &FileInfo) -> FsResult<()> {
        inner.flush(&self.orig(path), fi)
    }

    fn fsync(
        &self,
        inner: &dyn FuseboxFs,
        path: &str,
        datasync: bool,
        fi: &FileInfo,
    ) -> FsResult<()> {
        inner.fsync(&self.orig(path), datasync, fi)
    }

    fn fsyncdir(
        &self,
        inner: &dyn FuseboxFs,
        path: Option<&str>,
        datasync: bool,
        fi: &FileInfo,
    ) -> FsResult<()> {
        let orig = path.map(|p| self.orig(p));
        inner.fsyncdir(orig.as_deref(), datasync, fi)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingFs;
    use crate::transform::FuseboxFsExt;

    /// Renames `orig*` segments to `mnt*` directly under `dir`, and back.
    fn dir_mapper() -> NameMapper {
        fn child_of_dir(rel: &str, prefix: &str) -> bool {
            rel.strip_prefix("dir/")
                .is_some_and(|rest| !rest.contains('/') && rest.starts_with(prefix))
        }
        NameMapper::new(
            Arc::new(|rel: &str| child_of_dir(rel, "orig")),
            Arc::new(|name: &str| name.replacen("orig", "mnt", 1)),
            Arc::new(|rel: &str| child_of_dir(rel, "mnt")),
            Arc::new(|name: &str| name.replacen("mnt", "orig", 1)),
        )
    }

    fn names(entries: Vec<DirEntry>) -> Vec<String> {
        let mut names: Vec<_> = entries.into_iter().map(|e| e.name).collect();
        names.sort();
        names
    }

    #[test]
    fn inbound_paths_are_mapped_segment_by_segment() {
        let inner = RecordingFs::new().with_file("/dir/orig1/mnt.txt", b"x");
        let calls = inner.calls();
        let fs = inner.map_file_names(dir_mapper());

        fs.getattr("/dir/mnt1/mnt.txt", None).unwrap();
        assert_eq!(*calls.lock().unwrap(), vec!["getattr:/dir/orig1/mnt.txt"]);
    }

    #[test]
    fn listings_are_mapped_per_child() {
        let fs = RecordingFs::new()
            .with_file("/dir/orig1", b"")
            .with_file("/dir/other", b"")
            .with_file("/orig_top", b"")
            .map_file_names(dir_mapper());

        assert_eq!(names(fs.readdir("/dir").unwrap()), vec!["mnt1", "other"]);
        assert_eq!(names(fs.readdir("/").unwrap()), vec!["dir", "orig_top"]);
    }

    #[test]
    fn colliding_names_fail_fatally() {
        let fs = RecordingFs::new()
            .with_file("/.a", b"")
            .with_file("/a", b"")
            .map_file_names(NameMapper::strip_prefix("."));
        match fs.readdir("/") {
            Err(FsError::IllegalState(msg)) => assert!(msg.contains("/a"), "{msg}"),
            other => panic!("expected illegal state, got {other:?}"),
        }
    }

    #[test]
    fn map_then_unmap_is_identity() {
        let mapper = dir_mapper();
        for (rel, name) in [("dir/orig7", "orig7"), ("dir/plain", "plain"), ("orig", "orig")] {
            let visible = mapper.map(rel, name);
            let visible_rel = format!("{}{}", &rel[..rel.len() - name.len()], visible);
            assert_eq!(mapper.unmap(&visible_rel, &visible), name, "{rel}");
        }
        let hidden = NameMapper::strip_prefix(".");
        assert_eq!(hidden.unmap("x", &hidden.map(".x", ".x")), ".x");
        assert_eq!(hidden.to_mount_path(&hidden.to_orig_path("/a/b")), "/a/b");
    }

    #[test]
    fn symlink_targets_are_left_alone_by_default() {
        let inner = RecordingFs::new().with_symlink("/.docs/.link", "../.hello.txt");
        let calls = inner.calls();
        let fs = inner.map_file_names(NameMapper::strip_prefix("."));

        assert_eq!(fs.readlink("/docs/link").unwrap(), "../.hello.txt");
        fs.symlink("raw-target", "/docs/new").unwrap();
        assert_eq!(
            *calls.lock().unwrap(),
            vec!["readlink:/.docs/.link", "symlink:raw-target->/.docs/.new"]
        );
    }

    #[test]
    fn relative_targets_can_be_translated() {
        let fs = RecordingFs::new()
            .with_symlink("/.docs/.link", "../.hello.txt")
            .with_symlink("/.docs/.abs", "/.hello.txt")
            .with_symlink("/.docs/.escape", "../../x")
            .map_file_names(NameMapper::strip_prefix(".").translating_relative_link_targets());

        assert_eq!(fs.readlink("/docs/link").unwrap(), "../hello.txt");
        assert_eq!(fs.readlink("/docs/abs").unwrap(), "/.hello.txt");
        assert_eq!(fs.readlink("/docs/escape").unwrap(), "../../x");
    }

    #[test]
    fn add_prefix_is_the_inverse_of_strip_prefix() {
        let inner = RecordingFs::new().with_file("/dir/a.txt", b"a");
        let calls = inner.calls();
        let fs = inner.map_file_names(NameMapper::add_prefix("x-"));

        assert_eq!(names(fs.readdir("/x-dir").unwrap()), vec!["x-a.txt"]);
        fs.getattr("/x-dir/x-a.txt", None).unwrap();
        assert_eq!(calls.lock().unwrap().last().unwrap(), "getattr:/dir/a.txt");
    }

    #[test]
    fn rename_maps_both_paths() {
        let inner = RecordingFs::new().with_file("/.a", b"");
        let calls = inner.calls();
        let fs = inner.map_file_names(NameMapper::strip_prefix("."));
        fs.rename("/a", "/b", 0).unwrap();
        assert_eq!(*calls.lock().unwrap(), vec!["rename:/.a->/.b"]);
    }

    #[test]
    fn path_helpers() {
        assert_eq!(normalize("/a/./b/../c").as_deref(), Some("/a/c"));
        assert_eq!(normalize("/a/../.."), None);
        assert_eq!(relativize("/docs", "/hello.txt"), "../hello.txt");
        assert_eq!(relativize("/", "/a/b"), "a/b");
        assert_eq!(relativize("/a/b", "/a/b"), ".");
    }
}
