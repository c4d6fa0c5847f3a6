// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Test doubles for layers and adapters.
//!
//! [`RecordingFs`] is an in-memory tree that supports every operation and
//! records each call as `"<op>:<path>"`, so tests can assert both what a layer
//! returns and what it forwarded.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{FsError, FsResult};
use crate::fs::{FuseboxFs, RENAME_NOREPLACE};
use crate::ops::OperationSet;
use crate::types::{DirEntry, FileAttributes, FileInfo, FileType, StatvfsData, TimeSpec};

#[derive(Clone, Debug)]
enum NodeKind {
    Dir,
    File(Vec<u8>),
    Link(String),
}

#[derive(Clone, Debug)]
struct Node {
    kind: NodeKind,
    perms: u32,
    xattrs: BTreeMap<String, Vec<u8>>,
}

impl Node {
    fn new(kind: NodeKind) -> Self {
        let perms = match kind {
            NodeKind::Dir => 0o755,
            NodeKind::File(_) => 0o644,
            NodeKind::Link(_) => 0o777,
        };
        Self {
            kind,
            perms,
            xattrs: BTreeMap::new(),
        }
    }
}

pub type CallLog = Arc<Mutex<Vec<String>>>;

pub struct RecordingFs {
    nodes: Mutex<BTreeMap<String, Node>>,
    calls: CallLog,
    next_fh: AtomicU64,
    supported: OperationSet,
}

impl Default for RecordingFs {
    fn default() -> Self {
        Self::new()
    }
}

fn parent_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(idx) => &path[..idx],
    }
}

fn is_descendant(path: &str, ancestor: &str) -> bool {
    path.len() > ancestor.len()
        && path.starts_with(ancestor)
        && (ancestor == "/" || path.as_bytes()[ancestor.len()] == b'/')
}

impl RecordingFs {
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert("/".to_string(), Node::new(NodeKind::Dir));
        Self {
            nodes: Mutex::new(nodes),
            calls: Arc::new(Mutex::new(Vec::new())),
            next_fh: AtomicU64::new(1),
            supported: OperationSet::all(),
        }
    }

    pub fn with_dir(self, path: &str) -> Self {
        self.insert(path, NodeKind::Dir);
        self
    }

    pub fn with_file(self, path: &str, content: &[u8]) -> Self {
        self.insert(path, NodeKind::File(content.to_vec()));
        self
    }

    pub fn with_symlink(self, path: &str, target: &str) -> Self {
        self.insert(path, NodeKind::Link(target.to_string()));
        self
    }

    pub fn with_xattr(self, path: &str, name: &str, value: &[u8]) -> Self {
        if let Some(node) = self.lock().get_mut(path) {
            node.xattrs.insert(name.to_string(), value.to_vec());
        }
        self
    }

    /// Narrows the declared operations without changing behavior.
    pub fn with_supported(mut self, supported: OperationSet) -> Self {
        self.supported = supported;
        self
    }

    /// Shared handle on the call log; stays valid after the store is moved into a chain.
    pub fn calls(&self) -> CallLog {
        Arc::clone(&self.calls)
    }

    fn insert(&self, path: &str, kind: NodeKind) {
        let mut nodes = self.lock();
        let mut dir = parent_of(path);
        let mut missing = Vec::new();
        while !nodes.contains_key(dir) {
            missing.push(dir.to_string());
            dir = parent_of(dir);
        }
        for d in missing {
            nodes.insert(d, Node::new(NodeKind::Dir));
        }
        nodes.insert(path.to_string(), Node::new(kind));
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Node>> {
        self.nodes.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, entry: String) {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(entry);
    }

    fn with_node<T>(&self, path: &str, f: impl FnOnce(&mut Node) -> FsResult<T>) -> FsResult<T> {
        let mut nodes = self.lock();
        let node = nodes.get_mut(path).ok_or(FsError::NotFound)?;
        f(node)
    }

    fn create_node(&self, path: &str, kind: NodeKind) -> FsResult<()> {
        let mut nodes = self.lock();
        if nodes.contains_key(path) {
            return Err(FsError::AlreadyExists);
        }
        match nodes.get(parent_of(path)).map(|n| &n.kind) {
            Some(NodeKind::Dir) => {}
            Some(_) => return Err(FsError::NotADirectory),
            None => return Err(FsError::NotFound),
        }
        nodes.insert(path.to_string(), Node::new(kind));
        Ok(())
    }

    fn next_handle(&self) -> u64 {
        self.next_fh.fetch_add(1, Ordering::SeqCst) + 1
    }
}

impl FuseboxFs for RecordingFs {
    fn supported_operations(&self) -> OperationSet {
        self.supported
    }

    fn statfs(&self, path: &str) -> FsResult<StatvfsData> {
        self.record(format!("statfs:{path}"));
        Ok(StatvfsData {
            bsize: 4096,
            frsize: 4096,
            blocks: 1024,
            bfree: 512,
            bavail: 512,
            name_max: 255,
        })
    }

    fn getattr(&self, path: &str, _fi: Option<&FileInfo>) -> FsResult<FileAttributes> {
        self.record(format!("getattr:{path}"));
        self.with_node(path, |node| {
            let (file_type, size) = match &node.kind {
                NodeKind::Dir => (FileType::Directory, 0),
                NodeKind::File(data) => (FileType::RegularFile, data.len() as u64),
                NodeKind::Link(target) => (FileType::Symlink, target.len() as u64),
            };
            Ok(FileAttributes::minimal(file_type, size).with_perms(node.perms))
        })
    }

    fn getxattr(&self, path: &str, name: &str) -> FsResult<Vec<u8>> {
        self.record(format!("getxattr:{path}"));
        self.with_node(path, |node| node.xattrs.get(name).cloned().ok_or(FsError::NoAttribute))
    }

    fn setxattr(&self, path: &str, name: &str, value: &[u8], _flags: i32) -> FsResult<()> {
        self.record(format!("setxattr:{path}"));
        self.with_node(path, |node| {
            node.xattrs.insert(name.to_string(), value.to_vec());
            Ok(())
        })
    }

    fn listxattr(&self, path: &str) -> FsResult<Vec<String>> {
        self.record(format!("listxattr:{path}"));
        self.with_node(path, |node| Ok(node.xattrs.keys().cloned().collect()))
    }

    fn removexattr(&self, path: &str, name: &str) -> FsResult<()> {
        self.record(format!("removexattr:{path}"));
        self.with_node(path, |node| {
            node.xattrs.remove(name).map(|_| ()).ok_or(FsError::NoAttribute)
        })
    }

    fn access(&self, path: &str, _mask: i32) -> FsResult<()> {
        self.record(format!("access:{path}"));
        self.with_node(path, |_| Ok(()))
    }

    fn chmod(&self, path: &str, mode: u32, _fi: Option<&FileInfo>) -> FsResult<()> {
        self.record(format!("chmod:{path}"));
        self.with_node(path, |node| {
            node.perms = mode & 0o777;
            Ok(())
        })
    }

    fn chown(&self, path: &str, _uid: u32, _gid: u32, _fi: Option<&FileInfo>) -> FsResult<()> {
        self.record(format!("chown:{path}"));
        self.with_node(path, |_| Ok(()))
    }

    fn utimens(
        &self,
        path: &str,
        _atime: TimeSpec,
        _mtime: TimeSpec,
        _fi: Option<&FileInfo>,
    ) -> FsResult<()> {
        self.record(format!("utimens:{path}"));
        self.with_node(path, |_| Ok(()))
    }

    fn readlink(&self, path: &str) -> FsResult<String> {
        self.record(format!("readlink:{path}"));
        self.with_node(path, |node| match &node.kind {
            NodeKind::Link(target) => Ok(target.clone()),
            _ => Err(FsError::InvalidArgument),
        })
    }

    fn symlink(&self, target: &str, linkname: &str) -> FsResult<()> {
        self.record(format!("symlink:{target}->{linkname}"));
        self.create_node(linkname, NodeKind::Link(target.to_string()))
    }

    fn mkdir(&self, path: &str, _mode: u32) -> FsResult<()> {
        self.record(format!("mkdir:{path}"));
        self.create_node(path, NodeKind::Dir)
    }

    fn opendir(&self, path: &str, _fi: &mut FileInfo) -> FsResult<()> {
        self.record(format!("opendir:{path}"));
        self.with_node(path, |node| match node.kind {
            NodeKind::Dir => Ok(()),
            _ => Err(FsError::NotADirectory),
        })
    }

    fn readdir(&self, path: &str) -> FsResult<Vec<DirEntry>> {
        self.record(format!("readdir:{path}"));
        let nodes = self.lock();
        match nodes.get(path).map(|n| &n.kind) {
            Some(NodeKind::Dir) => {}
            Some(_) => return Err(FsError::NotADirectory),
            None => return Err(FsError::NotFound),
        }
        Ok(nodes
            .keys()
            .filter(|p| p.as_str() != "/" && parent_of(p) == path)
            .map(|p| DirEntry::new(&p[p.rfind('/').map_or(0, |i| i + 1)..]))
            .collect())
    }

    fn releasedir(&self, path: Option<&str>, _fi: &FileInfo) -> FsResult<()> {
        self.record(format!("releasedir:{}", path.unwrap_or("")));
        Ok(())
    }

    fn rmdir(&self, path: &str) -> FsResult<()> {
        self.record(format!("rmdir:{path}"));
        let mut nodes = self.lock();
        match nodes.get(path).map(|n| &n.kind) {
            Some(NodeKind::Dir) => {}
            Some(_) => return Err(FsError::NotADirectory),
            None => return Err(FsError::NotFound),
        }
        if nodes.keys().any(|p| is_descendant(p, path)) {
            return Err(FsError::NotEmpty);
        }
        nodes.remove(path);
        Ok(())
    }

    fn create(&self, path: &str, _mode: u32, fi: &mut FileInfo) -> FsResult<()> {
        self.record(format!("create:{path}"));
        self.create_node(path, NodeKind::File(Vec::new()))?;
        fi.fh = self.next_handle();
        Ok(())
    }

    fn open(&self, path: &str, fi: &mut FileInfo) -> FsResult<()> {
        self.record(format!("open:{path}"));
        self.with_node(path, |node| match node.kind {
            NodeKind::Dir => Err(FsError::IsADirectory),
            _ => Ok(()),
        })?;
        fi.fh = self.next_handle();
        Ok(())
    }

    fn read(&self, path: &str, buf: &mut [u8], offset: u64, _fi: &FileInfo) -> FsResult<usize> {
        self.record(format!("read:{path}"));
        self.with_node(path, |node| match &node.kind {
            NodeKind::File(data) => {
                let start = (offset as usize).min(data.len());
                let n = buf.len().min(data.len() - start);
                buf[..n].copy_from_slice(&data[start..start + n]);
                Ok(n)
            }
            _ => Err(FsError::IsADirectory),
        })
    }

    fn write(&self, path: &str, bytes: &[u8], offset: u64, _fi: &FileInfo) -> FsResult<usize> {
        self.record(format!("write:{path}"));
        self.with_node(path, |node| match &mut node.kind {
            NodeKind::File(data) => {
                let end = offset as usize + bytes.len();
                if data.len() < end {
                    data.resize(end, 0);
                }
                data[offset as usize..end].copy_from_slice(bytes);
                Ok(bytes.len())
            }
            _ => Err(FsError::IsADirectory),
        })
    }

    fn truncate(&self, path: &str, size: u64, _fi: Option<&FileInfo>) -> FsResult<()> {
        self.record(format!("truncate:{path}"));
        self.with_node(path, |node| match &mut node.kind {
            NodeKind::File(data) => {
                data.resize(size as usize, 0);
                Ok(())
            }
            _ => Err(FsError::IsADirectory),
        })
    }

    fn release(&self, path: &str, _fi: &FileInfo) -> FsResult<()> {
        self.record(format!("release:{path}"));
        Ok(())
    }

    fn unlink(&self, path: &str) -> FsResult<()> {
        self.record(format!("unlink:{path}"));
        let mut nodes = self.lock();
        match nodes.get(path).map(|n| &n.kind) {
            Some(NodeKind::Dir) => Err(FsError::IsADirectory),
            Some(_) => {
                nodes.remove(path);
                Ok(())
            }
            None => Err(FsError::NotFound),
        }
    }

    fn rename(&self, old_path: &str, new_path: &str, flags: u32) -> FsResult<()> {
        self.record(format!("rename:{old_path}->{new_path}"));
        let mut nodes = self.lock();
        if !nodes.contains_key(old_path) {
            return Err(FsError::NotFound);
        }
        if flags & RENAME_NOREPLACE != 0 && nodes.contains_key(new_path) {
            return Err(FsError::AlreadyExists);
        }
        let moved: Vec<String> = nodes
            .keys()
            .filter(|p| p.as_str() == old_path || is_descendant(p, old_path))
            .cloned()
            .collect();
        for path in moved {
            if let Some(node) = nodes.remove(&path) {
                let renamed = format!("{new_path}{}", &path[old_path.len()..]);
                nodes.insert(renamed, node);
            }
        }
        Ok(())
    }

    fn flush(&self, path: &str, _fi: &FileInfo) -> FsResult<()> {
        self.record(format!("flush:{path}"));
        Ok(())
    }

    fn fsync(&self, path: &str, _datasync: bool, _fi: &FileInfo) -> FsResult<()> {
        self.record(format!("fsync:{path}"));
        Ok(())
    }

    fn fsyncdir(&self, path: Option<&str>, _datasync: bool, _fi: &FileInfo) -> FsResult<()> {
        self.record(format!("fsyncdir:{}", path.unwrap_or("")));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parents_are_created_implicitly() {
        let fs = RecordingFs::new().with_file("/a/b/c.txt", b"x");
        let names: Vec<_> = fs.readdir("/a").unwrap().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["b"]);
        assert!(fs.getattr("/a/b", None).unwrap().is_directory());
    }

    #[test]
    fn rename_moves_descendants() {
        let fs = RecordingFs::new().with_file("/d/f", b"1");
        fs.rename("/d", "/e", 0).unwrap();
        assert!(fs.getattr("/e/f", None).is_ok());
        assert!(fs.getattr("/d/f", None).unwrap_err().is_not_found());
    }

    #[test]
    fn root_children_are_listed_without_prefix_confusion() {
        let fs = RecordingFs::new().with_file("/ab", b"").with_file("/a/x", b"");
        let mut names: Vec<_> = fs.readdir("/").unwrap().into_iter().map(|e| e.name).collect();
        names.sort();
        assert_eq!(names, vec!["a", "ab"]);
    }
}
