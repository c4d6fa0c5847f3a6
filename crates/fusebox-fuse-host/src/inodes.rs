// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Inode numbers for the path-addressed chain.
//!
//! The kernel speaks inodes while every layer speaks paths. Each inode keeps
//! the path it was last known by; a path maps to at most one inode. Entries
//! live until the kernel forgets every lookup of them.

use std::collections::HashMap;
use std::ffi::OsStr;

use fusebox_core::fs::child_path;
use libc::c_int;

pub const ROOT_INO: u64 = 1;

/// Longest single path component accepted from the kernel.
pub const NAME_MAX: usize = 255;

/// Checks a component received from the kernel.
pub fn component(name: &OsStr) -> Result<&str, c_int> {
    if name.len() > NAME_MAX {
        return Err(libc::ENAMETOOLONG);
    }
    name.to_str().ok_or(libc::EINVAL)
}

struct Node {
    path: String,
    lookups: u64,
}

pub struct InodeTable {
    nodes: HashMap<u64, Node>,
    by_path: HashMap<String, u64>,
    next_ino: u64,
}

impl Default for InodeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl InodeTable {
    pub fn new() -> Self {
        let mut table = Self {
            nodes: HashMap::new(),
            by_path: HashMap::new(),
            next_ino: ROOT_INO + 1,
        };
        table.insert(ROOT_INO, "/".to_string());
        table
    }

    fn insert(&mut self, ino: u64, path: String) {
        self.by_path.insert(path.clone(), ino);
        self.nodes.insert(ino, Node { path, lookups: 0 });
    }

    pub fn path(&self, ino: u64) -> Option<&str> {
        self.nodes.get(&ino).map(|node| node.path.as_str())
    }

    pub fn ino(&self, path: &str) -> Option<u64> {
        self.by_path.get(path).copied()
    }

    pub fn child(&self, parent: u64, name: &str) -> Option<String> {
        self.path(parent).map(|dir| child_path(dir, name))
    }

    fn allocate(&mut self) -> u64 {
        let ino = self.next_ino;
        self.next_ino += 1;
        ino
    }

    /// Inode number for a directory listing entry. Untracked paths get a
    /// fresh number that is never stored.
    pub fn listing_ino(&mut self, path: &str) -> u64 {
        match self.ino(path) {
            Some(ino) => ino,
            None => self.allocate(),
        }
    }

    /// Inode for `path`, counting one kernel lookup.
    pub fn lookup(&mut self, path: &str) -> u64 {
        let ino = match self.ino(path) {
            Some(ino) => ino,
            None => {
                let ino = self.allocate();
                self.insert(ino, path.to_string());
                ino
            }
        };
        if let Some(node) = self.nodes.get_mut(&ino) {
            node.lookups += 1;
        }
        ino
    }

    /// Drops `count` lookups; the inode disappears when none remain.
    pub fn forget(&mut self, ino: u64, count: u64) {
        if ino == ROOT_INO {
            return;
        }
        let Some(node) = self.nodes.get_mut(&ino) else {
            return;
        };
        node.lookups = node.lookups.saturating_sub(count);
        if node.lookups > 0 {
            return;
        }
        if let Some(node) = self.nodes.remove(&ino) {
            if self.by_path.get(&node.path) == Some(&ino) {
                self.by_path.remove(&node.path);
            }
        }
    }

    /// Unbinds `path` after unlink or rmdir. Open handles keep the inode.
    pub fn detach(&mut self, path: &str) {
        self.by_path.remove(path);
    }

    /// Moves `old` and everything below it to `new`.
    pub fn rename(&mut self, old: &str, new: &str) {
        self.detach(new);
        let prefix = format!("{old}/");
        let moved: Vec<(String, u64)> = self
            .by_path
            .iter()
            .filter(|(path, _)| path.as_str() == old || path.starts_with(&prefix))
            .map(|(path, ino)| (path.clone(), *ino))
            .collect();
        for (path, ino) in moved {
            self.by_path.remove(&path);
            let renamed = format!("{new}{}", &path[old.len()..]);
            if let Some(node) = self.nodes.get_mut(&ino) {
                node.path = renamed.clone();
            }
            self.by_path.insert(renamed, ino);
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;
    use std::os::unix::ffi::OsStringExt;

    #[test]
    fn root_is_preallocated() {
        let mut table = InodeTable::new();
        assert_eq!(table.path(ROOT_INO), Some("/"));
        assert_eq!(table.child(ROOT_INO, "a").as_deref(), Some("/a"));
        table.forget(ROOT_INO, 10);
        assert_eq!(table.path(ROOT_INO), Some("/"));
    }

    #[test]
    fn lookups_are_stable_and_counted() {
        let mut table = InodeTable::new();
        let a = table.lookup("/a");
        assert_eq!(table.lookup("/a"), a);
        assert_ne!(table.lookup("/b"), a);

        table.forget(a, 1);
        assert_eq!(table.path(a), Some("/a"));
        table.forget(a, 1);
        assert_eq!(table.path(a), None);
        assert_eq!(table.ino("/a"), None);
    }

    #[test]
    fn rename_moves_descendants() {
        let mut table = InodeTable::new();
        let dir = table.lookup("/d");
        let file = table.lookup("/d/f");
        let sibling = table.lookup("/dx");

        table.rename("/d", "/e");
        assert_eq!(table.path(dir), Some("/e"));
        assert_eq!(table.path(file), Some("/e/f"));
        assert_eq!(table.path(sibling), Some("/dx"));
        assert_eq!(table.ino("/e/f"), Some(file));
        assert_eq!(table.ino("/d/f"), None);
    }

    #[test]
    fn rename_over_existing_unbinds_the_target() {
        let mut table = InodeTable::new();
        let a = table.lookup("/a");
        let b = table.lookup("/b");
        table.rename("/a", "/b");
        assert_eq!(table.ino("/b"), Some(a));
        // The replaced inode keeps its old path for open handles.
        assert_eq!(table.path(b), Some("/b"));
        table.forget(b, 1);
        assert_eq!(table.ino("/b"), Some(a));
    }

    #[test]
    fn listing_entries_are_not_retained() {
        let mut table = InodeTable::new();
        let known = table.lookup("/known");
        assert_eq!(table.listing_ino("/known"), known);

        let transient = table.listing_ino("/listed");
        assert_ne!(transient, known);
        assert_eq!(table.ino("/listed"), None);
        assert_eq!(table.len(), 2);
        assert_ne!(table.lookup("/listed"), transient);
    }

    #[test]
    fn detached_paths_get_fresh_inodes() {
        let mut table = InodeTable::new();
        let old = table.lookup("/f");
        table.detach("/f");
        assert_eq!(table.path(old), Some("/f"));
        assert_ne!(table.lookup("/f"), old);
    }

    #[test]
    fn components_are_validated() {
        assert_eq!(component(OsStr::new("ok")), Ok("ok"));
        let long = "x".repeat(NAME_MAX + 1);
        assert_eq!(component(OsStr::new(&long)), Err(libc::ENAMETOOLONG));
        let raw = OsString::from_vec(vec![0x66, 0xff]);
        assert_eq!(component(&raw), Err(libc::EINVAL));
    }
}
