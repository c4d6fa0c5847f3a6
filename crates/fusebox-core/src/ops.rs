// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Operation names and capability declarations

use std::fmt;

use serde::{Deserialize, Serialize};

/// One filesystem callback a store or layer may implement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Init,
    Statfs,
    Getattr,
    Getxattr,
    Setxattr,
    Listxattr,
    Removexattr,
    Access,
    Chmod,
    Chown,
    Utimens,
    Readlink,
    Symlink,
    Mkdir,
    Opendir,
    Readdir,
    Releasedir,
    Rmdir,
    Create,
    Open,
    Read,
    Write,
    Truncate,
    Release,
    Unlink,
    Rename,
    Destroy,
    Flush,
    Fsync,
    Fsyncdir,
}

impl Operation {
    pub const ALL: [Operation; 30] = [
        Operation::Init,
        Operation::Statfs,
        Operation::Getattr,
        Operation::Getxattr,
        Operation::Setxattr,
        Operation::Listxattr,
        Operation::Removexattr,
        Operation::Access,
        Operation::Chmod,
        Operation::Chown,
        Operation::Utimens,
        Operation::Readlink,
        Operation::Symlink,
        Operation::Mkdir,
        Operation::Opendir,
        Operation::Readdir,
        Operation::Releasedir,
        Operation::Rmdir,
        Operation::Create,
        Operation::Open,
        Operation::Read,
        Operation::Write,
        Operation::Truncate,
        Operation::Release,
        Operation::Unlink,
        Operation::Rename,
        Operation::Destroy,
        Operation::Flush,
        Operation::Fsync,
        Operation::Fsyncdir,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Operation::Init => "init",
            Operation::Statfs => "statfs",
            Operation::Getattr => "getattr",
            Operation::Getxattr => "getxattr",
            Operation::Setxattr => "setxattr",
            Operation::Listxattr => "listxattr",
            Operation::Removexattr => "removexattr",
            Operation::Access => "access",
            Operation::Chmod => "chmod",
            Operation::Chown => "chown",
            Operation::Utimens => "utimens",
            Operation::Readlink => "readlink",
            Operation::Symlink => "symlink",
            Operation::Mkdir => "mkdir",
            Operation::Opendir => "opendir",
            Operation::Readdir => "readdir",
            Operation::Releasedir => "releasedir",
            Operation::Rmdir => "rmdir",
            Operation::Create => "create",
            Operation::Open => "open",
            Operation::Read => "read",
            Operation::Write => "write",
            Operation::Truncate => "truncate",
            Operation::Release => "release",
            Operation::Unlink => "unlink",
            Operation::Rename => "rename",
            Operation::Destroy => "destroy",
            Operation::Flush => "flush",
            Operation::Fsync => "fsync",
            Operation::Fsyncdir => "fsyncdir",
        }
    }

    fn bit(self) -> u32 {
        1 << (self as u32)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Set of operations a store declares as implemented.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct OperationSet(u32);

impl OperationSet {
    pub const fn empty() -> Self {
        OperationSet(0)
    }

    pub fn all() -> Self {
        Self::of(&Operation::ALL)
    }

    pub fn of(ops: &[Operation]) -> Self {
        ops.iter().fold(Self::empty(), |set, op| set.with(*op))
    }

    pub fn with(self, op: Operation) -> Self {
        OperationSet(self.0 | op.bit())
    }

    pub fn contains(self, op: Operation) -> bool {
        self.0 & op.bit() != 0
    }

    pub fn union(self, other: Self) -> Self {
        OperationSet(self.0 | other.0)
    }

    pub fn difference(self, other: Self) -> Self {
        OperationSet(self.0 & !other.0)
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn iter(self) -> impl Iterator<Item = Operation> {
        Operation::ALL.into_iter().filter(move |op| self.contains(*op))
    }
}

impl FromIterator<Operation> for OperationSet {
    fn from_iter<I: IntoIterator<Item = Operation>>(iter: I) -> Self {
        iter.into_iter().fold(Self::empty(), |set, op| set.with(op))
    }
}

impl fmt::Debug for OperationSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bits_are_distinct() {
        assert_eq!(OperationSet::all().len(), Operation::ALL.len());
    }

    #[test]
    fn set_algebra() {
        let rw = OperationSet::of(&[Operation::Read, Operation::Write]);
        let w = OperationSet::of(&[Operation::Write]);
        let r = rw.difference(w);
        assert!(r.contains(Operation::Read));
        assert!(!r.contains(Operation::Write));
        assert_eq!(r.union(w), rw);
        assert_eq!(rw.iter().collect::<Vec<_>>(), vec![Operation::Read, Operation::Write]);
        assert_eq!(format!("{r:?}"), "{Read}");
    }
}
