// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Value types shared by stores, layers and the kernel adapter

use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::error::{FsError, FsResult};

/// Mask selecting the file type bits of a mode.
pub const S_IFMT: u32 = 0o170000;

const SUID: u32 = 0o4000;
const SGID: u32 = 0o2000;
const STICKY: u32 = 0o1000;
const PERMS: u32 = 0o777;
const WRITE_BITS: u32 = 0o222;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileType {
    NamedPipe,
    CharDevice,
    Directory,
    BlockDevice,
    RegularFile,
    Symlink,
    Socket,
}

impl FileType {
    pub fn mask(self) -> u32 {
        match self {
            FileType::NamedPipe => 0o010000,
            FileType::CharDevice => 0o020000,
            FileType::Directory => 0o040000,
            FileType::BlockDevice => 0o060000,
            FileType::RegularFile => 0o100000,
            FileType::Symlink => 0o120000,
            FileType::Socket => 0o140000,
        }
    }

    pub fn from_mode(mode: u32) -> FsResult<Self> {
        match mode & S_IFMT {
            0o010000 => Ok(FileType::NamedPipe),
            0o020000 => Ok(FileType::CharDevice),
            0o040000 => Ok(FileType::Directory),
            0o060000 => Ok(FileType::BlockDevice),
            0o100000 => Ok(FileType::RegularFile),
            0o120000 => Ok(FileType::Symlink),
            0o140000 => Ok(FileType::Socket),
            _ => Err(FsError::InvalidArgument),
        }
    }
}

/// Metadata of one file. Immutable; derive changed copies with the `with_*` methods.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileAttributes {
    pub file_type: FileType,
    pub suid: bool,
    pub sgid: bool,
    pub sticky: bool,
    /// Permission bits, `0o777` at most.
    pub perms: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    pub crtime: Option<SystemTime>,
    pub atime: SystemTime,
    pub mtime: SystemTime,
    pub ctime: SystemTime,
}

impl FileAttributes {
    /// Root-owned, `0o555`, all timestamps now.
    pub fn minimal(file_type: FileType, size: u64) -> Self {
        let now = SystemTime::now();
        Self {
            file_type,
            suid: false,
            sgid: false,
            sticky: false,
            perms: 0o555,
            uid: 0,
            gid: 0,
            size,
            crtime: None,
            atime: now,
            mtime: now,
            ctime: now,
        }
    }

    /// Splits a raw mode into type, special bits and permissions.
    pub fn from_mode(mode: u32) -> FsResult<Self> {
        let file_type = FileType::from_mode(mode)?;
        Ok(Self {
            suid: mode & SUID != 0,
            sgid: mode & SGID != 0,
            sticky: mode & STICKY != 0,
            perms: mode & PERMS,
            ..Self::minimal(file_type, 0)
        })
    }

    pub fn mode(&self) -> u32 {
        let special = (if self.suid { SUID } else { 0 })
            | (if self.sgid { SGID } else { 0 })
            | (if self.sticky { STICKY } else { 0 });
        self.file_type.mask() | special | (self.perms & PERMS)
    }

    pub fn is_directory(&self) -> bool {
        self.file_type == FileType::Directory
    }

    pub fn read_only(&self) -> Self {
        self.with_perms(self.perms & !WRITE_BITS)
    }

    pub fn with_perms(&self, perms: u32) -> Self {
        Self {
            perms: perms & PERMS,
            ..self.clone()
        }
    }

    pub fn with_size(&self, size: u64) -> Self {
        Self {
            size,
            ..self.clone()
        }
    }

    pub fn with_owner(&self, uid: u32, gid: u32) -> Self {
        Self {
            uid,
            gid,
            ..self.clone()
        }
    }

    pub fn with_file_type(&self, file_type: FileType) -> Self {
        Self {
            file_type,
            ..self.clone()
        }
    }

    pub fn with_times(&self, atime: SystemTime, mtime: SystemTime, ctime: SystemTime) -> Self {
        Self {
            atime,
            mtime,
            ctime,
            ..self.clone()
        }
    }
}

/// Directory listing entry. Never `.` or `..`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DirEntry {
    pub name: String,
}

impl DirEntry {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn with_name(&self, name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatvfsData {
    pub bsize: u64,
    pub frsize: u64,
    pub blocks: u64,
    pub bfree: u64,
    pub bavail: u64,
    pub name_max: u32,
}

/// Open-file state carried by handle-bearing calls.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FileInfo {
    /// Handle id assigned by whichever layer served `open`/`create`.
    pub fh: u64,
    /// Open flags as passed to `open(2)`.
    pub flags: i32,
}

impl FileInfo {
    pub fn with_flags(flags: i32) -> Self {
        Self { fh: 0, flags }
    }

    pub fn has_write_intent(&self) -> bool {
        let accmode = self.flags & libc::O_ACCMODE;
        accmode == libc::O_WRONLY
            || accmode == libc::O_RDWR
            || self.flags & (libc::O_APPEND | libc::O_CREAT | libc::O_TRUNC) != 0
    }
}

/// Timestamp argument of `utimens`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimeSpec {
    Now,
    Omit,
    Set(SystemTime),
}

/// Connection knobs negotiated with the kernel during `init`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub max_background: Option<u16>,
    pub congestion_threshold: Option<u16>,
    pub max_write: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const TYPES: [FileType; 7] = [
        FileType::NamedPipe,
        FileType::CharDevice,
        FileType::Directory,
        FileType::BlockDevice,
        FileType::RegularFile,
        FileType::Symlink,
        FileType::Socket,
    ];

    #[test]
    fn mode_round_trips_for_every_type_and_special_bit() {
        for file_type in TYPES {
            for special in 0..8u32 {
                let attrs = FileAttributes {
                    suid: special & 4 != 0,
                    sgid: special & 2 != 0,
                    sticky: special & 1 != 0,
                    perms: 0o754,
                    ..FileAttributes::minimal(file_type, 0)
                };
                let mode = attrs.mode();
                assert_eq!(FileType::from_mode(mode).unwrap(), file_type);
                assert_eq!(mode & 0o7777, (special << 9) | 0o754);
                let back = FileAttributes::from_mode(mode).unwrap();
                assert_eq!(back.mode(), mode);
            }
        }
    }

    #[test]
    fn unknown_type_is_rejected() {
        assert!(matches!(FileType::from_mode(0o644), Err(FsError::InvalidArgument)));
    }

    #[test]
    fn read_only_clears_write_bits_only() {
        let attrs = FileAttributes::minimal(FileType::RegularFile, 3).with_perms(0o764);
        let ro = attrs.read_only();
        assert_eq!(ro.perms, 0o544);
        assert_eq!(attrs.perms, 0o764);
        assert_eq!(ro.size, 3);
    }

    #[test]
    fn write_intent_flags() {
        assert!(!FileInfo::with_flags(libc::O_RDONLY).has_write_intent());
        assert!(FileInfo::with_flags(libc::O_WRONLY).has_write_intent());
        assert!(FileInfo::with_flags(libc::O_RDWR).has_write_intent());
        assert!(FileInfo::with_flags(libc::O_RDONLY | libc::O_APPEND).has_write_intent());
        assert!(FileInfo::with_flags(libc::O_RDONLY | libc::O_TRUNC).has_write_intent());
        assert!(FileInfo::with_flags(libc::O_RDONLY | libc::O_CREAT).has_write_intent());
    }
}
