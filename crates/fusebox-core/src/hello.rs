// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Static in-memory store whose every name is dot-prefixed.
//!
//! Mounted behind `NameMapper::strip_prefix(".")` it shows a plain tree.

use crate::error::{FsError, FsResult};
use crate::fs::FuseboxFs;
use crate::ops::{Operation, OperationSet};
use crate::types::{DirEntry, FileAttributes, FileInfo, FileType};

pub const HELLO_PATH: &str = "/.hello.txt";
pub const DOCS_DIR: &str = "/.docs";
pub const README_PATH: &str = "/.docs/.readme.txt";

const HELLO_CONTENT: &[u8] = b"Hello from a hidden file!\n";
const README_CONTENT: &[u8] = b"This is a hidden README file.\n";

#[derive(Debug, Default)]
pub struct HelloHidden;

impl HelloHidden {
    fn content(path: &str) -> FsResult<&'static [u8]> {
        match path {
            HELLO_PATH => Ok(HELLO_CONTENT),
            README_PATH => Ok(README_CONTENT),
            _ => Err(FsError::NotFound),
        }
    }
}

impl FuseboxFs for HelloHidden {
    fn supported_operations(&self) -> OperationSet {
        OperationSet::of(&[
            Operation::Getattr,
            Operation::Opendir,
            Operation::Readdir,
            Operation::Releasedir,
            Operation::Open,
            Operation::Read,
            Operation::Release,
        ])
    }

    fn getattr(&self, path: &str, _fi: Option<&FileInfo>) -> FsResult<FileAttributes> {
        match path {
            "/" | DOCS_DIR => Ok(FileAttributes::minimal(FileType::Directory, 0)),
            _ => Ok(FileAttributes::minimal(
                FileType::RegularFile,
                Self::content(path)?.len() as u64,
            )),
        }
    }

    fn opendir(&self, path: &str, _fi: &mut FileInfo) -> FsResult<()> {
        match path {
            "/" | DOCS_DIR => Ok(()),
            _ => Err(FsError::NotFound),
        }
    }

    fn readdir(&self, path: &str) -> FsResult<Vec<DirEntry>> {
        match path {
            "/" => Ok(vec![DirEntry::new(".hello.txt"), DirEntry::new(".docs")]),
            DOCS_DIR => Ok(vec![DirEntry::new(".readme.txt")]),
            _ => Err(FsError::NotFound),
        }
    }

    fn releasedir(&self, _path: Option<&str>, _fi: &FileInfo) -> FsResult<()> {
        Ok(())
    }

    fn open(&self, path: &str, _fi: &mut FileInfo) -> FsResult<()> {
        Self::content(path).map(|_| ())
    }

    fn read(&self, path: &str, buf: &mut [u8], offset: u64, _fi: &FileInfo) -> FsResult<usize> {
        let src = Self::content(path)?;
        if offset >= src.len() as u64 {
            return Ok(0);
        }
        let start = offset as usize;
        let n = buf.len().min(src.len() - start);
        buf[..n].copy_from_slice(&src[start..start + n]);
        Ok(n)
    }

    fn release(&self, _path: &str, _fi: &FileInfo) -> FsResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::{FuseboxFsExt, NameMapper};

    #[test]
    fn plain_names_through_prefix_stripping() {
        let fs = HelloHidden.map_file_names(NameMapper::strip_prefix("."));

        let mut root: Vec<_> = fs.readdir("/").unwrap().into_iter().map(|e| e.name).collect();
        root.sort();
        assert_eq!(root, vec!["docs", "hello.txt"]);

        let mut fi = FileInfo::default();
        fs.open("/docs/readme.txt", &mut fi).unwrap();
        let mut buf = [0u8; 64];
        let n = fs.read("/docs/readme.txt", &mut buf, 0, &fi).unwrap();
        assert_eq!(&buf[..n], README_CONTENT);
        fs.release("/docs/readme.txt", &fi).unwrap();

        let mut dir = FileInfo::default();
        fs.opendir("/docs", &mut dir).unwrap();
        fs.releasedir(Some("/docs"), &dir).unwrap();
    }

    #[test]
    fn undeclared_operations_are_unsupported() {
        assert!(HelloHidden.unlink(HELLO_PATH).unwrap_err().is_unsupported());
        assert!(!HelloHidden.supported_operations().contains(Operation::Write));
    }

    #[test]
    fn reads_past_the_end_are_empty() {
        let mut buf = [0u8; 4];
        let fi = FileInfo::default();
        assert_eq!(HelloHidden.read(HELLO_PATH, &mut buf, 1000, &fi).unwrap(), 0);
        assert!(HelloHidden.getattr("/missing", None).unwrap_err().is_not_found());
    }
}
