// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Backing store over a directory of the host filesystem.
//!
//! Open files are kept in a concurrent handle table keyed by a monotonically
//! allocated id. All data I/O is positional, so one handle can serve many
//! threads, and a handle keeps working after its path is renamed, replaced or
//! unlinked.

use std::ffi::CString;
use std::fs::{self, File, OpenOptions, Permissions};
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{FileExt, MetadataExt, OpenOptionsExt, PermissionsExt};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use nix::sys::statvfs::statvfs;
use nix::unistd::AccessFlags;
use tracing::{debug, trace, warn};

use crate::error::{FsError, FsResult};
use crate::fs::{relative, FuseboxFs, RENAME_NOREPLACE};
use crate::ops::{Operation, OperationSet};
use crate::types::{
    ConnectionSettings, DirEntry, FileAttributes, FileInfo, StatvfsData, TimeSpec,
};

const MAX_BACKGROUND: u16 = 16;
const CONGESTION_THRESHOLD: u16 = 4;
const UNCHANGED_ID: u32 = u32::MAX;

struct OpenFile {
    path: PathBuf,
    file: Arc<File>,
}

pub struct LocalFs {
    root: PathBuf,
    open_files: DashMap<u64, OpenFile>,
    next_fh: AtomicU64,
}

impl LocalFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            open_files: DashMap::new(),
            next_fh: AtomicU64::new(1),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Number of handles currently open.
    pub fn open_handles(&self) -> usize {
        self.open_files.len()
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let rel = relative(path);
        if rel.is_empty() {
            self.root.clone()
        } else {
            self.root.join(rel)
        }
    }

    fn handle(&self, fi: &FileInfo) -> FsResult<Arc<File>> {
        self.open_files
            .get(&fi.fh)
            .map(|open| Arc::clone(&open.file))
            .ok_or(FsError::BadFileDescriptor)
    }

    fn optional_handle(&self, fi: Option<&FileInfo>) -> Option<Arc<File>> {
        fi.and_then(|fi| self.open_files.get(&fi.fh).map(|open| Arc::clone(&open.file)))
    }

    fn register(&self, path: PathBuf, file: File) -> u64 {
        let fh = self.next_fh.fetch_add(1, Ordering::SeqCst) + 1;
        self.open_files.insert(
            fh,
            OpenFile {
                path,
                file: Arc::new(file),
            },
        );
        fh
    }

    fn rename_noreplace(&self, from: &Path, to: &Path) -> FsResult<()> {
        match renameat2_noreplace(from, to) {
            Ok(()) => Ok(()),
            Err(e) if matches!(e.raw_os_error(), Some(libc::EINVAL) | Some(libc::ENOSYS)) => {
                debug!(target: "fusebox::local", "renameat2 unavailable; checking existence");
                if fs::symlink_metadata(to).is_ok() {
                    return Err(FsError::AlreadyExists);
                }
                rename_or_copy(from, to, true)
            }
            Err(e) if e.raw_os_error() == Some(libc::EXDEV) => rename_or_copy(from, to, true),
            Err(e) => Err(e.into()),
        }
    }
}

fn c_path(path: &Path) -> FsResult<CString> {
    CString::new(path.as_os_str().as_bytes()).map_err(|_| FsError::InvalidArgument)
}

fn c_name(name: &str) -> FsResult<CString> {
    CString::new(name).map_err(|_| FsError::InvalidArgument)
}

fn system_time(secs: i64, nsecs: i64) -> SystemTime {
    let nanos = Duration::from_nanos(nsecs.clamp(0, 999_999_999) as u64);
    if secs >= 0 {
        UNIX_EPOCH + Duration::from_secs(secs as u64) + nanos
    } else {
        UNIX_EPOCH - Duration::from_secs(secs.unsigned_abs()) + nanos
    }
}

fn attributes(md: &fs::Metadata) -> FsResult<FileAttributes> {
    Ok(FileAttributes {
        uid: md.uid(),
        gid: md.gid(),
        size: md.size(),
        crtime: md.created().ok(),
        atime: system_time(md.atime(), md.atime_nsec()),
        mtime: system_time(md.mtime(), md.mtime_nsec()),
        ctime: system_time(md.ctime(), md.ctime_nsec()),
        ..FileAttributes::from_mode(md.mode())?
    })
}

fn timespec(time: TimeSpec) -> libc::timespec {
    // SAFETY: timespec is plain data; zero is a valid value.
    let mut ts: libc::timespec = unsafe { std::mem::zeroed() };
    match time {
        TimeSpec::Now => ts.tv_nsec = libc::UTIME_NOW as _,
        TimeSpec::Omit => ts.tv_nsec = libc::UTIME_OMIT as _,
        TimeSpec::Set(at) => {
            let since = at.duration_since(UNIX_EPOCH).unwrap_or_default();
            ts.tv_sec = since.as_secs() as _;
            ts.tv_nsec = since.subsec_nanos() as _;
        }
    }
    ts
}

fn open_options(flags: i32) -> OpenOptions {
    let mut opts = OpenOptions::new();
    match flags & libc::O_ACCMODE {
        libc::O_WRONLY => {
            opts.write(true);
        }
        libc::O_RDWR => {
            opts.read(true).write(true);
        }
        _ => {
            opts.read(true);
        }
    }
    if flags & libc::O_CREAT != 0 {
        if flags & libc::O_EXCL != 0 {
            opts.create_new(true);
        } else {
            opts.create(true);
        }
    }
    if flags & libc::O_TRUNC != 0 {
        opts.truncate(true);
    }
    // Writes arrive with explicit offsets, so O_APPEND must not reposition them.
    let handled = libc::O_ACCMODE | libc::O_CREAT | libc::O_EXCL | libc::O_TRUNC | libc::O_APPEND;
    opts.custom_flags(flags & !handled);
    opts
}

/// Copies then removes, for moves across devices. Directories are not copied.
fn rename_or_copy(from: &Path, to: &Path, no_replace: bool) -> FsResult<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) if e.raw_os_error() == Some(libc::EXDEV) => {
            let md = fs::symlink_metadata(from)?;
            if md.is_dir() {
                return Err(e.into());
            }
            if no_replace && fs::symlink_metadata(to).is_ok() {
                return Err(FsError::AlreadyExists);
            }
            debug!(target: "fusebox::local", from = %from.display(), to = %to.display(), "cross-device rename; copying");
            if md.file_type().is_symlink() {
                let target = fs::read_link(from)?;
                if !no_replace {
                    let _ = fs::remove_file(to);
                }
                std::os::unix::fs::symlink(target, to)?;
            } else {
                fs::copy(from, to)?;
            }
            fs::remove_file(from)?;
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(target_os = "linux")]
fn renameat2_noreplace(from: &Path, to: &Path) -> io::Result<()> {
    let from = CString::new(from.as_os_str().as_bytes())
        .map_err(|_| io::Error::from(io::ErrorKind::InvalidInput))?;
    let to = CString::new(to.as_os_str().as_bytes())
        .map_err(|_| io::Error::from(io::ErrorKind::InvalidInput))?;
    // SAFETY: both paths are valid NUL-terminated strings.
    let rc = unsafe {
        libc::renameat2(
            libc::AT_FDCWD,
            from.as_ptr(),
            libc::AT_FDCWD,
            to.as_ptr(),
            libc::RENAME_NOREPLACE,
        )
    };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(not(target_os = "linux"))]
fn renameat2_noreplace(_from: &Path, _to: &Path) -> io::Result<()> {
    Err(io::Error::from_raw_os_error(libc::ENOSYS))
}

#[cfg(target_os = "linux")]
fn xattr_error() -> FsError {
    let err = io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ENODATA) {
        FsError::NoAttribute
    } else {
        err.into()
    }
}

#[cfg(target_os = "linux")]
mod xattr {
    use super::*;

    pub fn get(path: &Path, name: &str) -> FsResult<Vec<u8>> {
        let p = c_path(path)?;
        let n = c_name(name)?;
        loop {
            // SAFETY: a null buffer with size 0 only queries the length.
            let len = unsafe { libc::lgetxattr(p.as_ptr(), n.as_ptr(), std::ptr::null_mut(), 0) };
            if len < 0 {
                return Err(xattr_error());
            }
            let mut buf = vec![0u8; len as usize];
            // SAFETY: buf is valid for buf.len() bytes.
            let read = unsafe {
                libc::lgetxattr(p.as_ptr(), n.as_ptr(), buf.as_mut_ptr().cast(), buf.len())
            };
            if read >= 0 {
                buf.truncate(read as usize);
                return Ok(buf);
            }
            // Value grew between the two calls.
            if io::Error::last_os_error().raw_os_error() != Some(libc::ERANGE) {
                return Err(xattr_error());
            }
        }
    }

    pub fn set(path: &Path, name: &str, value: &[u8], flags: i32) -> FsResult<()> {
        let p = c_path(path)?;
        let n = c_name(name)?;
        // SAFETY: value is valid for value.len() bytes.
        let rc = unsafe {
            libc::lsetxattr(p.as_ptr(), n.as_ptr(), value.as_ptr().cast(), value.len(), flags)
        };
        if rc == 0 {
            Ok(())
        } else {
            Err(xattr_error())
        }
    }

    pub fn list(path: &Path) -> FsResult<Vec<String>> {
        let p = c_path(path)?;
        loop {
            // SAFETY: a null buffer with size 0 only queries the length.
            let len = unsafe { libc::llistxattr(p.as_ptr(), std::ptr::null_mut(), 0) };
            if len < 0 {
                return Err(xattr_error());
            }
            let mut buf = vec![0u8; len as usize];
            // SAFETY: buf is valid for buf.len() bytes.
            let read = unsafe { libc::llistxattr(p.as_ptr(), buf.as_mut_ptr().cast(), buf.len()) };
            if read >= 0 {
                buf.truncate(read as usize);
                return Ok(buf
                    .split(|b| *b == 0)
                    .filter(|name| !name.is_empty())
                    .map(|name| String::from_utf8_lossy(name).into_owned())
                    .collect());
            }
            if io::Error::last_os_error().raw_os_error() != Some(libc::ERANGE) {
                return Err(xattr_error());
            }
        }
    }

    pub fn remove(path: &Path, name: &str) -> FsResult<()> {
        let p = c_path(path)?;
        let n = c_name(name)?;
        // SAFETY: both strings are NUL-terminated.
        let rc = unsafe { libc::lremovexattr(p.as_ptr(), n.as_ptr()) };
        if rc == 0 {
            Ok(())
        } else {
            Err(xattr_error())
        }
    }
}

#[cfg(target_os = "linux")]
fn declared_operations() -> OperationSet {
    OperationSet::all()
}

/// Extended attributes are only wired up on Linux.
#[cfg(not(target_os = "linux"))]
fn declared_operations() -> OperationSet {
    OperationSet::all().difference(OperationSet::of(&[
        Operation::Getxattr,
        Operation::Setxattr,
        Operation::Listxattr,
        Operation::Removexattr,
    ]))
}

#[cfg(not(target_os = "linux"))]
mod xattr {
    use super::*;

    pub fn get(_path: &Path, _name: &str) -> FsResult<Vec<u8>> {
        Err(FsError::Unsupported(Operation::Getxattr))
    }

    pub fn set(_path: &Path, _name: &str, _value: &[u8], _flags: i32) -> FsResult<()> {
        Err(FsError::Unsupported(Operation::Setxattr))
    }

    pub fn list(_path: &Path) -> FsResult<Vec<String>> {
        Err(FsError::Unsupported(Operation::Listxattr))
    }

    pub fn remove(_path: &Path, _name: &str) -> FsResult<()> {
        Err(FsError::Unsupported(Operation::Removexattr))
    }
}

impl FuseboxFs for LocalFs {
    fn supported_operations(&self) -> OperationSet {
        declared_operations()
    }

    fn init(&self, conn: &mut ConnectionSettings) {
        conn.max_background = Some(MAX_BACKGROUND);
        conn.congestion_threshold = Some(CONGESTION_THRESHOLD);
    }

    fn statfs(&self, path: &str) -> FsResult<StatvfsData> {
        trace!(target: "fusebox::local", path, "statfs");
        let st = statvfs(&self.resolve(path))?;
        Ok(StatvfsData {
            bsize: st.block_size() as u64,
            frsize: st.fragment_size() as u64,
            blocks: st.blocks() as u64,
            bfree: st.blocks_free() as u64,
            bavail: st.blocks_available() as u64,
            name_max: st.name_max() as u32,
        })
    }

    fn getattr(&self, path: &str, fi: Option<&FileInfo>) -> FsResult<FileAttributes> {
        trace!(target: "fusebox::local", path, "getattr");
        let md = match self.optional_handle(fi) {
            Some(file) => file.metadata()?,
            None => fs::symlink_metadata(self.resolve(path))?,
        };
        attributes(&md)
    }

    fn getxattr(&self, path: &str, name: &str) -> FsResult<Vec<u8>> {
        trace!(target: "fusebox::local", path, name, "getxattr");
        xattr::get(&self.resolve(path), name)
    }

    fn setxattr(&self, path: &str, name: &str, value: &[u8], flags: i32) -> FsResult<()> {
        trace!(target: "fusebox::local", path, name, "setxattr");
        xattr::set(&self.resolve(path), name, value, flags)
    }

    fn listxattr(&self, path: &str) -> FsResult<Vec<String>> {
        trace!(target: "fusebox::local", path, "listxattr");
        xattr::list(&self.resolve(path))
    }

    fn removexattr(&self, path: &str, name: &str) -> FsResult<()> {
        trace!(target: "fusebox::local", path, name, "removexattr");
        xattr::remove(&self.resolve(path), name)
    }

    fn access(&self, path: &str, mask: i32) -> FsResult<()> {
        trace!(target: "fusebox::local", path, mask, "access");
        nix::unistd::access(&self.resolve(path), AccessFlags::from_bits_truncate(mask))?;
        Ok(())
    }

    fn chmod(&self, path: &str, mode: u32, fi: Option<&FileInfo>) -> FsResult<()> {
        trace!(target: "fusebox::local", path, mode, "chmod");
        let perms = Permissions::from_mode(mode & 0o7777);
        match self.optional_handle(fi) {
            Some(file) => file.set_permissions(perms)?,
            None => fs::set_permissions(self.resolve(path), perms)?,
        }
        Ok(())
    }

    fn chown(&self, path: &str, uid: u32, gid: u32, fi: Option<&FileInfo>) -> FsResult<()> {
        trace!(target: "fusebox::local", path, uid, gid, "chown");
        let uid = (uid != UNCHANGED_ID).then_some(uid);
        let gid = (gid != UNCHANGED_ID).then_some(gid);
        match self.optional_handle(fi) {
            Some(file) => std::os::unix::fs::fchown(&*file, uid, gid)?,
            None => std::os::unix::fs::lchown(self.resolve(path), uid, gid)?,
        }
        Ok(())
    }

    fn utimens(
        &self,
        path: &str,
        atime: TimeSpec,
        mtime: TimeSpec,
        fi: Option<&FileInfo>,
    ) -> FsResult<()> {
        trace!(target: "fusebox::local", path, "utimens");
        let times = [timespec(atime), timespec(mtime)];
        let rc = match self.optional_handle(fi) {
            // SAFETY: the descriptor is owned by the handle table entry; times has two entries.
            Some(file) => unsafe { libc::futimens(file.as_raw_fd(), times.as_ptr()) },
            None => {
                let p = c_path(&self.resolve(path))?;
                // SAFETY: p is NUL-terminated; times has two entries.
                unsafe {
                    libc::utimensat(
                        libc::AT_FDCWD,
                        p.as_ptr(),
                        times.as_ptr(),
                        libc::AT_SYMLINK_NOFOLLOW,
                    )
                }
            }
        };
        if rc == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error().into())
        }
    }

    fn readlink(&self, path: &str) -> FsResult<String> {
        trace!(target: "fusebox::local", path, "readlink");
        fs::read_link(self.resolve(path))?
            .into_os_string()
            .into_string()
            .map_err(|_| FsError::InvalidArgument)
    }

    fn symlink(&self, target: &str, linkname: &str) -> FsResult<()> {
        trace!(target: "fusebox::local", target, linkname, "symlink");
        std::os::unix::fs::symlink(target, self.resolve(linkname))?;
        Ok(())
    }

    fn mkdir(&self, path: &str, mode: u32) -> FsResult<()> {
        trace!(target: "fusebox::local", path, mode, "mkdir");
        let dir = self.resolve(path);
        if fs::symlink_metadata(&dir).is_ok() {
            return Err(FsError::AlreadyExists);
        }
        fs::create_dir(&dir)?;
        fs::set_permissions(&dir, Permissions::from_mode(mode & 0o7777))?;
        Ok(())
    }

    fn opendir(&self, path: &str, _fi: &mut FileInfo) -> FsResult<()> {
        trace!(target: "fusebox::local", path, "opendir");
        if fs::symlink_metadata(self.resolve(path))?.is_dir() {
            Ok(())
        } else {
            Err(FsError::NotADirectory)
        }
    }

    fn readdir(&self, path: &str) -> FsResult<Vec<DirEntry>> {
        trace!(target: "fusebox::local", path, "readdir");
        let mut entries = Vec::new();
        for entry in fs::read_dir(self.resolve(path))? {
            match entry?.file_name().into_string() {
                Ok(name) => entries.push(DirEntry::new(name)),
                Err(raw) => {
                    warn!(target: "fusebox::local", path, name = ?raw, "skipping entry with non-UTF-8 name")
                }
            }
        }
        Ok(entries)
    }

    fn releasedir(&self, _path: Option<&str>, _fi: &FileInfo) -> FsResult<()> {
        Ok(())
    }

    fn rmdir(&self, path: &str) -> FsResult<()> {
        trace!(target: "fusebox::local", path, "rmdir");
        let dir = self.resolve(path);
        if !fs::symlink_metadata(&dir)?.is_dir() {
            return Err(FsError::NotADirectory);
        }
        fs::remove_dir(&dir)?;
        Ok(())
    }

    fn create(&self, path: &str, mode: u32, fi: &mut FileInfo) -> FsResult<()> {
        trace!(target: "fusebox::local", path, mode, flags = fi.flags, "create");
        let target = self.resolve(path);
        let mut opts = open_options(fi.flags | libc::O_CREAT);
        // Creation needs a writable descriptor even for O_RDONLY creates.
        if fi.flags & libc::O_ACCMODE == libc::O_RDONLY {
            opts.write(true);
        }
        opts.mode(mode & 0o7777);
        let file = opts.open(&target)?;
        fi.fh = self.register(target, file);
        Ok(())
    }

    fn open(&self, path: &str, fi: &mut FileInfo) -> FsResult<()> {
        if fi.fh != 0 {
            warn!(target: "fusebox::local", path, fh = fi.fh, "open called with a handle already set");
        }
        let target = self.resolve(path);
        let file = open_options(fi.flags).open(&target).map_err(|e| {
            debug!(target: "fusebox::local", path, flags = fi.flags, error = %e, "open failed");
            e
        })?;
        fi.fh = self.register(target, file);
        trace!(target: "fusebox::local", path, fh = fi.fh, "open");
        Ok(())
    }

    fn read(&self, path: &str, buf: &mut [u8], offset: u64, fi: &FileInfo) -> FsResult<usize> {
        trace!(target: "fusebox::local", path, offset, len = buf.len(), "read");
        let file = self.handle(fi)?;
        let mut done = 0;
        while done < buf.len() {
            match file.read_at(&mut buf[done..], offset + done as u64) {
                Ok(0) => break,
                Ok(n) => done += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(done)
    }

    fn write(&self, path: &str, data: &[u8], offset: u64, fi: &FileInfo) -> FsResult<usize> {
        trace!(target: "fusebox::local", path, offset, len = data.len(), "write");
        self.handle(fi)?.write_all_at(data, offset)?;
        Ok(data.len())
    }

    fn truncate(&self, path: &str, size: u64, fi: Option<&FileInfo>) -> FsResult<()> {
        trace!(target: "fusebox::local", path, size, "truncate");
        match self.optional_handle(fi) {
            Some(file) => file.set_len(size)?,
            None => OpenOptions::new().write(true).open(self.resolve(path))?.set_len(size)?,
        }
        Ok(())
    }

    fn release(&self, path: &str, fi: &FileInfo) -> FsResult<()> {
        trace!(target: "fusebox::local", path, fh = fi.fh, "release");
        self.open_files.remove(&fi.fh);
        Ok(())
    }

    fn unlink(&self, path: &str) -> FsResult<()> {
        trace!(target: "fusebox::local", path, "unlink");
        let target = self.resolve(path);
        if fs::symlink_metadata(&target)?.is_dir() {
            return Err(FsError::IsADirectory);
        }
        fs::remove_file(&target)?;
        Ok(())
    }

    fn rename(&self, old_path: &str, new_path: &str, flags: u32) -> FsResult<()> {
        trace!(target: "fusebox::local", old_path, new_path, flags, "rename");
        if flags & !RENAME_NOREPLACE != 0 {
            return Err(FsError::Unsupported(Operation::Rename).context(format!(
                "rename flags not supported: {:#x}",
                flags & !RENAME_NOREPLACE
            )));
        }
        let from = self.resolve(old_path);
        let to = self.resolve(new_path);
        if flags & RENAME_NOREPLACE != 0 {
            self.rename_noreplace(&from, &to)
        } else {
            rename_or_copy(&from, &to, false)
        }
    }

    fn destroy(&self) {
        if !self.open_files.is_empty() {
            let leaked: Vec<String> = self
                .open_files
                .iter()
                .map(|entry| entry.value().path.display().to_string())
                .collect();
            warn!(target: "fusebox::local", count = leaked.len(), paths = ?leaked, "closing handles left open at unmount");
        }
        self.open_files.clear();
    }

    fn flush(&self, _path: &str, _fi: &FileInfo) -> FsResult<()> {
        Ok(())
    }

    fn fsync(&self, path: &str, datasync: bool, fi: &FileInfo) -> FsResult<()> {
        trace!(target: "fusebox::local", path, datasync, "fsync");
        let file = self.handle(fi)?;
        if datasync {
            file.sync_data()?;
        } else {
            file.sync_all()?;
        }
        Ok(())
    }

    fn fsyncdir(&self, _path: Option<&str>, _datasync: bool, _fi: &FileInfo) -> FsResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, LocalFs) {
        let dir = TempDir::new().unwrap();
        let fs = LocalFs::new(dir.path());
        (dir, fs)
    }

    #[test]
    fn first_handle_is_two() {
        let (dir, fs) = store();
        fs::write(dir.path().join("a"), b"x").unwrap();
        let mut fi = FileInfo::with_flags(libc::O_RDONLY);
        fs.open("/a", &mut fi).unwrap();
        assert_eq!(fi.fh, 2);
        fs.release("/a", &fi).unwrap();
        assert_eq!(fs.open_handles(), 0);
    }

    #[test]
    fn root_resolves_to_the_directory() {
        let (dir, fs) = store();
        assert_eq!(fs.resolve("/"), dir.path());
        assert_eq!(fs.resolve("/a/b"), dir.path().join("a/b"));
        assert!(fs.getattr("/", None).unwrap().is_directory());
    }

    #[test]
    fn open_flags_translate() {
        let (dir, fs) = store();
        let mut fi = FileInfo::with_flags(libc::O_WRONLY | libc::O_CREAT | libc::O_EXCL);
        fs.create("/new", 0o600, &mut fi).unwrap();
        assert!(dir.path().join("new").exists());

        let mut again = FileInfo::with_flags(libc::O_WRONLY | libc::O_CREAT | libc::O_EXCL);
        assert_eq!(
            crate::errno::to_errno(&fs.create("/new", 0o600, &mut again).unwrap_err()),
            -libc::EEXIST
        );
    }

    #[test]
    fn append_opens_still_write_at_the_given_offset() {
        let (dir, fs) = store();
        fs::write(dir.path().join("f"), b"0123456789").unwrap();
        let mut fi = FileInfo::with_flags(libc::O_WRONLY | libc::O_APPEND);
        fs.open("/f", &mut fi).unwrap();
        fs.write("/f", b"ab", 2, &fi).unwrap();
        fs.release("/f", &fi).unwrap();
        assert_eq!(fs::read(dir.path().join("f")).unwrap(), b"01ab456789");
    }

    #[test]
    fn unknown_handles_are_bad_descriptors() {
        let (_dir, fs) = store();
        let fi = FileInfo { fh: 99, flags: 0 };
        let mut buf = [0u8; 1];
        assert!(matches!(fs.read("/x", &mut buf, 0, &fi), Err(FsError::BadFileDescriptor)));
        fs.release("/x", &fi).unwrap();
    }

    #[test]
    fn unknown_rename_flags_are_unsupported() {
        let (dir, fs) = store();
        fs::write(dir.path().join("a"), b"").unwrap();
        let err = fs.rename("/a", "/b", 2).unwrap_err();
        assert_eq!(crate::errno::to_errno(&err), -libc::ENOTSUP);
    }

    #[test]
    fn init_requests_background_limits() {
        let (_dir, fs) = store();
        let mut conn = ConnectionSettings::default();
        fs.init(&mut conn);
        assert_eq!(conn.max_background, Some(16));
        assert_eq!(conn.congestion_threshold, Some(4));
    }

    #[test]
    fn declared_set_matches_platform() {
        let (_dir, fs) = store();
        let declared = fs.supported_operations();
        assert!(declared.contains(Operation::Rename));
        assert!(declared.contains(Operation::Fsyncdir));
        let xattrs = cfg!(target_os = "linux");
        for op in [
            Operation::Getxattr,
            Operation::Setxattr,
            Operation::Listxattr,
            Operation::Removexattr,
        ] {
            assert_eq!(declared.contains(op), xattrs, "{op}");
        }
    }

    #[test]
    fn destroy_closes_leaked_handles() {
        let (dir, fs) = store();
        fs::write(dir.path().join("a"), b"").unwrap();
        let mut fi = FileInfo::with_flags(libc::O_RDONLY);
        fs.open("/a", &mut fi).unwrap();
        fs.destroy();
        assert_eq!(fs.open_handles(), 0);
    }

    #[test]
    fn time_conversion_handles_pre_epoch() {
        assert_eq!(system_time(0, 5), UNIX_EPOCH + Duration::from_nanos(5));
        assert_eq!(
            system_time(-1, 0),
            UNIX_EPOCH - Duration::from_secs(1)
        );
    }
}
