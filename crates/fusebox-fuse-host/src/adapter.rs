// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! fusebox FUSE adapter implementation
//!
//! Maps inode-addressed FUSE requests onto the path-level callbacks of a
//! [`FuseboxOperations`] chain. Reads and writes run on a worker pool so a
//! slow store or generator does not stall the session loop.

#[cfg(not(all(feature = "fuse", target_os = "linux")))]
compile_error!("This module requires the 'fuse' feature on Linux");

use std::ffi::OsStr;
use std::path::Path;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Condvar, Mutex,
};
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crossbeam_queue::SegQueue;
use fuser::{
    FileAttr, FileType, KernelConfig, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory,
    ReplyEmpty, ReplyEntry, ReplyOpen, ReplyStatfs, ReplyWrite, ReplyXattr, Request, TimeOrNow,
};
use fusebox_core::fs::child_path;
use fusebox_core::{
    ConnectionSettings, FileInfo, FuseboxFs, FuseboxOperations, MountConfig, OperationSet, Stat,
    StatvfsData, TimeSpec,
};
use libc::{c_int, EINVAL, ENOENT};
use tracing::{info, warn};

use crate::inodes::{component, InodeTable, ROOT_INO};

const BLOCK_SIZE: u64 = 512;
const IO_THREADS_ENV: &str = "FUSEBOX_IO_THREADS";
const IDLE_WAIT: Duration = Duration::from_millis(5);
const UNCHANGED_ID: u32 = u32::MAX;

macro_rules! attempt {
    ($reply:ident, $expr:expr) => {
        match $expr {
            Ok(value) => value,
            Err(errno) => {
                $reply.error(errno);
                return;
            }
        }
    };
}

fn check(status: c_int) -> Result<c_int, c_int> {
    if status < 0 {
        Err(-status)
    } else {
        Ok(status)
    }
}

fn offset(offset: i64) -> Result<u64, c_int> {
    u64::try_from(offset).map_err(|_| EINVAL)
}

fn file_kind(mode: u32) -> FileType {
    use fusebox_core::FileType as Node;
    match Node::from_mode(mode) {
        Ok(Node::NamedPipe) => FileType::NamedPipe,
        Ok(Node::CharDevice) => FileType::CharDevice,
        Ok(Node::Directory) => FileType::Directory,
        Ok(Node::BlockDevice) => FileType::BlockDevice,
        Ok(Node::Symlink) => FileType::Symlink,
        Ok(Node::Socket) => FileType::Socket,
        Ok(Node::RegularFile) | Err(_) => FileType::RegularFile,
    }
}

fn file_attr(ino: u64, stat: &Stat) -> FileAttr {
    FileAttr {
        ino,
        size: stat.size,
        blocks: stat.size.div_ceil(BLOCK_SIZE),
        atime: stat.atime,
        mtime: stat.mtime,
        ctime: stat.ctime,
        crtime: stat.crtime.unwrap_or(stat.ctime),
        kind: file_kind(stat.mode),
        perm: (stat.mode & 0o7777) as u16,
        nlink: stat.nlink,
        uid: stat.uid,
        gid: stat.gid,
        rdev: 0,
        blksize: BLOCK_SIZE as u32,
        flags: 0,
    }
}

/// Entry reply telling the kernel to cache a miss.
fn negative_attr() -> FileAttr {
    FileAttr {
        ino: 0,
        size: 0,
        blocks: 0,
        atime: UNIX_EPOCH,
        mtime: UNIX_EPOCH,
        ctime: UNIX_EPOCH,
        crtime: UNIX_EPOCH,
        kind: FileType::RegularFile,
        perm: 0,
        nlink: 0,
        uid: 0,
        gid: 0,
        rdev: 0,
        blksize: BLOCK_SIZE as u32,
        flags: 0,
    }
}

fn time_spec(time: Option<TimeOrNow>) -> TimeSpec {
    match time {
        None => TimeSpec::Omit,
        Some(TimeOrNow::Now) => TimeSpec::Now,
        Some(TimeOrNow::SpecificTime(at)) => TimeSpec::Set(at),
    }
}

fn worker_count(value: Option<&str>) -> usize {
    let available = thread::available_parallelism().map(|p| p.get()).unwrap_or(1);
    match value {
        Some(value) => value
            .parse::<usize>()
            .ok()
            .filter(|n| *n > 0)
            .unwrap_or(available),
        None => available.max(2),
    }
}

fn io_worker_count() -> usize {
    worker_count(std::env::var(IO_THREADS_ENV).ok().as_deref())
}

enum IoJob {
    Read {
        path: String,
        fi: FileInfo,
        offset: u64,
        size: u32,
        reply: ReplyData,
    },
    Write {
        path: String,
        fi: FileInfo,
        offset: u64,
        data: Vec<u8>,
        reply: ReplyWrite,
    },
}

impl IoJob {
    fn run(self, ops: &FuseboxOperations) {
        match self {
            IoJob::Read {
                path,
                fi,
                offset,
                size,
                reply,
            } => {
                let mut buf = vec![0u8; size as usize];
                match check(ops.read(&path, &mut buf, offset, &fi)) {
                    Ok(n) => reply.data(&buf[..n as usize]),
                    Err(errno) => reply.error(errno),
                }
            }
            IoJob::Write {
                path,
                fi,
                offset,
                data,
                reply,
            } => match check(ops.write(&path, &data, offset, &fi)) {
                Ok(n) => reply.written(n as u32),
                Err(errno) => reply.error(errno),
            },
        }
    }
}

struct IoDispatcher {
    queue: Arc<SegQueue<IoJob>>,
    signal: Arc<(Mutex<bool>, Condvar)>,
    shutdown: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

impl IoDispatcher {
    fn new(ops: Arc<FuseboxOperations>, thread_count: usize) -> Self {
        let queue = Arc::new(SegQueue::<IoJob>::new());
        let signal = Arc::new((Mutex::new(false), Condvar::new()));
        let shutdown = Arc::new(AtomicBool::new(false));
        let mut handles = Vec::with_capacity(thread_count);

        for _ in 0..thread_count {
            let queue = Arc::clone(&queue);
            let signal = Arc::clone(&signal);
            let shutdown = Arc::clone(&shutdown);
            let ops = Arc::clone(&ops);
            handles.push(thread::spawn(move || loop {
                if shutdown.load(Ordering::Acquire) {
                    break;
                }
                match queue.pop() {
                    Some(job) => job.run(&ops),
                    None => {
                        let (lock, cvar) = &*signal;
                        let mut pending = lock.lock().unwrap_or_else(|p| p.into_inner());
                        if !*pending {
                            pending = cvar
                                .wait_timeout(pending, IDLE_WAIT)
                                .map(|(guard, _)| guard)
                                .unwrap_or_else(|p| p.into_inner().0);
                        }
                        *pending = false;
                    }
                }
            }));
        }

        Self {
            queue,
            signal,
            shutdown,
            handles,
        }
    }

    fn submit(&self, job: IoJob) {
        self.queue.push(job);
        let (lock, cvar) = &*self.signal;
        let mut pending = lock.lock().unwrap_or_else(|p| p.into_inner());
        *pending = true;
        cvar.notify_one();
    }
}

impl Drop for IoDispatcher {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        let (lock, cvar) = &*self.signal;
        if let Ok(mut pending) = lock.lock() {
            *pending = true;
            cvar.notify_all();
        }
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

/// fusebox FUSE filesystem adapter
pub struct FuseboxFuse {
    ops: Arc<FuseboxOperations>,
    supported: OperationSet,
    inodes: InodeTable,
    config: MountConfig,
    attr_ttl: Duration,
    entry_ttl: Duration,
    negative_ttl: Duration,
    dispatcher: IoDispatcher,
}

impl FuseboxFuse {
    pub fn new(fs: Box<dyn FuseboxFs>, config: MountConfig) -> Self {
        let ops = Arc::new(FuseboxOperations::new(fs));
        let supported = ops.supported_operations();
        let dispatcher = IoDispatcher::new(Arc::clone(&ops), io_worker_count());
        Self {
            supported,
            inodes: InodeTable::new(),
            attr_ttl: Duration::from_millis(config.cache.attr_ttl_ms),
            entry_ttl: Duration::from_millis(config.cache.entry_ttl_ms),
            negative_ttl: Duration::from_millis(config.cache.negative_ttl_ms),
            config,
            ops,
            dispatcher,
        }
    }

    fn path(&self, ino: u64) -> Result<String, c_int> {
        self.inodes.path(ino).map(str::to_string).ok_or(ENOENT)
    }

    fn child(&self, parent: u64, name: &OsStr) -> Result<String, c_int> {
        let name = component(name)?;
        self.inodes.child(parent, name).ok_or(ENOENT)
    }

    fn stat(&self, path: &str, fi: Option<&FileInfo>) -> Result<Stat, c_int> {
        let mut stat = Stat::default();
        check(self.ops.getattr(path, &mut stat, fi))?;
        Ok(stat)
    }

    /// Stats `path` and takes a lookup reference on its inode.
    fn entry(&mut self, path: &str, fi: Option<&FileInfo>) -> Result<FileAttr, c_int> {
        let stat = self.stat(path, fi)?;
        let ino = self.inodes.lookup(path);
        Ok(file_attr(ino, &stat))
    }

    /// Unlinks or removes a directory, unbinding the path on success.
    fn remove_entry(&mut self, parent: u64, name: &OsStr, dir: bool) -> Result<(), c_int> {
        let path = self.child(parent, name)?;
        let status = if dir {
            self.ops.rmdir(&path)
        } else {
            self.ops.unlink(&path)
        };
        check(status)?;
        self.inodes.detach(&path);
        Ok(())
    }

    fn parent_ino(&self, path: &str) -> u64 {
        match path.rfind('/') {
            Some(0) | None => ROOT_INO,
            Some(idx) => self.inodes.ino(&path[..idx]).unwrap_or(ROOT_INO),
        }
    }

    fn kind_of(&self, path: &str) -> FileType {
        self.stat(path, None)
            .map(|stat| file_kind(stat.mode))
            .unwrap_or(FileType::RegularFile)
    }
}

fn apply_kernel_settings(conn: &ConnectionSettings, config: &mut KernelConfig) {
    if let Some(desired) = conn.max_background {
        if let Err(limit) = config.set_max_background(desired) {
            warn!(target: "fusebox::fuse", desired, limit, "kernel limited max_background");
            let _ = config.set_max_background(limit);
        }
    }
    if let Some(desired) = conn.congestion_threshold {
        if let Err(limit) = config.set_congestion_threshold(desired) {
            warn!(target: "fusebox::fuse", desired, limit, "kernel limited congestion_threshold");
            let _ = config.set_congestion_threshold(limit);
        }
    }
    if let Some(desired) = conn.max_write {
        if let Err(limit) = config.set_max_write(desired) {
            warn!(target: "fusebox::fuse", desired, limit, "kernel limited max_write");
            let _ = config.set_max_write(limit);
        }
    }
}

impl fuser::Filesystem for FuseboxFuse {
    fn init(&mut self, _req: &Request<'_>, config: &mut KernelConfig) -> Result<(), c_int> {
        let mut conn = ConnectionSettings::default();
        self.ops.init(&mut conn);
        self.config.fuse.apply(&mut conn);
        apply_kernel_settings(&conn, config);
        info!(
            target: "fusebox::fuse",
            max_background = ?conn.max_background,
            congestion_threshold = ?conn.congestion_threshold,
            io_threads = self.dispatcher.handles.len(),
            declared = ?self.supported,
            "fusebox FUSE adapter initialized"
        );
        Ok(())
    }

    fn destroy(&mut self) {
        self.ops.destroy();
        info!(target: "fusebox::fuse", "fusebox FUSE adapter destroyed");
    }

    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let path = attempt!(reply, self.child(parent, name));
        match self.entry(&path, None) {
            Ok(attr) => reply.entry(&self.entry_ttl, &attr, 0),
            Err(ENOENT) if !self.negative_ttl.is_zero() => {
                reply.entry(&self.negative_ttl, &negative_attr(), 0)
            }
            Err(errno) => reply.error(errno),
        }
    }

    fn forget(&mut self, _req: &Request<'_>, ino: u64, nlookup: u64) {
        self.inodes.forget(ino, nlookup);
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, fh: Option<u64>, reply: ReplyAttr) {
        let path = attempt!(reply, self.path(ino));
        let fi = fh.map(|fh| FileInfo { fh, flags: 0 });
        let stat = attempt!(reply, self.stat(&path, fi.as_ref()));
        reply.attr(&self.attr_ttl, &file_attr(ino, &stat));
    }

    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let path = attempt!(reply, self.path(ino));
        let fi = fh.map(|fh| FileInfo { fh, flags: 0 });
        let fi = fi.as_ref();

        if let Some(mode) = mode {
            attempt!(reply, check(self.ops.chmod(&path, mode, fi)));
        }
        if uid.is_some() || gid.is_some() {
            let (uid, gid) = (uid.unwrap_or(UNCHANGED_ID), gid.unwrap_or(UNCHANGED_ID));
            attempt!(reply, check(self.ops.chown(&path, uid, gid, fi)));
        }
        if let Some(size) = size {
            attempt!(reply, check(self.ops.truncate(&path, size, fi)));
        }
        if atime.is_some() || mtime.is_some() {
            let status = self.ops.utimens(&path, time_spec(atime), time_spec(mtime), fi);
            attempt!(reply, check(status));
        }

        let stat = attempt!(reply, self.stat(&path, fi));
        reply.attr(&self.attr_ttl, &file_attr(ino, &stat));
    }

    fn readlink(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyData) {
        let path = attempt!(reply, self.path(ino));
        let mut buf = vec![0u8; libc::PATH_MAX as usize + 1];
        attempt!(reply, check(self.ops.readlink(&path, &mut buf)));
        let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
        reply.data(&buf[..end]);
    }

    fn mkdir(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        reply: ReplyEntry,
    ) {
        let path = attempt!(reply, self.child(parent, name));
        attempt!(reply, check(self.ops.mkdir(&path, mode & !umask)));
        let attr = attempt!(reply, self.entry(&path, None));
        reply.entry(&self.entry_ttl, &attr, 0);
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        attempt!(reply, self.remove_entry(parent, name, false));
        reply.ok();
    }

    fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        attempt!(reply, self.remove_entry(parent, name, true));
        reply.ok();
    }

    fn symlink(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        link_name: &OsStr,
        target: &Path,
        reply: ReplyEntry,
    ) {
        let path = attempt!(reply, self.child(parent, link_name));
        let target = attempt!(reply, target.to_str().ok_or(EINVAL));
        attempt!(reply, check(self.ops.symlink(target, &path)));
        let attr = attempt!(reply, self.entry(&path, None));
        reply.entry(&self.entry_ttl, &attr, 0);
    }

    fn rename(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        flags: u32,
        reply: ReplyEmpty,
    ) {
        let from = attempt!(reply, self.child(parent, name));
        let to = attempt!(reply, self.child(newparent, newname));
        attempt!(reply, check(self.ops.rename(&from, &to, flags)));
        self.inodes.rename(&from, &to);
        reply.ok();
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        let path = attempt!(reply, self.path(ino));
        let mut fi = FileInfo::with_flags(flags);
        attempt!(reply, check(self.ops.open(&path, &mut fi)));
        reply.opened(fi.fh, 0);
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let path = attempt!(reply, self.path(ino));
        let offset = attempt!(reply, self::offset(offset));
        self.dispatcher.submit(IoJob::Read {
            path,
            fi: FileInfo { fh, flags },
            offset,
            size,
            reply,
        });
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let path = attempt!(reply, self.path(ino));
        let offset = attempt!(reply, self::offset(offset));
        self.dispatcher.submit(IoJob::Write {
            path,
            fi: FileInfo { fh, flags },
            offset,
            data: data.to_vec(),
            reply,
        });
    }

    fn flush(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        _lock_owner: u64,
        reply: ReplyEmpty,
    ) {
        let path = attempt!(reply, self.path(ino));
        attempt!(reply, check(self.ops.flush(&path, &FileInfo { fh, flags: 0 })));
        reply.ok();
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        let path = attempt!(reply, self.path(ino));
        attempt!(reply, check(self.ops.release(&path, &FileInfo { fh, flags })));
        reply.ok();
    }

    fn fsync(&mut self, _req: &Request<'_>, ino: u64, fh: u64, datasync: bool, reply: ReplyEmpty) {
        let path = attempt!(reply, self.path(ino));
        let fi = FileInfo { fh, flags: 0 };
        attempt!(reply, check(self.ops.fsync(&path, datasync, &fi)));
        reply.ok();
    }

    fn opendir(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        let path = attempt!(reply, self.path(ino));
        let mut fi = FileInfo::with_flags(flags);
        attempt!(reply, check(self.ops.opendir(&path, &mut fi)));
        reply.opened(fi.fh, 0);
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let path = attempt!(reply, self.path(ino));
        let skip = attempt!(reply, self::offset(offset)) as usize;
        let mut names: Vec<String> = Vec::new();
        attempt!(reply, check(self.ops.readdir(&path, &mut names)));

        for (i, name) in names.iter().enumerate().skip(skip) {
            let (entry_ino, kind) = match name.as_str() {
                "." => (ino, FileType::Directory),
                ".." => (self.parent_ino(&path), FileType::Directory),
                _ => {
                    let child = child_path(&path, name);
                    let kind = self.kind_of(&child);
                    (self.inodes.listing_ino(&child), kind)
                }
            };
            if reply.add(entry_ino, (i + 1) as i64, kind, name) {
                break;
            }
        }
        reply.ok();
    }

    fn releasedir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        flags: i32,
        reply: ReplyEmpty,
    ) {
        let path = self.inodes.path(ino).map(str::to_string);
        let fi = FileInfo { fh, flags };
        attempt!(reply, check(self.ops.releasedir(path.as_deref(), &fi)));
        reply.ok();
    }

    fn fsyncdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        datasync: bool,
        reply: ReplyEmpty,
    ) {
        let path = self.inodes.path(ino).map(str::to_string);
        let fi = FileInfo { fh, flags: 0 };
        attempt!(reply, check(self.ops.fsyncdir(path.as_deref(), datasync, &fi)));
        reply.ok();
    }

    fn statfs(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyStatfs) {
        let path = attempt!(reply, self.path(ino));
        let mut st = StatvfsData::default();
        attempt!(reply, check(self.ops.statfs(&path, &mut st)));
        reply.statfs(
            st.blocks,
            st.bfree,
            st.bavail,
            0,
            0,
            st.bsize as u32,
            st.name_max,
            st.frsize as u32,
        );
    }

    fn setxattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        name: &OsStr,
        value: &[u8],
        flags: i32,
        _position: u32,
        reply: ReplyEmpty,
    ) {
        let path = attempt!(reply, self.path(ino));
        let name = attempt!(reply, name.to_str().ok_or(EINVAL));
        attempt!(reply, check(self.ops.setxattr(&path, name, value, flags)));
        reply.ok();
    }

    fn getxattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        name: &OsStr,
        size: u32,
        reply: ReplyXattr,
    ) {
        let path = attempt!(reply, self.path(ino));
        let name = attempt!(reply, name.to_str().ok_or(EINVAL));
        let mut buf = vec![0u8; size as usize];
        let len = attempt!(reply, check(self.ops.getxattr(&path, name, &mut buf)));
        if size == 0 {
            reply.size(len as u32);
        } else {
            reply.data(&buf[..len as usize]);
        }
    }

    fn listxattr(&mut self, _req: &Request<'_>, ino: u64, size: u32, reply: ReplyXattr) {
        let path = attempt!(reply, self.path(ino));
        let mut buf = vec![0u8; size as usize];
        let len = attempt!(reply, check(self.ops.listxattr(&path, &mut buf)));
        if size == 0 {
            reply.size(len as u32);
        } else {
            reply.data(&buf[..len as usize]);
        }
    }

    fn removexattr(&mut self, _req: &Request<'_>, ino: u64, name: &OsStr, reply: ReplyEmpty) {
        let path = attempt!(reply, self.path(ino));
        let name = attempt!(reply, name.to_str().ok_or(EINVAL));
        attempt!(reply, check(self.ops.removexattr(&path, name)));
        reply.ok();
    }

    fn access(&mut self, _req: &Request<'_>, ino: u64, mask: i32, reply: ReplyEmpty) {
        let path = attempt!(reply, self.path(ino));
        attempt!(reply, check(self.ops.access(&path, mask)));
        reply.ok();
    }

    fn create(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        flags: i32,
        reply: ReplyCreate,
    ) {
        let path = attempt!(reply, self.child(parent, name));
        let mut fi = FileInfo::with_flags(flags);
        attempt!(reply, check(self.ops.create(&path, mode & !umask, &mut fi)));
        let attr = attempt!(reply, self.entry(&path, Some(&fi)));
        reply.created(&self.entry_ttl, &attr, 0, fi.fh, 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fusebox_core::transform::{FuseboxFsExt, NameMapper};
    use fusebox_core::{FileAttributes, HelloHidden};

    fn config() -> MountConfig {
        MountConfig::from_json(r#"{"source": "/"}"#).unwrap()
    }

    #[test]
    fn cache_ttls_follow_config() {
        let mut config = config();
        config.cache.attr_ttl_ms = 1500;
        config.cache.entry_ttl_ms = 2500;
        config.cache.negative_ttl_ms = 0;

        let fuse = FuseboxFuse::new(Box::new(HelloHidden), config);
        assert_eq!(fuse.attr_ttl, Duration::from_millis(1500));
        assert_eq!(fuse.entry_ttl, Duration::from_millis(2500));
        assert!(fuse.negative_ttl.is_zero());
    }

    #[test]
    fn blocked_operations_reach_the_chain() {
        let chain = HelloHidden
            .map_file_names(NameMapper::strip_prefix("."))
            .read_only();
        let mut fuse = FuseboxFuse::new(Box::new(chain), config());
        let ino = fuse.entry("/hello.txt", None).unwrap().ino;

        assert_eq!(fuse.remove_entry(ROOT_INO, OsStr::new("hello.txt"), false), Err(libc::EROFS));
        assert_eq!(fuse.remove_entry(ROOT_INO, OsStr::new("docs"), true), Err(libc::EROFS));
        assert_eq!(fuse.inodes.ino("/hello.txt"), Some(ino));
    }

    #[test]
    fn unimplemented_operations_are_not_supported() {
        let mut fuse = FuseboxFuse::new(Box::new(HelloHidden), config());
        assert_eq!(
            fuse.remove_entry(ROOT_INO, OsStr::new(".hello.txt"), false),
            Err(libc::ENOTSUP)
        );
    }

    #[test]
    fn listings_do_not_grow_the_inode_table() {
        let mut fuse = FuseboxFuse::new(
            Box::new(HelloHidden.map_file_names(NameMapper::strip_prefix("."))),
            config(),
        );
        let before = fuse.inodes.len();
        let first = fuse.inodes.listing_ino("/hello.txt");
        let second = fuse.inodes.listing_ino("/hello.txt");
        assert_ne!(first, second);
        assert_eq!(fuse.inodes.len(), before);

        let ino = fuse.entry("/hello.txt", None).unwrap().ino;
        assert_eq!(fuse.inodes.listing_ino("/hello.txt"), ino);
    }

    #[test]
    fn child_paths_resolve_through_the_inode_table() {
        let mut fuse = FuseboxFuse::new(
            Box::new(HelloHidden.map_file_names(NameMapper::strip_prefix("."))),
            config(),
        );
        let attr = fuse.entry("/docs", None).unwrap();
        assert_eq!(attr.kind, FileType::Directory);
        assert_eq!(attr.nlink, 2);
        assert_eq!(
            fuse.child(attr.ino, OsStr::new("readme.txt")).unwrap(),
            "/docs/readme.txt"
        );
        assert_eq!(fuse.parent_ino("/docs/readme.txt"), attr.ino);
        assert_eq!(fuse.kind_of("/docs/readme.txt"), FileType::RegularFile);
        assert_eq!(fuse.stat("/missing", None).unwrap_err(), ENOENT);
    }

    #[test]
    fn attributes_convert_to_kernel_form() {
        let stat = Stat::from(&FileAttributes::from_mode(0o104755).unwrap().with_size(1025));
        let attr = file_attr(7, &stat);
        assert_eq!(attr.ino, 7);
        assert_eq!(attr.kind, FileType::RegularFile);
        assert_eq!(attr.perm, 0o4755);
        assert_eq!(attr.blocks, 3);
        assert_eq!(attr.nlink, 1);
        assert_eq!(file_kind(0o120777), FileType::Symlink);
        assert_eq!(file_kind(0), FileType::RegularFile);
    }

    #[test]
    fn times_map_to_utimens_arguments() {
        let at = UNIX_EPOCH + Duration::from_secs(42);
        assert_eq!(time_spec(None), TimeSpec::Omit);
        assert_eq!(time_spec(Some(TimeOrNow::Now)), TimeSpec::Now);
        assert_eq!(time_spec(Some(TimeOrNow::SpecificTime(at))), TimeSpec::Set(at));
    }

    #[test]
    fn worker_count_honors_override() {
        assert_eq!(worker_count(Some("3")), 3);
        assert!(worker_count(Some("0")) >= 1);
        assert!(worker_count(Some("many")) >= 1);
        assert!(worker_count(None) >= 2);
    }

    #[test]
    fn negative_offsets_are_invalid() {
        assert_eq!(offset(-1), Err(EINVAL));
        assert_eq!(offset(4096), Ok(4096));
        assert_eq!(check(-ENOENT), Err(ENOENT));
    }
}
