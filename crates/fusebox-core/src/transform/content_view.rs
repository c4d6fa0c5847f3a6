// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Read-only views of generated content.
//!
//! For selected non-directory paths, a read open returns the generator's
//! output instead of the stored bytes. Opening for write passes through to the
//! inner store, so the source stays editable.
//!
//! Sizes must be known before open because the kernel stops reading at the
//! reported size. Small sources are rendered eagerly; large ones report an
//! over-estimate until opened.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use dashmap::DashMap;
use tracing::debug;

use crate::decorate::Layer;
use crate::error::{FsError, FsResult};
use crate::fs::{relative, FuseboxFs};
use crate::ops::{Operation, OperationSet};
use crate::transform::generator::ContentGenerator;
use crate::transform::PathPredicate;
use crate::types::{FileAttributes, FileInfo};

/// Largest source rendered just to answer `getattr`.
pub const EAGER_SIZE_LIMIT: u64 = 512 * 1024;
pub const ESTIMATE_FACTOR: u64 = 2;
pub const ESTIMATE_MARGIN: u64 = 4096;

/// View handles live above every id a store hands out.
const VIEW_HANDLE_BASE: u64 = 1u64 << 60;
const SOURCE_CHUNK: usize = 64 * 1024;

pub fn estimated_size(source_size: u64) -> u64 {
    source_size
        .saturating_mul(ESTIMATE_FACTOR)
        .saturating_add(ESTIMATE_MARGIN)
}

struct OpenView {
    path: String,
    content: Vec<u8>,
}

#[derive(Default)]
struct ViewState {
    sizes: HashMap<String, u64>,
    open_counts: HashMap<String, usize>,
    /// Bumped on every invalidation so a render that raced one is not cached.
    epoch: u64,
}

pub struct ContentView {
    selector: PathPredicate,
    generator: Arc<dyn ContentGenerator>,
    views: DashMap<u64, OpenView>,
    state: Mutex<ViewState>,
    next_fh: AtomicU64,
}

impl ContentView {
    pub fn new(selector: PathPredicate, generator: Arc<dyn ContentGenerator>) -> Self {
        Self {
            selector,
            generator,
            views: DashMap::new(),
            state: Mutex::new(ViewState::default()),
            next_fh: AtomicU64::new(VIEW_HANDLE_BASE),
        }
    }

    fn matches(&self, path: &str) -> bool {
        (self.selector)(relative(path))
    }

    fn is_view(&self, fi: &FileInfo) -> bool {
        self.views.contains_key(&fi.fh)
    }

    fn state(&self) -> MutexGuard<'_, ViewState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn invalidate(&self, path: &str) {
        if self.matches(path) {
            let mut state = self.state();
            state.epoch = state.epoch.wrapping_add(1);
            state.sizes.remove(path);
        }
    }

    /// Reads the whole source through a short-lived inner handle.
    fn read_source(&self, inner: &dyn FuseboxFs, path: &str) -> FsResult<Vec<u8>> {
        let mut fi = FileInfo::with_flags(libc::O_RDONLY);
        inner.open(path, &mut fi)?;
        let mut source = Vec::new();
        let mut chunk = vec![0u8; SOURCE_CHUNK];
        let result = loop {
            match inner.read(path, &mut chunk, source.len() as u64, &fi) {
                Ok(0) => break Ok(()),
                Ok(n) => source.extend_from_slice(&chunk[..n]),
                Err(e) => break Err(e),
            }
        };
        if let Err(e) = inner.release(path, &fi) {
            debug!(target: "fusebox::view", path, error = %e, "failed to release source handle");
        }
        result.map(|()| source)
    }

    fn render(&self, inner: &dyn FuseboxFs, path: &str) -> FsResult<Vec<u8>> {
        let source = self.read_source(inner, path)?;
        self.generator.generate(path, &source)
    }

    fn visible_size(&self, inner: &dyn FuseboxFs, path: &str, source_size: u64) -> u64 {
        let epoch = {
            let state = self.state();
            if let Some(size) = state.sizes.get(path) {
                return *size;
            }
            state.epoch
        };
        let size = if source_size <= EAGER_SIZE_LIMIT {
            match self.render(inner, path) {
                Ok(content) => content.len() as u64,
                Err(e) => {
                    debug!(target: "fusebox::view", path, error = %e, "eager render failed; estimating size");
                    estimated_size(source_size)
                }
            }
        } else {
            estimated_size(source_size)
        };
        let mut state = self.state();
        if state.epoch == epoch {
            state.sizes.insert(path.to_string(), size);
        }
        size
    }
}

impl Layer for ContentView {
    fn supported_operations(&self, inner: &dyn FuseboxFs) -> OperationSet {
        inner.supported_operations().union(OperationSet::of(&[
            Operation::Getattr,
            Operation::Open,
            Operation::Read,
            Operation::Release,
        ]))
    }

    fn getattr(
        &self,
        inner: &dyn FuseboxFs,
        path: &str,
        fi: Option<&FileInfo>,
    ) -> FsResult<FileAttributes> {
        if let Some(view) = fi.and_then(|fi| self.views.get(&fi.fh)) {
            let size = view.content.len() as u64;
            drop(view);
            return Ok(inner.getattr(path, None)?.with_size(size));
        }
        let attrs = inner.getattr(path, fi)?;
        if attrs.is_directory() || !self.matches(path) {
            return Ok(attrs);
        }
        let size = self.visible_size(inner, path, attrs.size);
        Ok(attrs.with_size(size))
    }

    fn open(&self, inner: &dyn FuseboxFs, path: &str, fi: &mut FileInfo) -> FsResult<()> {
        if !self.matches(path) || fi.has_write_intent() {
            return inner.open(path, fi);
        }
        let content = self.render(inner, path)?;
        let fh = self.next_fh.fetch_add(1, Ordering::Relaxed);
        {
            let mut state = self.state();
            state.sizes.insert(path.to_string(), content.len() as u64);
            *state.open_counts.entry(path.to_string()).or_insert(0) += 1;
        }
        self.views.insert(
            fh,
            OpenView {
                path: path.to_string(),
                content,
            },
        );
        fi.fh = fh;
        Ok(())
    }

    fn read(
        &self,
        inner: &dyn FuseboxFs,
        path: &str,
        buf: &mut [u8],
        offset: u64,
        fi: &FileInfo,
    ) -> FsResult<usize> {
        let Some(view) = self.views.get(&fi.fh) else {
            return inner.read(path, buf, offset, fi);
        };
        let data = &view.content;
        if offset >= data.len() as u64 {
            return Ok(0);
        }
        let start = offset as usize;
        let n = buf.len().min(data.len() - start);
        buf[..n].copy_from_slice(&data[start..start + n]);
        Ok(n)
    }

    fn write(
        &self,
        inner: &dyn FuseboxFs,
        path: &str,
        data: &[u8],
        offset: u64,
        fi: &FileInfo,
    ) -> FsResult<usize> {
        if self.is_view(fi) {
            return Err(FsError::ReadOnly);
        }
        self.invalidate(path);
        inner.write(path, data, offset, fi)
    }

    fn truncate(
        &self,
        inner: &dyn FuseboxFs,
        path: &str,
        size: u64,
        fi: Option<&FileInfo>,
    ) -> FsResult<()> {
        if fi.is_some_and(|fi| self.is_view(fi)) {
            return Err(FsError::ReadOnly);
        }
        self.invalidate(path);
        inner.truncate(path, size, fi)
    }

    fn release(&self, inner: &dyn FuseboxFs, path: &str, fi: &FileInfo) -> FsResult<()> {
        let Some((_, view)) = self.views.remove(&fi.fh) else {
            return inner.release(path, fi);
        };
        let mut state = self.state();
        let remaining = match state.open_counts.get_mut(&view.path) {
            Some(count) => {
                *count = count.saturating_sub(1);
                *count
            }
            None => 0,
        };
        if remaining == 0 {
            state.open_counts.remove(&view.path);
            state.sizes.remove(&view.path);
        }
        Ok(())
    }

    fn flush(&self, inner: &dyn FuseboxFs, path: &str, fi: &FileInfo) -> FsResult<()> {
        if self.is_view(fi) {
            return Ok(());
        }
        inner.flush(path, fi)
    }

    fn fsync(
        &self,
        inner: &dyn FuseboxFs,
        path: &str,
        datasync: bool,
        fi: &FileInfo,
    ) -> FsResult<()> {
        if self.is_view(fi) {
            return Ok(());
        }
        inner.fsync(path, datasync, fi)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errno::to_errno;
    use crate::testing::RecordingFs;
    use crate::transform::generator::MockContentGenerator;
    use crate::transform::FuseboxFsExt;
    use std::sync::OnceLock;

    fn markdown() -> PathPredicate {
        Arc::new(|rel: &str| rel.ends_with(".md"))
    }

    fn doubling(times: usize) -> Arc<MockContentGenerator> {
        let mut generator = MockContentGenerator::new();
        generator
            .expect_generate()
            .times(times)
            .returning(|_, src| Ok(src.repeat(2)));
        Arc::new(generator)
    }

    #[test]
    fn small_sources_report_exact_size_before_and_after_open() {
        let fs = RecordingFs::new()
            .with_file("/a.md", b"abc")
            .map_file_contents(markdown(), doubling(2));

        assert_eq!(fs.getattr("/a.md", None).unwrap().size, 6);
        // cached
        assert_eq!(fs.getattr("/a.md", None).unwrap().size, 6);

        let mut fi = FileInfo::with_flags(libc::O_RDONLY);
        fs.open("/a.md", &mut fi).unwrap();
        assert!(fi.fh >= VIEW_HANDLE_BASE);
        assert_eq!(fs.getattr("/a.md", Some(&fi)).unwrap().size, 6);

        let mut buf = [0u8; 16];
        assert_eq!(fs.read("/a.md", &mut buf, 0, &fi).unwrap(), 6);
        assert_eq!(&buf[..6], b"abcabc");
        assert_eq!(fs.read("/a.md", &mut buf, 4, &fi).unwrap(), 2);
        assert_eq!(fs.read("/a.md", &mut buf, 6, &fi).unwrap(), 0);
        fs.release("/a.md", &fi).unwrap();
    }

    #[test]
    fn large_sources_are_estimated_until_opened() {
        let source = vec![b'x'; EAGER_SIZE_LIMIT as usize + 1];
        let fs = RecordingFs::new()
            .with_file("/big.md", &source)
            .map_file_contents(markdown(), doubling(1));

        let estimate = fs.getattr("/big.md", None).unwrap().size;
        assert_eq!(estimate, estimated_size(source.len() as u64));

        let mut fi = FileInfo::with_flags(libc::O_RDONLY);
        fs.open("/big.md", &mut fi).unwrap();
        let exact = fs.getattr("/big.md", None).unwrap().size;
        assert_eq!(exact, 2 * source.len() as u64);
        assert!(estimate >= exact);

        fs.release("/big.md", &fi).unwrap();
        assert_eq!(fs.getattr("/big.md", None).unwrap().size, estimate);
    }

    #[test]
    fn estimates_saturate() {
        assert_eq!(estimated_size(u64::MAX / 2 + 1), u64::MAX);
        assert_eq!(estimated_size(10), 10 * ESTIMATE_FACTOR + ESTIMATE_MARGIN);
    }

    #[test]
    fn failed_eager_render_falls_back_to_estimate() {
        let mut generator = MockContentGenerator::new();
        generator
            .expect_generate()
            .times(1)
            .returning(|_, _| Err(FsError::message("renderer crashed")));
        let fs = RecordingFs::new()
            .with_file("/a.md", b"abc")
            .map_file_contents(markdown(), Arc::new(generator));

        assert_eq!(fs.getattr("/a.md", None).unwrap().size, estimated_size(3));
    }

    #[test]
    fn view_handles_reject_modification() {
        let fs = RecordingFs::new()
            .with_file("/a.md", b"abc")
            .map_file_contents(markdown(), doubling(1));

        let mut fi = FileInfo::with_flags(libc::O_RDONLY);
        fs.open("/a.md", &mut fi).unwrap();
        let err = fs.write("/a.md", b"zz", 0, &fi).unwrap_err();
        assert_eq!(to_errno(&err), -libc::EROFS);
        assert!(matches!(fs.truncate("/a.md", 0, Some(&fi)), Err(FsError::ReadOnly)));
    }

    #[test]
    fn write_opens_pass_through_and_invalidate_size() {
        let inner = RecordingFs::new().with_file("/a.md", b"abc");
        let calls = inner.calls();
        let fs = inner.map_file_contents(markdown(), doubling(2));

        assert_eq!(fs.getattr("/a.md", None).unwrap().size, 6);
        let mut fi = FileInfo::with_flags(libc::O_RDWR);
        fs.open("/a.md", &mut fi).unwrap();
        assert!(fi.fh < VIEW_HANDLE_BASE);
        fs.write("/a.md", b"abcd", 0, &fi).unwrap();
        fs.release("/a.md", &fi).unwrap();
        assert_eq!(fs.getattr("/a.md", None).unwrap().size, 8);

        let log = calls.lock().unwrap();
        assert!(log.iter().any(|c| c == "write:/a.md"));
        assert_eq!(log.iter().filter(|c| *c == "release:/a.md").count(), 3);
    }

    #[test]
    fn invalidation_during_render_is_not_overwritten() {
        let inner = RecordingFs::new().with_file("/a.md", b"abc");
        let slot: Arc<OnceLock<Arc<ContentView>>> = Arc::new(OnceLock::new());
        let racing = Arc::clone(&slot);
        let generator = move |path: &str, src: &[u8]| -> FsResult<Vec<u8>> {
            // a writer lands while this render is in flight
            if let Some(view) = racing.get() {
                view.invalidate(path);
            }
            Ok(src.repeat(2))
        };
        let view = Arc::new(ContentView::new(markdown(), Arc::new(generator)));
        assert!(slot.set(Arc::clone(&view)).is_ok());

        assert_eq!(view.getattr(&inner, "/a.md", None).unwrap().size, 6);
        assert!(!view.state().sizes.contains_key("/a.md"));
    }

    #[test]
    fn view_handles_never_reach_the_inner_store() {
        let inner = RecordingFs::new().with_file("/a.md", b"abc");
        let calls = inner.calls();
        let fs = inner.map_file_contents(markdown(), doubling(1));

        let mut fi = FileInfo::with_flags(libc::O_RDONLY);
        fs.open("/a.md", &mut fi).unwrap();
        calls.lock().unwrap().clear();

        fs.flush("/a.md", &fi).unwrap();
        fs.fsync("/a.md", false, &fi).unwrap();
        fs.release("/a.md", &fi).unwrap();
        assert!(calls.lock().unwrap().is_empty());
    }

    #[test]
    fn other_paths_and_directories_are_untouched() {
        let fs = RecordingFs::new()
            .with_file("/notes.txt", b"abc")
            .with_dir("/dir.md")
            .map_file_contents(markdown(), doubling(0));

        assert_eq!(fs.getattr("/notes.txt", None).unwrap().size, 3);
        assert!(fs.getattr("/dir.md", None).unwrap().is_directory());
        let mut fi = FileInfo::with_flags(libc::O_RDONLY);
        fs.open("/notes.txt", &mut fi).unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(fs.read("/notes.txt", &mut buf, 0, &fi).unwrap(), 3);
    }

    #[test]
    fn declared_set_includes_view_operations() {
        let inner = RecordingFs::new().with_supported(OperationSet::of(&[Operation::Readdir]));
        let fs = inner.map_file_contents(markdown(), doubling(0));
        let declared = fs.supported_operations();
        for op in [
            Operation::Readdir,
            Operation::Getattr,
            Operation::Open,
            Operation::Read,
            Operation::Release,
        ] {
            assert!(declared.contains(op), "{op}");
        }
        assert!(!declared.contains(Operation::Write));
    }
}
