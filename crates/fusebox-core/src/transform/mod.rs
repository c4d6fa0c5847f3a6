// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Concrete layers and the fluent chaining API.

pub mod content_view;
pub mod filtered;
pub mod generator;
pub mod read_only;
pub mod read_only_dirs;
pub mod renamed;

use std::sync::Arc;

use crate::decorate::{Decorated, Selective};
use crate::fs::FuseboxFs;

pub use content_view::ContentView;
pub use filtered::Filtered;
pub use generator::{ContentGenerator, ProcessGenerator};
pub use read_only::ReadOnly;
pub use read_only_dirs::ReadOnlyDirs;
pub use renamed::{NameMapper, Renamed};

/// Predicate over a path relative to root, without the leading `/`.
pub type PathPredicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Maps one path segment to another.
pub type NameFn = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Builds chains by stacking layers on any store.
///
/// ```
/// use std::sync::Arc;
/// use fusebox_core::testing::RecordingFs;
/// use fusebox_core::transform::FuseboxFsExt;
///
/// let fs = RecordingFs::new()
///     .with_file("/notes.txt", b"hi")
///     .filter_paths(Arc::new(|rel: &str| !rel.ends_with(".tmp")))
///     .read_only();
/// # let _ = fs;
/// ```
pub trait FuseboxFsExt: FuseboxFs + Sized + 'static {
    fn filter_paths(self, allow: PathPredicate) -> Decorated<Filtered> {
        Decorated::new(Filtered::new(allow), Box::new(self))
    }

    fn map_file_names(self, mapper: NameMapper) -> Decorated<Renamed> {
        Decorated::new(Renamed::new(mapper), Box::new(self))
    }

    fn read_only(self) -> Decorated<ReadOnly> {
        Decorated::new(ReadOnly, Box::new(self))
    }

    fn with_read_only_dirs(self, selector: PathPredicate) -> Decorated<Selective<ReadOnlyDirs>> {
        Decorated::new(Selective(ReadOnlyDirs::new(selector)), Box::new(self))
    }

    fn map_file_contents(
        self,
        selector: PathPredicate,
        generator: Arc<dyn ContentGenerator>,
    ) -> Decorated<ContentView> {
        Decorated::new(ContentView::new(selector, generator), Box::new(self))
    }
}

impl<F: FuseboxFs + Sized + 'static> FuseboxFsExt for F {}
