// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Composable user-space filesystem layers.
//!
//! A chain is a backing store (such as [`LocalFs`]) wrapped in transforms that
//! filter, rename, protect or rewrite what it exposes. [`FuseboxOperations`]
//! drives a chain with path-level kernel callbacks.

pub mod config;
pub mod decorate;
pub mod driving;
pub mod errno;
pub mod error;
pub mod fs;
pub mod hello;
#[cfg(unix)]
pub mod local;
pub mod ops;
pub mod testing;
pub mod transform;
pub mod types;

pub use config::{LayerConfig, MountConfig};
pub use decorate::{Decorated, Layer, Selective, SelectiveLayer};
pub use driving::{normalize_path, DirFiller, FuseboxOperations, Stat};
pub use errno::{errno_of, to_errno};
pub use error::{FsError, FsResult, ResultExt};
pub use fs::{FuseboxFs, RENAME_NOREPLACE};
pub use hello::HelloHidden;
#[cfg(unix)]
pub use local::LocalFs;
pub use ops::{Operation, OperationSet};
pub use transform::FuseboxFsExt;
pub use types::{
    ConnectionSettings, DirEntry, FileAttributes, FileInfo, FileType, StatvfsData, TimeSpec,
};
