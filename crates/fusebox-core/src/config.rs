// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! JSON mount configuration and chain assembly.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::decorate::{Decorated, Selective};
use crate::error::{FsError, FsResult};
use crate::fs::FuseboxFs;
use crate::transform::{
    ContentView, Filtered, NameMapper, PathPredicate, ProcessGenerator, ReadOnly, ReadOnlyDirs,
    Renamed,
};
use crate::types::ConnectionSettings;

fn default_ttl_ms() -> u64 {
    1000
}

fn default_true() -> bool {
    true
}

/// Kernel cache lifetimes handed out with every reply.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachePolicy {
    #[serde(default = "default_ttl_ms")]
    pub attr_ttl_ms: u64,
    #[serde(default = "default_ttl_ms")]
    pub entry_ttl_ms: u64,
    #[serde(default = "default_ttl_ms")]
    pub negative_ttl_ms: u64,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            attr_ttl_ms: default_ttl_ms(),
            entry_ttl_ms: default_ttl_ms(),
            negative_ttl_ms: default_ttl_ms(),
        }
    }
}

/// Session knobs. Unset values keep whatever the chain requested at init.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FuseOptions {
    #[serde(default)]
    pub max_background: Option<u16>,
    #[serde(default)]
    pub congestion_threshold: Option<u16>,
    #[serde(default = "default_true")]
    pub auto_unmount: bool,
}

impl Default for FuseOptions {
    fn default() -> Self {
        Self {
            max_background: None,
            congestion_threshold: None,
            auto_unmount: true,
        }
    }
}

impl FuseOptions {
    pub fn apply(&self, conn: &mut ConnectionSettings) {
        if self.max_background.is_some() {
            conn.max_background = self.max_background;
        }
        if self.congestion_threshold.is_some() {
            conn.congestion_threshold = self.congestion_threshold;
        }
    }
}

/// Paths are kept when they match some `include` (or `include` is empty)
/// and no `exclude`. Patterns search the path relative to root.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterConfig {
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

/// Exactly one of the prefix fields must be set.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameConfig {
    #[serde(default)]
    pub strip_prefix: Option<String>,
    #[serde(default)]
    pub add_prefix: Option<String>,
    #[serde(default)]
    pub translate_links: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadOnlyConfig {}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadOnlyDirsConfig {
    pub pattern: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentViewConfig {
    pub pattern: String,
    pub command: Vec<String>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerConfig {
    Filter(FilterConfig),
    Rename(RenameConfig),
    ReadOnly(ReadOnlyConfig),
    ReadOnlyDirs(ReadOnlyDirsConfig),
    ContentView(ContentViewConfig),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountConfig {
    /// Local directory exposed at the mount root.
    pub source: PathBuf,
    #[serde(default)]
    pub cache: CachePolicy,
    #[serde(default)]
    pub fuse: FuseOptions,
    /// Applied innermost first.
    #[serde(default)]
    pub layers: Vec<LayerConfig>,
}

fn compile(pattern: &str) -> FsResult<Regex> {
    Regex::new(pattern)
        .map_err(|e| FsError::InvalidArgument.context(format!("invalid pattern {pattern:?}: {e}")))
}

fn compile_all(patterns: &[String]) -> FsResult<Vec<Regex>> {
    patterns.iter().map(|p| compile(p)).collect()
}

fn matching(pattern: &str) -> FsResult<PathPredicate> {
    let re = compile(pattern)?;
    Ok(Arc::new(move |rel: &str| re.is_match(rel)))
}

impl LayerConfig {
    /// Wraps `inner` in the layer this entry describes.
    pub fn apply(&self, inner: Box<dyn FuseboxFs>) -> FsResult<Box<dyn FuseboxFs>> {
        Ok(match self {
            LayerConfig::Filter(cfg) => {
                let include = compile_all(&cfg.include)?;
                let exclude = compile_all(&cfg.exclude)?;
                let allow: PathPredicate = Arc::new(move |rel: &str| {
                    (include.is_empty() || include.iter().any(|re| re.is_match(rel)))
                        && !exclude.iter().any(|re| re.is_match(rel))
                });
                Box::new(Decorated::new(Filtered::new(allow), inner))
            }
            LayerConfig::Rename(cfg) => {
                let mapper = match (&cfg.strip_prefix, &cfg.add_prefix) {
                    (Some(prefix), None) => NameMapper::strip_prefix(prefix),
                    (None, Some(prefix)) => NameMapper::add_prefix(prefix),
                    _ => {
                        return Err(FsError::InvalidArgument
                            .context("rename needs exactly one of strip_prefix or add_prefix"))
                    }
                };
                let mapper = if cfg.translate_links {
                    mapper.translating_relative_link_targets()
                } else {
                    mapper
                };
                Box::new(Decorated::new(Renamed::new(mapper), inner))
            }
            LayerConfig::ReadOnly(_) => Box::new(Decorated::new(ReadOnly, inner)),
            LayerConfig::ReadOnlyDirs(cfg) => Box::new(Decorated::new(
                Selective(ReadOnlyDirs::new(matching(&cfg.pattern)?)),
                inner,
            )),
            LayerConfig::ContentView(cfg) => {
                if cfg.command.is_empty() {
                    return Err(FsError::InvalidArgument.context("content_view needs a command"));
                }
                let mut generator = ProcessGenerator::new(cfg.command.iter().cloned());
                if let Some(ms) = cfg.timeout_ms {
                    generator = generator.timeout(Duration::from_millis(ms));
                }
                for (key, value) in &cfg.env {
                    generator = generator.env(key.clone(), value.clone());
                }
                Box::new(Decorated::new(
                    ContentView::new(matching(&cfg.pattern)?, Arc::new(generator)),
                    inner,
                ))
            }
        })
    }
}

impl MountConfig {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Stacks the configured layers on `base`.
    pub fn build_on(&self, base: Box<dyn FuseboxFs>) -> FsResult<Box<dyn FuseboxFs>> {
        self.layers.iter().try_fold(base, |fs, layer| layer.apply(fs))
    }

    /// Builds the chain over a [`crate::local::LocalFs`] rooted at `source`.
    #[cfg(unix)]
    pub fn build(&self) -> FsResult<Box<dyn FuseboxFs>> {
        if !self.source.is_dir() {
            return Err(FsError::NotADirectory
                .context(format!("source {} is not a directory", self.source.display())));
        }
        self.build_on(Box::new(crate::local::LocalFs::new(self.source.clone())))
    }
}
