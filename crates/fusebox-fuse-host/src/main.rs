// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! fusebox FUSE host
//!
//! Mounts a chain of fusebox layers over a local directory using libfuse.

#[cfg(all(feature = "fuse", target_os = "linux"))]
mod adapter;
#[cfg_attr(not(all(feature = "fuse", target_os = "linux")), allow(dead_code))]
mod inodes;
mod logging;

#[cfg(all(feature = "fuse", target_os = "linux"))]
use adapter::FuseboxFuse;
use anyhow::{bail, Context, Result};
use clap::Parser;
use fusebox_core::transform::{FuseboxFsExt, NameMapper};
use fusebox_core::{FuseboxFs, HelloHidden, MountConfig};
use std::fs;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "fusebox", about = "Mount composable filesystem layers")]
struct Args {
    /// Mount point for the filesystem
    mount_point: PathBuf,

    /// Configuration file (JSON)
    #[arg(short, long, env = "FUSEBOX_CONFIG")]
    config: Option<PathBuf>,

    /// Directory to expose; overrides the configured source
    #[arg(short, long)]
    source: Option<PathBuf>,

    /// Mount the built-in hidden-files demo instead of a directory
    #[arg(long, conflicts_with_all = ["config", "source"])]
    demo: bool,

    /// Allow other users to access the filesystem
    #[arg(long)]
    allow_other: bool,

    /// Allow root to access the filesystem
    #[arg(long)]
    allow_root: bool,

    #[command(flatten)]
    logging: logging::LoggingArgs,
}

fn load_config(config_path: Option<&PathBuf>, source: Option<PathBuf>) -> Result<MountConfig> {
    let mut config: MountConfig = match config_path {
        Some(path) => {
            let content = fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("parsing config {}", path.display()))?
        }
        None => match &source {
            Some(source) => MountConfig {
                source: source.clone(),
                cache: Default::default(),
                fuse: Default::default(),
                layers: Vec::new(),
            },
            None => bail!("either --config or --source is required"),
        },
    };
    if let Some(source) = source {
        config.source = source;
    }
    Ok(config)
}

fn build_chain(args: &Args) -> Result<(Box<dyn FuseboxFs>, MountConfig)> {
    if args.demo {
        let config = MountConfig {
            source: PathBuf::from("/"),
            cache: Default::default(),
            fuse: Default::default(),
            layers: Vec::new(),
        };
        let chain = HelloHidden.map_file_names(NameMapper::strip_prefix("."));
        return Ok((Box::new(chain), config));
    }
    let config = load_config(args.config.as_ref(), args.source.clone())?;
    let chain = config
        .build()
        .with_context(|| format!("building chain over {}", config.source.display()))?;
    Ok((chain, config))
}

fn main() -> Result<()> {
    let args = Args::parse();
    args.logging.init()?;

    info!("Starting fusebox FUSE host");
    info!("Mount point: {}", args.mount_point.display());

    let (chain, config) = build_chain(&args)?;
    info!(
        source = %config.source.display(),
        layers = config.layers.len(),
        supported = ?chain.supported_operations(),
        "chain assembled"
    );

    #[cfg(all(feature = "fuse", target_os = "linux"))]
    {
        let mut mount_options = vec![
            fuser::MountOption::FSName("fusebox".to_string()),
            fuser::MountOption::Subtype("fusebox".to_string()),
        ];

        info!(
            "Cache policy: attr={}ms entry={}ms negative={}ms",
            config.cache.attr_ttl_ms, config.cache.entry_ttl_ms, config.cache.negative_ttl_ms
        );

        if args.allow_other {
            mount_options.push(fuser::MountOption::AllowOther);
        }

        if args.allow_root {
            mount_options.push(fuser::MountOption::AllowRoot);
        }

        if config.fuse.auto_unmount {
            mount_options.push(fuser::MountOption::AutoUnmount);
        }

        let filesystem = FuseboxFuse::new(chain, config);
        info!("Mounting filesystem...");
        let session = fuser::spawn_mount2(filesystem, &args.mount_point, &mount_options)?;
        info!("fusebox mounted; blocking until unmount");
        session.join();
    }

    #[cfg(not(all(feature = "fuse", target_os = "linux")))]
    {
        let _ = (args.allow_other, args.allow_root, chain);
        tracing::warn!("FUSE support not compiled in. This binary is for testing only.");
        info!("To enable FUSE support, compile with: cargo build --features fuse");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fusebox_core::LayerConfig;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from([
            "fusebox",
            "/mnt/x",
            "--source",
            "/srv",
            "--allow-other",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert_eq!(args.mount_point, PathBuf::from("/mnt/x"));
        assert_eq!(args.source, Some(PathBuf::from("/srv")));
        assert!(args.allow_other);
        assert!(!args.demo);
        assert_eq!(args.logging.log_level, Some(logging::LogLevel::Debug));
    }

    #[test]
    fn test_demo_conflicts_with_source() {
        assert!(Args::try_parse_from(["fusebox", "/mnt/x", "--demo", "--source", "/srv"]).is_err());
    }

    #[test]
    fn test_config_requires_a_source() {
        assert!(load_config(None, None).is_err());
        let config = load_config(None, Some(PathBuf::from("/srv"))).unwrap();
        assert_eq!(config.source, PathBuf::from("/srv"));
        assert!(config.fuse.auto_unmount);
    }

    #[test]
    fn test_config_loading_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        let config_json = r#"{
            "source": "/srv/data",
            "cache": {"attr_ttl_ms": 500, "entry_ttl_ms": 500, "negative_ttl_ms": 0},
            "fuse": {"max_background": 32, "auto_unmount": false},
            "layers": [
                {"rename": {"strip_prefix": "."}},
                {"read_only": {}}
            ]
        }"#;
        temp_file.write_all(config_json.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let config_path = temp_file.path().to_path_buf();
        let config = load_config(Some(&config_path), None).unwrap();
        assert_eq!(config.cache.attr_ttl_ms, 500);
        assert_eq!(config.cache.negative_ttl_ms, 0);
        assert_eq!(config.fuse.max_background, Some(32));
        assert!(!config.fuse.auto_unmount);
        assert_eq!(config.layers.len(), 2);
        assert!(matches!(config.layers[1], LayerConfig::ReadOnly(_)));

        let overridden = load_config(Some(&config_path), Some(PathBuf::from("/other"))).unwrap();
        assert_eq!(overridden.source, PathBuf::from("/other"));
    }

    #[test]
    fn test_malformed_config_is_reported() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"{not json").unwrap();
        let err = load_config(Some(&temp_file.path().to_path_buf()), None).unwrap_err();
        assert!(err.to_string().contains("parsing config"), "{err}");
    }

    #[test]
    fn test_chain_builds_over_source_directory() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(".a"), b"").unwrap();
        let args = Args::try_parse_from([
            "fusebox",
            "/mnt/x",
            "--source",
            dir.path().to_str().unwrap(),
        ])
        .unwrap();
        let (chain, config) = build_chain(&args).unwrap();
        assert_eq!(config.source, dir.path());
        assert!(chain.getattr("/.a", None).is_ok());
    }

    #[test]
    fn test_demo_chain_shows_plain_names() {
        let args = Args::try_parse_from(["fusebox", "/mnt/x", "--demo"]).unwrap();
        let (chain, _) = build_chain(&args).unwrap();
        let mut names: Vec<_> = chain.readdir("/").unwrap().into_iter().map(|e| e.name).collect();
        names.sort();
        assert_eq!(names, vec!["docs", "hello.txt"]);
    }
}
