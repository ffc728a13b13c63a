use std::path::Path;

use imagefs_loader::{ChainConfig, DiskCacheConfig};
use imagefs_vfs::MountConfig;
use serde::Deserialize;

use crate::args::Args;

/// Tool configuration, usually loaded from a TOML file.
///
/// ```toml
/// [loader]
/// disk_cache = true
/// ram_cache = "ram"
///
/// [disk_cache]
/// cache_dir = "/var/cache/imagefs"
///
/// [[mount]]
/// prefix = "assets/"
/// path = "./assets"
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    pub loader: ChainConfig,
    pub disk_cache: DiskCacheConfig,
    pub mount: Vec<MountConfig>,
}

/// Load a config from a TOML file.
///
/// Returns `Err` with a human-readable message if the file cannot be read
/// or parsed.
pub fn load_config(path: &Path) -> Result<ToolConfig, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {e}", path.display()))?;
    toml::from_str(&content).map_err(|e| format!("failed to parse {}: {e}", path.display()))
}

/// The config named on the command line (or the default), with command
/// line overrides applied.
pub fn resolve(args: &Args) -> Result<ToolConfig, String> {
    let mut config = match &args.config {
        Some(path) => {
            let config = load_config(path)?;
            log::info!(
                "Loaded config {} ({} mounts)",
                path.display(),
                config.mount.len()
            );
            config
        }
        None => ToolConfig::default(),
    };

    if let Some(dir) = &args.cache_dir {
        config.disk_cache.cache_dir = dir.clone();
    }
    if args.no_disk_cache {
        config.loader.disk_cache = false;
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use imagefs_loader::CacheMode;

    #[test]
    fn full_config() {
        let config: ToolConfig = toml::from_str(
            r#"
            [loader]
            disk_cache = true
            ram_cache = "none"

            [disk_cache]
            cache_dir = "/tmp/imagefs-test"
            max_blocks = 512

            [[mount]]
            prefix = "assets/"
            path = "./assets"
            "#,
        )
        .unwrap();
        assert!(config.loader.disk_cache);
        assert!(config.loader.retry);
        assert_eq!(config.loader.ram_cache, CacheMode::None);
        assert_eq!(config.disk_cache.max_blocks, Some(512));
        assert_eq!(config.mount.len(), 1);
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config: ToolConfig = toml::from_str("").unwrap();
        assert!(!config.loader.disk_cache);
        assert!(config.mount.is_empty());
    }

    #[test]
    fn overrides_apply() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("imagefs.toml");
        std::fs::write(&path, "[loader]\ndisk_cache = true\n").unwrap();

        let args = Args::parse_from([
            "imagefs",
            "--config",
            path.to_str().unwrap(),
            "--cache-dir",
            "/elsewhere",
            "--no-disk-cache",
            "cache-ls",
        ]);
        let config = resolve(&args).unwrap();
        assert!(!config.loader.disk_cache);
        assert_eq!(config.disk_cache.cache_dir, Path::new("/elsewhere"));
    }

    #[test]
    fn bad_config_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[loader\n").unwrap();
        let err = load_config(&path).unwrap_err();
        assert!(err.starts_with("failed to parse"));
        assert!(load_config(&dir.path().join("missing.toml")).is_err());
    }
}
