//! Assembling the usual decorator stack from configuration.

use std::path::Path;

use serde::Deserialize;

use crate::cache::{CachingFileLoader, MAX_BLOCKS_CACHED};
use crate::disk_cache::{DiskCacheRegistry, DiskCachingFileLoader};
use crate::error::{LoaderError, LoaderResult};
use crate::file_loader::{FileLoader, ReadFlags};
use crate::local::LocalFileLoader;
use crate::ram_cache::RamCachingFileLoader;
use crate::retry::RetryingFileLoader;
use crate::zip::{ZIP_SIGNATURE, ZipFileLoader};

/// Which in-RAM cache sits on top of the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheMode {
    /// No RAM cache.
    None,
    /// [`RamCachingFileLoader`]: keep every block ever read.
    Ram,
    /// [`CachingFileLoader`]: keep at most `max_blocks` blocks.
    #[default]
    Bounded,
}

/// Loader chain options, usually read from the `[loader]` table of a config file.
///
/// ```toml
/// [loader]
/// retry = true
/// disk_cache = true
/// ram_cache = "bounded"
/// max_blocks = 1024
/// image_extensions = ["iso", "cso"]
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    pub retry: bool,
    pub disk_cache: bool,
    pub ram_cache: CacheMode,
    pub max_blocks: usize,
    /// Entry to open when the image is a zip archive. Defaults to the first
    /// entry with an image extension.
    pub zip_entry: Option<String>,
    pub image_extensions: Vec<String>,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            retry: true,
            disk_cache: false,
            ram_cache: CacheMode::Bounded,
            max_blocks: MAX_BLOCKS_CACHED,
            zip_entry: None,
            image_extensions: ["iso", "cso", "chd", "pbp", "elf"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

/// Open the image at `path` behind the decorators `config` asks for.
///
/// Zip archives (by extension or signature) are unwrapped to the configured
/// entry, with the caches sitting underneath the decompressor.
pub fn open_image(
    path: impl AsRef<Path>,
    config: &ChainConfig,
    registry: &DiskCacheRegistry,
) -> LoaderResult<Box<dyn FileLoader>> {
    let path = path.as_ref();
    let local = LocalFileLoader::open(path);
    if !local.exists() {
        return Err(LoaderError::NotFound(path.to_path_buf()));
    }
    if local.is_directory() {
        return Ok(Box::new(local));
    }

    let chain = wrap_chain(Box::new(local), config, registry);
    if !is_zip(path, chain.as_ref()) {
        return Ok(chain);
    }

    let zip = match &config.zip_entry {
        Some(name) => ZipFileLoader::open_entry(chain, name)?,
        None => ZipFileLoader::open_first_image(chain, &config.image_extensions)?,
    };
    if let Some(entry) = zip.entry() {
        log::info!("Opened {} from archive {}", entry.name, path.display());
    }
    Ok(Box::new(zip))
}

/// Stack the configured decorators on top of `backend`.
pub fn wrap_chain(
    backend: Box<dyn FileLoader>,
    config: &ChainConfig,
    registry: &DiskCacheRegistry,
) -> Box<dyn FileLoader> {
    let mut loader = backend;
    if config.retry {
        loader = Box::new(RetryingFileLoader::new(loader));
    }
    if config.disk_cache {
        loader = Box::new(DiskCachingFileLoader::new(loader, registry.clone()));
    }
    match config.ram_cache {
        CacheMode::None => loader,
        CacheMode::Ram => Box::new(RamCachingFileLoader::new(loader)),
        CacheMode::Bounded => Box::new(CachingFileLoader::with_max_blocks(loader, config.max_blocks)),
    }
}

/// Whether `loader` holds a zip archive.
pub fn is_zip(path: &Path, loader: &dyn FileLoader) -> bool {
    if path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"))
    {
        return true;
    }
    let mut magic = [0u8; 4];
    loader.read_at(0, &mut magic, ReadFlags::empty()) == magic.len() && magic == ZIP_SIGNATURE
}
