use std::collections::{HashMap, HashSet};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Deserialize;

use super::DiskCachingFileLoaderCache;
use super::space::SAFETY_FREE_DISK_SPACE;

/// Where and how large disk caches are.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DiskCacheConfig {
    /// Directory holding the `.dcache` files.
    pub cache_dir: PathBuf,
    /// Fixed capacity per cache file, in blocks. Sized from free disk space
    /// when unset.
    pub max_blocks: Option<u32>,
    /// Free space left untouched on the cache volume.
    pub reserved_free_bytes: u64,
}

impl Default for DiskCacheConfig {
    fn default() -> Self {
        Self {
            cache_dir: std::env::temp_dir().join("imagefs").join("cache"),
            max_blocks: None,
            reserved_free_bytes: SAFETY_FREE_DISK_SPACE,
        }
    }
}

/// Owner of every open [`DiskCachingFileLoaderCache`] in a session.
///
/// Loaders for the same origin path share one cache instance. The registry
/// counts handles; when the last [`CacheHandle`] for a path is dropped, the
/// cache is shut down while the registry lock is held, so a concurrent
/// `acquire` for that path either gets the live instance or opens the file
/// after it has been fully released.
///
/// Cloning is cheap and yields a handle to the same registry.
#[derive(Clone)]
pub struct DiskCacheRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    config: DiskCacheConfig,
    caches: Mutex<HashMap<PathBuf, RegistryEntry>>,
}

struct RegistryEntry {
    cache: Arc<DiskCachingFileLoaderCache>,
    refs: usize,
}

impl DiskCacheRegistry {
    pub fn new(config: DiskCacheConfig) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                config,
                caches: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn config(&self) -> &DiskCacheConfig {
        &self.inner.config
    }

    /// Get the shared cache for `origin`, opening it on first use.
    pub fn acquire(&self, origin: &Path, origin_size: u64) -> CacheHandle {
        let mut caches = self.inner.caches.lock();

        if let Some(entry) = caches.get_mut(origin) {
            entry.refs += 1;
            return CacheHandle {
                registry: self.inner.clone(),
                origin: origin.to_path_buf(),
                cache: entry.cache.clone(),
            };
        }

        let in_use: HashSet<PathBuf> = caches
            .values()
            .map(|entry| entry.cache.cache_path().to_path_buf())
            .collect();
        let cache = Arc::new(DiskCachingFileLoaderCache::open(
            origin,
            origin_size,
            &self.inner.config,
            &in_use,
        ));
        caches.insert(
            origin.to_path_buf(),
            RegistryEntry {
                cache: cache.clone(),
                refs: 1,
            },
        );

        CacheHandle {
            registry: self.inner.clone(),
            origin: origin.to_path_buf(),
            cache,
        }
    }

    /// Cache files currently held open by this registry.
    pub fn paths_in_use(&self) -> Vec<PathBuf> {
        self.inner
            .caches
            .lock()
            .values()
            .map(|entry| entry.cache.cache_path().to_path_buf())
            .collect()
    }

    /// Number of origins with a live cache.
    pub fn open_count(&self) -> usize {
        self.inner.caches.lock().len()
    }
}

/// A counted reference to a shared cache. Dereferences to the cache.
pub struct CacheHandle {
    registry: Arc<RegistryInner>,
    origin: PathBuf,
    cache: Arc<DiskCachingFileLoaderCache>,
}

impl Deref for CacheHandle {
    type Target = DiskCachingFileLoaderCache;

    fn deref(&self) -> &Self::Target {
        &self.cache
    }
}

impl Drop for CacheHandle {
    fn drop(&mut self) {
        let mut caches = self.registry.caches.lock();
        let Some(entry) = caches.get_mut(&self.origin) else {
            return;
        };
        entry.refs -= 1;
        if entry.refs == 0 {
            if let Some(entry) = caches.remove(&self.origin) {
                entry.cache.shutdown();
            }
            log::debug!("Released disk cache for {}", self.origin.display());
        }
    }
}
