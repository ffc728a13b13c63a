use std::path::Path;
use std::sync::OnceLock;

use crate::file_loader::{FileLoader, ProxiedFileLoader, ReadFlags};

use super::{CacheHandle, DiskCacheRegistry};

/// Decorator that keeps blocks of its backend in a persistent cache file.
///
/// The cache is opened lazily on the first call that needs it, and only for
/// backends reporting a positive size. Every loader over the same origin path
/// shares one [`DiskCachingFileLoaderCache`](super::DiskCachingFileLoaderCache)
/// through the registry.
pub struct DiskCachingFileLoader {
    backend: ProxiedFileLoader,
    registry: DiskCacheRegistry,
    prepared: OnceLock<Prepared>,
}

struct Prepared {
    file_size: i64,
    cache: Option<CacheHandle>,
}

impl DiskCachingFileLoader {
    pub fn new(backend: Box<dyn FileLoader>, registry: DiskCacheRegistry) -> Self {
        Self {
            backend: ProxiedFileLoader::new(backend),
            registry,
            prepared: OnceLock::new(),
        }
    }

    fn prepare(&self) -> &Prepared {
        self.prepared.get_or_init(|| {
            let file_size = self.backend.file_size();
            let cache = (file_size > 0).then(|| {
                self.registry
                    .acquire(self.backend.path(), file_size as u64)
            });
            Prepared { file_size, cache }
        })
    }

    /// The shared cache, if one was opened and is usable.
    pub fn cache(&self) -> Option<&CacheHandle> {
        self.prepare()
            .cache
            .as_ref()
            .filter(|cache| cache.is_valid())
    }
}

impl FileLoader for DiskCachingFileLoader {
    fn exists(&self) -> bool {
        if self.backend.exists() {
            return true;
        }
        self.prepare()
            .cache
            .as_ref()
            .is_some_and(|cache| cache.has_data())
    }

    fn is_directory(&self) -> bool {
        self.backend.is_directory()
    }

    fn file_size(&self) -> i64 {
        self.prepare().file_size
    }

    fn path(&self) -> &Path {
        self.backend.path()
    }

    fn read_at(&self, pos: u64, buf: &mut [u8], flags: ReadFlags) -> usize {
        let prepared = self.prepare();
        let cache = match &prepared.cache {
            Some(cache) if cache.is_valid() && !flags.contains(ReadFlags::NO_CACHE) => cache,
            _ => return self.backend.read_at(pos, buf, flags),
        };

        let len = crate::block::clamp_len(pos, buf.len(), prepared.file_size);
        let buf = &mut buf[..len];

        let mut read = 0;
        while read < len {
            let at = pos + read as u64;
            let hit = cache.read_from_cache(at, &mut buf[read..]);
            if hit > 0 {
                read += hit;
                continue;
            }
            let filled = cache.save_into_cache(self.backend.backend(), at, &mut buf[read..], flags);
            if filled == 0 {
                break;
            }
            read += filled;
        }
        read
    }

    fn cancel(&self) {
        self.backend.cancel();
    }
}
