//! Persistent block cache shared between loaders of the same origin.
//!
//! ```ignore
//! let registry = DiskCacheRegistry::new(DiskCacheConfig {
//!     cache_dir: "/var/cache/imagefs".into(),
//!     ..Default::default()
//! });
//! let loader = DiskCachingFileLoader::new(Box::new(LocalFileLoader::open("game.iso")), registry);
//! ```

mod cache;
pub mod format;
mod loader;
mod registry;
pub mod space;

pub use cache::{DiskCachingFileLoaderCache, MAX_BLOCKS_PER_READ};
pub use loader::DiskCachingFileLoader;
pub use registry::{CacheHandle, DiskCacheConfig, DiskCacheRegistry};
