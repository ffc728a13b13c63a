//! Random-access file loaders for large read-only images.
//!
//! A loader chain is a stack of [`FileLoader`] decorators, each owning exactly
//! one backend. Leaves read bytes from somewhere ([`LocalFileLoader`],
//! [`MemoryFileLoader`]); decorators add behavior on top:
//!
//! - [`RetryingFileLoader`]: retries short reads a bounded number of times
//! - [`RamCachingFileLoader`]: unbounded in-RAM block cache with read-ahead
//! - [`CachingFileLoader`]: bounded in-RAM block cache with generation eviction
//! - [`DiskCachingFileLoader`]: persistent block cache shared per origin path
//! - [`ZipFileLoader`]: one zip entry, with archive I/O routed through the backend
//!
//! # Example
//!
//! ```ignore
//! let local = LocalFileLoader::open("games/image.iso");
//! let chain = CachingFileLoader::new(Box::new(RetryingFileLoader::new(Box::new(local))));
//!
//! let mut sector = [0u8; 2048];
//! let read = chain.read_at(16 * 2048, &mut sector, ReadFlags::empty());
//! ```
//!
//! [`chain::open_image`] assembles the usual chain from a [`ChainConfig`].
//!
//! # Errors
//!
//! Reads never fail loudly: a backend that cannot deliver surfaces as a short
//! (or zero-length) read. Only constructors that parse something (zip archives,
//! chain assembly) return [`LoaderError`].

pub mod block;
mod cache;
pub mod chain;
pub mod disk_cache;
mod error;
mod file_loader;
mod local;
mod memory;
mod ram_cache;
mod readahead;
mod retry;
pub mod zip;

pub use cache::{CachingFileLoader, MAX_BLOCKS_CACHED};
pub use chain::{CacheMode, ChainConfig, open_image, wrap_chain};
pub use disk_cache::{
    CacheHandle, DiskCacheConfig, DiskCacheRegistry, DiskCachingFileLoader,
    DiskCachingFileLoaderCache, MAX_BLOCKS_PER_READ,
};
pub use error::{LoaderError, LoaderResult};
pub use file_loader::{FileLoader, ProxiedFileLoader, ReadFlags};
pub use local::LocalFileLoader;
pub use memory::MemoryFileLoader;
pub use ram_cache::RamCachingFileLoader;
pub use retry::RetryingFileLoader;
pub use zip::{CompressionMethod, LoaderSource, ZipArchive, ZipEntry, ZipFileLoader};
