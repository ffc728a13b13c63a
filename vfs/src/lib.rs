//! Prefix-routed virtual file system for imagefs.
//!
//! A [`Vfs`] holds an ordered list of `(prefix, backend)` registrations.
//! A logical path is offered to every backend whose prefix it starts with,
//! in registration order, until one succeeds. Several backends can share a
//! prefix; the first to register wins on name conflicts.
//!
//! ```ignore
//! let vfs = Vfs::new();
//! vfs.register("assets/", DirectoryReader::new("./mods"));
//! vfs.register("assets/", ZipAssetReader::new(loader, "")?);
//!
//! let bytes = vfs.read_file("assets/ui/font.ttf")?;
//! ```
//!
//! Absolute local paths bypass the registry and read the disk directly.
//!
//! # Backends
//!
//! - [`DirectoryReader`]: files under a local directory
//! - [`MemoryBackend`]: in-memory storage for tests and embedded assets
//! - [`ZipAssetReader`]: files inside a zip archive, read through any
//!   [`FileLoader`](imagefs_loader::FileLoader) chain
//!
//! Custom backends implement [`VfsBackend`].
//!
//! All operations are synchronous and read-only.

mod backend;
mod config;
mod directory;
mod error;
mod file_info;
mod flat;
mod memory;
pub mod path;
mod vfs;
mod zip_reader;

pub use backend::VfsBackend;
pub use config::{MountConfig, build_vfs};
pub use directory::DirectoryReader;
pub use error::VfsError;
pub use file_info::FileInfo;
pub use memory::MemoryBackend;
pub use vfs::{MAX_VFS_ENTRIES, Vfs};
pub use zip_reader::ZipAssetReader;
