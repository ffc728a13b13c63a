use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::backend::{VfsBackend, finish_listing};
use crate::error::VfsError;
use crate::file_info::FileInfo;
use crate::{flat, path};

/// In-memory backend for tests and embedded assets.
///
/// Thread-safe and mutable even after being registered in a [`Vfs`](crate::Vfs);
/// clones share the same files.
///
/// Directories are implicit: they exist whenever a file path contains
/// that directory prefix.
///
/// # Example
///
/// ```ignore
/// let mem = MemoryBackend::new();
/// mem.insert("ui/font.ttf", font_bytes);
///
/// let vfs = Vfs::new();
/// vfs.register("builtin/", mem.clone());
/// ```
#[derive(Clone, Default)]
pub struct MemoryBackend {
    files: Arc<RwLock<BTreeMap<String, Vec<u8>>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a file, overwriting any existing file at the same path.
    pub fn insert(&self, path: impl Into<String>, data: Vec<u8>) {
        self.files.write().insert(path.into(), data);
    }

    /// Remove a file, returning its data if it existed.
    pub fn remove(&self, path: &str) -> Option<Vec<u8>> {
        self.files.write().remove(path)
    }

    pub fn len(&self) -> usize {
        self.files.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.read().is_empty()
    }
}

impl VfsBackend for MemoryBackend {
    fn read_file(&self, path: &str) -> Result<Vec<u8>, VfsError> {
        let path = path::normalize_file(path)?;
        self.files
            .read()
            .get(&path)
            .cloned()
            .ok_or(VfsError::NotFound(path))
    }

    fn get_file_listing(
        &self,
        path: &str,
        filter: Option<&str>,
    ) -> Result<Vec<FileInfo>, VfsError> {
        let dir = path::normalize(path)?;
        let files = self.files.read();
        let entries = flat::children(
            files.iter().map(|(k, v)| (k.as_str(), v.len() as u64)),
            &dir,
        )
        .ok_or(VfsError::NotFound(dir))?;
        Ok(finish_listing(entries, filter))
    }

    fn get_file_info(&self, path: &str) -> Result<FileInfo, VfsError> {
        let target = path::normalize(path)?;
        let files = self.files.read();
        flat::info(
            files.iter().map(|(k, v)| (k.as_str(), v.len() as u64)),
            &target,
        )
        .ok_or(VfsError::NotFound(target))
    }

    fn describe(&self) -> String {
        format!("memory ({} files)", self.len())
    }
}
