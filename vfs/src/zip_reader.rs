use std::sync::Arc;

use imagefs_loader::{FileLoader, ZipArchive};

use crate::backend::{VfsBackend, finish_listing};
use crate::error::VfsError;
use crate::file_info::FileInfo;
use crate::{flat, path};

/// Backend serving the files of a zip archive.
///
/// The archive is read through a [`FileLoader`], so it can live anywhere a
/// loader can reach, and benefits from whatever caching the loader chain
/// provides. Only entries under `in_archive_root` are visible, with that
/// root stripped from their names.
pub struct ZipAssetReader {
    loader: Arc<dyn FileLoader>,
    archive: ZipArchive,
    root: String,
}

impl ZipAssetReader {
    /// Parse the archive behind `loader`.
    pub fn new(loader: Box<dyn FileLoader>, in_archive_root: &str) -> Result<Self, VfsError> {
        let loader: Arc<dyn FileLoader> = Arc::from(loader);
        let archive = ZipArchive::parse(loader.as_ref())?;
        let root = path::normalize(in_archive_root)?;
        log::debug!(
            "Opened zip {} ({} entries, root {root:?})",
            loader.path().display(),
            archive.len()
        );
        Ok(Self {
            loader,
            archive,
            root,
        })
    }

    fn archive_name(&self, relative: &str) -> Result<String, VfsError> {
        let relative = path::normalize(relative)?;
        Ok(path::join(&self.root, &relative))
    }

    /// Entries under the root, as `(name relative to root, size)`.
    fn visible(&self) -> impl Iterator<Item = (&str, u64)> {
        let prefix = if self.root.is_empty() {
            String::new()
        } else {
            format!("{}/", self.root)
        };
        self.archive.entries().iter().filter_map(move |entry| {
            entry
                .name
                .strip_prefix(prefix.as_str())
                .filter(|rest| !rest.is_empty())
                .map(|rest| (rest, entry.uncompressed_size))
        })
    }
}

impl VfsBackend for ZipAssetReader {
    fn read_file(&self, path: &str) -> Result<Vec<u8>, VfsError> {
        let name = self.archive_name(path)?;
        Ok(self.archive.read_entry(self.loader.as_ref(), &name)?)
    }

    fn get_file_listing(
        &self,
        path: &str,
        filter: Option<&str>,
    ) -> Result<Vec<FileInfo>, VfsError> {
        let dir = path::normalize(path)?;
        let entries = flat::children(self.visible(), &dir).ok_or(VfsError::NotFound(dir))?;
        Ok(finish_listing(entries, filter))
    }

    fn get_file_info(&self, path: &str) -> Result<FileInfo, VfsError> {
        let target = path::normalize(path)?;
        flat::info(self.visible(), &target).ok_or(VfsError::NotFound(target))
    }

    fn describe(&self) -> String {
        if self.root.is_empty() {
            format!("zip {}", self.loader.path().display())
        } else {
            format!("zip {}:{}", self.loader.path().display(), self.root)
        }
    }
}
