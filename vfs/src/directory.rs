use std::path::{Path, PathBuf};

use crate::backend::{VfsBackend, finish_listing};
use crate::error::VfsError;
use crate::file_info::FileInfo;
use crate::path;

/// Backend serving files under a local directory.
///
/// The root is joined with the normalized relative path to form the actual
/// filesystem path. `..` segments are rejected before they reach the disk.
///
/// # Example
///
/// ```ignore
/// let vfs = Vfs::new();
/// vfs.register("assets/", DirectoryReader::new("./assets"));
///
/// // Reads ./assets/ui/button.png
/// let bytes = vfs.read_file("assets/ui/button.png")?;
/// ```
pub struct DirectoryReader {
    root: PathBuf,
}

impl DirectoryReader {
    /// Create a backend rooted at the given directory.
    ///
    /// The directory does not need to exist yet; it is checked at read time.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, relative: &str) -> Result<(PathBuf, String), VfsError> {
        let normalized = path::normalize(relative)?;
        Ok((self.root.join(&normalized), normalized))
    }
}

impl VfsBackend for DirectoryReader {
    fn read_file(&self, path: &str) -> Result<Vec<u8>, VfsError> {
        let (full_path, _) = self.resolve(path)?;
        read_local(&full_path)
    }

    fn get_file_listing(
        &self,
        path: &str,
        filter: Option<&str>,
    ) -> Result<Vec<FileInfo>, VfsError> {
        let (full_path, normalized) = self.resolve(path)?;
        list_local(&full_path, &normalized, filter)
    }

    fn get_file_info(&self, path: &str) -> Result<FileInfo, VfsError> {
        let (full_path, normalized) = self.resolve(path)?;
        info_local(&full_path, &normalized)
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve(path)
            .is_ok_and(|(full_path, _)| full_path.exists())
    }

    fn describe(&self) -> String {
        format!("directory {}", self.root.display())
    }
}

/// Read a whole file from local disk.
pub(crate) fn read_local(full_path: &Path) -> Result<Vec<u8>, VfsError> {
    Ok(std::fs::read(full_path)?)
}

/// List a local directory. Entry paths are reported relative to `shown_dir`.
pub(crate) fn list_local(
    full_path: &Path,
    shown_dir: &str,
    filter: Option<&str>,
) -> Result<Vec<FileInfo>, VfsError> {
    if !full_path.is_dir() {
        return Err(VfsError::NotFound(full_path.display().to_string()));
    }

    let mut entries = Vec::new();
    for entry in std::fs::read_dir(full_path)? {
        let entry = entry?;
        let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
            continue;
        };
        if name == "." || name == ".." {
            continue;
        }
        match entry.metadata() {
            Ok(metadata) => {
                entries.push(FileInfo::from_metadata(&path::join(shown_dir, &name), &metadata));
            }
            Err(err) => log::warn!("Unable to stat {}: {err}", entry.path().display()),
        }
    }
    Ok(finish_listing(entries, filter))
}

/// Describe a local file or directory.
pub(crate) fn info_local(full_path: &Path, shown: &str) -> Result<FileInfo, VfsError> {
    let metadata = std::fs::metadata(full_path)?;
    Ok(FileInfo::from_metadata(shown, &metadata))
}
