use crate::VfsError;
use crate::file_info::FileInfo;

/// A source of files mounted into a [`Vfs`](crate::Vfs) under a prefix.
///
/// # Path Contract
///
/// Paths passed to backend methods are relative to the mount: the registry
/// strips the matched prefix and hands over the remainder untouched.
/// Backends normalize it themselves (see [`path::normalize`](crate::path::normalize))
/// and must reject `..` segments.
///
/// # Filters
///
/// `filter` in [`get_file_listing`](VfsBackend::get_file_listing) is a
/// `:`-separated, case-insensitive extension list (`"png:jpg"`); directories
/// always pass. See [`FileInfo::matches_filter`].
pub trait VfsBackend: Send + Sync + 'static {
    /// Read the entire contents of a file.
    fn read_file(&self, path: &str) -> Result<Vec<u8>, VfsError>;

    /// List the immediate children of a directory, sorted by name.
    fn get_file_listing(&self, path: &str, filter: Option<&str>)
    -> Result<Vec<FileInfo>, VfsError>;

    /// Describe a single file or directory.
    fn get_file_info(&self, path: &str) -> Result<FileInfo, VfsError>;

    /// Whether a file or directory exists at `path`.
    fn exists(&self, path: &str) -> bool {
        self.get_file_info(path).is_ok_and(|info| info.exists)
    }

    /// Short human-readable description, used in logs.
    fn describe(&self) -> String;
}

/// Sort a listing by name and apply `filter`.
pub(crate) fn finish_listing(mut entries: Vec<FileInfo>, filter: Option<&str>) -> Vec<FileInfo> {
    entries.retain(|info| info.matches_filter(filter));
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    entries
}
