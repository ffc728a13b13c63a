use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::backend::VfsBackend;
use crate::directory;
use crate::error::VfsError;
use crate::file_info::FileInfo;
use crate::path;

/// Most backends one registry holds. Registrations past this are ignored.
pub const MAX_VFS_ENTRIES: usize = 16;

/// Virtual file system that routes paths to registered backends by prefix.
///
/// A backend is a candidate for a path when its prefix is strictly shorter
/// than the path and matches the path's leading bytes exactly; the backend
/// sees the remainder. Candidates are tried in registration order and the
/// first success wins, so several backends may share a prefix and act as
/// fallbacks for each other.
///
/// Absolute local paths (`/…`, `C:…`, `\\…`, `//…`) never consult the
/// registry and go straight to local disk. `content://` URIs go to the
/// content backend if one is set.
///
/// `Clone` is cheap (Arc internals). Thread-safe (`Send + Sync`).
///
/// # Example
///
/// ```ignore
/// let vfs = Vfs::new();
/// vfs.register("assets/", DirectoryReader::new("./assets"));
/// vfs.register("assets/", ZipAssetReader::new(Box::new(LocalFileLoader::open("assets.zip")), "")?);
///
/// // Tried in ./assets first, then inside assets.zip
/// let bytes = vfs.read_file("assets/ui/button.png")?;
/// ```
#[derive(Clone, Default)]
pub struct Vfs {
    inner: Arc<RwLock<VfsInner>>,
}

#[derive(Default)]
struct VfsInner {
    entries: Vec<VfsEntry>,
    content_uri: Option<Box<dyn VfsBackend>>,
}

struct VfsEntry {
    prefix: String,
    backend: Box<dyn VfsBackend>,
}

impl Vfs {
    /// Create an empty VFS with no registered backends.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `backend` under `prefix`.
    ///
    /// Returns `false` (and logs) when the registry is full.
    pub fn register(&self, prefix: impl Into<String>, backend: impl VfsBackend) -> bool {
        let prefix = prefix.into();
        let mut inner = self.inner.write();
        if inner.entries.len() >= MAX_VFS_ENTRIES {
            log::error!(
                "Too many VFS entries, ignoring {prefix:?} -> {}",
                backend.describe()
            );
            return false;
        }
        log::info!("VFS mount: {prefix:?} -> {}", backend.describe());
        inner.entries.push(VfsEntry {
            prefix,
            backend: Box::new(backend),
        });
        true
    }

    /// Route `content://` URIs to `backend`.
    pub fn set_content_uri_backend(&self, backend: impl VfsBackend) {
        self.inner.write().content_uri = Some(Box::new(backend));
    }

    /// Drop every registered backend.
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.entries.clear();
        inner.content_uri = None;
    }

    /// Number of registered backends.
    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registered prefixes with their backend descriptions, in order.
    pub fn mounts(&self) -> Vec<(String, String)> {
        self.inner
            .read()
            .entries
            .iter()
            .map(|entry| (entry.prefix.clone(), entry.backend.describe()))
            .collect()
    }

    /// Read the entire contents of a file.
    pub fn read_file(&self, path: &str) -> Result<Vec<u8>, VfsError> {
        self.dispatch(
            path,
            directory::read_local,
            |backend, rest| backend.read_file(rest),
        )
    }

    /// List the immediate children of a directory.
    pub fn get_file_listing(
        &self,
        path: &str,
        filter: Option<&str>,
    ) -> Result<Vec<FileInfo>, VfsError> {
        self.dispatch(
            path,
            |local| directory::list_local(local, path, filter),
            |backend, rest| backend.get_file_listing(rest, filter),
        )
    }

    /// Describe a file or directory.
    pub fn get_file_info(&self, path: &str) -> Result<FileInfo, VfsError> {
        self.dispatch(
            path,
            |local| directory::info_local(local, path),
            |backend, rest| backend.get_file_info(rest),
        )
    }

    /// Whether any backend responsible for `path` has it.
    pub fn exists(&self, path: &str) -> bool {
        self.dispatch(
            path,
            |local| Ok(local.exists()),
            |backend, rest| {
                if backend.exists(rest) {
                    Ok(true)
                } else {
                    Err(VfsError::NotFound(rest.to_string()))
                }
            },
        )
        .unwrap_or(false)
    }

    fn dispatch<T>(
        &self,
        path: &str,
        local: impl FnOnce(&Path) -> Result<T, VfsError>,
        mut op: impl FnMut(&dyn VfsBackend, &str) -> Result<T, VfsError>,
    ) -> Result<T, VfsError> {
        let inner = self.inner.read();

        if path::is_content_uri(path) {
            return match &inner.content_uri {
                Some(backend) => op(backend.as_ref(), path),
                None => Err(VfsError::Unsupported(path.to_string())),
            };
        }
        if path::is_local_absolute_path(path) {
            return local(Path::new(path));
        }

        let mut last_error = None;
        for entry in &inner.entries {
            let Some(rest) = path.strip_prefix(entry.prefix.as_str()) else {
                continue;
            };
            if rest.is_empty() {
                continue;
            }
            match op(entry.backend.as_ref(), rest) {
                Ok(value) => return Ok(value),
                Err(err) => {
                    log::debug!("{} could not serve {path:?}: {err}", entry.backend.describe());
                    last_error = Some(err);
                }
            }
        }

        match last_error {
            Some(err) => Err(err),
            None => {
                log::error!("Missing filesystem for {path:?}");
                Err(VfsError::MissingFileSystem(path.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryBackend;

    fn memory(files: &[(&str, &[u8])]) -> MemoryBackend {
        let mem = MemoryBackend::new();
        for (path, data) in files {
            mem.insert(*path, data.to_vec());
        }
        mem
    }

    #[test]
    fn register_and_read() {
        let vfs = Vfs::new();
        vfs.register("data/", memory(&[("hello.txt", b"world")]));
        assert_eq!(vfs.read_file("data/hello.txt").unwrap(), b"world");
        assert_eq!(vfs.len(), 1);
    }

    #[test]
    fn same_prefix_falls_through_in_order() {
        let vfs = Vfs::new();
        vfs.register("p/", memory(&[("x", b"from A"), ("only_a", b"A")]));
        vfs.register("p/", memory(&[("x", b"from B"), ("only_b", b"B")]));

        assert_eq!(vfs.read_file("p/x").unwrap(), b"from A");
        assert_eq!(vfs.read_file("p/only_b").unwrap(), b"B");
        assert!(matches!(
            vfs.read_file("p/neither"),
            Err(VfsError::NotFound(_))
        ));
        assert!(vfs.exists("p/only_b"));
        assert!(!vfs.exists("p/neither"));
    }

    #[test]
    fn prefix_must_be_strictly_shorter() {
        let vfs = Vfs::new();
        vfs.register("data", memory(&[("x", b"1")]));
        assert!(matches!(
            vfs.read_file("data"),
            Err(VfsError::MissingFileSystem(_))
        ));
        // Prefixes match raw bytes, not path segments.
        vfs.register("db", memory(&[("x/y", b"2")]));
        assert_eq!(vfs.read_file("dbx/y").unwrap(), b"2");
    }

    #[test]
    fn unmatched_prefix_is_missing_filesystem() {
        let vfs = Vfs::new();
        vfs.register("data/", memory(&[]));
        assert!(matches!(
            vfs.read_file("other/file.txt"),
            Err(VfsError::MissingFileSystem(_))
        ));
    }

    #[test]
    fn registry_is_bounded() {
        let vfs = Vfs::new();
        for i in 0..MAX_VFS_ENTRIES {
            assert!(vfs.register(format!("m{i}/"), memory(&[])));
        }
        assert!(!vfs.register("extra/", memory(&[("f", b"1")])));
        assert_eq!(vfs.len(), MAX_VFS_ENTRIES);
        assert!(matches!(
            vfs.read_file("extra/f"),
            Err(VfsError::MissingFileSystem(_))
        ));
    }

    #[test]
    fn clear_empties_registry() {
        let vfs = Vfs::new();
        vfs.register("a/", memory(&[("f", b"1")]));
        let shared = vfs.clone();
        shared.clear();
        assert!(vfs.is_empty());
        assert!(vfs.read_file("a/f").is_err());
    }

    struct EchoBackend;

    impl VfsBackend for EchoBackend {
        fn read_file(&self, path: &str) -> Result<Vec<u8>, VfsError> {
            Ok(path.as_bytes().to_vec())
        }

        fn get_file_listing(
            &self,
            _path: &str,
            _filter: Option<&str>,
        ) -> Result<Vec<FileInfo>, VfsError> {
            Ok(Vec::new())
        }

        fn get_file_info(&self, path: &str) -> Result<FileInfo, VfsError> {
            Ok(FileInfo::file(path, path.len() as u64))
        }

        fn describe(&self) -> String {
            "echo".into()
        }
    }

    #[test]
    fn content_uris_need_a_backend() {
        let vfs = Vfs::new();
        vfs.register("content:", EchoBackend);
        assert!(matches!(
            vfs.read_file("content://docs/1"),
            Err(VfsError::Unsupported(_))
        ));

        vfs.set_content_uri_backend(EchoBackend);
        assert_eq!(vfs.read_file("content://docs/1").unwrap(), b"content://docs/1");
    }

    #[test]
    fn absolute_paths_bypass_registry() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("local.bin");
        std::fs::write(&file, b"disk").unwrap();

        let vfs = Vfs::new();
        vfs.register("/", EchoBackend);
        let path = file.to_str().unwrap();
        assert_eq!(vfs.read_file(path).unwrap(), b"disk");
        assert!(vfs.exists(path));
        assert_eq!(vfs.get_file_info(path).unwrap().size, 4);
    }

    #[test]
    fn listing_and_info_route_by_prefix() {
        let vfs = Vfs::new();
        vfs.register("m/", memory(&[("a.png", b"1"), ("sub/b.png", b"22")]));

        let listing = vfs.get_file_listing("m/sub", Some("png")).unwrap();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].size, 2);
        assert!(vfs.get_file_info("m/sub").unwrap().is_directory);
    }
}
