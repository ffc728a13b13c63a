use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::file_loader::{FileLoader, ReadFlags};

/// In-memory leaf loader for tests and embedded images.
///
/// Clones share the same bytes.
///
/// # Example
///
/// ```ignore
/// let image = MemoryFileLoader::new("builtin/boot.bin", boot_bytes);
/// let chain = CachingFileLoader::new(Box::new(image));
/// ```
#[derive(Clone)]
pub struct MemoryFileLoader {
    path: PathBuf,
    data: Arc<[u8]>,
}

impl MemoryFileLoader {
    pub fn new(path: impl Into<PathBuf>, data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            path: path.into(),
            data: data.into(),
        }
    }

    /// The complete contents.
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl FileLoader for MemoryFileLoader {
    fn exists(&self) -> bool {
        true
    }

    fn is_directory(&self) -> bool {
        false
    }

    fn file_size(&self) -> i64 {
        self.data.len() as i64
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn read_at(&self, pos: u64, buf: &mut [u8], _flags: ReadFlags) -> usize {
        let len = self.data.len() as u64;
        if pos >= len {
            return 0;
        }
        let start = pos as usize;
        let count = buf.len().min(self.data.len() - start);
        buf[..count].copy_from_slice(&self.data[start..start + count]);
        count
    }
}
