use std::path::Path;

use crate::file_loader::{FileLoader, ProxiedFileLoader, ReadFlags};

/// Extra attempts after the first short read.
const MAX_RETRIES: usize = 3;

/// Decorator that absorbs transient short reads.
///
/// A short read is retried at the advanced offset for the remaining bytes, up
/// to [`MAX_RETRIES`] more times. Whatever was accumulated is returned, so a
/// persistent failure still surfaces as a short read.
pub struct RetryingFileLoader {
    inner: ProxiedFileLoader,
}

impl RetryingFileLoader {
    pub fn new(backend: Box<dyn FileLoader>) -> Self {
        Self {
            inner: ProxiedFileLoader::new(backend),
        }
    }
}

impl FileLoader for RetryingFileLoader {
    fn exists(&self) -> bool {
        // Retry once.
        self.inner.exists() || self.inner.exists()
    }

    fn exists_fast(&self) -> bool {
        self.inner.exists_fast() || self.inner.exists_fast()
    }

    fn is_directory(&self) -> bool {
        self.inner.is_directory()
    }

    fn file_size(&self) -> i64 {
        match self.inner.file_size() {
            0 => self.inner.file_size(),
            size => size,
        }
    }

    fn path(&self) -> &Path {
        self.inner.path()
    }

    fn read_at(&self, pos: u64, buf: &mut [u8], flags: ReadFlags) -> usize {
        let mut read = self.inner.read_at(pos, buf, flags);
        let mut retries = 0;
        while read < buf.len() && retries < MAX_RETRIES {
            log::debug!(
                "Short read at {pos} ({read}/{} bytes) from {}, retrying",
                buf.len(),
                self.inner.path().display()
            );
            read += self
                .inner
                .read_at(pos + read as u64, &mut buf[read..], flags);
            retries += 1;
        }
        read
    }

    fn cancel(&self) {
        self.inner.cancel()
    }
}
