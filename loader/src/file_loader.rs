use std::path::Path;
use std::sync::Arc;

bitflags::bitflags! {
    /// Per-request hints passed down a loader chain.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ReadFlags: u32 {
        /// Bypass every cache layer and read the backend directly.
        const NO_CACHE = 1 << 0;
    }
}

/// A read-only, random-access, named byte source.
///
/// Loaders are stacked as decorators: each one owns exactly one backend and
/// drops it exactly once. All methods take `&self`; implementations that keep
/// state use interior mutability so a loader can be shared with its own
/// background workers.
///
/// # Short reads
///
/// [`read_at`](FileLoader::read_at) returns the number of bytes actually
/// placed into `buf`. A short count is not an error by itself: zero at end of
/// file means end of stream, a shortfall anywhere else means this request
/// failed (the next one may well succeed).
pub trait FileLoader: Send + Sync {
    /// Whether the underlying source can currently be read.
    fn exists(&self) -> bool;

    /// Cheaper existence check; may be less accurate for remote sources.
    fn exists_fast(&self) -> bool {
        self.exists()
    }

    /// Whether the path names a directory rather than an image.
    fn is_directory(&self) -> bool;

    /// Size in bytes. Zero or negative means unknown.
    fn file_size(&self) -> i64;

    /// Identity of the source.
    fn path(&self) -> &Path;

    /// Read up to `buf.len()` bytes starting at `pos`, returning how many were read.
    fn read_at(&self, pos: u64, buf: &mut [u8], flags: ReadFlags) -> usize;

    /// Stop background work (read-ahead) as soon as possible.
    ///
    /// Reads issued afterwards still work and may restart background work.
    fn cancel(&self) {}

    /// Read `len` bytes at `pos` into a new vector, truncated to what was read.
    fn read_to_vec(&self, pos: u64, len: usize, flags: ReadFlags) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        let read = self.read_at(pos, &mut buf, flags);
        buf.truncate(read);
        buf
    }
}

impl<T: FileLoader + ?Sized> FileLoader for Box<T> {
    fn exists(&self) -> bool {
        (**self).exists()
    }

    fn exists_fast(&self) -> bool {
        (**self).exists_fast()
    }

    fn is_directory(&self) -> bool {
        (**self).is_directory()
    }

    fn file_size(&self) -> i64 {
        (**self).file_size()
    }

    fn path(&self) -> &Path {
        (**self).path()
    }

    fn read_at(&self, pos: u64, buf: &mut [u8], flags: ReadFlags) -> usize {
        (**self).read_at(pos, buf, flags)
    }

    fn cancel(&self) {
        (**self).cancel()
    }
}

impl<T: FileLoader + ?Sized> FileLoader for &T {
    fn exists(&self) -> bool {
        (**self).exists()
    }

    fn exists_fast(&self) -> bool {
        (**self).exists_fast()
    }

    fn is_directory(&self) -> bool {
        (**self).is_directory()
    }

    fn file_size(&self) -> i64 {
        (**self).file_size()
    }

    fn path(&self) -> &Path {
        (**self).path()
    }

    fn read_at(&self, pos: u64, buf: &mut [u8], flags: ReadFlags) -> usize {
        (**self).read_at(pos, buf, flags)
    }

    fn cancel(&self) {
        (**self).cancel()
    }
}

impl<T: FileLoader + ?Sized> FileLoader for Arc<T> {
    fn exists(&self) -> bool {
        (**self).exists()
    }

    fn exists_fast(&self) -> bool {
        (**self).exists_fast()
    }

    fn is_directory(&self) -> bool {
        (**self).is_directory()
    }

    fn file_size(&self) -> i64 {
        (**self).file_size()
    }

    fn path(&self) -> &Path {
        (**self).path()
    }

    fn read_at(&self, pos: u64, buf: &mut [u8], flags: ReadFlags) -> usize {
        (**self).read_at(pos, buf, flags)
    }

    fn cancel(&self) {
        (**self).cancel()
    }
}

/// Decorator base that forwards every call to the one backend it owns.
///
/// Decorators embed a `ProxiedFileLoader` and override only what they change;
/// everything else goes through [`backend`](ProxiedFileLoader::backend).
pub struct ProxiedFileLoader {
    backend: Box<dyn FileLoader>,
}

impl ProxiedFileLoader {
    pub fn new(backend: Box<dyn FileLoader>) -> Self {
        Self { backend }
    }

    /// The wrapped loader.
    pub fn backend(&self) -> &dyn FileLoader {
        self.backend.as_ref()
    }

    /// Unwrap the decorator, handing the backend back to the caller.
    pub fn into_inner(self) -> Box<dyn FileLoader> {
        self.backend
    }
}

impl FileLoader for ProxiedFileLoader {
    fn exists(&self) -> bool {
        self.backend.exists()
    }

    fn exists_fast(&self) -> bool {
        self.backend.exists_fast()
    }

    fn is_directory(&self) -> bool {
        self.backend.is_directory()
    }

    fn file_size(&self) -> i64 {
        self.backend.file_size()
    }

    fn path(&self) -> &Path {
        self.backend.path()
    }

    fn read_at(&self, pos: u64, buf: &mut [u8], flags: ReadFlags) -> usize {
        self.backend.read_at(pos, buf, flags)
    }

    fn cancel(&self) {
        self.backend.cancel()
    }
}
