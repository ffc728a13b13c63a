use std::path::Path;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

use crate::block::{self, BLOCK_READAHEAD, BLOCK_SIZE};
use crate::file_loader::{FileLoader, ProxiedFileLoader, ReadFlags};
use crate::readahead::{AheadFill, ReadAhead};

/// Unbounded in-RAM block cache.
///
/// Every block ever read stays resident until the loader is dropped, which
/// makes this the layer of choice for "keep the whole image in memory". The
/// block table grows on demand, so sources of unknown size work too.
///
/// A read is answered from memory only when every block it touches is
/// resident; otherwise the covering block range is read from the backend in
/// one go and spliced into the cache. Callers never see a mix of cached and
/// freshly read bytes.
///
/// The first read starts a background worker that keeps up to
/// [`BLOCK_READAHEAD`] blocks populated past the last requested position.
pub struct RamCachingFileLoader {
    shared: Arc<RamShared>,
    ahead: ReadAhead<RamShared>,
    exists: OnceLock<bool>,
    is_directory: OnceLock<bool>,
}

struct RamShared {
    backend: ProxiedFileLoader,
    file_size: i64,
    blocks: Mutex<Vec<Option<Box<[u8]>>>>,
}

impl RamCachingFileLoader {
    pub fn new(backend: Box<dyn FileLoader>) -> Self {
        let backend = ProxiedFileLoader::new(backend);
        let file_size = backend.file_size();
        let capacity = block::block_count(file_size).unwrap_or(0) as usize;

        let shared = Arc::new(RamShared {
            backend,
            file_size,
            blocks: Mutex::new(Vec::with_capacity(capacity)),
        });

        Self {
            ahead: ReadAhead::new(shared.clone(), BLOCK_READAHEAD),
            shared,
            exists: OnceLock::new(),
            is_directory: OnceLock::new(),
        }
    }

    /// Number of blocks currently held in memory.
    pub fn resident_blocks(&self) -> usize {
        self.shared.blocks.lock().iter().flatten().count()
    }

    /// Share of the file that is resident, 0–100. Zero when the size is unknown.
    pub fn cached_percent(&self) -> u32 {
        let Some(total) = block::block_count(self.shared.file_size) else {
            return 0;
        };
        let resident = self.resident_blocks() as u64;
        (resident * 100 / total).min(100) as u32
    }

    /// Whether the read-ahead thread has been started.
    pub fn read_ahead_started(&self) -> bool {
        self.ahead.is_running()
    }
}

impl RamShared {
    /// Copy `buf.len()` bytes at `pos` if every covering block is resident.
    fn read_from_cache(&self, pos: u64, buf: &mut [u8]) -> Option<usize> {
        let (first, last) = block::block_span(pos, buf.len());
        let blocks = self.blocks.lock();

        let resident = (first..=last).all(|b| {
            blocks
                .get(b as usize)
                .is_some_and(|slot| slot.is_some())
        });
        if !resident {
            return None;
        }

        let mut copied = 0;
        let mut offset = (pos - block::block_start(first)) as usize;
        for b in first..=last {
            let Some(Some(data)) = blocks.get(b as usize) else {
                break;
            };
            if offset >= data.len() {
                // Short final block: end of file.
                break;
            }
            let count = (data.len() - offset).min(buf.len() - copied);
            buf[copied..copied + count].copy_from_slice(&data[offset..offset + count]);
            copied += count;
            offset = 0;
        }
        Some(copied)
    }

    /// Read the block range covering the request from the backend, cache the
    /// complete blocks and copy the requested bytes out.
    fn fill_and_read(&self, pos: u64, buf: &mut [u8], flags: ReadFlags) -> usize {
        let (first, last) = block::block_span(pos, buf.len());
        let start = block::block_start(first);
        let mut scratch = vec![0u8; ((last - first + 1) as usize) * BLOCK_SIZE];
        let read = self.backend.read_at(start, &mut scratch, flags);

        self.store(first, &scratch[..read]);

        let offset = (pos - start) as usize;
        let available = read.saturating_sub(offset).min(buf.len());
        buf[..available].copy_from_slice(&scratch[offset..offset + available]);
        available
    }

    /// Insert every complete block of `data` (which starts at block `first`).
    fn store(&self, first: u64, data: &[u8]) {
        let mut blocks = self.blocks.lock();
        for (i, chunk) in data.chunks(BLOCK_SIZE).enumerate() {
            let b = first + i as u64;
            let expected = block::block_len(b, self.file_size);
            if expected == 0 || chunk.len() < expected {
                break;
            }
            let index = b as usize;
            if blocks.len() <= index {
                blocks.resize_with(index + 1, || None);
            }
            if blocks[index].is_none() {
                blocks[index] = Some(chunk[..expected].into());
            }
        }
    }
}

impl AheadFill for RamShared {
    fn block_count(&self) -> Option<u64> {
        block::block_count(self.file_size)
    }

    fn is_cached(&self, block: u64) -> bool {
        self.blocks
            .lock()
            .get(block as usize)
            .is_some_and(|slot| slot.is_some())
    }

    fn fill_ahead(&self, block: u64) -> bool {
        let mut scratch = vec![0u8; BLOCK_SIZE];
        let read = self
            .backend
            .read_at(block::block_start(block), &mut scratch, ReadFlags::empty());
        if read == 0 {
            return false;
        }
        self.store(block, &scratch[..read]);
        true
    }
}

impl FileLoader for RamCachingFileLoader {
    fn exists(&self) -> bool {
        *self.exists.get_or_init(|| self.shared.backend.exists())
    }

    fn exists_fast(&self) -> bool {
        match self.exists.get() {
            Some(exists) => *exists,
            None => self.shared.backend.exists_fast(),
        }
    }

    fn is_directory(&self) -> bool {
        *self
            .is_directory
            .get_or_init(|| self.shared.backend.is_directory())
    }

    fn file_size(&self) -> i64 {
        self.shared.file_size
    }

    fn path(&self) -> &Path {
        self.shared.backend.path()
    }

    fn read_at(&self, pos: u64, buf: &mut [u8], flags: ReadFlags) -> usize {
        if flags.contains(ReadFlags::NO_CACHE) {
            return self.shared.backend.read_at(pos, buf, flags);
        }

        let len = block::clamp_len(pos, buf.len(), self.shared.file_size);
        if len == 0 {
            return 0;
        }
        let buf = &mut buf[..len];

        let read = match self.shared.read_from_cache(pos, buf) {
            Some(read) => read,
            None => self.shared.fill_and_read(pos, buf, flags),
        };

        self.ahead.request(pos + read as u64);
        read
    }

    fn cancel(&self) {
        self.ahead.cancel();
        self.shared.backend.cancel();
    }
}
