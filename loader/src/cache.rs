use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

use crate::block::{self, BLOCK_READAHEAD, BLOCK_SIZE};
use crate::file_loader::{FileLoader, ProxiedFileLoader, ReadFlags};
use crate::readahead::{AheadFill, ReadAhead};

/// Default bound on resident blocks (256 MiB of 64 KiB blocks).
pub const MAX_BLOCKS_CACHED: usize = 4096;

/// Bounded in-RAM block cache with generation-based eviction.
///
/// Each foreground read advances a generation counter and stamps the blocks it
/// touches. When the cache is full, blocks with the lowest generation go
/// first. This approximates LRU without maintaining a recency list.
///
/// Read-ahead fills are stamped with the current generation as well, but they
/// may only evict blocks that are strictly older than the latest foreground
/// read. If no such block exists the read-ahead pass stops instead of
/// thrashing the working set.
///
/// Like [`RamCachingFileLoader`](crate::RamCachingFileLoader), a request is
/// either served entirely from cache or entirely from one backend read.
pub struct CachingFileLoader {
    shared: Arc<CacheShared>,
    ahead: ReadAhead<CacheShared>,
    exists: OnceLock<bool>,
    is_directory: OnceLock<bool>,
}

struct CacheShared {
    backend: ProxiedFileLoader,
    file_size: i64,
    state: Mutex<CacheState>,
}

/// Block table plus its generation index.
///
/// `by_generation` mirrors `blocks` as `(generation, block)` pairs so the
/// oldest block is always the first element.
struct CacheState {
    max_blocks: usize,
    generation: u64,
    blocks: BTreeMap<u64, CachedBlock>,
    by_generation: BTreeSet<(u64, u64)>,
}

struct CachedBlock {
    data: Box<[u8]>,
    generation: u64,
}

impl CachingFileLoader {
    pub fn new(backend: Box<dyn FileLoader>) -> Self {
        Self::with_max_blocks(backend, MAX_BLOCKS_CACHED)
    }

    /// Create a cache holding at most `max_blocks` blocks (at least one).
    pub fn with_max_blocks(backend: Box<dyn FileLoader>, max_blocks: usize) -> Self {
        let backend = ProxiedFileLoader::new(backend);
        let file_size = backend.file_size();

        let shared = Arc::new(CacheShared {
            backend,
            file_size,
            state: Mutex::new(CacheState::new(max_blocks.max(1))),
        });

        Self {
            ahead: ReadAhead::new(shared.clone(), BLOCK_READAHEAD),
            shared,
            exists: OnceLock::new(),
            is_directory: OnceLock::new(),
        }
    }

    /// Number of blocks currently resident.
    pub fn resident_blocks(&self) -> usize {
        self.shared.state.lock().blocks.len()
    }

    /// Configured bound on resident blocks.
    pub fn max_blocks(&self) -> usize {
        self.shared.state.lock().max_blocks
    }

    /// Whether the read-ahead thread has been started.
    pub fn read_ahead_started(&self) -> bool {
        self.ahead.is_running()
    }
}

impl CacheState {
    fn new(max_blocks: usize) -> Self {
        Self {
            max_blocks,
            generation: 0,
            blocks: BTreeMap::new(),
            by_generation: BTreeSet::new(),
        }
    }

    fn contains(&self, block: u64) -> bool {
        self.blocks.contains_key(&block)
    }

    fn touch(&mut self, block: u64) {
        let generation = self.generation;
        if let Some(entry) = self.blocks.get_mut(&block)
            && entry.generation != generation
        {
            self.by_generation.remove(&(entry.generation, block));
            entry.generation = generation;
            self.by_generation.insert((generation, block));
        }
    }

    /// Remove the block with the lowest generation, if it is older than `below`.
    fn evict_oldest(&mut self, below: Option<u64>) -> bool {
        let Some(&(generation, block)) = self.by_generation.first() else {
            return false;
        };
        if below.is_some_and(|limit| generation >= limit) {
            return false;
        }
        self.by_generation.remove(&(generation, block));
        self.blocks.remove(&block);
        log::trace!("Evicted block {block} (generation {generation})");
        true
    }

    /// Insert `data` as `block`, evicting as needed.
    ///
    /// Read-ahead inserts pass `ahead = true` and give up rather than evict a
    /// block the foreground touched during the current generation.
    fn insert(&mut self, block: u64, data: &[u8], ahead: bool) -> bool {
        if self.contains(block) {
            return true;
        }
        let limit = ahead.then_some(self.generation);
        while self.blocks.len() >= self.max_blocks {
            if !self.evict_oldest(limit) {
                return false;
            }
        }
        let generation = self.generation;
        self.blocks.insert(
            block,
            CachedBlock {
                data: data.into(),
                generation,
            },
        );
        self.by_generation.insert((generation, block));
        true
    }
}

impl CacheShared {
    /// Copy the request out of the cache if every covering block is resident.
    fn read_from_cache(&self, pos: u64, buf: &mut [u8]) -> Option<usize> {
        let (first, last) = block::block_span(pos, buf.len());
        let mut state = self.state.lock();
        state.generation += 1;

        if !(first..=last).all(|b| state.contains(b)) {
            return None;
        }

        let mut copied = 0;
        let mut offset = (pos - block::block_start(first)) as usize;
        for b in first..=last {
            state.touch(b);
            let data = &state.blocks[&b].data;
            if offset >= data.len() {
                break;
            }
            let count = (data.len() - offset).min(buf.len() - copied);
            buf[copied..copied + count].copy_from_slice(&data[offset..offset + count]);
            copied += count;
            offset = 0;
        }
        Some(copied)
    }

    /// Read the covering block range from the backend, hand the requested
    /// bytes to the caller and keep the complete blocks.
    fn fill_and_read(&self, pos: u64, buf: &mut [u8], flags: ReadFlags) -> usize {
        let (first, last) = block::block_span(pos, buf.len());
        let start = block::block_start(first);
        let mut scratch = vec![0u8; ((last - first + 1) as usize) * BLOCK_SIZE];
        let read = self.backend.read_at(start, &mut scratch, flags);

        let offset = (pos - start) as usize;
        let available = read.saturating_sub(offset).min(buf.len());
        buf[..available].copy_from_slice(&scratch[offset..offset + available]);

        let mut state = self.state.lock();
        for (i, chunk) in scratch[..read].chunks(BLOCK_SIZE).enumerate() {
            let b = first + i as u64;
            let expected = block::block_len(b, self.file_size);
            if expected == 0 || chunk.len() < expected {
                break;
            }
            state.insert(b, &chunk[..expected], false);
        }
        available
    }
}

impl AheadFill for CacheShared {
    fn block_count(&self) -> Option<u64> {
        block::block_count(self.file_size)
    }

    fn is_cached(&self, block: u64) -> bool {
        self.state.lock().contains(block)
    }

    fn fill_ahead(&self, block: u64) -> bool {
        {
            // Don't bother reading if there is no room for the result.
            let state = self.state.lock();
            if state.blocks.len() >= state.max_blocks
                && state
                    .by_generation
                    .first()
                    .is_none_or(|&(generation, _)| generation >= state.generation)
            {
                return false;
            }
        }

        let mut scratch = vec![0u8; BLOCK_SIZE];
        let read = self
            .backend
            .read_at(block::block_start(block), &mut scratch, ReadFlags::empty());
        let expected = block::block_len(block, self.file_size);
        if read == 0 || read < expected {
            return false;
        }

        self.state.lock().insert(block, &scratch[..expected], true)
    }
}

impl FileLoader for CachingFileLoader {
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
