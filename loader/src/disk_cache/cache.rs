use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::block::{self, BLOCK_SIZE};
use crate::file_loader::{FileLoader, ReadFlags};

use super::DiskCacheConfig;
use super::format::{
    self, CACHE_MAGIC, CACHE_VERSION, FLAG_LOCKED, FLAGS_OFFSET, FileHeader, HEADER_SIZE,
    INVALID_INDEX, IndexEntry,
};
use super::space;

/// Upper bound on blocks fetched from the backend by one fill.
pub const MAX_BLOCKS_PER_READ: usize = 16;

/// Persistent block cache for one origin path.
///
/// Instances are shared between every loader reading the same origin; obtain
/// them through [`DiskCacheRegistry::acquire`](super::DiskCacheRegistry::acquire)
/// rather than directly, so that at most one exists per path.
///
/// # Consistency
///
/// A block's payload is always written before the index entry that points at
/// it, and an index entry is invalidated before its slot is reused. A crash
/// can lose blocks but never exposes a valid entry without data.
///
/// While open, the header carries [`FLAG_LOCKED`]. A file found locked at open
/// time belonged to a process that crashed or is still running; it is deleted
/// and rebuilt. Two processes sharing one cache file is not supported.
///
/// # Degradation
///
/// Any failure to create, lock or write the file closes it and turns the
/// cache into a pass-through: [`is_valid`](Self::is_valid) becomes `false` and
/// fills read straight from the backend.
pub struct DiskCachingFileLoaderCache {
    origin: PathBuf,
    cache_path: PathBuf,
    origin_size: u64,
    state: Mutex<CacheFileState>,
}

struct CacheFileState {
    file: Option<File>,
    max_blocks: u32,
    flags: u32,
    /// One entry per block of the origin.
    index: Vec<IndexEntry>,
    /// Slot → index position, or [`INVALID_INDEX`] for free slots.
    slots: Vec<u32>,
    cache_size: u32,
    generation: u16,
}

impl CacheFileState {
    fn closed() -> Self {
        Self {
            file: None,
            max_blocks: 0,
            flags: 0,
            index: Vec::new(),
            slots: Vec::new(),
            cache_size: 0,
            generation: 0,
        }
    }

    fn block_size() -> u64 {
        BLOCK_SIZE as u64
    }
}

impl DiskCachingFileLoaderCache {
    /// Open or create the cache file for `origin`.
    ///
    /// `in_use` lists cache files owned by other live instances; they are
    /// never garbage-collected to make room for this one.
    pub fn open(
        origin: &Path,
        origin_size: u64,
        config: &DiskCacheConfig,
        in_use: &HashSet<PathBuf>,
    ) -> Self {
        let cache = Self {
            origin: origin.to_path_buf(),
            cache_path: space::cache_file_path(&config.cache_dir, origin),
            origin_size,
            state: Mutex::new(CacheFileState::closed()),
        };

        {
            let mut state = cache.state.lock();
            let mut loaded = cache.load(&mut state);

            if loaded && !cache.set_locked(&mut state, true) {
                state.file = None;
                match std::fs::remove_file(&cache.cache_path) {
                    Ok(()) => loaded = false,
                    Err(err) => {
                        log::warn!(
                            "Unable to replace locked disk cache {}: {err}; caching disabled",
                            cache.cache_path.display()
                        );
                    }
                }
            }

            if !loaded && !cache.cache_path.exists() {
                cache.create(&mut state, config, in_use);
                if state.file.is_some() && !cache.set_locked(&mut state, true) {
                    state.file = None;
                }
            }
        }

        cache
    }

    /// Path of the origin this cache mirrors.
    pub fn origin(&self) -> &Path {
        &self.origin
    }

    /// Path of the cache file on disk.
    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    /// Whether the cache file is open and usable.
    pub fn is_valid(&self) -> bool {
        self.state.lock().file.is_some()
    }

    /// Whether any block is cached.
    pub fn has_data(&self) -> bool {
        let state = self.state.lock();
        state.file.is_some() && state.cache_size > 0
    }

    /// Number of blocks currently cached.
    pub fn cached_blocks(&self) -> u32 {
        self.state.lock().cache_size
    }

    /// Capacity of the cache file in blocks.
    pub fn max_blocks(&self) -> u32 {
        self.state.lock().max_blocks
    }

    /// Copy bytes at `pos` out of consecutive cached blocks.
    ///
    /// Stops at the first block that is not cached; the return value is the
    /// number of bytes copied.
    pub fn read_from_cache(&self, pos: u64, buf: &mut [u8]) -> usize {
        if buf.is_empty() {
            return 0;
        }
        let mut state = self.state.lock();
        if state.file.is_none() {
            return 0;
        }

        let block_size = CacheFileState::block_size();
        let first = pos / block_size;
        let last = (pos + buf.len() as u64 - 1) / block_size;
        let mut read = 0;
        let mut offset = (pos - first * block_size) as usize;

        for i in first..=last {
            let generation = state.generation;
            let Some(entry) = state.index.get_mut(i as usize) else {
                break;
            };
            if !entry.is_valid() {
                break;
            }
            // The final block may be partial; nothing past the origin's end.
            let stored = block::block_len(i, self.origin_size as i64);
            if offset >= stored {
                break;
            }
            entry.generation = generation;
            entry.hits = entry.hits.saturating_add(1);
            let slot = entry.block;

            let count = (buf.len() - read).min(stored - offset);
            if let Err(err) =
                self.read_block_data(&mut state, slot, offset, &mut buf[read..read + count])
            {
                log::error!(
                    "Unable to read disk cache block {i} for {}: {err}",
                    self.origin.display()
                );
                break;
            }
            read += count;
            offset = 0;
        }
        read
    }

    /// Read missing blocks at `pos` from `backend`, store them, and copy the
    /// requested bytes into `buf`.
    ///
    /// Fetches at least one whole block and at most [`MAX_BLOCKS_PER_READ`]
    /// consecutive missing ones. The backend is read without holding the
    /// cache lock. Returns the number of bytes copied into `buf`.
    pub fn save_into_cache(
        &self,
        backend: &dyn FileLoader,
        pos: u64,
        buf: &mut [u8],
        flags: ReadFlags,
    ) -> usize {
        if buf.is_empty() {
            return 0;
        }
        let block_size = CacheFileState::block_size();
        let first = pos / block_size;

        let blocks_to_read = {
            let state = self.state.lock();
            if state.file.is_none() {
                drop(state);
                return backend.read_at(pos, buf, flags);
            }

            let last = (pos + buf.len() as u64 - 1) / block_size;
            let mut count = 0;
            for i in first..=last {
                match state.index.get(i as usize) {
                    Some(entry) if !entry.is_valid() => count += 1,
                    _ => break,
                }
                if count >= MAX_BLOCKS_PER_READ {
                    break;
                }
            }
            count
        };

        if blocks_to_read == 0 {
            // Filled by someone else in the meantime, or past the origin's end.
            let cached = self.read_from_cache(pos, buf);
            if cached > 0 {
                return cached;
            }
            return backend.read_at(pos, buf, flags);
        }

        let start = first * block_size;
        let mut scratch = vec![0u8; blocks_to_read * BLOCK_SIZE];
        let read = backend.read_at(start, &mut scratch, flags);

        {
            let mut state = self.state.lock();
            if state.file.is_some() {
                self.store_blocks(&mut state, first, &scratch[..read]);
            }
        }

        let offset = (pos - start) as usize;
        let available = read.saturating_sub(offset).min(buf.len());
        buf[..available].copy_from_slice(&scratch[offset..offset + available]);
        available
    }

    /// Persist the index, clear the lock flag and close the file.
    ///
    /// Called when the last user releases the cache; also run on drop.
    pub fn shutdown(&self) {
        let mut state = self.state.lock();
        if state.file.is_none() {
            return;
        }
        let index = format::encode_index(&state.index);
        if let Err(err) = Self::write_at(&mut state, HEADER_SIZE, &index) {
            log::warn!(
                "Unable to flush disk cache index for {}: {err}",
                self.origin.display()
            );
        }
        self.set_locked(&mut state, false);
        state.file = None;
    }

    fn store_blocks(&self, state: &mut CacheFileState, first: u64, data: &[u8]) {
        let generation = Self::next_generation(state);
        let block_size = CacheFileState::block_size() as usize;

        for (i, chunk) in data.chunks(block_size).enumerate() {
            let b = first + i as u64;
            let expected = block::block_len(b, self.origin_size as i64);
            if expected == 0 || chunk.len() < expected {
                break;
            }
            if state.index[b as usize].is_valid() {
                continue;
            }
            if !self.make_cache_space_for(state, 1) {
                break;
            }
            let Some(slot) = Self::allocate_block(state, b) else {
                break;
            };

            // Payload first, then the index entry that makes it visible.
            let offset = format::slot_offset(state.index.len() as u64, block_size as u64, slot);
            if let Err(err) = Self::write_at(state, offset, &chunk[..expected]) {
                self.fail(state, "write block data", &err);
                return;
            }
            state.index[b as usize] = IndexEntry {
                block: slot,
                generation,
                hits: 0,
            };
            if let Err(err) = self.write_index_entry(state, b as usize) {
                self.fail(state, "write index entry", &err);
                return;
            }
        }
    }

    fn next_generation(state: &mut CacheFileState) -> u16 {
        if state.generation == u16::MAX {
            Self::rebalance_generations(state);
        }
        state.generation += 1;
        state.generation
    }

    /// Rebase generations on the oldest one and halve them, along with hits.
    fn rebalance_generations(state: &mut CacheFileState) {
        let oldest = state
            .index
            .iter()
            .filter(|e| e.is_valid())
            .map(|e| e.generation)
            .min()
            .unwrap_or(state.generation);

        for entry in state.index.iter_mut().filter(|e| e.is_valid()) {
            entry.generation = entry.generation.saturating_sub(oldest) / 2;
            entry.hits /= 2;
        }
        state.generation = (state.generation - oldest) / 2;
        log::debug!("Rebalanced disk cache generations");
    }

    /// Evict minimal-generation blocks until `blocks` more fit.
    fn make_cache_space_for(&self, state: &mut CacheFileState, blocks: u32) -> bool {
        if blocks > state.max_blocks {
            return false;
        }
        while state.cache_size + blocks > state.max_blocks {
            let victim = state
                .index
                .iter()
                .enumerate()
                .filter(|(_, e)| e.is_valid())
                .min_by_key(|(_, e)| (e.generation, e.hits))
                .map(|(i, _)| i);
            let Some(i) = victim else {
                return false;
            };

            let slot = state.index[i].block as usize;
            state.slots[slot] = INVALID_INDEX;
            state.index[i] = IndexEntry::EMPTY;
            state.cache_size -= 1;
            if let Err(err) = self.write_index_entry(state, i) {
                self.fail(state, "invalidate index entry", &err);
                return false;
            }
        }
        true
    }

    fn allocate_block(state: &mut CacheFileState, index_pos: u64) -> Option<u32> {
        let slot = state.slots.iter().position(|&s| s == INVALID_INDEX)?;
        state.slots[slot] = index_pos as u32;
        state.cache_size += 1;
        Some(slot as u32)
    }

    fn read_block_data(
        &self,
        state: &mut CacheFileState,
        slot: u32,
        offset: usize,
        out: &mut [u8],
    ) -> io::Result<()> {
        let index_count = state.index.len() as u64;
        let base = format::slot_offset(index_count, CacheFileState::block_size(), slot);
        let file = state.file.as_mut().ok_or(io::ErrorKind::NotConnected)?;
        file.seek(SeekFrom::Start(base + offset as u64))?;
        file.read_exact(out)
    }

    fn write_index_entry(&self, state: &mut CacheFileState, i: usize) -> io::Result<()> {
        let bytes = format::encode_index(&state.index[i..i + 1]);
        Self::write_at(state, format::index_entry_offset(i as u64), &bytes)
    }

    fn write_at(state: &mut CacheFileState, offset: u64, data: &[u8]) -> io::Result<()> {
        let file = state.file.as_mut().ok_or(io::ErrorKind::NotConnected)?;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)
    }

    fn fail(&self, state: &mut CacheFileState, action: &str, err: &io::Error) {
        log::error!(
            "Disk cache for {} failed to {action}: {err}; caching disabled",
            self.origin.display()
        );
        state.file = None;
    }

    /// Load and validate an existing cache file. Returns `false` if there is
    /// no usable file.
    fn load(&self, state: &mut CacheFileState) -> bool {
        let mut file = match OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.cache_path)
        {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return false,
            Err(err) => {
                log::warn!(
                    "Unable to open disk cache {}: {err}",
                    self.cache_path.display()
                );
                return false;
            }
        };

        match self.validate(&mut file) {
            Ok((header, index)) => {
                let mut slots = vec![INVALID_INDEX; header.max_blocks() as usize];
                let mut generation = 0;
                let mut cache_size = 0;
                for (i, entry) in index.iter().enumerate().filter(|(_, e)| e.is_valid()) {
                    slots[entry.block as usize] = i as u32;
                    generation = generation.max(entry.generation);
                    cache_size += 1;
                }

                *state = CacheFileState {
                    file: Some(file),
                    max_blocks: header.max_blocks(),
                    flags: header.flags(),
                    index,
                    slots,
                    cache_size,
                    generation,
                };
                log::info!(
                    "Loaded disk cache {} ({cache_size} blocks)",
                    self.cache_path.display()
                );
                true
            }
            Err(reason) => {
                log::info!(
                    "Disk cache {} is not valid ({reason}), rebuilding",
                    self.cache_path.display()
                );
                drop(file);
                if let Err(err) = std::fs::remove_file(&self.cache_path) {
                    log::warn!(
                        "Unable to remove {}: {err}",
                        self.cache_path.display()
                    );
                }
                false
            }
        }
    }

    fn validate(&self, file: &mut File) -> Result<(FileHeader, Vec<IndexEntry>), String> {
        let mut bytes = [0u8; HEADER_SIZE as usize];
        file.read_exact(&mut bytes)
            .map_err(|e| format!("short header: {e}"))?;
        let header = FileHeader::from_bytes(&bytes);

        if header.magic() != CACHE_MAGIC {
            return Err("bad magic".into());
        }
        if header.version() != CACHE_VERSION {
            return Err(format!("version {}", header.version()));
        }
        if header.block_size() as usize != BLOCK_SIZE {
            return Err(format!("block size {}", header.block_size()));
        }
        if header.origin_size() != self.origin_size {
            return Err(format!(
                "origin size {} != {}",
                header.origin_size(),
                self.origin_size
            ));
        }
        if header.max_blocks() == 0 {
            return Err("no slots".into());
        }

        let index_count = self.origin_size.div_ceil(BLOCK_SIZE as u64);
        let mut raw = vec![0u8; (index_count * format::INDEX_ENTRY_SIZE) as usize];
        file.read_exact(&mut raw)
            .map_err(|e| format!("truncated index: {e}"))?;
        let index = format::decode_index(&raw);

        let mut seen = vec![false; header.max_blocks() as usize];
        for entry in index.iter().filter(|e| e.is_valid()) {
            let slot = entry.block as usize;
            if slot >= seen.len() || seen[slot] {
                return Err(format!("bad slot {slot}"));
            }
            seen[slot] = true;
        }

        Ok((header, index))
    }

    /// Create a fresh cache file sized for the available disk space.
    fn create(
        &self,
        state: &mut CacheFileState,
        config: &DiskCacheConfig,
        in_use: &HashSet<PathBuf>,
    ) {
        if let Err(err) = std::fs::create_dir_all(&config.cache_dir) {
            log::warn!(
                "Unable to create cache directory {}: {err}; caching disabled",
                config.cache_dir.display()
            );
            return;
        }

        let index_count = self.origin_size.div_ceil(BLOCK_SIZE as u64);
        let max_blocks = match config.max_blocks {
            Some(max_blocks) => max_blocks.max(1),
            None => {
                let mut max_blocks = self.determine_max_blocks(config);
                if max_blocks < space::MAX_BLOCKS_LOWER_BOUND {
                    let goal = space::MAX_BLOCKS_LOWER_BOUND as u64 * BLOCK_SIZE as u64;
                    space::garbage_collect(&config.cache_dir, goal, in_use);
                    max_blocks = self.determine_max_blocks(config);
                }
                if max_blocks < space::MAX_BLOCKS_LOWER_BOUND {
                    log::warn!("Not enough free space; disabling disk cache");
                    return;
                }
                max_blocks
            }
        };
        // A slot per origin block is all that can ever be used.
        let max_blocks = max_blocks.min(index_count.max(1).min(u32::MAX as u64) as u32);

        let mut file = match OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.cache_path)
        {
            Ok(file) => file,
            Err(err) => {
                log::warn!(
                    "Could not create disk cache file {}: {err}",
                    self.cache_path.display()
                );
                return;
            }
        };

        let header = FileHeader::new(BLOCK_SIZE as u32, self.origin_size, max_blocks, 0);
        let index = vec![IndexEntry::EMPTY; index_count as usize];
        let written = file
            .write_all(header.as_bytes())
            .and_then(|()| file.write_all(&format::encode_index(&index)))
            .and_then(|()| file.flush());
        if let Err(err) = written {
            log::warn!(
                "Could not initialize disk cache file {}: {err}",
                self.cache_path.display()
            );
            return;
        }

        *state = CacheFileState {
            file: Some(file),
            max_blocks,
            flags: 0,
            index,
            slots: vec![INVALID_INDEX; max_blocks as usize],
            cache_size: 0,
            generation: 0,
        };
        log::info!(
            "Created new disk cache file for {} ({max_blocks} blocks)",
            self.origin.display()
        );
    }

    fn determine_max_blocks(&self, config: &DiskCacheConfig) -> u32 {
        space::determine_max_blocks(
            space::free_disk_space(&config.cache_dir),
            config.reserved_free_bytes,
            space::count_cached_files(&config.cache_dir),
        )
    }

    /// Set or clear [`FLAG_LOCKED`] in the header. Fails if it is already in
    /// the requested state.
    fn set_locked(&self, state: &mut CacheFileState, locked: bool) -> bool {
        let Some(file) = state.file.as_mut() else {
            return false;
        };

        let mut bytes = [0u8; 4];
        let read = file
            .seek(SeekFrom::Start(FLAGS_OFFSET))
            .and_then(|_| file.read_exact(&mut bytes));
        if let Err(err) = read {
            log::error!("Unable to read disk cache flags for {}: {err}", self.origin.display());
            state.file = None;
            return false;
        }
        let mut flags = u32::from_le_bytes(bytes);

        if locked {
            if flags & FLAG_LOCKED != 0 {
                log::error!(
                    "Could not lock disk cache file for {} (already locked)",
                    self.origin.display()
                );
                return false;
            }
            flags |= FLAG_LOCKED;
        } else {
            if flags & FLAG_LOCKED == 0 {
                log::error!(
                    "Could not unlock disk cache file for {} (not locked)",
                    self.origin.display()
                );
                return false;
            }
            flags &= !FLAG_LOCKED;
        }

        let written = Self::write_at(state, FLAGS_OFFSET, &flags.to_le_bytes())
            .and_then(|()| state.file.as_mut().map_or(Ok(()), |f| f.flush()));
        if let Err(err) = written {
            log::error!("Unable to write disk cache flags for {}: {err}", self.origin.display());
            state.file = None;
            return false;
        }

        state.flags = flags;
        log::info!(
            "{} disk cache file for {}",
            if locked { "Locked" } else { "Unlocked" },
            self.origin.display()
        );
        true
    }

    #[cfg(test)]
    fn entry(&self, block: usize) -> IndexEntry {
        self.state.lock().index[block]
    }
}

impl Drop for DiskCachingFileLoaderCache {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryFileLoader;

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 255) as u8).collect()
    }

    fn config(dir: &Path, max_blocks: u32) -> DiskCacheConfig {
        DiskCacheConfig {
            cache_dir: dir.to_path_buf(),
            max_blocks: Some(max_blocks),
            reserved_free_bytes: 0,
        }
    }

    fn fill(cache: &DiskCachingFileLoaderCache, origin: &MemoryFileLoader, block: u64) {
        let mut buf = vec![0u8; BLOCK_SIZE];
        cache.save_into_cache(origin, block * BLOCK_SIZE as u64, &mut buf, ReadFlags::empty());
    }

    #[test]
    fn creates_locked_file() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCachingFileLoaderCache::open(
            Path::new("/games/a.iso"),
            BLOCK_SIZE as u64 * 4,
            &config(dir.path(), 8),
            &HashSet::new(),
        );
        assert!(cache.is_valid());
        assert!(!cache.has_data());
        assert_eq!(cache.max_blocks(), 4);

        let bytes = std::fs::read(cache.cache_path()).unwrap();
        let header = FileHeader::from_bytes(bytes[..32].try_into().unwrap());
        assert_ne!(header.flags() & FLAG_LOCKED, 0);

        let path = cache.cache_path().to_path_buf();
        drop(cache);
        let bytes = std::fs::read(path).unwrap();
        let header = FileHeader::from_bytes(bytes[..32].try_into().unwrap());
        assert_eq!(header.flags() & FLAG_LOCKED, 0);
    }

    #[test]
    fn fill_then_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let data = pattern(BLOCK_SIZE * 3 + 500);
        let origin = MemoryFileLoader::new("/o.iso", data.clone());
        let cache = DiskCachingFileLoaderCache::open(
            origin.path(),
            data.len() as u64,
            &config(dir.path(), 8),
            &HashSet::new(),
        );

        let mut buf = vec![0u8; 100];
        assert_eq!(cache.read_from_cache(10, &mut buf), 0);
        assert_eq!(
            cache.save_into_cache(&origin, 10, &mut buf, ReadFlags::empty()),
            100
        );
        assert_eq!(&buf[..], &data[10..110]);
        assert_eq!(cache.cached_blocks(), 1);

        let mut again = vec![0u8; 100];
        assert_eq!(cache.read_from_cache(10, &mut again), 100);
        assert_eq!(again, buf);
        assert_eq!(cache.entry(0).hits, 1);

        // Final partial block.
        let mut tail = vec![0u8; 500];
        let tail_pos = BLOCK_SIZE as u64 * 3;
        cache.save_into_cache(&origin, tail_pos, &mut tail, ReadFlags::empty());
        let mut cached_tail = vec![0u8; 500];
        assert_eq!(cache.read_from_cache(tail_pos, &mut cached_tail), 500);
        assert_eq!(cached_tail, &data[BLOCK_SIZE * 3..]);
    }

    #[test]
    fn reads_stop_at_origin_end() {
        let dir = tempfile::tempdir().unwrap();
        let data = pattern(BLOCK_SIZE * 3 + 500);
        let origin = MemoryFileLoader::new("/end.iso", data.clone());
        let cache = DiskCachingFileLoaderCache::open(
            origin.path(),
            data.len() as u64,
            &config(dir.path(), 8),
            &HashSet::new(),
        );
        for b in 0..4 {
            fill(&cache, &origin, b);
        }
        assert_eq!(cache.cached_blocks(), 4);

        // Buffer runs well past the end of the origin.
        let pos = BLOCK_SIZE as u64 * 3 - 100;
        let mut past_end = vec![0xAAu8; 4000];
        assert_eq!(cache.read_from_cache(pos, &mut past_end), 600);
        assert_eq!(&past_end[..600], &data[pos as usize..]);
        assert!(past_end[600..].iter().all(|&b| b == 0xAA));

        let mut beyond = vec![0u8; 10];
        assert_eq!(cache.read_from_cache(data.len() as u64, &mut beyond), 0);
    }

    #[test]
    fn evicts_minimal_generation() {
        let dir = tempfile::tempdir().unwrap();
        let data = pattern(BLOCK_SIZE * 6);
        let origin = MemoryFileLoader::new("/e.iso", data.clone());
        let cache = DiskCachingFileLoaderCache::open(
            origin.path(),
            data.len() as u64,
            &config(dir.path(), 3),
            &HashSet::new(),
        );

        fill(&cache, &origin, 0);
        fill(&cache, &origin, 1);
        fill(&cache, &origin, 2);
        assert_eq!(cache.cached_blocks(), 3);

        // Touch block 0 after the newest fill so block 1 is now the oldest.
        let mut buf = [0u8; 8];
        cache.read_from_cache(0, &mut buf);
        fill(&cache, &origin, 3);
        assert_eq!(cache.cached_blocks(), 3);
        assert!(cache.entry(0).is_valid());
        assert!(!cache.entry(1).is_valid());
        assert!(cache.entry(2).is_valid());
        assert!(cache.entry(3).is_valid());

        let mut block3 = vec![0u8; BLOCK_SIZE];
        assert_eq!(cache.read_from_cache(BLOCK_SIZE as u64 * 3, &mut block3), BLOCK_SIZE);
        assert_eq!(block3, &data[BLOCK_SIZE * 3..BLOCK_SIZE * 4]);
    }

    #[test]
    fn reopen_keeps_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let data = pattern(BLOCK_SIZE * 4);
        let origin = MemoryFileLoader::new("/p.iso", data.clone());
        let cfg = config(dir.path(), 8);

        {
            let cache =
                DiskCachingFileLoaderCache::open(origin.path(), data.len() as u64, &cfg, &HashSet::new());
            fill(&cache, &origin, 1);
            fill(&cache, &origin, 2);
        }

        let cache =
            DiskCachingFileLoaderCache::open(origin.path(), data.len() as u64, &cfg, &HashSet::new());
        assert_eq!(cache.cached_blocks(), 2);
        let mut buf = vec![0u8; BLOCK_SIZE * 2];
        assert_eq!(cache.read_from_cache(BLOCK_SIZE as u64, &mut buf), BLOCK_SIZE * 2);
        assert_eq!(buf, &data[BLOCK_SIZE..BLOCK_SIZE * 3]);
    }

    #[test]
    fn size_mismatch_rebuilds() {
        let dir = tempfile::tempdir().unwrap();
        let data = pattern(BLOCK_SIZE * 2);
        let origin = MemoryFileLoader::new("/s.iso", data.clone());
        let cfg = config(dir.path(), 8);

        {
            let cache =
                DiskCachingFileLoaderCache::open(origin.path(), data.len() as u64, &cfg, &HashSet::new());
            fill(&cache, &origin, 0);
        }

        let cache = DiskCachingFileLoaderCache::open(
            origin.path(),
            data.len() as u64 + 1,
            &cfg,
            &HashSet::new(),
        );
        assert!(cache.is_valid());
        assert_eq!(cache.cached_blocks(), 0);
    }

    #[test]
    fn rebalance_keeps_order() {
        let mut state = CacheFileState::closed();
        state.index = vec![
            IndexEntry {
                block: 0,
                generation: 100,
                hits: 9,
            },
            IndexEntry {
                block: 1,
                generation: 300,
                hits: 4,
            },
            IndexEntry::EMPTY,
        ];
        state.generation = u16::MAX;
        let next = DiskCachingFileLoaderCache::next_generation(&mut state);

        assert_eq!(state.index[0].generation, 0);
        assert_eq!(state.index[1].generation, 100);
        assert_eq!(state.index[0].hits, 4);
        assert!(next > state.index[1].generation);
        assert_eq!(state.index[2], IndexEntry::EMPTY);
    }
}
