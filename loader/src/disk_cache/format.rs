//! On-disk layout of a block cache file.
//!
//! ```text
//! +----------------------+  0
//! | FileHeader (32 B)    |
//! +----------------------+  HEADER_SIZE
//! | RawIndexEntry x N    |  N = ceil(origin_size / block_size)
//! +----------------------+  index_end
//! | slot 0 (block_size)  |
//! | slot 1               |
//! | ...                  |  up to max_blocks slots
//! +----------------------+
//! ```
//!
//! All integers are little-endian.

use bytemuck::{Pod, Zeroable};

/// Magic bytes identifying a cache file.
pub const CACHE_MAGIC: [u8; 8] = *b"IMGFS-DC";

/// Current format version. Files with any other version are rebuilt.
pub const CACHE_VERSION: u32 = 3;

/// Header flag: a live process owns the file.
pub const FLAG_LOCKED: u32 = 1;

/// Index entry value meaning "this block is not cached".
pub const INVALID_BLOCK: u32 = u32::MAX;

/// Slot table value meaning "this slot is free".
pub const INVALID_INDEX: u32 = u32::MAX;

pub const HEADER_SIZE: u64 = std::mem::size_of::<FileHeader>() as u64;

pub const INDEX_ENTRY_SIZE: u64 = std::mem::size_of::<RawIndexEntry>() as u64;

/// Byte offset of the header's `flags` field.
pub const FLAGS_OFFSET: u64 = std::mem::offset_of!(FileHeader, flags) as u64;

/// Cache file header, stored exactly as laid out here.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct FileHeader {
    magic: [u8; 8],
    version: u32,
    block_size: u32,
    origin_size: u64,
    max_blocks: u32,
    flags: u32,
}

impl FileHeader {
    pub fn new(block_size: u32, origin_size: u64, max_blocks: u32, flags: u32) -> Self {
        Self {
            magic: CACHE_MAGIC,
            version: CACHE_VERSION.to_le(),
            block_size: block_size.to_le(),
            origin_size: origin_size.to_le(),
            max_blocks: max_blocks.to_le(),
            flags: flags.to_le(),
        }
    }

    pub fn from_bytes(bytes: &[u8; HEADER_SIZE as usize]) -> Self {
        bytemuck::pod_read_unaligned(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }

    pub fn magic(&self) -> [u8; 8] {
        self.magic
    }

    pub fn version(&self) -> u32 {
        u32::from_le(self.version)
    }

    pub fn block_size(&self) -> u32 {
        u32::from_le(self.block_size)
    }

    pub fn origin_size(&self) -> u64 {
        u64::from_le(self.origin_size)
    }

    pub fn max_blocks(&self) -> u32 {
        u32::from_le(self.max_blocks)
    }

    pub fn flags(&self) -> u32 {
        u32::from_le(self.flags)
    }
}

/// One index entry as stored on disk.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, Pod, Zeroable)]
pub struct RawIndexEntry {
    block: u32,
    generation: u16,
    hits: u16,
}

/// In-memory index entry: where a block of the origin lives in the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    /// Physical slot, or [`INVALID_BLOCK`].
    pub block: u32,
    pub generation: u16,
    pub hits: u16,
}

impl IndexEntry {
    pub const EMPTY: IndexEntry = IndexEntry {
        block: INVALID_BLOCK,
        generation: 0,
        hits: 0,
    };

    pub fn is_valid(&self) -> bool {
        self.block != INVALID_BLOCK
    }
}

impl Default for IndexEntry {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl From<IndexEntry> for RawIndexEntry {
    fn from(entry: IndexEntry) -> Self {
        Self {
            block: entry.block.to_le(),
            generation: entry.generation.to_le(),
            hits: entry.hits.to_le(),
        }
    }
}

impl From<RawIndexEntry> for IndexEntry {
    fn from(raw: RawIndexEntry) -> Self {
        Self {
            block: u32::from_le(raw.block),
            generation: u16::from_le(raw.generation),
            hits: u16::from_le(raw.hits),
        }
    }
}

/// Encode a run of index entries.
pub fn encode_index(entries: &[IndexEntry]) -> Vec<u8> {
    let raw: Vec<RawIndexEntry> = entries.iter().copied().map(RawIndexEntry::from).collect();
    bytemuck::cast_slice(&raw).to_vec()
}

/// Decode index entries; trailing bytes that don't form an entry are ignored.
pub fn decode_index(bytes: &[u8]) -> Vec<IndexEntry> {
    bytes
        .chunks_exact(INDEX_ENTRY_SIZE as usize)
        .map(|chunk| IndexEntry::from(bytemuck::pod_read_unaligned::<RawIndexEntry>(chunk)))
        .collect()
}

/// Byte offset of index entry `index`.
pub fn index_entry_offset(index: u64) -> u64 {
    HEADER_SIZE + index * INDEX_ENTRY_SIZE
}

/// Byte offset of physical slot `slot`, given the number of index entries.
pub fn slot_offset(index_count: u64, block_size: u64, slot: u32) -> u64 {
    index_entry_offset(index_count) + slot as u64 * block_size
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_layout_is_stable() {
        assert_eq!(HEADER_SIZE, 32);
        assert_eq!(INDEX_ENTRY_SIZE, 8);
        assert_eq!(FLAGS_OFFSET, 28);
    }

    #[test]
    fn header_survives_bytes() {
        let header = FileHeader::new(65536, 123_456_789, 512, FLAG_LOCKED);
        let mut bytes = [0u8; HEADER_SIZE as usize];
        bytes.copy_from_slice(header.as_bytes());
        assert_eq!(&bytes[..8], b"IMGFS-DC");
        assert_eq!(&bytes[8..12], &CACHE_VERSION.to_le_bytes());
        assert_eq!(&bytes[28..32], &FLAG_LOCKED.to_le_bytes());

        let decoded = FileHeader::from_bytes(&bytes);
        assert_eq!(decoded.magic(), CACHE_MAGIC);
        assert_eq!(decoded.version(), CACHE_VERSION);
        assert_eq!(decoded.block_size(), 65536);
        assert_eq!(decoded.origin_size(), 123_456_789);
        assert_eq!(decoded.max_blocks(), 512);
        assert_eq!(decoded.flags(), FLAG_LOCKED);
    }

    #[test]
    fn index_encoding_is_little_endian() {
        let entries = [
            IndexEntry {
                block: 3,
                generation: 0x0102,
                hits: 7,
            },
            IndexEntry::EMPTY,
        ];
        let bytes = encode_index(&entries);
        assert_eq!(bytes.len(), 16);
        assert_eq!(&bytes[..8], &[3, 0, 0, 0, 0x02, 0x01, 7, 0]);
        assert_eq!(&bytes[8..12], &[0xFF; 4]);
        assert_eq!(decode_index(&bytes), entries);
    }

    #[test]
    fn offsets() {
        assert_eq!(index_entry_offset(0), 32);
        assert_eq!(index_entry_offset(2), 48);
        assert_eq!(slot_offset(10, 65536, 1), 32 + 80 + 65536);
    }
}
