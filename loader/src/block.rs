//! Block geometry shared by every caching layer.

/// log2 of [`BLOCK_SIZE`].
pub const BLOCK_SHIFT: u32 = 16;

/// Size of one cache block (64 KiB).
pub const BLOCK_SIZE: usize = 1 << BLOCK_SHIFT;

/// Number of blocks the read-ahead workers try to stay ahead of the reader.
pub const BLOCK_READAHEAD: u64 = 4;

/// Index of the block containing byte `pos`.
#[inline]
pub fn block_of(pos: u64) -> u64 {
    pos >> BLOCK_SHIFT
}

/// First byte offset of `block`.
#[inline]
pub fn block_start(block: u64) -> u64 {
    block << BLOCK_SHIFT
}

/// Inclusive range of blocks covering `len` bytes starting at `pos`.
///
/// `len` must be non-zero.
#[inline]
pub fn block_span(pos: u64, len: usize) -> (u64, u64) {
    debug_assert!(len > 0);
    (block_of(pos), block_of(pos + len as u64 - 1))
}

/// Number of blocks needed to hold `size` bytes, or `None` if the size is unknown.
pub fn block_count(size: i64) -> Option<u64> {
    if size <= 0 {
        return None;
    }
    Some((size as u64).div_ceil(BLOCK_SIZE as u64))
}

/// Length of the request after clipping it to a known file size.
///
/// Unknown sizes (`<= 0`) leave the request untouched.
pub fn clamp_len(pos: u64, len: usize, file_size: i64) -> usize {
    if file_size <= 0 {
        return len;
    }
    let size = file_size as u64;
    if pos >= size {
        return 0;
    }
    len.min((size - pos).min(usize::MAX as u64) as usize)
}

/// Expected payload length of `block` for a file of `file_size` bytes.
///
/// Blocks of files with unknown size are assumed to be full.
pub fn block_len(block: u64, file_size: i64) -> usize {
    if file_size <= 0 {
        return BLOCK_SIZE;
    }
    let start = block_start(block);
    let size = file_size as u64;
    if start >= size {
        0
    } else {
        (size - start).min(BLOCK_SIZE as u64) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_within_one_block() {
        assert_eq!(block_span(10, 100), (0, 0));
    }

    #[test]
    fn span_crossing_blocks() {
        assert_eq!(block_span(BLOCK_SIZE as u64 - 1, 2), (0, 1));
        assert_eq!(block_span(0, BLOCK_SIZE * 3), (0, 2));
    }

    #[test]
    fn count_rounds_up() {
        assert_eq!(block_count(1), Some(1));
        assert_eq!(block_count(BLOCK_SIZE as i64), Some(1));
        assert_eq!(block_count(BLOCK_SIZE as i64 + 1), Some(2));
        assert_eq!(block_count(0), None);
        assert_eq!(block_count(-1), None);
    }

    #[test]
    fn clamp_to_file_size() {
        assert_eq!(clamp_len(0, 100, 50), 50);
        assert_eq!(clamp_len(60, 100, 50), 0);
        assert_eq!(clamp_len(0, 100, 0), 100);
    }

    #[test]
    fn last_block_is_partial() {
        let size = BLOCK_SIZE as i64 + 10;
        assert_eq!(block_len(0, size), BLOCK_SIZE);
        assert_eq!(block_len(1, size), 10);
        assert_eq!(block_len(2, size), 0);
        assert_eq!(block_len(7, -1), BLOCK_SIZE);
    }
}
