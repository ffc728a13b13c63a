//! Cache directory housekeeping: naming, sizing and garbage collection.

use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::block::BLOCK_SIZE;

use super::format::{FLAG_LOCKED, FileHeader, HEADER_SIZE};

/// Extension of cache files inside the cache directory.
pub const CACHE_EXTENSION: &str = "dcache";

/// Smallest useful cache (16 MiB). Below this, caching is disabled.
pub const MAX_BLOCKS_LOWER_BOUND: u32 = 256;

/// Largest cache created for one origin (512 MiB).
pub const MAX_BLOCKS_UPPER_BOUND: u32 = 8192;

/// Free space always left to other users of the disk.
pub const SAFETY_FREE_DISK_SPACE: u64 = 768 * 1024 * 1024;

/// Number of origins the free space is shared between.
const CACHE_SPACE_FLEX: u32 = 4;

/// Longest sanitized name kept verbatim in a cache file name.
const MAX_NAME_LEN: usize = 160;

/// Path of the cache file for `origin` inside `cache_dir`.
///
/// The origin path is flattened into a file name. Long paths keep their tail
/// and gain a hash of the full path so distinct origins don't collide.
pub fn cache_file_path(cache_dir: &Path, origin: &Path) -> PathBuf {
    let full = origin.to_string_lossy();
    let sanitized: String = full
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();

    let name = if sanitized.len() > MAX_NAME_LEN {
        let tail = &sanitized[sanitized.len() - MAX_NAME_LEN..];
        format!("{tail}-{:016x}", fnv1a(full.as_bytes()))
    } else {
        sanitized
    };
    cache_dir.join(format!("{name}.{CACHE_EXTENSION}"))
}

/// FNV-1a, stable across builds (file names must survive upgrades).
fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

/// A cache file found in the cache directory.
#[derive(Debug, Clone)]
pub struct CacheFileInfo {
    pub path: PathBuf,
    pub size: u64,
    pub modified: SystemTime,
    pub locked: bool,
}

/// Every cache file in `cache_dir`, oldest first.
pub fn list_cache_files(cache_dir: &Path) -> Vec<CacheFileInfo> {
    let Ok(entries) = std::fs::read_dir(cache_dir) else {
        return Vec::new();
    };

    let mut files: Vec<CacheFileInfo> = entries
        .flatten()
        .filter(|entry| {
            entry
                .path()
                .extension()
                .is_some_and(|ext| ext == CACHE_EXTENSION)
        })
        .filter_map(|entry| {
            let metadata = entry.metadata().ok()?;
            if !metadata.is_file() {
                return None;
            }
            let path = entry.path();
            Some(CacheFileInfo {
                locked: is_locked(&path),
                size: metadata.len(),
                modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
                path,
            })
        })
        .collect();

    files.sort_by_key(|f| f.modified);
    files
}

fn is_locked(path: &Path) -> bool {
    let mut bytes = [0u8; HEADER_SIZE as usize];
    match File::open(path).and_then(|mut f| f.read_exact(&mut bytes)) {
        Ok(()) => FileHeader::from_bytes(&bytes).flags() & FLAG_LOCKED != 0,
        Err(_) => false,
    }
}

/// Number of cache files in `cache_dir`.
pub fn count_cached_files(cache_dir: &Path) -> u32 {
    list_cache_files(cache_dir).len() as u32
}

/// Free bytes on the volume holding `cache_dir`, or 0 if unknown.
pub fn free_disk_space(cache_dir: &Path) -> u64 {
    match fs2::available_space(cache_dir) {
        Ok(bytes) => bytes,
        Err(err) => {
            log::warn!(
                "Unable to query free space for {}: {err}",
                cache_dir.display()
            );
            0
        }
    }
}

/// How many blocks a new cache file may hold given `free_bytes` of free space.
///
/// The space above the safety reserve is split between the files likely to be
/// cached at once. A result below [`MAX_BLOCKS_LOWER_BOUND`] means there is
/// not enough room.
pub fn determine_max_blocks(free_bytes: u64, reserved_bytes: u64, cached_files: u32) -> u32 {
    let avail_bytes = free_bytes.saturating_sub(reserved_bytes);
    let free_blocks = avail_bytes / BLOCK_SIZE as u64;

    let flex = CACHE_SPACE_FLEX.saturating_sub(cached_files).max(1) as u64;
    let free_blocks_with_flex = free_blocks / flex;

    if free_blocks_with_flex > MAX_BLOCKS_LOWER_BOUND as u64 {
        free_blocks_with_flex.min(MAX_BLOCKS_UPPER_BOUND as u64) as u32
    } else {
        free_blocks.min(u32::MAX as u64) as u32
    }
}

/// Delete the oldest cache files that are neither in use nor locked until
/// `goal_bytes` have been reclaimed. Returns the bytes reclaimed.
pub fn garbage_collect(cache_dir: &Path, goal_bytes: u64, in_use: &HashSet<PathBuf>) -> u64 {
    let mut reclaimed = 0;
    for file in list_cache_files(cache_dir) {
        if reclaimed >= goal_bytes {
            break;
        }
        if in_use.contains(&file.path) || file.locked {
            continue;
        }
        match std::fs::remove_file(&file.path) {
            Ok(()) => {
                log::info!(
                    "Removed old disk cache file {} ({} bytes)",
                    file.path.display(),
                    file.size
                );
                reclaimed += file.size;
            }
            Err(err) => log::warn!("Unable to remove {}: {err}", file.path.display()),
        }
    }
    reclaimed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_cache_file(path: &Path, flags: u32, extra: usize) {
        let header = FileHeader::new(BLOCK_SIZE as u32, 10, 1, flags);
        let mut bytes = header.as_bytes().to_vec();
        bytes.resize(bytes.len() + extra, 0);
        std::fs::write(path, bytes).unwrap();
    }

    #[test]
    fn cache_file_name_is_flattened() {
        let path = cache_file_path(Path::new("/cache"), Path::new("/games/my game.iso"));
        assert_eq!(path, Path::new("/cache/_games_my_game.iso.dcache"));
    }

    #[test]
    fn long_names_are_hashed() {
        let a = "/x".repeat(200) + "/a.iso";
        let b = "/y".repeat(200) + "/a.iso";
        let pa = cache_file_path(Path::new("c"), Path::new(&a));
        let pb = cache_file_path(Path::new("c"), Path::new(&b));
        assert_ne!(pa, pb);
        assert!(pa.file_name().unwrap().len() < 200);
    }

    #[test]
    fn max_blocks_bounds() {
        let block = BLOCK_SIZE as u64;
        // Plenty of space: capped.
        assert_eq!(
            determine_max_blocks(1 << 40, SAFETY_FREE_DISK_SPACE, 0),
            MAX_BLOCKS_UPPER_BOUND
        );
        // 4000 free blocks shared four ways.
        assert_eq!(determine_max_blocks(4000 * block, 0, 0), 1000);
        // Three files already cached: one share left.
        assert_eq!(determine_max_blocks(4000 * block, 0, 3), 4000);
        // Too little space: reported as-is, below the lower bound.
        assert_eq!(determine_max_blocks(100 * block, 0, 0), 100);
        // Reserve eats everything.
        assert_eq!(determine_max_blocks(SAFETY_FREE_DISK_SPACE, SAFETY_FREE_DISK_SPACE, 0), 0);
    }

    #[test]
    fn gc_skips_in_use_and_locked() {
        let dir = tempfile::tempdir().unwrap();
        let old = dir.path().join("old.dcache");
        let locked = dir.path().join("locked.dcache");
        let used = dir.path().join("used.dcache");
        let other = dir.path().join("notes.txt");
        write_cache_file(&old, 0, 100);
        write_cache_file(&locked, FLAG_LOCKED, 100);
        write_cache_file(&used, 0, 100);
        std::fs::write(&other, b"keep").unwrap();

        let in_use: HashSet<PathBuf> = [used.clone()].into_iter().collect();
        let reclaimed = garbage_collect(dir.path(), u64::MAX, &in_use);

        assert_eq!(reclaimed, HEADER_SIZE + 100);
        assert!(!old.exists());
        assert!(locked.exists());
        assert!(used.exists());
        assert!(other.exists());
        assert_eq!(count_cached_files(dir.path()), 2);
    }
}
