use std::collections::HashSet;
use std::io::Write;
use std::path::Path;

use imagefs_loader::disk_cache::space;
use imagefs_loader::{
    CacheMode, ChainConfig, DiskCacheRegistry, FileLoader, LocalFileLoader, ReadFlags,
    ZipArchive, open_image,
};
use imagefs_vfs::build_vfs;

use crate::args::Command;
use crate::config::ToolConfig;

/// Bytes requested per read when streaming an image.
const COPY_CHUNK: usize = 1024 * 1024;

pub fn run(command: Command, config: ToolConfig) -> Result<(), String> {
    let registry = DiskCacheRegistry::new(config.disk_cache.clone());

    match command {
        Command::Cat {
            image,
            offset,
            length,
            entry,
        } => {
            let mut loader_config = config.loader.clone();
            if entry.is_some() {
                loader_config.zip_entry = entry;
            }
            let loader = open_image(&image, &loader_config, &registry).map_err(|e| e.to_string())?;
            let mut out = std::io::stdout().lock();
            let written = copy_range(loader.as_ref(), offset, length, &mut out)?;
            log::info!("Wrote {written} bytes from {}", image.display());
            Ok(())
        }
        Command::Verify { image, chunk } => verify(&image, chunk, &config.loader, &registry),
        Command::ZipLs { archive } => zip_ls(&archive),
        Command::VfsRead { path } => {
            let vfs = build_vfs(&config.mount, &config.loader, &registry);
            let data = vfs.read_file(&path).map_err(|e| e.to_string())?;
            std::io::stdout()
                .lock()
                .write_all(&data)
                .map_err(|e| format!("failed to write output: {e}"))
        }
        Command::VfsLs { path, filter } => {
            let vfs = build_vfs(&config.mount, &config.loader, &registry);
            let entries = vfs
                .get_file_listing(&path, filter.as_deref())
                .map_err(|e| e.to_string())?;
            for info in entries {
                let kind = if info.is_directory { 'd' } else { '-' };
                println!("{kind} {:>12} {}", info.size, info.full_path);
            }
            Ok(())
        }
        Command::CacheLs => {
            let dir = &config.disk_cache.cache_dir;
            let files = space::list_cache_files(dir);
            for file in &files {
                let state = if file.locked { "locked" } else { "idle" };
                println!("{:>12} {state:<6} {}", file.size, file.path.display());
            }
            println!(
                "{} cache files, {} bytes free in {}",
                files.len(),
                space::free_disk_space(dir),
                dir.display()
            );
            Ok(())
        }
        Command::CacheGc { bytes } => {
            let dir = &config.disk_cache.cache_dir;
            let reclaimed = space::garbage_collect(dir, bytes, &HashSet::new());
            println!("Reclaimed {reclaimed} bytes from {}", dir.display());
            Ok(())
        }
    }
}

/// Copy `length` bytes at `offset` (or everything up to end of file) into `out`.
fn copy_range(
    loader: &dyn FileLoader,
    offset: u64,
    length: Option<u64>,
    out: &mut impl Write,
) -> Result<u64, String> {
    let size = loader.file_size();
    let end = match (length, size) {
        (Some(length), _) => Some(offset.saturating_add(length)),
        (None, size) if size > 0 => Some(size as u64),
        (None, _) => None,
    };

    let mut buf = vec![0u8; COPY_CHUNK];
    let mut pos = offset;
    while end.is_none_or(|end| pos < end) {
        let want = end.map_or(COPY_CHUNK, |end| (end - pos).min(COPY_CHUNK as u64) as usize);
        let read = loader.read_at(pos, &mut buf[..want], ReadFlags::empty());
        if read == 0 {
            break;
        }
        out.write_all(&buf[..read])
            .map_err(|e| format!("failed to write output: {e}"))?;
        pos += read as u64;
    }
    Ok(pos - offset)
}

/// Read the image through the configured chain and through a bare chain, and
/// compare every chunk.
fn verify(
    image: &Path,
    chunk: usize,
    config: &ChainConfig,
    registry: &DiskCacheRegistry,
) -> Result<(), String> {
    let direct_config = ChainConfig {
        retry: false,
        disk_cache: false,
        ram_cache: CacheMode::None,
        ..config.clone()
    };
    let cached = open_image(image, config, registry).map_err(|e| e.to_string())?;
    let direct = open_image(image, &direct_config, registry).map_err(|e| e.to_string())?;

    let verified = compare_loaders(cached.as_ref(), direct.as_ref(), chunk.max(1))?;
    println!("{}: {verified} bytes match", image.display());
    Ok(())
}

/// Compare two loaders chunk by chunk, returning the bytes compared.
fn compare_loaders(a: &dyn FileLoader, b: &dyn FileLoader, chunk: usize) -> Result<u64, String> {
    if a.file_size() != b.file_size() {
        return Err(format!(
            "size mismatch: {} vs {}",
            a.file_size(),
            b.file_size()
        ));
    }

    let mut pos = 0u64;
    loop {
        let left = a.read_to_vec(pos, chunk, ReadFlags::empty());
        let right = b.read_to_vec(pos, chunk, ReadFlags::empty());
        if left != right {
            let at = left
                .iter()
                .zip(&right)
                .position(|(x, y)| x != y)
                .unwrap_or(left.len().min(right.len()));
            return Err(format!("data mismatch at byte {}", pos + at as u64));
        }
        if left.is_empty() {
            return Ok(pos);
        }
        pos += left.len() as u64;
    }
}

fn zip_ls(archive: &Path) -> Result<(), String> {
    let local = LocalFileLoader::open(archive);
    if !local.exists() {
        return Err(format!("{} not found", archive.display()));
    }
    let zip = ZipArchive::parse(&local).map_err(|e| e.to_string())?;
    for entry in zip.entries() {
        println!(
            "{:>12} {:>12} {:<10} {}",
            entry.uncompressed_size,
            entry.compressed_size,
            format!("{:?}", entry.method),
            entry.name
        );
    }
    println!("{} entries", zip.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use imagefs_loader::MemoryFileLoader;

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 249) as u8).collect()
    }

    #[test]
    fn copy_range_respects_bounds() {
        let data = pattern(3 * COPY_CHUNK / 2);
        let loader = MemoryFileLoader::new("m", data.clone());

        let mut out = Vec::new();
        assert_eq!(copy_range(&loader, 10, Some(100), &mut out).unwrap(), 100);
        assert_eq!(out, &data[10..110]);

        out.clear();
        let written = copy_range(&loader, 5, None, &mut out).unwrap();
        assert_eq!(written as usize, data.len() - 5);
        assert_eq!(out, &data[5..]);

        out.clear();
        let past_end = copy_range(&loader, data.len() as u64 - 3, Some(100), &mut out).unwrap();
        assert_eq!(past_end, 3);
    }

    #[test]
    fn compare_detects_mismatch() {
        let data = pattern(10_000);
        let mut other = data.clone();
        other[7777] ^= 0xFF;

        let a = MemoryFileLoader::new("a", data.clone());
        let b = MemoryFileLoader::new("b", data);
        let c = MemoryFileLoader::new("c", other);

        assert_eq!(compare_loaders(&a, &b, 1000).unwrap(), 10_000);
        assert_eq!(
            compare_loaders(&a, &c, 1000).unwrap_err(),
            "data mismatch at byte 7777"
        );
    }

    #[test]
    fn verify_local_image() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("image.iso");
        std::fs::write(&image, pattern(200_000)).unwrap();

        let registry = DiskCacheRegistry::new(Default::default());
        let config = ChainConfig {
            max_blocks: 2,
            ..ChainConfig::default()
        };
        verify(&image, 4096, &config, &registry).unwrap();
        assert!(verify(&dir.path().join("missing.iso"), 4096, &config, &registry).is_err());
    }
}
