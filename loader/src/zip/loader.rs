use std::io::{self, Read};
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{LoaderError, LoaderResult};
use crate::file_loader::{FileLoader, ReadFlags};

use super::archive::{self, EntryReader, ZipArchive, ZipEntry};
use super::source::LoaderSource;

/// Granularity of incremental decompression.
pub const ZIP_CHUNK_SIZE: usize = 64 * 1024;

/// One entry of a zip archive, exposed as a [`FileLoader`].
///
/// The archive is read through its backend only; nothing here touches the
/// filesystem. Reads are served from a buffer the size of the uncompressed
/// entry that is decompressed on demand, up to the furthest byte requested so
/// far. The decompressor never rewinds: earlier bytes are already buffered.
///
/// A backend failure mid-stream only shortens the read that hit it. The next
/// read that needs more data starts a fresh decompressor at the entry's data
/// offset and skips the bytes already buffered.
///
/// # Example
///
/// ```ignore
/// let zip = ZipFileLoader::open_entry(Box::new(LocalFileLoader::open("pack.zip")), "game.iso")?;
/// let header = zip.read_to_vec(0, 2048, ReadFlags::empty());
/// ```
pub struct ZipFileLoader {
    backend: Arc<dyn FileLoader>,
    archive: ZipArchive,
    selected: Option<Selected>,
}

struct Selected {
    entry: ZipEntry,
    source: Arc<dyn FileLoader>,
    data_offset: u64,
    state: Mutex<Materialized>,
}

struct Materialized {
    data: Vec<u8>,
    filled: usize,
    reader: Option<EntryReader<Arc<dyn FileLoader>>>,
    crc: flate2::Crc,
}

impl ZipFileLoader {
    /// Parse the archive in `backend`. No entry is selected yet.
    pub fn new(backend: Box<dyn FileLoader>) -> LoaderResult<Self> {
        let backend: Arc<dyn FileLoader> = Arc::from(backend);
        let archive = ZipArchive::parse(backend.as_ref())?;
        Ok(Self {
            backend,
            archive,
            selected: None,
        })
    }

    /// Parse the archive and select entry `name`.
    pub fn open_entry(backend: Box<dyn FileLoader>, name: &str) -> LoaderResult<Self> {
        let mut loader = Self::new(backend)?;
        loader.select(name)?;
        Ok(loader)
    }

    /// Parse the archive and select the first entry with one of `extensions`.
    pub fn open_first_image(
        backend: Box<dyn FileLoader>,
        extensions: &[String],
    ) -> LoaderResult<Self> {
        let mut loader = Self::new(backend)?;
        let name = loader
            .archive
            .find_first_with_extension(extensions)
            .map(|entry| entry.name.clone())
            .ok_or_else(|| LoaderError::NoImageInArchive(loader.backend.path().to_path_buf()))?;
        loader.select(&name)?;
        Ok(loader)
    }

    /// Make entry `name` the content of this loader.
    pub fn select(&mut self, name: &str) -> LoaderResult<()> {
        let entry = self
            .archive
            .find(name)
            .filter(|entry| !entry.is_dir())
            .ok_or_else(|| LoaderError::EntryNotFound(name.to_string()))?
            .clone();
        entry.check_supported()?;

        let offset = ZipArchive::data_offset(self.backend.as_ref(), &entry)?;
        let reader = archive::entry_reader(LoaderSource::new(self.backend.clone()), &entry, offset)?;

        log::debug!(
            "Selected {} ({} bytes) in {}",
            entry.name,
            entry.uncompressed_size,
            self.backend.path().display()
        );
        self.selected = Some(Selected {
            state: Mutex::new(Materialized {
                data: vec![0u8; entry.uncompressed_size as usize],
                filled: 0,
                reader: Some(reader),
                crc: flate2::Crc::new(),
            }),
            source: self.backend.clone(),
            data_offset: offset,
            entry,
        });
        Ok(())
    }

    pub fn archive(&self) -> &ZipArchive {
        &self.archive
    }

    /// The selected entry, if any.
    pub fn entry(&self) -> Option<&ZipEntry> {
        self.selected.as_ref().map(|selected| &selected.entry)
    }

    /// Bytes decompressed so far.
    pub fn materialized(&self) -> usize {
        self.selected
            .as_ref()
            .map_or(0, |selected| selected.state.lock().filled)
    }
}

impl Selected {
    fn read_at(&self, pos: u64, buf: &mut [u8]) -> usize {
        let size = self.entry.uncompressed_size;
        if pos >= size {
            return 0;
        }
        let len = (buf.len() as u64).min(size - pos) as usize;
        let start = pos as usize;
        let end = start + len;

        let mut state = self.state.lock();
        if state.filled < end && state.reader.is_none() {
            state.reader = self.restart(state.filled);
        }
        state.materialize(&self.entry, end);

        let available = state.filled.min(end).saturating_sub(start);
        buf[..available].copy_from_slice(&state.data[start..start + available]);
        available
    }

    /// A new decompressor positioned `skip` bytes into the entry.
    fn restart(&self, skip: usize) -> Option<EntryReader<Arc<dyn FileLoader>>> {
        let source = LoaderSource::new(self.source.clone());
        let mut reader = match archive::entry_reader(source, &self.entry, self.data_offset) {
            Ok(reader) => reader,
            Err(err) => {
                log::warn!("Unable to reopen zip entry {}: {err}", self.entry.name);
                return None;
            }
        };

        let mut scratch = vec![0u8; skip.min(ZIP_CHUNK_SIZE)];
        let mut left = skip;
        while left > 0 {
            let want = left.min(scratch.len());
            match reader.read(&mut scratch[..want]) {
                Ok(0) => {
                    log::warn!(
                        "Zip entry {} ended at {} while resuming at {skip}",
                        self.entry.name,
                        skip - left
                    );
                    return None;
                }
                Ok(read) => left -= read,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => {
                    log::warn!("Unable to resume zip entry {}: {err}", self.entry.name);
                    return None;
                }
            }
        }
        log::debug!("Resumed zip entry {} at {skip}", self.entry.name);
        Some(reader)
    }
}

impl Materialized {
    /// Decompress until at least `end` bytes are buffered or the stream stops.
    ///
    /// A stream that stops early is dropped; the buffered prefix stays valid.
    fn materialize(&mut self, entry: &ZipEntry, end: usize) {
        while self.filled < end {
            let Some(reader) = self.reader.as_mut() else {
                return;
            };
            let chunk_end = (self.filled + ZIP_CHUNK_SIZE).min(self.data.len());
            match reader.read(&mut self.data[self.filled..chunk_end]) {
                Ok(0) => {
                    log::warn!(
                        "Zip entry {} stopped after {} of {} bytes",
                        entry.name,
                        self.filled,
                        self.data.len()
                    );
                    self.reader = None;
                }
                Ok(read) => {
                    self.crc.update(&self.data[self.filled..self.filled + read]);
                    self.filled += read;
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => {
                    log::warn!("Unable to decompress zip entry {}: {err}", entry.name);
                    self.reader = None;
                }
            }
        }

        if self.filled == self.data.len()
            && self.reader.take().is_some()
            && self.crc.sum() != entry.crc32
        {
            log::error!(
                "CRC mismatch in zip entry {}: expected {:08x}, got {:08x}",
                entry.name,
                entry.crc32,
                self.crc.sum()
            );
        }
    }
}

impl FileLoader for ZipFileLoader {
    fn exists(&self) -> bool {
        self.selected.is_some() && self.backend.exists()
    }

    fn exists_fast(&self) -> bool {
        self.selected.is_some() && self.backend.exists_fast()
    }

    fn is_directory(&self) -> bool {
        false
    }

    fn file_size(&self) -> i64 {
        self.entry()
            .map_or(0, |entry| entry.uncompressed_size as i64)
    }

    fn path(&self) -> &Path {
        self.backend.path()
    }

    fn read_at(&self, pos: u64, buf: &mut [u8], _flags: ReadFlags) -> usize {
        match &self.selected {
            Some(selected) => selected.read_at(pos, buf),
            None => 0,
        }
    }

    fn cancel(&self) {
        self.backend.cancel();
    }
}
