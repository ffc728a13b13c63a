//! Central-directory parsing, done entirely through [`FileLoader::read_at`].

use std::collections::HashMap;
use std::io::{Read, Seek, SeekFrom};

use crate::error::{LoaderError, LoaderResult};
use crate::file_loader::{FileLoader, ReadFlags};

use super::source::LoaderSource;

const EOCD_SIGNATURE: u32 = 0x0605_4b50;
const EOCD64_LOCATOR_SIGNATURE: u32 = 0x0706_4b50;
const EOCD64_SIGNATURE: u32 = 0x0606_4b50;
const CENTRAL_HEADER_SIGNATURE: u32 = 0x0201_4b50;
const LOCAL_HEADER_SIGNATURE: u32 = 0x0403_4b50;

const EOCD_SIZE: u64 = 22;
const EOCD64_LOCATOR_SIZE: u64 = 20;
const EOCD64_SIZE: u64 = 56;
const CENTRAL_HEADER_SIZE: usize = 46;
const LOCAL_HEADER_SIZE: u64 = 30;
const MAX_COMMENT_LEN: u64 = u16::MAX as u64;

const ZIP64_EXTRA_ID: u16 = 0x0001;
const FLAG_ENCRYPTED: u16 = 1 << 0;

/// How an entry's data is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    Stored,
    Deflated,
    Other(u16),
}

impl From<u16> for CompressionMethod {
    fn from(method: u16) -> Self {
        match method {
            0 => Self::Stored,
            8 => Self::Deflated,
            other => Self::Other(other),
        }
    }
}

/// One central-directory record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZipEntry {
    pub name: String,
    pub method: CompressionMethod,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub crc32: u32,
    pub header_offset: u64,
    pub encrypted: bool,
}

impl ZipEntry {
    pub fn is_dir(&self) -> bool {
        self.name.ends_with('/')
    }

    /// Reject entries this crate cannot decode.
    pub fn check_supported(&self) -> LoaderResult<()> {
        if self.encrypted {
            return Err(LoaderError::Encrypted(self.name.clone()));
        }
        if let CompressionMethod::Other(method) = self.method {
            return Err(LoaderError::UnsupportedCompression {
                name: self.name.clone(),
                method,
            });
        }
        Ok(())
    }
}

/// Table of contents of a zip archive.
#[derive(Debug, Clone, Default)]
pub struct ZipArchive {
    entries: Vec<ZipEntry>,
    by_name: HashMap<String, usize>,
}

/// Little-endian field cursor over a byte slice.
struct Fields<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Fields<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn skip(&mut self, n: usize) {
        self.pos += n;
    }

    fn take(&mut self, n: usize) -> LoaderResult<&'a [u8]> {
        let slice = self
            .bytes
            .get(self.pos..self.pos + n)
            .ok_or_else(|| LoaderError::InvalidArchive("truncated record".into()))?;
        self.pos += n;
        Ok(slice)
    }

    fn u16(&mut self) -> LoaderResult<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> LoaderResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> LoaderResult<u64> {
        let b = self.take(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(b);
        Ok(u64::from_le_bytes(raw))
    }
}

fn read_exact_at(source: &dyn FileLoader, pos: u64, len: usize) -> LoaderResult<Vec<u8>> {
    let mut buf = vec![0u8; len];
    let read = source.read_at(pos, &mut buf, ReadFlags::empty());
    if read != len {
        return Err(LoaderError::InvalidArchive(format!(
            "short read at {pos}: {read} of {len} bytes"
        )));
    }
    Ok(buf)
}

/// Location of the central directory.
struct Directory {
    offset: u64,
    size: u64,
    entries: u64,
}

impl ZipArchive {
    /// Parse the central directory of the archive in `source`.
    pub fn parse(source: &dyn FileLoader) -> LoaderResult<Self> {
        let size = source.file_size();
        if size < EOCD_SIZE as i64 {
            return Err(LoaderError::InvalidArchive(format!(
                "{} is too small to be a zip archive",
                source.path().display()
            )));
        }
        let size = size as u64;

        let directory = Self::find_directory(source, size)?;
        let raw = read_exact_at(source, directory.offset, directory.size as usize)?;
        let mut fields = Fields::new(&raw);

        let mut archive = ZipArchive::default();
        for _ in 0..directory.entries {
            let entry = Self::parse_central_header(&mut fields)?;
            archive.by_name.insert(entry.name.clone(), archive.entries.len());
            archive.entries.push(entry);
        }

        log::debug!(
            "Parsed {} zip entries from {}",
            archive.entries.len(),
            source.path().display()
        );
        Ok(archive)
    }

    fn find_directory(source: &dyn FileLoader, size: u64) -> LoaderResult<Directory> {
        let tail_len = size.min(EOCD_SIZE + MAX_COMMENT_LEN);
        let tail_start = size - tail_len;
        let tail = read_exact_at(source, tail_start, tail_len as usize)?;

        let signature = EOCD_SIGNATURE.to_le_bytes();
        let eocd_at = (0..=tail.len() - EOCD_SIZE as usize)
            .rev()
            .find(|&i| tail[i..i + 4] == signature)
            .ok_or_else(|| LoaderError::InvalidArchive("no end of central directory".into()))?;

        let mut fields = Fields::new(&tail[eocd_at..]);
        fields.skip(10);
        let entries = fields.u16()? as u64;
        let dir_size = fields.u32()? as u64;
        let dir_offset = fields.u32()? as u64;

        let eocd_pos = tail_start + eocd_at as u64;
        let needs_zip64 =
            entries == 0xFFFF || dir_size == 0xFFFF_FFFF || dir_offset == 0xFFFF_FFFF;
        if eocd_pos >= EOCD64_LOCATOR_SIZE {
            let locator = read_exact_at(
                source,
                eocd_pos - EOCD64_LOCATOR_SIZE,
                EOCD64_LOCATOR_SIZE as usize,
            )?;
            let mut fields = Fields::new(&locator);
            if fields.u32()? == EOCD64_LOCATOR_SIGNATURE {
                fields.skip(4);
                let record_pos = fields.u64()?;
                return Self::parse_zip64_record(source, record_pos);
            }
        }
        if needs_zip64 {
            return Err(LoaderError::InvalidArchive(
                "zip64 archive without locator".into(),
            ));
        }

        Ok(Directory {
            offset: dir_offset,
            size: dir_size,
            entries,
        })
    }

    fn parse_zip64_record(source: &dyn FileLoader, pos: u64) -> LoaderResult<Directory> {
        let record = read_exact_at(source, pos, EOCD64_SIZE as usize)?;
        let mut fields = Fields::new(&record);
        if fields.u32()? != EOCD64_SIGNATURE {
            return Err(LoaderError::InvalidArchive("bad zip64 end record".into()));
        }
        fields.skip(8 + 2 + 2 + 4 + 4 + 8);
        let entries = fields.u64()?;
        let size = fields.u64()?;
        let offset = fields.u64()?;
        Ok(Directory {
            offset,
            size,
            entries,
        })
    }

    fn parse_central_header(fields: &mut Fields<'_>) -> LoaderResult<ZipEntry> {
        let fixed = fields.take(CENTRAL_HEADER_SIZE)?;
        let mut header = Fields::new(fixed);
        if header.u32()? != CENTRAL_HEADER_SIGNATURE {
            return Err(LoaderError::InvalidArchive(
                "bad central directory header".into(),
            ));
        }
        header.skip(4);
        let flags = header.u16()?;
        let method = header.u16()?;
        header.skip(4);
        let crc32 = header.u32()?;
        let mut compressed_size = header.u32()? as u64;
        let mut uncompressed_size = header.u32()? as u64;
        let name_len = header.u16()? as usize;
        let extra_len = header.u16()? as usize;
        let comment_len = header.u16()? as usize;
        header.skip(8);
        let mut header_offset = header.u32()? as u64;

        let name = String::from_utf8_lossy(fields.take(name_len)?).into_owned();
        let extra = fields.take(extra_len)?;
        fields.skip(comment_len);

        // Zip64 extra field: only the fields saturated in the fixed header are present.
        let mut extra = Fields::new(extra);
        while let (Ok(id), Ok(len)) = (extra.u16(), extra.u16()) {
            let body = extra.take(len as usize)?;
            if id != ZIP64_EXTRA_ID {
                continue;
            }
            let mut zip64 = Fields::new(body);
            if uncompressed_size == 0xFFFF_FFFF {
                uncompressed_size = zip64.u64()?;
            }
            if compressed_size == 0xFFFF_FFFF {
                compressed_size = zip64.u64()?;
            }
            if header_offset == 0xFFFF_FFFF {
                header_offset = zip64.u64()?;
            }
        }

        Ok(ZipEntry {
            name,
            method: method.into(),
            compressed_size,
            uncompressed_size,
            crc32,
            header_offset,
            encrypted: flags & FLAG_ENCRYPTED != 0,
        })
    }

    pub fn entries(&self) -> &[ZipEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn find(&self, name: &str) -> Option<&ZipEntry> {
        self.by_name.get(name).map(|&i| &self.entries[i])
    }

    /// First file entry whose extension is one of `extensions` (case-insensitive).
    pub fn find_first_with_extension(&self, extensions: &[String]) -> Option<&ZipEntry> {
        self.entries.iter().filter(|e| !e.is_dir()).find(|e| {
            e.name
                .rsplit_once('.')
                .is_some_and(|(_, ext)| extensions.iter().any(|x| x.eq_ignore_ascii_case(ext)))
        })
    }

    /// Offset of `entry`'s data, found by reading its local header.
    pub fn data_offset(source: &dyn FileLoader, entry: &ZipEntry) -> LoaderResult<u64> {
        let header = read_exact_at(source, entry.header_offset, LOCAL_HEADER_SIZE as usize)?;
        let mut fields = Fields::new(&header);
        if fields.u32()? != LOCAL_HEADER_SIGNATURE {
            return Err(LoaderError::InvalidArchive(format!(
                "bad local header for {}",
                entry.name
            )));
        }
        fields.skip(22);
        let name_len = fields.u16()? as u64;
        let extra_len = fields.u16()? as u64;
        Ok(entry.header_offset + LOCAL_HEADER_SIZE + name_len + extra_len)
    }

    /// Decompress the whole of entry `name`.
    pub fn read_entry(&self, source: &dyn FileLoader, name: &str) -> LoaderResult<Vec<u8>> {
        let entry = self
            .find(name)
            .ok_or_else(|| LoaderError::EntryNotFound(name.to_string()))?;
        entry.check_supported()?;

        let offset = Self::data_offset(source, entry)?;
        let mut reader = entry_reader(LoaderSource::new(source), entry, offset)?;
        let mut data = Vec::with_capacity(entry.uncompressed_size as usize);
        reader.read_to_end(&mut data)?;

        let mut crc = flate2::Crc::new();
        crc.update(&data);
        if data.len() as u64 != entry.uncompressed_size || crc.sum() != entry.crc32 {
            return Err(LoaderError::InvalidArchive(format!(
                "{} failed its integrity check",
                entry.name
            )));
        }
        Ok(data)
    }
}

/// Decompressing reader over an entry's data.
pub(crate) enum EntryReader<L: FileLoader> {
    Stored(std::io::Take<LoaderSource<L>>),
    Deflated(flate2::read::DeflateDecoder<std::io::Take<LoaderSource<L>>>),
}

impl<L: FileLoader> Read for EntryReader<L> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            Self::Stored(reader) => reader.read(buf),
            Self::Deflated(reader) => reader.read(buf),
        }
    }
}

pub(crate) fn entry_reader<L: FileLoader>(
    mut source: LoaderSource<L>,
    entry: &ZipEntry,
    data_offset: u64,
) -> LoaderResult<EntryReader<L>> {
    source.seek(SeekFrom::Start(data_offset))?;
    let raw = source.take(entry.compressed_size);
    match entry.method {
        CompressionMethod::Stored => Ok(EntryReader::Stored(raw)),
        CompressionMethod::Deflated => Ok(EntryReader::Deflated(
            flate2::read::DeflateDecoder::new(raw),
        )),
        CompressionMethod::Other(method) => Err(LoaderError::UnsupportedCompression {
            name: entry.name.clone(),
            method,
        }),
    }
}
