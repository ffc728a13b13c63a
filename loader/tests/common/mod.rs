//! Shared fixtures for loader integration tests: stub backends and a zip writer.

#![allow(dead_code)]

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use imagefs_loader::{FileLoader, ReadFlags};
use parking_lot::Mutex;

/// Deterministic, non-repeating-per-block test content.
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len)
        .map(|i| ((i as u64).wrapping_mul(2_654_435_761) >> 13) as u8)
        .collect()
}

pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .is_test(true)
        .try_init();
}

// ============================================================================
// Stub Backends
// ============================================================================

/// Log of `read_at` calls shared between a stub and the test.
#[derive(Clone, Default)]
pub struct ReadLog(Arc<Mutex<Vec<(u64, usize)>>>);

impl ReadLog {
    pub fn count(&self) -> usize {
        self.0.lock().len()
    }

    pub fn positions(&self) -> Vec<u64> {
        self.0.lock().iter().map(|&(pos, _)| pos).collect()
    }

    pub fn clear(&self) {
        self.0.lock().clear();
    }

    fn record(&self, pos: u64, len: usize) {
        self.0.lock().push((pos, len));
    }
}

/// In-memory backend that records every read.
pub struct CountingLoader {
    path: PathBuf,
    data: Arc<[u8]>,
    log: ReadLog,
}

impl CountingLoader {
    pub fn new(path: impl Into<PathBuf>, data: Vec<u8>) -> (Self, ReadLog) {
        let log = ReadLog::default();
        let loader = Self {
            path: path.into(),
            data: data.into(),
            log: log.clone(),
        };
        (loader, log)
    }
}

fn copy_out(data: &[u8], pos: u64, buf: &mut [u8]) -> usize {
    let start = (pos as usize).min(data.len());
    let count = buf.len().min(data.len() - start);
    buf[..count].copy_from_slice(&data[start..start + count]);
    count
}

impl FileLoader for CountingLoader {
    fn exists(&self) -> bool {
        true
    }

    fn is_directory(&self) -> bool {
        false
    }

    fn file_size(&self) -> i64 {
        self.data.len() as i64
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn read_at(&self, pos: u64, buf: &mut [u8], _flags: ReadFlags) -> usize {
        self.log.record(pos, buf.len());
        copy_out(&self.data, pos, buf)
    }
}

/// Backend whose every other read comes back short.
pub struct FlakyLoader {
    path: PathBuf,
    data: Vec<u8>,
    calls: AtomicUsize,
}

impl FlakyLoader {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            path: PathBuf::from("flaky.iso"),
            data,
            calls: AtomicUsize::new(0),
        }
    }
}

impl FileLoader for FlakyLoader {
    fn exists(&self) -> bool {
        true
    }

    fn is_directory(&self) -> bool {
        false
    }

    fn file_size(&self) -> i64 {
        self.data.len() as i64
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn read_at(&self, pos: u64, buf: &mut [u8], _flags: ReadFlags) -> usize {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let len = if call % 2 == 0 { buf.len() / 2 } else { buf.len() };
        copy_out(&self.data, pos, &mut buf[..len])
    }
}

/// Backend returning nothing on its first read and everything afterwards.
pub struct ZeroThenFull {
    path: PathBuf,
    data: Vec<u8>,
    pub calls: Arc<AtomicUsize>,
}

impl ZeroThenFull {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            path: PathBuf::from("zero-then-full.iso"),
            data,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl FileLoader for ZeroThenFull {
    fn exists(&self) -> bool {
        true
    }

    fn is_directory(&self) -> bool {
        false
    }

    fn file_size(&self) -> i64 {
        self.data.len() as i64
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn read_at(&self, pos: u64, buf: &mut [u8], _flags: ReadFlags) -> usize {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            return 0;
        }
        copy_out(&self.data, pos, buf)
    }
}

/// Backend that fails exactly one read after being armed.
pub struct FailOnce {
    path: PathBuf,
    data: Vec<u8>,
    armed: Arc<AtomicBool>,
}

impl FailOnce {
    /// The loader plus the switch that arms its next read to fail.
    pub fn new(path: impl Into<PathBuf>, data: Vec<u8>) -> (Self, Arc<AtomicBool>) {
        let armed = Arc::new(AtomicBool::new(false));
        let loader = Self {
            path: path.into(),
            data,
            armed: armed.clone(),
        };
        (loader, armed)
    }
}

impl FileLoader for FailOnce {
    fn exists(&self) -> bool {
        true
    }

    fn is_directory(&self) -> bool {
        false
    }

    fn file_size(&self) -> i64 {
        self.data.len() as i64
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn read_at(&self, pos: u64, buf: &mut [u8], _flags: ReadFlags) -> usize {
        if self.armed.swap(false, Ordering::SeqCst) {
            return 0;
        }
        copy_out(&self.data, pos, buf)
    }
}

/// Backend that has gone away: it still knows its size but cannot be read.
pub struct OfflineLoader {
    path: PathBuf,
    size: i64,
}

impl OfflineLoader {
    pub fn new(path: impl Into<PathBuf>, size: i64) -> Self {
        Self {
            path: path.into(),
            size,
        }
    }
}

impl FileLoader for OfflineLoader {
    fn exists(&self) -> bool {
        false
    }

    fn is_directory(&self) -> bool {
        false
    }

    fn file_size(&self) -> i64 {
        self.size
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn read_at(&self, _pos: u64, _buf: &mut [u8], _flags: ReadFlags) -> usize {
        0
    }
}

// ============================================================================
// Zip Fixtures
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Stored,
    Deflated,
    /// Stored bytes labelled with an arbitrary method id.
    Raw(u16),
    /// Stored bytes with the encryption flag set.
    Encrypted,
}

pub struct ZipFixture<'a> {
    pub name: &'a str,
    pub data: &'a [u8],
    pub method: Method,
}

impl<'a> ZipFixture<'a> {
    pub fn new(name: &'a str, data: &'a [u8], method: Method) -> Self {
        Self { name, data, method }
    }
}

fn put_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn put_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn put_u64(out: &mut Vec<u8>, v: u64) {
    out.extend_from_slice(&v.to_le_bytes());
}

/// Build a zip archive. With `zip64`, sizes and offsets go through the zip64
/// extra field and end-of-directory records.
pub fn write_zip(entries: &[ZipFixture<'_>], zip64: bool) -> Vec<u8> {
    let mut out = Vec::new();
    let mut central = Vec::new();

    for entry in entries {
        let (method, flags, payload) = match entry.method {
            Method::Stored => (0u16, 0u16, entry.data.to_vec()),
            Method::Deflated => {
                let mut encoder = flate2::write::DeflateEncoder::new(
                    Vec::new(),
                    flate2::Compression::default(),
                );
                encoder.write_all(entry.data).unwrap();
                (8, 0, encoder.finish().unwrap())
            }
            Method::Raw(id) => (id, 0, entry.data.to_vec()),
            Method::Encrypted => (0, 1, entry.data.to_vec()),
        };
        let mut crc = flate2::Crc::new();
        crc.update(entry.data);
        let offset = out.len() as u64;

        put_u32(&mut out, 0x0403_4b50);
        put_u16(&mut out, 20);
        put_u16(&mut out, flags);
        put_u16(&mut out, method);
        put_u32(&mut out, 0);
        put_u32(&mut out, crc.sum());
        put_u32(&mut out, payload.len() as u32);
        put_u32(&mut out, entry.data.len() as u32);
        put_u16(&mut out, entry.name.len() as u16);
        put_u16(&mut out, 0);
        out.extend_from_slice(entry.name.as_bytes());
        out.extend_from_slice(&payload);

        let saturate = |v: u64| if zip64 { 0xFFFF_FFFF } else { v as u32 };
        put_u32(&mut central, 0x0201_4b50);
        put_u16(&mut central, 45);
        put_u16(&mut central, 45);
        put_u16(&mut central, flags);
        put_u16(&mut central, method);
        put_u32(&mut central, 0);
        put_u32(&mut central, crc.sum());
        put_u32(&mut central, saturate(payload.len() as u64));
        put_u32(&mut central, saturate(entry.data.len() as u64));
        put_u16(&mut central, entry.name.len() as u16);
        put_u16(&mut central, if zip64 { 28 } else { 0 });
        put_u16(&mut central, 0);
        put_u16(&mut central, 0);
        put_u16(&mut central, 0);
        put_u32(&mut central, 0);
        put_u32(&mut central, saturate(offset));
        central.extend_from_slice(entry.name.as_bytes());
        if zip64 {
            put_u16(&mut central, 0x0001);
            put_u16(&mut central, 24);
            put_u64(&mut central, entry.data.len() as u64);
            put_u64(&mut central, payload.len() as u64);
            put_u64(&mut central, offset);
        }
    }

    let dir_offset = out.len() as u64;
    let dir_size = central.len() as u64;
    let count = entries.len() as u64;
    out.extend_from_slice(&central);

    if zip64 {
        let record_offset = out.len() as u64;
        put_u32(&mut out, 0x0606_4b50);
        put_u64(&mut out, 44);
        put_u16(&mut out, 45);
        put_u16(&mut out, 45);
        put_u32(&mut out, 0);
        put_u32(&mut out, 0);
        put_u64(&mut out, count);
        put_u64(&mut out, count);
        put_u64(&mut out, dir_size);
        put_u64(&mut out, dir_offset);

        put_u32(&mut out, 0x0706_4b50);
        put_u32(&mut out, 0);
        put_u64(&mut out, record_offset);
        put_u32(&mut out, 1);
    }

    put_u32(&mut out, 0x0605_4b50);
    put_u16(&mut out, 0);
    put_u16(&mut out, 0);
    let short_count = if zip64 { 0xFFFF } else { count as u16 };
    put_u16(&mut out, short_count);
    put_u16(&mut out, short_count);
    put_u32(&mut out, if zip64 { 0xFFFF_FFFF } else { dir_size as u32 });
    put_u32(&mut out, if zip64 { 0xFFFF_FFFF } else { dir_offset as u32 });
    put_u16(&mut out, 0);
    out
}
