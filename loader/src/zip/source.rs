use std::io::{self, Read, Seek, SeekFrom};

use crate::file_loader::{FileLoader, ReadFlags};

/// `Read + Seek` view of a [`FileLoader`].
///
/// Every read becomes a positioned `read_at` on the loader, so archive code
/// written against std I/O traits works over any backend, including ones with
/// no filesystem behind them.
pub struct LoaderSource<L: FileLoader> {
    loader: L,
    pos: u64,
}

impl<L: FileLoader> LoaderSource<L> {
    pub fn new(loader: L) -> Self {
        Self { loader, pos: 0 }
    }

    /// Size of the underlying source, zero when unknown.
    pub fn len(&self) -> u64 {
        self.loader.file_size().max(0) as u64
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_inner(self) -> L {
        self.loader
    }
}

impl<L: FileLoader> Read for LoaderSource<L> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let read = self.loader.read_at(self.pos, buf, ReadFlags::empty());
        self.pos += read as u64;
        Ok(read)
    }
}

impl<L: FileLoader> Seek for LoaderSource<L> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => self.len().checked_add_signed(delta),
            SeekFrom::Current(delta) => self.pos.checked_add_signed(delta),
        };
        match target {
            Some(target) => {
                self.pos = target;
                Ok(target)
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of source",
            )),
        }
    }
}
