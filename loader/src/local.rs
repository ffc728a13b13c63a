use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use crate::file_loader::{FileLoader, ReadFlags};

/// Leaf loader reading a file on local disk.
///
/// Uses positioned reads, so concurrent `read_at` calls never race on a
/// shared cursor. A file that cannot be opened still produces a loader: it
/// reports `exists() == false`, a size of zero and empty reads, which lets
/// decorators above it (retry, disk cache) decide what to do.
pub struct LocalFileLoader {
    path: PathBuf,
    file: Option<File>,
    size: i64,
    is_directory: bool,
}

impl LocalFileLoader {
    /// Open `path` for reading.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let is_directory = path.is_dir();
        let file = if is_directory {
            None
        } else {
            match File::open(&path) {
                Ok(file) => Some(file),
                Err(err) => {
                    log::warn!("Unable to open {}: {err}", path.display());
                    None
                }
            }
        };
        let size = file
            .as_ref()
            .and_then(|f| f.metadata().ok())
            .map(|m| m.len() as i64)
            .unwrap_or(0);

        Self {
            path,
            file,
            size,
            is_directory,
        }
    }

    fn read_once(file: &File, pos: u64, buf: &mut [u8]) -> io::Result<usize> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::FileExt;
            file.read_at(buf, pos)
        }
        #[cfg(windows)]
        {
            use std::os::windows::fs::FileExt;
            file.seek_read(buf, pos)
        }
        #[cfg(not(any(unix, windows)))]
        {
            let _ = (file, pos, buf);
            Err(io::ErrorKind::Unsupported.into())
        }
    }
}

impl FileLoader for LocalFileLoader {
    fn exists(&self) -> bool {
        self.file.is_some() || self.is_directory
    }

    fn is_directory(&self) -> bool {
        self.is_directory
    }

    fn file_size(&self) -> i64 {
        self.size
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn read_at(&self, pos: u64, buf: &mut [u8], _flags: ReadFlags) -> usize {
        let Some(file) = &self.file else {
            return 0;
        };

        let mut total = 0;
        while total < buf.len() {
            match Self::read_once(file, pos + total as u64, &mut buf[total..]) {
                Ok(0) => break,
                Ok(n) => total += n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    log::warn!(
                        "Read of {} bytes at {pos} from {} failed: {err}",
                        buf.len(),
                        self.path.display()
                    );
                    break;
                }
            }
        }
        total
    }
}
