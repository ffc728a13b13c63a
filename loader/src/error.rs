use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while assembling loaders.
///
/// Reads themselves never return errors; see [`FileLoader::read_at`](crate::FileLoader::read_at).
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("invalid zip archive: {0}")]
    InvalidArchive(String),
    #[error("no entry named {0:?} in archive")]
    EntryNotFound(String),
    #[error("unsupported compression method {method} for {name:?}")]
    UnsupportedCompression { name: String, method: u16 },
    #[error("entry {0:?} is encrypted")]
    Encrypted(String),
    #[error("archive {} contains no recognizable image", .0.display())]
    NoImageInArchive(PathBuf),
}

pub type LoaderResult<T> = Result<T, LoaderError>;
