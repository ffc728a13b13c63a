use std::fmt;

use imagefs_loader::LoaderError;

/// Errors that can occur during virtual file system operations.
#[derive(Debug)]
pub enum VfsError {
    /// The requested path was not found in the backend.
    NotFound(String),
    /// An IO error occurred while accessing a backend.
    Io(std::io::Error),
    /// The path is invalid (contains `..` or otherwise cannot be resolved).
    InvalidPath(String),
    /// No registered prefix matches the path.
    MissingFileSystem(String),
    /// The path names something no backend can serve (e.g. a content URI
    /// without a content backend).
    Unsupported(String),
    /// An archive or loader could not be opened.
    Loader(LoaderError),
}

impl fmt::Display for VfsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VfsError::NotFound(path) => write!(f, "not found: {path}"),
            VfsError::Io(err) => write!(f, "IO error: {err}"),
            VfsError::InvalidPath(reason) => write!(f, "invalid path: {reason}"),
            VfsError::MissingFileSystem(path) => write!(f, "missing filesystem for {path}"),
            VfsError::Unsupported(path) => write!(f, "unsupported path: {path}"),
            VfsError::Loader(err) => write!(f, "loader error: {err}"),
        }
    }
}

impl std::error::Error for VfsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            VfsError::Io(err) => Some(err),
            VfsError::Loader(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for VfsError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            VfsError::NotFound(err.to_string())
        } else {
            VfsError::Io(err)
        }
    }
}

impl From<LoaderError> for VfsError {
    fn from(err: LoaderError) -> Self {
        match err {
            LoaderError::EntryNotFound(name) => VfsError::NotFound(name),
            LoaderError::NotFound(path) => VfsError::NotFound(path.display().to_string()),
            LoaderError::Io(err) => err.into(),
            other => VfsError::Loader(other),
        }
    }
}
