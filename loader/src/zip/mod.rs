//! Zip archives as loader sources.

mod archive;
mod loader;
mod source;

pub use archive::{CompressionMethod, ZipArchive, ZipEntry};
pub use loader::{ZipFileLoader, ZIP_CHUNK_SIZE};
pub use source::LoaderSource;

/// Local file header signature, `PK\x03\x04`.
pub const ZIP_SIGNATURE: [u8; 4] = *b"PK\x03\x04";
