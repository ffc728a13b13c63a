//! Command line arguments.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Inspect disk images through cached loader chains and VFS mounts.
#[derive(Parser, Debug)]
#[command(
    name = "imagefs",
    version,
    about = "Layered file loaders, disk caches and VFS mounts",
    long_about = "Reads images through the configured loader chain (retry, disk cache, \
                  RAM cache, zip) and files through the configured VFS mounts.\n\n\
                  Set RUST_LOG=debug for cache bookkeeping details."
)]
pub struct Args {
    /// TOML config with [loader], [disk_cache] and [[mount]] sections.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the disk cache directory.
    #[arg(long, global = true)]
    pub cache_dir: Option<PathBuf>,

    /// Disable the disk cache layer regardless of config.
    #[arg(long, global = true)]
    pub no_disk_cache: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Write a byte range of an image to stdout.
    Cat {
        image: PathBuf,
        #[arg(long, default_value = "0")]
        offset: u64,
        /// Bytes to write. Defaults to the rest of the image.
        #[arg(long)]
        length: Option<u64>,
        /// Entry to open when the image is a zip archive.
        #[arg(long)]
        entry: Option<String>,
    },
    /// Compare the cached chain against direct reads of the same image.
    Verify {
        image: PathBuf,
        /// Bytes per comparison read.
        #[arg(long, default_value = "1048576")]
        chunk: usize,
    },
    /// List the entries of a zip archive.
    ZipLs { archive: PathBuf },
    /// Read a file through the VFS mounts and write it to stdout.
    VfsRead { path: String },
    /// List a directory through the VFS mounts.
    VfsLs {
        path: String,
        /// `:`-separated extension filter, e.g. `png:jpg`.
        #[arg(long)]
        filter: Option<String>,
    },
    /// List the files in the disk cache directory.
    CacheLs,
    /// Delete old cache files until the given number of bytes is reclaimed.
    CacheGc { bytes: u64 },
}
