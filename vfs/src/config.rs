use imagefs_loader::{ChainConfig, DiskCacheRegistry, FileLoader, LocalFileLoader, wrap_chain};
use serde::Deserialize;

use crate::directory::DirectoryReader;
use crate::error::VfsError;
use crate::vfs::Vfs;
use crate::zip_reader::ZipAssetReader;

/// A single VFS mount point definition, usually a `[[mount]]` table.
///
/// ```toml
/// [[mount]]
/// prefix = "assets/"
/// path = "./assets"
///
/// [[mount]]
/// prefix = "assets/"
/// type = "zip"
/// path = "./assets.zip"
/// root = "data"
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct MountConfig {
    pub prefix: String,
    /// `"directory"` (default) or `"zip"`.
    #[serde(default = "default_mount_type")]
    pub r#type: String,
    pub path: String,
    /// Directory inside a zip archive to expose. Ignored for directories.
    pub root: Option<String>,
}

fn default_mount_type() -> String {
    "directory".into()
}

/// Build a [`Vfs`] from mount definitions, registered in order.
///
/// Zip archives are read through the loader chain described by `chain`.
/// Mounts that fail to open are logged and skipped.
pub fn build_vfs(mounts: &[MountConfig], chain: &ChainConfig, registry: &DiskCacheRegistry) -> Vfs {
    let vfs = Vfs::new();

    for mount in mounts {
        match mount.r#type.as_str() {
            "directory" => {
                vfs.register(&mount.prefix, DirectoryReader::new(&mount.path));
            }
            "zip" => match open_zip(mount, chain, registry) {
                Ok(reader) => {
                    vfs.register(&mount.prefix, reader);
                }
                Err(e) => {
                    log::error!("Failed to open zip mount \"{}\": {e}", mount.prefix);
                }
            },
            other => {
                log::warn!("Unknown mount type \"{}\" for \"{}\"", other, mount.prefix);
            }
        }
    }

    vfs
}

fn open_zip(
    mount: &MountConfig,
    chain: &ChainConfig,
    registry: &DiskCacheRegistry,
) -> Result<ZipAssetReader, VfsError> {
    let local = LocalFileLoader::open(&mount.path);
    if !local.exists() {
        return Err(VfsError::NotFound(mount.path.clone()));
    }
    let loader = wrap_chain(Box::new(local), chain, registry);
    ZipAssetReader::new(loader, mount.root.as_deref().unwrap_or(""))
}
