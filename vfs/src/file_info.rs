use std::fs::Metadata;
use std::time::SystemTime;

/// What a backend knows about one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// Last path component.
    pub name: String,
    /// Path as passed to the backend.
    pub full_path: String,
    pub exists: bool,
    pub size: u64,
    pub is_directory: bool,
    pub is_writable: bool,
    pub modified: Option<SystemTime>,
}

impl FileInfo {
    /// A regular file with no timestamp.
    pub fn file(full_path: &str, size: u64) -> Self {
        Self {
            name: file_name(full_path).to_string(),
            full_path: full_path.to_string(),
            exists: true,
            size,
            is_directory: false,
            is_writable: false,
            modified: None,
        }
    }

    /// A directory with no timestamp.
    pub fn directory(full_path: &str) -> Self {
        Self {
            is_directory: true,
            ..Self::file(full_path, 0)
        }
    }

    pub fn from_metadata(full_path: &str, metadata: &Metadata) -> Self {
        Self {
            name: file_name(full_path).to_string(),
            full_path: full_path.to_string(),
            exists: true,
            size: if metadata.is_dir() { 0 } else { metadata.len() },
            is_directory: metadata.is_dir(),
            is_writable: !metadata.permissions().readonly(),
            modified: metadata.modified().ok(),
        }
    }

    /// Whether this entry passes a `:`-separated extension filter such as
    /// `"png:jpg"`. Directories always pass; so does everything when there is
    /// no filter.
    pub fn matches_filter(&self, filter: Option<&str>) -> bool {
        let Some(filter) = filter.filter(|f| !f.is_empty()) else {
            return true;
        };
        if self.is_directory {
            return true;
        }
        let Some((_, ext)) = self.name.rsplit_once('.') else {
            return false;
        };
        filter
            .split(':')
            .any(|wanted| wanted.eq_ignore_ascii_case(ext))
    }
}

fn file_name(path: &str) -> &str {
    let trimmed = path.trim_end_matches(['/', '\\']);
    trimmed
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(trimmed)
}
