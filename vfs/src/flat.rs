//! Directory views over flat `path → size` namespaces (memory, zip).

use std::collections::BTreeMap;

use crate::file_info::FileInfo;
use crate::path;

/// Immediate children of `dir` among `files`, with implicit directories.
///
/// Returns `None` when `dir` is neither the root nor a directory prefix of
/// any file.
pub(crate) fn children<'a>(
    files: impl IntoIterator<Item = (&'a str, u64)>,
    dir: &str,
) -> Option<Vec<FileInfo>> {
    let prefix = if dir.is_empty() {
        String::new()
    } else {
        format!("{dir}/")
    };

    let mut found = dir.is_empty();
    let mut children: BTreeMap<&'a str, FileInfo> = BTreeMap::new();
    for (key, size) in files {
        let Some(rest) = key.strip_prefix(prefix.as_str()) else {
            continue;
        };
        found = true;
        let full_path = |name: &str| path::join(dir, name);
        match rest.split_once('/') {
            Some((child, _)) if !child.is_empty() => {
                children
                    .entry(child)
                    .or_insert_with(|| FileInfo::directory(&full_path(child)));
            }
            None if !rest.is_empty() => {
                children.insert(rest, FileInfo::file(&full_path(rest), size));
            }
            _ => {}
        }
    }

    found.then(|| children.into_values().collect())
}

/// Describe `target` within `files`: a file if it is a key, a directory if it
/// prefixes one.
pub(crate) fn info<'a>(
    files: impl IntoIterator<Item = (&'a str, u64)>,
    target: &str,
) -> Option<FileInfo> {
    if target.is_empty() {
        return Some(FileInfo::directory(""));
    }
    let prefix = format!("{target}/");
    let mut is_dir = false;
    for (key, size) in files {
        if key == target {
            return Some(FileInfo::file(target, size));
        }
        is_dir |= key.starts_with(&prefix);
    }
    is_dir.then(|| FileInfo::directory(target))
}
