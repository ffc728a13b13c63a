use crate::VfsError;

/// Normalize a backend-relative path.
///
/// - Replaces backslashes with forward slashes
/// - Collapses redundant separators (`a///b` → `a/b`)
/// - Drops `.` segments
/// - Rejects `..` segments (path traversal not allowed)
/// - Strips leading and trailing slashes
///
/// An empty result names the backend's root.
pub fn normalize(path: &str) -> Result<String, VfsError> {
    let replaced = path.replace('\\', "/");
    let mut segments = Vec::new();

    for segment in replaced.split('/') {
        if segment.is_empty() || segment == "." {
            continue;
        }
        if segment == ".." {
            return Err(VfsError::InvalidPath(
                "path traversal (..) not allowed".into(),
            ));
        }
        segments.push(segment);
    }

    Ok(segments.join("/"))
}

/// Like [`normalize`], but an empty path is an error.
pub fn normalize_file(path: &str) -> Result<String, VfsError> {
    let normalized = normalize(path)?;
    if normalized.is_empty() {
        return Err(VfsError::InvalidPath("empty path".into()));
    }
    Ok(normalized)
}

/// Whether `path` is an Android-style `content://` URI.
pub fn is_content_uri(path: &str) -> bool {
    path.starts_with("content://")
}

/// Whether `path` addresses local storage directly and bypasses the registry.
///
/// Leading `/`, a drive letter (`C:`), UNC prefixes (`\\` or `//`) and
/// content URIs all count.
pub fn is_local_absolute_path(path: &str) -> bool {
    let bytes = path.as_bytes();
    if bytes.first() == Some(&b'/') || path.starts_with("\\\\") {
        return true;
    }
    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        return true;
    }
    is_content_uri(path)
}

/// Join a relative directory path and an entry name.
pub(crate) fn join(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{dir}/{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_path() {
        assert_eq!(
            normalize("textures/brick.png").unwrap(),
            "textures/brick.png"
        );
    }

    #[test]
    fn leading_and_trailing_slashes() {
        assert_eq!(normalize("/textures/").unwrap(), "textures");
    }

    #[test]
    fn redundant_slashes_and_dots() {
        assert_eq!(
            normalize("textures//./brick.png").unwrap(),
            "textures/brick.png"
        );
    }

    #[test]
    fn backslashes() {
        assert_eq!(
            normalize("textures\\brick.png").unwrap(),
            "textures/brick.png"
        );
    }

    #[test]
    fn reject_dotdot() {
        assert!(normalize("textures/../secret.txt").is_err());
    }

    #[test]
    fn empty_is_root() {
        assert_eq!(normalize("").unwrap(), "");
        assert_eq!(normalize("/./").unwrap(), "");
        assert!(normalize_file("///").is_err());
        assert_eq!(normalize_file("a.txt").unwrap(), "a.txt");
    }

    #[test]
    fn local_absolute_paths() {
        assert!(is_local_absolute_path("/home/user/game.iso"));
        assert!(is_local_absolute_path("C:\\games\\game.iso"));
        assert!(is_local_absolute_path("d:/games"));
        assert!(is_local_absolute_path("\\\\server\\share"));
        assert!(is_local_absolute_path("//server/share"));
        assert!(is_local_absolute_path("content://provider/doc"));

        assert!(!is_local_absolute_path("assets/ui.png"));
        assert!(!is_local_absolute_path("1:"));
        assert!(!is_local_absolute_path(""));
    }

    #[test]
    fn join_paths() {
        assert_eq!(join("", "a"), "a");
        assert_eq!(join("x/y", "a"), "x/y/a");
    }
}
