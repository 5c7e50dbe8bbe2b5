//! Absolute-path handling.
//!
//! Paths are plain `&str`; splitting copies nothing and never mutates
//! the caller's string. Empty segments (doubled or trailing slashes)
//! are skipped by the segment walk and rejected up front where a
//! basename is required.

use crate::error::{FsError, Result};
use crate::param::DIRSIZ;

/// Reject anything that is not an absolute path naming a non-root
/// object: too short, not rooted, or slash-terminated.
pub fn check(path: &str) -> Result<()> {
    if path.len() <= 1 {
        return Err(FsError::InvalidArgument);
    }
    if !path.starts_with('/') {
        return Err(FsError::NotAbsolute);
    }
    if path.ends_with('/') {
        return Err(FsError::TrailingSlash);
    }
    Ok(())
}

/// Split a checked path into its directory part and basename.
/// The directory part of a top-level name is `"/"`.
pub fn split(path: &str) -> (&str, &str) {
    debug_assert!(check(path).is_ok());
    let (dir, base) = path.rsplit_once('/').expect("checked path has a slash");
    if dir.is_empty() {
        ("/", base)
    } else {
        (dir, base)
    }
}

/// The non-empty `/`-separated segments of a directory path.
pub fn segments(dir: &str) -> impl Iterator<Item = &str> {
    dir.split('/').filter(|s| !s.is_empty())
}

/// Basenames longer than a directory entry can hold are refused.
pub fn check_name(name: &str) -> Result<()> {
    if name.len() >= DIRSIZ {
        return Err(FsError::NameTooLong);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checks() {
        assert!(matches!(check(""), Err(FsError::InvalidArgument)));
        assert!(matches!(check("/"), Err(FsError::InvalidArgument)));
        assert!(matches!(check("ab"), Err(FsError::NotAbsolute)));
        assert!(matches!(check("/a/"), Err(FsError::TrailingSlash)));
        assert!(check("/a").is_ok());
    }

    #[test]
    fn splits() {
        assert_eq!(split("/a"), ("/", "a"));
        assert_eq!(split("/a/b"), ("/a", "b"));
        assert_eq!(split("/a/b/c"), ("/a/b", "c"));
    }

    #[test]
    fn segment_walk_skips_empties() {
        let v: Vec<_> = segments("/a//b").collect();
        assert_eq!(v, ["a", "b"]);
        assert_eq!(segments("/").count(), 0);
        assert_eq!(segments("").count(), 0);
    }
}
