//! Virtual path canonicalization.
//!
//! Every public operation canonicalizes its path arguments before touching
//! the store, so two spellings of the same path always map to the same
//! object key:
//!
//! - leading root markers (`~` by default) are stripped,
//! - empty and `.` segments are dropped, `..` removes the previous segment
//!   (never climbing above the root),
//! - keys always begin with exactly one `/`,
//! - directory keys always end with exactly one `/`, file keys never do.
//!
//! Canonicalization is total and idempotent.

use blobfs_storage::DELIMITER;

/// Key of the store root, which is also the root directory.
pub const ROOT: &str = "/";

fn segments(path: &str, root_marker: char) -> Vec<&str> {
    let mut segments = Vec::new();
    for segment in path.trim_start_matches(root_marker).split(DELIMITER) {
        match segment {
            "" | "." => {},
            ".." => {
                segments.pop();
            },
            segment => segments.push(segment),
        }
    }
    segments
}

/// Canonical object key for a file path. Never ends in `/` (unless the path
/// resolves to the root).
///
/// ```
/// use blobfs::path::canonicalize_file;
///
/// assert_eq!(canonicalize_file("~/cux/bux/foo.txt", '~'), "/cux/bux/foo.txt");
/// assert_eq!(canonicalize_file("cux//./bux/../foo.txt", '~'), "/cux/foo.txt");
/// ```
pub fn canonicalize_file(path: &str, root_marker: char) -> String {
    let segments = segments(path, root_marker);
    let mut key = String::with_capacity(path.len() + 1);
    for segment in segments {
        key.push(DELIMITER);
        key.push_str(segment);
    }
    if key.is_empty() {
        key.push(DELIMITER);
    }
    key
}

/// Canonical key prefix for a directory path. Always ends in exactly one `/`.
///
/// ```
/// use blobfs::path::canonicalize_directory;
///
/// assert_eq!(canonicalize_directory("~/cux/bux", '~'), "/cux/bux/");
/// assert_eq!(canonicalize_directory("~", '~'), "/");
/// ```
pub fn canonicalize_directory(path: &str, root_marker: char) -> String {
    let mut key = canonicalize_file(path, root_marker);
    if !key.ends_with(DELIMITER) {
        key.push(DELIMITER);
    }
    key
}

/// Whether `path` can only name a directory: it ends in `/`, or it resolves
/// to the root.
pub fn is_directory_form(path: &str, root_marker: char) -> bool {
    path.ends_with(DELIMITER) || canonicalize_file(path, root_marker) == ROOT
}

/// Last segment of a canonical key; empty for the root.
pub fn name(key: &str) -> &str {
    key.trim_end_matches(DELIMITER).rsplit(DELIMITER).next().unwrap_or_default()
}

/// Whether the directory `candidate` is `directory` itself or lies anywhere
/// below it. Both must be canonical directory keys, which makes the prefix
/// comparison segment-aware (`/cux/` does not contain `/cuxfoo/`).
pub fn is_within(directory: &str, candidate: &str) -> bool {
    candidate.starts_with(directory)
}

/// Number of separators in a canonical key.
pub(crate) fn depth(key: &str) -> usize {
    key.matches(DELIMITER).count()
}

/// Move `key` from under the directory `from` to the same relative position
/// under the directory `to`. Returns `None` when `key` is not below `from`.
pub(crate) fn reanchor(key: &str, from: &str, to: &str) -> Option<String> {
    key.strip_prefix(from).map(|relative| format!("{to}{relative}"))
}
