//! Object key validation.
//!
//! Object keys are flat strings. Hierarchy is purely a naming convention
//! (`/`-delimited prefixes) that stores do not interpret beyond prefix
//! listings, so validation is deliberately small.

use crate::error::{ErrorKind, Result};

/// Delimiter used to fold keys into common prefixes.
pub const DELIMITER: char = '/';

/// Validates an object key.
///
/// Rejects empty keys and keys containing null bytes. Everything else is
/// passed through untouched; keys are used verbatim.
///
/// # Examples
///
/// ```
/// use blobfs_storage::validate_key;
/// assert!(validate_key("/cux/bux/foo.txt").is_ok());
/// assert!(validate_key("/cux/bux/").is_ok());
/// assert!(validate_key("").is_err());
/// assert!(validate_key("a\0b").is_err());
/// ```
pub fn validate(key: &str) -> Result<&str> {
    // Null bytes cause truncation in a surprising number of HTTP and C
    // layers; reject them explicitly.
    if key.is_empty() || key.contains('\0') {
        exn::bail!(ErrorKind::InvalidKey(key.to_string()));
    }
    Ok(key)
}

/// Split the part of `key` below `prefix` into the object itself or the
/// common prefix it folds into for a non-recursive listing.
///
/// Returns `None` when `key` doesn't start with `prefix`.
pub(crate) fn fold(prefix: &str, key: &str) -> Option<Folded> {
    let rest = key.strip_prefix(prefix)?;
    Some(match rest.find(DELIMITER) {
        Some(idx) => Folded::Prefix(key[..prefix.len() + idx + 1].to_string()),
        None => Folded::Object,
    })
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Folded {
    Object,
    Prefix(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("/a/b.txt")]
    #[case("/a/")]
    #[case("/")]
    #[case("no-leading-slash")]
    fn test_valid_keys(#[case] key: &str) {
        assert_eq!(validate(key).unwrap(), key);
    }

    #[rstest]
    #[case("")]
    #[case("\0")]
    #[case("/a\0b")]
    fn test_invalid_keys(#[case] key: &str) {
        let err = validate(key).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidKey(_)));
    }

    #[rstest]
    #[case("/d/", "/d/a", Some(Folded::Object))]
    #[case("/d/", "/d/", Some(Folded::Object))]
    #[case("/d/", "/d/sub/c", Some(Folded::Prefix("/d/sub/".to_string())))]
    #[case("/d/", "/d/sub/", Some(Folded::Prefix("/d/sub/".to_string())))]
    #[case("/d/", "/dx/a", None)]
    #[case("/", "/d/a", Some(Folded::Prefix("/d/".to_string())))]
    fn test_fold(#[case] prefix: &str, #[case] key: &str, #[case] expected: Option<Folded>) {
        assert_eq!(fold(prefix, key), expected);
    }
}
