//! Content types for uploaded files.

/// Infers the content type recorded on an object when a file is written.
///
/// Any `Fn(&str) -> String` is a resolver, which is handy for tests or fixed
/// content types:
///
/// ```
/// use blobfs::mime::ContentTypeResolver;
///
/// let resolver = |_: &str| "application/octet-stream".to_string();
/// assert_eq!(resolver.content_type("/a.txt"), "application/octet-stream");
/// ```
pub trait ContentTypeResolver: Send + Sync {
    fn content_type(&self, path: &str) -> String;
}

impl<F> ContentTypeResolver for F
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn content_type(&self, path: &str) -> String {
        self(path)
    }
}

/// Guesses from the file extension, falling back to
/// `application/octet-stream`.
#[derive(Debug, Default, Clone, Copy)]
pub struct MimeGuess;
impl ContentTypeResolver for MimeGuess {
    fn content_type(&self, path: &str) -> String {
        mime_guess::from_path(path).first_or_octet_stream().essence_str().to_string()
    }
}
