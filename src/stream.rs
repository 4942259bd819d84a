//! Buffered file handles returned by [`VirtualStore::open_file()`].

use crate::VirtualStore;
use crate::error::Result;
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// The whole file is downloaded when opened.
    Read,
    /// The file is truncated when opened and uploaded on
    /// [`close()`](FileStream::close).
    Write,
}

/// An open file, held entirely in memory.
///
/// Objects can only be replaced whole, so there are no partial reads or
/// writes against the store: reads come from the buffer downloaded by
/// [`open_file()`](VirtualStore::open_file), and writes only reach the store
/// when the stream is [closed](Self::close). Dropping a write stream without
/// closing it discards everything written to it.
///
/// # Examples
///
/// ```
/// use blobfs::{OpenMode, VirtualStore};
/// use blobfs_storage::store::MemoryStore;
/// use std::io::{Read, Write};
/// use std::sync::Arc;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let vfs = VirtualStore::new(Arc::new(MemoryStore::default()));
///
/// let mut file = vfs.open_file("~/notes.txt", OpenMode::Write).await?;
/// file.write_all(b"hello, ")?;
/// file.write_all(b"world")?;
/// file.close().await?;
///
/// let mut contents = String::new();
/// vfs.open_file("~/notes.txt", OpenMode::Read).await?.read_to_string(&mut contents)?;
/// assert_eq!(contents, "hello, world");
/// # Ok(())
/// # }
/// ```
pub struct FileStream {
    store: VirtualStore,
    path: String,
    mode: OpenMode,
    buffer: Cursor<Vec<u8>>,
}

impl FileStream {
    pub(crate) fn new(store: VirtualStore, path: String, mode: OpenMode, contents: Vec<u8>) -> Self {
        Self {
            store,
            path,
            mode,
            buffer: Cursor::new(contents),
        }
    }

    /// Canonical path of the open file.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    /// Length of the buffered contents in bytes.
    pub fn len(&self) -> u64 {
        self.buffer.get_ref().len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.get_ref().is_empty()
    }

    /// Upload the buffered contents (write mode only) and close the stream.
    pub async fn close(self) -> Result<()> {
        match self.mode {
            OpenMode::Read => Ok(()),
            OpenMode::Write => self.store.write_file(&self.path, self.buffer.get_ref()).await,
        }
    }
}

impl Read for FileStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.buffer.read(buf)
    }
}

impl Write for FileStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.mode == OpenMode::Read {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "file was opened for reading"));
        }
        self.buffer.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for FileStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.buffer.seek(pos)
    }
}
