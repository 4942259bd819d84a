//! A hierarchical file system emulated on top of flat object storage.
//!
//! [`VirtualStore`] maps virtual paths (`~/cux/bux/foo.txt`) onto object keys
//! in any [`ObjectStore`](blobfs_storage::ObjectStore), synthesizing
//! directories from key prefixes and marker objects, and building move and
//! copy out of leased server-side copies and deletes.
//!
//! - [`path`]: canonicalization of virtual paths into object keys.
//! - [`event`]: change notifications for subscribers.
//! - [`mime`]: content types recorded on written files.
//! - [`error`]: the error taxonomy every operation reports in.

mod copy;
mod directory;
pub mod error;
pub mod event;
mod file;
mod lease;
pub mod mime;
pub mod path;
mod record;
mod store;
mod stream;

pub use crate::directory::DIRECTORY_CONTENT_TYPE;
pub use crate::event::{Event, SubscriptionId};
pub use crate::record::{DirectoryRecord, FileRecord};
pub use crate::store::{Options, VirtualStore};
pub use crate::stream::{FileStream, OpenMode};
