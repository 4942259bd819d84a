pub mod error;
mod key;
pub mod object;
pub mod store;

pub use crate::key::{DELIMITER, validate as validate_key};
pub use crate::object::{Entry, LeaseId, LeaseMode, ObjectMeta};
pub use crate::store::ObjectStore;
use std::sync::Arc;

pub type StoreHandle = Arc<dyn ObjectStore + Send + Sync>;
