//! Record storage module
//!
//! Durable per-identifier metadata storage on the local filesystem.
//! One pretty-printed JSON document per record, replaced atomically on write.

mod file_store;
mod identifier;
mod record;

pub use file_store::{FileStore, StoreError};
pub use identifier::Identifier;
pub use record::{join_url, MetadataRecord};
