//! Request handler module
//!
//! Route dispatch plus the metadata submit/lookup handlers and static file
//! serving for stored records and extra mounts.

pub mod metadata;
pub mod router;
pub mod static_files;

// Re-export main entry point
pub use router::{handle_request, Router};
