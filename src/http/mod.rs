//! HTTP protocol layer module
//!
//! Response builders, cache validation and MIME detection shared by the
//! metadata handlers and the static file server.

pub mod cache;
pub mod mime;
pub mod response;

// Re-export commonly used builders
pub use response::{
    build_304_response, build_404_response, build_405_response, build_413_response,
    build_health_response, build_json_response, build_options_response, build_text_response,
};
