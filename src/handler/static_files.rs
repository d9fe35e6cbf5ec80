//! Static file serving module
//!
//! Serves stored records and mounted directories. Lookups never leave the
//! served directory.

use crate::handler::router::RequestContext;
use crate::http::{self, cache, mime};
use crate::logger;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::Response;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Serve `relative` from `dir`, 404 when absent or outside `dir`
pub async fn serve_directory(
    ctx: &RequestContext<'_>,
    dir: &Path,
    relative: &str,
) -> Response<Full<Bytes>> {
    match load_from_directory(dir, relative).await {
        Some((content, content_type)) => {
            build_static_file_response(content, content_type, ctx.if_none_match, ctx.is_head)
        }
        None => {
            logger::log_debug(&format!("Not found: {}", ctx.path));
            http::build_404_response()
        }
    }
}

/// Load a file below `dir`, refusing anything that resolves outside it
pub async fn load_from_directory(dir: &Path, relative: &str) -> Option<(Vec<u8>, &'static str)> {
    let relative = relative.trim_start_matches('/');
    if relative.is_empty() {
        return None;
    }

    let dir_canonical = match fs::canonicalize(dir).await {
        Ok(p) => p,
        Err(e) => {
            logger::log_warning(&format!(
                "Static directory not found or inaccessible '{}': {e}",
                dir.display()
            ));
            return None;
        }
    };

    // File not found is common (404), no need to log
    let file_canonical: PathBuf = fs::canonicalize(dir.join(relative)).await.ok()?;
    if !file_canonical.starts_with(&dir_canonical) {
        logger::log_warning(&format!(
            "Path traversal attempt blocked: {relative} -> {}",
            file_canonical.display()
        ));
        return None;
    }
    if !fs::metadata(&file_canonical).await.ok()?.is_file() {
        return None;
    }

    let content = match fs::read(&file_canonical).await {
        Ok(c) => c,
        Err(e) => {
            logger::log_error(&format!(
                "Failed to read file '{}': {e}",
                file_canonical.display()
            ));
            return None;
        }
    };

    let content_type = mime::get_content_type(file_canonical.extension().and_then(|e| e.to_str()));
    Some((content, content_type))
}

/// Build the file response, or 304 when the client's copy is current
fn build_static_file_response(
    data: Vec<u8>,
    content_type: &str,
    if_none_match: Option<&str>,
    is_head: bool,
) -> Response<Full<Bytes>> {
    let etag = cache::generate_etag(&data);
    if cache::check_etag_match(if_none_match, &etag) {
        return http::build_304_response(&etag);
    }
    http::response::build_file_response(Bytes::from(data), content_type, &etag, is_head)
}
