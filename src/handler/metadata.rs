//! Metadata submit and lookup handlers

use crate::handler::router::{RequestContext, Router};
use crate::http;
use crate::logger;
use crate::storage::{Identifier, MetadataRecord, StoreError};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::{Body, Bytes};
use hyper::{HeaderMap, Request, Response, StatusCode};
use serde::Serialize;
use std::error::Error;

/// Body returned by a successful submit
#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub url: String,
}

/// Whether a GET under the prefix names a record (as opposed to a file)
pub fn is_lookup(rest: &str) -> bool {
    !rest.ends_with(".json") && Identifier::parse(rest).is_ok()
}

/// Store the JSON body under the identifier and answer with its public URL
pub async fn submit<B>(router: &Router, raw_id: &str, req: Request<B>) -> Response<Full<Bytes>>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn Error + Send + Sync>>,
{
    let id = match Identifier::parse(raw_id) {
        Ok(id) => id,
        Err(e) => {
            logger::log_warning(&format!("Rejected identifier '{raw_id}': {e}"));
            return http::build_text_response(StatusCode::BAD_REQUEST, &e.to_string());
        }
    };
    if raw_id.ends_with(".json") {
        return http::build_text_response(
            StatusCode::BAD_REQUEST,
            "identifier must not carry the .json suffix",
        );
    }

    if let Some(resp) = check_body_size(req.headers(), router.max_body_size) {
        return resp;
    }

    let limit = usize::try_from(router.max_body_size).unwrap_or(usize::MAX);
    let body = match Limited::new(req.into_body(), limit).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) if e.is::<LengthLimitError>() => {
            logger::log_warning(&format!("Request body for '{id}' exceeds {limit} bytes"));
            return http::build_413_response();
        }
        Err(e) => {
            return http::build_text_response(
                StatusCode::BAD_REQUEST,
                &format!("Failed to read request body: {e}"),
            );
        }
    };

    let record = match MetadataRecord::from_json(&body) {
        Ok(r) => r,
        Err(e) => return http::build_text_response(StatusCode::BAD_REQUEST, &e.to_string()),
    };

    if let Err(e) = router.store.put(&id, &record).await {
        return store_error_response(&e);
    }

    let url = crate::storage::join_url(&router.public_base_url, &id.file_name());
    logger::log_debug(&format!("Stored metadata for '{id}' -> {url}"));
    http::build_json_response(StatusCode::OK, &SubmitResponse { url }, false)
}

/// Return the stored record, resolving a relative image reference
pub async fn lookup(router: &Router, ctx: &RequestContext<'_>, raw_id: &str) -> Response<Full<Bytes>> {
    let Ok(id) = Identifier::parse(raw_id) else {
        return http::build_404_response();
    };

    match router.store.get(&id).await {
        Ok(Some(record)) => {
            let record = match &router.image_base_url {
                Some(base) => record.with_image_base(base),
                None => record,
            };
            http::build_json_response(StatusCode::OK, &record, ctx.is_head)
        }
        Ok(None) => http::build_404_response(),
        Err(e) => store_error_response(&e),
    }
}

/// Reject early when `Content-Length` already exceeds the limit
fn check_body_size(headers: &HeaderMap, max_body_size: u64) -> Option<Response<Full<Bytes>>> {
    let size = headers
        .get("content-length")?
        .to_str()
        .ok()?
        .parse::<u64>()
        .ok()?;
    if size > max_body_size {
        logger::log_warning(&format!(
            "Request body too large: {size} bytes (max: {max_body_size})"
        ));
        return Some(http::build_413_response());
    }
    None
}

fn store_error_response(e: &StoreError) -> Response<Full<Bytes>> {
    logger::log_error(&e.to_string());
    http::build_text_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
}
