//! Request routing dispatch module
//!
//! The [`Router`] is built once from configuration at startup and owned by
//! the shared [`AppState`]; nothing is registered globally.

use crate::config::{AppState, Config, HealthConfig};
use crate::handler::{metadata, static_files};
use crate::http::{self, response::METADATA_ALLOW};
use crate::storage::FileStore;
use http_body_util::Full;
use hyper::body::{Body, Bytes};
use hyper::{Method, Request, Response, StatusCode};
use std::convert::Infallible;
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

const MOUNT_ALLOW: &str = "GET, HEAD, OPTIONS";

/// Request details needed by the file-serving handlers
pub struct RequestContext<'a> {
    pub path: &'a str,
    pub is_head: bool,
    pub if_none_match: Option<&'a str>,
}

/// Route table for the server
pub struct Router {
    metadata_prefix: String,
    pub(crate) store: FileStore,
    pub(crate) public_base_url: String,
    pub(crate) image_base_url: Option<String>,
    pub(crate) max_body_size: u64,
    /// Static mounts, longest prefix first
    mounts: Vec<(String, PathBuf)>,
    health: HealthConfig,
    enable_cors: bool,
}

impl Router {
    pub fn from_config(config: &Config) -> Self {
        let mut mounts: Vec<(String, PathBuf)> = config
            .routes
            .mounts
            .iter()
            .map(|(prefix, dir)| (normalize_prefix(prefix), PathBuf::from(dir)))
            .collect();
        mounts.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

        Self {
            metadata_prefix: normalize_prefix(&config.storage.route_prefix),
            store: FileStore::new(&config.storage.dir),
            public_base_url: config.storage.public_base_url.clone(),
            image_base_url: config.storage.image_base_url.clone(),
            max_body_size: config.http.max_body_size,
            mounts,
            health: config.routes.health.clone(),
            enable_cors: config.http.enable_cors,
        }
    }

    pub const fn store(&self) -> &FileStore {
        &self.store
    }

    /// Dispatch a request to the matching handler
    pub async fn route<B>(&self, req: Request<B>) -> Response<Full<Bytes>>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<Box<dyn Error + Send + Sync>>,
    {
        let path = req.uri().path().to_string();
        let method = req.method().clone();

        // 1. Health check endpoints
        if self.health.enabled && method == Method::GET {
            if path == self.health.liveness_path {
                return http::build_health_response(StatusCode::OK, "ok");
            }
            if path == self.health.readiness_path {
                return if self.store.is_ready().await {
                    http::build_health_response(StatusCode::OK, "ok")
                } else {
                    http::build_health_response(
                        StatusCode::SERVICE_UNAVAILABLE,
                        "storage unavailable",
                    )
                };
            }
        }

        // 2. Metadata submit/retrieve
        if let Some(rest) = strip_route_prefix(&path, &self.metadata_prefix) {
            return self.route_metadata(method, rest, req).await;
        }

        // 3. Static mounts
        if let Some((dir, rest)) = self
            .mounts
            .iter()
            .find_map(|(prefix, dir)| strip_route_prefix(&path, prefix).map(|rest| (dir, rest)))
        {
            return match method {
                Method::GET | Method::HEAD => {
                    let ctx = context(&req, &path);
                    static_files::serve_directory(&ctx, dir, rest).await
                }
                Method::OPTIONS => http::build_options_response(MOUNT_ALLOW, self.enable_cors),
                _ => http::build_405_response(MOUNT_ALLOW),
            };
        }

        http::build_404_response()
    }

    async fn route_metadata<B>(
        &self,
        method: Method,
        rest: &str,
        req: Request<B>,
    ) -> Response<Full<Bytes>>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<Box<dyn Error + Send + Sync>>,
    {
        match method {
            Method::POST | Method::PUT => metadata::submit(self, rest, req).await,
            Method::GET | Method::HEAD => {
                let path = req.uri().path();
                let ctx = context(&req, path);
                if metadata::is_lookup(rest) {
                    metadata::lookup(self, &ctx, rest).await
                } else {
                    static_files::serve_directory(&ctx, self.store.root(), rest).await
                }
            }
            Method::OPTIONS => http::build_options_response(METADATA_ALLOW, self.enable_cors),
            _ => {
                crate::logger::log_warning(&format!("Method not allowed: {method}"));
                http::build_405_response(METADATA_ALLOW)
            }
        }
    }
}

/// Main entry point for HTTP request handling
pub async fn handle_request<B>(
    req: Request<B>,
    state: Arc<AppState>,
) -> Result<Response<Full<Bytes>>, Infallible>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn Error + Send + Sync>>,
{
    Ok(state.router.route(req).await)
}

fn context<'a, B>(req: &'a Request<B>, path: &'a str) -> RequestContext<'a> {
    RequestContext {
        path,
        is_head: req.method() == Method::HEAD,
        if_none_match: req
            .headers()
            .get("if-none-match")
            .and_then(|v| v.to_str().ok()),
    }
}

/// `/metadata/` and `metadata` both become `/metadata`
fn normalize_prefix(prefix: &str) -> String {
    format!("/{}", prefix.trim_matches('/'))
}

/// Remainder of `path` after `prefix`, without the separating slash
///
/// Only whole segments match: `/metadata2` is not under `/metadata`.
fn strip_route_prefix<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    if prefix == "/" {
        return Some(path.trim_start_matches('/'));
    }
    let rest = path.strip_prefix(prefix)?;
    if rest.is_empty() {
        Some(rest)
    } else {
        rest.strip_prefix('/')
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use hyper::HeaderMap;
    use std::path::Path;

    const BASE: &str = "https://meta.example.com/metadata/";

    fn test_state(dir: &Path) -> Arc<AppState> {
        let mut cfg = Config::load_from("does/not/exist/config").unwrap();
        cfg.storage.dir = dir.to_str().unwrap().to_string();
        cfg.storage.public_base_url = BASE.to_string();
        Arc::new(AppState::new(&cfg))
    }

    async fn send(
        state: &Arc<AppState>,
        method: Method,
        uri: &str,
        body: &str,
    ) -> (StatusCode, HeaderMap, Bytes) {
        let req = Request::builder()
            .method(method)
            .uri(uri)
            .body(Full::new(Bytes::from(body.to_string())))
            .unwrap();
        let resp = handle_request(req, Arc::clone(state)).await.unwrap();
        let status = resp.status();
        let headers = resp.headers().clone();
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        (status, headers, body)
    }

    #[test]
    fn test_strip_route_prefix() {
        assert_eq!(strip_route_prefix("/metadata/42", "/metadata"), Some("42"));
        assert_eq!(strip_route_prefix("/metadata", "/metadata"), Some(""));
        assert_eq!(strip_route_prefix("/metadata2/42", "/metadata"), None);
        assert_eq!(strip_route_prefix("/other", "/metadata"), None);
        assert_eq!(normalize_prefix("metadata/"), "/metadata");
    }

    #[tokio::test]
    async fn test_submit_then_retrieve() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let payload = r#"{"name":"Card","description":"d","image":"http://x/i.png"}"#;

        let (status, headers, body) = send(&state, Method::POST, "/metadata/42", payload).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers["content-type"], "application/json");
        assert_eq!(
            &body[..],
            br#"{"url":"https://meta.example.com/metadata/42.json"}"#
        );

        let (status, headers, body) = send(&state, Method::GET, "/metadata/42.json", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers["content-type"], "application/json");
        assert_eq!(
            &body[..],
            b"{\n  \"name\": \"Card\",\n  \"description\": \"d\",\n  \"image\": \"http://x/i.png\"\n}\n"
        );
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());

        send(&state, Method::POST, "/metadata/5", r#"{"name":"one"}"#).await;
        send(&state, Method::PUT, "/metadata/5", r#"{"name":"two"}"#).await;

        let (status, _, body) = send(&state, Method::GET, "/metadata/5", "").await;
        assert_eq!(status, StatusCode::OK);
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["name"], "two");
        assert_eq!(value["description"], "");
        assert_eq!(value["image"], "");
    }

    #[tokio::test]
    async fn test_bad_body_keeps_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        send(&state, Method::POST, "/metadata/9", r#"{"name":"kept"}"#).await;
        let before = std::fs::read(dir.path().join("9.json")).unwrap();

        for bad in [r#""not json""#, "[1,2,3]", r#"{"name":"tru"#, "not json"] {
            let (status, headers, body) = send(&state, Method::POST, "/metadata/9", bad).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "body {bad}");
            assert!(headers["content-type"].to_str().unwrap().starts_with("text/plain"));
            assert!(!body.is_empty());
        }

        assert_eq!(std::fs::read(dir.path().join("9.json")).unwrap(), before);
    }

    #[tokio::test]
    async fn test_decoder_message_is_echoed() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());

        let (status, _, body) = send(&state, Method::POST, "/metadata/1", "[1,2,3]").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let expected = crate::storage::MetadataRecord::from_json(b"[1,2,3]")
            .unwrap_err()
            .to_string();
        assert_eq!(String::from_utf8(body.to_vec()).unwrap(), expected);
    }

    #[tokio::test]
    async fn test_null_and_capitalized_fields_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());

        let payload = r#"{"Name":"Card","description":null,"image":"x"}"#;
        let (status, _, _) = send(&state, Method::POST, "/metadata/7", payload).await;
        assert_eq!(status, StatusCode::OK);

        let raw = std::fs::read(dir.path().join("7.json")).unwrap();
        assert_eq!(
            &raw[..],
            b"{\n  \"name\": \"Card\",\n  \"description\": \"\",\n  \"image\": \"x\"\n}\n"
        );
    }

    #[tokio::test]
    async fn test_lookup_shadows_extensionless_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"raw notes").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub").join("notes.txt"), b"nested notes").unwrap();
        let state = test_state(dir.path());

        // a single identifier-shaped segment is always a record lookup
        let (status, _, body) = send(&state, Method::GET, "/metadata/notes.txt", "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_ne!(&body[..], b"raw notes");

        let (status, _, body) = send(&state, Method::GET, "/metadata/sub/notes.txt", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(&body[..], b"nested notes");
    }

    #[tokio::test]
    async fn test_retrieve_missing() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());

        let (status, _, _) = send(&state, Method::GET, "/metadata/404.json", "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _, _) = send(&state, Method::GET, "/metadata/404", "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _, _) = send(&state, Method::GET, "/nothing/here", "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_traversal_identifier_rejected() {
        let root = tempfile::tempdir().unwrap();
        let storage = root.path().join("metadata");
        std::fs::create_dir(&storage).unwrap();
        let state = test_state(&storage);

        for uri in [
            "/metadata/../escape",
            "/metadata/%2e%2e%2fescape",
            "/metadata/a/b",
            "/metadata/",
        ] {
            let (status, _, _) = send(&state, Method::POST, uri, r#"{"name":"x"}"#).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "uri {uri}");
        }

        assert!(!root.path().join("escape.json").exists());
        assert_eq!(std::fs::read_dir(&storage).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_retrieve_outside_storage_refused() {
        let root = tempfile::tempdir().unwrap();
        let storage = root.path().join("metadata");
        std::fs::create_dir(&storage).unwrap();
        std::fs::write(root.path().join("secret.json"), b"{}").unwrap();
        let state = test_state(&storage);

        let (status, _, _) = send(&state, Method::GET, "/metadata/../secret.json", "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_json_suffix_on_submit_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());

        let (status, _, _) = send(&state, Method::POST, "/metadata/42.json", "{}").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(!dir.path().join("42.json.json").exists());
    }

    #[tokio::test]
    async fn test_base_url_without_trailing_slash() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = Config::load_from("does/not/exist/config").unwrap();
        cfg.storage.dir = dir.path().to_str().unwrap().to_string();
        cfg.storage.public_base_url = "https://meta.example.com/metadata".to_string();
        let state = Arc::new(AppState::new(&cfg));

        let (_, _, body) = send(&state, Method::POST, "/metadata/42", "{}").await;
        assert_eq!(
            &body[..],
            br#"{"url":"https://meta.example.com/metadata/42.json"}"#
        );
    }

    #[tokio::test]
    async fn test_lookup_resolves_relative_image() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = Config::load_from("does/not/exist/config").unwrap();
        cfg.storage.dir = dir.path().to_str().unwrap().to_string();
        cfg.storage.image_base_url = Some("https://cdn.example.com/images/".to_string());
        let state = Arc::new(AppState::new(&cfg));

        send(&state, Method::POST, "/metadata/3", r#"{"name":"c","image":"3.png"}"#).await;

        let (status, _, body) = send(&state, Method::GET, "/metadata/3", "").await;
        assert_eq!(status, StatusCode::OK);
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["image"], "https://cdn.example.com/images/3.png");

        // The stored document keeps the reference as submitted
        let (_, _, raw) = send(&state, Method::GET, "/metadata/3.json", "").await;
        let value: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        assert_eq!(value["image"], "3.png");
    }

    #[tokio::test]
    async fn test_etag_revalidation() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        send(&state, Method::POST, "/metadata/8", r#"{"name":"e"}"#).await;

        let (_, headers, _) = send(&state, Method::GET, "/metadata/8.json", "").await;
        let etag = headers["etag"].to_str().unwrap().to_string();

        let req = Request::builder()
            .uri("/metadata/8.json")
            .header("If-None-Match", &etag)
            .body(Full::new(Bytes::new()))
            .unwrap();
        let resp = handle_request(req, Arc::clone(&state)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_MODIFIED);
    }

    #[tokio::test]
    async fn test_head_has_no_body() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        send(&state, Method::POST, "/metadata/h", r#"{"name":"h"}"#).await;

        let (status, headers, body) = send(&state, Method::HEAD, "/metadata/h.json", "").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.is_empty());
        assert_ne!(headers["content-length"], "0");
    }

    #[tokio::test]
    async fn test_method_handling() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());

        let (status, headers, _) = send(&state, Method::DELETE, "/metadata/1", "").await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(headers["allow"], METADATA_ALLOW);

        let (status, _, _) = send(&state, Method::OPTIONS, "/metadata/1", "").await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_oversized_body() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = Config::load_from("does/not/exist/config").unwrap();
        cfg.storage.dir = dir.path().to_str().unwrap().to_string();
        cfg.http.max_body_size = 16;
        let state = Arc::new(AppState::new(&cfg));

        let payload = r#"{"name":"far too long for the limit"}"#;
        let (status, _, _) = send(&state, Method::POST, "/metadata/big", payload).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert!(!dir.path().join("big.json").exists());
    }

    #[tokio::test]
    async fn test_storage_failure_is_server_error() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir.path().join("missing"));

        let (status, _, body) = send(&state, Method::POST, "/metadata/1", "{}").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(String::from_utf8(body.to_vec()).unwrap().contains("failed to write"));
    }

    #[tokio::test]
    async fn test_health_endpoints() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let (status, _, body) = send(&state, Method::GET, "/healthz", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(&body[..], b"ok");
        let (status, _, _) = send(&state, Method::GET, "/readyz", "").await;
        assert_eq!(status, StatusCode::OK);

        let missing = test_state(&dir.path().join("missing"));
        let (status, _, _) = send(&missing, Method::GET, "/readyz", "").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_static_mount() {
        let dir = tempfile::tempdir().unwrap();
        let images = dir.path().join("images");
        std::fs::create_dir(&images).unwrap();
        std::fs::write(images.join("1.png"), b"\x89PNG").unwrap();

        let mut cfg = Config::load_from("does/not/exist/config").unwrap();
        cfg.storage.dir = dir.path().to_str().unwrap().to_string();
        cfg.routes
            .mounts
            .insert("/images".to_string(), images.to_str().unwrap().to_string());
        let state = Arc::new(AppState::new(&cfg));

        let (status, headers, body) = send(&state, Method::GET, "/images/1.png", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers["content-type"], "image/png");
        assert_eq!(&body[..], b"\x89PNG");

        let (status, _, _) = send(&state, Method::POST, "/images/1.png", "").await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    }
}
