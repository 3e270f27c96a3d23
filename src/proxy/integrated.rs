//! Built-in integrated proxy
//!
//! Routes `/.netlify/functions/*` to the functions port, `/.netlify/<addon>/*`
//! to the add-on's endpoint and everything else to the framework server.

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;
use bytes::Bytes;
use futures::TryStreamExt;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, warn};

use super::IntegratedProxy;
use crate::config::ServerSettings;
use crate::error::DevError;

const FUNCTIONS_PREFIX: &str = "/.netlify/functions";

/// Largest request body buffered for forwarding
const MAX_REQUEST_BODY: usize = 32 * 1024 * 1024;

const HOP_BY_HOP: &[HeaderName] = &[
    header::CONNECTION,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
    header::TE,
    header::TRAILER,
    header::PROXY_AUTHORIZATION,
    header::PROXY_AUTHENTICATE,
    header::HOST,
    header::CONTENT_LENGTH,
];

#[derive(Debug)]
struct Routes {
    framework: String,
    functions: String,
    addons: BTreeMap<String, String>,
}

impl Routes {
    /// Upstream URL for a request path (with query)
    fn upstream(&self, path: &str, path_and_query: &str) -> String {
        if path == FUNCTIONS_PREFIX || path.starts_with("/.netlify/functions/") {
            return format!("{}{}", self.functions, path_and_query);
        }
        if let Some(rest) = path_and_query.strip_prefix("/.netlify/") {
            let slug = rest.split(['/', '?']).next().unwrap_or_default();
            if let Some(base) = self.addons.get(slug) {
                return format!("{}{}", base.trim_end_matches('/'), &rest[slug.len()..]);
            }
        }
        format!("{}{}", self.framework, path_and_query)
    }
}

struct ProxyState {
    client: reqwest::Client,
    routes: Routes,
}

/// In-process reverse proxy on the session's main port
#[derive(Debug, Clone, Default)]
pub struct LocalProxy;

#[async_trait]
impl IntegratedProxy for LocalProxy {
    async fn start(
        &self,
        settings: &ServerSettings,
        addon_urls: &BTreeMap<String, String>,
        config_path: Option<&Path>,
        project_root: &Path,
    ) -> Result<Option<String>, DevError> {
        debug!(config = ?config_path, root = %project_root.display(), "Starting integrated proxy");

        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        let state = Arc::new(ProxyState {
            client,
            routes: Routes {
                framework: format!("http://localhost:{}", settings.framework_port),
                functions: format!("http://localhost:{}", settings.functions_port),
                addons: addon_urls.clone(),
            },
        });

        let listener = match TcpListener::bind(("127.0.0.1", settings.port)).await {
            Ok(listener) => listener,
            Err(e) => {
                warn!(port = settings.port, error = %e, "Proxy could not bind");
                return Ok(None);
            }
        };

        let app = Router::new().fallback(forward).with_state(state);
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                error!("Proxy server stopped: {}", e);
            }
        });

        Ok(Some(format!("http://localhost:{}", settings.port)))
    }
}

async fn forward(State(state): State<Arc<ProxyState>>, req: Request) -> Response {
    let (parts, body) = req.into_parts();
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let target = state.routes.upstream(parts.uri.path(), path_and_query);

    let body: Bytes = match axum::body::to_bytes(body, MAX_REQUEST_BODY).await {
        Ok(bytes) => bytes,
        Err(e) => {
            return (StatusCode::PAYLOAD_TOO_LARGE, format!("Request body rejected: {}", e))
                .into_response();
        }
    };

    let upstream = state
        .client
        .request(parts.method, &target)
        .headers(end_to_end(&parts.headers))
        .body(body)
        .send()
        .await;

    match upstream {
        Ok(resp) => {
            let mut builder = Response::builder().status(resp.status());
            if let Some(headers) = builder.headers_mut() {
                *headers = end_to_end(resp.headers());
            }
            let stream = resp
                .bytes_stream()
                .inspect_err(|e| debug!(error = %e, "Upstream body interrupted"));
            builder
                .body(Body::from_stream(stream))
                .unwrap_or_else(|e| {
                    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
                })
        }
        Err(e) => {
            debug!(%target, error = %e, "Upstream request failed");
            (
                StatusCode::BAD_GATEWAY,
                format!("Could not proxy request to {}: {}", target, e),
            )
                .into_response()
        }
    }
}

fn end_to_end(headers: &HeaderMap) -> HeaderMap {
    let mut out = headers.clone();
    for name in HOP_BY_HOP {
        out.remove(name);
    }
    out
}
