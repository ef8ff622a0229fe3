//! Credential proxy in front of the n8n REST API.
//!
//! Browser code calls this relay instead of n8n directly so the API key never
//! leaves the server. The relay keeps no state between requests.

pub mod cors;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    body::Body,
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
};

use crate::config::GhostToml;
use crate::errors::ProxyError;

pub use cors::cors_headers;

pub const API_KEY_HEADER: &str = "x-n8n-api-key";

const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Headers that describe one hop and must not be relayed.
fn is_hop_header(name: &header::HeaderName) -> bool {
    *name == header::HOST
        || *name == header::CONNECTION
        || *name == header::CONTENT_LENGTH
        || *name == header::TRANSFER_ENCODING
}

#[derive(Clone)]
pub struct ProxyState {
    http: reqwest::Client,
    base_url: Arc<str>,
    api_key: Arc<str>,
    allowed_origins: Option<Arc<str>>,
}

impl ProxyState {
    pub fn new(base_url: &str, api_key: &str, allowed_origins: Option<&str>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("ghost-hunter-proxy/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url: Arc::from(base_url.trim_end_matches('/')),
            api_key: Arc::from(api_key),
            allowed_origins: allowed_origins.map(Arc::from),
        })
    }

    /// Build from configuration. Fails when no API key is configured.
    pub fn from_config(config: &GhostToml) -> Result<Self> {
        let api_key = config
            .upstream
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .context("N8N_API_KEY is not configured; refusing to start the credential proxy")?;
        Self::new(
            &config.upstream.base_url,
            api_key,
            config.proxy.allowed_origins.as_deref(),
        )
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({
                "error": "Internal server error",
                "message": self.to_string(),
            })),
        )
            .into_response()
    }
}

pub fn router(state: ProxyState) -> Router {
    Router::new().fallback(relay).with_state(state)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Preflight,
    Health,
    Api,
    Webhook,
    NotFound,
}

fn classify(method: &Method, path: &str) -> Route {
    if method == Method::OPTIONS {
        Route::Preflight
    } else if path == "/health" || path == "/" {
        Route::Health
    } else if path.starts_with("/api/v1/") {
        Route::Api
    } else if path.starts_with("/webhook/") {
        Route::Webhook
    } else {
        Route::NotFound
    }
}

async fn relay(State(state): State<ProxyState>, request: Request) -> Response {
    let origin = request
        .headers()
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let route = classify(request.method(), request.uri().path());
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let mut response = match route {
        Route::Preflight => StatusCode::OK.into_response(),
        Route::Health => Json(serde_json::json!({
            "status": "ok",
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }))
        .into_response(),
        Route::Api | Route::Webhook => {
            match forward(&state, request, route == Route::Api).await {
                Ok(response) => {
                    tracing::info!(%method, %path, status = response.status().as_u16(), "Proxied request");
                    response
                }
                Err(e) => {
                    tracing::error!(%method, %path, error = %e, "Proxy request failed");
                    e.into_response()
                }
            }
        }
        Route::NotFound => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": "Not found"})),
        )
            .into_response(),
    };

    response.headers_mut().extend(cors_headers(
        origin.as_deref(),
        state.allowed_origins.as_deref(),
    ));
    response
}

fn json_content_type(headers: &HeaderMap) -> HeaderValue {
    headers
        .get(header::CONTENT_TYPE)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static("application/json"))
}

/// Relay one request upstream and stream the answer back. Credentialed
/// requests carry the caller's headers plus the API key; webhook requests
/// carry only their content type.
async fn forward(
    state: &ProxyState,
    request: Request,
    credentialed: bool,
) -> Result<Response, ProxyError> {
    let (parts, body) = request.into_parts();
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let target = format!("{}{}", state.base_url, path_and_query);
    let url = reqwest::Url::parse(&target).map_err(|_| ProxyError::InvalidUrl { url: target })?;

    let body = axum::body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| ProxyError::Body(e.to_string()))?;

    let mut outbound = HeaderMap::new();
    if credentialed {
        for (name, value) in parts.headers.iter() {
            if !is_hop_header(name) && name.as_str() != API_KEY_HEADER {
                outbound.append(name.clone(), value.clone());
            }
        }
        let key = HeaderValue::from_str(&state.api_key)
            .map_err(|_| ProxyError::Response("API key is not a valid header value".into()))?;
        outbound.insert(API_KEY_HEADER, key);
    } else {
        outbound.insert(header::CONTENT_TYPE, json_content_type(&parts.headers));
    }

    let upstream = state
        .http
        .request(parts.method, url)
        .headers(outbound)
        .body(body)
        .send()
        .await
        .map_err(ProxyError::Upstream)?;

    let status = upstream.status();
    let content_type = json_content_type(upstream.headers());
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, content_type)
        .body(Body::from_stream(upstream.bytes_stream()))
        .map_err(|e| ProxyError::Response(e.to_string()))
}

/// Run the proxy until Ctrl+C.
pub async fn start_proxy(config: &GhostToml, host: &str) -> Result<()> {
    let state = ProxyState::from_config(config)?;
    let app = router(state);

    let addr = format!("{}:{}", host, config.proxy.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    let local_addr = listener.local_addr()?;
    tracing::info!(%local_addr, upstream = %config.upstream.base_url, "Credential proxy listening");
    println!("Ghost Hunter proxy running at http://{}", local_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(crate::dashboard::server::shutdown_signal())
        .await
        .context("Proxy server error")?;
    Ok(())
}
