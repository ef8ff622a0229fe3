use axum::http::{HeaderMap, HeaderValue, header};

pub const ALLOW_METHODS: &str = "GET, POST, PUT, DELETE, OPTIONS";
pub const ALLOW_HEADERS: &str = "Content-Type, Authorization, X-N8N-API-KEY";
pub const MAX_AGE_SECS: &str = "86400";

/// Pick the `Access-Control-Allow-Origin` value for a request.
///
/// `allowed` is a comma-separated list. A listed origin is echoed back;
/// otherwise the first entry wins unless it is `*`.
pub fn allow_origin(origin: Option<&str>, allowed: Option<&str>) -> String {
    let origin = origin.unwrap_or("*");
    let Some(allowed) = allowed else {
        return "*".to_string();
    };
    let entries: Vec<&str> = allowed.split(',').map(str::trim).collect();
    if entries.contains(&origin) {
        return origin.to_string();
    }
    match entries.first() {
        Some(first) if *first != "*" && !first.is_empty() => first.to_string(),
        _ => "*".to_string(),
    }
}

pub fn cors_headers(origin: Option<&str>, allowed: Option<&str>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    let value = HeaderValue::from_str(&allow_origin(origin, allowed))
        .unwrap_or_else(|_| HeaderValue::from_static("*"));
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(ALLOW_METHODS),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(ALLOW_HEADERS),
    );
    headers.insert(
        header::ACCESS_CONTROL_MAX_AGE,
        HeaderValue::from_static(MAX_AGE_SECS),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
        HeaderValue::from_static("true"),
    );
    headers
}
