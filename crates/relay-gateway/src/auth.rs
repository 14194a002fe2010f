//! Bearer token check for invocation endpoints

use axum::http::HeaderMap;
use tracing::warn;

/// Check the request's `Authorization` header against the configured token.
///
/// An empty configured token disables auth.
pub fn authorize(configured_token: &str, headers: &HeaderMap) -> bool {
    if configured_token.is_empty() {
        return true;
    }
    let provided = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token);

    match provided {
        Some(token) => constant_time_eq(configured_token.as_bytes(), token.as_bytes()),
        None => {
            warn!("Gateway auth: missing or malformed bearer token");
            false
        }
    }
}

/// Extract the token from `Bearer <token>`
pub fn bearer_token(header_value: &str) -> Option<&str> {
    header_value
        .trim()
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |diff, (x, y)| diff | (x ^ y)) == 0
}
