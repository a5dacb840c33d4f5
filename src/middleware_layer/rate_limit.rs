use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use http::HeaderName;
use std::net::SocketAddr;

use crate::{error::AppError, state::AppState};

/// Resolves the identity a request is rate limited under.
///
/// When a trusted proxy header is configured its value wins; otherwise the
/// peer address from the connection is used. Requests with neither collapse
/// into one shared "unknown" bucket.
///
/// # Arguments
///
/// * `req` - The incoming request.
/// * `trusted_header` - The configured client-address header, if any.
///
/// # Returns
///
/// The identity string for the rate-limit counter.
fn client_identity(req: &Request<Body>, trusted_header: Option<&HeaderName>) -> String {
    if let Some(name) = trusted_header {
        if let Some(value) = req.headers().get(name).and_then(|v| v.to_str().ok()) {
            let value = value.trim();
            if !value.is_empty() {
                return value.to_string();
            }
        }
    }
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// A middleware that rate limits feed and setup requests per client.
///
/// The check runs before any token handling so over-limit clients never
/// reach the decoder or the portal. When the limiter store is unreachable
/// the request is allowed through.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `req` - The incoming request.
/// * `next` - The next middleware in the chain.
///
/// # Returns
///
/// A `Response`, either the 429 rejection or the inner handler's.
pub async fn rate_limit(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let identity = client_identity(&req, state.config.ip_header.as_ref());

    if !state.rate_limiter.allow(&identity).await {
        tracing::warn!("🚫 Rate limit hit for {}", identity);
        return AppError::RateLimited.into_response();
    }

    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> Request<Body> {
        Request::builder().uri("/sub").body(Body::empty()).unwrap()
    }

    #[test]
    fn identity_prefers_the_trusted_header() {
        let mut req = request();
        req.headers_mut()
            .insert("x-real-ip", "203.0.113.9".parse().unwrap());
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 9000))));

        let header = HeaderName::from_static("x-real-ip");
        assert_eq!(client_identity(&req, Some(&header)), "203.0.113.9");
    }

    #[test]
    fn identity_falls_back_to_the_peer_address() {
        let mut req = request();
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([203, 0, 113, 7], 40000))));

        let header = HeaderName::from_static("x-real-ip");
        assert_eq!(client_identity(&req, Some(&header)), "203.0.113.7");
        assert_eq!(client_identity(&req, None), "203.0.113.7");
    }

    #[test]
    fn identity_without_any_source_is_unknown() {
        assert_eq!(client_identity(&request(), None), "unknown");
    }

    #[test]
    fn blank_header_value_does_not_count() {
        let mut req = request();
        req.headers_mut().insert("x-real-ip", "  ".parse().unwrap());

        let header = HeaderName::from_static("x-real-ip");
        assert_eq!(client_identity(&req, Some(&header)), "unknown");
    }
}
