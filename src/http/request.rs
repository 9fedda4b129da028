//! Request inspection helpers.
//!
//! # Responsibilities
//! - Read the correlation id (`x-request-id`) from inbound headers
//! - Resolve the client address behind proxies
//! - Build the layers that generate and echo request ids
//!
//! # Design Decisions
//! - An empty `x-request-id` counts as absent
//! - Forwarding headers win over the socket peer address

use std::net::SocketAddr;

use axum::extract::ConnectInfo;
use axum::http::{header, HeaderMap, HeaderName, Request};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");
const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
const X_REAL_IP: HeaderName = HeaderName::from_static("x-real-ip");

/// Non-empty `x-request-id` header value.
pub fn request_id(headers: &HeaderMap) -> Option<String> {
    header_str(headers, &X_REQUEST_ID)
        .filter(|id| !id.is_empty())
        .map(str::to_owned)
}

/// Client address: first `X-Forwarded-For` hop, then `X-Real-IP`, then the
/// connection peer when the server was built with connect info.
pub fn real_ip<B>(request: &Request<B>) -> Option<String> {
    let headers = request.headers();

    if let Some(forwarded) = header_str(headers, &X_FORWARDED_FOR) {
        if let Some(first) = forwarded.split(',').map(str::trim).find(|hop| !hop.is_empty()) {
            return Some(first.to_owned());
        }
    }

    if let Some(real) = header_str(headers, &X_REAL_IP).map(str::trim) {
        if !real.is_empty() {
            return Some(real.to_owned());
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
}

/// Declared request body size; zero when absent or malformed.
pub fn content_length(headers: &HeaderMap) -> u64 {
    header_str(headers, &header::CONTENT_LENGTH)
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(0)
}

/// Header value as text, if it is valid visible ASCII.
pub fn header_str<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// Layers that assign a UUID `x-request-id` to requests without one and
/// copy it onto the response.
pub fn request_id_layers() -> (SetRequestIdLayer<MakeRequestUuid>, PropagateRequestIdLayer) {
    (
        SetRequestIdLayer::x_request_id(MakeRequestUuid),
        PropagateRequestIdLayer::x_request_id(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn test_request_id_ignores_empty_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(request_id(&headers), None);

        headers.insert(X_REQUEST_ID, "".parse().unwrap());
        assert_eq!(request_id(&headers), None);

        headers.insert(X_REQUEST_ID, "abc-123".parse().unwrap());
        assert_eq!(request_id(&headers).as_deref(), Some("abc-123"));
    }

    #[test]
    fn test_real_ip_prefers_forwarded_for() {
        let req = Request::builder()
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .header("x-real-ip", "10.0.0.2")
            .body(Body::empty())
            .unwrap();
        assert_eq!(real_ip(&req).as_deref(), Some("203.0.113.7"));

        let req = Request::builder()
            .header("x-real-ip", " 10.0.0.2 ")
            .body(Body::empty())
            .unwrap();
        assert_eq!(real_ip(&req).as_deref(), Some("10.0.0.2"));
    }

    #[test]
    fn test_real_ip_falls_back_to_peer() {
        let mut req = Request::builder().body(Body::empty()).unwrap();
        assert_eq!(real_ip(&req), None);

        let peer: SocketAddr = "192.0.2.10:55000".parse().unwrap();
        req.extensions_mut().insert(ConnectInfo(peer));
        assert_eq!(real_ip(&req).as_deref(), Some("192.0.2.10"));
    }

    #[test]
    fn test_content_length() {
        let mut headers = HeaderMap::new();
        assert_eq!(content_length(&headers), 0);
        headers.insert(header::CONTENT_LENGTH, "42".parse().unwrap());
        assert_eq!(content_length(&headers), 42);
        headers.insert(header::CONTENT_LENGTH, "lots".parse().unwrap());
        assert_eq!(content_length(&headers), 0);
    }
}
