//! Key generation utilities for rate limiting.

use axum::http::{HeaderMap, Method};
use std::net::SocketAddr;

use crate::counter::ActionId;

/// Proxy headers carrying the client address, in order of preference.
pub const CLIENT_IP_HEADERS: [&str; 5] = [
    "x-forwarded-for",
    "x-real-ip",
    "proxy-client-ip",
    "wl-proxy-client-ip",
    "http_client_ip",
];

pub const UNKNOWN_CLIENT: &str = "unknown";

/// Resolve the address of the client that sent a request.
///
/// The first proxy header with a non-blank value wins; when it holds a
/// chain, the first element is the client. Falls back to the socket peer.
pub fn remote_address(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = CLIENT_IP_HEADERS.iter().find_map(|name| {
        headers
            .get(*name)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.trim().is_empty())
    });

    if let Some(chain) = forwarded {
        if let Some(first) = chain.split(',').next().map(str::trim) {
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }

    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

/// Action id for a request routed to `route` (the matched route pattern,
/// not the concrete uri, so `/users/1` and `/users/2` share a quota).
pub fn action_for(method: &Method, route: &str) -> ActionId {
    ActionId::from_route(method.as_str(), route)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn peer() -> Option<SocketAddr> {
        Some("198.51.100.7:40000".parse().unwrap())
    }

    #[test]
    fn test_forwarded_chain_uses_first_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("192.168.1.1, 10.0.0.1"));
        headers.insert("x-real-ip", HeaderValue::from_static("203.0.113.1"));

        assert_eq!(remote_address(&headers, peer()), "192.168.1.1");
    }

    #[test]
    fn test_header_precedence() {
        let mut headers = HeaderMap::new();
        headers.insert("wl-proxy-client-ip", HeaderValue::from_static("203.0.113.9"));
        headers.insert("proxy-client-ip", HeaderValue::from_static("203.0.113.5"));

        assert_eq!(remote_address(&headers, peer()), "203.0.113.5");
    }

    #[test]
    fn test_blank_header_is_skipped() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("  "));
        headers.insert("x-real-ip", HeaderValue::from_static("203.0.113.1"));

        assert_eq!(remote_address(&headers, peer()), "203.0.113.1");
    }

    #[test]
    fn test_underscore_header() {
        let mut headers = HeaderMap::new();
        headers.insert("http_client_ip", HeaderValue::from_static("203.0.113.2"));

        assert_eq!(remote_address(&headers, peer()), "203.0.113.2");
    }

    #[test]
    fn test_peer_fallback() {
        let headers = HeaderMap::new();
        assert_eq!(remote_address(&headers, peer()), "198.51.100.7");
        assert_eq!(remote_address(&headers, None), UNKNOWN_CLIENT);
    }

    #[test]
    fn test_empty_first_hop_falls_back_to_peer() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static(", 10.0.0.1"));

        assert_eq!(remote_address(&headers, peer()), "198.51.100.7");
    }

    #[test]
    fn test_action_uses_route_pattern() {
        let action = action_for(&Method::GET, "/users/:id");
        assert_eq!(action.as_str(), "GET /users/:id");
        assert_eq!(action.path(), "/users/:id");
    }
}
