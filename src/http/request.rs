//! Request handling and transformation.
//!
//! # Responsibilities
//! - Prepare the client request for the upstream (URI, version, headers)
//! - Strip hop-by-hop headers in both directions
//!
//! # Design Decisions
//! - `Host` is dropped; the HTTP client derives it from the upstream URI
//! - Everything else, request ID included, is forwarded untouched
//! - Headers named in `Connection` are hop-by-hop too (RFC 9110 §7.6.1)

use axum::body::Body;
use axum::http::{header, request::Parts, HeaderMap, HeaderName, Request, Uri, Version};

/// Headers that only apply to a single transport hop.
const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    HeaderName::from_static("proxy-connection"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
];

/// Remove hop-by-hop headers, including any listed in `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in listed.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
    headers.remove(header::UPGRADE);
}

/// Build the upstream request: same method and body, rewritten URI,
/// client headers minus `Host` and hop-by-hop headers.
pub fn upstream_request(parts: Parts, body: Body, target: Uri) -> Request<Body> {
    let mut headers = parts.headers;
    strip_hop_by_hop(&mut headers);
    headers.remove(header::HOST);

    let mut request = Request::new(body);
    *request.method_mut() = parts.method;
    *request.uri_mut() = target;
    *request.version_mut() = Version::HTTP_11;
    *request.headers_mut() = headers;
    request
}
