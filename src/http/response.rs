//! Response handling and transformation.
//!
//! # Responsibilities
//! - Relay upstream responses (status, headers, streaming body)
//! - Map routing and forwarding errors to structured HTTP responses
//!
//! # Design Decisions
//! - Streaming responses avoid buffering entire body
//! - Hop-by-hop headers stripped automatically
//! - Every proxy-generated error is JSON with an `x-proxy-error` code header

use axum::body::{Body, Bytes, HttpBody};
use axum::http::{header, HeaderValue, Response, StatusCode};
use axum::response::IntoResponse;
use serde::Serialize;

use crate::http::forward::ForwardError;
use crate::http::request::strip_hop_by_hop;
use crate::routing::RouteError;

/// Header carrying the machine-readable error code.
pub const X_PROXY_ERROR: &str = "x-proxy-error";

/// Error codes for proxy-generated responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    NoSuchPort,
    NoGroupMatch,
    NoActiveBackend,
    UpstreamUnreachable,
    UpstreamTimeout,
}

impl ErrorCode {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::NoSuchPort | ErrorCode::NoGroupMatch => StatusCode::NOT_FOUND,
            ErrorCode::NoActiveBackend | ErrorCode::UpstreamUnreachable => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ErrorCode::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::NoSuchPort => "NO_SUCH_PORT",
            ErrorCode::NoGroupMatch => "NO_GROUP_MATCH",
            ErrorCode::NoActiveBackend => "NO_ACTIVE_BACKEND",
            ErrorCode::UpstreamUnreachable => "UPSTREAM_UNREACHABLE",
            ErrorCode::UpstreamTimeout => "UPSTREAM_TIMEOUT",
        }
    }
}

/// JSON error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
    pub status: u16,
}

/// Build a structured error response.
pub fn error_response(code: ErrorCode, message: impl Into<String>) -> Response<Body> {
    let status = code.status_code();
    let body = ErrorBody {
        code,
        message: message.into(),
        status: status.as_u16(),
    };
    let json = serde_json::to_vec(&body).unwrap_or_default();

    let mut response = Response::new(Body::from(json));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    response
        .headers_mut()
        .insert(X_PROXY_ERROR, HeaderValue::from_static(code.as_str()));
    response
}

impl From<&RouteError> for ErrorCode {
    fn from(err: &RouteError) -> Self {
        match err {
            RouteError::NoSuchPort(_) => ErrorCode::NoSuchPort,
            RouteError::NoGroupMatch { .. } => ErrorCode::NoGroupMatch,
            RouteError::NoActiveBackend { .. } => ErrorCode::NoActiveBackend,
            RouteError::InvalidBackendUrl { .. } => ErrorCode::UpstreamUnreachable,
        }
    }
}

impl From<&ForwardError> for ErrorCode {
    fn from(err: &ForwardError) -> Self {
        match err {
            ForwardError::UpstreamUnreachable { .. } => ErrorCode::UpstreamUnreachable,
            ForwardError::UpstreamTimeout { .. } => ErrorCode::UpstreamTimeout,
        }
    }
}

impl IntoResponse for RouteError {
    fn into_response(self) -> axum::response::Response {
        let code = ErrorCode::from(&self);
        let message = match &self {
            RouteError::NoActiveBackend { group, .. } => {
                format!("No active backend selected for group {group}")
            }
            RouteError::InvalidBackendUrl { .. } => format!("Upstream unavailable: {self}"),
            _ => self.to_string(),
        };
        error_response(code, message)
    }
}

impl IntoResponse for ForwardError {
    fn into_response(self) -> axum::response::Response {
        error_response(ErrorCode::from(&self), format!("Upstream unavailable: {self}"))
    }
}

/// Turn an upstream response into the client response.
///
/// Status and end-to-end headers pass through; the body is relayed as a
/// stream.
pub fn relay<B>(upstream: Response<B>) -> Response<Body>
where
    B: HttpBody<Data = Bytes> + Send + 'static,
    B::Error: Into<axum::BoxError>,
{
    let (mut parts, body) = upstream.into_parts();
    strip_hop_by_hop(&mut parts.headers);
    Response::from_parts(parts, Body::new(body))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response<Body>) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn no_active_backend_is_503_json() {
        let response = RouteError::NoActiveBackend {
            port: 8080,
            group: "/api".into(),
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers()[X_PROXY_ERROR], "NO_ACTIVE_BACKEND");
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");

        let json = body_json(response).await;
        assert_eq!(json["code"], "NO_ACTIVE_BACKEND");
        assert_eq!(json["status"], 503);
        assert!(json["message"].as_str().unwrap().contains("/api"));
    }

    #[test]
    fn status_mapping() {
        assert_eq!(ErrorCode::NoGroupMatch.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ErrorCode::NoSuchPort.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            ErrorCode::UpstreamUnreachable.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(ErrorCode::UpstreamTimeout.status_code(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn invalid_backend_url_maps_to_unreachable() {
        let err = RouteError::InvalidBackendUrl {
            url: "nope".into(),
            reason: "relative URL without a base".into(),
        };
        assert_eq!(ErrorCode::from(&err), ErrorCode::UpstreamUnreachable);
    }

    #[tokio::test]
    async fn relay_keeps_status_and_end_to_end_headers() {
        let upstream = Response::builder()
            .status(StatusCode::CREATED)
            .header("x-upstream", "yes")
            .header("connection", "close")
            .body(Body::from("made"))
            .unwrap();

        let response = relay(upstream);
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()["x-upstream"], "yes");
        assert!(response.headers().get("connection").is_none());
        let bytes = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&bytes[..], b"made");
    }
}
