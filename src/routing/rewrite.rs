//! Upstream URL rewriting.
//!
//! # Responsibilities
//! - Strip the group prefix from the request path
//! - Resolve the remainder against the backend base URL
//! - Carry the original path remainder and query string over unchanged
//!
//! # Design Decisions
//! - The backend URL is treated as a directory: `http://h/v1` + `/users`
//!   resolves to `http://h/v1/users`, never `http://h/users`
//! - `Url` only normalizes the backend base; the request's own path and
//!   query bytes are appended as received, never re-encoded

use axum::http::uri::InvalidUri;
use axum::http::Uri;
use url::Url;

/// Why an upstream URI could not be built.
#[derive(Debug, thiserror::Error)]
pub enum RewriteError {
    #[error("invalid backend URL: {0}")]
    Backend(#[from] url::ParseError),

    #[error("backend URL has no host")]
    NoHost,

    #[error("invalid upstream URI: {0}")]
    Target(#[from] InvalidUri),
}

/// Compute the upstream URI for a request.
///
/// `prefix` must be a prefix of `path` (the router guarantees this).
pub fn upstream_url(
    backend: &str,
    prefix: &str,
    path: &str,
    query: Option<&str>,
) -> Result<Uri, RewriteError> {
    let mut base = Url::parse(backend)?;
    if base.cannot_be_a_base() {
        return Err(url::ParseError::RelativeUrlWithCannotBeABaseBase.into());
    }
    if !base.has_host() {
        return Err(RewriteError::NoHost);
    }
    if !base.path().ends_with('/') {
        let dir = format!("{}/", base.path());
        base.set_path(&dir);
    }
    base.set_query(None);
    base.set_fragment(None);

    let remainder = path.strip_prefix(prefix).unwrap_or(path);
    let relative = remainder.trim_start_matches('/');

    let mut target = format!("{base}{relative}");
    if let Some(query) = query.filter(|q| !q.is_empty()) {
        target.push('?');
        target.push_str(query);
    }
    Ok(Uri::try_from(target)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rewrite(backend: &str, prefix: &str, path: &str, query: Option<&str>) -> String {
        upstream_url(backend, prefix, path, query).unwrap().to_string()
    }

    #[test]
    fn strips_prefix_and_joins() {
        assert_eq!(
            rewrite("http://localhost:9001", "/api", "/api/users", None),
            "http://localhost:9001/users"
        );
    }

    #[test]
    fn slash_mismatches_do_not_corrupt_target() {
        assert_eq!(
            rewrite("http://localhost:9001/", "/api/", "/api/users", None),
            "http://localhost:9001/users"
        );
        assert_eq!(
            rewrite("http://localhost:9001/", "/api", "/api/users", None),
            "http://localhost:9001/users"
        );
        assert_eq!(
            rewrite("http://localhost:9001/v1", "/api", "/api/users/7", None),
            "http://localhost:9001/v1/users/7"
        );
        assert_eq!(
            rewrite("http://localhost:9001/v1/", "/api", "/api//users", None),
            "http://localhost:9001/v1/users"
        );
    }

    #[test]
    fn bare_prefix_hits_backend_root() {
        assert_eq!(
            rewrite("http://localhost:9001", "/api", "/api", None),
            "http://localhost:9001/"
        );
        assert_eq!(
            rewrite("http://localhost:9001/v1", "/api", "/api/", None),
            "http://localhost:9001/v1/"
        );
    }

    #[test]
    fn query_is_carried_verbatim() {
        assert_eq!(
            rewrite("http://localhost:9001?x=1", "/api", "/api/search", Some("q=a%20b&page=2")),
            "http://localhost:9001/search?q=a%20b&page=2"
        );
        assert_eq!(
            rewrite("http://localhost:9001", "/api", "/api/search", Some("")),
            "http://localhost:9001/search"
        );
    }

    #[test]
    fn raw_path_and_query_bytes_are_not_reencoded() {
        assert_eq!(
            rewrite("http://localhost:9001", "/api", "/api/{id}", Some("name='bob'")),
            "http://localhost:9001/{id}?name='bob'"
        );
        assert_eq!(
            rewrite("http://localhost:9001/v1", "/api", "/api/a%2Fb/c%20d", Some("q=%41&x=a+b")),
            "http://localhost:9001/v1/a%2Fb/c%20d?q=%41&x=a+b"
        );
    }

    #[test]
    fn colon_in_remainder_stays_a_path() {
        assert_eq!(
            rewrite("http://localhost:9001", "/api", "/api/a:b", None),
            "http://localhost:9001/a:b"
        );
    }

    #[test]
    fn prefix_without_separator_keeps_tail() {
        assert_eq!(
            rewrite("http://localhost:9001", "/api", "/apiary", None),
            "http://localhost:9001/ary"
        );
    }

    #[test]
    fn malformed_backend_is_an_error() {
        assert!(upstream_url("not a url", "/api", "/api/x", None).is_err());
        assert!(upstream_url("mailto:ops@example.com", "/api", "/api/x", None).is_err());
    }
}
