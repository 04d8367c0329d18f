//! Request handling and transformation.
//!
//! # Responsibilities
//! - Generate a unique request ID (UUID v4) when the client sent none
//! - Rebuild a buffered inbound request for one backend attempt
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - Method, path, query, headers, version and body are forwarded unchanged;
//!   only the URI's scheme and authority are pointed at the backend

use axum::body::{Body, Bytes};
use axum::http::{request::Parts, HeaderName, HeaderValue, Request, Uri};
use tower_http::request_id::{MakeRequestId, RequestId};
use url::Url;

/// Header carrying the request ID.
pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Generates UUID v4 request IDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeRequestUuid;

impl MakeRequestId for MakeRequestUuid {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        let id = uuid::Uuid::new_v4().to_string();
        HeaderValue::from_str(&id).ok().map(RequestId::new)
    }
}

/// Request ID of an inbound request, or "unknown".
pub fn request_id<B>(request: &Request<B>) -> String {
    request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string()
}

/// Point `original` at `backend`, keeping path and query.
pub fn upstream_uri(original: &Uri, backend: &Url) -> Result<Uri, axum::http::Error> {
    let path_and_query = original
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let base = backend.as_str().trim_end_matches('/');
    Ok(format!("{}{}", base, path_and_query).parse::<Uri>()?)
}

/// Build the request for one attempt from the buffered inbound request.
pub fn build_upstream_request(
    parts: &Parts,
    body: &Bytes,
    backend: &Url,
) -> Result<Request<Body>, axum::http::Error> {
    let mut builder = Request::builder()
        .method(parts.method.clone())
        .version(parts.version)
        .uri(upstream_uri(&parts.uri, backend)?);

    if let Some(headers) = builder.headers_mut() {
        for (name, value) in parts.headers.iter() {
            headers.append(name.clone(), value.clone());
        }
    }

    builder.body(Body::from(body.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{Method, Version};

    #[test]
    fn test_upstream_uri_keeps_path_and_query() {
        let backend = Url::parse("http://127.0.0.1:8081").unwrap();
        let uri: Uri = "/proxy/items?page=2&q=a%20b".parse().unwrap();
        assert_eq!(
            upstream_uri(&uri, &backend).unwrap().to_string(),
            "http://127.0.0.1:8081/proxy/items?page=2&q=a%20b"
        );

        let root: Uri = "/".parse().unwrap();
        assert_eq!(upstream_uri(&root, &backend).unwrap().to_string(), "http://127.0.0.1:8081/");
    }

    #[test]
    fn test_build_upstream_request_copies_everything() {
        let inbound = Request::builder()
            .method(Method::PATCH)
            .uri("/things/1?x=y")
            .header("x-custom", "one")
            .header("x-custom", "two")
            .header("content-type", "application/json")
            .body(())
            .unwrap();
        let (parts, ()) = inbound.into_parts();
        let body = Bytes::from_static(b"{\"a\":1}");
        let backend = Url::parse("http://10.0.0.5:9000/").unwrap();

        let request = build_upstream_request(&parts, &body, &backend).unwrap();
        assert_eq!(request.method(), Method::PATCH);
        assert_eq!(request.version(), Version::HTTP_11);
        assert_eq!(request.uri().to_string(), "http://10.0.0.5:9000/things/1?x=y");
        let custom: Vec<_> = request.headers().get_all("x-custom").iter().collect();
        assert_eq!(custom, vec!["one", "two"]);
        assert_eq!(request.headers()["content-type"], "application/json");
    }

    #[test]
    fn test_request_ids_are_unique() {
        let req = Request::new(());
        let mut maker = MakeRequestUuid;
        let a = maker.make_request_id(&req).unwrap();
        let b = maker.make_request_id(&req).unwrap();
        assert_ne!(a.header_value(), b.header_value());
    }
}
