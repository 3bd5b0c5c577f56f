//! Request and response descriptors crossing the interception boundary.

use bytes::Bytes;
use http::{Method, StatusCode};
use url::Url;

/// Hint describing what the caller intends to do with the response body.
///
/// Supplied by UI loading code alongside the URL; classification uses it to
/// recognize image loads that carry no tell-tale file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Destination {
    Document,
    Image,
    Script,
    Style,
    Font,
    #[default]
    Other,
}

/// An outbound request as seen by the proxy.
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub method: Method,
    pub url: Url,
    pub destination: Destination,
}

impl ProxyRequest {
    /// A plain GET request with no destination hint.
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            destination: Destination::Other,
        }
    }

    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destination = destination;
        self
    }

    /// The partition key for this request. Keys are full URLs so entries for
    /// distinct origins never collide.
    pub fn cache_key(&self) -> &str {
        self.url.as_str()
    }
}

/// Provenance of a response handed back to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Network,
    Cache,
    Synthesized,
}

/// A materialized response: status, headers, and the full body.
///
/// Bodies are `Bytes`, so cloning a response for a cache write shares the
/// buffer instead of copying it.
#[derive(Debug, Clone)]
pub struct ProxyResponse {
    pub status: StatusCode,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub source: ResponseSource,
}

impl ProxyResponse {
    pub fn network(status: StatusCode, headers: Vec<(String, String)>, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body,
            source: ResponseSource::Network,
        }
    }

    pub(crate) fn synthesized(status: StatusCode, content_type: &str, body: Bytes) -> Self {
        Self {
            status,
            headers: vec![("content-type".to_string(), content_type.to_string())],
            body,
            source: ResponseSource::Synthesized,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// First `content-type` header value, matched case-insensitively.
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
            .map(|(_, value)| value.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(url: &str) -> Url {
        Url::parse(url).expect("test url should parse")
    }

    #[test]
    fn get_constructor_defaults_to_other_destination() {
        let request = ProxyRequest::get(parse("https://shop.example.com/api/cart"));
        assert_eq!(request.method, Method::GET);
        assert_eq!(request.destination, Destination::Other);
    }

    #[test]
    fn cache_key_is_the_full_url() {
        let request = ProxyRequest::get(parse("https://shop.example.com/products?page=2"));
        assert_eq!(
            request.cache_key(),
            "https://shop.example.com/products?page=2"
        );
    }

    #[test]
    fn content_type_lookup_ignores_header_case() {
        let response = ProxyResponse::network(
            StatusCode::OK,
            vec![("Content-Type".to_string(), "image/webp".to_string())],
            Bytes::from_static(b"blob"),
        );
        assert_eq!(response.content_type(), Some("image/webp"));
    }

    #[test]
    fn synthesized_responses_carry_only_a_content_type() {
        let response =
            ProxyResponse::synthesized(StatusCode::OK, "image/svg+xml", Bytes::from_static(b"<svg/>"));
        assert_eq!(response.source, ResponseSource::Synthesized);
        assert_eq!(response.headers.len(), 1);
        assert_eq!(response.content_type(), Some("image/svg+xml"));
    }
}
