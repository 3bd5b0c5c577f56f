//! Synthesized fallback responses.
//!
//! These are the answers the proxy fabricates when the network fails and the
//! cache has nothing better: a visible-but-unbroken image placeholder and a
//! machine-readable offline body for API calls.

use bytes::Bytes;
use http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::request::ProxyResponse;

pub const PLACEHOLDER_WIDTH: u32 = 400;
pub const PLACEHOLDER_HEIGHT: u32 = 300;
const PLACEHOLDER_LABEL: &str = "Image unavailable";

const OFFLINE_ERROR: &str = "Network unavailable";
const OFFLINE_BODY_FALLBACK: &[u8] = br#"{"error":"Network unavailable"}"#;

/// Body of the offline API fallback. Hosts surface `error` as the offline
/// indicator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfflineApiError {
    pub error: String,
}

impl Default for OfflineApiError {
    fn default() -> Self {
        Self {
            error: OFFLINE_ERROR.to_string(),
        }
    }
}

/// `503` with the JSON offline body, served when an API fetch fails and the
/// dynamic partition has no copy.
pub fn offline_api_response() -> ProxyResponse {
    let body = match serde_json::to_vec(&OfflineApiError::default()) {
        Ok(body) => Bytes::from(body),
        Err(_) => Bytes::from_static(OFFLINE_BODY_FALLBACK),
    };
    ProxyResponse::synthesized(StatusCode::SERVICE_UNAVAILABLE, "application/json", body)
}

/// Inline SVG placeholder served instead of a failed image load. Status 200:
/// the caller renders a labelled box, never a broken image.
pub fn placeholder_image() -> ProxyResponse {
    let svg = format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{PLACEHOLDER_WIDTH}\" \
         height=\"{PLACEHOLDER_HEIGHT}\" viewBox=\"0 0 {PLACEHOLDER_WIDTH} {PLACEHOLDER_HEIGHT}\" \
         role=\"img\" aria-label=\"{PLACEHOLDER_LABEL}\">\
         <rect width=\"100%\" height=\"100%\" fill=\"#e2e5ea\"/>\
         <text x=\"50%\" y=\"50%\" dominant-baseline=\"middle\" text-anchor=\"middle\" \
         font-family=\"sans-serif\" font-size=\"16\" fill=\"#6a7077\">{PLACEHOLDER_LABEL}</text>\
         </svg>"
    );
    ProxyResponse::synthesized(StatusCode::OK, "image/svg+xml", Bytes::from(svg))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::ResponseSource;

    #[test]
    fn offline_body_is_the_documented_shape() {
        let response = offline_api_response();
        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.content_type(), Some("application/json"));
        assert_eq!(response.source, ResponseSource::Synthesized);

        let parsed: OfflineApiError =
            serde_json::from_slice(&response.body).expect("body should be valid json");
        assert_eq!(parsed.error, "Network unavailable");
    }

    #[test]
    fn placeholder_is_a_labelled_svg_with_status_ok() {
        let response = placeholder_image();
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.content_type(), Some("image/svg+xml"));

        let svg = std::str::from_utf8(&response.body).expect("svg should be utf-8");
        assert!(svg.starts_with("<svg"));
        assert!(svg.contains(PLACEHOLDER_LABEL));
        assert!(svg.contains(&format!("width=\"{PLACEHOLDER_WIDTH}\"")));
    }
}
