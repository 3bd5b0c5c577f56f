//! Request classification.
//!
//! A pure function from request descriptor to strategy family. Rules apply in
//! priority order; the first match wins. Anything that is not a plain GET
//! over http(s) is left alone entirely.

use mime_guess::Mime;
use mime_guess::mime;
use url::Url;

use crate::request::{Destination, ProxyRequest};

/// The four request families the proxy knows how to answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClass {
    Image,
    Api,
    StaticAsset,
    Navigation,
}

impl RequestClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestClass::Image => "image",
            RequestClass::Api => "api",
            RequestClass::StaticAsset => "static_asset",
            RequestClass::Navigation => "navigation",
        }
    }
}

/// Classification inputs that do not vary per request.
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// Host of the application origin. Requests to any other host are
    /// API-class unless they are image loads.
    pub app_host: String,
    /// Path prefix for same-origin API calls.
    pub api_prefix: String,
    /// Hosts that serve product imagery without image-looking paths.
    pub image_hosts: Vec<String>,
}

/// Classify an outbound request, or return `None` when the proxy must not
/// touch it (non-GET methods and non-network schemes bypass the cache).
pub fn classify(request: &ProxyRequest, config: &ClassifierConfig) -> Option<RequestClass> {
    if request.method != http::Method::GET {
        return None;
    }
    if !matches!(request.url.scheme(), "http" | "https") {
        return None;
    }

    if request.destination == Destination::Image
        || has_image_extension(&request.url)
        || host_matches_any(&request.url, &config.image_hosts)
    {
        return Some(RequestClass::Image);
    }

    if request.url.path().starts_with(&config.api_prefix)
        || !host_matches(&request.url, &config.app_host)
    {
        return Some(RequestClass::Api);
    }

    if has_static_asset_extension(&request.url) {
        return Some(RequestClass::StaticAsset);
    }

    Some(RequestClass::Navigation)
}

fn guessed_mime(url: &Url) -> Option<Mime> {
    mime_guess::from_path(url.path()).first()
}

fn has_image_extension(url: &Url) -> bool {
    guessed_mime(url).is_some_and(|m| m.type_() == mime::IMAGE)
}

fn has_static_asset_extension(url: &Url) -> bool {
    guessed_mime(url).is_some_and(|m| {
        matches!(
            (m.type_().as_str(), m.subtype().as_str()),
            ("text", "css")
                | ("text", "javascript")
                | ("application", "javascript")
                | ("font", _)
        )
    })
}

fn host_matches(url: &Url, host: &str) -> bool {
    url.host_str()
        .is_some_and(|candidate| candidate.eq_ignore_ascii_case(host))
}

fn host_matches_any(url: &Url, hosts: &[String]) -> bool {
    hosts.iter().any(|host| host_matches(url, host))
}
