//! The network boundary.
//!
//! Strategies and the lifecycle seeder talk to the network through the
//! [`Fetcher`] trait so tests can substitute scripted responses. The shipped
//! implementation wraps one shared reqwest client with a request timeout;
//! a timeout is reported as its own variant but handled identically to any
//! other transport failure.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::request::{ProxyRequest, ProxyResponse};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to construct http client: {0}")]
    ClientBuild(#[source] reqwest::Error),
    #[error("network fetch timed out for `{url}`")]
    Timeout { url: String },
    #[error("network fetch failed for `{url}`: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to read response body for `{url}`: {source}")]
    Body {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

impl FetchError {
    fn from_send(url: &url::Url, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
            }
        } else {
            FetchError::Transport {
                url: url.to_string(),
                source,
            }
        }
    }
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &ProxyRequest) -> Result<ProxyResponse, FetchError>;
}

/// Production fetcher over a shared reqwest client.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(FetchError::ClientBuild)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &ProxyRequest) -> Result<ProxyResponse, FetchError> {
        let response = self
            .client
            .request(request.method.clone(), request.url.clone())
            .send()
            .await
            .map_err(|source| FetchError::from_send(&request.url, source))?;

        let status = response.status();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|text| (name.as_str().to_string(), text.to_string()))
            })
            .collect();
        let body = response.bytes().await.map_err(|source| FetchError::Body {
            url: request.url.to_string(),
            source,
        })?;

        Ok(ProxyResponse::network(status, headers, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_builds_with_a_timeout() {
        assert!(HttpFetcher::new(Duration::from_secs(5)).is_ok());
    }
}
