//! The four caching strategies.
//!
//! Each handler is total over its inputs: network failure is converted into
//! a fallback at this boundary wherever one exists. Only two paths propagate
//! an error to the caller, a static-asset miss and a navigation with no
//! cached shell, because there is nothing meaningful to synthesize for them.

use std::sync::Arc;

use metrics::counter;
use tracing::{debug, warn};

use super::fallback;
use crate::classify::RequestClass;
use crate::fetch::{FetchError, Fetcher};
use crate::partition::{EvictionSweeper, PartitionStore};
use crate::request::{ProxyRequest, ProxyResponse};

pub(crate) const METRIC_FALLBACK: &str = "scorta_strategy_fallback_total";
pub(crate) const METRIC_REFRESH: &str = "scorta_strategy_refresh_total";

/// Partition names and the shell key, resolved once from the manifest.
#[derive(Debug, Clone)]
pub(crate) struct StrategyTargets {
    pub(crate) static_partition: String,
    pub(crate) dynamic_partition: String,
    pub(crate) image_partition: String,
    pub(crate) shell_key: String,
}

pub(crate) struct StrategyRunner {
    store: Arc<PartitionStore>,
    fetcher: Arc<dyn Fetcher>,
    sweeper: Arc<EvictionSweeper>,
    targets: StrategyTargets,
}

impl StrategyRunner {
    pub(crate) fn new(
        store: Arc<PartitionStore>,
        fetcher: Arc<dyn Fetcher>,
        sweeper: Arc<EvictionSweeper>,
        targets: StrategyTargets,
    ) -> Self {
        Self {
            store,
            fetcher,
            sweeper,
            targets,
        }
    }

    pub(crate) async fn dispatch(
        &self,
        class: RequestClass,
        request: &ProxyRequest,
    ) -> Result<ProxyResponse, FetchError> {
        match class {
            RequestClass::Image => Ok(self.image(request).await),
            RequestClass::Api => Ok(self.api(request).await),
            RequestClass::StaticAsset => self.static_asset(request).await,
            RequestClass::Navigation => self.navigation(request).await,
        }
    }

    /// Cache-first with background refresh. A hit answers immediately and
    /// refreshes behind the caller's back; a miss fetches, stores successful
    /// responses, and otherwise serves the placeholder.
    async fn image(&self, request: &ProxyRequest) -> ProxyResponse {
        let key = request.cache_key();
        let cached = match self.store.get(&self.targets.image_partition, key).await {
            Ok(hit) => hit,
            Err(error) => {
                warn!(error = %error, key, "Image cache read failed; treating as a miss");
                None
            }
        };
        if let Some(cached) = cached {
            self.spawn_refresh(request.clone());
            return cached;
        }

        match self.fetcher.fetch(request).await {
            Ok(response) if response.is_success() => {
                self.store_image(key, &response).await;
                response
            }
            Ok(response) => {
                debug!(
                    key,
                    status = response.status.as_u16(),
                    "Image fetch returned non-success; serving the placeholder"
                );
                counter!(METRIC_FALLBACK, "kind" => "placeholder").increment(1);
                fallback::placeholder_image()
            }
            Err(error) => {
                debug!(error = %error, key, "Image fetch failed; serving the placeholder");
                counter!(METRIC_FALLBACK, "kind" => "placeholder").increment(1);
                fallback::placeholder_image()
            }
        }
    }

    /// Network-first with fallback. Successful responses are written through
    /// to the dynamic partition; on failure the cached copy answers, and
    /// with no copy the synthesized offline body does.
    async fn api(&self, request: &ProxyRequest) -> ProxyResponse {
        let key = request.cache_key();
        match self.fetcher.fetch(request).await {
            Ok(response) => {
                if response.is_success()
                    && let Err(error) = self
                        .store
                        .put(&self.targets.dynamic_partition, key, &response)
                        .await
                {
                    warn!(error = %error, key, "Failed to store api response copy");
                }
                response
            }
            Err(error) => {
                debug!(error = %error, key, "Api fetch failed; consulting the dynamic partition");
                let cached = match self.store.get(&self.targets.dynamic_partition, key).await {
                    Ok(hit) => hit,
                    Err(read_error) => {
                        warn!(error = %read_error, key, "Dynamic cache read failed");
                        None
                    }
                };
                match cached {
                    Some(cached) => {
                        counter!(METRIC_FALLBACK, "kind" => "dynamic_copy").increment(1);
                        cached
                    }
                    None => {
                        counter!(METRIC_FALLBACK, "kind" => "offline_api").increment(1);
                        fallback::offline_api_response()
                    }
                }
            }
        }
    }

    /// Cache-first. Misses fetch and store successful responses; transport
    /// failure on a miss propagates.
    async fn static_asset(&self, request: &ProxyRequest) -> Result<ProxyResponse, FetchError> {
        let key = request.cache_key();
        let cached = match self.store.get(&self.targets.static_partition, key).await {
            Ok(hit) => hit,
            Err(error) => {
                warn!(error = %error, key, "Static cache read failed; treating as a miss");
                None
            }
        };
        if let Some(cached) = cached {
            return Ok(cached);
        }

        let response = self.fetcher.fetch(request).await?;
        if response.is_success()
            && let Err(error) = self
                .store
                .put(&self.targets.static_partition, key, &response)
                .await
        {
            warn!(error = %error, key, "Failed to store static asset");
        }
        Ok(response)
    }

    /// Network-first with app-shell fallback. Live responses pass through
    /// unmodified and are never cached here; the shell was written at
    /// pre-seed time.
    async fn navigation(&self, request: &ProxyRequest) -> Result<ProxyResponse, FetchError> {
        match self.fetcher.fetch(request).await {
            Ok(response) => Ok(response),
            Err(error) => {
                debug!(
                    error = %error,
                    url = %request.url,
                    "Navigation fetch failed; falling back to the cached shell"
                );
                let shell = match self
                    .store
                    .get(&self.targets.static_partition, &self.targets.shell_key)
                    .await
                {
                    Ok(hit) => hit,
                    Err(read_error) => {
                        warn!(error = %read_error, "Shell cache read failed");
                        None
                    }
                };
                match shell {
                    Some(shell) => {
                        counter!(METRIC_FALLBACK, "kind" => "shell").increment(1);
                        Ok(shell)
                    }
                    None => Err(error),
                }
            }
        }
    }

    async fn store_image(&self, key: &str, response: &ProxyResponse) {
        if let Err(error) = self
            .store
            .put(&self.targets.image_partition, key, response)
            .await
        {
            warn!(error = %error, key, "Failed to store image entry");
            return;
        }
        if let Err(error) = self.sweeper.run(&self.store).await {
            warn!(error = %error, "Image eviction sweep failed");
        }
    }

    /// Refresh a cache hit without blocking the caller. The task is detached;
    /// it is bounded by the fetcher's timeout and failures only log.
    fn spawn_refresh(&self, request: ProxyRequest) {
        let store = Arc::clone(&self.store);
        let fetcher = Arc::clone(&self.fetcher);
        let sweeper = Arc::clone(&self.sweeper);
        let partition = self.targets.image_partition.clone();
        tokio::spawn(async move {
            let key = request.cache_key();
            match fetcher.fetch(&request).await {
                Ok(response) if response.is_success() => {
                    if let Err(error) = store.put(&partition, key, &response).await {
                        warn!(error = %error, key, "Background image refresh failed to store");
                        return;
                    }
                    counter!(METRIC_REFRESH).increment(1);
                    debug!(key, "Image entry refreshed in the background");
                    if let Err(error) = sweeper.run(&store).await {
                        warn!(error = %error, "Image eviction sweep failed after refresh");
                    }
                }
                Ok(response) => {
                    debug!(
                        key,
                        status = response.status.as_u16(),
                        "Background refresh kept the cached entry over a non-success response"
                    );
                }
                Err(error) => {
                    debug!(error = %error, key, "Background image refresh failed");
                }
            }
        });
    }
}
