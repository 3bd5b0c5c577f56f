//! Partition lifecycle: pre-seed and activation garbage collection.

use std::sync::Arc;

use futures::future::try_join_all;
use metrics::counter;
use thiserror::Error;
use tracing::info;
use url::Url;

use super::manifest::{PartitionKind, PartitionManifest};
use super::store::{PartitionStore, StoreError};
use crate::fetch::{FetchError, Fetcher};
use crate::request::ProxyRequest;

pub(crate) const METRIC_SEEDED: &str = "scorta_lifecycle_seeded_total";
pub(crate) const METRIC_GC_REMOVED: &str = "scorta_lifecycle_gc_removed_total";

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("failed to seed `{url}`: {source}")]
    Seed {
        url: Url,
        #[source]
        source: FetchError,
    },
    #[error("seed fetch for `{url}` returned status {status}")]
    SeedStatus { url: Url, status: u16 },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("activation requires a completed pre-seed")]
    NotInstalled,
    #[error("the proxy is already active")]
    AlreadyActive,
}

/// Runs the two lifecycle events: seeding the static partition at install
/// and collecting stale partitions at activation.
pub struct LifecycleManager {
    manifest: PartitionManifest,
    precache: Vec<Url>,
    store: Arc<PartitionStore>,
    fetcher: Arc<dyn Fetcher>,
}

impl LifecycleManager {
    pub fn new(
        manifest: PartitionManifest,
        precache: Vec<Url>,
        store: Arc<PartitionStore>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Self {
        Self {
            manifest,
            precache,
            store,
            fetcher,
        }
    }

    pub fn manifest(&self) -> &PartitionManifest {
        &self.manifest
    }

    /// Fetch the whole static manifest, then write it. Any failed or
    /// non-success fetch aborts before anything has been written, so the
    /// static partition is never left partially seeded.
    pub async fn preseed(&self) -> Result<usize, LifecycleError> {
        let fetches = self.precache.iter().map(|url| async move {
            let request = ProxyRequest::get(url.clone());
            let response =
                self.fetcher
                    .fetch(&request)
                    .await
                    .map_err(|source| LifecycleError::Seed {
                        url: url.clone(),
                        source,
                    })?;
            if !response.is_success() {
                return Err(LifecycleError::SeedStatus {
                    url: url.clone(),
                    status: response.status.as_u16(),
                });
            }
            Ok((request, response))
        });
        let fetched = try_join_all(fetches).await?;

        let partition = self.manifest.name_of(PartitionKind::Static);
        for (request, response) in &fetched {
            self.store
                .put(&partition, request.cache_key(), response)
                .await?;
        }

        counter!(METRIC_SEEDED).increment(fetched.len() as u64);
        info!(
            target = "scorta::lifecycle",
            partition = %partition,
            entries = fetched.len(),
            "Static partition seeded"
        );
        Ok(fetched.len())
    }

    /// Delete every partition whose name is outside the current manifest.
    /// Returns the removed names.
    pub async fn collect_garbage(&self) -> Result<Vec<String>, LifecycleError> {
        let mut removed = Vec::new();
        for name in self.store.partition_names() {
            if self.manifest.contains(&name) {
                continue;
            }
            self.store.remove_partition(&name).await?;
            removed.push(name);
        }

        if !removed.is_empty() {
            counter!(METRIC_GC_REMOVED).increment(removed.len() as u64);
            info!(
                target = "scorta::lifecycle",
                version = self.manifest.version(),
                removed = ?removed,
                "Collected stale partitions"
            );
        }
        Ok(removed)
    }
}
