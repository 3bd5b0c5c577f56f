//! The proxy facade: lifecycle phases, classification, dispatch.
//!
//! A [`CacheProxy`] starts idle, where every request bypasses to the network.
//! [`CacheProxy::install`] seeds the static partition, [`CacheProxy::activate`]
//! garbage-collects partitions from other versions, and only then does
//! [`CacheProxy::handle`] answer requests, dispatching each classified request
//! to its strategy.

pub mod fallback;
mod strategies;

use std::sync::{
    Arc,
    atomic::{AtomicU8, Ordering},
};
use std::time::Instant;

use metrics::{counter, histogram};
use tracing::debug;

use crate::classify::{ClassifierConfig, classify};
use crate::config::ProxySettings;
use crate::fetch::{FetchError, Fetcher};
use crate::partition::{
    EvictionSweeper, LifecycleError, LifecycleManager, PartitionKind, PartitionManifest,
    PartitionStore,
};
use crate::request::{ProxyRequest, ProxyResponse};

use strategies::{StrategyRunner, StrategyTargets};

pub(crate) const METRIC_HANDLED: &str = "scorta_proxy_handled_total";
pub(crate) const METRIC_BYPASS: &str = "scorta_proxy_bypass_total";
pub(crate) const METRIC_HANDLE_MS: &str = "scorta_proxy_handle_ms";

const PHASE_IDLE: u8 = 0;
const PHASE_INSTALLED: u8 = 1;
const PHASE_ACTIVE: u8 = 2;

/// What the proxy decided to do with one request.
#[derive(Debug)]
pub enum HandleOutcome {
    /// The request is not ours to answer; the caller goes to the network.
    Bypass,
    /// The proxy produced a response.
    Served(ProxyResponse),
}

/// The proxy core. One instance per deployment version.
pub struct CacheProxy {
    classifier: ClassifierConfig,
    lifecycle: LifecycleManager,
    runner: StrategyRunner,
    phase: AtomicU8,
}

impl CacheProxy {
    pub fn new(
        settings: &ProxySettings,
        store: Arc<PartitionStore>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Self {
        let classifier = ClassifierConfig {
            app_host: settings.origin.host_str().unwrap_or_default().to_string(),
            api_prefix: settings.api_prefix.clone(),
            image_hosts: settings.image_hosts.clone(),
        };
        let manifest = PartitionManifest::new(settings.cache_version.clone());
        let targets = StrategyTargets {
            static_partition: manifest.name_of(PartitionKind::Static),
            dynamic_partition: manifest.name_of(PartitionKind::Dynamic),
            image_partition: manifest.name_of(PartitionKind::Image),
            shell_key: settings.shell_url.as_str().to_string(),
        };
        let sweeper = Arc::new(EvictionSweeper::new(
            manifest.name_of(PartitionKind::Image),
            settings.image_partition_limit.get(),
        ));
        let lifecycle = LifecycleManager::new(
            manifest,
            settings.precache.clone(),
            Arc::clone(&store),
            Arc::clone(&fetcher),
        );
        let runner = StrategyRunner::new(store, fetcher, sweeper, targets);

        Self {
            classifier,
            lifecycle,
            runner,
            phase: AtomicU8::new(PHASE_IDLE),
        }
    }

    pub fn manifest(&self) -> &PartitionManifest {
        self.lifecycle.manifest()
    }

    pub fn is_active(&self) -> bool {
        self.phase.load(Ordering::SeqCst) == PHASE_ACTIVE
    }

    /// Seed the static partition. Fails closed: on error nothing was written
    /// and the proxy stays idle, so install can be retried. Returns the number
    /// of seeded entries. Rejected once the proxy is active.
    pub async fn install(&self) -> Result<usize, LifecycleError> {
        if self.phase.load(Ordering::SeqCst) == PHASE_ACTIVE {
            return Err(LifecycleError::AlreadyActive);
        }
        let seeded = self.lifecycle.preseed().await?;
        self.phase.store(PHASE_INSTALLED, Ordering::SeqCst);
        Ok(seeded)
    }

    /// Collect partitions from other versions and start answering requests.
    /// Returns the removed partition names. Activating an already-active
    /// proxy is a no-op.
    pub async fn activate(&self) -> Result<Vec<String>, LifecycleError> {
        match self.phase.load(Ordering::SeqCst) {
            PHASE_IDLE => Err(LifecycleError::NotInstalled),
            PHASE_ACTIVE => Ok(Vec::new()),
            _ => {
                let removed = self.lifecycle.collect_garbage().await?;
                self.phase.store(PHASE_ACTIVE, Ordering::SeqCst);
                Ok(removed)
            }
        }
    }

    /// Answer one request, or decline it. Everything bypasses until the proxy
    /// is active; after that, requests the classifier declines still bypass.
    pub async fn handle(&self, request: &ProxyRequest) -> Result<HandleOutcome, FetchError> {
        if !self.is_active() {
            counter!(METRIC_BYPASS).increment(1);
            return Ok(HandleOutcome::Bypass);
        }
        let Some(class) = classify(request, &self.classifier) else {
            counter!(METRIC_BYPASS).increment(1);
            debug!(url = %request.url, "Request left to the network");
            return Ok(HandleOutcome::Bypass);
        };

        let started = Instant::now();
        let response = self.runner.dispatch(class, request).await?;
        histogram!(METRIC_HANDLE_MS).record(started.elapsed().as_secs_f64() * 1000.0);
        counter!(METRIC_HANDLED, "class" => class.as_str()).increment(1);
        Ok(HandleOutcome::Served(response))
    }
}
