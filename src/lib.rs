//! scorta - Offline-first caching proxy for storefront clients
//!
//! The crate has two caching tiers. The [`proxy`] answers classified GET
//! requests out of versioned persistent partitions, one strategy per request
//! family, and survives restarts. The [`object_cache`] holds decoded objects
//! in memory: transcoded product imagery bounded by count and API data
//! bounded by age. Around them, [`offline`] replays deferred work on
//! reconnect and delivers notifications.
//!
//! A host wires the pieces together from [`config::Settings`]: open a
//! [`partition::PartitionStore`] under the configured cache directory, build
//! a [`CacheProxy`] over it with an [`fetch::HttpFetcher`], install and
//! activate, then route every outgoing request through
//! [`CacheProxy::handle`] and send [`HandleOutcome::Bypass`] requests to the
//! network untouched.

pub mod classify;
pub mod config;
pub mod fetch;
mod lock;
pub mod object_cache;
pub mod offline;
pub mod partition;
pub mod proxy;
pub mod request;
pub mod telemetry;

pub use classify::RequestClass;
pub use config::Settings;
pub use fetch::{FetchError, Fetcher, HttpFetcher};
pub use object_cache::{ObjectCache, SizeClass};
pub use offline::{NotificationCenter, ReplayRegistrar};
pub use partition::{PartitionManifest, PartitionStore};
pub use proxy::{CacheProxy, HandleOutcome};
pub use request::{ProxyRequest, ProxyResponse};
