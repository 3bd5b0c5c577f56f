//! Tracing and metrics bootstrap for the embedding application.

use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use thiserror::Error;
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

static METRIC_DESCRIPTIONS: Once = Once::new();

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("failed to install tracing subscriber: {0}")]
    Subscriber(String),
}

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), TelemetryError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| TelemetryError::Subscriber(err.to_string()))
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "scorta_partition_hit_total",
            Unit::Count,
            "Total number of partition cache hits."
        );
        describe_counter!(
            "scorta_partition_miss_total",
            Unit::Count,
            "Total number of partition cache misses."
        );
        describe_counter!(
            "scorta_partition_write_total",
            Unit::Count,
            "Total number of entries written into partitions."
        );
        describe_counter!(
            "scorta_partition_evict_total",
            Unit::Count,
            "Total number of partition entries evicted due to capacity."
        );
        describe_counter!(
            "scorta_lifecycle_seeded_total",
            Unit::Count,
            "Total number of responses seeded during installation."
        );
        describe_counter!(
            "scorta_lifecycle_gc_removed_total",
            Unit::Count,
            "Total number of stale partitions removed during activation."
        );
        describe_counter!(
            "scorta_strategy_fallback_total",
            Unit::Count,
            "Total number of degraded responses served, labelled by kind."
        );
        describe_counter!(
            "scorta_strategy_refresh_total",
            Unit::Count,
            "Total number of cached images refreshed in the background."
        );
        describe_counter!(
            "scorta_proxy_handled_total",
            Unit::Count,
            "Total number of requests served by the proxy, labelled by class."
        );
        describe_counter!(
            "scorta_proxy_bypass_total",
            Unit::Count,
            "Total number of requests passed through without proxy involvement."
        );
        describe_histogram!(
            "scorta_proxy_handle_ms",
            Unit::Milliseconds,
            "Proxy request handling latency in milliseconds."
        );
        describe_counter!(
            "scorta_object_image_hit_total",
            Unit::Count,
            "Total number of in-memory image cache hits."
        );
        describe_counter!(
            "scorta_object_image_miss_total",
            Unit::Count,
            "Total number of in-memory image cache misses."
        );
        describe_counter!(
            "scorta_object_image_evict_total",
            Unit::Count,
            "Total number of in-memory images evicted due to capacity."
        );
        describe_counter!(
            "scorta_object_data_expired_total",
            Unit::Count,
            "Total number of data records dropped after their TTL elapsed."
        );
        describe_histogram!(
            "scorta_object_transcode_ms",
            Unit::Milliseconds,
            "Image transcode latency in milliseconds."
        );
    });
}
