//! In-process object cache, the second caching tier next to the partitions.
//!
//! One container keyed by source identifier holds two kinds of records:
//! transcoded image blobs, bounded by count with oldest-first eviction, and
//! small structured values, bounded by a time-to-live. Nothing here survives
//! a restart; UI code consults this cache directly rather than going through
//! request interception.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use bytes::Bytes;
use dashmap::DashMap;
use http::StatusCode;
use metrics::{counter, histogram};
use thiserror::Error;
use time::OffsetDateTime;
use tokio::{sync::OnceCell, task::JoinHandle};
use tracing::{debug, warn};
use url::Url;

use crate::{
    config::ObjectCacheSettings,
    fetch::{FetchError, Fetcher},
    lock::mutex_lock,
    request::{Destination, ProxyRequest},
};

mod transcode;

const SOURCE: &str = "object_cache";

pub(crate) const METRIC_IMAGE_HIT: &str = "scorta_object_image_hit_total";
pub(crate) const METRIC_IMAGE_MISS: &str = "scorta_object_image_miss_total";
pub(crate) const METRIC_IMAGE_EVICT: &str = "scorta_object_image_evict_total";
pub(crate) const METRIC_DATA_EXPIRED: &str = "scorta_object_data_expired_total";
pub(crate) const METRIC_TRANSCODE_MS: &str = "scorta_object_transcode_ms";

const DEFAULT_MAX_IMAGES: usize = 100;
const DEFAULT_DATA_TTL: Duration = Duration::from_secs(30 * 60);
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);
const DEFAULT_THUMBNAIL_MAX_PX: u32 = 200;
const DEFAULT_DETAIL_MAX_PX: u32 = 800;
const DEFAULT_JPEG_QUALITY: u8 = 80;

/// Tuning knobs for the object cache.
#[derive(Debug, Clone)]
pub struct ObjectCacheConfig {
    /// Maximum number of image records held at once.
    pub max_images: usize,
    /// Lifetime applied to data records written without an explicit TTL.
    pub data_ttl: Duration,
    /// Cadence of the proactive expiry sweep.
    pub sweep_interval: Duration,
    pub thumbnail_max_px: u32,
    pub detail_max_px: u32,
    pub jpeg_quality: u8,
}

impl Default for ObjectCacheConfig {
    fn default() -> Self {
        Self {
            max_images: DEFAULT_MAX_IMAGES,
            data_ttl: DEFAULT_DATA_TTL,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            thumbnail_max_px: DEFAULT_THUMBNAIL_MAX_PX,
            detail_max_px: DEFAULT_DETAIL_MAX_PX,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

impl From<&ObjectCacheSettings> for ObjectCacheConfig {
    fn from(settings: &ObjectCacheSettings) -> Self {
        Self {
            max_images: settings.max_images.get(),
            data_ttl: settings.data_ttl,
            sweep_interval: settings.sweep_interval,
            thumbnail_max_px: settings.thumbnail_max_px.get(),
            detail_max_px: settings.detail_max_px.get(),
            jpeg_quality: settings.jpeg_quality,
        }
    }
}

/// Rendering context an image is transcoded for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeClass {
    Thumbnail,
    Detail,
}

impl SizeClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            SizeClass::Thumbnail => "thumbnail",
            SizeClass::Detail => "detail",
        }
    }

    fn bounds(&self, config: &ObjectCacheConfig) -> (u32, u32) {
        match self {
            SizeClass::Thumbnail => (config.thumbnail_max_px, config.thumbnail_max_px),
            SizeClass::Detail => (config.detail_max_px, config.detail_max_px),
        }
    }
}

/// A cached image blob, normally the transcoded form of the source.
///
/// `transcoded` is false when decode or encode failed and the original
/// bytes were kept instead.
#[derive(Debug, Clone)]
pub struct ImageRecord {
    pub blob: Bytes,
    pub size_class: SizeClass,
    pub transcoded: bool,
}

#[derive(Debug, Clone)]
struct DataRecord {
    value: serde_json::Value,
    expires_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
enum ObjectRecord {
    Image(ImageRecord),
    Data(DataRecord),
}

#[derive(Debug, Error)]
pub enum ObjectCacheError {
    #[error("failed to load `{url}`: {source}")]
    Load {
        url: String,
        #[source]
        source: FetchError,
    },
    #[error("unexpected status {status} loading `{url}`")]
    UpstreamStatus { url: String, status: StatusCode },
}

/// The cache itself. Cheap to share behind an [`Arc`]; every operation takes
/// `&self`.
pub struct ObjectCache {
    config: ObjectCacheConfig,
    fetcher: Arc<dyn Fetcher>,
    records: DashMap<String, ObjectRecord>,
    /// Insertion order of image keys, oldest first. Data records never join.
    image_order: Mutex<VecDeque<String>>,
    /// One cell per key currently being loaded; concurrent callers for the
    /// same key await the first load instead of repeating it.
    inflight: DashMap<String, Arc<OnceCell<ImageRecord>>>,
}

impl ObjectCache {
    pub fn new(config: ObjectCacheConfig, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            config,
            fetcher,
            records: DashMap::new(),
            image_order: Mutex::new(VecDeque::new()),
            inflight: DashMap::new(),
        }
    }

    pub fn config(&self) -> &ObjectCacheConfig {
        &self.config
    }

    /// Return the cached image for `source`, loading and transcoding it on a
    /// miss. The stored record wins regardless of the requested size class;
    /// the class only shapes the first transcode for a key.
    pub async fn image(
        &self,
        source: &Url,
        class: SizeClass,
    ) -> Result<ImageRecord, ObjectCacheError> {
        let key = source.as_str();

        if let Some(record) = self.records.get(key)
            && let ObjectRecord::Image(image) = record.value()
        {
            counter!(METRIC_IMAGE_HIT).increment(1);
            return Ok(image.clone());
        }
        counter!(METRIC_IMAGE_MISS).increment(1);

        let cell = {
            let entry = self
                .inflight
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(OnceCell::new()));
            Arc::clone(entry.value())
        };

        let result = cell
            .get_or_try_init(|| self.load_image(source, class))
            .await
            .cloned();

        self.inflight.remove(key);
        result
    }

    async fn load_image(
        &self,
        source: &Url,
        class: SizeClass,
    ) -> Result<ImageRecord, ObjectCacheError> {
        let request = ProxyRequest::get(source.clone()).with_destination(Destination::Image);
        let response = self
            .fetcher
            .fetch(&request)
            .await
            .map_err(|error| ObjectCacheError::Load {
                url: source.to_string(),
                source: error,
            })?;
        if !response.is_success() {
            return Err(ObjectCacheError::UpstreamStatus {
                url: source.to_string(),
                status: response.status,
            });
        }

        let (max_width, max_height) = class.bounds(&self.config);
        let started = Instant::now();
        let record =
            match transcode::bounded_jpeg(&response.body, max_width, max_height, self.config.jpeg_quality)
            {
                Ok(blob) => ImageRecord {
                    blob,
                    size_class: class,
                    transcoded: true,
                },
                Err(error) => {
                    warn!(
                        target = "scorta::object_cache",
                        url = %source,
                        error = %error,
                        "Transcode failed, caching original bytes"
                    );
                    ImageRecord {
                        blob: response.body,
                        size_class: class,
                        transcoded: false,
                    }
                }
            };
        histogram!(METRIC_TRANSCODE_MS).record(started.elapsed().as_millis() as f64);

        self.store_image(source.as_str(), record.clone());
        Ok(record)
    }

    fn store_image(&self, key: &str, record: ImageRecord) {
        let mut order = mutex_lock(&self.image_order, SOURCE, "store_image");
        self.records
            .insert(key.to_string(), ObjectRecord::Image(record));
        order.retain(|existing| existing != key);
        order.push_back(key.to_string());

        while order.len() > self.config.max_images {
            let Some(victim) = order.pop_front() else {
                break;
            };
            if self.records.remove(&victim).is_some() {
                counter!(METRIC_IMAGE_EVICT).increment(1);
                debug!(target = "scorta::object_cache", key = %victim, "Evicted oldest image");
            }
        }
    }

    /// Store a data record with the default TTL.
    pub fn put_data(&self, key: &str, value: serde_json::Value) {
        self.put_data_with_ttl(key, value, self.config.data_ttl);
    }

    pub fn put_data_with_ttl(&self, key: &str, value: serde_json::Value, ttl: Duration) {
        let expires_at = OffsetDateTime::now_utc() + ttl;
        let mut order = mutex_lock(&self.image_order, SOURCE, "put_data_with_ttl");
        let previous = self
            .records
            .insert(key.to_string(), ObjectRecord::Data(DataRecord { value, expires_at }));
        if matches!(previous, Some(ObjectRecord::Image(_))) {
            order.retain(|existing| existing != key);
        }
    }

    /// Look up a data record; an expired record is removed and reported as a
    /// miss.
    pub fn get_data(&self, key: &str) -> Option<serde_json::Value> {
        let expired = match self.records.get(key) {
            Some(record) => match record.value() {
                ObjectRecord::Data(data) if data.expires_at > OffsetDateTime::now_utc() => {
                    return Some(data.value.clone());
                }
                ObjectRecord::Data(_) => true,
                ObjectRecord::Image(_) => false,
            },
            None => false,
        };

        if expired
            && self
                .records
                .remove_if(key, |_, record| {
                    matches!(
                        record,
                        ObjectRecord::Data(data) if data.expires_at <= OffsetDateTime::now_utc()
                    )
                })
                .is_some()
        {
            counter!(METRIC_DATA_EXPIRED).increment(1);
        }
        None
    }

    /// Remove every expired data record, returning how many were dropped.
    pub fn sweep_expired(&self) -> usize {
        let now = OffsetDateTime::now_utc();
        let mut removed = 0usize;
        self.records.retain(|_, record| match record {
            ObjectRecord::Data(data) if data.expires_at <= now => {
                removed += 1;
                false
            }
            _ => true,
        });

        if removed > 0 {
            counter!(METRIC_DATA_EXPIRED).increment(removed as u64);
            debug!(target = "scorta::object_cache", removed, "Swept expired data records");
        }
        removed
    }

    /// Run [`Self::sweep_expired`] on the configured cadence until aborted.
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(cache.config.sweep_interval);
            interval.tick().await; // Skip the first immediate tick
            loop {
                interval.tick().await;
                cache.sweep_expired();
            }
        })
    }

    pub fn image_count(&self) -> usize {
        mutex_lock(&self.image_order, SOURCE, "image_count").len()
    }

    /// Drop every record, image order included.
    pub fn clear(&self) {
        let mut order = mutex_lock(&self.image_order, SOURCE, "clear");
        order.clear();
        self.records.clear();
    }
}
