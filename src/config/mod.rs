//! Configuration layer: typed settings with layered precedence (file → environment).

use std::{
    num::{NonZeroU32, NonZeroUsize},
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

const DEFAULT_CONFIG_BASENAME: &str = "scorta";
const LOCAL_CONFIG_BASENAME: &str = "scorta.local";
const DEFAULT_ORIGIN: &str = "http://localhost:8080";
const DEFAULT_API_PREFIX: &str = "/api/";
const DEFAULT_CACHE_VERSION: &str = "v1";
const DEFAULT_CACHE_DIR: &str = "scorta-cache";
const DEFAULT_SHELL_PATH: &str = "/";
const DEFAULT_PRECACHE_PATHS: &[&str] = &["/"];
const DEFAULT_IMAGE_PARTITION_LIMIT: u64 = 50;
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;
const DEFAULT_MAX_IMAGES: u64 = 100;
const DEFAULT_DATA_TTL_SECS: u64 = 30 * 60;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;
const DEFAULT_THUMBNAIL_MAX_PX: u32 = 200;
const DEFAULT_DETAIL_MAX_PX: u32 = 800;
const DEFAULT_JPEG_QUALITY: u8 = 80;

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub proxy: ProxySettings,
    pub object_cache: ObjectCacheSettings,
    pub logging: LoggingSettings,
}

/// Settings for request classification, partition storage and strategy dispatch.
#[derive(Debug, Clone)]
pub struct ProxySettings {
    /// Origin of the application the proxy fronts; its host anchors
    /// same-host classification and relative precache paths.
    pub origin: Url,
    pub api_prefix: String,
    pub cache_version: String,
    pub cache_dir: PathBuf,
    /// Absolute URLs seeded into the static partition at install time.
    pub precache: Vec<Url>,
    /// Application shell served when offline navigation cannot reach the network.
    pub shell_url: Url,
    pub image_partition_limit: NonZeroUsize,
    /// Extra hosts whose responses are treated as images (e.g. a CDN).
    pub image_hosts: Vec<String>,
    pub fetch_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ObjectCacheSettings {
    pub max_images: NonZeroUsize,
    pub data_ttl: Duration,
    pub sweep_interval: Duration,
    pub thumbnail_max_px: NonZeroU32,
    pub detail_max_px: NonZeroU32,
    pub jpeg_quality: u8,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (base file → local file → environment).
pub fn load(config_file: Option<&Path>) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = config_file {
        builder = builder.add_source(File::from(path).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("SCORTA").separator("__"));

    let raw: RawSettings = builder.build()?.try_deserialize()?;
    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    proxy: RawProxySettings,
    object_cache: RawObjectCacheSettings,
    logging: RawLoggingSettings,
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            proxy,
            object_cache,
            logging,
        } = raw;

        let proxy = build_proxy_settings(proxy)?;
        let object_cache = build_object_cache_settings(object_cache)?;
        let logging = build_logging_settings(logging)?;

        Ok(Self {
            proxy,
            object_cache,
            logging,
        })
    }
}

fn build_proxy_settings(proxy: RawProxySettings) -> Result<ProxySettings, LoadError> {
    let origin_value = proxy.origin.unwrap_or_else(|| DEFAULT_ORIGIN.to_string());
    let origin = Url::parse(origin_value.trim())
        .map_err(|err| LoadError::invalid("proxy.origin", format!("failed to parse: {err}")))?;
    if origin.cannot_be_a_base() || origin.host_str().is_none() {
        return Err(LoadError::invalid(
            "proxy.origin",
            "must be an absolute URL with a host",
        ));
    }
    match origin.scheme() {
        "http" | "https" => {}
        other => {
            return Err(LoadError::invalid(
                "proxy.origin",
                format!("unsupported scheme `{other}`"),
            ));
        }
    }

    let api_prefix = proxy
        .api_prefix
        .unwrap_or_else(|| DEFAULT_API_PREFIX.to_string());
    if !api_prefix.starts_with('/') {
        return Err(LoadError::invalid(
            "proxy.api_prefix",
            "must start with `/`",
        ));
    }

    let cache_version = proxy
        .cache_version
        .unwrap_or_else(|| DEFAULT_CACHE_VERSION.to_string());
    let valid_version = !cache_version.is_empty()
        && cache_version
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_');
    if !valid_version {
        return Err(LoadError::invalid(
            "proxy.cache_version",
            "must be non-empty and use only ASCII letters, digits, `-` or `_`",
        ));
    }

    let cache_dir = proxy
        .cache_dir
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_DIR));
    if cache_dir.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "proxy.cache_dir",
            "path must not be empty",
        ));
    }

    let precache_paths = proxy.precache.unwrap_or_else(|| {
        DEFAULT_PRECACHE_PATHS
            .iter()
            .map(|path| path.to_string())
            .collect()
    });
    let mut precache = Vec::with_capacity(precache_paths.len());
    for path in &precache_paths {
        let joined = origin.join(path).map_err(|err| {
            LoadError::invalid("proxy.precache", format!("failed to join `{path}`: {err}"))
        })?;
        precache.push(joined);
    }

    let shell_path = proxy
        .shell_path
        .unwrap_or_else(|| DEFAULT_SHELL_PATH.to_string());
    let shell_url = origin.join(&shell_path).map_err(|err| {
        LoadError::invalid(
            "proxy.shell_path",
            format!("failed to join `{shell_path}`: {err}"),
        )
    })?;

    let limit_value = proxy
        .image_partition_limit
        .unwrap_or(DEFAULT_IMAGE_PARTITION_LIMIT);
    let image_partition_limit = non_zero_usize(limit_value, "proxy.image_partition_limit")?;

    let image_hosts = proxy
        .image_hosts
        .unwrap_or_default()
        .into_iter()
        .filter_map(|host| {
            let trimmed = host.trim().to_ascii_lowercase();
            (!trimmed.is_empty()).then_some(trimmed)
        })
        .collect();

    let timeout_secs = proxy
        .fetch_timeout_seconds
        .unwrap_or(DEFAULT_FETCH_TIMEOUT_SECS);
    if timeout_secs == 0 {
        return Err(LoadError::invalid(
            "proxy.fetch_timeout_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ProxySettings {
        origin,
        api_prefix,
        cache_version,
        cache_dir,
        precache,
        shell_url,
        image_partition_limit,
        image_hosts,
        fetch_timeout: Duration::from_secs(timeout_secs),
    })
}

fn build_object_cache_settings(
    object_cache: RawObjectCacheSettings,
) -> Result<ObjectCacheSettings, LoadError> {
    let max_images_value = object_cache.max_images.unwrap_or(DEFAULT_MAX_IMAGES);
    let max_images = non_zero_usize(max_images_value, "object_cache.max_images")?;

    let ttl_secs = object_cache
        .data_ttl_seconds
        .unwrap_or(DEFAULT_DATA_TTL_SECS);
    if ttl_secs == 0 {
        return Err(LoadError::invalid(
            "object_cache.data_ttl_seconds",
            "must be greater than zero",
        ));
    }

    let sweep_secs = object_cache
        .sweep_interval_seconds
        .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS);
    if sweep_secs == 0 {
        return Err(LoadError::invalid(
            "object_cache.sweep_interval_seconds",
            "must be greater than zero",
        ));
    }

    let thumbnail_value = object_cache
        .thumbnail_max_px
        .unwrap_or(DEFAULT_THUMBNAIL_MAX_PX);
    let thumbnail_max_px = NonZeroU32::new(thumbnail_value).ok_or_else(|| {
        LoadError::invalid("object_cache.thumbnail_max_px", "must be greater than zero")
    })?;

    let detail_value = object_cache.detail_max_px.unwrap_or(DEFAULT_DETAIL_MAX_PX);
    let detail_max_px = NonZeroU32::new(detail_value).ok_or_else(|| {
        LoadError::invalid("object_cache.detail_max_px", "must be greater than zero")
    })?;

    let jpeg_quality = object_cache.jpeg_quality.unwrap_or(DEFAULT_JPEG_QUALITY);
    if !(1..=100).contains(&jpeg_quality) {
        return Err(LoadError::invalid(
            "object_cache.jpeg_quality",
            "must be between 1 and 100",
        ));
    }

    Ok(ObjectCacheSettings {
        max_images,
        data_ttl: Duration::from_secs(ttl_secs),
        sweep_interval: Duration::from_secs(sweep_secs),
        thumbnail_max_px,
        detail_max_px,
        jpeg_quality,
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawProxySettings {
    origin: Option<String>,
    api_prefix: Option<String>,
    cache_version: Option<String>,
    cache_dir: Option<PathBuf>,
    precache: Option<Vec<String>>,
    shell_path: Option<String>,
    image_partition_limit: Option<u64>,
    image_hosts: Option<Vec<String>>,
    fetch_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawObjectCacheSettings {
    max_images: Option<u64>,
    data_ttl_seconds: Option<u64>,
    sweep_interval_seconds: Option<u64>,
    thumbnail_max_px: Option<u32>,
    detail_max_px: Option<u32>,
    jpeg_quality: Option<u8>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

fn non_zero_usize(value: u64, key: &'static str) -> Result<NonZeroUsize, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_usize: usize = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for usize"))?;
    NonZeroUsize::new(value_usize)
        .ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}
