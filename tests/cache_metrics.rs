//! Asserts the metric catalog stays wired to the hot paths.
//!
//! One test, alone in its own binary: installing the debugging recorder is
//! process-global, so nothing else may run beside it. The test walks every
//! instrumented path once and checks the full set of metric keys appeared.

use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::{Method, StatusCode};
use metrics_util::debugging::{DebuggingRecorder, Snapshotter};
use tempfile::TempDir;
use url::Url;

use scorta::config::ProxySettings;
use scorta::object_cache::{ObjectCache, ObjectCacheConfig, SizeClass};
use scorta::{
    CacheProxy, FetchError, Fetcher, HandleOutcome, PartitionStore, ProxyRequest, ProxyResponse,
};

struct StubFetcher {
    responses: Mutex<HashMap<String, ProxyResponse>>,
    offline: AtomicBool,
}

impl StubFetcher {
    fn new() -> Self {
        Self {
            responses: Mutex::new(HashMap::new()),
            offline: AtomicBool::new(false),
        }
    }

    fn respond(&self, url: &str, content_type: &str, body: Bytes) {
        let response = ProxyResponse::network(
            StatusCode::OK,
            vec![("content-type".to_string(), content_type.to_string())],
            body,
        );
        self.responses
            .lock()
            .expect("responses lock")
            .insert(url.to_string(), response);
    }

    fn go_offline(&self) {
        self.offline.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Fetcher for StubFetcher {
    async fn fetch(&self, request: &ProxyRequest) -> Result<ProxyResponse, FetchError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(FetchError::Timeout {
                url: request.url.to_string(),
            });
        }
        self.responses
            .lock()
            .expect("responses lock")
            .get(request.url.as_str())
            .cloned()
            .ok_or_else(|| FetchError::Timeout {
                url: request.url.to_string(),
            })
    }
}

fn settings() -> ProxySettings {
    let origin = Url::parse("https://shop.example.com").expect("origin should parse");
    ProxySettings {
        api_prefix: "/api/".to_string(),
        cache_version: "v1".to_string(),
        cache_dir: PathBuf::from("unused-by-this-test"),
        precache: vec![origin.join("/").expect("join shell path")],
        shell_url: origin.join("/").expect("join shell path"),
        image_partition_limit: NonZeroUsize::new(1).expect("nonzero limit"),
        image_hosts: Vec::new(),
        fetch_timeout: Duration::from_secs(5),
        origin,
    }
}

fn get(url: &str) -> ProxyRequest {
    ProxyRequest::get(Url::parse(url).expect("test url should parse"))
}

async fn served(proxy: &CacheProxy, url: &str) -> ProxyResponse {
    match proxy.handle(&get(url)).await.expect("handle should not fail") {
        HandleOutcome::Served(response) => response,
        HandleOutcome::Bypass => panic!("expected {url} to be served, not bypassed"),
    }
}

fn png_bytes(width: u32, height: u32) -> Bytes {
    let img = image::DynamicImage::ImageRgb8(image::RgbImage::from_pixel(
        width,
        height,
        image::Rgb([120, 40, 200]),
    ));
    let mut out = std::io::Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png)
        .expect("png should encode");
    Bytes::from(out.into_inner())
}

fn snapshot_names(snapshotter: &Snapshotter) -> HashSet<String> {
    snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect()
}

#[tokio::test]
async fn cache_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    let dir = TempDir::new().expect("tempdir");
    let store = Arc::new(
        PartitionStore::open(dir.path())
            .await
            .expect("store should open"),
    );
    // A leftover partition from a previous version, so activation has
    // something to collect.
    let stale = ProxyResponse::network(StatusCode::OK, Vec::new(), Bytes::from_static(b"old"));
    store
        .put("v0-static", "k", &stale)
        .await
        .expect("seed stale partition");

    let fetcher = Arc::new(StubFetcher::new());
    fetcher.respond(
        "https://shop.example.com/",
        "text/html",
        Bytes::from_static(b"<html>shell</html>"),
    );
    fetcher.respond(
        "https://shop.example.com/api/products",
        "application/json",
        Bytes::from_static(b"[]"),
    );
    fetcher.respond(
        "https://shop.example.com/media/a.webp",
        "image/webp",
        Bytes::from_static(b"a-bytes"),
    );
    fetcher.respond(
        "https://shop.example.com/media/b.webp",
        "image/webp",
        Bytes::from_static(b"b-bytes"),
    );

    let proxy = CacheProxy::new(
        &settings(),
        Arc::clone(&store),
        Arc::clone(&fetcher) as Arc<dyn Fetcher>,
    );

    // Lifecycle: seed, then collect the stale partition.
    proxy.install().await.expect("install should succeed");
    proxy.activate().await.expect("activate should succeed");

    // A POST bypasses even on an active proxy.
    let mut post = get("https://shop.example.com/api/products");
    post.method = Method::POST;
    let outcome = proxy.handle(&post).await.expect("handle should not fail");
    assert!(matches!(outcome, HandleOutcome::Bypass));

    // Online handling: api write-through, image misses that trip the
    // one-entry partition limit, then an image hit whose background refresh
    // rewrites the entry.
    served(&proxy, "https://shop.example.com/api/products").await;
    served(&proxy, "https://shop.example.com/media/a.webp").await;
    served(&proxy, "https://shop.example.com/media/b.webp").await;
    served(&proxy, "https://shop.example.com/media/b.webp").await;

    let refresh_seen = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if snapshot_names(&snapshotter).contains("scorta_strategy_refresh_total") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(
        refresh_seen.is_ok(),
        "background refresh should record its counter"
    );

    // Offline: an api nobody cached synthesizes the fallback.
    fetcher.go_offline();
    let api = served(&proxy, "https://shop.example.com/api/cart").await;
    assert_eq!(api.status, StatusCode::SERVICE_UNAVAILABLE);

    // Object cache: miss + transcode, hit, evict at its one-image limit,
    // and a lazy TTL expiry.
    let image_fetcher = Arc::new(StubFetcher::new());
    image_fetcher.respond(
        "https://images.cdn.example.net/p/1",
        "image/png",
        png_bytes(64, 64),
    );
    image_fetcher.respond(
        "https://images.cdn.example.net/p/2",
        "image/png",
        png_bytes(64, 64),
    );
    let objects = ObjectCache::new(
        ObjectCacheConfig {
            max_images: 1,
            ..Default::default()
        },
        Arc::clone(&image_fetcher) as Arc<dyn Fetcher>,
    );
    let first = Url::parse("https://images.cdn.example.net/p/1").expect("url should parse");
    let second = Url::parse("https://images.cdn.example.net/p/2").expect("url should parse");
    objects
        .image(&first, SizeClass::Thumbnail)
        .await
        .expect("first load should succeed");
    objects
        .image(&first, SizeClass::Thumbnail)
        .await
        .expect("repeat should hit");
    objects
        .image(&second, SizeClass::Thumbnail)
        .await
        .expect("second load should succeed");
    assert_eq!(objects.image_count(), 1);

    objects.put_data_with_ttl(
        "checkout-draft",
        serde_json::json!({"total": 3}),
        Duration::from_millis(10),
    );
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(objects.get_data("checkout-draft").is_none());

    let names = snapshot_names(&snapshotter);
    let expected = [
        "scorta_partition_hit_total",
        "scorta_partition_miss_total",
        "scorta_partition_write_total",
        "scorta_partition_evict_total",
        "scorta_lifecycle_seeded_total",
        "scorta_lifecycle_gc_removed_total",
        "scorta_strategy_fallback_total",
        "scorta_strategy_refresh_total",
        "scorta_proxy_handled_total",
        "scorta_proxy_bypass_total",
        "scorta_proxy_handle_ms",
        "scorta_object_image_hit_total",
        "scorta_object_image_miss_total",
        "scorta_object_image_evict_total",
        "scorta_object_data_expired_total",
        "scorta_object_transcode_ms",
    ];

    for metric in expected {
        assert!(names.contains(metric), "missing metric: {metric}");
    }
}
