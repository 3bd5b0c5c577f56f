//! Persistent partition store.
//!
//! Each partition is a directory under the cache root. An entry is two files
//! named by the SHA-256 of its key: `<digest>.bin` holds the body bytes and
//! `<digest>.json` a metadata sidecar (key, status, headers, body checksum,
//! stored-at timestamp). Writes land in a uniquely-named temp file and are
//! renamed into place, body before metadata, so a sidecar's presence marks a
//! committed entry.
//!
//! An in-memory index mirrors the directory tree and preserves insertion
//! order for FIFO eviction. The order is rebuilt from `stored_at` metadata
//! when the store opens, so it survives restarts; rewriting a key refreshes
//! its timestamp and moves it to the back of the order, which keeps the
//! on-disk and in-memory orders consistent with each other.
//!
//! Writes to one key are serialized on a striped async lock held across both
//! renames and the index update, so the body, its sidecar and the index
//! always commit as a unit and the last writer to a key is the one observed.

use std::collections::{HashMap, VecDeque};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use bytes::Bytes;
use http::StatusCode;
use metrics::counter;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use time::OffsetDateTime;
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::lock::{rw_read, rw_write};
use crate::request::{ProxyResponse, ResponseSource};

const SOURCE: &str = "partition::store";
const BODY_EXT: &str = "bin";
const META_EXT: &str = "json";
const WRITE_STRIPES: usize = 64;

pub(crate) const METRIC_HIT: &str = "scorta_partition_hit_total";
pub(crate) const METRIC_MISS: &str = "scorta_partition_miss_total";
pub(crate) const METRIC_WRITE: &str = "scorta_partition_write_total";
pub(crate) const METRIC_EVICT: &str = "scorta_partition_evict_total";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid partition name `{name}`")]
    InvalidPartitionName { name: String },
    #[error("cache i/o failed while {op} `{path}`: {source}")]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode entry metadata for `{key}`: {source}")]
    EncodeMetadata {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    fn io(op: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            op,
            path: path.into(),
            source,
        }
    }
}

/// Metadata sidecar persisted next to each body file.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct EntryMeta {
    key: String,
    status: u16,
    headers: Vec<(String, String)>,
    body_sha256: String,
    #[serde(with = "time::serde::rfc3339")]
    stored_at: OffsetDateTime,
}

#[derive(Default)]
struct PartitionIndex {
    /// Keys oldest-first; the eviction order.
    order: VecDeque<String>,
    entries: HashMap<String, EntryMeta>,
}

impl PartitionIndex {
    fn insert(&mut self, meta: EntryMeta) {
        let key = meta.key.clone();
        if self.entries.insert(key.clone(), meta).is_some() {
            // Rewrite: the key moves to the back of the order.
            self.order.retain(|existing| existing != &key);
        }
        self.order.push_back(key);
    }

    fn remove(&mut self, key: &str) -> bool {
        if self.entries.remove(key).is_some() {
            self.order.retain(|existing| existing != key);
            true
        } else {
            false
        }
    }
}

/// Named, persistent, insertion-ordered cache partitions.
///
/// Partitions are created implicitly on first write and removed only through
/// [`PartitionStore::remove_partition`]. All methods may be called
/// concurrently; index updates hold a short-lived lock and file I/O happens
/// outside it, so operations on distinct keys proceed independently.
pub struct PartitionStore {
    root: PathBuf,
    partitions: RwLock<HashMap<String, PartitionIndex>>,
    /// Striped write locks keyed by entry digest. Same-key writes take the
    /// same stripe, so the body rename, the sidecar rename and the index
    /// update commit together; writes to distinct keys almost always land on
    /// different stripes and proceed concurrently.
    write_stripes: Vec<tokio::sync::Mutex<()>>,
}

impl PartitionStore {
    /// Open the store rooted at `root`, creating the directory if necessary
    /// and rebuilding the per-partition index from metadata sidecars.
    ///
    /// Unreadable or corrupt sidecars and bodies missing their sidecar are
    /// skipped with a warning; they degrade to cache misses rather than
    /// failing the open.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root)
            .await
            .map_err(|source| StoreError::io("creating cache root", &root, source))?;

        let mut partitions = HashMap::new();
        let mut dirs = fs::read_dir(&root)
            .await
            .map_err(|source| StoreError::io("listing cache root", &root, source))?;
        while let Some(candidate) = dirs
            .next_entry()
            .await
            .map_err(|source| StoreError::io("listing cache root", &root, source))?
        {
            let file_type = candidate
                .file_type()
                .await
                .map_err(|source| StoreError::io("inspecting cache root", candidate.path(), source))?;
            if !file_type.is_dir() {
                continue;
            }
            let Some(name) = candidate.file_name().to_str().map(str::to_owned) else {
                warn!(
                    path = %candidate.path().display(),
                    "Ignoring partition directory with a non-UTF-8 name"
                );
                continue;
            };
            let index = load_partition(&candidate.path()).await?;
            debug!(partition = %name, entries = index.order.len(), "Indexed partition");
            partitions.insert(name, index);
        }

        Ok(Self {
            root,
            partitions: RwLock::new(partitions),
            write_stripes: (0..WRITE_STRIPES).map(|_| tokio::sync::Mutex::new(())).collect(),
        })
    }

    /// Look up an entry. `Ok(None)` is an ordinary miss; it is also the
    /// outcome when the on-disk body is missing or no longer matches its
    /// recorded checksum, in which case the stale index entry is dropped.
    pub async fn get(
        &self,
        partition: &str,
        key: &str,
    ) -> Result<Option<ProxyResponse>, StoreError> {
        validate_name(partition)?;

        let meta = {
            let partitions = rw_read(&self.partitions, SOURCE, "get");
            let Some(meta) = partitions
                .get(partition)
                .and_then(|index| index.entries.get(key))
            else {
                counter!(METRIC_MISS).increment(1);
                return Ok(None);
            };
            meta.clone()
        };

        let body_path = self.entry_path(partition, key, BODY_EXT);
        let body = match fs::read(&body_path).await {
            Ok(bytes) => Bytes::from(bytes),
            Err(source) if source.kind() == ErrorKind::NotFound => {
                warn!(partition, key, "Entry body missing; dropping the index entry");
                self.forget_if_unchanged(partition, key, &meta.body_sha256);
                counter!(METRIC_MISS).increment(1);
                return Ok(None);
            }
            Err(source) => return Err(StoreError::io("reading entry body", body_path, source)),
        };

        if digest_hex(&body) != meta.body_sha256 {
            warn!(
                partition,
                key, "Entry body does not match its recorded checksum; dropping the entry"
            );
            self.forget_if_unchanged(partition, key, &meta.body_sha256);
            counter!(METRIC_MISS).increment(1);
            return Ok(None);
        }

        let Ok(status) = StatusCode::from_u16(meta.status) else {
            warn!(partition, key, status = meta.status, "Entry has an invalid status code");
            self.forget_if_unchanged(partition, key, &meta.body_sha256);
            counter!(METRIC_MISS).increment(1);
            return Ok(None);
        };

        counter!(METRIC_HIT).increment(1);
        Ok(Some(ProxyResponse {
            status,
            headers: meta.headers,
            body,
            source: ResponseSource::Cache,
        }))
    }

    /// Write an entry, replacing any previous value for the key. The
    /// partition directory is created on first write. Concurrent writes to
    /// the same key serialize; the one that commits last is the one a later
    /// read observes.
    pub async fn put(
        &self,
        partition: &str,
        key: &str,
        response: &ProxyResponse,
    ) -> Result<(), StoreError> {
        validate_name(partition)?;

        let dir = self.partition_dir(partition);
        fs::create_dir_all(&dir)
            .await
            .map_err(|source| StoreError::io("creating partition", &dir, source))?;

        let digest = entry_digest(key);
        let _write_guard = self.write_stripe(&digest).lock().await;

        let meta = EntryMeta {
            key: key.to_string(),
            status: response.status.as_u16(),
            headers: response.headers.clone(),
            body_sha256: digest_hex(&response.body),
            stored_at: OffsetDateTime::now_utc(),
        };
        let encoded = serde_json::to_vec(&meta).map_err(|source| StoreError::EncodeMetadata {
            key: key.to_string(),
            source,
        })?;

        write_atomic(&dir.join(format!("{digest}.{BODY_EXT}")), &response.body).await?;
        write_atomic(&dir.join(format!("{digest}.{META_EXT}")), &encoded).await?;

        let mut partitions = rw_write(&self.partitions, SOURCE, "put");
        partitions.entry(partition.to_string()).or_default().insert(meta);
        counter!(METRIC_WRITE).increment(1);
        Ok(())
    }

    /// Remove one entry. Returns whether the key was present; removing an
    /// absent entry succeeds.
    pub async fn delete(&self, partition: &str, key: &str) -> Result<bool, StoreError> {
        validate_name(partition)?;
        let digest = entry_digest(key);
        let _write_guard = self.write_stripe(&digest).lock().await;
        let was_present = self.forget(partition, key);
        remove_entry_files(&self.partition_dir(partition), &digest).await;
        Ok(was_present)
    }

    /// Trim a partition down to `max_entries`, removing oldest-inserted keys
    /// first. Returns the evicted keys, oldest first.
    pub async fn trim_to(
        &self,
        partition: &str,
        max_entries: usize,
    ) -> Result<Vec<String>, StoreError> {
        validate_name(partition)?;

        let victims: Vec<String> = {
            let mut partitions = rw_write(&self.partitions, SOURCE, "trim_to");
            let Some(index) = partitions.get_mut(partition) else {
                return Ok(Vec::new());
            };
            let mut victims = Vec::new();
            while index.order.len() > max_entries {
                let Some(key) = index.order.pop_front() else {
                    break;
                };
                index.entries.remove(&key);
                victims.push(key);
            }
            victims
        };

        let dir = self.partition_dir(partition);
        for key in &victims {
            remove_entry_files(&dir, &entry_digest(key)).await;
        }
        if !victims.is_empty() {
            counter!(METRIC_EVICT).increment(victims.len() as u64);
        }
        Ok(victims)
    }

    /// Remove a whole partition, index and directory. Returns whether
    /// anything existed to remove.
    pub async fn remove_partition(&self, name: &str) -> Result<bool, StoreError> {
        validate_name(name)?;
        let indexed = {
            let mut partitions = rw_write(&self.partitions, SOURCE, "remove_partition");
            partitions.remove(name).is_some()
        };
        let dir = self.partition_dir(name);
        match fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(true),
            Err(source) if source.kind() == ErrorKind::NotFound => Ok(indexed),
            Err(source) => Err(StoreError::io("removing partition", dir, source)),
        }
    }

    /// Names of every known partition.
    pub fn partition_names(&self) -> Vec<String> {
        let partitions = rw_read(&self.partitions, SOURCE, "partition_names");
        partitions.keys().cloned().collect()
    }

    /// Keys of one partition, oldest-inserted first.
    pub fn keys(&self, partition: &str) -> Vec<String> {
        let partitions = rw_read(&self.partitions, SOURCE, "keys");
        partitions
            .get(partition)
            .map(|index| index.order.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, partition: &str, key: &str) -> bool {
        let partitions = rw_read(&self.partitions, SOURCE, "contains");
        partitions
            .get(partition)
            .is_some_and(|index| index.entries.contains_key(key))
    }

    pub fn len(&self, partition: &str) -> usize {
        let partitions = rw_read(&self.partitions, SOURCE, "len");
        partitions
            .get(partition)
            .map(|index| index.order.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self, partition: &str) -> bool {
        self.len(partition) == 0
    }

    fn partition_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn write_stripe(&self, digest: &str) -> &tokio::sync::Mutex<()> {
        // The digest is lowercase hex; its first byte picks the stripe.
        let stripe = usize::from_str_radix(&digest[..2], 16).unwrap_or(0) % WRITE_STRIPES;
        &self.write_stripes[stripe]
    }

    fn entry_path(&self, partition: &str, key: &str, ext: &str) -> PathBuf {
        self.partition_dir(partition)
            .join(format!("{}.{ext}", entry_digest(key)))
    }

    /// Drop a key from the index without touching the filesystem.
    fn forget(&self, partition: &str, key: &str) -> bool {
        let mut partitions = rw_write(&self.partitions, SOURCE, "forget");
        partitions
            .get_mut(partition)
            .is_some_and(|index| index.remove(key))
    }

    /// Drop a key from the index only if its recorded checksum still matches
    /// `expected_sha256`. A read that observed stale state must not evict an
    /// entry a concurrent write has since replaced.
    fn forget_if_unchanged(&self, partition: &str, key: &str, expected_sha256: &str) -> bool {
        let mut partitions = rw_write(&self.partitions, SOURCE, "forget_if_unchanged");
        let Some(index) = partitions.get_mut(partition) else {
            return false;
        };
        if index
            .entries
            .get(key)
            .is_some_and(|meta| meta.body_sha256 == expected_sha256)
        {
            index.remove(key)
        } else {
            false
        }
    }
}

async fn load_partition(dir: &Path) -> Result<PartitionIndex, StoreError> {
    let mut metas: Vec<EntryMeta> = Vec::new();
    let mut files = fs::read_dir(dir)
        .await
        .map_err(|source| StoreError::io("listing partition", dir, source))?;
    while let Some(candidate) = files
        .next_entry()
        .await
        .map_err(|source| StoreError::io("listing partition", dir, source))?
    {
        let path = candidate.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some(META_EXT) {
            continue;
        }
        let raw = match fs::read(&path).await {
            Ok(raw) => raw,
            Err(source) => {
                warn!(path = %path.display(), error = %source, "Skipping unreadable entry metadata");
                continue;
            }
        };
        let meta: EntryMeta = match serde_json::from_slice(&raw) {
            Ok(meta) => meta,
            Err(source) => {
                warn!(path = %path.display(), error = %source, "Skipping corrupt entry metadata");
                continue;
            }
        };
        let body_path = path.with_extension(BODY_EXT);
        match fs::try_exists(&body_path).await {
            Ok(true) => metas.push(meta),
            Ok(false) => {
                warn!(path = %path.display(), "Skipping entry metadata without a body file");
            }
            Err(source) => {
                warn!(path = %body_path.display(), error = %source, "Skipping unverifiable entry body");
            }
        }
    }

    metas.sort_by_key(|meta| meta.stored_at);
    let mut index = PartitionIndex::default();
    for meta in metas {
        index.insert(meta);
    }
    Ok(index)
}

/// Write through a uniquely-named temp file and rename into place. A crash
/// mid-write leaves at worst a stray temp file, never a truncated entry.
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let Some(parent) = path.parent() else {
        return Err(StoreError::io(
            "resolving entry parent",
            path,
            std::io::Error::new(ErrorKind::InvalidInput, "entry path has no parent"),
        ));
    };
    let tmp = parent.join(format!(".{}.tmp", Uuid::new_v4()));
    if let Err(source) = fs::write(&tmp, bytes).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(StoreError::io("writing entry", tmp, source));
    }
    if let Err(source) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(StoreError::io("committing entry", path, source));
    }
    Ok(())
}

/// Best-effort removal of an entry's files. Failures other than NotFound are
/// logged and otherwise ignored; the index no longer references the entry and
/// stray sidecars are skipped on the next open only if their body survives.
async fn remove_entry_files(dir: &Path, digest: &str) {
    for ext in [META_EXT, BODY_EXT] {
        let path = dir.join(format!("{digest}.{ext}"));
        match fs::remove_file(&path).await {
            Ok(()) => {}
            Err(source) if source.kind() == ErrorKind::NotFound => {}
            Err(source) => {
                warn!(path = %path.display(), error = %source, "Failed to remove entry file");
            }
        }
    }
}

fn validate_name(name: &str) -> Result<(), StoreError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'));
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidPartitionName {
            name: name.to_string(),
        })
    }
}

fn entry_digest(key: &str) -> String {
    digest_hex(key.as_bytes())
}

fn digest_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
