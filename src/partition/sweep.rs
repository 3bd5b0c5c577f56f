//! Count-based eviction for the image partition.

use tracing::debug;

use super::store::{PartitionStore, StoreError};

/// Trims one partition back to a maximum entry count, oldest-inserted first.
///
/// Runs after every write into the image partition. Eviction is strictly
/// insertion-ordered; reads never refresh an entry's position.
#[derive(Debug, Clone)]
pub struct EvictionSweeper {
    partition: String,
    max_entries: usize,
}

impl EvictionSweeper {
    pub fn new(partition: impl Into<String>, max_entries: usize) -> Self {
        Self {
            partition: partition.into(),
            max_entries,
        }
    }

    pub fn partition(&self) -> &str {
        &self.partition
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Evict until the partition is back at its limit. Returns how many
    /// entries were removed.
    pub async fn run(&self, store: &PartitionStore) -> Result<usize, StoreError> {
        let evicted = store.trim_to(&self.partition, self.max_entries).await?;
        if !evicted.is_empty() {
            debug!(
                partition = %self.partition,
                evicted = evicted.len(),
                limit = self.max_entries,
                "Evicted oldest image entries"
            );
        }
        Ok(evicted.len())
    }
}
