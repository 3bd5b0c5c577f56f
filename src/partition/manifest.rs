//! Versioned partition naming.
//!
//! A deployment declares exactly three partition roles. Their on-disk names
//! are scoped by the configured version string, so bumping the version is the
//! supported way to retire old partitions: at activation, any name outside
//! the current manifest is garbage.

use serde::{Deserialize, Serialize};

/// The three partition roles a deployment owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartitionKind {
    /// Pre-seeded application shell and assets.
    Static,
    /// Write-through copies of API responses.
    Dynamic,
    /// Fetched imagery, bounded by the eviction sweeper.
    Image,
}

impl PartitionKind {
    pub const ALL: [PartitionKind; 3] = [
        PartitionKind::Static,
        PartitionKind::Dynamic,
        PartitionKind::Image,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PartitionKind::Static => "static",
            PartitionKind::Dynamic => "dynamic",
            PartitionKind::Image => "image",
        }
    }
}

/// The complete set of partition names for one cache version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionManifest {
    version: String,
}

impl PartitionManifest {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// On-disk name for one partition role, e.g. `v3-image`.
    pub fn name_of(&self, kind: PartitionKind) -> String {
        format!("{}-{}", self.version, kind.as_str())
    }

    /// All names this manifest owns.
    pub fn names(&self) -> [String; 3] {
        PartitionKind::ALL.map(|kind| self.name_of(kind))
    }

    /// Whether `name` belongs to the current version. Anything else found at
    /// activation is subject to garbage collection.
    pub fn contains(&self, name: &str) -> bool {
        self.names().iter().any(|owned| owned == name)
    }
}
