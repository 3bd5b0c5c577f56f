//! Persistent cache partitions and their lifecycle.
//!
//! A deployment owns three partitions (static, dynamic, image) whose on-disk
//! names are scoped by a version string. The [`PartitionStore`] keeps them on
//! the filesystem with insertion order preserved; the [`LifecycleManager`]
//! seeds the static partition at install and garbage-collects foreign
//! partition names at activation; the [`EvictionSweeper`] bounds the image
//! partition by entry count.

pub mod lifecycle;
pub mod manifest;
pub mod store;
pub mod sweep;

pub use lifecycle::{LifecycleError, LifecycleManager};
pub use manifest::{PartitionKind, PartitionManifest};
pub use store::{PartitionStore, StoreError};
pub use sweep::EvictionSweeper;
