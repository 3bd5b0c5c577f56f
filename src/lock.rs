//! Poison-recovering lock acquisition.
//!
//! A panicked holder poisons a std lock; the caches behind these locks hold
//! replaceable data, so the guards recover the inner state and keep serving
//! instead of propagating the panic.

use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::warn;

fn warn_poisoned(kind: &'static str, source: &'static str, op: &'static str) {
    warn!(
        source,
        op,
        kind,
        "Lock was poisoned by a panicked holder; continuing with its state"
    );
}

pub(crate) fn rw_read<'a, T>(
    lock: &'a RwLock<T>,
    source: &'static str,
    op: &'static str,
) -> RwLockReadGuard<'a, T> {
    lock.read().unwrap_or_else(|poisoned| {
        warn_poisoned("rwlock.read", source, op);
        poisoned.into_inner()
    })
}

pub(crate) fn rw_write<'a, T>(
    lock: &'a RwLock<T>,
    source: &'static str,
    op: &'static str,
) -> RwLockWriteGuard<'a, T> {
    lock.write().unwrap_or_else(|poisoned| {
        warn_poisoned("rwlock.write", source, op);
        poisoned.into_inner()
    })
}

pub(crate) fn mutex_lock<'a, T>(
    lock: &'a Mutex<T>,
    source: &'static str,
    op: &'static str,
) -> MutexGuard<'a, T> {
    lock.lock().unwrap_or_else(|poisoned| {
        warn_poisoned("mutex.lock", source, op);
        poisoned.into_inner()
    })
}
