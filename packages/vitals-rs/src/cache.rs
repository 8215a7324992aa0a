// Latest-reading cache with an explicit collecting/paused switch
//
// Written only by the engine's dispatch task; read from anywhere. A read is a
// cloned snapshot, so callers never observe a half-updated reading.

use crate::types::Reading;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

pub struct ReadingCache {
    latest: RwLock<Option<Reading>>,
    collecting: AtomicBool,
    total_offered: AtomicU64,
    total_stored: AtomicU64,
}

impl Default for ReadingCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadingCache {
    /// New caches start empty and collecting.
    pub fn new() -> Self {
        Self {
            latest: RwLock::new(None),
            collecting: AtomicBool::new(true),
            total_offered: AtomicU64::new(0),
            total_stored: AtomicU64::new(0),
        }
    }

    /// Snapshot of the most recent stored reading.
    pub fn latest(&self) -> Option<Reading> {
        self.latest.read().clone()
    }

    /// Store `reading` as the latest one unless collecting is paused.
    ///
    /// Returns whether the cache was updated.
    pub fn offer(&self, reading: &Reading) -> bool {
        self.total_offered.fetch_add(1, Ordering::Relaxed);

        if !self.collecting.load(Ordering::Acquire) {
            log::debug!("Reading received but collecting is paused");
            return false;
        }

        *self.latest.write() = Some(reading.clone());
        self.total_stored.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Stop refreshing the latest reading until [`resume`](Self::resume).
    pub fn pause(&self) {
        if self.collecting.swap(false, Ordering::AcqRel) {
            log::info!("Collecting paused (latest will no longer update)");
        }
    }

    pub fn resume(&self) {
        if !self.collecting.swap(true, Ordering::AcqRel) {
            log::info!("Collecting resumed");
        }
    }

    pub fn is_collecting(&self) -> bool {
        self.collecting.load(Ordering::Acquire)
    }

    /// Forget the latest reading. The collecting flag is left as is.
    pub fn clear(&self) {
        *self.latest.write() = None;
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            total_offered: self.total_offered.load(Ordering::Relaxed),
            total_stored: self.total_stored.load(Ordering::Relaxed),
            collecting: self.is_collecting(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct CacheStats {
    pub total_offered: u64,
    pub total_stored: u64,
    pub collecting: bool,
}
