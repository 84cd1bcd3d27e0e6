//! Module-wide quota pool.
//!
//! Each successful mount takes one unit for the lifetime of the module.
//! Unmounting does not give the unit back, so an unmount/remount loop cannot
//! conjure more namespaces than the pool was sized for. Only module teardown
//! refills the pool.

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::error::{FsError, FsResult};

/// Bounded counter of mount units, shared by every namespace of one module.
#[derive(Debug)]
pub struct QuotaPool {
    total_capacity: usize,
    /// Units not yet reserved. Guarded separately from any file or directory lock.
    available: Mutex<usize>,
}

impl QuotaPool {
    /// Create a full pool.
    pub fn new(total_capacity: usize) -> Self {
        Self {
            total_capacity,
            available: Mutex::new(total_capacity),
        }
    }

    /// Take one unit for a new mount.
    ///
    /// The check and the decrement happen under one lock, so concurrent
    /// mounts can never drive the pool below zero.
    pub fn reserve_for_mount(&self) -> FsResult<()> {
        let mut available = self.available.lock();
        if *available == 0 {
            debug!(total = self.total_capacity, "quota pool exhausted");
            return Err(FsError::QuotaExceeded);
        }
        *available -= 1;
        debug!(available = *available, "reserved mount unit");
        Ok(())
    }

    /// Refill the pool. Called once, at module teardown.
    pub fn release_all(&self) {
        let mut available = self.available.lock();
        let reclaimed = self.total_capacity - *available;
        *available = self.total_capacity;
        info!(reclaimed, total = self.total_capacity, "quota pool reset");
    }

    /// Units still available for mounts.
    pub fn available(&self) -> usize {
        *self.available.lock()
    }

    /// Size of the pool fixed at load time.
    pub fn total_capacity(&self) -> usize {
        self.total_capacity
    }
}
