//! Module lifecycle: load, mount, teardown.
//!
//! A [`UniqueFs`] plays the role of the loaded filesystem module. It owns the
//! state shared by every namespace mounted from it: the quota pool, the page
//! budget and the inode counter.

use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

use crate::config::{ConfigError, FsConfig};
use crate::error::{FsError, FsResult};
use crate::namespace::Namespace;
use crate::page::PageBudget;
use crate::quota::QuotaPool;

/// State shared by a module and all of its namespaces.
#[derive(Debug)]
pub(crate) struct ModuleShared {
    pub(crate) config: FsConfig,
    pub(crate) page_size: usize,
    pub(crate) quota: QuotaPool,
    pub(crate) budget: Arc<PageBudget>,
    next_ino: AtomicU64,
    next_mount_id: AtomicU64,
    /// Mounted namespaces. Taken before the quota lock when both are needed.
    active_mounts: Mutex<usize>,
}

impl ModuleShared {
    pub(crate) fn next_ino(&self) -> u64 {
        self.next_ino.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn mount_released(&self, id: u64) {
        let mut active = self.active_mounts.lock();
        *active = active.saturating_sub(1);
        info!(mount = id, active = *active, "namespace unmounted");
    }
}

/// A loaded filesystem module.
///
/// Cheap to clone; clones share the same pool and counters.
#[derive(Debug, Clone)]
pub struct UniqueFs {
    shared: Arc<ModuleShared>,
}

impl UniqueFs {
    /// Load the module with a validated configuration.
    pub fn load(config: FsConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let page_size = config.page_size();
        info!(
            total_capacity = config.total_capacity,
            max_entries = config.max_entries(),
            name_max = config.name_max,
            page_size,
            "uniquefs loaded"
        );
        Ok(Self {
            shared: Arc::new(ModuleShared {
                quota: QuotaPool::new(config.total_capacity),
                budget: PageBudget::new(config.max_pages),
                page_size,
                config,
                next_ino: AtomicU64::new(1),
                next_mount_id: AtomicU64::new(1),
                active_mounts: Mutex::new(0),
            }),
        })
    }

    /// Mount a fresh namespace, reserving one quota unit for it.
    ///
    /// The unit stays reserved after unmount; only [`teardown`](Self::teardown)
    /// gives it back.
    #[tracing::instrument(skip(self), name = "uniquefs.mount")]
    pub fn mount(&self) -> FsResult<Arc<Namespace>> {
        let mut active = self.shared.active_mounts.lock();
        self.shared.quota.reserve_for_mount()?;
        *active += 1;

        let id = self.shared.next_mount_id.fetch_add(1, Ordering::Relaxed);
        info!(
            mount = id,
            active = *active,
            available = self.shared.quota.available(),
            "namespace mounted"
        );
        Ok(Arc::new(Namespace::new(Arc::clone(&self.shared), id)))
    }

    /// Module exit: refill the quota pool.
    ///
    /// Refused with `Busy` while any namespace is still mounted.
    #[tracing::instrument(skip(self), name = "uniquefs.teardown")]
    pub fn teardown(&self) -> FsResult<()> {
        let active = self.shared.active_mounts.lock();
        if *active > 0 {
            return Err(FsError::Busy(format!("{} namespace(s) still mounted", *active)));
        }
        self.shared.quota.release_all();
        Ok(())
    }

    pub fn config(&self) -> &FsConfig {
        &self.shared.config
    }

    pub fn page_size(&self) -> usize {
        self.shared.page_size
    }

    pub fn quota(&self) -> &QuotaPool {
        &self.shared.quota
    }

    /// Namespaces currently mounted.
    pub fn active_mounts(&self) -> usize {
        *self.shared.active_mounts.lock()
    }

    /// Pages allocated across all namespaces.
    pub fn live_pages(&self) -> usize {
        self.shared.budget.live_pages()
    }
}
