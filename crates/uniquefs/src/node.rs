//! Regular file nodes.

use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use std::time::SystemTime;

use crate::error::FsResult;
use crate::store::PagedStore;
use crate::types::FileAttr;

#[derive(Debug, Clone, Copy)]
struct Times {
    atime: SystemTime,
    mtime: SystemTime,
    ctime: SystemTime,
}

/// A regular file: its content store behind the per-file lock, plus metadata.
///
/// Readers and fault resolution share the lock; writers (growth) and destroy
/// take it exclusively. Files never lock each other.
#[derive(Debug)]
pub struct FileNode {
    ino: u64,
    perm: u32,
    store: RwLock<PagedStore>,
    times: Mutex<Times>,
}

impl FileNode {
    pub(crate) fn new(ino: u64, perm: u32, store: PagedStore) -> Self {
        let now = SystemTime::now();
        Self {
            ino,
            perm,
            store: RwLock::new(store),
            times: Mutex::new(Times {
                atime: now,
                mtime: now,
                ctime: now,
            }),
        }
    }

    pub fn ino(&self) -> u64 {
        self.ino
    }

    /// Read up to `len` bytes at `offset`. Empty at or past the end.
    pub fn read(&self, offset: u64, len: usize) -> FsResult<Vec<u8>> {
        let data = self.store.read().read(offset, len)?;
        self.times.lock().atime = SystemTime::now();
        Ok(data)
    }

    /// Write `data` at `offset`, growing the file as needed.
    pub fn write(&self, offset: u64, data: &[u8]) -> FsResult<usize> {
        let written = self.store.write().write(offset, data)?;
        let now = SystemTime::now();
        let mut times = self.times.lock();
        times.mtime = now;
        times.ctime = now;
        Ok(written)
    }

    /// Logical size in bytes.
    pub fn size(&self) -> u64 {
        self.store.read().logical_size()
    }

    pub fn page_count(&self) -> usize {
        self.store.read().page_count()
    }

    pub fn is_destroyed(&self) -> bool {
        self.store.read().is_destroyed()
    }

    /// Current attributes.
    pub fn attr(&self) -> FileAttr {
        let (size, blocks) = {
            let store = self.store.read();
            (store.logical_size(), store.page_count() as u64)
        };
        let times = *self.times.lock();
        FileAttr {
            ino: self.ino,
            size,
            blocks,
            atime: Some(times.atime),
            mtime: times.mtime,
            ctime: Some(times.ctime),
            ..FileAttr::file(size, self.perm)
        }
    }

    /// Shared access to the store, held for the caller's whole lookup.
    pub(crate) fn lock_shared(&self) -> RwLockReadGuard<'_, PagedStore> {
        self.store.read()
    }

    /// Release every page. Returns how many were freed; 0 if already released.
    pub(crate) fn destroy(&self) -> usize {
        self.store.write().destroy()
    }
}
