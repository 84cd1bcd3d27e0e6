//! Host-boundary operations trait.
//!
//! These are the calls the host's VFS layer routes into the filesystem once
//! it has resolved a path. Paths are relative to the namespace root; the
//! [`MountTable`](crate::mount::MountTable) strips the mount prefix.

use async_trait::async_trait;
use std::path::Path;

use crate::page::PageHandle;
use crate::types::{DirEntry, FileAttr, StatFs};
use crate::FsResult;

/// Filesystem operations exposed to the host.
#[async_trait]
pub trait FsOps: Send + Sync {
    // ========================================================================
    // Reading
    // ========================================================================

    /// Get file attributes.
    async fn getattr(&self, path: &Path) -> FsResult<FileAttr>;

    /// List a directory.
    async fn readdir(&self, path: &Path) -> FsResult<Vec<DirEntry>>;

    /// Read up to `size` bytes starting at `offset`.
    ///
    /// Returns fewer bytes at the end of the file and none past it.
    async fn read(&self, path: &Path, offset: u64, size: u32) -> FsResult<Vec<u8>>;

    // ========================================================================
    // Writing
    // ========================================================================

    /// Write `data` at `offset`. Returns the number of bytes written.
    async fn write(&self, path: &Path, offset: u64, data: &[u8]) -> FsResult<u32>;

    /// Create a regular file.
    async fn create(&self, path: &Path, mode: u32) -> FsResult<FileAttr>;

    /// Remove a file and free its content.
    async fn unlink(&self, path: &Path) -> FsResult<()>;

    /// Rename a file, replacing any file already at `to`.
    async fn rename(&self, from: &Path, to: &Path) -> FsResult<()>;

    // ========================================================================
    // Mapping
    // ========================================================================

    /// Resolve the page behind a faulting offset of a mapped file.
    async fn mmap_fault(&self, path: &Path, offset: u64) -> FsResult<PageHandle>;

    // ========================================================================
    // Metadata
    // ========================================================================

    /// Get filesystem statistics.
    async fn statfs(&self) -> FsResult<StatFs>;

    // ========================================================================
    // Convenience methods (default implementations)
    // ========================================================================

    /// Check if a path exists.
    async fn exists(&self, path: &Path) -> bool {
        self.getattr(path).await.is_ok()
    }

    /// Read entire file contents.
    async fn read_all(&self, path: &Path) -> FsResult<Vec<u8>> {
        let attr = self.getattr(path).await?;
        let size = u32::try_from(attr.size).unwrap_or(u32::MAX);
        self.read(path, 0, size).await
    }
}
