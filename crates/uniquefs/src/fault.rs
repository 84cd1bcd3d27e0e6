//! Page-fault resolution for memory-mapped files.
//!
//! The host's generic paging code asks for the page behind a faulting file
//! offset and maps its buffer directly; nothing is copied here. The returned
//! [`PageHandle`] carries its own reference to the frame, so it stays valid
//! after the file lock is dropped, even if a writer grows the chain or the
//! file is unlinked while the mapping is live.

use tracing::trace;

use crate::error::{FsError, FsResult};
use crate::node::FileNode;
use crate::page::PageHandle;

/// Resolve the page backing `offset` in `file`.
///
/// Fails with `OutOfRange` at or past the logical end and `NotFound` if the
/// file's pages were already released.
pub fn resolve(file: &FileNode, offset: u64) -> FsResult<PageHandle> {
    let store = file.lock_shared();
    if store.is_destroyed() {
        return Err(FsError::not_found(format!("inode {}", file.ino())));
    }
    let size = store.logical_size();
    let handle = store
        .page_for_offset(offset)
        .ok_or(FsError::OutOfRange { offset, size })?;
    trace!(ino = file.ino(), offset, page = handle.index(), "fault resolved");
    Ok(handle)
}
