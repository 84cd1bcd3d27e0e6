//! Paged content store.
//!
//! A file's bytes live in an ordered chain of fixed-size pages: page `k` backs
//! `[k * page_size, (k + 1) * page_size)`. The chain grows one page at a time
//! at the tail and never moves or copies existing pages.
//!
//! Invariants, checked by the tests below:
//!
//! - A live store always holds at least one page, even at size zero.
//! - With `logical_size > 0` it holds exactly `ceil(logical_size / page_size)`
//!   pages.
//! - `logical_size` only grows.
//! - Bytes at or past `logical_size` are never returned by [`PagedStore::read`].
//!
//! The store itself is not synchronized; [`FileNode`](crate::node::FileNode)
//! wraps it in the per-file lock.

use std::sync::Arc;
use tracing::{trace, warn};

use crate::error::{FsError, FsResult};
use crate::page::{PageBudget, PageFrame, PageHandle};

/// Content of one regular file.
#[derive(Debug)]
pub struct PagedStore {
    pages: Vec<Arc<PageFrame>>,
    logical_size: u64,
    page_size: usize,
    budget: Arc<PageBudget>,
    destroyed: bool,
}

impl PagedStore {
    /// Build a store with its first page allocated.
    ///
    /// Nothing is left behind on failure: the budget charge for the first
    /// page is undone before the error surfaces.
    pub fn create(budget: &Arc<PageBudget>, page_size: usize) -> FsResult<Self> {
        debug_assert!(page_size.is_power_of_two());
        let first = budget.allocate(0, page_size)?;
        Ok(Self {
            pages: vec![first],
            logical_size: 0,
            page_size,
            budget: Arc::clone(budget),
            destroyed: false,
        })
    }

    /// Read up to `len` bytes starting at `offset`.
    ///
    /// Clipped at the logical size; an offset at or past the end yields an
    /// empty buffer.
    pub fn read(&self, offset: u64, len: usize) -> FsResult<Vec<u8>> {
        self.ensure_live()?;
        if offset >= self.logical_size {
            return Ok(Vec::new());
        }
        let available = self.logical_size - offset;
        let len = (len as u64).min(available) as usize;

        let mut out = vec![0u8; len];
        let mut done = 0;
        while done < len {
            let pos = offset as usize + done;
            let (index, in_page) = self.locate(pos);
            let chunk = (self.page_size - in_page).min(len - done);
            self.pages[index].read_into(in_page, &mut out[done..done + chunk]);
            done += chunk;
        }
        Ok(out)
    }

    /// Write `data` at `offset`, growing the chain as needed.
    ///
    /// If any page cannot be appended the write fails as a whole: pages added
    /// by this call are released, committed bytes and the logical size stay
    /// as they were.
    pub fn write(&mut self, offset: u64, data: &[u8]) -> FsResult<usize> {
        self.ensure_live()?;
        if data.is_empty() {
            return Ok(0);
        }
        let end = offset
            .checked_add(data.len() as u64)
            .and_then(|end| usize::try_from(end).ok())
            .ok_or(FsError::OutOfRange {
                offset,
                size: self.logical_size,
            })?;

        self.grow_to(end)?;

        let mut done = 0;
        while done < data.len() {
            let pos = offset as usize + done;
            let (index, in_page) = self.locate(pos);
            let chunk = (self.page_size - in_page).min(data.len() - done);
            self.pages[index].write_from(in_page, &data[done..done + chunk]);
            done += chunk;
        }

        self.logical_size = self.logical_size.max(end as u64);
        trace!(offset, len = data.len(), size = self.logical_size, "store write");
        Ok(data.len())
    }

    /// Page covering `offset`, or `None` at or past the logical end.
    pub fn page_for_offset(&self, offset: u64) -> Option<PageHandle> {
        if self.destroyed || offset >= self.logical_size {
            return None;
        }
        let (index, _) = self.locate(offset as usize);
        let page_start = (index * self.page_size) as u64;
        let valid_len = (self.logical_size - page_start).min(self.page_size as u64) as usize;
        Some(PageHandle::new(
            Arc::clone(&self.pages[index]),
            index,
            self.page_size,
            valid_len,
        ))
    }

    /// Drop every page. Returns the number of pages released.
    ///
    /// A second call finds nothing to free and returns 0.
    pub fn destroy(&mut self) -> usize {
        if self.destroyed {
            return 0;
        }
        let freed = self.pages.len();
        self.pages.clear();
        self.destroyed = true;
        self.logical_size = 0;
        freed
    }

    pub fn logical_size(&self) -> u64 {
        self.logical_size
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Allocated bytes (`page_count * page_size`).
    pub fn capacity(&self) -> usize {
        self.pages.len() * self.page_size
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    fn ensure_live(&self) -> FsResult<()> {
        if self.destroyed {
            return Err(FsError::not_found("content store already released"));
        }
        Ok(())
    }

    fn locate(&self, pos: usize) -> (usize, usize) {
        (pos / self.page_size, pos % self.page_size)
    }

    /// Append pages one by one until `end` bytes fit.
    fn grow_to(&mut self, end: usize) -> FsResult<()> {
        let required = end.div_ceil(self.page_size);
        let before = self.pages.len();
        while self.pages.len() < required {
            match self.budget.allocate(self.pages.len(), self.page_size) {
                Ok(frame) => self.pages.push(frame),
                Err(e) => {
                    let added = self.pages.len() - before;
                    self.pages.truncate(before);
                    warn!(
                        required,
                        added,
                        kept = before,
                        "page append failed, write abandoned"
                    );
                    return Err(e);
                }
            }
        }
        Ok(())
    }
}
