//! Backing pages.
//!
//! A [`PageFrame`] owns one fixed-size, zero-initialized buffer. Frames are
//! reference counted: the content store holds one reference per page, and a
//! [`PageHandle`] returned by fault resolution holds another, which is what
//! pins the page for the duration of a mapping fault.
//!
//! Every frame is charged against a module-wide [`PageBudget`] and credited
//! back when its last reference drops.

use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::warn;

use crate::error::{FsError, FsResult};

/// Fallback when the host page size cannot be queried.
pub const FALLBACK_PAGE_SIZE: usize = 4096;

/// Host page size.
pub fn system_page_size() -> usize {
    // SAFETY: sysconf has no preconditions; it returns -1 on failure.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 && (size as usize).is_power_of_two() {
        size as usize
    } else {
        FALLBACK_PAGE_SIZE
    }
}

/// Module-wide page allocator accounting.
#[derive(Debug)]
pub struct PageBudget {
    live: AtomicUsize,
    max_pages: Option<usize>,
}

impl PageBudget {
    pub fn new(max_pages: Option<usize>) -> Arc<Self> {
        Arc::new(Self {
            live: AtomicUsize::new(0),
            max_pages,
        })
    }

    /// Unbounded budget.
    pub fn unlimited() -> Arc<Self> {
        Self::new(None)
    }

    /// Pages currently allocated.
    pub fn live_pages(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    pub fn max_pages(&self) -> Option<usize> {
        self.max_pages
    }

    /// Allocate a zeroed frame of `page_size` bytes.
    ///
    /// `index` is only used to describe the failure.
    pub fn allocate(self: &Arc<Self>, index: usize, page_size: usize) -> FsResult<Arc<PageFrame>> {
        self.charge(index)?;

        let mut buf: Vec<u8> = Vec::new();
        if buf.try_reserve_exact(page_size).is_err() {
            self.credit();
            warn!(page = index, page_size, "heap refused page allocation");
            return Err(FsError::OutOfMemory { page: index });
        }
        buf.resize(page_size, 0);

        Ok(Arc::new(PageFrame {
            data: Mutex::new(buf.into_boxed_slice()),
            budget: Arc::clone(self),
        }))
    }

    fn charge(&self, index: usize) -> FsResult<()> {
        let Some(max) = self.max_pages else {
            self.live.fetch_add(1, Ordering::AcqRel);
            return Ok(());
        };
        self.live
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |live| {
                (live < max).then_some(live + 1)
            })
            .map(|_| ())
            .map_err(|live| {
                warn!(page = index, live, max, "page budget exhausted");
                FsError::OutOfMemory { page: index }
            })
    }

    fn credit(&self) {
        self.live.fetch_sub(1, Ordering::AcqRel);
    }
}

/// One fixed-size backing buffer.
#[derive(Debug)]
pub struct PageFrame {
    data: Mutex<Box<[u8]>>,
    budget: Arc<PageBudget>,
}

impl PageFrame {
    /// Capacity in bytes.
    pub fn len(&self) -> usize {
        self.data.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy `dst.len()` bytes starting at `offset` within the page.
    pub(crate) fn read_into(&self, offset: usize, dst: &mut [u8]) {
        let data = self.data.lock();
        dst.copy_from_slice(&data[offset..offset + dst.len()]);
    }

    /// Copy `src` into the page starting at `offset`.
    pub(crate) fn write_from(&self, offset: usize, src: &[u8]) {
        let mut data = self.data.lock();
        data[offset..offset + src.len()].copy_from_slice(src);
    }
}

impl Drop for PageFrame {
    fn drop(&mut self) {
        self.budget.credit();
    }
}

/// A pinned reference to the page backing one faulting offset.
///
/// Holding the handle keeps the frame alive even if the file is unlinked or
/// unmounted meanwhile. Writes through [`with_mapped_mut`](Self::with_mapped_mut)
/// land directly in the file's content; they never change its logical size.
///
/// The frame lock is held only for the duration of one accessor call, so a
/// live handle never stalls reads, writes or faults on the file. The closure
/// must not call back into the same file.
#[derive(Debug, Clone)]
pub struct PageHandle {
    frame: Arc<PageFrame>,
    index: usize,
    page_size: usize,
    valid_len: usize,
}

impl PageHandle {
    pub(crate) fn new(
        frame: Arc<PageFrame>,
        index: usize,
        page_size: usize,
        valid_len: usize,
    ) -> Self {
        Self {
            frame,
            index,
            page_size,
            valid_len,
        }
    }

    /// Position of the page in the file's chain.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Byte offset in the file where this page starts.
    pub fn file_offset(&self) -> u64 {
        (self.index * self.page_size) as u64
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Bytes of this page inside the file's logical size when resolved.
    pub fn valid_len(&self) -> usize {
        self.valid_len
    }

    /// Run `f` over the whole page buffer.
    pub fn with_mapped<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        let data = self.frame.data.lock();
        f(&data[..])
    }

    /// Run `f` over the whole page buffer, mutably.
    pub fn with_mapped_mut<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        let mut data = self.frame.data.lock();
        f(&mut data[..])
    }

    /// Copy of the valid bytes.
    pub fn to_vec(&self) -> Vec<u8> {
        self.with_mapped(|buf| buf[..self.valid_len].to_vec())
    }

    /// Number of live references to the frame, including this one.
    pub fn pin_count(&self) -> usize {
        Arc::strong_count(&self.frame)
    }

    /// True if both handles refer to the same frame.
    pub fn same_frame(&self, other: &PageHandle) -> bool {
        Arc::ptr_eq(&self.frame, &other.frame)
    }
}
