//! Per-directory admission control.
//!
//! The gate lives inside the directory's entry table and is only touched
//! while that table's lock is held, so the count and the table never disagree.

use crate::error::{FsError, FsResult};

/// File-count cap and name-length check for one directory.
#[derive(Debug, Clone)]
pub struct EntryGate {
    entry_count: usize,
    max_entries: usize,
    name_max: usize,
}

impl EntryGate {
    pub fn new(max_entries: usize, name_max: usize) -> Self {
        Self {
            entry_count: 0,
            max_entries,
            name_max,
        }
    }

    /// True while another file fits in the directory.
    pub fn can_create(&self) -> bool {
        self.entry_count < self.max_entries
    }

    /// Like [`can_create`](Self::can_create), as an error.
    pub fn check_capacity(&self) -> FsResult<()> {
        if self.can_create() {
            Ok(())
        } else {
            Err(FsError::CapacityExceeded {
                count: self.entry_count,
                max: self.max_entries,
            })
        }
    }

    /// Count a file whose content store is fully built.
    pub fn register_created(&mut self) {
        debug_assert!(self.entry_count < self.max_entries);
        self.entry_count += 1;
    }

    /// Release a slot after the file's pages have been freed.
    pub fn register_removed(&mut self) {
        debug_assert!(self.entry_count > 0);
        self.entry_count = self.entry_count.saturating_sub(1);
    }

    /// Reject names that are not a single path component, or longer than the
    /// limit. Used by both create and rename.
    pub fn validate_name(&self, name: &str) -> FsResult<()> {
        if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\0']) {
            return Err(FsError::invalid_path(name));
        }
        if name.len() > self.name_max {
            return Err(FsError::NameTooLong {
                len: name.len(),
                max: self.name_max,
            });
        }
        Ok(())
    }

    pub fn entry_count(&self) -> usize {
        self.entry_count
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn name_max(&self) -> usize {
        self.name_max
    }

    /// Free slots left.
    pub fn free_slots(&self) -> usize {
        self.max_entries - self.entry_count
    }
}
