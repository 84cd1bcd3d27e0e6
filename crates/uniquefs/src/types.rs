//! Attribute and listing types handed back to the host.

use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// Magic number identifying the filesystem type in `statfs`.
pub const UNIQUEFS_MAGIC: u64 = 0x5546_5331;

/// File type enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileType {
    /// Regular file.
    File,
    /// Directory. Only the namespace root exists.
    Directory,
}

impl FileType {
    /// Returns true if this is a regular file.
    pub fn is_file(&self) -> bool {
        matches!(self, FileType::File)
    }

    /// Returns true if this is a directory.
    pub fn is_dir(&self) -> bool {
        matches!(self, FileType::Directory)
    }
}

/// File attributes (metadata).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileAttr {
    /// Inode number, unique within the module.
    pub ino: u64,
    /// Logical size in bytes.
    pub size: u64,
    /// Backing pages in use.
    pub blocks: u64,
    /// File type.
    pub kind: FileType,
    /// Unix permissions (e.g., 0o644).
    pub perm: u32,
    /// Last modification time.
    pub mtime: SystemTime,
    /// Last access time.
    pub atime: Option<SystemTime>,
    /// Last status change time.
    pub ctime: Option<SystemTime>,
    /// Number of hard links.
    pub nlink: u32,
}

impl FileAttr {
    /// Create attributes for a new file.
    pub fn file(size: u64, perm: u32) -> Self {
        let now = SystemTime::now();
        Self {
            ino: 0,
            size,
            blocks: 0,
            kind: FileType::File,
            perm,
            mtime: now,
            atime: Some(now),
            ctime: Some(now),
            nlink: 1,
        }
    }

    /// Create attributes for a directory.
    pub fn directory(perm: u32) -> Self {
        let now = SystemTime::now();
        Self {
            ino: 0,
            size: 0,
            blocks: 0,
            kind: FileType::Directory,
            perm,
            mtime: now,
            atime: Some(now),
            ctime: Some(now),
            nlink: 2, // . and ..
        }
    }

    /// Returns true if this is a regular file.
    pub fn is_file(&self) -> bool {
        self.kind.is_file()
    }

    /// Returns true if this is a directory.
    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }
}

/// Directory entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    /// Entry name (not full path).
    pub name: String,
    /// Entry type.
    pub kind: FileType,
    /// Inode number.
    pub ino: u64,
}

impl DirEntry {
    /// Create a file entry.
    pub fn file(name: impl Into<String>, ino: u64) -> Self {
        Self {
            name: name.into(),
            kind: FileType::File,
            ino,
        }
    }

    /// Create a directory entry.
    pub fn directory(name: impl Into<String>, ino: u64) -> Self {
        Self {
            name: name.into(),
            kind: FileType::Directory,
            ino,
        }
    }
}

/// Filesystem statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatFs {
    /// Filesystem magic number.
    pub magic: u64,
    /// Pages in use by this namespace.
    pub blocks: u64,
    /// Pages still allocatable, if the module has a page budget.
    pub bfree: Option<u64>,
    /// File slots in the root directory.
    pub files: u64,
    /// Free file slots.
    pub ffree: u64,
    /// Block size (the page size).
    pub bsize: u32,
    /// Maximum name length.
    pub namelen: u32,
}
