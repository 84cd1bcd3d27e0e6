//! Filesystem error types.

use std::io;
use thiserror::Error;

/// Filesystem error type.
///
/// Every variant is reported synchronously to the caller of the operation
/// that triggered it. Nothing in this crate retries internally.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FsError {
    /// The module-wide quota pool has no units left for another mount.
    #[error("quota exceeded: no mount units left")]
    QuotaExceeded,

    /// The directory already holds its maximum number of files.
    #[error("directory full: {count} of {max} entries in use")]
    CapacityExceeded { count: usize, max: usize },

    /// File name exceeds the configured limit.
    #[error("file name too long: {len} > {max}")]
    NameTooLong { len: usize, max: usize },

    /// A backing page could not be allocated.
    #[error("out of memory allocating page {page}")]
    OutOfMemory { page: usize },

    /// Offset lies at or past the logical end of the file.
    #[error("offset {offset} out of range (size {size})")]
    OutOfRange { offset: u64, size: u64 },

    /// A single write larger than the host boundary can report.
    #[error("write of {len} bytes exceeds the {max}-byte limit")]
    WriteTooLarge { len: usize, max: u64 },

    /// File, or the backing store of a file, does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Name already in use.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Expected a regular file.
    #[error("is a directory: {0}")]
    IsADirectory(String),

    /// Operation not permitted (non-regular create, nested paths).
    #[error("operation not permitted: {0}")]
    NotPermitted(String),

    /// Invalid path.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// No mounted namespace serves this path.
    #[error("no mount point for path: {0}")]
    NoMountPoint(String),

    /// Rename across two mounted namespaces.
    #[error("cross-device link")]
    CrossDeviceLink,

    /// Resource still in use (teardown with live mounts).
    #[error("busy: {0}")]
    Busy(String),
}

impl FsError {
    /// Create a NotFound error.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    /// Create an AlreadyExists error.
    pub fn already_exists(path: impl Into<String>) -> Self {
        Self::AlreadyExists(path.into())
    }

    /// Create an IsADirectory error.
    pub fn is_a_directory(path: impl Into<String>) -> Self {
        Self::IsADirectory(path.into())
    }

    /// Create a NotPermitted error.
    pub fn not_permitted(msg: impl Into<String>) -> Self {
        Self::NotPermitted(msg.into())
    }

    /// Create an InvalidPath error.
    pub fn invalid_path(path: impl Into<String>) -> Self {
        Self::InvalidPath(path.into())
    }

    /// Create a NoMountPoint error.
    pub fn no_mount_point(path: impl Into<String>) -> Self {
        Self::NoMountPoint(path.into())
    }

    /// POSIX errno a kernel binding would hand back for this error.
    pub fn errno(&self) -> i32 {
        match self {
            FsError::QuotaExceeded => libc::ENOSPC,
            // The module answers a full directory with EPERM, not ENOSPC.
            FsError::CapacityExceeded { .. } => libc::EPERM,
            FsError::NameTooLong { .. } => libc::ENAMETOOLONG,
            FsError::OutOfMemory { .. } => libc::ENOMEM,
            FsError::OutOfRange { .. } => libc::EFAULT,
            FsError::WriteTooLarge { .. } => libc::EFBIG,
            FsError::NotFound(_) => libc::ENOENT,
            FsError::AlreadyExists(_) => libc::EEXIST,
            FsError::IsADirectory(_) => libc::EISDIR,
            FsError::NotPermitted(_) => libc::EPERM,
            FsError::InvalidPath(_) => libc::EINVAL,
            FsError::NoMountPoint(_) => libc::ENODEV,
            FsError::CrossDeviceLink => libc::EXDEV,
            FsError::Busy(_) => libc::EBUSY,
        }
    }
}

/// Convert FsError to std::io::Error for compatibility.
impl From<FsError> for io::Error {
    fn from(e: FsError) -> Self {
        let kind = match &e {
            FsError::QuotaExceeded | FsError::CapacityExceeded { .. } => {
                io::ErrorKind::StorageFull
            }
            FsError::NameTooLong { .. } | FsError::InvalidPath(_) => io::ErrorKind::InvalidInput,
            FsError::OutOfMemory { .. } => io::ErrorKind::OutOfMemory,
            FsError::OutOfRange { .. } => io::ErrorKind::UnexpectedEof,
            FsError::WriteTooLarge { .. } => io::ErrorKind::FileTooLarge,
            FsError::NotFound(_) | FsError::NoMountPoint(_) => io::ErrorKind::NotFound,
            FsError::AlreadyExists(_) => io::ErrorKind::AlreadyExists,
            FsError::IsADirectory(_) => io::ErrorKind::IsADirectory,
            FsError::NotPermitted(_) => io::ErrorKind::PermissionDenied,
            FsError::CrossDeviceLink => io::ErrorKind::CrossesDevices,
            FsError::Busy(_) => io::ErrorKind::ResourceBusy,
        };
        io::Error::new(kind, e)
    }
}

/// Filesystem result type.
pub type FsResult<T> = Result<T, FsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errno_mapping() {
        assert_eq!(FsError::QuotaExceeded.errno(), libc::ENOSPC);
        assert_eq!(
            FsError::CapacityExceeded { count: 1, max: 1 }.errno(),
            libc::EPERM
        );
        assert_eq!(
            FsError::NameTooLong { len: 33, max: 32 }.errno(),
            libc::ENAMETOOLONG
        );
        assert_eq!(FsError::OutOfMemory { page: 0 }.errno(), libc::ENOMEM);
        assert_eq!(FsError::CrossDeviceLink.errno(), libc::EXDEV);
        assert_eq!(
            FsError::WriteTooLarge { len: 1, max: 0 }.errno(),
            libc::EFBIG
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let err: io::Error = FsError::not_found("a.txt").into();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert!(err.to_string().contains("a.txt"));

        let err: io::Error = FsError::already_exists("b").into();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
    }

    #[test]
    fn test_display() {
        let err = FsError::OutOfRange { offset: 10, size: 10 };
        assert_eq!(err.to_string(), "offset 10 out of range (size 10)");
    }
}
