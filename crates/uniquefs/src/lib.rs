//! # uniquefs
//!
//! A minimal volatile file store. Each loaded module admits a bounded number
//! of mounted namespaces; each namespace is a single flat directory holding a
//! capped number of regular files whose bytes live only in memory pages.
//!
//! Key components:
//!
//! - [`QuotaPool`] - module-wide mount budget, reserved per mount for life
//! - [`EntryGate`] - per-directory file cap and name-length check
//! - [`PagedStore`] - a file's content as a chain of fixed-size pages
//! - [`fault::resolve`] - offset to pinned page, for memory-mapped access
//! - [`Namespace`] - one mounted instance, exposed through [`FsOps`]
//! - [`MountTable`] - routes absolute paths to mounted namespaces
//!
//! ## Design Decisions
//!
//! - **Page-at-a-time growth**: writes append whole pages at the tail and
//!   never copy existing content.
//! - **One lock per file**: read, write and fault resolution serialize on the
//!   file's store lock; files never lock each other.
//! - **Quota held for the module's lifetime**: unmount keeps its unit so a
//!   remount loop cannot exceed the configured capacity.

pub mod config;
pub mod error;
pub mod fault;
pub mod gate;
pub mod module;
pub mod mount;
pub mod namespace;
pub mod node;
pub mod ops;
pub mod page;
pub mod quota;
pub mod store;
pub mod types;

pub use config::{ConfigError, FsConfig};
pub use error::{FsError, FsResult};
pub use gate::EntryGate;
pub use module::UniqueFs;
pub use mount::{MountInfo, MountTable};
pub use namespace::Namespace;
pub use node::FileNode;
pub use ops::FsOps;
pub use page::{PageBudget, PageFrame, PageHandle};
pub use quota::QuotaPool;
pub use store::PagedStore;
pub use types::{DirEntry, FileAttr, FileType, StatFs};
