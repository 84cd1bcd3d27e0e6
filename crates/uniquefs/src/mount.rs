//! Host-side mount table with longest-prefix routing.
//!
//! Stands in for the host's path walk: absolute paths are routed to the
//! namespace mounted at the longest matching prefix, and the remainder is
//! handed to that namespace as a root-relative path.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use crate::error::{FsError, FsResult};
use crate::module::UniqueFs;
use crate::namespace::Namespace;
use crate::ops::FsOps;
use crate::page::PageHandle;
use crate::types::{DirEntry, FileAttr, StatFs};

/// Information about a mount point.
#[derive(Debug, Clone)]
pub struct MountInfo {
    /// The mount path (e.g., "/mnt/unique").
    pub path: PathBuf,
    /// Namespace identifier within its module.
    pub mount_id: u64,
    /// Files currently in the namespace.
    pub entries: usize,
}

/// Routes filesystem operations to mounted namespaces.
///
/// If `/mnt` and `/mnt/a` are both mounted, `/mnt/a/file` goes to `/mnt/a`.
pub struct MountTable {
    /// Mount points, keyed by normalized path.
    mounts: RwLock<BTreeMap<PathBuf, Arc<Namespace>>>,
}

impl std::fmt::Debug for MountTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MountTable")
            .field("mounts", &"<locked>")
            .finish()
    }
}

impl Default for MountTable {
    fn default() -> Self {
        Self::new()
    }
}

impl MountTable {
    /// Create a new empty mount table.
    pub fn new() -> Self {
        Self {
            mounts: RwLock::new(BTreeMap::new()),
        }
    }

    /// Attach an already mounted namespace at `path`.
    pub async fn attach(&self, path: impl Into<PathBuf>, ns: Arc<Namespace>) -> FsResult<()> {
        let path = Self::normalize_mount_path(path.into());
        let mut mounts = self.mounts.write().await;
        if mounts.contains_key(&path) {
            return Err(FsError::already_exists(path.display().to_string()));
        }
        info!(path = %path.display(), mount = ns.id(), "namespace attached");
        mounts.insert(path, ns);
        Ok(())
    }

    /// Mount a new namespace of `fs` at `path`, reserving a quota unit.
    pub async fn mount(&self, path: impl Into<PathBuf>, fs: &UniqueFs) -> FsResult<Arc<Namespace>> {
        let path = Self::normalize_mount_path(path.into());
        let mut mounts = self.mounts.write().await;
        if mounts.contains_key(&path) {
            return Err(FsError::already_exists(path.display().to_string()));
        }
        let ns = fs.mount()?;
        info!(path = %path.display(), mount = ns.id(), "namespace mounted");
        mounts.insert(path, Arc::clone(&ns));
        Ok(ns)
    }

    /// Unmount the namespace at `path` and free its files.
    pub async fn unmount(&self, path: impl AsRef<Path>) -> FsResult<()> {
        let path = Self::normalize_mount_path(path.as_ref().to_path_buf());
        let ns = self
            .mounts
            .write()
            .await
            .remove(&path)
            .ok_or_else(|| FsError::no_mount_point(path.display().to_string()))?;
        ns.unmount()
    }

    /// List all current mounts.
    pub async fn list_mounts(&self) -> Vec<MountInfo> {
        let mounts = self.mounts.read().await;
        mounts
            .iter()
            .map(|(path, ns)| MountInfo {
                path: path.clone(),
                mount_id: ns.id(),
                entries: ns.entry_count(),
            })
            .collect()
    }

    /// Normalize a mount path: ensure it starts with `/` and has no trailing slash.
    fn normalize_mount_path(path: PathBuf) -> PathBuf {
        let s = path.to_string_lossy();
        let s = s.trim_end_matches('/');
        if s.is_empty() {
            PathBuf::from("/")
        } else if !s.starts_with('/') {
            PathBuf::from(format!("/{}", s))
        } else {
            PathBuf::from(s)
        }
    }

    /// Find the namespace serving `path` and the path relative to it.
    async fn find_mount(&self, path: &Path) -> FsResult<(Arc<Namespace>, PathBuf)> {
        let absolute = Path::new("/").join(path);
        let mounts = self.mounts.read().await;

        // Longest match wins; `strip_prefix` compares whole components.
        let best = mounts
            .iter()
            .filter_map(|(mount_path, ns)| {
                absolute
                    .strip_prefix(mount_path)
                    .ok()
                    .map(|rest| (mount_path.components().count(), ns, rest.to_path_buf()))
            })
            .max_by_key(|(depth, _, _)| *depth)
            .map(|(_, ns, rest)| (Arc::clone(ns), rest));

        best.ok_or_else(|| FsError::no_mount_point(path.display().to_string()))
    }

    /// List the root directory, synthesizing entries from mount points.
    async fn list_root(&self) -> FsResult<Vec<DirEntry>> {
        let mounts = self.mounts.read().await;
        let mut entries = Vec::new();
        let mut seen = BTreeSet::new();

        for (mount_path, ns) in mounts.iter() {
            if mount_path.as_os_str() == "/" {
                for entry in ns.readdir(Path::new("")).await? {
                    if seen.insert(entry.name.clone()) {
                        entries.push(entry);
                    }
                }
            } else if let Some(first) = mount_path.iter().nth(1) {
                let first = first.to_string_lossy().into_owned();
                if seen.insert(first.clone()) {
                    entries.push(DirEntry::directory(first, 0));
                }
            }
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn is_root(path: &Path) -> bool {
        let s = path.to_string_lossy();
        s.is_empty() || s == "/"
    }
}

#[async_trait]
impl FsOps for MountTable {
    async fn getattr(&self, path: &Path) -> FsResult<FileAttr> {
        if Self::is_root(path) {
            let root_mounted = self.mounts.read().await.get(Path::new("/")).cloned();
            return match root_mounted {
                Some(ns) => ns.getattr(Path::new("")).await,
                None => Ok(FileAttr::directory(0o755)),
            };
        }
        let (ns, relative) = self.find_mount(path).await?;
        ns.getattr(&relative).await
    }

    async fn readdir(&self, path: &Path) -> FsResult<Vec<DirEntry>> {
        if Self::is_root(path) {
            return self.list_root().await;
        }
        let (ns, relative) = self.find_mount(path).await?;
        ns.readdir(&relative).await
    }

    async fn read(&self, path: &Path, offset: u64, size: u32) -> FsResult<Vec<u8>> {
        let (ns, relative) = self.find_mount(path).await?;
        ns.read(&relative, offset, size).await
    }

    async fn write(&self, path: &Path, offset: u64, data: &[u8]) -> FsResult<u32> {
        let (ns, relative) = self.find_mount(path).await?;
        ns.write(&relative, offset, data).await
    }

    async fn create(&self, path: &Path, mode: u32) -> FsResult<FileAttr> {
        let (ns, relative) = self.find_mount(path).await?;
        ns.create(&relative, mode).await
    }

    async fn unlink(&self, path: &Path) -> FsResult<()> {
        let (ns, relative) = self.find_mount(path).await?;
        ns.unlink(&relative).await
    }

    async fn rename(&self, from: &Path, to: &Path) -> FsResult<()> {
        let (from_ns, from_relative) = self.find_mount(from).await?;
        let (to_ns, to_relative) = self.find_mount(to).await?;

        if !Arc::ptr_eq(&from_ns, &to_ns) {
            return Err(FsError::CrossDeviceLink);
        }

        from_ns.rename(&from_relative, &to_relative).await
    }

    async fn mmap_fault(&self, path: &Path, offset: u64) -> FsResult<PageHandle> {
        let (ns, relative) = self.find_mount(path).await?;
        ns.mmap_fault(&relative, offset).await
    }

    async fn statfs(&self) -> FsResult<StatFs> {
        let root_mounted = self.mounts.read().await.get(Path::new("/")).cloned();
        match root_mounted {
            Some(ns) => ns.statfs().await,
            None => Err(FsError::no_mount_point("/")),
        }
    }
}
