//! One mounted namespace: a flat root directory of regular files.
//!
//! The root directory's entry table and its [`EntryGate`] share one lock, so
//! the file count can never drift from the table under concurrent create and
//! unlink. Content I/O takes only the per-file lock.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::{Component, Path};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, warn};

use crate::error::{FsError, FsResult};
use crate::fault;
use crate::gate::EntryGate;
use crate::module::ModuleShared;
use crate::node::FileNode;
use crate::ops::FsOps;
use crate::page::PageHandle;
use crate::store::PagedStore;
use crate::types::{DirEntry, FileAttr, StatFs, UNIQUEFS_MAGIC};

/// File-type bits of a mode.
const S_IFMT: u32 = 0o170000;
/// Regular-file type bits.
const S_IFREG: u32 = 0o100000;

/// Root directory state, guarded as a unit.
#[derive(Debug)]
struct RootDir {
    ino: u64,
    perm: u32,
    mtime: SystemTime,
    ctime: SystemTime,
    files: BTreeMap<String, Arc<FileNode>>,
    gate: EntryGate,
    mounted: bool,
}

impl RootDir {
    fn touch(&mut self) {
        let now = SystemTime::now();
        self.mtime = now;
        self.ctime = now;
    }
}

/// A mounted instance of the filesystem.
#[derive(Debug)]
pub struct Namespace {
    id: u64,
    module: Arc<ModuleShared>,
    root: Mutex<RootDir>,
}

impl Namespace {
    pub(crate) fn new(module: Arc<ModuleShared>, id: u64) -> Self {
        let now = SystemTime::now();
        let root = RootDir {
            ino: module.next_ino(),
            perm: module.config.default_mode,
            mtime: now,
            ctime: now,
            files: BTreeMap::new(),
            gate: EntryGate::new(module.config.max_entries(), module.config.name_max),
            mounted: true,
        };
        Self {
            id,
            module,
            root: Mutex::new(root),
        }
    }

    /// Mount identifier, unique within the module.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_mounted(&self) -> bool {
        self.root.lock().mounted
    }

    /// Files currently in the root directory.
    pub fn entry_count(&self) -> usize {
        self.root.lock().gate.entry_count()
    }

    /// Cap on files in the root directory.
    pub fn max_entries(&self) -> usize {
        self.root.lock().gate.max_entries()
    }

    pub fn page_size(&self) -> usize {
        self.module.page_size
    }

    /// Create a regular file in the root directory.
    ///
    /// A full directory is reported before an over-long name. The directory
    /// count is bumped only once the file's first page exists; an allocation
    /// failure leaves the directory untouched.
    #[tracing::instrument(skip(self), fields(mount = self.id), name = "uniquefs.create")]
    pub fn create_file(&self, name: &str, mode: u32) -> FsResult<Arc<FileNode>> {
        let file_type = mode & S_IFMT;
        if file_type != 0 && file_type != S_IFREG {
            return Err(FsError::not_permitted(format!(
                "only regular files can be created (mode {mode:o})"
            )));
        }

        let mut root = self.root.lock();
        self.ensure_mounted(&root)?;
        if root.files.contains_key(name) {
            return Err(FsError::already_exists(name));
        }
        root.gate.check_capacity().inspect_err(|e| debug!("{e}"))?;
        root.gate.validate_name(name).inspect_err(|e| debug!("{e}"))?;

        let store = PagedStore::create(&self.module.budget, self.module.page_size)?;
        let node = Arc::new(FileNode::new(self.module.next_ino(), mode & 0o7777, store));

        root.files.insert(name.to_string(), Arc::clone(&node));
        root.gate.register_created();
        root.touch();
        debug!(ino = node.ino(), entries = root.gate.entry_count(), "file created");
        Ok(node)
    }

    /// Look up a file by name.
    pub fn lookup(&self, name: &str) -> FsResult<Arc<FileNode>> {
        let root = self.root.lock();
        self.ensure_mounted(&root)?;
        root.files
            .get(name)
            .cloned()
            .ok_or_else(|| FsError::not_found(name))
    }

    /// Remove a file and free its pages.
    ///
    /// The entry leaves the table and its pages are released before the slot
    /// is handed back, all under the directory lock. Of two racing unlinks of
    /// the same name exactly one succeeds.
    #[tracing::instrument(skip(self), fields(mount = self.id), name = "uniquefs.unlink")]
    pub fn unlink_file(&self, name: &str) -> FsResult<()> {
        let mut root = self.root.lock();
        self.ensure_mounted(&root)?;
        let node = root
            .files
            .remove(name)
            .ok_or_else(|| FsError::not_found(name))?;
        let freed = node.destroy();
        root.gate.register_removed();
        root.touch();
        debug!(ino = node.ino(), freed, "file unlinked");
        Ok(())
    }

    /// Rename `from` to `to`, replacing an existing `to`.
    ///
    /// Only the new name is checked against the length limit.
    #[tracing::instrument(skip(self), fields(mount = self.id), name = "uniquefs.rename")]
    pub fn rename_file(&self, from: &str, to: &str) -> FsResult<()> {
        let mut root = self.root.lock();
        self.ensure_mounted(&root)?;
        root.gate.validate_name(to).inspect_err(|e| debug!("{e}"))?;
        if !root.files.contains_key(from) {
            return Err(FsError::not_found(from));
        }
        if from == to {
            return Ok(());
        }

        if let Some(replaced) = root.files.remove(to) {
            let freed = replaced.destroy();
            root.gate.register_removed();
            debug!(ino = replaced.ino(), freed, "rename replaced target");
        }
        if let Some(node) = root.files.remove(from) {
            root.files.insert(to.to_string(), node);
        }
        root.touch();
        Ok(())
    }

    /// Resolve the page behind `offset` of a mapped file.
    pub fn mmap_fault_file(&self, name: &str, offset: u64) -> FsResult<PageHandle> {
        let node = self.lookup(name)?;
        fault::resolve(&node, offset)
    }

    /// Unmount: free every file and reject further operations.
    ///
    /// The quota unit taken at mount time is not returned.
    #[tracing::instrument(skip(self), fields(mount = self.id), name = "uniquefs.unmount")]
    pub fn unmount(&self) -> FsResult<()> {
        let freed = {
            let mut root = self.root.lock();
            self.ensure_mounted(&root)?;
            root.mounted = false;
            let mut freed = 0;
            for (_, node) in std::mem::take(&mut root.files) {
                freed += node.destroy();
                root.gate.register_removed();
            }
            freed
        };
        debug!(freed, "released namespace pages");
        self.module.mount_released(self.id);
        Ok(())
    }

    fn ensure_mounted(&self, root: &RootDir) -> FsResult<()> {
        if root.mounted {
            Ok(())
        } else {
            Err(FsError::no_mount_point(format!("namespace {} is unmounted", self.id)))
        }
    }

    fn root_attr(&self, root: &RootDir) -> FileAttr {
        FileAttr {
            ino: root.ino,
            size: root.files.len() as u64,
            mtime: root.mtime,
            ctime: Some(root.ctime),
            ..FileAttr::directory(root.perm)
        }
    }

    /// Map a root-relative path onto a file name; `None` is the root itself.
    ///
    /// The namespace is flat, so anything with more than one component is
    /// refused.
    fn file_name(path: &Path) -> FsResult<Option<String>> {
        let mut names = Vec::new();
        for component in path.components() {
            match component {
                Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
                Component::ParentDir => {
                    names.pop();
                }
                Component::Normal(s) => {
                    let name = s
                        .to_str()
                        .ok_or_else(|| FsError::invalid_path(path.display().to_string()))?;
                    names.push(name.to_string());
                }
            }
        }
        match names.len() {
            0 => Ok(None),
            1 => Ok(names.pop()),
            _ => Err(FsError::not_permitted(format!(
                "nested paths are not supported: {}",
                path.display()
            ))),
        }
    }

    /// Byte count as the host sees it; writes it cannot report are refused
    /// before any byte lands.
    fn reportable_len(len: usize) -> FsResult<u32> {
        u32::try_from(len).map_err(|_| FsError::WriteTooLarge {
            len,
            max: u32::MAX as u64,
        })
    }

    fn require_file_name(path: &Path) -> FsResult<String> {
        Self::file_name(path)?.ok_or_else(|| FsError::is_a_directory(path.display().to_string()))
    }
}

impl Drop for Namespace {
    fn drop(&mut self) {
        if self.root.get_mut().mounted {
            warn!(mount = self.id, "namespace dropped while mounted, unmounting");
            let _ = self.unmount();
        }
    }
}

#[async_trait]
impl FsOps for Namespace {
    async fn getattr(&self, path: &Path) -> FsResult<FileAttr> {
        match Self::file_name(path)? {
            None => {
                let root = self.root.lock();
                self.ensure_mounted(&root)?;
                Ok(self.root_attr(&root))
            }
            Some(name) => Ok(self.lookup(&name)?.attr()),
        }
    }

    async fn readdir(&self, path: &Path) -> FsResult<Vec<DirEntry>> {
        if let Some(name) = Self::file_name(path)? {
            // A file exists under that name, or nothing does.
            self.lookup(&name)?;
            return Err(FsError::not_permitted(format!("not a directory: {name}")));
        }
        let root = self.root.lock();
        self.ensure_mounted(&root)?;
        Ok(root
            .files
            .iter()
            .map(|(name, node)| DirEntry::file(name.clone(), node.ino()))
            .collect())
    }

    #[tracing::instrument(skip(self), fields(mount = self.id), name = "uniquefs.read")]
    async fn read(&self, path: &Path, offset: u64, size: u32) -> FsResult<Vec<u8>> {
        let name = Self::require_file_name(path)?;
        self.lookup(&name)?.read(offset, size as usize)
    }

    #[tracing::instrument(skip(self, data), fields(mount = self.id, len = data.len()), name = "uniquefs.write")]
    async fn write(&self, path: &Path, offset: u64, data: &[u8]) -> FsResult<u32> {
        let len = Self::reportable_len(data.len())?;
        let name = Self::require_file_name(path)?;
        self.lookup(&name)?.write(offset, data)?;
        Ok(len)
    }

    async fn create(&self, path: &Path, mode: u32) -> FsResult<FileAttr> {
        let name = Self::require_file_name(path)?;
        Ok(self.create_file(&name, mode)?.attr())
    }

    async fn unlink(&self, path: &Path) -> FsResult<()> {
        let name = Self::require_file_name(path)?;
        self.unlink_file(&name)
    }

    async fn rename(&self, from: &Path, to: &Path) -> FsResult<()> {
        let from = Self::require_file_name(from)?;
        let to = Self::require_file_name(to)?;
        self.rename_file(&from, &to)
    }

    async fn mmap_fault(&self, path: &Path, offset: u64) -> FsResult<PageHandle> {
        let name = Self::require_file_name(path)?;
        self.mmap_fault_file(&name, offset)
    }

    async fn statfs(&self) -> FsResult<StatFs> {
        let root = self.root.lock();
        self.ensure_mounted(&root)?;
        let blocks: usize = root.files.values().map(|f| f.page_count()).sum();
        let budget = &self.module.budget;
        Ok(StatFs {
            magic: UNIQUEFS_MAGIC,
            blocks: blocks as u64,
            bfree: budget
                .max_pages()
                .map(|max| max.saturating_sub(budget.live_pages()) as u64),
            files: root.gate.max_entries() as u64,
            ffree: root.gate.free_slots() as u64,
            bsize: self.module.page_size as u32,
            namelen: root.gate.name_max() as u32,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FsConfig;
    use crate::module::UniqueFs;

    fn mount_with(config: FsConfig) -> Arc<Namespace> {
        UniqueFs::load(config).unwrap().mount().unwrap()
    }

    fn mount(max_entries: usize) -> Arc<Namespace> {
        mount_with(
            FsConfig::default()
                .with_max_entries(max_entries)
                .with_page_size(64),
        )
    }

    #[tokio::test]
    async fn test_create_and_read() {
        let fs = mount(1);
        fs.create(Path::new("test.txt"), 0o644).await.unwrap();
        fs.write(Path::new("test.txt"), 0, b"hello world")
            .await
            .unwrap();

        let data = fs.read(Path::new("test.txt"), 0, 100).await.unwrap();
        assert_eq!(data, b"hello world");
    }

    #[tokio::test]
    async fn test_partial_read() {
        let fs = mount(1);
        fs.create(Path::new("test.txt"), 0o644).await.unwrap();
        fs.write(Path::new("test.txt"), 0, b"hello world")
            .await
            .unwrap();

        let data = fs.read(Path::new("test.txt"), 6, 5).await.unwrap();
        assert_eq!(data, b"world");
    }

    #[tokio::test]
    async fn test_capacity_gate() {
        let fs = mount(1);
        fs.create(Path::new("a"), 0o644).await.unwrap();
        let err = fs.create(Path::new("b"), 0o644).await.unwrap_err();
        assert_eq!(err, FsError::CapacityExceeded { count: 1, max: 1 });

        fs.unlink(Path::new("a")).await.unwrap();
        fs.create(Path::new("b"), 0o644).await.unwrap();
        assert_eq!(fs.entry_count(), 1);
    }

    #[tokio::test]
    async fn test_full_directory_wins_over_long_name() {
        let fs = mount(1);
        fs.create(Path::new("a"), 0o644).await.unwrap();
        let err = fs.create_file(&"n".repeat(33), 0o644).unwrap_err();
        assert_eq!(err, FsError::CapacityExceeded { count: 1, max: 1 });
        assert_eq!(err.errno(), libc::EPERM);
    }

    #[tokio::test]
    async fn test_unreachable_names_refused() {
        let fs = mount(1);
        for bad in ["", ".", "..", "x/y"] {
            let err = fs.create_file(bad, 0o644).unwrap_err();
            assert!(matches!(err, FsError::InvalidPath(_)), "{bad:?}: {err}");
        }
        assert_eq!(fs.entry_count(), 0);

        // The slot is still free for path callers.
        fs.create(Path::new("a"), 0o644).await.unwrap();
        let err = fs.rename_file("a", "x/y").unwrap_err();
        assert!(matches!(err, FsError::InvalidPath(_)));
        fs.unlink(Path::new("a")).await.unwrap();
        assert_eq!(fs.entry_count(), 0);
    }

    #[test]
    fn test_write_length_must_fit_reply() {
        assert_eq!(Namespace::reportable_len(0), Ok(0));
        assert_eq!(
            Namespace::reportable_len(u32::MAX as usize),
            Ok(u32::MAX)
        );
        #[cfg(target_pointer_width = "64")]
        assert_eq!(
            Namespace::reportable_len(u32::MAX as usize + 1),
            Err(FsError::WriteTooLarge {
                len: u32::MAX as usize + 1,
                max: u32::MAX as u64,
            })
        );
    }

    #[tokio::test]
    async fn test_create_existing_name() {
        let fs = mount(2);
        fs.create(Path::new("a"), 0o644).await.unwrap();
        let err = fs.create(Path::new("a"), 0o644).await.unwrap_err();
        assert!(matches!(err, FsError::AlreadyExists(_)));
        assert_eq!(fs.entry_count(), 1);
    }

    #[tokio::test]
    async fn test_create_rejects_non_regular_mode() {
        let fs = mount(1);
        // S_IFDIR
        let err = fs.create(Path::new("d"), 0o040755).await.unwrap_err();
        assert!(matches!(err, FsError::NotPermitted(_)));
        // Explicit S_IFREG is fine.
        let attr = fs.create(Path::new("f"), 0o100600).await.unwrap();
        assert_eq!(attr.perm, 0o600);
    }

    #[tokio::test]
    async fn test_create_oom_leaves_no_entry() {
        let fs = mount_with(
            FsConfig::default()
                .with_max_entries(2)
                .with_page_size(64)
                .with_max_pages(0),
        );
        let err = fs.create(Path::new("a"), 0o644).await.unwrap_err();
        assert_eq!(err, FsError::OutOfMemory { page: 0 });
        assert_eq!(fs.entry_count(), 0);
        assert!(!fs.exists(Path::new("a")).await);
    }

    #[tokio::test]
    async fn test_nested_paths_refused() {
        let fs = mount(1);
        let err = fs.create(Path::new("a/b"), 0o644).await.unwrap_err();
        assert!(matches!(err, FsError::NotPermitted(_)));
    }

    #[tokio::test]
    async fn test_path_normalization() {
        let fs = mount(1);
        fs.create(Path::new("/c.txt"), 0o644).await.unwrap();

        assert!(fs.getattr(Path::new("c.txt")).await.is_ok());
        assert!(fs.getattr(Path::new("/c.txt")).await.is_ok());
        assert!(fs.getattr(Path::new("./c.txt")).await.is_ok());
        assert!(fs.getattr(Path::new("x/../c.txt")).await.is_ok());
    }

    #[tokio::test]
    async fn test_io_on_root_is_a_directory() {
        let fs = mount(1);
        let err = fs.read(Path::new("/"), 0, 1).await.unwrap_err();
        assert!(matches!(err, FsError::IsADirectory(_)));
    }

    #[tokio::test]
    async fn test_readdir_sorted() {
        let fs = mount(3);
        for name in ["b", "c", "a"] {
            fs.create(Path::new(name), 0o644).await.unwrap();
        }
        let names: Vec<_> = fs
            .readdir(Path::new(""))
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, ["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_getattr_root() {
        let fs = mount(2);
        fs.create(Path::new("a"), 0o644).await.unwrap();
        let attr = fs.getattr(Path::new("/")).await.unwrap();
        assert!(attr.is_dir());
        assert_eq!(attr.perm, 0o755);
        assert_eq!(attr.size, 1);
    }

    #[tokio::test]
    async fn test_rename() {
        let fs = mount(1);
        fs.create(Path::new("old.txt"), 0o644).await.unwrap();
        fs.write(Path::new("old.txt"), 0, b"content").await.unwrap();

        fs.rename(Path::new("old.txt"), Path::new("new.txt"))
            .await
            .unwrap();

        assert!(fs.getattr(Path::new("old.txt")).await.is_err());
        let data = fs.read(Path::new("new.txt"), 0, 100).await.unwrap();
        assert_eq!(data, b"content");
        assert_eq!(fs.entry_count(), 1);
    }

    #[tokio::test]
    async fn test_rename_replaces_target() {
        let fs = mount(2);
        fs.create(Path::new("a"), 0o644).await.unwrap();
        fs.create(Path::new("b"), 0o644).await.unwrap();
        fs.write(Path::new("a"), 0, b"from a").await.unwrap();
        let replaced = fs.lookup("b").unwrap();

        fs.rename(Path::new("a"), Path::new("b")).await.unwrap();
        assert_eq!(fs.entry_count(), 1);
        assert!(replaced.is_destroyed());
        assert_eq!(fs.read_all(Path::new("b")).await.unwrap(), b"from a");
    }

    #[tokio::test]
    async fn test_rename_name_too_long() {
        let fs = mount(1);
        fs.create(Path::new("a"), 0o644).await.unwrap();
        let long = "n".repeat(33);
        let err = fs.rename(Path::new("a"), Path::new(&long)).await.unwrap_err();
        assert_eq!(err, FsError::NameTooLong { len: 33, max: 32 });
        assert!(fs.exists(Path::new("a")).await);
    }

    #[tokio::test]
    async fn test_rename_onto_itself() {
        let fs = mount(1);
        fs.create(Path::new("a"), 0o644).await.unwrap();
        fs.write(Path::new("a"), 0, b"same").await.unwrap();
        fs.rename(Path::new("a"), Path::new("a")).await.unwrap();
        assert_eq!(fs.read_all(Path::new("a")).await.unwrap(), b"same");
    }

    #[tokio::test]
    async fn test_rename_missing_source() {
        let fs = mount(1);
        let err = fs.rename(Path::new("x"), Path::new("y")).await.unwrap_err();
        assert!(matches!(err, FsError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_unlink_missing() {
        let fs = mount(1);
        let err = fs.unlink(Path::new("nope")).await.unwrap_err();
        assert!(matches!(err, FsError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_mmap_fault() {
        let fs = mount(1);
        fs.create(Path::new("m"), 0o644).await.unwrap();
        fs.write(Path::new("m"), 0, &[7u8; 100]).await.unwrap();

        let page = fs.mmap_fault(Path::new("m"), 70).await.unwrap();
        assert_eq!(page.index(), 1);
        assert_eq!(page.valid_len(), 36);
        assert!(matches!(
            fs.mmap_fault(Path::new("m"), 100).await,
            Err(FsError::OutOfRange { offset: 100, size: 100 })
        ));
    }

    #[tokio::test]
    async fn test_statfs() {
        let fs = mount_with(
            FsConfig::default()
                .with_max_entries(2)
                .with_page_size(64)
                .with_max_pages(10),
        );
        fs.create(Path::new("a"), 0o644).await.unwrap();
        fs.write(Path::new("a"), 0, &[1u8; 130]).await.unwrap();

        let stat = fs.statfs().await.unwrap();
        assert_eq!(stat.magic, UNIQUEFS_MAGIC);
        assert_eq!(stat.blocks, 3);
        assert_eq!(stat.bfree, Some(7));
        assert_eq!(stat.files, 2);
        assert_eq!(stat.ffree, 1);
        assert_eq!(stat.bsize, 64);
        assert_eq!(stat.namelen, 32);
    }

    #[tokio::test]
    async fn test_unmount_frees_and_rejects() {
        let fs = mount(1);
        let file = fs.create_file("a", 0o644).unwrap();
        file.write(0, b"bye").unwrap();

        fs.unmount().unwrap();
        assert!(file.is_destroyed());
        assert!(!fs.is_mounted());
        assert!(matches!(
            fs.getattr(Path::new("a")).await,
            Err(FsError::NoMountPoint(_))
        ));
        assert!(matches!(fs.unmount(), Err(FsError::NoMountPoint(_))));
    }
}
