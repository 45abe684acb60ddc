/// Result store: the forest of previously scanned folder trees.
///
/// One store is loaded per process and shared with every engine as an
/// `Arc<ResultStore>`. It resolves paths to stored folders, merges fresh
/// subtrees in (bridging unscanned ancestors with placeholders), and
/// checkpoints the whole forest to a JSON document.
///
/// Lock order: the store's root list is locked before any folder lock, and
/// folder locks are taken one at a time.
pub mod document;

use crate::error::StoreError;
use crate::model::{paths_match, FolderNode};
use parking_lot::Mutex;
use std::ffi::OsString;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub use document::{format_timestamp, DOCUMENT_VERSION};

pub struct ResultStore {
    /// Backing document; `None` keeps the forest in memory only.
    path: Option<PathBuf>,
    roots: Mutex<Vec<Arc<FolderNode>>>,
    /// Serializes writers of the backing document.
    save_lock: Mutex<()>,
}

impl ResultStore {
    /// Empty forest with no backing file. `save` is a no-op.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            roots: Mutex::new(Vec::new()),
            save_lock: Mutex::new(()),
        }
    }

    /// Load the forest from `path`.
    ///
    /// A missing or unreadable document is not an error: scanning must be
    /// able to start from nothing, so the store simply comes up empty.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let roots = match fs::read_to_string(&path) {
            Ok(text) => match document::from_json(&text) {
                Ok(roots) => {
                    info!("Loaded {} stored root(s) from {}", roots.len(), path.display());
                    roots
                }
                Err(err) => {
                    warn!("Ignoring corrupt result store {}: {err}", path.display());
                    Vec::new()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("No result store at {}; starting empty", path.display());
                Vec::new()
            }
            Err(err) => {
                warn!("Cannot read result store {}: {err}", path.display());
                Vec::new()
            }
        };
        Self {
            path: Some(path),
            roots: Mutex::new(roots),
            save_lock: Mutex::new(()),
        }
    }

    /// Decode an in-memory store from document text.
    pub fn from_json(text: &str) -> Result<Self, StoreError> {
        let roots = document::from_json(text)?;
        Ok(Self {
            path: None,
            roots: Mutex::new(roots),
            save_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Handles to the current root folders, in forest order.
    pub fn roots(&self) -> Vec<Arc<FolderNode>> {
        self.roots.lock().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.lock().is_empty()
    }

    /// Resolve `path` to a stored folder.
    ///
    /// Succeeds only when every ancestor segment is present; names match
    /// case-insensitively.
    pub fn find(&self, path: &Path) -> Option<Arc<FolderNode>> {
        let roots = self.roots.lock();
        find_in(&roots, path)
    }

    /// Integrate a finished (or checkpointed) subtree into the forest.
    ///
    /// Merging the same node twice is a no-op the second time.
    pub fn merge(&self, node: Arc<FolderNode>) {
        let mut roots = self.roots.lock();
        merge_into(&mut roots, node);
    }

    /// Encode the forest as the persisted document text.
    pub fn to_json(&self) -> Result<String, StoreError> {
        let roots = self.roots.lock();
        document::to_json(&roots)
    }

    /// Persist the forest.
    ///
    /// Writes a sibling temp file and renames it over the document so a
    /// crash mid-write leaves the previous checkpoint intact. Failures are
    /// returned to the caller.
    pub fn save(&self) -> Result<(), StoreError> {
        let Some(path) = self.path.as_deref() else {
            return Ok(());
        };
        let _guard = self.save_lock.lock();
        let json = self.to_json()?;

        let tmp = temp_path(path);
        fs::write(&tmp, json.as_bytes()).map_err(|e| StoreError::io(&tmp, e))?;
        if let Err(err) = fs::rename(&tmp, path) {
            let _ = fs::remove_file(&tmp);
            return Err(StoreError::io(path, err));
        }
        debug!("Saved result store to {} ({} bytes)", path.display(), json.len());
        Ok(())
    }
}

fn find_in(roots: &[Arc<FolderNode>], path: &Path) -> Option<Arc<FolderNode>> {
    match path.parent() {
        None => roots.iter().find(|root| paths_match(root.path(), path)).cloned(),
        Some(parent) => {
            let name = path.file_name()?;
            find_in(roots, parent)?.child_named(name)
        }
    }
}

fn merge_into(roots: &mut Vec<Arc<FolderNode>>, node: Arc<FolderNode>) {
    let parent_path = match node.path().parent() {
        Some(parent) if !node.is_root() => parent.to_path_buf(),
        _ => {
            match roots.iter().position(|root| paths_match(root.path(), node.path())) {
                Some(pos) if Arc::ptr_eq(&roots[pos], &node) => {}
                Some(pos) => roots[pos] = node,
                None => roots.push(node),
            }
            return;
        }
    };

    match find_in(roots, &parent_path) {
        Some(parent) => FolderNode::attach_child(&parent, node),
        None => {
            debug!("Synthesizing placeholder for {}", parent_path.display());
            let placeholder = FolderNode::placeholder(parent_path);
            FolderNode::attach_child(&placeholder, node);
            merge_into(roots, placeholder);
        }
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Aggregate, Delta, TimeBounds};
    use chrono::{DateTime, TimeZone, Utc};
    use std::ffi::OsStr;

    fn stamp(offset_days: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap()
            + chrono::Duration::days(offset_days)
            + chrono::Duration::nanoseconds(987_654_321)
    }

    fn tabulated(size: u64, files: u64, subfolders: u64) -> Aggregate {
        let mut bounds = TimeBounds::invalid();
        bounds.include(stamp(-30));
        bounds.include(stamp(-2));
        Aggregate {
            size,
            files,
            subfolders,
            bounds,
        }
    }

    fn round_trip(store: &ResultStore) -> (String, String) {
        let first = store.to_json().unwrap();
        let reloaded = ResultStore::from_json(&first).unwrap();
        let second = reloaded.to_json().unwrap();
        (first, second)
    }

    #[test]
    fn round_trip_empty_forest() {
        let (first, second) = round_trip(&ResultStore::in_memory());
        assert_eq!(first, second);
    }

    #[test]
    fn round_trip_single_scanned_leaf() {
        let store = ResultStore::in_memory();
        let root = FolderNode::new("/");
        root.record_tabulation(tabulated(4096, 1, 0), stamp(0));
        store.merge(root);

        let (first, second) = round_trip(&store);
        assert_eq!(first, second);
        assert!(first.contains("\"isRoot\": true"));
    }

    #[test]
    fn round_trip_multi_level_with_culled_and_pending_branches() {
        let store = ResultStore::in_memory();
        let root = FolderNode::new("/");
        let srv = FolderNode::push_placeholder(&root, OsStr::new("srv"));
        let data = FolderNode::push_placeholder(&srv, OsStr::new("data"));
        let logs = FolderNode::push_placeholder(&srv, OsStr::new("logs"));
        // Never tabulated: must not be written.
        FolderNode::push_placeholder(&srv, OsStr::new("pending"));

        data.record_tabulation(tabulated(3_000_000, 400, 10), stamp(0));
        logs.record_tabulation(tabulated(2_000_000, 300, 0), stamp(0));
        // "tmp" was culled: its contribution stays in srv's totals only.
        srv.record_tabulation(tabulated(5_000_100, 705, 14), stamp(0));
        root.record_tabulation(tabulated(5_000_100, 705, 15), stamp(0));
        store.merge(root);

        let (first, second) = round_trip(&store);
        assert_eq!(first, second);
        assert!(first.contains("/srv/data"));
        assert!(first.contains("/srv/logs"));
        assert!(!first.contains("pending"));
    }

    #[test]
    fn round_trip_placeholder_branch() {
        let store = ResultStore::in_memory();
        let leaf = FolderNode::new("/mnt/archive/2023");
        leaf.record_tabulation(tabulated(1_000, 2, 0), stamp(1));
        store.merge(leaf);
        // A pure placeholder with nothing scanned below it.
        let mnt = store.find(Path::new("/mnt")).unwrap();
        FolderNode::push_placeholder(&mnt, OsStr::new("empty"));

        let (first, second) = round_trip(&store);
        assert_eq!(first, second);
        assert!(first.contains("/mnt/archive"));
        assert!(!first.contains("/mnt/empty"));

        let reloaded = ResultStore::from_json(&first).unwrap();
        let archive = reloaded.find(Path::new("/mnt/archive")).unwrap();
        assert!(archive.last_scan().is_none());
    }

    #[test]
    fn merge_same_node_twice_is_idempotent() {
        let store = ResultStore::in_memory();
        let node = FolderNode::new("/home/alice");
        node.record_tabulation(tabulated(10, 1, 0), stamp(0));

        store.merge(node.clone());
        let after_first = store.to_json().unwrap();
        let roots_after_first = store.roots();

        store.merge(node.clone());
        assert_eq!(store.to_json().unwrap(), after_first);
        let roots_after_second = store.roots();
        assert_eq!(roots_after_first.len(), roots_after_second.len());
        assert!(Arc::ptr_eq(&roots_after_first[0], &roots_after_second[0]));
        assert_eq!(store.find(Path::new("/home")).unwrap().children().len(), 1);
    }

    #[test]
    fn merge_synthesizes_each_missing_ancestor_once() {
        let store = ResultStore::in_memory();
        let deep = FolderNode::new("/a/b/c/d");
        store.merge(deep.clone());

        assert_eq!(store.roots().len(), 1);
        for ancestor in ["/", "/a", "/a/b", "/a/b/c"] {
            let found = store.find(Path::new(ancestor)).expect(ancestor);
            assert!(found.last_scan().is_none(), "{ancestor} should be a placeholder");
            assert_eq!(found.children().len(), 1, "{ancestor} should have one child");
        }
        let found = store.find(Path::new("/a/b/c/d")).unwrap();
        assert!(Arc::ptr_eq(&found, &deep));
        assert!(store.roots()[0].is_root());

        // A sibling under an existing ancestor reuses it.
        store.merge(FolderNode::new("/a/b/x"));
        assert_eq!(store.roots().len(), 1);
        assert_eq!(store.find(Path::new("/a/b")).unwrap().children().len(), 2);
    }

    #[test]
    fn merge_replaces_stale_entry_with_same_path() {
        let store = ResultStore::in_memory();
        let old = FolderNode::new("/data/photos");
        old.record_tabulation(tabulated(1, 1, 0), stamp(0));
        store.merge(old);

        let fresh = FolderNode::new("/data/photos");
        fresh.record_tabulation(tabulated(99, 9, 0), stamp(1));
        store.merge(fresh.clone());

        let found = store.find(Path::new("/DATA/Photos")).unwrap();
        assert!(Arc::ptr_eq(&found, &fresh));
        assert_eq!(store.find(Path::new("/data")).unwrap().children().len(), 1);
    }

    #[test]
    fn find_requires_every_ancestor() {
        let store = ResultStore::in_memory();
        let root = FolderNode::new("/");
        let srv = FolderNode::push_placeholder(&root, OsStr::new("srv"));
        srv.adjust(Delta::new(1, 1, 0));
        store.merge(root);

        assert!(store.find(Path::new("/srv")).is_some());
        assert!(store.find(Path::new("/srv/missing")).is_none());
        assert!(store.find(Path::new("/other/srv")).is_none());
    }

    #[test]
    fn missing_document_loads_empty() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = ResultStore::load(tmp.path().join("absent.json"));
        assert!(store.is_empty());
    }

    #[test]
    fn corrupt_document_loads_empty() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("store.json");
        fs::write(&path, "{ not json").unwrap();
        let store = ResultStore::load(&path);
        assert!(store.is_empty());
        assert_eq!(store.path(), Some(path.as_path()));
    }

    #[test]
    fn save_then_load_is_byte_stable() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("store.json");

        let store = ResultStore::load(&path);
        let node = FolderNode::new("/var/cache");
        node.record_tabulation(tabulated(8192, 2, 0), stamp(3));
        store.merge(node);
        store.save().unwrap();
        let first = fs::read_to_string(&path).unwrap();

        let reloaded = ResultStore::load(&path);
        reloaded.save().unwrap();
        let second = fs::read_to_string(&path).unwrap();
        assert_eq!(first, second);
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn save_failure_is_reported() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = ResultStore::load(tmp.path().join("missing-dir").join("store.json"));
        store.merge(FolderNode::new("/x"));
        assert!(matches!(store.save(), Err(StoreError::Io { .. })));
    }
}
