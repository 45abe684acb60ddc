/// A single folder in the summary tree.
///
/// Identity (name, path, root flag, volume) is fixed at construction. All
/// mutable facts live behind the node's own lock, so a reader can inspect
/// one folder while the scanner is busy in a sibling subtree. Locks are
/// taken from a node towards its children, never upwards and never across
/// siblings. A parent lock may be held while one child lock is taken, never
/// the reverse.
///
/// Children are owned through the parent's child list. `Arc` handles cloned
/// out of that list are short-lived traversal handles. The parent link is a
/// `Weak` used only for upward navigation.
use super::delta::{Aggregate, Delta, TimeBounds};
use crate::platform::volume::{volume_info, VolumeInfo};
use chrono::{DateTime, Utc};
use compact_str::CompactString;
use parking_lot::{Mutex, MutexGuard};
use std::collections::HashSet;
use std::ffi::{OsStr, OsString};
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Weak};

/// Mutable part of a [`FolderNode`]. Only reachable through [`FolderNode::lock`].
#[derive(Debug)]
pub struct FolderState {
    pub size: u64,
    pub total_files: u64,
    pub total_subfolders: u64,
    pub bounds: TimeBounds,
    /// Completion time of the last full tabulation; `None` marks a placeholder.
    pub last_scan: Option<DateTime<Utc>>,
    children: Vec<Arc<FolderNode>>,
    parent: Weak<FolderNode>,
}

impl FolderState {
    fn empty() -> Self {
        Self {
            size: 0,
            total_files: 0,
            total_subfolders: 0,
            bounds: TimeBounds::invalid(),
            last_scan: None,
            children: Vec::new(),
            parent: Weak::new(),
        }
    }

    pub fn aggregate(&self) -> Aggregate {
        Aggregate {
            size: self.size,
            files: self.total_files,
            subfolders: self.total_subfolders,
            bounds: self.bounds,
        }
    }

    pub fn children(&self) -> &[Arc<FolderNode>] {
        &self.children
    }

    pub fn is_placeholder(&self) -> bool {
        self.last_scan.is_none()
    }
}

/// Copy of a folder's facts taken under its lock.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FolderSummary {
    pub name: CompactString,
    pub path: PathBuf,
    pub aggregate: Aggregate,
    pub last_scan: Option<DateTime<Utc>>,
    pub child_count: usize,
}

#[derive(Debug)]
pub struct FolderNode {
    name: CompactString,
    path: PathBuf,
    is_root: bool,
    volume: Option<VolumeInfo>,
    state: Mutex<FolderState>,
}

impl FolderNode {
    /// Create an unscanned folder for `path`.
    ///
    /// A path without a parent (`/`, `C:\`) becomes a root and picks up its
    /// volume descriptor.
    pub fn new(path: impl Into<PathBuf>) -> Arc<Self> {
        let path = path.into();
        let is_root = path.parent().is_none();
        Self::build(display_name(&path), path, is_root)
    }

    /// Unscanned folder used to bridge a gap between a merged subtree and
    /// the nearest stored ancestor.
    pub fn placeholder(path: impl Into<PathBuf>) -> Arc<Self> {
        Self::new(path)
    }

    pub(crate) fn build(name: CompactString, path: PathBuf, is_root: bool) -> Arc<Self> {
        let volume = if is_root { volume_info(&path) } else { None };
        Arc::new(Self {
            name,
            path,
            is_root,
            volume,
            state: Mutex::new(FolderState::empty()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_root(&self) -> bool {
        self.is_root
    }

    /// Total/free space of the volume, for root folders only.
    pub fn volume(&self) -> Option<&VolumeInfo> {
        self.volume.as_ref()
    }

    /// Lock this folder's mutable state.
    pub fn lock(&self) -> MutexGuard<'_, FolderState> {
        self.state.lock()
    }

    pub fn summary(&self) -> FolderSummary {
        let state = self.lock();
        FolderSummary {
            name: self.name.clone(),
            path: self.path.clone(),
            aggregate: state.aggregate(),
            last_scan: state.last_scan,
            child_count: state.children.len(),
        }
    }

    pub fn aggregate(&self) -> Aggregate {
        self.lock().aggregate()
    }

    pub fn last_scan(&self) -> Option<DateTime<Utc>> {
        self.lock().last_scan
    }

    /// Traversal handles for the current children, in list order.
    pub fn children(&self) -> Vec<Arc<FolderNode>> {
        self.lock().children.clone()
    }

    /// Children sorted by size, largest first.
    pub fn children_sorted_by_size(&self) -> Vec<Arc<FolderNode>> {
        let children = self.children();
        let mut keyed: Vec<(u64, Arc<FolderNode>)> = children
            .into_iter()
            .map(|child| {
                let size = child.lock().size;
                (size, child)
            })
            .collect();
        keyed.sort_by(|a, b| b.0.cmp(&a.0));
        keyed.into_iter().map(|(_, child)| child).collect()
    }

    pub fn parent(&self) -> Option<Arc<FolderNode>> {
        self.lock().parent.upgrade()
    }

    /// Case-insensitive lookup of a direct child by folder name.
    pub fn child_named(&self, name: &OsStr) -> Option<Arc<FolderNode>> {
        let wanted = name.to_string_lossy();
        self.lock()
            .children
            .iter()
            .find(|child| names_match(&child.name, &wanted))
            .cloned()
    }

    /// Apply a delta and drop the time bounds, which are no longer exact.
    pub fn adjust(&self, delta: Delta) {
        let mut state = self.lock();
        let mut agg = state.aggregate();
        agg.apply(delta);
        state.size = agg.size;
        state.total_files = agg.files;
        state.total_subfolders = agg.subfolders;
        state.bounds = TimeBounds::invalid();
    }

    /// Replace the totals with an authoritative tabulation and stamp the
    /// completion time.
    pub(crate) fn record_tabulation(&self, aggregate: Aggregate, when: DateTime<Utc>) {
        let mut state = self.lock();
        state.size = aggregate.size;
        state.total_files = aggregate.files;
        state.total_subfolders = aggregate.subfolders;
        state.bounds = aggregate.bounds;
        state.last_scan = Some(when);
    }

    /// Restore persisted facts without touching the child list.
    pub(crate) fn restore(&self, aggregate: Aggregate, last_scan: Option<DateTime<Utc>>) {
        let mut state = self.lock();
        state.size = aggregate.size;
        state.total_files = aggregate.files;
        state.total_subfolders = aggregate.subfolders;
        state.bounds = aggregate.bounds;
        state.last_scan = last_scan;
    }

    /// Attach `child` under `parent`, replacing any entry with the same name.
    /// Re-attaching the very same node is a no-op.
    pub fn attach_child(parent: &Arc<FolderNode>, child: Arc<FolderNode>) {
        let mut state = parent.lock();
        if let Some(pos) = state
            .children
            .iter()
            .position(|existing| names_match(&existing.name, &child.name))
        {
            if Arc::ptr_eq(&state.children[pos], &child) {
                return;
            }
            state.children.remove(pos);
        }
        child.lock().parent = Arc::downgrade(parent);
        state.children.push(child);
    }

    /// Append a fresh placeholder child. Caller guarantees the name is new.
    pub fn push_placeholder(parent: &Arc<FolderNode>, name: &OsStr) -> Arc<FolderNode> {
        let child = FolderNode::build(
            CompactString::new(name.to_string_lossy()),
            parent.path.join(name),
            false,
        );
        child.lock().parent = Arc::downgrade(parent);
        parent.lock().children.push(child.clone());
        child
    }

    /// Make the child list match the folder names found on disk.
    ///
    /// Children missing from `on_disk` are detached and returned; names with
    /// no child yet get a placeholder. Names are matched case-insensitively,
    /// so two on-disk names differing only by case share one node. Returns
    /// `(removed, added_count)`.
    pub(crate) fn reconcile_children(
        parent: &Arc<FolderNode>,
        on_disk: &[OsString],
    ) -> (Vec<Arc<FolderNode>>, usize) {
        let wanted: HashSet<String> = on_disk
            .iter()
            .map(|name| name.to_string_lossy().to_lowercase())
            .collect();

        let mut removed = Vec::new();
        let mut added = 0;
        {
            let mut state = parent.lock();
            state.children.retain(|child| {
                if wanted.contains(&child.name.as_str().to_lowercase()) {
                    true
                } else {
                    removed.push(child.clone());
                    false
                }
            });

            let mut present: HashSet<String> = state
                .children
                .iter()
                .map(|child| child.name.as_str().to_lowercase())
                .collect();
            for name in on_disk {
                if !present.insert(name.to_string_lossy().to_lowercase()) {
                    continue;
                }
                let child = FolderNode::build(
                    CompactString::new(name.to_string_lossy()),
                    parent.path.join(name),
                    false,
                );
                child.lock().parent = Arc::downgrade(parent);
                state.children.push(child);
                added += 1;
            }
        }

        for child in &removed {
            child.lock().parent = Weak::new();
        }
        (removed, added)
    }

    /// Remove the children for which `remove` returns `true`, returning them.
    pub(crate) fn remove_children_where(
        &self,
        mut remove: impl FnMut(&FolderNode) -> bool,
    ) -> Vec<Arc<FolderNode>> {
        let mut state = self.lock();
        let mut removed = Vec::new();
        state.children.retain(|child| {
            if remove(child) {
                removed.push(child.clone());
                false
            } else {
                true
            }
        });
        for child in &removed {
            child.lock().parent = Weak::new();
        }
        removed
    }

    pub(crate) fn set_parent(&self, parent: &Arc<FolderNode>) {
        self.lock().parent = Arc::downgrade(parent);
    }

    pub(crate) fn push_child_unchecked(&self, child: Arc<FolderNode>) {
        self.lock().children.push(child);
    }
}

/// Case-insensitive folder-name comparison.
pub fn names_match(a: &str, b: &str) -> bool {
    a == b || a.to_lowercase() == b.to_lowercase()
}

/// Case-insensitive full-path comparison, component by component.
pub fn paths_match(a: &Path, b: &Path) -> bool {
    let mut left = a.components();
    let mut right = b.components();
    loop {
        match (left.next(), right.next()) {
            (None, None) => return true,
            (Some(l), Some(r)) => {
                if !names_match(&l.as_os_str().to_string_lossy(), &r.as_os_str().to_string_lossy()) {
                    return false;
                }
            }
            _ => return false,
        }
    }
}

/// Absolute form of `path` with `.` and `..` folded away.
///
/// Folding is lexical: symlinks are not resolved, so the result names the
/// folder the way the caller spelled it. `..` above the root stays there.
pub fn resolve_path(path: &Path) -> std::io::Result<PathBuf> {
    let absolute = std::path::absolute(path)?;
    let mut resolved = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                resolved.pop();
            }
            other => resolved.push(other),
        }
    }
    Ok(resolved)
}

/// Folder name for a path; roots use the whole path (`/`, `C:\` → `C:`).
pub(crate) fn display_name(path: &Path) -> CompactString {
    match path.file_name() {
        Some(name) => CompactString::new(name.to_string_lossy()),
        None => {
            let s = path.to_string_lossy();
            let trimmed = s.trim_end_matches(['\\', '/']);
            if trimmed.is_empty() {
                CompactString::new(s)
            } else {
                CompactString::new(trimmed)
            }
        }
    }
}
