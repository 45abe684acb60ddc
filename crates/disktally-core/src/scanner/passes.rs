/// The scan worker: four passes over one root's summary tree.
///
/// 1. Reconcile the root's immediate child folders with the disk.
/// 2. Reconcile every descendant, depth-first, applying the resulting
///    size/count deltas to each ancestor on the way back up.
/// 3. Tabulate folders that have never been measured.
/// 4. Re-tabulate folders last measured before this run started.
///
/// Passes 3 and 4 walk from the root, children before parents, and yield to
/// their driver loop once the accumulated size change crosses the interrupt
/// threshold. The driver restarts the walk; stamped folders are skipped, so
/// each restart resumes where the previous one stopped and larger folders
/// show up in the live tree early.
///
/// A child's totals change is pushed into its parent as soon as the child
/// finishes, unless the parent was measured by an earlier run. Such a parent
/// is re-tabulated in pass 4, and until then its stored totals stand: a
/// folder that reappears under it may be one culled earlier, whose size the
/// parent already holds.
use super::listing;
use super::progress::{EngineStatus, ScanActivity, ScanProgress};
use super::Shared;
use crate::config::EngineConfig;
use crate::error::ScanError;
use crate::model::{Aggregate, Delta, FolderNode};
use crate::platform::SizeProbe;
use crate::store::ResultStore;
use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, trace};

/// Which folders a tabulating pass measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Pass {
    /// Folders with no completion time.
    NewFolders,
    /// Folders whose completion time predates this run.
    StaleFolders,
}

/// How a tabulating walk ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step {
    Completed,
    /// Stopped early by the interrupt threshold or by cancellation.
    Interrupted,
}

/// How the whole run ended (faults travel separately as `Err`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Completed,
    Cancelled,
}

/// Counters batched on the worker and flushed into the shared status.
struct PendingCounters {
    files: u64,
    folders: u64,
    errors: u64,
    last_flush: Instant,
    last_event: Instant,
}

impl PendingCounters {
    fn new() -> Self {
        let now = Instant::now();
        Self {
            files: 0,
            folders: 0,
            errors: 0,
            last_flush: now,
            last_event: now,
        }
    }
}

pub(crate) struct Worker {
    root: Arc<FolderNode>,
    store: Arc<ResultStore>,
    config: EngineConfig,
    probe: Arc<dyn SizeProbe>,
    shared: Arc<Shared>,
    /// Folders stamped at or before this instant are stale.
    run_started: DateTime<Utc>,
    last_checkpoint: Instant,
    /// Absolute size change since the last interrupt.
    since_interrupt: u64,
    pending: PendingCounters,
}

impl Worker {
    pub(crate) fn new(
        root: Arc<FolderNode>,
        store: Arc<ResultStore>,
        config: EngineConfig,
        probe: Arc<dyn SizeProbe>,
        shared: Arc<Shared>,
    ) -> Self {
        Self {
            root,
            store,
            config,
            probe,
            shared,
            run_started: Utc::now(),
            last_checkpoint: Instant::now(),
            since_interrupt: 0,
            pending: PendingCounters::new(),
        }
    }

    pub(crate) fn run(&mut self) -> Result<Outcome, ScanError> {
        let root = self.root.clone();
        info!("Scanning {}", root.path().display());

        // ── Passes 1 and 2: folder structure ──────────────────────────
        self.set_activity(ScanActivity::ScanningFolders);
        self.reconcile_children(&root);
        self.reconcile_descendants(&root);
        self.flush_counters(true);
        if self.cancelled() {
            return Ok(Outcome::Cancelled);
        }

        // ── Passes 3 and 4: sizes ─────────────────────────────────────
        self.set_activity(ScanActivity::ScanningNewFolders);
        if self.drive(Pass::NewFolders)? == Outcome::Cancelled {
            return Ok(Outcome::Cancelled);
        }

        self.set_activity(ScanActivity::RescanningOldFolders);
        if self.drive(Pass::StaleFolders)? == Outcome::Cancelled {
            return Ok(Outcome::Cancelled);
        }

        // ── Final commit ──────────────────────────────────────────────
        self.set_activity(ScanActivity::CommittingFinalResults);
        self.commit()?;
        self.set_activity(ScanActivity::ScanComplete);
        Ok(Outcome::Completed)
    }

    /// Restart the tabulating walk until it completes or is cancelled.
    fn drive(&mut self, pass: Pass) -> Result<Outcome, ScanError> {
        let root = self.root.clone();
        let mut rounds = 0u32;
        loop {
            rounds += 1;
            let (step, _) = self.tabulate(&root, pass)?;
            self.flush_counters(true);
            match step {
                Step::Completed => {
                    debug!("{pass:?} pass finished after {rounds} round(s)");
                    return Ok(Outcome::Completed);
                }
                Step::Interrupted if self.cancelled() => return Ok(Outcome::Cancelled),
                Step::Interrupted => trace!("{pass:?} pass yielded, restarting from the root"),
            }
        }
    }

    // ── Reconciliation ────────────────────────────────────────────────

    /// Match `node`'s child folders to the disk and apply the change to
    /// `node`. Returns the applied delta so the caller can carry it upward.
    fn reconcile_children(&mut self, node: &Arc<FolderNode>) -> Delta {
        self.set_current_path(node.path());
        let listing = listing::list_folder(node.path(), false, &self.shared.cancel);
        self.pending.errors += listing.errors;
        if !listing.complete {
            return Delta::ZERO;
        }

        let (removed, added) = FolderNode::reconcile_children(node, &listing.folders);
        let mut delta = Delta::ZERO;
        for child in &removed {
            debug!("Folder vanished: {}", child.path().display());
            delta += Delta::removal_of(&child.aggregate());
        }
        // A stamped folder counts its new children when pass 4 re-tabulates it.
        if node.lock().is_placeholder() {
            for _ in 0..added {
                delta += Delta::new_folder();
            }
        }

        // Bounds are dropped even when nothing moved.
        node.adjust(delta);
        self.maybe_flush_counters();
        delta
    }

    /// Reconcile every descendant of `node`, children before grandchildren.
    fn reconcile_descendants(&mut self, node: &Arc<FolderNode>) -> Delta {
        let children = node.children();
        let node_stamped = !node.lock().is_placeholder();
        // A stamped folder's totals say nothing exact about an unstamped child.
        let carried: Vec<bool> = children
            .iter()
            .map(|child| !node_stamped || !child.lock().is_placeholder())
            .collect();
        let mut delta = Delta::ZERO;

        for (child, &carry) in children.iter().zip(&carried) {
            if self.cancelled() {
                break;
            }
            let change = self.reconcile_children(child);
            if carry {
                delta += change;
            }
        }
        for (child, &carry) in children.iter().zip(&carried) {
            if self.cancelled() {
                break;
            }
            let change = self.reconcile_descendants(child);
            if carry {
                delta += change;
            }
        }

        if !delta.is_zero() {
            node.adjust(delta);
        }
        delta
    }

    // ── Tabulation ────────────────────────────────────────────────────

    /// Tabulate the eligible folders under (and including) `node`.
    ///
    /// Returns how the walk ended together with `node`'s net change over the
    /// call, which the caller applies to its own totals.
    fn tabulate(&mut self, node: &Arc<FolderNode>, pass: Pass) -> Result<(Step, Delta), ScanError> {
        let before = node.aggregate();
        let step = self.tabulate_subtree(node, pass)?;
        Ok((step, Delta::between(&before, &node.aggregate())))
    }

    fn tabulate_subtree(&mut self, node: &Arc<FolderNode>, pass: Pass) -> Result<Step, ScanError> {
        if self.cancelled() {
            return Ok(Step::Interrupted);
        }

        // Eligibility is fixed on entry; stamping children must not change it.
        let eligible = self.is_eligible(node, pass);

        for child in node.children() {
            if self.cancelled() {
                return Ok(Step::Interrupted);
            }
            let (step, delta) = self.tabulate(&child, pass)?;
            if !delta.is_zero() && absorbs_child_changes(pass, eligible) {
                node.adjust(delta);
            }
            if step == Step::Interrupted {
                return Ok(Step::Interrupted);
            }
        }

        if !eligible {
            return Ok(Step::Completed);
        }
        self.tabulate_folder(node)
    }

    /// Measure one folder whose children are all tabulated.
    fn tabulate_folder(&mut self, node: &Arc<FolderNode>) -> Result<Step, ScanError> {
        self.set_current_path(node.path());

        let mut totals = Aggregate::default();
        for child in node.children() {
            totals.absorb_child(&child.aggregate());
        }

        let listing = listing::list_folder(node.path(), true, &self.shared.cancel);
        self.pending.errors += listing.errors;
        if !listing.complete {
            return Ok(Step::Interrupted);
        }

        for file in &listing.files {
            if self.cancelled() {
                return Ok(Step::Interrupted);
            }
            match self.probe.allocated_size(&file.path) {
                Ok(size) => {
                    totals.absorb_file(size, file.modified);
                    self.pending.files += 1;
                }
                Err(err) if err.is_reparse_point() => {
                    trace!("Not measured: {err}");
                    self.pending.errors += 1;
                }
                Err(err) => {
                    debug!("Skipping file: {err}");
                    self.pending.errors += 1;
                }
            }
            self.maybe_flush_counters();
        }

        let before = node.aggregate();
        node.record_tabulation(totals, Utc::now());
        self.pending.folders += 1;
        self.maybe_flush_counters();

        let change = Delta::between(&before, &totals);
        self.since_interrupt = self.since_interrupt.saturating_add(change.size.unsigned_abs());

        self.cull_children(node);
        self.maybe_checkpoint()?;

        if self.since_interrupt >= self.config.interrupt_threshold {
            trace!(
                "Interrupt threshold reached at {} ({} bytes moved)",
                node.path().display(),
                self.since_interrupt
            );
            self.since_interrupt = 0;
            return Ok(Step::Interrupted);
        }
        Ok(Step::Completed)
    }

    fn is_eligible(&self, node: &FolderNode, pass: Pass) -> bool {
        let state = node.lock();
        match pass {
            Pass::NewFolders => state.is_placeholder(),
            Pass::StaleFolders => state
                .last_scan
                .map_or(true, |stamp| stamp <= self.run_started),
        }
    }

    /// Drop the detail of small, sparse children. Their totals stay folded
    /// into `node`.
    fn cull_children(&self, node: &FolderNode) {
        let config = &self.config;
        let culled = node.remove_children_where(|child| {
            let state = child.lock();
            !state.is_placeholder()
                && config.should_cull(state.size, state.total_files, state.total_subfolders)
        });
        if !culled.is_empty() {
            trace!("Culled {} folder(s) under {}", culled.len(), node.path().display());
        }
    }

    // ── Persistence ───────────────────────────────────────────────────

    fn maybe_checkpoint(&mut self) -> Result<(), ScanError> {
        if self.cancelled() || self.last_checkpoint.elapsed() < self.config.checkpoint_interval() {
            return Ok(());
        }

        let resume = self.set_activity(ScanActivity::CommittingPartialResults);
        let started = Instant::now();
        self.commit()?;
        self.last_checkpoint = Instant::now();
        self.set_activity(resume);

        let duration = started.elapsed();
        info!("Checkpoint written in {duration:?}");
        self.emit(ScanProgress::Checkpoint { duration });
        Ok(())
    }

    fn commit(&self) -> Result<(), ScanError> {
        self.store.merge(self.root.clone());
        self.store.save()?;
        Ok(())
    }

    // ── Shared state ──────────────────────────────────────────────────

    pub(crate) fn shared(&self) -> Arc<Shared> {
        self.shared.clone()
    }

    pub(crate) fn cancelled(&self) -> bool {
        self.shared.cancel.load(Ordering::Relaxed)
    }

    /// Switch activity and return the previous one.
    fn set_activity(&self, activity: ScanActivity) -> ScanActivity {
        let previous = std::mem::replace(&mut self.shared.status.lock().activity, activity);
        if previous != activity {
            debug!("Activity: {activity}");
            self.emit(ScanProgress::Activity(activity));
        }
        previous
    }

    fn set_current_path(&self, path: &Path) {
        self.shared.status.lock().current_path = path.to_path_buf();
    }

    fn maybe_flush_counters(&mut self) {
        if self.pending.last_flush.elapsed() >= self.config.progress_interval() {
            self.flush_counters(false);
        }
    }

    /// Move batched counters into the shared status. An `Update` event goes
    /// out when forced or when a progress interval has passed since the last.
    pub(crate) fn flush_counters(&mut self, force_event: bool) {
        let snapshot: EngineStatus = {
            let mut status = self.shared.status.lock();
            status.files_scanned += self.pending.files;
            status.folders_scanned += self.pending.folders;
            status.errors += self.pending.errors;
            status.clone()
        };
        self.pending.files = 0;
        self.pending.folders = 0;
        self.pending.errors = 0;
        self.pending.last_flush = Instant::now();

        if force_event || self.pending.last_event.elapsed() >= self.config.progress_interval() {
            self.pending.last_event = Instant::now();
            self.emit(ScanProgress::Update {
                files_scanned: snapshot.files_scanned,
                folders_scanned: snapshot.folders_scanned,
                errors: snapshot.errors,
                current_path: snapshot.current_path,
            });
        }
    }

    /// Non-blocking send; events are dropped when the channel is full.
    pub(crate) fn emit(&self, event: ScanProgress) {
        let _ = self.shared.events.try_send(event);
    }
}

/// Whether a folder takes its children's changes during a tabulating walk.
///
/// In pass 3 only folders about to be measured do; a folder stamped by an
/// earlier run keeps its stored totals until pass 4 re-tabulates it. In
/// pass 4 every folder does, since the ones it skips were stamped this run.
fn absorbs_child_changes(pass: Pass, eligible: bool) -> bool {
    match pass {
        Pass::NewFolders => eligible,
        Pass::StaleFolders => true,
    }
}
