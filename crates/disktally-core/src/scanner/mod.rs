/// Scan engine: one background scan of one folder tree.
///
/// [`ScanEngine::start`] resolves the root (reusing the stored tree for that
/// path when there is one), then runs the four passes in [`passes`] on a
/// dedicated thread. The caller owns the handle and may:
///
/// - read the live tree through [`ScanEngine::root`] at any time, one folder
///   lock at a time;
/// - poll [`ScanEngine::status`] and [`ScanEngine::check_health`];
/// - drain optional [`ScanProgress`] events from [`ScanEngine::progress`];
/// - cancel, wait, or drop the handle (which cancels and joins).
///
/// A fault on the worker thread (failed checkpoint, panic) ends the run and
/// is parked in a single-slot mailbox until the next `check_health`.
pub mod fault;
pub mod listing;
pub(crate) mod passes;
pub mod progress;

use crate::config::EngineConfig;
use crate::error::ScanError;
use crate::model::{resolve_path, FolderNode};
use crate::platform::{DiskSizeProbe, SizeProbe};
use crate::store::ResultStore;
use fault::FaultMailbox;
use passes::{Outcome, Worker};
use progress::{EngineStatus, ScanActivity, ScanProgress};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tracing::{error, info, warn};

/// Maximum number of progress events that may queue up in the channel.
///
/// The worker uses `try_send`, so a consumer that never drains the channel
/// only loses events; it never stalls the scan.
pub const PROGRESS_CHANNEL_CAPACITY: usize = 4_096;

/// State shared between the handle and the worker thread.
pub(crate) struct Shared {
    pub(crate) status: Mutex<EngineStatus>,
    pub(crate) cancel: AtomicBool,
    pub(crate) faults: FaultMailbox,
    pub(crate) events: Sender<ScanProgress>,
}

/// Handle to a running or finished scan.
pub struct ScanEngine {
    root: Arc<FolderNode>,
    shared: Arc<Shared>,
    progress_rx: Receiver<ScanProgress>,
    thread: Option<thread::JoinHandle<()>>,
}

impl ScanEngine {
    /// Start scanning `path` with the on-disk size probe.
    pub fn start(
        path: impl AsRef<Path>,
        store: Arc<ResultStore>,
        config: EngineConfig,
    ) -> Result<Self, ScanError> {
        Self::with_probe(path, store, config, Arc::new(DiskSizeProbe::new()))
    }

    /// Start scanning `path`, measuring files with `probe`.
    ///
    /// `path` is made absolute with `.` and `..` folded away, so every
    /// spelling of a folder maps to the same stored node. Fails
    /// synchronously when `path` cannot be resolved or is not a directory. Everything after that is reported through
    /// [`check_health`](Self::check_health).
    pub fn with_probe(
        path: impl AsRef<Path>,
        store: Arc<ResultStore>,
        config: EngineConfig,
        probe: Arc<dyn SizeProbe>,
    ) -> Result<Self, ScanError> {
        let requested = path.as_ref();
        let path = resolve_path(requested).map_err(|e| ScanError::io(requested, e))?;
        let meta = std::fs::metadata(&path).map_err(|e| ScanError::io(&path, e))?;
        if !meta.is_dir() {
            return Err(ScanError::NotADirectory { path });
        }

        let root = match store.find(&path) {
            Some(stored) => {
                info!("Resuming from stored results for {}", path.display());
                stored
            }
            None => FolderNode::new(path.clone()),
        };

        let (events, progress_rx) = crossbeam_channel::bounded(PROGRESS_CHANNEL_CAPACITY);
        let shared = Arc::new(Shared {
            status: Mutex::new(EngineStatus::new(path)),
            cancel: AtomicBool::new(false),
            faults: FaultMailbox::new(),
            events,
        });

        let worker = Worker::new(root.clone(), store, config, probe, shared.clone());
        let thread = thread::Builder::new()
            .name("disktally-scanner".into())
            .spawn(move || run_guarded(worker))
            .map_err(ScanError::Spawn)?;

        Ok(Self {
            root,
            shared,
            progress_rx,
            thread: Some(thread),
        })
    }

    /// The tree being scanned. Totals change while the scan runs.
    pub fn root(&self) -> &Arc<FolderNode> {
        &self.root
    }

    pub fn status(&self) -> EngineStatus {
        self.shared.status.lock().clone()
    }

    pub fn activity(&self) -> ScanActivity {
        self.shared.status.lock().activity
    }

    /// Optional event feed. Polling [`status`](Self::status) works without it.
    pub fn progress(&self) -> &Receiver<ScanProgress> {
        &self.progress_rx
    }

    /// Request the scan to stop as soon as possible.
    pub fn cancel(&self) {
        self.shared.cancel.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.cancel.load(Ordering::Relaxed)
    }

    /// `true` once the worker thread has exited (or was already joined).
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, |t| t.is_finished())
    }

    /// Surface the most recent worker fault, draining it.
    pub fn check_health(&self) -> Result<(), ScanError> {
        match self.shared.faults.take() {
            Some(fault) => Err(fault),
            None => Ok(()),
        }
    }

    /// Block until the worker thread exits.
    pub fn wait(&mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Scanner thread exited abnormally");
            }
        }
    }

    /// Cancel and join. Dropping the handle does the same.
    pub fn dispose(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if self.thread.is_some() {
            self.cancel();
            self.wait();
        }
    }
}

impl Drop for ScanEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Thread body: run the passes, then report how they ended.
fn run_guarded(mut worker: Worker) {
    let started = Instant::now();
    let result = panic::catch_unwind(AssertUnwindSafe(|| worker.run()));
    let shared = worker.shared();

    match result {
        Ok(Ok(Outcome::Completed)) => {
            worker.flush_counters(true);
            let duration = started.elapsed();
            info!("Scan complete in {duration:?}");
            worker.emit(ScanProgress::Complete { duration });
        }
        Ok(Ok(Outcome::Cancelled)) => {
            worker.flush_counters(true);
            info!("Scan cancelled after {:?}", started.elapsed());
            worker.emit(ScanProgress::Cancelled);
        }
        Ok(Err(fault)) => {
            error!("Scan failed: {fault}");
            let message = fault.to_string();
            shared.faults.post(fault);
            worker.emit(ScanProgress::Failed { message });
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!("Scanner thread panicked: {message}");
            shared.faults.post(ScanError::WorkerPanicked {
                message: message.clone(),
            });
            worker.emit(ScanProgress::Failed { message });
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
