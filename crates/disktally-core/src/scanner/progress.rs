/// Scan activity and progress reporting.
///
/// Counters live in [`EngineStatus`] behind the engine-wide lock and are
/// read by polling. The lightweight [`ScanProgress`] events are a
/// convenience feed over a bounded crossbeam channel; the worker never
/// blocks on it, so events are dropped when nobody drains the channel.
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// What the scanner is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanActivity {
    /// Pass 1 and 2: reconciling folder lists against the disk.
    ScanningFolders,
    /// Pass 3: tabulating folders that have never been measured.
    ScanningNewFolders,
    /// Pass 4: re-tabulating folders measured in an earlier run.
    RescanningOldFolders,
    /// A periodic checkpoint is being written.
    CommittingPartialResults,
    /// The finished tree is being merged and saved.
    CommittingFinalResults,
    /// Terminal state of an uncancelled run.
    ScanComplete,
}

impl ScanActivity {
    /// Human-readable label.
    pub fn label(self) -> &'static str {
        match self {
            Self::ScanningFolders => "Scanning folders",
            Self::ScanningNewFolders => "Scanning new folders",
            Self::RescanningOldFolders => "Rescanning old folders",
            Self::CommittingPartialResults => "Committing partial results",
            Self::CommittingFinalResults => "Committing final results",
            Self::ScanComplete => "Scan complete",
        }
    }
}

impl fmt::Display for ScanActivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Engine-wide counters, guarded by the engine lock (never by a folder lock).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineStatus {
    pub activity: ScanActivity,
    pub files_scanned: u64,
    pub folders_scanned: u64,
    /// Entries skipped because they could not be listed or measured.
    pub errors: u64,
    /// Folder most recently entered by the worker.
    pub current_path: PathBuf,
}

impl EngineStatus {
    pub fn new(root: PathBuf) -> Self {
        Self {
            activity: ScanActivity::ScanningFolders,
            files_scanned: 0,
            folders_scanned: 0,
            errors: 0,
            current_path: root,
        }
    }
}

/// Events sent from the scan thread to whoever is listening.
#[derive(Debug, Clone)]
pub enum ScanProgress {
    /// The activity state machine moved.
    Activity(ScanActivity),
    /// Periodic update with running totals.
    Update {
        files_scanned: u64,
        folders_scanned: u64,
        errors: u64,
        current_path: PathBuf,
    },
    /// A partial checkpoint was written.
    Checkpoint { duration: Duration },
    /// The run reached `ScanComplete`; the store holds the final tree.
    Complete { duration: Duration },
    /// The run stopped early on request.
    Cancelled,
    /// The run died; the fault is waiting in the mailbox.
    Failed { message: String },
}
