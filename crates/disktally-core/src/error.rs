/// Error types shared across the engine, the result store, and the probes.
///
/// Per-entry filesystem problems never surface through these types during a
/// scan; they are skipped and counted. Only failures that end a scan run or
/// a store operation are represented here.
use std::path::PathBuf;
use thiserror::Error;

/// Failure of a single allocated-size lookup.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The path is a reparse point (symlink, junction, mount point) and is
    /// deliberately not measured.
    #[error("reparse point not supported: {}", path.display())]
    ReparsePoint { path: PathBuf },

    /// Any other I/O failure while querying the file.
    #[error("size probe failed for {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ProbeError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// `true` for the explicitly unsupported reparse-point case.
    pub fn is_reparse_point(&self) -> bool {
        matches!(self, Self::ReparsePoint { .. })
    }
}

/// Failure to persist or decode the result forest.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on result store {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("result store document is malformed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported result store version {0}")]
    UnsupportedVersion(u32),
}

impl StoreError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Failure while exporting the forest as CSV.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("CSV export failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error during export: {0}")]
    Io(#[from] std::io::Error),
}

/// A fault that ends a scan run.
///
/// Raised synchronously by [`crate::scanner::ScanEngine::start`] for bad
/// arguments, or captured on the worker thread and handed to the caller
/// through [`crate::scanner::ScanEngine::check_health`].
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("scan root is not a directory: {}", path.display())]
    NotADirectory { path: PathBuf },

    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("checkpoint failed: {0}")]
    Store(#[from] StoreError),

    #[error("failed to spawn scanner thread: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("scanner thread panicked: {message}")]
    WorkerPanicked { message: String },
}

impl ScanError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
