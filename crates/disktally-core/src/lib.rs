/// DiskTally Core — incremental folder-size scanning and persisted results.
///
/// This crate contains all engine logic with zero UI dependencies.
///
/// # Modules
///
/// - [`model`] — Per-folder summary tree, aggregates, and deltas.
/// - [`scanner`] — Background four-pass scan engine with progress reporting.
/// - [`store`] — Result forest shared between engines and its JSON document.
/// - [`platform`] — Allocated-size probes and volume capacity.
/// - [`report`] — CSV export of stored results.
/// - [`config`] — Engine tuning knobs.
/// - [`error`] — Error types.
pub mod config;
pub mod error;
pub mod model;
pub mod platform;
pub mod report;
pub mod scanner;
pub mod store;

pub use config::EngineConfig;
pub use error::{ProbeError, ReportError, ScanError, StoreError};
pub use model::{FolderNode, FolderSummary};
pub use scanner::progress::{EngineStatus, ScanActivity, ScanProgress};
pub use scanner::ScanEngine;
pub use store::ResultStore;
