/// Engine tuning knobs.
///
/// Every field has a default matching the stock retention and checkpoint
/// policy, so a partial JSON file (or none at all) is always valid.
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One gibibyte, the default cull floor and interrupt threshold.
pub const GIB: u64 = 1024 * 1024 * 1024;

/// Folders smaller than this (and below [`DEFAULT_CULL_COUNT_FLOOR`]
/// entries) lose their detail once their parent is tabulated.
pub const DEFAULT_CULL_SIZE_FLOOR: u64 = GIB;

/// Combined file + subfolder count below which a small folder is culled.
pub const DEFAULT_CULL_COUNT_FLOOR: u64 = 250;

/// Size change after which a tabulating pass yields back to its driver loop.
pub const DEFAULT_INTERRUPT_THRESHOLD: u64 = GIB;

pub const DEFAULT_CHECKPOINT_INTERVAL_SECS: u64 = 120;

pub const DEFAULT_PROGRESS_INTERVAL_SECS: u64 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Size floor (bytes) for keeping a child folder's detail.
    pub cull_size_floor: u64,
    /// Entry-count floor (files + subfolders) for keeping a child folder's detail.
    pub cull_count_floor: u64,
    /// Accumulated size change (bytes) that interrupts a tabulating pass.
    pub interrupt_threshold: u64,
    /// Minimum time between partial checkpoints.
    pub checkpoint_interval_secs: u64,
    /// Cadence of progress counter flushes during file enumeration.
    pub progress_interval_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cull_size_floor: DEFAULT_CULL_SIZE_FLOOR,
            cull_count_floor: DEFAULT_CULL_COUNT_FLOOR,
            interrupt_threshold: DEFAULT_INTERRUPT_THRESHOLD,
            checkpoint_interval_secs: DEFAULT_CHECKPOINT_INTERVAL_SECS,
            progress_interval_secs: DEFAULT_PROGRESS_INTERVAL_SECS,
        }
    }
}

impl EngineConfig {
    pub fn checkpoint_interval(&self) -> Duration {
        Duration::from_secs(self.checkpoint_interval_secs)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_secs(self.progress_interval_secs)
    }

    /// Parse a JSON config; missing fields take their defaults.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// `true` if a tabulated child with these totals should be culled.
    pub fn should_cull(&self, size: u64, files: u64, subfolders: u64) -> bool {
        size < self.cull_size_floor && files.saturating_add(subfolders) < self.cull_count_floor
    }
}
