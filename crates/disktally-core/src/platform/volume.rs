/// Volume capacity lookup for root folders.
///
/// Used only to scale displays (share of the disk a folder occupies); the
/// engine never updates it.
use crate::model::ByteSize;
use std::path::Path;

/// Capacity of the volume holding a root folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeInfo {
    /// Total capacity in bytes.
    pub total_bytes: u64,
    /// Space available to the current user in bytes.
    pub free_bytes: u64,
}

impl VolumeInfo {
    pub fn used_bytes(&self) -> u64 {
        self.total_bytes.saturating_sub(self.free_bytes)
    }

    /// Usage percentage (0.0–100.0).
    pub fn usage_percent(&self) -> f32 {
        ByteSize(self.used_bytes()).percent_of(self.total_bytes)
    }
}

/// Query the volume that contains `path`.
///
/// Returns `None` when the platform refuses the query (unmounted drive,
/// missing path); the descriptor is informational only.
pub fn volume_info(path: &Path) -> Option<VolumeInfo> {
    let total_bytes = match fs2::total_space(path) {
        Ok(total) => total,
        Err(err) => {
            tracing::debug!("volume query failed for {}: {err}", path.display());
            return None;
        }
    };
    let free_bytes = fs2::available_space(path).unwrap_or(0);
    Some(VolumeInfo {
        total_bytes,
        free_bytes,
    })
}
