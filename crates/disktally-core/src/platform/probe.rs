/// Allocated-size probes.
///
/// The engine asks a [`SizeProbe`] for the bytes a file actually occupies on
/// disk (cluster-rounded, after compression and sparseness), which can differ
/// from its logical length in either direction. Reparse points are refused
/// with a distinct error so callers can tell "deliberately not measured"
/// from "failed".
use crate::error::ProbeError;
use std::path::Path;

/// Source of per-file allocated sizes.
pub trait SizeProbe: Send + Sync {
    fn allocated_size(&self, path: &Path) -> Result<u64, ProbeError>;
}

/// Probe backed by the local filesystem.
///
/// - Unix: `st_blocks * 512`; symlinks count as reparse points.
/// - Windows: `GetCompressedFileSizeW` rounded up to the volume's cluster
///   size; files carrying `FILE_ATTRIBUTE_REPARSE_POINT` are refused.
#[derive(Debug, Default)]
pub struct DiskSizeProbe {
    #[cfg(windows)]
    clusters: parking_lot::Mutex<std::collections::HashMap<std::path::PathBuf, u64>>,
}

impl DiskSizeProbe {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(unix)]
impl SizeProbe for DiskSizeProbe {
    fn allocated_size(&self, path: &Path) -> Result<u64, ProbeError> {
        use std::os::unix::fs::MetadataExt;

        let meta = std::fs::symlink_metadata(path).map_err(|e| ProbeError::io(path, e))?;
        if meta.file_type().is_symlink() {
            return Err(ProbeError::ReparsePoint {
                path: path.to_path_buf(),
            });
        }
        Ok(meta.blocks() * 512)
    }
}

#[cfg(windows)]
impl SizeProbe for DiskSizeProbe {
    fn allocated_size(&self, path: &Path) -> Result<u64, ProbeError> {
        use std::os::windows::fs::MetadataExt;

        const FILE_ATTRIBUTE_REPARSE_POINT: u32 = 0x400;

        let meta = std::fs::symlink_metadata(path).map_err(|e| ProbeError::io(path, e))?;
        if meta.file_attributes() & FILE_ATTRIBUTE_REPARSE_POINT != 0 {
            return Err(ProbeError::ReparsePoint {
                path: path.to_path_buf(),
            });
        }

        let size = compressed_size(path).map_err(|e| ProbeError::io(path, e))?;
        let cluster = self.cluster_size(path);
        Ok(round_up(size, cluster))
    }
}

#[cfg(windows)]
impl DiskSizeProbe {
    /// Allocation unit of the volume holding `path`, cached per volume root.
    fn cluster_size(&self, path: &Path) -> u64 {
        use std::path::Component;

        let root: std::path::PathBuf = path
            .components()
            .take_while(|c| matches!(c, Component::Prefix(_) | Component::RootDir))
            .collect();

        let mut clusters = self.clusters.lock();
        if let Some(&size) = clusters.get(&root) {
            return size;
        }
        let size = fs2::allocation_granularity(&root).unwrap_or(0);
        clusters.insert(root, size);
        size
    }
}

/// Raw `GetCompressedFileSizeW` call.
#[cfg(windows)]
fn compressed_size(path: &Path) -> std::io::Result<u64> {
    use std::os::windows::ffi::OsStrExt;
    use windows::core::PCWSTR;
    use windows::Win32::Foundation::{GetLastError, SetLastError, ERROR_SUCCESS};
    use windows::Win32::Storage::FileSystem::GetCompressedFileSizeW;

    let wide: Vec<u16> = path
        .as_os_str()
        .encode_wide()
        .chain(std::iter::once(0u16))
        .collect();
    let mut high: u32 = 0;

    // SAFETY: `wide` is a valid null-terminated UTF-16 string that outlives
    // the call, and `high` is a valid out-pointer. The thread's last-error
    // value is cleared first so a stale code cannot be read back below.
    let low = unsafe {
        SetLastError(ERROR_SUCCESS);
        GetCompressedFileSizeW(PCWSTR(wide.as_ptr()), Some(&mut high as *mut u32))
    };
    // SAFETY: reads the calling thread's last-error value; no pointers involved.
    let code = unsafe { GetLastError() };
    join_size_words(low, high, code.0)
}

/// Combine the two halves returned by `GetCompressedFileSizeW`.
///
/// An all-ones low word is also a legitimate size; it means failure only
/// when the last-error value is set.
#[cfg_attr(not(windows), allow(dead_code))]
fn join_size_words(low: u32, high: u32, last_error: u32) -> std::io::Result<u64> {
    const INVALID_FILE_SIZE: u32 = u32::MAX;

    if low == INVALID_FILE_SIZE && last_error != 0 {
        return Err(std::io::Error::from_raw_os_error(last_error as i32));
    }
    Ok(((high as u64) << 32) | low as u64)
}

#[cfg(not(any(unix, windows)))]
impl SizeProbe for DiskSizeProbe {
    fn allocated_size(&self, path: &Path) -> Result<u64, ProbeError> {
        let meta = std::fs::symlink_metadata(path).map_err(|e| ProbeError::io(path, e))?;
        if meta.file_type().is_symlink() {
            return Err(ProbeError::ReparsePoint {
                path: path.to_path_buf(),
            });
        }
        Ok(meta.len())
    }
}

/// Round `size` up to a whole number of `unit`s. A zero unit leaves it as is.
pub fn round_up(size: u64, unit: u64) -> u64 {
    if unit == 0 {
        size
    } else {
        size.div_ceil(unit).saturating_mul(unit)
    }
}
