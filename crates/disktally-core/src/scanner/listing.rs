/// Shallow, single-level folder listing.
///
/// Uses `jwalk` in serial mode with a depth window of exactly one level, so
/// each call reads one directory on the scanner thread. Entries that cannot
/// be read are counted and skipped; an unreadable folder lists as empty.
use chrono::{DateTime, Utc};
use jwalk::{Parallelism, WalkDir};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// A non-directory entry to be measured.
#[derive(Debug, Clone)]
pub struct FileEntry {
    pub path: PathBuf,
    /// Last write time, when the metadata could be read.
    pub modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
pub struct Listing {
    /// Names of immediate child directories (symlinked directories excluded).
    pub folders: Vec<OsString>,
    pub files: Vec<FileEntry>,
    /// Entries skipped because of read or metadata errors.
    pub errors: u64,
    /// `false` when cancellation cut the listing short.
    pub complete: bool,
}

/// List the immediate children of `path`.
///
/// `with_files` skips per-file metadata reads for reconciliation, which only
/// needs directory names.
pub fn list_folder(path: &Path, with_files: bool, cancel: &AtomicBool) -> Listing {
    let mut listing = Listing {
        complete: true,
        ..Listing::default()
    };

    let walker = WalkDir::new(path)
        .min_depth(1)
        .max_depth(1)
        .skip_hidden(false)
        .follow_links(false)
        .sort(true)
        .parallelism(Parallelism::Serial);

    for (i, entry_result) in walker.into_iter().enumerate() {
        if i % 256 == 0 && cancel.load(Ordering::Relaxed) {
            listing.complete = false;
            return listing;
        }

        let entry = match entry_result {
            Ok(entry) => entry,
            Err(err) => {
                debug!("Skipping unreadable entry under {}: {err}", path.display());
                listing.errors += 1;
                continue;
            }
        };

        if entry.file_type().is_dir() {
            listing.folders.push(entry.file_name().to_os_string());
        } else if with_files {
            let modified = match entry.metadata() {
                Ok(meta) => meta.modified().ok().map(DateTime::<Utc>::from),
                Err(err) => {
                    debug!("Skipping {}: {err}", entry.path().display());
                    listing.errors += 1;
                    continue;
                }
            };
            listing.files.push(FileEntry {
                path: entry.path(),
                modified,
            });
        }
    }

    listing
}
