/// Folder summary tree: per-folder nodes with their own locks, the
/// aggregate/delta value types, and display sizes.
pub mod delta;
pub mod folder_node;
pub mod size;

pub use delta::{Aggregate, Delta, TimeBounds};
pub use folder_node::{
    names_match, paths_match, resolve_path, FolderNode, FolderState, FolderSummary,
};
pub use size::ByteSize;
