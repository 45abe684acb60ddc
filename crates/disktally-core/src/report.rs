/// CSV export of the result forest.
///
/// One row per folder, depth-first in forest order, parents before children.
use crate::error::ReportError;
use crate::model::FolderNode;
use crate::store::{format_timestamp, ResultStore};
use serde::Serialize;
use std::io::Write;
use std::sync::Arc;

#[derive(Debug, Serialize)]
struct FolderRow {
    path: String,
    size: u64,
    total_files: u64,
    total_subfolders: u64,
    oldest: Option<String>,
    newest: Option<String>,
    last_scan: Option<String>,
}

impl FolderRow {
    fn from_node(node: &FolderNode) -> Self {
        let state = node.lock();
        let (oldest, newest) = if state.bounds.is_valid() {
            (
                Some(format_timestamp(&state.bounds.oldest)),
                Some(format_timestamp(&state.bounds.newest)),
            )
        } else {
            (None, None)
        };
        Self {
            path: node.path().to_string_lossy().into_owned(),
            size: state.size,
            total_files: state.total_files,
            total_subfolders: state.total_subfolders,
            oldest,
            newest,
            last_scan: state.last_scan.as_ref().map(format_timestamp),
        }
    }
}

/// Write every stored folder to `writer`. Returns the number of rows.
pub fn write_csv<W: Write>(store: &ResultStore, writer: W) -> Result<usize, ReportError> {
    let mut csv = csv::Writer::from_writer(writer);
    let mut rows = 0;
    let mut stack: Vec<Arc<FolderNode>> = store.roots().into_iter().rev().collect();

    while let Some(node) = stack.pop() {
        csv.serialize(FolderRow::from_node(&node))?;
        rows += 1;
        stack.extend(node.children().into_iter().rev());
    }

    csv.flush()?;
    Ok(rows)
}
