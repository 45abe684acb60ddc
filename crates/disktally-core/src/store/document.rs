/// On-disk shape of the result forest.
///
/// The document is a pretty-printed JSON tree. Encoding is deterministic
/// (child order is list order, timestamps are fixed at millisecond
/// precision, optional attributes are omitted rather than nulled), so
/// encode → decode → encode reproduces the same bytes.
///
/// `fullName` is display text. A path that is not valid Unicode also gets
/// `fullNameBytes`, its exact platform encoding in base64, and decoding
/// prefers that field so the folder can still be listed after a reload.
use crate::error::StoreError;
use crate::model::folder_node::display_name;
use crate::model::{Aggregate, FolderNode, TimeBounds};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

pub const DOCUMENT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct ForestDocument {
    pub version: u32,
    #[serde(default)]
    pub roots: Vec<FolderRecord>,
}

/// One persisted folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FolderRecord {
    pub name: String,
    pub full_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name_bytes: Option<String>,
    pub size: u64,
    pub total_files: u64,
    pub total_subfolders: u64,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_root: bool,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "timestamp")]
    pub oldest: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "timestamp")]
    pub newest: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "timestamp")]
    pub last_scan_utc: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subfolders: Vec<FolderRecord>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Canonical timestamp text: RFC 3339, UTC, milliseconds.
pub fn format_timestamp(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

mod timestamp {
    use super::format_timestamp;
    use chrono::{DateTime, Utc};
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(time) => serializer.serialize_str(&format_timestamp(time)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        raw.map(|text| {
            DateTime::parse_from_rfc3339(&text)
                .map(|time| time.with_timezone(&Utc))
                .map_err(D::Error::custom)
        })
        .transpose()
    }
}

/// Encode a folder and its qualifying descendants.
///
/// A folder is written when it has been scanned, or when at least one of
/// its descendants is written. Pure placeholders vanish from the document
/// and are re-synthesized by later merges.
pub(crate) fn encode_node(node: &FolderNode) -> Option<FolderRecord> {
    // Copy out under the lock, then recurse without holding it.
    let (aggregate, last_scan, placeholder, children) = {
        let state = node.lock();
        (
            state.aggregate(),
            state.last_scan,
            state.is_placeholder(),
            state.children().to_vec(),
        )
    };

    let subfolders: Vec<FolderRecord> = children.iter().filter_map(|c| encode_node(c)).collect();
    if placeholder && subfolders.is_empty() {
        return None;
    }

    let (oldest, newest) = if aggregate.bounds.is_valid() {
        (Some(aggregate.bounds.oldest), Some(aggregate.bounds.newest))
    } else {
        (None, None)
    };

    Some(FolderRecord {
        name: node.name().to_string(),
        full_name: node.path().to_string_lossy().into_owned(),
        full_name_bytes: raw_path::encode(node.path()),
        size: aggregate.size,
        total_files: aggregate.files,
        total_subfolders: aggregate.subfolders,
        is_root: node.is_root(),
        oldest,
        newest,
        last_scan_utc: last_scan,
        subfolders,
    })
}

/// Rebuild a folder subtree, wiring parent links on the way down.
pub(crate) fn decode_node(record: FolderRecord) -> Arc<FolderNode> {
    let bounds = match (record.oldest, record.newest) {
        (Some(oldest), Some(newest)) => TimeBounds { oldest, newest },
        _ => TimeBounds::invalid(),
    };
    let path = match record.full_name_bytes.as_deref() {
        Some(encoded) => raw_path::decode(encoded).unwrap_or_else(|| {
            warn!("Unreadable fullNameBytes for {}, using fullName", record.full_name);
            PathBuf::from(&record.full_name)
        }),
        None => PathBuf::from(&record.full_name),
    };
    let node = FolderNode::build(display_name(&path), path, record.is_root);
    node.restore(
        Aggregate {
            size: record.size,
            files: record.total_files,
            subfolders: record.total_subfolders,
            bounds,
        },
        record.last_scan_utc,
    );
    for child_record in record.subfolders {
        let child = decode_node(child_record);
        child.set_parent(&node);
        node.push_child_unchecked(child);
    }
    node
}

/// Exact platform encoding of paths that are not valid Unicode.
mod raw_path {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use std::path::{Path, PathBuf};

    /// `None` when the path is valid Unicode and `fullName` is exact.
    pub fn encode(path: &Path) -> Option<String> {
        if path.to_str().is_some() {
            return None;
        }
        native_bytes(path).map(|bytes| STANDARD.encode(bytes))
    }

    pub fn decode(encoded: &str) -> Option<PathBuf> {
        let bytes = STANDARD.decode(encoded).ok()?;
        from_native_bytes(bytes)
    }

    #[cfg(unix)]
    fn native_bytes(path: &Path) -> Option<Vec<u8>> {
        use std::os::unix::ffi::OsStrExt;
        Some(path.as_os_str().as_bytes().to_vec())
    }

    #[cfg(unix)]
    fn from_native_bytes(bytes: Vec<u8>) -> Option<PathBuf> {
        use std::os::unix::ffi::OsStringExt;
        Some(PathBuf::from(std::ffi::OsString::from_vec(bytes)))
    }

    /// UTF-16 code units, little-endian.
    #[cfg(windows)]
    fn native_bytes(path: &Path) -> Option<Vec<u8>> {
        use std::os::windows::ffi::OsStrExt;
        Some(
            path.as_os_str()
                .encode_wide()
                .flat_map(u16::to_le_bytes)
                .collect(),
        )
    }

    #[cfg(windows)]
    fn from_native_bytes(bytes: Vec<u8>) -> Option<PathBuf> {
        use std::os::windows::ffi::OsStringExt;
        if bytes.len() % 2 != 0 {
            return None;
        }
        let wide: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        Some(PathBuf::from(std::ffi::OsString::from_wide(&wide)))
    }

    #[cfg(not(any(unix, windows)))]
    fn native_bytes(_path: &Path) -> Option<Vec<u8>> {
        None
    }

    #[cfg(not(any(unix, windows)))]
    fn from_native_bytes(_bytes: Vec<u8>) -> Option<PathBuf> {
        None
    }
}

pub(crate) fn to_json(roots: &[Arc<FolderNode>]) -> Result<String, StoreError> {
    let document = ForestDocument {
        version: DOCUMENT_VERSION,
        roots: roots.iter().filter_map(|root| encode_node(root)).collect(),
    };
    Ok(serde_json::to_string_pretty(&document)?)
}

pub(crate) fn from_json(text: &str) -> Result<Vec<Arc<FolderNode>>, StoreError> {
    // Folder trees can nest deeper than serde_json's default limit.
    let mut deserializer = serde_json::Deserializer::from_str(text);
    deserializer.disable_recursion_limit();
    let document = ForestDocument::deserialize(&mut deserializer)?;
    deserializer.end()?;

    if document.version != DOCUMENT_VERSION {
        return Err(StoreError::UnsupportedVersion(document.version));
    }
    Ok(document.roots.into_iter().map(decode_node).collect())
}
