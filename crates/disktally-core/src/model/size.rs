/// Byte counts with units, for display only.
///
/// All engine arithmetic is plain `u64` bytes. Floating point appears only
/// at this formatting boundary.
use std::fmt;

const KB: f64 = 1024.0;
const MB: f64 = KB * 1024.0;
const GB: f64 = MB * 1024.0;
const TB: f64 = GB * 1024.0;

/// A byte count that renders with a binary unit (`KB` = 1024 bytes).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ByteSize(pub u64);

impl ByteSize {
    pub fn bytes(self) -> u64 {
        self.0
    }

    /// Share of `total` in percent, 0.0 when `total` is zero.
    pub fn percent_of(self, total: u64) -> f32 {
        if total == 0 {
            0.0
        } else {
            (self.0 as f64 / total as f64 * 100.0) as f32
        }
    }
}

impl From<u64> for ByteSize {
    fn from(bytes: u64) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.0 as f64;
        if b < KB {
            write!(f, "{} B", self.0)
        } else if b < MB {
            write!(f, "{:.1} KB", b / KB)
        } else if b < GB {
            write!(f, "{:.1} MB", b / MB)
        } else if b < TB {
            write!(f, "{:.2} GB", b / GB)
        } else {
            write!(f, "{:.2} TB", b / TB)
        }
    }
}
