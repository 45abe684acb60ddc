/// Aggregate values carried by a folder and the signed deltas used to move
/// them without re-tabulating a subtree.
use chrono::{DateTime, Utc};
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub};

/// Oldest/newest modification time across every file in a subtree.
///
/// The invalid pair (`oldest = MAX`, `newest = MIN`) is both the "unknown"
/// marker and the identity for [`TimeBounds::merge`], so folding an empty
/// folder into its parent changes nothing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeBounds {
    pub oldest: DateTime<Utc>,
    pub newest: DateTime<Utc>,
}

impl TimeBounds {
    pub const fn invalid() -> Self {
        Self {
            oldest: DateTime::<Utc>::MAX_UTC,
            newest: DateTime::<Utc>::MIN_UTC,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.oldest <= self.newest
    }

    /// Widen the bounds to cover one file's modification time.
    pub fn include(&mut self, time: DateTime<Utc>) {
        self.oldest = self.oldest.min(time);
        self.newest = self.newest.max(time);
    }

    pub fn merge(&mut self, other: &TimeBounds) {
        self.oldest = self.oldest.min(other.oldest);
        self.newest = self.newest.max(other.newest);
    }
}

impl Default for TimeBounds {
    fn default() -> Self {
        Self::invalid()
    }
}

/// Snapshot of a folder's tabulated totals.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Aggregate {
    /// Allocated bytes of every contained file.
    pub size: u64,
    /// Files in this folder and all descendants.
    pub files: u64,
    /// Descendant folders, not counting the folder itself.
    pub subfolders: u64,
    pub bounds: TimeBounds,
}

impl Aggregate {
    /// Fold a fully tabulated child into this (parent) aggregate. The child
    /// folder itself counts as one subfolder.
    pub fn absorb_child(&mut self, child: &Aggregate) {
        self.size = self.size.saturating_add(child.size);
        self.files = self.files.saturating_add(child.files);
        self.subfolders = self.subfolders.saturating_add(child.subfolders + 1);
        self.bounds.merge(&child.bounds);
    }

    pub fn absorb_file(&mut self, size: u64, modified: Option<DateTime<Utc>>) {
        self.size = self.size.saturating_add(size);
        self.files += 1;
        if let Some(time) = modified {
            self.bounds.include(time);
        }
    }

    /// Apply a delta to the counters. Bounds are left alone; callers decide
    /// whether the result is still authoritative.
    pub fn apply(&mut self, delta: Delta) {
        self.size = self.size.saturating_add_signed(delta.size);
        self.files = self.files.saturating_add_signed(delta.files);
        self.subfolders = self.subfolders.saturating_add_signed(delta.subfolders);
    }
}

/// Signed change to `(size, files, subfolders)`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Delta {
    pub size: i64,
    pub files: i64,
    pub subfolders: i64,
}

impl Delta {
    pub const ZERO: Delta = Delta {
        size: 0,
        files: 0,
        subfolders: 0,
    };

    pub const fn new(size: i64, files: i64, subfolders: i64) -> Self {
        Self {
            size,
            files,
            subfolders,
        }
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    /// The change that turns `before` into `after`.
    pub fn between(before: &Aggregate, after: &Aggregate) -> Self {
        Self {
            size: signed(after.size) - signed(before.size),
            files: signed(after.files) - signed(before.files),
            subfolders: signed(after.subfolders) - signed(before.subfolders),
        }
    }

    /// Negative contribution of a removed folder, including the folder itself.
    pub fn removal_of(child: &Aggregate) -> Self {
        -Self {
            size: signed(child.size),
            files: signed(child.files),
            subfolders: signed(child.subfolders) + 1,
        }
    }

    /// A freshly discovered, still empty folder.
    pub const fn new_folder() -> Self {
        Self::new(0, 0, 1)
    }
}

impl Add for Delta {
    type Output = Delta;

    fn add(self, rhs: Delta) -> Delta {
        Delta {
            size: self.size + rhs.size,
            files: self.files + rhs.files,
            subfolders: self.subfolders + rhs.subfolders,
        }
    }
}

impl AddAssign for Delta {
    fn add_assign(&mut self, rhs: Delta) {
        *self = *self + rhs;
    }
}

impl Sub for Delta {
    type Output = Delta;

    fn sub(self, rhs: Delta) -> Delta {
        self + -rhs
    }
}

impl Neg for Delta {
    type Output = Delta;

    fn neg(self) -> Delta {
        Delta {
            size: -self.size,
            files: -self.files,
            subfolders: -self.subfolders,
        }
    }
}

impl Sum for Delta {
    fn sum<I: Iterator<Item = Delta>>(iter: I) -> Delta {
        iter.fold(Delta::ZERO, Add::add)
    }
}

#[inline]
fn signed(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
