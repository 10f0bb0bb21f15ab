//! Source locations.

use core::fmt;

use crate::files::FileRef;

/// A half-open byte range within some file.
#[derive(Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub struct LocOffsets {
    /// Byte offset of the first character.
    pub begin: u32,
    /// Byte offset one past the last character.
    pub end: u32,
}

impl LocOffsets {
    /// The detached sentinel range. Compares unequal to every real range.
    pub const NONE: LocOffsets = LocOffsets {
        begin: u32::MAX,
        end: u32::MAX,
    };

    /// Creates a range over `begin..end`.
    pub fn new(begin: u32, end: u32) -> Self {
        Self { begin, end }
    }

    /// Whether this is a real range rather than the sentinel.
    pub fn exists(&self) -> bool {
        *self != Self::NONE
    }

    /// The smallest range covering both `self` and `other`.
    pub fn join(self, other: LocOffsets) -> LocOffsets {
        if !self.exists() {
            return other;
        }
        if !other.exists() {
            return self;
        }
        LocOffsets::new(self.begin.min(other.begin), self.end.max(other.end))
    }

    /// An empty range at the begin offset.
    pub fn collapse_to_begin(self) -> LocOffsets {
        if !self.exists() {
            return self;
        }
        LocOffsets::new(self.begin, self.begin)
    }
}

impl fmt::Debug for LocOffsets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.exists() {
            return write!(f, "???");
        }
        write!(f, "{}..{}", self.begin, self.end)
    }
}

/// A byte range within a specific file.
///
/// The sentinel [`Loc::NONE`] never equals a real location, so a plain `==`
/// on two existing locations is also an existence check.
#[derive(Clone, Copy, Hash, serde::Serialize)]
pub struct Loc {
    /// The file the range points into.
    pub file: FileRef,
    /// The byte range.
    pub offsets: LocOffsets,
}

impl Loc {
    /// The detached sentinel location.
    pub const NONE: Loc = Loc {
        file: FileRef::NONE,
        offsets: LocOffsets::NONE,
    };

    /// Creates a location over `offsets` in `file`.
    pub fn new(file: FileRef, offsets: LocOffsets) -> Self {
        Self { file, offsets }
    }

    /// Whether this is a real location rather than the sentinel.
    pub fn exists(&self) -> bool {
        self.file.exists() && self.offsets.exists()
    }
}

impl PartialEq for Loc {
    fn eq(&self, other: &Self) -> bool {
        // The sentinel is unequal to everything, including itself.
        if !self.exists() || !other.exists() {
            return false;
        }
        self.file == other.file && self.offsets == other.offsets
    }
}

impl fmt::Debug for Loc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.exists() {
            return write!(f, "Loc(???)");
        }
        write!(f, "Loc({:?}@{:?})", self.file, self.offsets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_compares_unequal_to_everything() {
        let real = Loc::new(FileRef::from_index(0), LocOffsets::new(0, 4));
        assert_ne!(Loc::NONE, real);
        assert_ne!(real, Loc::NONE);
        assert_ne!(Loc::NONE, Loc::NONE);
        assert_eq!(real, real);
    }

    #[test]
    fn join_covers_both_ranges() {
        let a = LocOffsets::new(4, 8);
        let b = LocOffsets::new(6, 12);
        assert_eq!(a.join(b), LocOffsets::new(4, 12));
        assert_eq!(LocOffsets::NONE.join(b), b);
    }
}
