use std::fmt;

/// A linear position on the tape: `rank * block_size + offset`.
///
/// Locations totally order every byte ever written to the tape, which is what
/// the repeat controller compares against its `free_push` boundary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Location(pub usize);

impl Location {
    pub const START: Location = Location(0);

    #[inline]
    #[must_use]
    pub fn new(rank: usize, offset: usize, block_size: usize) -> Self {
        Self(rank * block_size + offset)
    }

    #[inline]
    #[must_use]
    pub fn bytes(self) -> usize {
        self.0
    }

    #[inline]
    #[must_use]
    pub fn rank(self, block_size: usize) -> usize {
        self.0 / block_size
    }

    #[inline]
    #[must_use]
    pub fn offset(self, block_size: usize) -> usize {
        self.0 % block_size
    }

    /// Renders the location as `rank.offset`, e.g. `1.00012`.
    #[must_use]
    pub fn display(self, block_size: usize) -> LocationDisplay {
        LocationDisplay {
            location: self,
            block_size,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LocationDisplay {
    location: Location,
    block_size: usize,
}

impl fmt::Display for LocationDisplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{:05}",
            self.location.rank(self.block_size),
            self.location.offset(self.block_size)
        )
    }
}
