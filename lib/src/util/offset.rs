use std::fmt;
use std::ops::{Add, Sub};

/// Byte offset from the start of a method body
///
/// Offsets are always non-negative. The difference of two offsets is a signed `isize`, which is
/// exactly the relative jump distance the JVM encodes in branch instructions.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Default)]
pub struct Offset(pub usize);

impl Offset {
    /// Offset `by` bytes further along
    pub fn advance(self, by: usize) -> Offset {
        Offset(self.0 + by)
    }
}

impl Sub for Offset {
    type Output = isize;

    fn sub(self, other: Offset) -> isize {
        (self.0 as isize) - (other.0 as isize)
    }
}

impl Add<usize> for Offset {
    type Output = Offset;

    fn add(self, other: usize) -> Offset {
        self.advance(other)
    }
}

impl fmt::Debug for Offset {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_fmt(format_args!("@{}", self.0))
    }
}
