//! Version numbers shared by every handle of a family.

use std::fmt;

/// A monotonically increasing version number.
///
/// Version 0 ([`Version::ORIGIN`]) is the creation version of the root map.
/// Every `copy()` allocates the next number; numbers are never reused.
///
/// # Examples
///
/// ```rust
/// use fastcopy::Version;
///
/// let origin = Version::ORIGIN;
/// assert_eq!(origin.get(), 0);
/// assert!(Version::new(3) > origin);
/// assert_eq!(Version::new(3).to_string(), "v3");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Version(u64);

impl Version {
    /// The version of a freshly created root map.
    pub const ORIGIN: Self = Self(0);

    /// Wraps a raw version number.
    #[inline]
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw version number.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "v{}", self.0)
    }
}

impl From<u64> for Version {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}
