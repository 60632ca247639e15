//! Error types for versioned maps and the structures built on them.
//!
//! Each failure class has its own type so callers can tell a misuse of the
//! handle lifecycle apart from a pagination mistake or from a defect inside
//! the data structure itself:
//!
//! - [`LifecycleError`]: a version was released twice or never existed.
//! - [`RangeError`]: a paginated read asked for slots outside `0..count`.
//! - [`InvariantViolation`]: the structure's own bookkeeping disagrees with
//!   itself. This is a bug signal, never a user error.
//! - [`SettingsError`]: a [`FamilySettings`](crate::FamilySettings) value is
//!   unusable.
//! - [`RebuildError`]: a parallel index rebuild could not be started.
//!
//! [`FastCopyError`] unifies all of them for callers that only propagate.

use std::error::Error;
use std::fmt;

use crate::Version;

// =============================================================================
// LifecycleError
// =============================================================================

/// Represents a violation of the handle lifecycle.
///
/// Handles are consumed by `release`, so most lifecycle misuse is rejected at
/// compile time. The family store still checks every release it receives and
/// reports the ones that cannot be honoured.
///
/// # Examples
///
/// ```rust
/// use fastcopy::{LifecycleError, Version};
///
/// let error = LifecycleError::AlreadyReleased { version: Version::new(4) };
/// assert_eq!(error.to_string(), "version v4 has already been released");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleError {
    /// The version was released before.
    AlreadyReleased {
        /// The version named in the release.
        version: Version,
    },
    /// The version was never issued by this family.
    UnknownVersion {
        /// The version named in the release.
        version: Version,
    },
}

impl fmt::Display for LifecycleError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyReleased { version } => {
                write!(formatter, "version {version} has already been released")
            }
            Self::UnknownVersion { version } => {
                write!(formatter, "version {version} was never issued by this family")
            }
        }
    }
}

impl Error for LifecycleError {}

// =============================================================================
// RangeError
// =============================================================================

/// A paginated read asked for slots outside the dense range of a key.
///
/// # Examples
///
/// ```rust
/// use fastcopy::RangeError;
///
/// let error = RangeError { start: 2, end: 9, count: 5 };
/// assert_eq!(
///     error.to_string(),
///     "requested slots 2..9 but only 0..5 are populated"
/// );
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeError {
    /// First requested slot (inclusive).
    pub start: usize,
    /// Last requested slot (exclusive).
    pub end: usize,
    /// Number of populated slots for the key.
    pub count: usize,
}

impl fmt::Display for RangeError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            formatter,
            "requested slots {}..{} but only 0..{} are populated",
            self.start, self.end, self.count
        )
    }
}

impl Error for RangeError {}

// =============================================================================
// InvariantViolation
// =============================================================================

/// The structure's internal bookkeeping is inconsistent.
///
/// Returned when, for example, a one-to-many relation's reverse lookup points
/// at a slot that does not hold the expected association. It indicates a
/// defect in the data structure, not a misuse by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvariantViolation {
    /// The structure that detected the problem.
    pub structure: &'static str,
    /// What was expected and what was found.
    pub detail: String,
}

impl InvariantViolation {
    pub(crate) fn new(structure: &'static str, detail: impl Into<String>) -> Self {
        Self {
            structure,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            formatter,
            "internal invariant broken in {}: {}",
            self.structure, self.detail
        )
    }
}

impl Error for InvariantViolation {}

// =============================================================================
// SettingsError
// =============================================================================

/// A settings value that cannot be used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingsError {
    /// `shard_count` was zero.
    InvalidShardCount,
    /// `max_gc_queue_size` was zero.
    InvalidQueueSize,
    /// `rebuild_split_factor` was zero.
    InvalidSplitFactor,
    /// `rebuild_thread_count` was zero.
    InvalidThreadCount,
    /// A settings document could not be parsed.
    Parse(String),
}

impl fmt::Display for SettingsError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidShardCount => write!(formatter, "shard_count must be greater than 0"),
            Self::InvalidQueueSize => {
                write!(formatter, "max_gc_queue_size must be greater than 0")
            }
            Self::InvalidSplitFactor => {
                write!(formatter, "rebuild_split_factor must be greater than 0")
            }
            Self::InvalidThreadCount => {
                write!(formatter, "rebuild_thread_count must be greater than 0")
            }
            Self::Parse(message) => write!(formatter, "invalid settings document: {message}"),
        }
    }
}

impl Error for SettingsError {}

// =============================================================================
// RebuildError
// =============================================================================

/// A parallel index rebuild could not be carried out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebuildError {
    /// The settings used for the rebuild were invalid.
    Settings(SettingsError),
    /// The worker pool could not be created.
    ThreadPool(String),
}

impl fmt::Display for RebuildError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Settings(error) => write!(formatter, "rebuild settings rejected: {error}"),
            Self::ThreadPool(message) => {
                write!(formatter, "rebuild thread pool unavailable: {message}")
            }
        }
    }
}

impl Error for RebuildError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Settings(error) => Some(error),
            Self::ThreadPool(_) => None,
        }
    }
}

impl From<SettingsError> for RebuildError {
    fn from(error: SettingsError) -> Self {
        Self::Settings(error)
    }
}

// =============================================================================
// FastCopyError
// =============================================================================

/// Any error produced by this crate.
///
/// # Examples
///
/// ```rust
/// use fastcopy::{FastCopyError, RangeError};
///
/// let error: FastCopyError = RangeError { start: 0, end: 1, count: 0 }.into();
/// assert!(matches!(error, FastCopyError::Range(_)));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FastCopyError {
    /// See [`LifecycleError`].
    Lifecycle(LifecycleError),
    /// See [`RangeError`].
    Range(RangeError),
    /// See [`InvariantViolation`].
    Invariant(InvariantViolation),
    /// See [`SettingsError`].
    Settings(SettingsError),
    /// See [`RebuildError`].
    Rebuild(RebuildError),
}

impl fmt::Display for FastCopyError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lifecycle(error) => write!(formatter, "{error}"),
            Self::Range(error) => write!(formatter, "{error}"),
            Self::Invariant(error) => write!(formatter, "{error}"),
            Self::Settings(error) => write!(formatter, "{error}"),
            Self::Rebuild(error) => write!(formatter, "{error}"),
        }
    }
}

impl Error for FastCopyError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Lifecycle(error) => Some(error),
            Self::Range(error) => Some(error),
            Self::Invariant(error) => Some(error),
            Self::Settings(error) => Some(error),
            Self::Rebuild(error) => Some(error),
        }
    }
}

impl From<LifecycleError> for FastCopyError {
    fn from(error: LifecycleError) -> Self {
        Self::Lifecycle(error)
    }
}

impl From<RangeError> for FastCopyError {
    fn from(error: RangeError) -> Self {
        Self::Range(error)
    }
}

impl From<InvariantViolation> for FastCopyError {
    fn from(error: InvariantViolation) -> Self {
        Self::Invariant(error)
    }
}

impl From<SettingsError> for FastCopyError {
    fn from(error: SettingsError) -> Self {
        Self::Settings(error)
    }
}

impl From<RebuildError> for FastCopyError {
    fn from(error: RebuildError) -> Self {
        Self::Rebuild(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn test_unknown_version_display() {
        let error = LifecycleError::UnknownVersion {
            version: Version::new(12),
        };
        assert_eq!(
            error.to_string(),
            "version v12 was never issued by this family"
        );
    }

    #[rstest]
    fn test_invariant_violation_display() {
        let error = InvariantViolation::new("one-to-many relation", "slot 3 is empty");
        assert_eq!(
            error.to_string(),
            "internal invariant broken in one-to-many relation: slot 3 is empty"
        );
    }

    #[rstest]
    #[case(SettingsError::InvalidShardCount, "shard_count must be greater than 0")]
    #[case(SettingsError::InvalidQueueSize, "max_gc_queue_size must be greater than 0")]
    #[case(
        SettingsError::Parse("expected a table".to_string()),
        "invalid settings document: expected a table"
    )]
    fn test_settings_error_display(#[case] error: SettingsError, #[case] expected: &str) {
        assert_eq!(error.to_string(), expected);
    }

    #[rstest]
    fn test_rebuild_error_exposes_settings_source() {
        let error = RebuildError::from(SettingsError::InvalidThreadCount);
        assert!(error.source().is_some());
        assert_eq!(
            error.to_string(),
            "rebuild settings rejected: rebuild_thread_count must be greater than 0"
        );
    }

    #[rstest]
    fn test_unified_error_preserves_message() {
        let error = FastCopyError::from(LifecycleError::AlreadyReleased {
            version: Version::ORIGIN,
        });
        assert_eq!(error.to_string(), "version v0 has already been released");
    }
}
