//! Family-wide configuration.
//!
//! Every handle descended from one root map shares a single
//! [`FamilySettings`] value, fixed when the root is created.
//!
//! # Examples
//!
//! ```rust
//! use std::time::Duration;
//! use fastcopy::{BackpressurePolicy, FamilySettings};
//!
//! let settings = FamilySettings::default()
//!     .with_max_gc_queue_size(64)
//!     .with_gc_queue_warning_period(Duration::from_secs(5))
//!     .with_backpressure(BackpressurePolicy::Block);
//!
//! assert!(settings.validate().is_ok());
//! assert_eq!(settings.max_gc_queue_size, 64);
//! ```

use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::SettingsError;

const DEFAULT_MAX_GC_QUEUE_SIZE: usize = 200;
const DEFAULT_GC_QUEUE_WARNING_PERIOD: Duration = Duration::from_secs(60);
const DEFAULT_REBUILD_SPLIT_FACTOR: usize = 7;
const DEFAULT_SHARD_COUNT: usize = 32;

/// What `release()` does when the reclamation queue is over its threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum BackpressurePolicy {
    /// Never block. Emit a rate-limited warning and keep queueing.
    #[default]
    Warn,
    /// Block the releasing thread until the queue has room.
    ///
    /// Releasing from inside an async runtime under this policy panics,
    /// since the queue is a blocking channel there.
    Block,
}

/// Settings shared by all handles of one family.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct FamilySettings {
    /// Pending releases tolerated before the backpressure signal fires.
    /// Also the channel capacity under [`BackpressurePolicy::Block`].
    pub max_gc_queue_size: usize,

    /// Minimum time between two backpressure warnings.
    #[cfg_attr(feature = "serde", serde(with = "duration_text"))]
    pub gc_queue_warning_period: Duration,

    /// Keep reclaimed mutation records in a side archive instead of dropping them.
    pub archive_enabled: bool,

    /// Chunks handed to each worker when rebuilding an inverse index.
    pub rebuild_split_factor: usize,

    /// Worker threads used when rebuilding an inverse index.
    pub rebuild_thread_count: usize,

    /// Number of independently locked shards in the family table.
    pub shard_count: usize,

    /// Behaviour of `release()` under queue pressure.
    pub backpressure: BackpressurePolicy,
}

impl Default for FamilySettings {
    fn default() -> Self {
        Self {
            max_gc_queue_size: DEFAULT_MAX_GC_QUEUE_SIZE,
            gc_queue_warning_period: DEFAULT_GC_QUEUE_WARNING_PERIOD,
            archive_enabled: false,
            rebuild_split_factor: DEFAULT_REBUILD_SPLIT_FACTOR,
            rebuild_thread_count: num_cpus::get().max(1),
            shard_count: DEFAULT_SHARD_COUNT,
            backpressure: BackpressurePolicy::Warn,
        }
    }
}

impl FamilySettings {
    /// Sets the backpressure threshold.
    #[must_use]
    pub const fn with_max_gc_queue_size(mut self, size: usize) -> Self {
        self.max_gc_queue_size = size;
        self
    }

    /// Sets the minimum period between backpressure warnings.
    #[must_use]
    pub const fn with_gc_queue_warning_period(mut self, period: Duration) -> Self {
        self.gc_queue_warning_period = period;
        self
    }

    /// Enables or disables the reclamation archive.
    #[must_use]
    pub const fn with_archive_enabled(mut self, enabled: bool) -> Self {
        self.archive_enabled = enabled;
        self
    }

    /// Sets the number of chunks per rebuild worker.
    #[must_use]
    pub const fn with_rebuild_split_factor(mut self, factor: usize) -> Self {
        self.rebuild_split_factor = factor;
        self
    }

    /// Sets the number of rebuild workers.
    #[must_use]
    pub const fn with_rebuild_thread_count(mut self, count: usize) -> Self {
        self.rebuild_thread_count = count;
        self
    }

    /// Sets the number of lock shards.
    #[must_use]
    pub const fn with_shard_count(mut self, count: usize) -> Self {
        self.shard_count = count;
        self
    }

    /// Sets the backpressure policy.
    #[must_use]
    pub const fn with_backpressure(mut self, policy: BackpressurePolicy) -> Self {
        self.backpressure = policy;
        self
    }

    /// Checks that every numeric setting is usable.
    ///
    /// # Errors
    ///
    /// Returns the first [`SettingsError`] found, checking shard count,
    /// queue size, split factor and thread count in that order.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.shard_count == 0 {
            return Err(SettingsError::InvalidShardCount);
        }
        if self.max_gc_queue_size == 0 {
            return Err(SettingsError::InvalidQueueSize);
        }
        if self.rebuild_split_factor == 0 {
            return Err(SettingsError::InvalidSplitFactor);
        }
        if self.rebuild_thread_count == 0 {
            return Err(SettingsError::InvalidThreadCount);
        }
        Ok(())
    }

    /// Parses and validates settings from a TOML document.
    ///
    /// Missing fields keep their defaults. Durations are written in
    /// human-readable form such as `"90s"` or `"2min"`.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::Parse`] for malformed documents and the
    /// validation error for unusable values.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use std::time::Duration;
    /// use fastcopy::FamilySettings;
    ///
    /// let settings = FamilySettings::from_toml_str(
    ///     "max_gc_queue_size = 250\ngc_queue_warning_period = \"2min\"\narchive_enabled = true\n",
    /// )
    /// .unwrap();
    ///
    /// assert_eq!(settings.max_gc_queue_size, 250);
    /// assert_eq!(settings.gc_queue_warning_period, Duration::from_secs(120));
    /// assert!(settings.archive_enabled);
    /// ```
    #[cfg(feature = "serde")]
    pub fn from_toml_str(document: &str) -> Result<Self, SettingsError> {
        let settings: Self =
            toml::from_str(document).map_err(|error| SettingsError::Parse(error.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }
}

#[cfg(feature = "serde")]
mod duration_text {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&humantime::format_duration(*duration))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(serde::de::Error::custom)
    }
}
