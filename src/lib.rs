//! # fastcopy
//!
//! Fast-copyable, multi-version maps for replicated state machines.
//!
//! ## Overview
//!
//! A state machine that processes input in rounds often needs to keep the
//! state of several past rounds readable while the current round is being
//! written. Copying the whole table every round is too slow. This crate keeps
//! every round in one shared table instead:
//!
//! - **Versioned maps**: [`VersionedMap`] is the single mutable handle of a
//!   family. [`VersionedMap::copy`] freezes its contents into a [`Snapshot`]
//!   in O(1) and moves on to the next [`Version`].
//! - **Reclamation**: releasing (or dropping) a snapshot hands its version to
//!   a background worker, which prunes history no live version can reach.
//! - **One-to-many relations**: [`OneToMany`] keeps dense, pageable value
//!   slots per key on top of two versioned maps.
//! - **Invertible maps**: [`InvertibleMap`] pairs a forward map with a
//!   reverse relation.
//!
//! ## Threads
//!
//! Each family owns one reclamation worker thread, started with the family
//! and stopped when its last handle is dropped. Composite structures hold
//! one family per underlying map: a [`OneToMany`] runs two workers and an
//! [`InvertibleMap`] runs three. If a worker cannot be spawned, releases of
//! that family are reclaimed inline on the releasing thread.
//!
//! ## Feature Flags
//!
//! - `relation`: [`OneToMany`] and friends
//! - `invertible`: [`InvertibleMap`] (implies `relation`)
//! - `rebuild`: parallel reverse-index rebuild with rayon (implies
//!   `invertible`)
//! - `serde`: (de)serialisable [`FamilySettings`] and TOML loading
//! - `full`: Enable all features
//!
//! ## Example
//!
//! ```rust
//! use fastcopy::prelude::*;
//!
//! let mut state = VersionedMap::new();
//! state.put("a", 1);
//!
//! let round_0 = state.copy();
//! state.put("a", 2);
//!
//! assert_eq!(round_0.get("a").as_deref(), Some(&1));
//! assert_eq!(state.get("a").as_deref(), Some(&2));
//!
//! round_0.release().unwrap();
//! assert_eq!(state.get("a").as_deref(), Some(&2));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::redundant_closure_for_method_calls)]

/// Prelude module for convenient imports.
///
/// Re-exports the handle types of every enabled feature.
///
/// # Usage
///
/// ```rust
/// use fastcopy::prelude::*;
/// ```
pub mod prelude {
    pub use crate::map::{MapView, Snapshot, VersionedMap};
    pub use crate::settings::{BackpressurePolicy, FamilySettings};
    pub use crate::Version;

    #[cfg(feature = "relation")]
    pub use crate::relation::{OneToMany, OneToManySnapshot};

    #[cfg(feature = "invertible")]
    pub use crate::invertible::{InvertibleMap, InvertibleSnapshot};
}

pub mod error;
mod family;
pub mod map;
pub mod settings;
mod version;

#[cfg(feature = "relation")]
pub mod relation;

#[cfg(feature = "invertible")]
pub mod invertible;

pub use error::{
    FastCopyError, InvariantViolation, LifecycleError, RangeError, RebuildError, SettingsError,
};
pub use family::FamilyStats;
pub use map::{Entries, ForModify, InitialLoader, MapView, Snapshot, VersionedMap};
pub use settings::{BackpressurePolicy, FamilySettings};
pub use version::Version;

#[cfg(feature = "relation")]
pub use relation::{Associations, OneToMany, OneToManyLoader, OneToManySnapshot};

#[cfg(feature = "invertible")]
pub use invertible::{InvertibleMap, InvertibleSnapshot, KeysOf, SnapshotKeysOf};
