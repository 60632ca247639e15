//! Per-key mutation history.
//!
//! A [`MutationChain`] holds every surviving write to one key, ordered from
//! the oldest version to the newest. A record with `value == None` is a
//! tombstone: the key was removed at that version.
//!
//! Lookups walk backwards from the newest record, so a key that is written
//! at most once every few versions resolves in a step or two.

use std::collections::BTreeSet;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::Version;

/// Records kept inline before a chain spills to the heap.
const INLINE_RECORDS: usize = 2;

/// One write to a key.
#[derive(Debug, Clone)]
pub(crate) struct Mutation<V> {
    pub(crate) version: Version,
    pub(crate) value: Option<Arc<V>>,
}

impl<V> Mutation<V> {
    const fn is_tombstone(&self) -> bool {
        self.value.is_none()
    }
}

pub(crate) type Records<V> = SmallVec<[Mutation<V>; INLINE_RECORDS]>;

/// The write history of a single key.
///
/// Invariant: versions strictly increase from the first record to the last.
#[derive(Debug, Clone)]
pub(crate) struct MutationChain<V> {
    records: Records<V>,
}

impl<V> MutationChain<V> {
    /// Starts a chain with a single value written at `version`.
    pub(crate) fn with_value(version: Version, value: Arc<V>) -> Self {
        let mut records = Records::new();
        records.push(Mutation {
            version,
            value: Some(value),
        });
        Self { records }
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The newest record whose version is `<= version`.
    pub(crate) fn resolve(&self, version: Version) -> Option<&Mutation<V>> {
        self.records
            .iter()
            .rev()
            .find(|record| record.version <= version)
    }

    /// The value visible at `version`, if any.
    pub(crate) fn visible(&self, version: Version) -> Option<&Arc<V>> {
        self.resolve(version).and_then(|record| record.value.as_ref())
    }

    /// The value written exactly at `version`, when it is the newest record.
    pub(crate) fn written_at_mut(&mut self, version: Version) -> Option<&mut Arc<V>> {
        self.records
            .last_mut()
            .filter(|record| record.version == version)
            .and_then(|record| record.value.as_mut())
    }

    /// Writes `value` at `version`, overwriting a record already at that
    /// version.
    ///
    /// Returns `true` when a new record was appended on top of older history,
    /// which is the case the reclamation index has to hear about.
    pub(crate) fn write(&mut self, version: Version, value: Arc<V>) -> bool {
        match self.records.last_mut() {
            Some(last) if last.version == version => {
                last.value = Some(value);
                false
            }
            Some(last) => {
                debug_assert!(last.version < version, "write below the newest record");
                self.records.push(Mutation {
                    version,
                    value: Some(value),
                });
                true
            }
            None => {
                self.records.push(Mutation {
                    version,
                    value: Some(value),
                });
                false
            }
        }
    }

    /// Hides the key from `version` onwards.
    ///
    /// A record already written at `version` is discarded first; a tombstone
    /// is only appended when an older value would otherwise show through.
    /// Returns `true` when a tombstone was appended on top of older history.
    pub(crate) fn erase(&mut self, version: Version) -> bool {
        if self
            .records
            .last()
            .is_some_and(|last| last.version == version)
        {
            self.records.pop();
        }
        if self.visible(version).is_none() {
            return false;
        }
        self.records.push(Mutation {
            version,
            value: None,
        });
        true
    }

    /// Drops every record that no live version can resolve to.
    ///
    /// `live` lists the live versions below `horizon`; every version at or
    /// above `horizon` counts as live. A record is kept when it is the newest
    /// one, or when some live version falls between its version (inclusive)
    /// and the next record's version (exclusive). Tombstones left at the
    /// oldest end are dropped as well, since with nothing older they mean the
    /// same as no record at all.
    pub(crate) fn prune(&mut self, live: &BTreeSet<Version>, horizon: Version) -> Records<V> {
        let mut kept = Records::new();
        let mut removed = Records::new();
        let mut records = std::mem::take(&mut self.records).into_iter().peekable();

        while let Some(record) = records.next() {
            let reachable = records.peek().is_none_or(|next| {
                next.version > horizon || live.range(record.version..next.version).next().is_some()
            });
            if reachable {
                kept.push(record);
            } else {
                removed.push(record);
            }
        }

        let leading_tombstones = kept
            .iter()
            .take_while(|record| record.is_tombstone())
            .count();
        removed.extend(kept.drain(..leading_tombstones));

        self.records = kept;
        removed
    }

    /// Iterates over `(version, value)` pairs from oldest to newest.
    #[cfg(test)]
    pub(crate) fn history(&self) -> impl Iterator<Item = (Version, Option<&V>)> {
        self.records
            .iter()
            .map(|record| (record.version, record.value.as_deref()))
    }
}
