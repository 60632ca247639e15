//! The backing store shared by every handle of one family.
//!
//! A family is everything descended from one root map by repeated `copy()`.
//! All of its versions live in a single sharded table of
//! `key -> MutationChain`. Handles carry nothing but a version number and an
//! `Arc` to this store, which is why copying is O(1).
//!
//! # Reclamation bookkeeping
//!
//! When a write at version `m` lands on top of an older record, that older
//! record may later become unreachable. The store remembers the key under
//! `m` in a small index. Releasing version `v` then only has to look at keys
//! indexed under `(v, next live version above v]`, instead of walking the
//! whole table. If no live version is older than `m` at write time, the
//! older record is already unreachable and the chain is pruned on the spot.
//!
//! # Lock order
//!
//! A shard lock may be held while taking the reclamation index lock. The
//! lifecycle registry is always taken on its own.

mod archive;
mod mutation;
mod reclaim;

use std::borrow::Borrow;
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::hash::{BuildHasher, Hash};
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use rustc_hash::{FxBuildHasher, FxHashMap, FxHashSet};
use tracing::debug;

use crate::error::LifecycleError;
use crate::map::ForModify;
use crate::settings::FamilySettings;
use crate::Version;

use archive::MutationArchive;
use mutation::MutationChain;
use reclaim::{ReclaimFn, Reclaimer};

type Shard<K, V> = FxHashMap<K, MutationChain<V>>;

/// Sentinel stored in `oldest_live` while no version is live.
const NONE_LIVE: u64 = u64::MAX;

// =============================================================================
// FamilyStats
// =============================================================================

/// A point-in-time summary of a family's backing store.
///
/// Counts are gathered shard by shard without a global lock, so they may be
/// slightly out of step with each other while writers are active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FamilyStats {
    /// Versions issued and not yet released.
    pub live_versions: usize,
    /// Keys with at least one mutation record.
    pub keys: usize,
    /// Mutation records across all keys, tombstones included.
    pub mutations: usize,
    /// Releases queued but not yet processed.
    pub pending_reclamations: u64,
    /// Releases processed by the collector.
    pub completed_reclamations: u64,
    /// Mutation records removed from the table since the family was created.
    pub reclaimed_mutations: u64,
    /// Records currently held by the archive.
    pub archived_mutations: usize,
}

// =============================================================================
// FamilyStore
// =============================================================================

#[derive(Debug, Default)]
struct Lifecycle {
    live: BTreeSet<Version>,
    pending: BTreeSet<Version>,
}

impl Lifecycle {
    fn oldest_live(&self) -> u64 {
        self.live.first().map_or(NONE_LIVE, |version| version.get())
    }
}

pub(crate) struct FamilyStore<K, V> {
    shards: Box<[RwLock<Shard<K, V>>]>,
    hasher: FxBuildHasher,
    next_version: AtomicU64,
    oldest_live: AtomicU64,
    lifecycle: Mutex<Lifecycle>,
    superseded: Mutex<BTreeMap<Version, Vec<K>>>,
    archive: Option<MutationArchive<K, V>>,
    reclaimer: Reclaimer,
    settings: FamilySettings,
}

impl<K, V> std::fmt::Debug for FamilyStore<K, V> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("FamilyStore")
            .field("shards", &self.shards.len())
            .field("next_version", &self.next_version.load(Ordering::Relaxed))
            .field("reclaimer", &self.reclaimer)
            .finish_non_exhaustive()
    }
}

// Lifecycle operations need no key bounds so handles can release on drop.
impl<K, V> FamilyStore<K, V> {
    /// Issues the next version and registers it as live.
    pub(crate) fn next_version(&self) -> Version {
        let mut lifecycle = self.lifecycle.lock();
        let version = Version::new(self.next_version.fetch_add(1, Ordering::AcqRel));
        lifecycle.live.insert(version);
        self.oldest_live
            .store(lifecycle.oldest_live(), Ordering::Release);
        version
    }

    /// Retires `version` and queues it for reclamation.
    pub(crate) fn release(&self, version: Version) -> Result<(), LifecycleError> {
        {
            let mut lifecycle = self.lifecycle.lock();
            if !lifecycle.live.remove(&version) {
                return Err(if version.get() >= self.next_version.load(Ordering::Acquire) {
                    LifecycleError::UnknownVersion { version }
                } else {
                    LifecycleError::AlreadyReleased { version }
                });
            }
            lifecycle.pending.insert(version);
            self.oldest_live
                .store(lifecycle.oldest_live(), Ordering::Release);
        }
        debug!(%version, "released version");
        self.reclaimer.submit(version);
        Ok(())
    }

    /// Blocks until every release submitted so far has been reclaimed.
    pub(crate) fn await_reclamation(&self) {
        self.reclaimer.wait_idle();
    }
}

impl<K, V> FamilyStore<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Creates an empty family whose only live version is [`Version::ORIGIN`].
    ///
    /// `settings` must already be validated.
    pub(crate) fn new(settings: FamilySettings) -> Arc<Self> {
        debug_assert!(settings.validate().is_ok(), "unvalidated family settings");
        Arc::new_cyclic(|family: &Weak<Self>| {
            let family = family.clone();
            let work: ReclaimFn = Arc::new(move |version: Version| {
                family.upgrade().map(|store| store.reclaim(version))
            });
            let reclaimer = Reclaimer::spawn(&settings, work);
            let shards = (0..settings.shard_count)
                .map(|_| RwLock::new(Shard::default()))
                .collect();
            let mut lifecycle = Lifecycle::default();
            lifecycle.live.insert(Version::ORIGIN);

            Self {
                shards,
                hasher: FxBuildHasher,
                next_version: AtomicU64::new(Version::ORIGIN.get() + 1),
                oldest_live: AtomicU64::new(Version::ORIGIN.get()),
                lifecycle: Mutex::new(lifecycle),
                superseded: Mutex::new(BTreeMap::new()),
                archive: settings.archive_enabled.then(MutationArchive::new),
                reclaimer,
                settings,
            }
        })
    }

    pub(crate) const fn settings(&self) -> &FamilySettings {
        &self.settings
    }

    // -------------------------------------------------------------------------
    // Shards
    // -------------------------------------------------------------------------

    #[allow(clippy::cast_possible_truncation)]
    fn shard_index<Q: Hash + ?Sized>(&self, key: &Q) -> usize {
        // Only the low bits pick a shard.
        (self.hasher.hash_one(key) as usize) % self.shards.len()
    }

    fn shard_for<Q: Hash + ?Sized>(&self, key: &Q) -> &RwLock<Shard<K, V>> {
        &self.shards[self.shard_index(key)]
    }

    pub(crate) fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Read-locks shard `index`.
    pub(crate) fn read_shard(&self, index: usize) -> RwLockReadGuard<'_, Shard<K, V>> {
        self.shards[index].read()
    }

    // -------------------------------------------------------------------------
    // Reads and writes
    // -------------------------------------------------------------------------

    /// The value of `key` as seen by `version`.
    pub(crate) fn read<Q>(&self, key: &Q, version: Version) -> Option<Arc<V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.shard_for(key)
            .read()
            .get(key)
            .and_then(|chain| chain.visible(version).cloned())
    }

    /// Writes `value` at `version` and returns the value visible before.
    pub(crate) fn write(&self, key: K, version: Version, value: Arc<V>) -> Option<Arc<V>> {
        let mut shard = self.shard_for(&key).write();
        if let Some(chain) = shard.get_mut(&key) {
            let previous = chain.visible(version).cloned();
            if chain.write(version, value) {
                self.settle(chain, key, version);
            }
            previous
        } else {
            shard.insert(key, MutationChain::with_value(version, value));
            None
        }
    }

    /// Hides `key` from `version` onwards and returns the value it had.
    pub(crate) fn erase<Q>(&self, key: &Q, version: Version) -> Option<Arc<V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let mut shard = self.shard_for(key).write();
        let (owned, chain) = Self::entry_mut(&mut shard, key)?;
        let previous = chain.visible(version).cloned()?;
        if chain.erase(version) {
            self.settle(chain, owned, version);
        }
        if chain.is_empty() {
            shard.remove(key);
        }
        Some(previous)
    }

    /// Makes the value of `key` at `version` exclusively owned by that
    /// version and returns a guard over it.
    pub(crate) fn modify<'a, Q>(&'a self, key: &Q, version: Version) -> Option<ForModify<'a, V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone,
    {
        let mut shard = self.shard_for(key).write();
        let (owned, chain) = Self::entry_mut(&mut shard, key)?;
        let original = if chain.written_at_mut(version).is_some() {
            None
        } else {
            let ancestor = Arc::clone(chain.visible(version)?);
            if chain.write(version, Arc::new(V::clone(&ancestor))) {
                self.settle(chain, owned, version);
            }
            Some(ancestor)
        };

        let value = RwLockWriteGuard::try_map(shard, |shard| {
            shard
                .get_mut(key)
                .and_then(|chain| chain.written_at_mut(version))
                .map(Arc::make_mut)
        })
        .ok()?;
        Some(ForModify::new(value, original))
    }

    /// Writes a version-0 record without any reclamation bookkeeping.
    pub(crate) fn inject(&self, key: K, value: Arc<V>) {
        let mut shard = self.shard_for(&key).write();
        match shard.entry(key) {
            Entry::Occupied(mut occupied) => {
                occupied.get_mut().write(Version::ORIGIN, value);
            }
            Entry::Vacant(vacant) => {
                vacant.insert(MutationChain::with_value(Version::ORIGIN, value));
            }
        }
    }

    /// Counts the keys visible at `version`.
    pub(crate) fn count_visible(&self, version: Version) -> usize {
        self.shards
            .iter()
            .map(|shard| {
                shard
                    .read()
                    .values()
                    .filter(|chain| chain.visible(version).is_some())
                    .count()
            })
            .sum()
    }

    fn entry_mut<'s, Q>(
        shard: &'s mut Shard<K, V>,
        key: &Q,
    ) -> Option<(K, &'s mut MutationChain<V>)>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let owned = shard.get_key_value(key)?.0.clone();
        shard.get_mut(key).map(|chain| (owned, chain))
    }

    /// Handles a chain that just gained a record at `version` on top of older
    /// history. Called with the key's shard lock held.
    fn settle(&self, chain: &mut MutationChain<V>, key: K, version: Version) {
        if self.oldest_live.load(Ordering::Acquire) < version.get() {
            self.superseded.lock().entry(version).or_default().push(key);
            return;
        }
        // Only `version` and later can be live here.
        let removed = chain.prune(&BTreeSet::new(), version);
        self.reclaimer.note_reclaimed(removed.len());
        if let Some(archive) = &self.archive {
            archive.store(key, removed);
        }
    }

    /// Prunes history that became unreachable when `released` was retired.
    /// Returns the number of records removed.
    fn reclaim(&self, released: Version) -> usize {
        // Versions issued after this point are at or above `horizon`.
        let (live, horizon) = {
            let lifecycle = self.lifecycle.lock();
            let horizon = Version::new(self.next_version.load(Ordering::Acquire));
            (lifecycle.live.clone(), horizon)
        };
        let upper = live
            .range((Bound::Excluded(released), Bound::Unbounded))
            .next()
            .copied()
            .map_or(Bound::Unbounded, Bound::Included);

        let candidates: FxHashSet<K> = self
            .superseded
            .lock()
            .range((Bound::Excluded(released), upper))
            .flat_map(|(_, keys)| keys.iter().cloned())
            .collect();

        let mut reclaimed = 0;
        for key in candidates {
            let mut shard = self.shard_for(&key).write();
            let Some(chain) = shard.get_mut(&key) else {
                continue;
            };
            let removed = chain.prune(&live, horizon);
            if chain.is_empty() {
                shard.remove(&key);
            }
            drop(shard);

            reclaimed += removed.len();
            if let Some(archive) = &self.archive {
                archive.store(key, removed);
            }
        }

        self.forget_superseded(released);
        debug!(%released, reclaimed, "reclamation pass finished");
        reclaimed
    }

    /// Drops index entries no future reclamation pass can reach.
    fn forget_superseded(&self, released: Version) {
        let floor = {
            let mut lifecycle = self.lifecycle.lock();
            lifecycle.pending.remove(&released);
            match (lifecycle.live.first(), lifecycle.pending.first()) {
                (Some(live), Some(pending)) => Some(*live.min(pending)),
                (live, pending) => live.or(pending).copied(),
            }
        };

        let mut superseded = self.superseded.lock();
        match floor {
            Some(floor) => {
                *superseded = superseded.split_off(&Version::new(floor.get().saturating_add(1)));
            }
            None => superseded.clear(),
        }
    }

    pub(crate) fn stats(&self) -> FamilyStats {
        let live_versions = self.lifecycle.lock().live.len();
        let (keys, mutations) = self.shards.iter().fold((0, 0), |(keys, mutations), shard| {
            let shard = shard.read();
            (
                keys + shard.len(),
                mutations + shard.values().map(MutationChain::len).sum::<usize>(),
            )
        });
        let progress = self.reclaimer.progress();
        FamilyStats {
            live_versions,
            keys,
            mutations,
            pending_reclamations: progress.pending(),
            completed_reclamations: progress.completed(),
            reclaimed_mutations: progress.reclaimed(),
            archived_mutations: self.archive.as_ref().map_or(0, MutationArchive::len),
        }
    }

    pub(crate) fn archived_history(&self, key: &K) -> Vec<(Version, Option<Arc<V>>)> {
        self.archive
            .as_ref()
            .map_or_else(Vec::new, |archive| archive.history(key))
    }
}

/// Visible entries of one shard at `version`.
pub(crate) fn visible_entries<K, V>(shard: &Shard<K, V>, version: Version) -> Vec<(K, Arc<V>)>
where
    K: Clone,
{
    shard
        .iter()
        .filter_map(|(key, chain)| {
            chain
                .visible(version)
                .map(|value| (key.clone(), Arc::clone(value)))
        })
        .collect()
}
