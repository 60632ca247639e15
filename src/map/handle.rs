//! State shared by mutable and frozen handles.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::error;

use crate::error::LifecycleError;
use crate::family::FamilyStore;
use crate::Version;

/// One registered version of a family plus its element count.
///
/// The version is returned to the family exactly once, either through
/// [`Handle::release`] or when the handle is dropped.
pub(crate) struct Handle<K, V> {
    pub(crate) store: Arc<FamilyStore<K, V>>,
    pub(crate) version: Version,
    pub(crate) size: AtomicUsize,
    released: bool,
}

impl<K, V> Handle<K, V> {
    pub(crate) const fn new(store: Arc<FamilyStore<K, V>>, version: Version, size: usize) -> Self {
        Self {
            store,
            version,
            size: AtomicUsize::new(size),
            released: false,
        }
    }

    pub(crate) fn size(&self) -> usize {
        self.size.load(Ordering::Acquire)
    }

    pub(crate) fn grow(&self) {
        self.size.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn shrink(&self) {
        self.size.fetch_sub(1, Ordering::AcqRel);
    }

    pub(crate) fn release(&mut self) -> Result<(), LifecycleError> {
        if self.released {
            return Err(LifecycleError::AlreadyReleased {
                version: self.version,
            });
        }
        self.released = true;
        self.store.release(self.version)
    }
}

impl<K, V> Drop for Handle<K, V> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(error) = self.release() {
            error!(%error, version = %self.version, "failed to release dropped handle");
        }
    }
}

impl<K, V> fmt::Debug for Handle<K, V> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Handle")
            .field("version", &self.version)
            .field("size", &self.size())
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}
