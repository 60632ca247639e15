//! Background reclamation of released versions.
//!
//! Releasing a handle never walks the family table itself. It pushes the
//! released version onto a queue drained by one worker thread per family,
//! which prunes history that no live version can reach any more.
//!
//! # Backpressure
//!
//! The queue is fed from `release()`, which must stay cheap. What happens when
//! the worker falls behind is an explicit [`BackpressurePolicy`]:
//!
//! - [`BackpressurePolicy::Warn`]: unbounded `tokio::sync::mpsc` channel.
//!   Once more than `max_gc_queue_size` releases are pending, a warning is
//!   logged at most once per `gc_queue_warning_period`.
//! - [`BackpressurePolicy::Block`]: bounded channel of `max_gc_queue_size`
//!   slots. The releasing thread waits for room. The warning still fires.
//!
//! A growing queue is not an error. It usually means snapshots are being held
//! for too long.
//!
//! # Worker lifetime
//!
//! The worker owns only the receiving end and a [`ReclaimFn`] that upgrades
//! a weak reference to the family. Dropping the last handle drops the family, which
//! drops the sender and lets the worker fall out of its loop. If the worker
//! cannot be spawned, or has stopped, reclamation runs on the releasing
//! thread instead.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, error, trace, warn};

use crate::settings::{BackpressurePolicy, FamilySettings};
use crate::Version;

const WORKER_NAME: &str = "fastcopy-reclaim";

/// Reclaims one released version. Returns the number of records removed,
/// or `None` once the family is gone.
pub(crate) type ReclaimFn = Arc<dyn Fn(Version) -> Option<usize> + Send + Sync>;

// =============================================================================
// Queue
// =============================================================================

enum QueueSender {
    Unbounded(mpsc::UnboundedSender<Version>),
    Bounded(mpsc::Sender<Version>),
}

enum QueueReceiver {
    Unbounded(mpsc::UnboundedReceiver<Version>),
    Bounded(mpsc::Receiver<Version>),
}

impl QueueReceiver {
    fn next(&mut self) -> Option<Version> {
        match self {
            Self::Unbounded(receiver) => receiver.blocking_recv(),
            Self::Bounded(receiver) => receiver.blocking_recv(),
        }
    }
}

fn channel(settings: &FamilySettings) -> (QueueSender, QueueReceiver) {
    match settings.backpressure {
        BackpressurePolicy::Warn => {
            let (sender, receiver) = mpsc::unbounded_channel();
            (
                QueueSender::Unbounded(sender),
                QueueReceiver::Unbounded(receiver),
            )
        }
        BackpressurePolicy::Block => {
            let (sender, receiver) = mpsc::channel(settings.max_gc_queue_size);
            (QueueSender::Bounded(sender), QueueReceiver::Bounded(receiver))
        }
    }
}

// =============================================================================
// Warning rate limit
// =============================================================================

/// Lets one warning through per period.
#[derive(Debug)]
pub(crate) struct WarningLimiter {
    period: Duration,
    last: Option<Instant>,
}

impl WarningLimiter {
    pub(crate) const fn new(period: Duration) -> Self {
        Self { period, last: None }
    }

    pub(crate) fn permit(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.saturating_duration_since(last) < self.period => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}

// =============================================================================
// Progress
// =============================================================================

/// Counters shared between releasing threads and the worker.
#[derive(Debug, Default)]
pub(crate) struct ReclaimProgress {
    submitted: AtomicU64,
    completed: AtomicU64,
    reclaimed: AtomicU64,
    gate: Mutex<()>,
    idle: Condvar,
}

impl ReclaimProgress {
    /// Counts a new submission and returns the resulting queue depth.
    fn submit(&self) -> u64 {
        let submitted = self.submitted.fetch_add(1, Ordering::AcqRel) + 1;
        submitted.saturating_sub(self.completed.load(Ordering::Acquire))
    }

    fn complete(&self, reclaimed: usize) {
        self.reclaimed
            .fetch_add(reclaimed as u64, Ordering::Relaxed);
        self.completed.fetch_add(1, Ordering::AcqRel);
        let _gate = self.gate.lock();
        self.idle.notify_all();
    }

    fn wait_for(&self, target: u64) {
        let mut gate = self.gate.lock();
        while self.completed.load(Ordering::Acquire) < target {
            self.idle.wait(&mut gate);
        }
    }

    pub(crate) fn pending(&self) -> u64 {
        self.submitted
            .load(Ordering::Acquire)
            .saturating_sub(self.completed.load(Ordering::Acquire))
    }

    pub(crate) fn completed(&self) -> u64 {
        self.completed.load(Ordering::Acquire)
    }

    pub(crate) fn reclaimed(&self) -> u64 {
        self.reclaimed.load(Ordering::Relaxed)
    }
}

// =============================================================================
// Reclaimer
// =============================================================================

/// The releasing side of a family's reclamation queue.
pub(crate) struct Reclaimer {
    sender: Option<QueueSender>,
    work: ReclaimFn,
    progress: Arc<ReclaimProgress>,
    warnings: Mutex<WarningLimiter>,
    threshold: u64,
}

impl std::fmt::Debug for Reclaimer {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Reclaimer")
            .field("threshold", &self.threshold)
            .field("pending", &self.progress.pending())
            .field("worker", &self.sender.is_some())
            .finish_non_exhaustive()
    }
}

impl Reclaimer {
    /// Starts the worker thread. `work` runs once per released version.
    pub(crate) fn spawn(settings: &FamilySettings, work: ReclaimFn) -> Self {
        let progress = Arc::new(ReclaimProgress::default());
        let (sender, receiver) = channel(settings);
        let worker_progress = Arc::clone(&progress);
        let worker_work = Arc::clone(&work);

        let spawned = thread::Builder::new()
            .name(WORKER_NAME.to_string())
            .spawn(move || run_worker(receiver, &*worker_work, &worker_progress));

        let sender = match spawned {
            Ok(_) => Some(sender),
            Err(error) => {
                error!(%error, "failed to spawn reclamation worker, reclaiming inline");
                None
            }
        };

        Self {
            sender,
            work,
            progress,
            warnings: Mutex::new(WarningLimiter::new(settings.gc_queue_warning_period)),
            threshold: settings.max_gc_queue_size as u64,
        }
    }

    /// A reclaimer without a worker. Every submission runs inline.
    #[cfg(test)]
    pub(crate) fn inline(settings: &FamilySettings, work: ReclaimFn) -> Self {
        Self {
            sender: None,
            work,
            progress: Arc::new(ReclaimProgress::default()),
            warnings: Mutex::new(WarningLimiter::new(settings.gc_queue_warning_period)),
            threshold: settings.max_gc_queue_size as u64,
        }
    }

    /// Queues `version` for reclamation.
    ///
    /// Never blocks under [`BackpressurePolicy::Warn`]. When the worker is
    /// unavailable the version is reclaimed on the calling thread.
    pub(crate) fn submit(&self, version: Version) {
        let depth = self.progress.submit();
        if depth > self.threshold && self.warnings.lock().permit(Instant::now()) {
            warn!(
                depth,
                threshold = self.threshold,
                %version,
                "reclamation queue over threshold, released versions are piling up"
            );
        }

        let rejected = match &self.sender {
            Some(QueueSender::Unbounded(sender)) => sender.send(version).err().map(|error| error.0),
            Some(QueueSender::Bounded(sender)) => {
                sender.blocking_send(version).err().map(|error| error.0)
            }
            None => Some(version),
        };

        if let Some(version) = rejected {
            if self.sender.is_some() {
                error!(%version, "reclamation worker stopped, reclaiming inline");
            }
            let reclaimed = (self.work)(version).unwrap_or_default();
            self.progress.complete(reclaimed);
        }
    }

    /// Counts records reclaimed outside the queue.
    pub(crate) fn note_reclaimed(&self, reclaimed: usize) {
        self.progress
            .reclaimed
            .fetch_add(reclaimed as u64, Ordering::Relaxed);
    }

    /// Blocks until every submission made so far has been processed.
    pub(crate) fn wait_idle(&self) {
        let target = self.progress.submitted.load(Ordering::Acquire);
        self.progress.wait_for(target);
    }

    pub(crate) fn progress(&self) -> &ReclaimProgress {
        &self.progress
    }
}

fn run_worker(
    mut receiver: QueueReceiver,
    work: &(dyn Fn(Version) -> Option<usize> + Send + Sync),
    progress: &ReclaimProgress,
) {
    debug!("reclamation worker started");
    while let Some(version) = receiver.next() {
        let Some(reclaimed) = work(version) else {
            break;
        };
        trace!(%version, reclaimed, "reclaimed released version");
        progress.complete(reclaimed);
    }
    debug!("reclamation worker stopped");
}
