//! Bounded-concurrency dispatch state.
//!
//! The [`Scheduler`] is a plain state machine with no I/O of its own. The
//! engine's coordinating loop owns exactly one instance and is the only code
//! that calls into it, so the pending queue, the active count, and every
//! transition out of `downloading` are serialized without extra locking.

use std::collections::{HashMap, HashSet, VecDeque};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use crate::queue::{DownloadItem, ItemId, ItemStatus};

/// Failure reason for an item that reaches the head of the queue unresolved.
pub const NO_URL_REASON: &str = "no URL";

/// How a transfer ended, as reported back to the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    /// Payload is in place; `bytes` is its size on disk.
    Completed {
        /// Final file size.
        bytes: u64,
    },
    /// Transfer or finalization failed.
    Failed(String),
    /// Abandoned during shutdown. Not a failure.
    Cancelled,
}

/// A transfer the caller must start.
#[derive(Debug, Clone)]
pub struct Launch {
    /// The item now in `downloading`.
    pub item: Arc<DownloadItem>,
    /// URL to fetch.
    pub url: String,
}

/// Work produced by one scheduler step.
#[derive(Debug, Default)]
pub struct Dispatch {
    /// Transfers to start, in queue order.
    pub launches: Vec<Launch>,
    /// True exactly once: on the step that drained the batch.
    pub batch_completed: bool,
}

/// Pending queue, slot accounting, and in-flight routing table.
#[derive(Debug)]
pub struct Scheduler {
    max_concurrency: usize,
    pending: VecDeque<Arc<DownloadItem>>,
    active: usize,
    in_flight: HashMap<ItemId, Arc<DownloadItem>>,
    enqueued: HashSet<ItemId>,
    outstanding_resolutions: usize,
    peak_active: usize,
    halted: bool,
    batch_complete: bool,
}

impl Scheduler {
    /// Creates an empty scheduler with `max_concurrency` slots.
    #[must_use]
    pub fn new(max_concurrency: NonZeroUsize) -> Self {
        Self {
            max_concurrency: max_concurrency.get(),
            pending: VecDeque::new(),
            active: 0,
            in_flight: HashMap::new(),
            enqueued: HashSet::new(),
            outstanding_resolutions: 0,
            peak_active: 0,
            halted: false,
            batch_complete: false,
        }
    }

    /// Appends items to the pending queue in the given order.
    ///
    /// Items that already failed, and items that were enqueued before, are
    /// skipped. Returns how many were added.
    pub fn enqueue_all<I>(&mut self, items: I) -> usize
    where
        I: IntoIterator<Item = Arc<DownloadItem>>,
    {
        let mut added = 0;
        for item in items {
            if matches!(item.status(), ItemStatus::Failed(_)) {
                debug!(item = %item.id(), name = item.name(), "skipping failed item");
                continue;
            }
            if !self.enqueued.insert(item.id()) {
                debug!(item = %item.id(), "item already enqueued");
                continue;
            }
            self.pending.push_back(item);
            added += 1;
        }
        added
    }

    /// Launches pending items until every slot is busy or the queue is empty.
    ///
    /// An item without a resolved URL fails with [`NO_URL_REASON`] and does
    /// not consume a slot.
    pub fn fill_slots(&mut self, now: Instant) -> Vec<Launch> {
        let mut launches = Vec::new();
        if self.halted {
            return launches;
        }

        while self.active < self.max_concurrency {
            let Some(item) = self.pending.pop_front() else {
                break;
            };
            let Some(url) = item.resolved_url() else {
                info!(item = %item.id(), name = item.name(), "no URL at queue head");
                item.fail(NO_URL_REASON);
                continue;
            };
            if !item.begin_transfer(now) {
                continue;
            }

            self.active += 1;
            self.peak_active = self.peak_active.max(self.active);
            self.in_flight.insert(item.id(), Arc::clone(&item));
            debug!(
                item = %item.id(),
                name = item.name(),
                active = self.active,
                pending = self.pending.len(),
                "slot assigned"
            );
            launches.push(Launch { item, url });
        }
        launches
    }

    /// Applies a transfer outcome, frees its slot, and refills.
    ///
    /// Reports for items that are not in flight are ignored, so a duplicate
    /// completion can never free a slot twice.
    pub fn on_transfer_finished(
        &mut self,
        id: ItemId,
        outcome: TransferOutcome,
        now: Instant,
    ) -> Dispatch {
        let Some(item) = self.in_flight.remove(&id) else {
            debug!(item = %id, "ignoring completion for item not in flight");
            return Dispatch::default();
        };

        match outcome {
            TransferOutcome::Completed { bytes } => {
                item.complete(bytes);
            }
            TransferOutcome::Failed(reason) => {
                item.fail(reason);
            }
            TransferOutcome::Cancelled => {
                debug!(item = %id, "transfer abandoned");
            }
        }
        self.active -= 1;

        let launches = self.fill_slots(now);
        Dispatch {
            launches,
            batch_completed: self.check_complete(),
        }
    }

    /// Registers a marker group whose resolution has started.
    pub fn begin_resolution(&mut self) {
        self.outstanding_resolutions += 1;
    }

    /// Enqueues a resolved marker group and refills.
    pub fn on_resolution_finished<I>(&mut self, items: I, now: Instant) -> Dispatch
    where
        I: IntoIterator<Item = Arc<DownloadItem>>,
    {
        self.outstanding_resolutions = self.outstanding_resolutions.saturating_sub(1);
        self.enqueue_all(items);
        let launches = self.fill_slots(now);
        Dispatch {
            launches,
            batch_completed: self.check_complete(),
        }
    }

    /// Returns true once, the first time nothing is active, pending, or resolving.
    pub fn check_complete(&mut self) -> bool {
        if self.batch_complete
            || self.halted
            || self.active > 0
            || !self.pending.is_empty()
            || self.outstanding_resolutions > 0
        {
            return false;
        }
        self.batch_complete = true;
        info!(peak_active = self.peak_active, "batch complete");
        true
    }

    /// Stops all further launches. Used on shutdown.
    pub fn halt(&mut self) {
        self.halted = true;
    }

    /// Configured slot count.
    #[must_use]
    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Transfers currently in flight.
    #[must_use]
    pub fn active(&self) -> usize {
        self.active
    }

    /// Items waiting for a slot.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Highest simultaneous in-flight count seen so far.
    #[must_use]
    pub fn peak_active(&self) -> usize {
        self.peak_active
    }

    /// True when no transfer is in flight and no lookup is outstanding.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.active == 0 && self.outstanding_resolutions == 0
    }

    /// True after the one-time completion event fired.
    #[must_use]
    pub fn is_batch_complete(&self) -> bool {
        self.batch_complete
    }

    /// True once [`Self::halt`] was called.
    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.halted
    }
}
