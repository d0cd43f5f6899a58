//! In-memory batch of download items.
//!
//! A [`Batch`] is built once from a [`Catalog`] and lives for the rest of the
//! process. The engine mutates its items; any number of readers can take
//! [`BatchSnapshot`]s or subscribe to change notifications without touching
//! engine state.
//!
//! # Example
//!
//! ```
//! use appfetch_core::catalog::Catalog;
//! use appfetch_core::queue::{Batch, ItemStatus};
//!
//! let batch = Batch::from_catalog(&Catalog::builtin());
//! let snapshot = batch.snapshot();
//! assert_eq!(snapshot.items.len(), 6);
//! assert!(snapshot.items.iter().all(|item| item.status == ItemStatus::Queued));
//! assert_eq!(snapshot.overall_status_text, "0 done, 0 downloading, 6 queued");
//! ```

mod item;

pub use item::{DownloadItem, ItemId, ItemSnapshot, ItemStatus};

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tokio::sync::watch;
use tracing::info;

use crate::aggregate::{self, BatchPhase, StatusCounts};
use crate::catalog::{Catalog, MarkerRule, UrlSource};

/// Items that share one marker token and are still waiting for a URL.
#[derive(Debug, Clone)]
pub struct MarkerGroup {
    /// The shared marker token.
    pub marker: String,
    /// Members in catalog order.
    pub items: Vec<Arc<DownloadItem>>,
}

/// Consistent view of a whole batch at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchSnapshot {
    /// Per-item snapshots in catalog order.
    pub items: Vec<ItemSnapshot>,
    /// Mean item progress in `[0, 1]`.
    pub overall_progress: f64,
    /// Count summary line.
    pub overall_status_text: String,
    /// Per-status counts.
    pub counts: StatusCounts,
    /// Current stage.
    pub phase: BatchPhase,
    /// True once the batch drained.
    pub all_complete: bool,
}

/// Ordered, shared collection of download items.
#[derive(Debug)]
pub struct Batch {
    items: Vec<Arc<DownloadItem>>,
    markers: BTreeMap<String, MarkerRule>,
    changes: Arc<watch::Sender<u64>>,
    all_complete: AtomicBool,
}

impl Batch {
    /// Creates one queued item per catalog definition.
    #[must_use]
    pub fn from_catalog(catalog: &Catalog) -> Self {
        let (tx, _rx) = watch::channel(0_u64);
        let changes = Arc::new(tx);

        let items = catalog
            .definitions()
            .iter()
            .enumerate()
            .map(|(index, definition)| {
                let (url, marker) = match &definition.source {
                    UrlSource::Static(url) => (Some(url.clone()), None),
                    UrlSource::Marker(token) => (None, Some(token.clone())),
                };
                Arc::new(DownloadItem::new(
                    ItemId(index),
                    definition.display_name.clone(),
                    definition.file_name.clone(),
                    url,
                    marker,
                    Arc::clone(&changes),
                ))
            })
            .collect();

        Self {
            items,
            markers: catalog.markers().clone(),
            changes,
            all_complete: AtomicBool::new(false),
        }
    }

    /// Items in catalog order.
    #[must_use]
    pub fn items(&self) -> &[Arc<DownloadItem>] {
        &self.items
    }

    /// Looks up an item by id.
    #[must_use]
    pub fn get(&self, id: ItemId) -> Option<&Arc<DownloadItem>> {
        self.items.get(id.0)
    }

    /// Number of items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when the batch has no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Resolution rule for a marker token, if configured.
    #[must_use]
    pub fn marker_rule(&self, token: &str) -> Option<&MarkerRule> {
        self.markers.get(token)
    }

    /// Groups unresolved, non-terminal items by marker, in order of first appearance.
    ///
    /// Items that already have a URL or already finished are left out, so a
    /// marker whose group was handled once never shows up again.
    #[must_use]
    pub fn unresolved_groups(&self) -> Vec<MarkerGroup> {
        let mut groups: Vec<MarkerGroup> = Vec::new();
        for item in &self.items {
            let Some(marker) = item.marker() else {
                continue;
            };
            if item.resolved_url().is_some() || item.status().is_terminal() {
                continue;
            }
            match groups.iter_mut().find(|group| group.marker == marker) {
                Some(group) => group.items.push(Arc::clone(item)),
                None => groups.push(MarkerGroup {
                    marker: marker.to_string(),
                    items: vec![Arc::clone(item)],
                }),
            }
        }
        groups
    }

    /// Subscribes to change notifications.
    ///
    /// The value is a generation counter bumped on every item mutation and on
    /// batch completion; readers should take a fresh [`Self::snapshot`] after
    /// each change rather than interpret the number.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    /// True once every item reached a terminal state through the engine.
    #[must_use]
    pub fn all_complete(&self) -> bool {
        self.all_complete.load(Ordering::SeqCst)
    }

    /// Sets the completion flag. Returns false if it was already set.
    pub(crate) fn mark_all_complete(&self) -> bool {
        let first = !self.all_complete.swap(true, Ordering::SeqCst);
        if first {
            info!(items = self.items.len(), "all downloads complete");
            self.changes
                .send_modify(|generation| *generation = generation.wrapping_add(1));
        }
        first
    }

    /// Takes a snapshot of every item plus the derived aggregates.
    #[must_use]
    pub fn snapshot(&self) -> BatchSnapshot {
        let items: Vec<ItemSnapshot> = self.items.iter().map(|item| item.snapshot()).collect();
        let all_complete = self.all_complete();
        let counts = StatusCounts::from_items(&items);
        BatchSnapshot {
            overall_progress: aggregate::overall_progress(&items),
            overall_status_text: counts.to_string(),
            counts,
            phase: BatchPhase::from_items(&items, all_complete),
            all_complete,
            items,
        }
    }
}
