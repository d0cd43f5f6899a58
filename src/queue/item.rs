//! Download item state and status definitions.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use serde::Serialize;
use tokio::sync::watch;

use crate::download::ProgressEstimate;

/// Opaque identity of an item within a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ItemId(pub(crate) usize);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle status of a download item.
///
/// `Completed` and `Failed` are terminal: once reached, no further
/// transition is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum ItemStatus {
    /// Waiting; no network activity.
    Queued,
    /// Waiting on the release resolver.
    Resolving,
    /// Transfer in progress.
    Downloading,
    /// Payload written to its destination.
    Completed,
    /// Terminal failure with a human-readable cause.
    Failed(String),
}

impl ItemStatus {
    /// Returns true for `Completed` and `Failed`.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        match self {
            Self::Completed | Self::Failed(_) => true,
            Self::Queued | Self::Resolving | Self::Downloading => false,
        }
    }

    /// Short label used in logs and summaries.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Resolving => "resolving",
            Self::Downloading => "downloading",
            Self::Completed => "completed",
            Self::Failed(_) => "failed",
        }
    }

    /// Failure reason, if any.
    #[must_use]
    pub fn failure_reason(&self) -> Option<&str> {
        match self {
            Self::Failed(reason) => Some(reason),
            Self::Queued | Self::Resolving | Self::Downloading | Self::Completed => None,
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed(reason) => write!(f, "failed: {reason}"),
            other => f.write_str(other.label()),
        }
    }
}

/// Point-in-time copy of one item, safe to hand to any renderer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemSnapshot {
    /// Item identity.
    pub id: ItemId,
    /// Display name.
    pub name: String,
    /// Destination file name.
    pub file_name: String,
    /// Current status.
    pub status: ItemStatus,
    /// Fraction complete in `[0, 1]`.
    pub progress: f64,
    /// Bytes received so far.
    pub bytes_downloaded: u64,
    /// Expected size; `0` until the server declares it.
    pub total_bytes: u64,
    /// Average transfer rate, `0` until at least one second has elapsed.
    pub speed_bytes_per_sec: f64,
    /// Estimated seconds remaining, when both speed and size are known.
    pub eta_seconds: Option<f64>,
}

#[derive(Debug)]
struct ItemState {
    status: ItemStatus,
    resolved_url: Option<String>,
    bytes_downloaded: u64,
    total_bytes: u64,
    progress: f64,
    speed_bytes_per_sec: f64,
    eta_seconds: Option<f64>,
    started_at: Option<Instant>,
}

/// Mutable record for one download, shared between the engine and readers.
///
/// All fields live behind a single lock so a reader never observes a
/// half-applied progress update.
#[derive(Debug)]
pub struct DownloadItem {
    id: ItemId,
    name: String,
    file_name: String,
    marker: Option<String>,
    state: Mutex<ItemState>,
    changes: Arc<watch::Sender<u64>>,
}

impl DownloadItem {
    pub(crate) fn new(
        id: ItemId,
        name: String,
        file_name: String,
        url: Option<String>,
        marker: Option<String>,
        changes: Arc<watch::Sender<u64>>,
    ) -> Self {
        Self {
            id,
            name,
            file_name,
            marker,
            state: Mutex::new(ItemState {
                status: ItemStatus::Queued,
                resolved_url: url,
                bytes_downloaded: 0,
                total_bytes: 0,
                progress: 0.0,
                speed_bytes_per_sec: 0.0,
                eta_seconds: None,
                started_at: None,
            }),
            changes,
        }
    }

    /// Item identity.
    #[must_use]
    pub fn id(&self) -> ItemId {
        self.id
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Destination file name.
    #[must_use]
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Marker token this item was declared with, if any.
    #[must_use]
    pub fn marker(&self) -> Option<&str> {
        self.marker.as_deref()
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> ItemStatus {
        self.lock().status.clone()
    }

    /// Resolved download URL, if known.
    #[must_use]
    pub fn resolved_url(&self) -> Option<String> {
        self.lock().resolved_url.clone()
    }

    /// Copies the current state out for rendering.
    #[must_use]
    pub fn snapshot(&self) -> ItemSnapshot {
        let state = self.lock();
        ItemSnapshot {
            id: self.id,
            name: self.name.clone(),
            file_name: self.file_name.clone(),
            status: state.status.clone(),
            progress: state.progress,
            bytes_downloaded: state.bytes_downloaded,
            total_bytes: state.total_bytes,
            speed_bytes_per_sec: state.speed_bytes_per_sec,
            eta_seconds: state.eta_seconds,
        }
    }

    /// Moves the item to `next` unless it is already terminal.
    ///
    /// Returns whether the transition was applied.
    pub(crate) fn transition(&self, next: ItemStatus) -> bool {
        let applied = {
            let mut state = self.lock();
            if state.status.is_terminal() {
                false
            } else {
                state.status = next;
                true
            }
        };
        if applied {
            self.notify();
        }
        applied
    }

    /// Stores the resolved URL and returns the item to `Queued`.
    pub(crate) fn assign_url(&self, url: &str) -> bool {
        let applied = {
            let mut state = self.lock();
            if state.status.is_terminal() {
                false
            } else {
                state.resolved_url = Some(url.to_string());
                state.status = ItemStatus::Queued;
                true
            }
        };
        if applied {
            self.notify();
        }
        applied
    }

    /// Enters `Downloading` and stamps the transfer start time.
    pub(crate) fn begin_transfer(&self, now: Instant) -> bool {
        let applied = {
            let mut state = self.lock();
            if state.status.is_terminal() {
                false
            } else {
                state.status = ItemStatus::Downloading;
                state.started_at = Some(now);
                state.bytes_downloaded = 0;
                state.total_bytes = 0;
                state.progress = 0.0;
                state.speed_bytes_per_sec = 0.0;
                state.eta_seconds = None;
                true
            }
        };
        if applied {
            self.notify();
        }
        applied
    }

    /// Applies one streaming progress callback.
    ///
    /// `content_length` is the server-declared size, if any. Counters only
    /// move while the item is `Downloading`.
    pub(crate) fn record_progress(
        &self,
        bytes_downloaded: u64,
        content_length: Option<u64>,
        now: Instant,
    ) {
        {
            let mut state = self.lock();
            if state.status != ItemStatus::Downloading {
                return;
            }
            let elapsed = state.started_at.map(|start| now.saturating_duration_since(start));
            let estimate = ProgressEstimate::compute(bytes_downloaded, content_length, elapsed);

            state.bytes_downloaded = bytes_downloaded;
            if let Some(total) = estimate.total_bytes {
                state.total_bytes = total;
                state.progress = estimate.fraction;
            }
            if let Some(speed) = estimate.speed_bytes_per_sec {
                state.speed_bytes_per_sec = speed;
                if estimate.eta_seconds.is_some() {
                    state.eta_seconds = estimate.eta_seconds;
                }
            }
        }
        self.notify();
    }

    /// Marks the item completed with its final on-disk size.
    pub(crate) fn complete(&self, final_size: u64) -> bool {
        let applied = {
            let mut state = self.lock();
            if state.status.is_terminal() {
                false
            } else {
                state.status = ItemStatus::Completed;
                state.progress = 1.0;
                state.bytes_downloaded = final_size;
                state.total_bytes = final_size;
                state.eta_seconds = None;
                true
            }
        };
        if applied {
            self.notify();
        }
        applied
    }

    /// Marks the item failed. No-op if already terminal.
    pub(crate) fn fail(&self, reason: impl Into<String>) -> bool {
        self.transition(ItemStatus::Failed(reason.into()))
    }

    fn notify(&self) {
        self.changes.send_modify(|generation| *generation = generation.wrapping_add(1));
    }

    fn lock(&self) -> MutexGuard<'_, ItemState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Display for DownloadItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DownloadItem {{ id: {}, name: {}, status: {} }}",
            self.id,
            self.name,
            self.status()
        )
    }
}
