//! Batch-level summaries derived from item snapshots.
//!
//! Everything here is a pure function of the snapshots it is given; calling
//! it at any frequency has no effect on the batch.

use std::fmt;

use serde::Serialize;

use crate::queue::{ItemSnapshot, ItemStatus};

/// Mean per-item contribution, in `[0, 1]`.
///
/// Terminal items count `1.0`, downloading items their own fraction, and
/// everything else `0.0`. The result is exactly `1.0` only when every item
/// is terminal; an empty slice yields `0.0`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn overall_progress(items: &[ItemSnapshot]) -> f64 {
    if items.is_empty() {
        return 0.0;
    }

    let mut all_terminal = true;
    let sum: f64 = items
        .iter()
        .map(|item| match &item.status {
            ItemStatus::Completed | ItemStatus::Failed(_) => 1.0,
            ItemStatus::Downloading => {
                all_terminal = false;
                item.progress.clamp(0.0, 1.0)
            }
            ItemStatus::Queued | ItemStatus::Resolving => {
                all_terminal = false;
                0.0
            }
        })
        .sum();

    let mean = (sum / items.len() as f64).clamp(0.0, 1.0);
    if all_terminal {
        1.0
    } else {
        // A fully streamed but not yet finalized item must not read as done.
        mean.min(1.0 - f64::EPSILON)
    }
}

/// Per-status item counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    /// Items in `completed`.
    pub completed: usize,
    /// Items in `downloading`.
    pub downloading: usize,
    /// Items in `queued` or `resolving`.
    pub queued: usize,
    /// Items in `failed`.
    pub failed: usize,
}

impl StatusCounts {
    /// Tallies the given snapshots.
    #[must_use]
    pub fn from_items(items: &[ItemSnapshot]) -> Self {
        items.iter().fold(Self::default(), |mut counts, item| {
            match item.status {
                ItemStatus::Completed => counts.completed += 1,
                ItemStatus::Downloading => counts.downloading += 1,
                ItemStatus::Queued | ItemStatus::Resolving => counts.queued += 1,
                ItemStatus::Failed(_) => counts.failed += 1,
            }
            counts
        })
    }

    /// Total items counted.
    #[must_use]
    pub fn total(&self) -> usize {
        self.completed + self.downloading + self.queued + self.failed
    }
}

impl fmt::Display for StatusCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} done, {} downloading, {} queued",
            self.completed, self.downloading, self.queued
        )?;
        if self.failed > 0 {
            write!(f, ", {} failed", self.failed)?;
        }
        Ok(())
    }
}

/// One-line count summary, e.g. `"2 done, 3 downloading, 1 queued"`.
#[must_use]
pub fn overall_status_text(items: &[ItemSnapshot]) -> String {
    StatusCounts::from_items(items).to_string()
}

/// Coarse stage of a batch, used for headline text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchPhase {
    /// Nothing has started yet.
    Preparing,
    /// At least one release lookup is in progress.
    Resolving,
    /// Transfers are running or have run.
    Downloading,
    /// The batch drained.
    Complete,
}

impl BatchPhase {
    /// Derives the phase from item snapshots and the batch completion flag.
    #[must_use]
    pub fn from_items(items: &[ItemSnapshot], all_complete: bool) -> Self {
        if all_complete {
            return Self::Complete;
        }
        if items
            .iter()
            .any(|item| item.status == ItemStatus::Resolving)
        {
            return Self::Resolving;
        }
        if items.iter().any(|item| item.status != ItemStatus::Queued) {
            return Self::Downloading;
        }
        Self::Preparing
    }

    /// Headline shown above the item list.
    #[must_use]
    pub fn headline(self) -> &'static str {
        match self {
            Self::Preparing => "Preparing…",
            Self::Resolving => "Resolving latest versions…",
            Self::Downloading => "Downloading…",
            Self::Complete => "All downloads complete!",
        }
    }
}

impl fmt::Display for BatchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.headline())
    }
}
