//! Download engine that drives a whole batch.
//!
//! The engine runs one coordinating loop per batch. The loop owns the
//! [`Scheduler`]; transfers and release lookups run as spawned tasks and
//! report back over a single channel, so slot accounting and every
//! transition out of `downloading` happen in one place.
//!
//! # Example
//!
//! ```no_run
//! use appfetch_core::catalog::Catalog;
//! use appfetch_core::download::{DownloadEngine, EngineConfig};
//! use appfetch_core::queue::Batch;
//! use std::path::Path;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = DownloadEngine::new(&EngineConfig::default())?;
//! let batch = Batch::from_catalog(&Catalog::builtin());
//! let stats = engine
//!     .run(&batch, Path::new("./downloads"), CancellationToken::new())
//!     .await?;
//! println!("Completed: {}, Failed: {}", stats.completed(), stats.failed());
//! # Ok(())
//! # }
//! ```

use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::HttpClient;
use super::constants::{CONNECT_TIMEOUT_SECS, DEFAULT_CONCURRENCY, MAX_CONCURRENCY, MIN_CONCURRENCY};
use super::scheduler::{Dispatch, Launch, Scheduler, TransferOutcome};
use crate::catalog::MarkerRule;
use crate::queue::{Batch, DownloadItem, ItemId, ItemStatus, MarkerGroup};
use crate::resolver::{RESOLVER_TIMEOUT_SECS, ReleaseResolver};

/// Error type for engine setup.
///
/// Per-item problems never show up here; they are recorded on the item.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Invalid concurrency value provided.
    #[error(
        "invalid concurrency value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency {
        /// The invalid value that was provided.
        value: usize,
    },

    /// An HTTP client could not be built.
    #[error("failed to build HTTP client: {reason}")]
    Client {
        /// Builder error text.
        reason: String,
    },

    /// The destination directory could not be created.
    #[error("cannot prepare destination directory {path}: {source}")]
    Destination {
        /// The destination root.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

/// Engine settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Maximum simultaneous transfers (1-100).
    pub concurrency: usize,
    /// Connect timeout for transfers, in seconds.
    pub connect_timeout_secs: u64,
    /// Overall timeout for one release lookup, in seconds.
    pub resolver_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            connect_timeout_secs: CONNECT_TIMEOUT_SECS,
            resolver_timeout_secs: RESOLVER_TIMEOUT_SECS,
        }
    }
}

/// Outcome counts of one [`DownloadEngine::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadStats {
    completed: usize,
    failed: usize,
    unfinished: usize,
    peak_active: usize,
    cancelled: bool,
}

impl DownloadStats {
    fn from_batch(batch: &Batch, peak_active: usize, cancelled: bool) -> Self {
        let mut stats = Self {
            peak_active,
            cancelled,
            ..Self::default()
        };
        for item in batch.items() {
            match item.status() {
                ItemStatus::Completed => stats.completed += 1,
                ItemStatus::Failed(_) => stats.failed += 1,
                ItemStatus::Queued | ItemStatus::Resolving | ItemStatus::Downloading => {
                    stats.unfinished += 1;
                }
            }
        }
        stats
    }

    /// Items that ended `completed`.
    #[must_use]
    pub fn completed(&self) -> usize {
        self.completed
    }

    /// Items that ended `failed`.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed
    }

    /// Items left non-terminal, which only happens after cancellation.
    #[must_use]
    pub fn unfinished(&self) -> usize {
        self.unfinished
    }

    /// Returns the number of terminal items (completed + failed).
    #[must_use]
    pub fn total(&self) -> usize {
        self.completed + self.failed
    }

    /// Highest number of simultaneous transfers observed.
    #[must_use]
    pub fn peak_active(&self) -> usize {
        self.peak_active
    }

    /// True when the run stopped because of cancellation.
    #[must_use]
    pub fn was_cancelled(&self) -> bool {
        self.cancelled
    }
}

/// Messages from spawned tasks to the coordinating loop.
#[derive(Debug)]
enum Event {
    Finished {
        id: ItemId,
        outcome: TransferOutcome,
    },
    Resolved {
        marker: String,
        items: Vec<Arc<DownloadItem>>,
    },
}

/// Per-run plumbing shared by every spawned task.
struct RunContext {
    tx: mpsc::UnboundedSender<Event>,
    cancel: CancellationToken,
    destination_root: PathBuf,
    tasks: JoinSet<()>,
}

/// Download engine for one batch at a time.
///
/// # Concurrency Model
///
/// - Each transfer and each marker lookup runs in its own Tokio task
/// - Tasks only update their own item's progress counters
/// - Outcomes flow through one unbounded channel to the coordinating loop
/// - The loop frees slots, refills them, and fires the completion event
///
/// # Cancellation
///
/// When the token fires, in-flight transfers stop, remove their temporary
/// files and report a silent outcome; nothing new is launched and no item
/// is marked failed because of it.
#[derive(Debug, Clone)]
pub struct DownloadEngine {
    concurrency: NonZeroUsize,
    client: HttpClient,
    resolver: ReleaseResolver,
}

impl DownloadEngine {
    /// Creates an engine with freshly built HTTP clients.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConcurrency`] if the concurrency is
    /// outside 1-100 and [`EngineError::Client`] if a client cannot be built.
    pub fn new(config: &EngineConfig) -> Result<Self, EngineError> {
        let client = HttpClient::with_connect_timeout(config.connect_timeout_secs)
            .map_err(|e| EngineError::Client {
                reason: e.to_string(),
            })?;
        let resolver =
            ReleaseResolver::new(config.resolver_timeout_secs).map_err(|e| EngineError::Client {
                reason: e.to_string(),
            })?;
        Self::with_clients(config.concurrency, client, resolver)
    }

    /// Creates an engine over existing clients.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConcurrency`] if the value is outside
    /// the valid range (1-100).
    pub fn with_clients(
        concurrency: usize,
        client: HttpClient,
        resolver: ReleaseResolver,
    ) -> Result<Self, EngineError> {
        let concurrency = validate_concurrency(concurrency)?;
        debug!(concurrency = concurrency.get(), "download engine created");
        Ok(Self {
            concurrency,
            client,
            resolver,
        })
    }

    /// Configured concurrency limit.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency.get()
    }

    /// Drives `batch` until every item is terminal or `cancel` fires.
    ///
    /// Static-URL items are scheduled right away. Each marker group is looked
    /// up once and scheduled when its lookup finishes, so a slow lookup only
    /// holds back its own items. Items whose marker has no rule stay
    /// unresolved and fail with `no URL` when they reach the queue head.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Destination`] if `destination_root` cannot be
    /// created. Individual download failures are recorded on their items.
    #[instrument(
        skip(self, batch, cancel),
        fields(
            items = batch.len(),
            concurrency = self.concurrency.get(),
            root = %destination_root.display()
        )
    )]
    pub async fn run(
        &self,
        batch: &Batch,
        destination_root: &Path,
        cancel: CancellationToken,
    ) -> Result<DownloadStats, EngineError> {
        tokio::fs::create_dir_all(destination_root)
            .await
            .map_err(|source| EngineError::Destination {
                path: destination_root.to_path_buf(),
                source,
            })?;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut ctx = RunContext {
            tx,
            cancel: cancel.clone(),
            destination_root: destination_root.to_path_buf(),
            tasks: JoinSet::new(),
        };
        let mut scheduler = Scheduler::new(self.concurrency);

        let mut deferred = HashSet::new();
        for group in batch.unresolved_groups() {
            let Some(rule) = batch.marker_rule(&group.marker) else {
                warn!(
                    marker = %group.marker,
                    items = group.items.len(),
                    "no resolution rule for marker"
                );
                continue;
            };
            deferred.extend(group.items.iter().map(|item| item.id()));
            scheduler.begin_resolution();
            self.spawn_resolution(&mut ctx, rule.clone(), group);
        }

        let added = scheduler.enqueue_all(
            batch
                .items()
                .iter()
                .filter(|item| !deferred.contains(&item.id()))
                .cloned(),
        );
        info!(
            queued = added,
            awaiting_resolution = deferred.len(),
            "starting batch"
        );

        let initial = Dispatch {
            launches: scheduler.fill_slots(Instant::now()),
            batch_completed: scheduler.check_complete(),
        };
        self.apply(&mut ctx, batch, initial);

        while !scheduler.is_batch_complete() {
            if scheduler.is_halted() && scheduler.is_idle() {
                break;
            }

            tokio::select! {
                biased;
                () = cancel.cancelled(), if !scheduler.is_halted() => {
                    info!(
                        active = scheduler.active(),
                        pending = scheduler.pending_len(),
                        "cancellation requested, abandoning batch"
                    );
                    scheduler.halt();
                }
                event = rx.recv() => {
                    let Some(event) = event else {
                        break;
                    };
                    let dispatch = match event {
                        Event::Finished { id, outcome } => {
                            scheduler.on_transfer_finished(id, outcome, Instant::now())
                        }
                        Event::Resolved { marker, items } => {
                            debug!(marker = %marker, items = items.len(), "lookup finished");
                            scheduler.on_resolution_finished(items, Instant::now())
                        }
                    };
                    self.apply(&mut ctx, batch, dispatch);
                }
            }
        }

        let RunContext { tx, mut tasks, .. } = ctx;
        drop(tx);
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "download task ended abnormally");
            }
        }

        let stats = DownloadStats::from_batch(batch, scheduler.peak_active(), scheduler.is_halted());
        info!(
            completed = stats.completed(),
            failed = stats.failed(),
            unfinished = stats.unfinished(),
            peak_active = stats.peak_active(),
            cancelled = stats.was_cancelled(),
            "batch finished"
        );
        Ok(stats)
    }

    fn apply(&self, ctx: &mut RunContext, batch: &Batch, dispatch: Dispatch) {
        for launch in dispatch.launches {
            self.spawn_transfer(ctx, launch);
        }
        if dispatch.batch_completed {
            batch.mark_all_complete();
        }
    }

    fn spawn_transfer(&self, ctx: &mut RunContext, launch: Launch) {
        let client = self.client.clone();
        let tx = ctx.tx.clone();
        let cancel = ctx.cancel.clone();
        let root = ctx.destination_root.clone();

        ctx.tasks.spawn(async move {
            let Launch { item, url } = launch;
            let progress_item = Arc::clone(&item);
            let result = client
                .download(&url, &root, item.file_name(), &cancel, move |bytes, length| {
                    progress_item.record_progress(bytes, length, Instant::now());
                })
                .await;

            let outcome = match result {
                Ok(transfer) => TransferOutcome::Completed {
                    bytes: transfer.bytes,
                },
                Err(e) if e.is_cancelled() => TransferOutcome::Cancelled,
                Err(e) => {
                    warn!(item = %item.id(), name = item.name(), error = %e, "download failed");
                    TransferOutcome::Failed(e.to_string())
                }
            };

            if tx
                .send(Event::Finished {
                    id: item.id(),
                    outcome,
                })
                .is_err()
            {
                debug!(item = %item.id(), "coordinator gone, dropping outcome");
            }
        });
    }

    fn spawn_resolution(&self, ctx: &mut RunContext, rule: MarkerRule, group: MarkerGroup) {
        let resolver = self.resolver.clone();
        let tx = ctx.tx.clone();
        let cancel = ctx.cancel.clone();

        ctx.tasks.spawn(async move {
            let MarkerGroup { marker, items } = group;
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    debug!(marker = %marker, "lookup abandoned");
                }
                _ = resolver.resolve_group(&rule, &items) => {}
            }

            if tx.send(Event::Resolved { marker, items }).is_err() {
                debug!("coordinator gone, dropping lookup result");
            }
        });
    }
}

fn validate_concurrency(value: usize) -> Result<NonZeroUsize, EngineError> {
    if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&value) {
        return Err(EngineError::InvalidConcurrency { value });
    }
    NonZeroUsize::new(value).ok_or(EngineError::InvalidConcurrency { value })
}
