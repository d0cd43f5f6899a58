//! Concurrent HTTP downloads for a batch.
//!
//! This module covers the transfer of single files and the scheduling of
//! many of them under a fixed concurrency bound.
//!
//! # Features
//!
//! - Streaming downloads into a hidden temporary file
//! - Finalization by move, replacing any previous file of the same name
//! - Per-chunk progress with rate and ETA once a transfer is past one second
//! - Bounded fan-out with a single coordinating loop
//! - Silent cancellation through a [`tokio_util::sync::CancellationToken`]
//!
//! # Example
//!
//! ```no_run
//! use appfetch_core::download::HttpClient;
//! use std::path::Path;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = HttpClient::new();
//! let result = client
//!     .download(
//!         "https://example.com/app.dmg",
//!         Path::new("./downloads"),
//!         "App.dmg",
//!         &CancellationToken::new(),
//!         |bytes, total| println!("{bytes} / {total:?}"),
//!     )
//!     .await?;
//! println!("Downloaded: {}", result.path.display());
//! # Ok(())
//! # }
//! ```

mod client;
pub mod constants;
mod engine;
mod error;
mod progress;
mod scheduler;

pub use client::{HttpClient, TransferResult, partial_path};
pub use constants::{DEFAULT_CONCURRENCY, MAX_CONCURRENCY, MIN_CONCURRENCY};
pub use engine::{DownloadEngine, DownloadStats, EngineConfig, EngineError};
pub use error::DownloadError;
pub use progress::ProgressEstimate;
pub use scheduler::{Dispatch, Launch, NO_URL_REASON, Scheduler, TransferOutcome};

// Note: we do NOT define module-local Result aliases.
// Use `Result<T, DownloadError>` explicitly in function signatures.
