//! Appfetch Core Library
//!
//! This library fetches a fixed catalog of files into one directory, a
//! bounded number at a time, resolving "latest release" markers to concrete
//! URLs along the way.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`catalog`] - Download definitions and marker rules
//! - [`queue`] - Per-item state machine and the shared [`Batch`]
//! - [`resolver`] - Release lookups for marker groups
//! - [`download`] - Transfer engine, scheduler and coordinating loop
//! - [`aggregate`] - Batch-level progress and status text
//! - [`config`] - TOML configuration and catalog loading

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod aggregate;
pub mod catalog;
pub mod config;
pub mod download;
pub mod queue;
pub mod resolver;
mod user_agent;

// Re-export commonly used types
pub use aggregate::{BatchPhase, StatusCounts, overall_progress, overall_status_text};
pub use catalog::{Catalog, CatalogError, DownloadDefinition, MarkerRule, UrlSource};
pub use download::{
    DEFAULT_CONCURRENCY, DownloadEngine, DownloadError, DownloadStats, EngineConfig, EngineError,
    HttpClient,
};
pub use queue::{Batch, BatchSnapshot, DownloadItem, ItemId, ItemSnapshot, ItemStatus};
pub use resolver::{ReleaseResolver, ResolveError};
