//! Constants for the download module (timeouts, concurrency, progress).

use std::time::Duration;

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default concurrency for a batch.
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Minimum allowed concurrency value.
pub const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed concurrency value.
pub const MAX_CONCURRENCY: usize = 100;

/// Elapsed time a transfer must exceed before a rate estimate is published.
pub const SPEED_WARMUP: Duration = Duration::from_secs(1);

/// Suffix of the temporary file a transfer streams into before finalization.
pub const PARTIAL_SUFFIX: &str = ".part";
