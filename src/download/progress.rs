//! Progress math for streaming transfers (fraction, rate, ETA).

use std::time::Duration;

use super::constants::SPEED_WARMUP;

/// Derived progress values for one streaming callback.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressEstimate {
    /// Total size once known. Raised to the byte count if the server
    /// under-declared its length, so `bytes <= total` always holds.
    pub total_bytes: Option<u64>,
    /// Fraction in `[0, 1]`; `0` while the size is unknown.
    pub fraction: f64,
    /// Average rate since transfer start, once past the warm-up window.
    pub speed_bytes_per_sec: Option<f64>,
    /// Seconds remaining, when both rate and size are known.
    pub eta_seconds: Option<f64>,
}

impl ProgressEstimate {
    /// Computes the estimate from raw counters.
    ///
    /// A declared length of `0` is treated as unknown.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn compute(bytes: u64, content_length: Option<u64>, elapsed: Option<Duration>) -> Self {
        let total_bytes = content_length
            .filter(|len| *len > 0)
            .map(|len| len.max(bytes));

        let fraction = total_bytes.map_or(0.0, |total| (bytes as f64 / total as f64).min(1.0));

        let speed_bytes_per_sec = elapsed
            .filter(|elapsed| *elapsed > SPEED_WARMUP)
            .map(|elapsed| bytes as f64 / elapsed.as_secs_f64());

        let eta_seconds = match (speed_bytes_per_sec, total_bytes) {
            (Some(speed), Some(total)) if speed > 0.0 => {
                Some(total.saturating_sub(bytes) as f64 / speed)
            }
            _ => None,
        };

        Self {
            total_bytes,
            fraction,
            speed_bytes_per_sec,
            eta_seconds,
        }
    }
}
