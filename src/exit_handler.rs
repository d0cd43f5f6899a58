//! Exit code logic for the appfetch process.
//!
//! Single responsibility: map the end state of a run to the process exit outcome.

use std::process::ExitCode;

use appfetch_core::DownloadStats;

/// How the process ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProcessExit {
    /// Nothing failed.
    Success,
    /// Some items failed, some completed.
    Partial,
    /// Every finished item failed.
    Failure,
    /// Ctrl-C stopped the batch.
    Interrupted,
}

impl ProcessExit {
    pub(crate) fn code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::Failure => 1,
            Self::Partial => 2,
            Self::Interrupted => 130,
        }
    }
}

impl From<ProcessExit> for ExitCode {
    fn from(exit: ProcessExit) -> Self {
        ExitCode::from(exit.code())
    }
}

/// Determines the process exit outcome from completed and failed download counts.
pub(crate) fn determine_exit_outcome(completed: usize, failed: usize) -> ProcessExit {
    if failed == 0 {
        ProcessExit::Success
    } else if completed > 0 {
        ProcessExit::Partial
    } else {
        ProcessExit::Failure
    }
}

/// Exit outcome for a finished engine run.
pub(crate) fn exit_for_stats(stats: &DownloadStats) -> ProcessExit {
    if stats.was_cancelled() {
        ProcessExit::Interrupted
    } else {
        determine_exit_outcome(stats.completed(), stats.failed())
    }
}
