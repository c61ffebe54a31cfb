//! Run counters and the final report.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::policy::GateDecision;
use crate::sizing::format_bytes;

/// Counters accumulated over one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Items seen, whether or not anything was eligible.
    pub processed: u64,

    /// Items that had at least one version past the cutoff.
    pub files_with_old_versions: u64,

    /// Versions past the cutoff across all items.
    pub versions_eligible: u64,

    /// Versions actually deleted. Zero on dry runs.
    pub versions_deleted: u64,

    /// Delete chunks that failed or were refused by a hold.
    pub failed_or_blocked: u64,

    /// Items skipped by the name filter or because their history would not
    /// load.
    pub skipped: u64,

    /// Estimated library bytes before and after, when sizing was requested.
    pub size_before: Option<u64>,
    pub size_after: Option<u64>,
}

impl RunSummary {
    pub fn has_deletions(&self) -> bool {
        self.versions_deleted > 0
    }
}

/// Why the run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed,

    /// The policy gate refused the run before any scanning.
    Blocked(GateDecision),

    /// The operator declined to continue at a checkpoint.
    AbortedByUser,

    /// The processed-items ceiling tripped.
    SafetyCeiling { max_files: u64 },
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::Completed => write!(f, "completed"),
            RunOutcome::Blocked(decision) => write!(f, "blocked: {}", decision),
            RunOutcome::AbortedByUser => write!(f, "stopped at operator request"),
            RunOutcome::SafetyCeiling { max_files } => {
                write!(f, "aborted: processed items exceeded the {} ceiling", max_files)
            }
        }
    }
}

/// Everything a finished run reports back.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub site: String,
    pub dry_run: bool,
    pub outcome: RunOutcome,
    pub summary: RunSummary,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = if self.dry_run { "dry run" } else { "delete" };
        let elapsed = (self.finished_at - self.started_at)
            .to_std()
            .unwrap_or(Duration::ZERO);

        writeln!(f, "trim run {} against {}", self.run_id, self.site)?;
        writeln!(f, "  mode:                    {}", mode)?;
        writeln!(f, "  outcome:                 {}", self.outcome)?;
        writeln!(f, "  items processed:         {}", self.summary.processed)?;
        writeln!(f, "  files with old versions: {}", self.summary.files_with_old_versions)?;
        writeln!(f, "  versions eligible:       {}", self.summary.versions_eligible)?;
        writeln!(f, "  versions deleted:        {}", self.summary.versions_deleted)?;
        writeln!(f, "  chunks failed/blocked:   {}", self.summary.failed_or_blocked)?;
        writeln!(f, "  items skipped:           {}", self.summary.skipped)?;
        if let Some(before) = self.summary.size_before {
            writeln!(f, "  estimated size before:   {}", format_bytes(before))?;
        }
        if let Some(after) = self.summary.size_after {
            writeln!(f, "  estimated size after:    {}", format_bytes(after))?;
        }
        write!(f, "  duration:                {}", format_duration(elapsed))
    }
}

/// Compact duration rendering for reports and prompts: "1h 4m 12s".
pub(crate) fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}
