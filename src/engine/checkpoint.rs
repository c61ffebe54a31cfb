//! Checkpoint pauses.
//!
//! Long scans pause every N files or M minutes and ask whether to keep
//! going, so a run against a bigger-than-expected site can be stopped
//! mid-flight instead of discovered in the morning. Unattended runs log the
//! checkpoint and continue.

use std::time::Duration;

use async_trait::async_trait;
use dialoguer::Confirm;
use dialoguer::theme::ColorfulTheme;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::engine::summary::format_duration;

/// Scan progress handed to the continuation policy at a checkpoint.
#[derive(Debug, Clone)]
pub struct CheckpointProgress {
    pub library: String,
    pub processed: u64,
    pub files_with_old_versions: u64,
    pub versions_deleted: u64,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointDecision {
    Continue,
    Stop,
}

/// How a run decides whether to continue at a checkpoint.
#[async_trait]
pub trait CheckpointPolicy: Send + Sync {
    async fn decide(&self, progress: &CheckpointProgress) -> CheckpointDecision;
}

/// Ask the operator on the terminal.
///
/// A failed prompt (no TTY, closed stdin) stops the run: a rail that cannot
/// ask must not assume consent.
pub struct InteractiveCheckpoint;

#[async_trait]
impl CheckpointPolicy for InteractiveCheckpoint {
    async fn decide(&self, progress: &CheckpointProgress) -> CheckpointDecision {
        let prompt = format!(
            "Processed {} files in {} ({} with old versions, {} versions deleted). Continue trimming?",
            progress.processed,
            format_duration(progress.elapsed),
            progress.files_with_old_versions,
            progress.versions_deleted,
        );

        let answer = tokio::task::spawn_blocking(move || {
            Confirm::with_theme(&ColorfulTheme::default())
                .with_prompt(prompt)
                .default(true)
                .interact()
        })
        .await;

        match answer {
            Ok(Ok(true)) => CheckpointDecision::Continue,
            Ok(Ok(false)) => CheckpointDecision::Stop,
            Ok(Err(error)) => {
                warn!(error = %error, "Checkpoint prompt failed, stopping the run");
                CheckpointDecision::Stop
            }
            Err(error) => {
                warn!(error = %error, "Checkpoint prompt task failed, stopping the run");
                CheckpointDecision::Stop
            }
        }
    }
}

/// Log the checkpoint and keep going. For scheduled runs with nobody at the
/// terminal.
pub struct UnattendedCheckpoint;

#[async_trait]
impl CheckpointPolicy for UnattendedCheckpoint {
    async fn decide(&self, progress: &CheckpointProgress) -> CheckpointDecision {
        info!(
            library = %progress.library,
            processed = progress.processed,
            versions_deleted = progress.versions_deleted,
            elapsed_secs = progress.elapsed.as_secs(),
            "Checkpoint reached, continuing unattended"
        );
        CheckpointDecision::Continue
    }
}

/// Tracks when the next checkpoint is due: every `every_files` processed
/// files or `every_minutes` of wall time, whichever comes first.
pub struct CheckpointTracker {
    every_files: u64,
    every: Duration,
    files_since: u64,
    last_checkpoint: Instant,
}

impl CheckpointTracker {
    pub fn new(every_files: u64, every_minutes: u64) -> Self {
        Self {
            every_files: every_files.max(1),
            every: Duration::from_secs(every_minutes * 60),
            files_since: 0,
            last_checkpoint: Instant::now(),
        }
    }

    /// Count one processed file; true when a checkpoint is due.
    pub fn register_file(&mut self) -> bool {
        self.files_since += 1;
        self.files_since >= self.every_files || self.last_checkpoint.elapsed() >= self.every
    }

    /// Re-arm both cadences after a checkpoint fires.
    pub fn reset(&mut self) {
        self.files_since = 0;
        self.last_checkpoint = Instant::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_cadence_fires_on_the_nth_file() {
        let mut tracker = CheckpointTracker::new(3, 60);
        assert!(!tracker.register_file());
        assert!(!tracker.register_file());
        assert!(tracker.register_file());
    }

    #[tokio::test]
    async fn test_reset_rearms_the_file_cadence() {
        let mut tracker = CheckpointTracker::new(2, 60);
        assert!(!tracker.register_file());
        assert!(tracker.register_file());

        tracker.reset();
        assert!(!tracker.register_file());
        assert!(tracker.register_file());
    }

    #[tokio::test(start_paused = true)]
    async fn test_time_cadence_fires_after_the_window() {
        let mut tracker = CheckpointTracker::new(1_000_000, 10);
        assert!(!tracker.register_file());

        tokio::time::advance(Duration::from_secs(10 * 60 + 1)).await;
        assert!(tracker.register_file());
    }

    #[tokio::test]
    async fn test_unattended_policy_always_continues() {
        let policy = UnattendedCheckpoint;
        let progress = CheckpointProgress {
            library: "Shared Documents".into(),
            processed: 5000,
            files_with_old_versions: 120,
            versions_deleted: 0,
            elapsed: Duration::from_secs(90),
        };
        assert_eq!(policy.decide(&progress).await, CheckpointDecision::Continue);
    }
}
