//! The trim engine.
//!
//! One [`TrimEngine::run`] call is one run against one site: probe the
//! session, pass the policy gate, resolve targets, then walk each library
//! page by page deleting version history past the cutoff. Safety rails are
//! not optional features of the walk, they are the walk: the first run
//! against a site is always dry, a processed-items ceiling halts runaway
//! scans, checkpoints pause for an operator, and every failed, blocked, or
//! skipped action lands in the exception sink.

pub mod checkpoint;
pub mod filter;
pub mod summary;
pub mod targets;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::TrimConfig;
use crate::exceptions::{
    ExceptionAction, ExceptionLog, ExceptionLogError, ExceptionOutcome, ExceptionRecord,
};
use crate::policy;
use crate::remote::{ItemRef, RemoteApi, RemoteError};
use crate::retry::with_backoff;
use crate::sizing;
use crate::state::{RunStateStore, StateError, effective_dry_run};

pub use checkpoint::{
    CheckpointDecision, CheckpointPolicy, CheckpointProgress, CheckpointTracker,
    InteractiveCheckpoint, UnattendedCheckpoint,
};
pub use filter::{NameSkipFilter, eligible_versions};
pub use summary::{RunOutcome, RunReport, RunSummary};
pub use targets::{TargetSelection, load_tokens_csv, resolve_targets};

/// Result alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Fatal errors that end a run. Per-item trouble is recorded in the
/// exception sink instead and never surfaces here.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("no trim targets: {0}")]
    NoTargets(String),

    #[error("invalid run options: {0}")]
    InvalidOptions(String),

    #[error("failed to read {path}: {source}")]
    SelectionCsv {
        path: PathBuf,
        source: csv::Error,
    },

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Exceptions(#[from] ExceptionLogError),
}

/// Whether a library scan ran to completion or asked the run to halt.
enum ScanFlow {
    NextTarget,
    Halt(RunOutcome),
}

/// One configured run against one site.
pub struct TrimEngine {
    remote: Arc<dyn RemoteApi>,
    store: RunStateStore,
    log: ExceptionLog,
    checkpoint: Box<dyn CheckpointPolicy>,
    site_url: String,
    page_size: u32,
    options: TrimConfig,
}

impl TrimEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        remote: Arc<dyn RemoteApi>,
        store: RunStateStore,
        log: ExceptionLog,
        checkpoint: Box<dyn CheckpointPolicy>,
        site_url: impl Into<String>,
        page_size: u32,
        options: TrimConfig,
    ) -> Self {
        Self {
            remote,
            store,
            log,
            checkpoint,
            site_url: site_url.into(),
            page_size,
            options,
        }
    }

    /// Run the trim to completion and report what happened.
    ///
    /// Returns `Err` only for fatal problems (unreachable site, unusable
    /// options, broken state or exception files). Blocked, operator-stopped,
    /// and ceiling-hit runs are successful runs with that outcome in the
    /// report.
    pub async fn run(&mut self) -> EngineResult<RunReport> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let started = Instant::now();

        // Selection, cutoff, and filter resolve before any remote call.
        let selection = TargetSelection::from_options(
            &self.options.libraries,
            self.options.libraries_csv.as_deref(),
            self.options.all_libraries,
        )?;
        let older_than_days = self.options.older_than_days.ok_or_else(|| {
            EngineError::InvalidOptions("older_than_days is required for a trim run".into())
        })?;
        let filter = self.build_skip_filter()?;
        let cutoff = started_at - chrono::Duration::days(i64::from(older_than_days));
        let attempts = self.options.max_retry_attempts;

        info!(
            run_id = %run_id,
            site = %self.site_url,
            older_than_days = older_than_days,
            cutoff = %cutoff.to_rfc3339(),
            "Starting trim run"
        );

        let remote = Arc::clone(&self.remote);
        let site = with_backoff("site probe", attempts, RemoteError::is_retryable, || {
            remote.site_info()
        })
        .await?;
        info!(site = %site.title, url = %site.url, "Connected to site");

        // Policy gate comes before any scanning. A blocked run mutates
        // nothing: no exception rows, no state save.
        let previous = self.store.load(&self.site_url).await?;
        let dry_run = effective_dry_run(previous.as_ref(), self.options.delete);

        let policy_snapshot =
            with_backoff("versioning policy", attempts, RemoteError::is_retryable, || {
                remote.version_policy()
            })
            .await?;
        let decision = policy::check(&policy_snapshot, previous.as_ref(), Utc::now());
        if decision.is_blocked() {
            warn!(decision = %decision, "Run blocked by the policy gate");
            self.log.note("WARN", &format!("run blocked: {decision}"))?;
            return Ok(RunReport {
                run_id,
                site: self.site_url.clone(),
                dry_run,
                outcome: RunOutcome::Blocked(decision),
                summary: RunSummary::default(),
                started_at,
                finished_at: Utc::now(),
            });
        }

        if dry_run && self.options.delete {
            info!("First run against this site, forcing a dry run");
            self.log.note(
                "INFO",
                "first run against this site: deletion disabled, dry run forced",
            )?;
        }

        let libraries =
            with_backoff("list libraries", attempts, RemoteError::is_retryable, || {
                remote.list_libraries()
            })
            .await?;
        let targets = resolve_targets(&selection, &libraries)?;
        info!(
            targets = targets.len(),
            dry_run = dry_run,
            "Resolved trim targets"
        );

        let mut summary = RunSummary::default();
        if self.options.measure_size {
            summary.size_before = self.estimate_total(&targets, attempts).await;
        }

        let mut tracker = CheckpointTracker::new(
            self.options.checkpoint_every_files,
            self.options.checkpoint_every_minutes,
        );
        let mut outcome = RunOutcome::Completed;

        for library in &targets {
            let flow = self
                .scan_library(library, cutoff, dry_run, attempts, &filter, &mut summary, &mut tracker, started)
                .await?;
            if let ScanFlow::Halt(halting) = flow {
                outcome = halting;
                break;
            }
        }

        if self.options.measure_size {
            summary.size_after = self.estimate_total(&targets, attempts).await;
        }

        // The run happened, whatever its outcome past the gate; the next run
        // keys off this record.
        let finished_at = Utc::now();
        let mut state = previous.unwrap_or_default();
        state.last_run_at = Some(finished_at);
        if dry_run {
            state.last_dry_run_at = Some(finished_at);
        }
        state.last_run_id = Some(run_id);
        self.store.save(&self.site_url, &state).await?;

        let report = RunReport {
            run_id,
            site: self.site_url.clone(),
            dry_run,
            outcome,
            summary,
            started_at,
            finished_at,
        };
        info!(
            outcome = %report.outcome,
            processed = report.summary.processed,
            versions_deleted = report.summary.versions_deleted,
            "Trim run finished"
        );
        self.log.note("INFO", &report.to_string())?;

        Ok(report)
    }

    fn build_skip_filter(&self) -> EngineResult<NameSkipFilter> {
        let mut tokens = self.options.skip_name_tokens.clone();
        if let Some(path) = &self.options.skip_tokens_csv {
            tokens.extend(load_tokens_csv(path)?);
        }
        Ok(NameSkipFilter::new(tokens))
    }

    /// Walk one library page by page. Listing failures abandon the library
    /// with one library-level exception record; the run moves on.
    #[allow(clippy::too_many_arguments)]
    async fn scan_library(
        &mut self,
        library: &str,
        cutoff: DateTime<Utc>,
        dry_run: bool,
        attempts: u32,
        filter: &NameSkipFilter,
        summary: &mut RunSummary,
        tracker: &mut CheckpointTracker,
        run_started: Instant,
    ) -> EngineResult<ScanFlow> {
        info!(library = %library, "Scanning library");
        let remote = Arc::clone(&self.remote);
        let page_size = self.page_size;
        let mut cursor: Option<String> = None;

        loop {
            let cursor_ref = cursor.as_deref();
            let listed = with_backoff("list items", attempts, RemoteError::is_retryable, || {
                remote.list_items_page(library, page_size, cursor_ref)
            })
            .await;

            let page = match listed {
                Ok(page) => page,
                Err(error) => {
                    warn!(
                        library = %library,
                        error = %error,
                        "Failed to list items, skipping the rest of this library"
                    );
                    self.record_exception(
                        library,
                        "",
                        "",
                        ExceptionAction::Load,
                        ExceptionOutcome::Failed,
                        &format!("listing items failed: {error}"),
                    )?;
                    return Ok(ScanFlow::NextTarget);
                }
            };

            for item in &page.items {
                if summary.processed >= self.options.max_files {
                    warn!(
                        library = %library,
                        processed = summary.processed,
                        max_files = self.options.max_files,
                        "Processed-items ceiling reached, aborting run"
                    );
                    self.log.note(
                        "ERROR",
                        &format!(
                            "processed-items ceiling of {} reached in {}, aborting",
                            self.options.max_files, library
                        ),
                    )?;
                    return Ok(ScanFlow::Halt(RunOutcome::SafetyCeiling {
                        max_files: self.options.max_files,
                    }));
                }

                summary.processed += 1;
                self.process_item(library, item, cutoff, dry_run, attempts, filter, summary)
                    .await?;

                if tracker.register_file() {
                    let progress = CheckpointProgress {
                        library: library.to_string(),
                        processed: summary.processed,
                        files_with_old_versions: summary.files_with_old_versions,
                        versions_deleted: summary.versions_deleted,
                        elapsed: run_started.elapsed(),
                    };
                    let decision = self.checkpoint.decide(&progress).await;
                    tracker.reset();
                    if decision == CheckpointDecision::Stop {
                        info!(processed = summary.processed, "Run stopped at checkpoint");
                        self.log.note("INFO", "run stopped at operator checkpoint")?;
                        return Ok(ScanFlow::Halt(RunOutcome::AbortedByUser));
                    }
                }
            }

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        Ok(ScanFlow::NextTarget)
    }

    /// Handle one item: skip filter, version load, eligibility, then either
    /// a dry-run record or chunked deletion. Per-item trouble is recorded
    /// and the scan continues.
    #[allow(clippy::too_many_arguments)]
    async fn process_item(
        &mut self,
        library: &str,
        item: &ItemRef,
        cutoff: DateTime<Utc>,
        dry_run: bool,
        attempts: u32,
        filter: &NameSkipFilter,
        summary: &mut RunSummary,
    ) -> EngineResult<()> {
        if let Some(token) = filter.matched_token(&item.name) {
            debug!(item = %item.name, token = token, "Skipping item by name filter");
            summary.skipped += 1;
            let message = format!("name matches skip token \"{token}\"");
            self.record_exception(
                library,
                &item.path,
                &item.id.to_string(),
                ExceptionAction::Skip,
                ExceptionOutcome::Skipped,
                &message,
            )?;
            return Ok(());
        }

        let remote = Arc::clone(&self.remote);
        let loaded = with_backoff("load versions", attempts, RemoteError::is_retryable, || {
            remote.load_versions(library, item.id)
        })
        .await;

        let versions = match loaded {
            Ok(versions) => versions,
            Err(error) => {
                warn!(
                    library = %library,
                    item = %item.path,
                    error = %error,
                    "Failed to load version history, skipping item"
                );
                summary.skipped += 1;
                self.record_exception(
                    library,
                    &item.path,
                    &item.id.to_string(),
                    ExceptionAction::Load,
                    ExceptionOutcome::Failed,
                    &error.to_string(),
                )?;
                return Ok(());
            }
        };

        let eligible = eligible_versions(&versions, cutoff);
        if eligible.is_empty() {
            return Ok(());
        }

        summary.files_with_old_versions += 1;
        summary.versions_eligible += eligible.len() as u64;

        let labels: Vec<String> = eligible.iter().map(|v| v.label.clone()).collect();

        if dry_run {
            info!(
                library = %library,
                item = %item.path,
                versions = labels.len(),
                "DRY RUN: Would delete old versions"
            );
            self.record_exception(
                library,
                &item.path,
                &item.id.to_string(),
                ExceptionAction::Delete,
                ExceptionOutcome::Skipped,
                &format!("dry run: would delete {} version(s)", labels.len()),
            )?;
            return Ok(());
        }

        self.delete_in_chunks(library, item, &labels, attempts, summary)
            .await
    }

    /// Delete version labels in chunks. Each chunk is its own commit: a
    /// failed or blocked chunk is recorded and the remaining chunks still
    /// run.
    async fn delete_in_chunks(
        &mut self,
        library: &str,
        item: &ItemRef,
        labels: &[String],
        attempts: u32,
        summary: &mut RunSummary,
    ) -> EngineResult<()> {
        let remote = Arc::clone(&self.remote);
        let batch = self.options.version_batch_size.max(1) as usize;
        let pause = Duration::from_millis(self.options.chunk_pause_ms);

        for (index, chunk) in labels.chunks(batch).enumerate() {
            if index > 0 && !pause.is_zero() {
                tokio::time::sleep(pause).await;
            }

            let deleted =
                with_backoff("delete versions", attempts, RemoteError::is_retryable, || {
                    remote.delete_versions(library, item.id, chunk)
                })
                .await;

            match deleted {
                Ok(()) => {
                    summary.versions_deleted += chunk.len() as u64;
                    debug!(
                        library = %library,
                        item = %item.path,
                        deleted = chunk.len(),
                        "Deleted version chunk"
                    );
                }
                Err(error) => {
                    let result = if error.is_policy_block() {
                        ExceptionOutcome::Blocked
                    } else {
                        ExceptionOutcome::Failed
                    };
                    summary.failed_or_blocked += 1;
                    warn!(
                        library = %library,
                        item = %item.path,
                        error = %error,
                        "Version chunk not deleted"
                    );
                    self.record_exception(
                        library,
                        &item.path,
                        &item.id.to_string(),
                        ExceptionAction::Delete,
                        result,
                        &error.to_string(),
                    )?;
                }
            }
        }

        Ok(())
    }

    async fn estimate_total(&self, targets: &[String], attempts: u32) -> Option<u64> {
        let mut total: u64 = 0;
        for library in targets {
            match sizing::estimate_library_bytes(
                self.remote.as_ref(),
                library,
                self.page_size,
                attempts,
            )
            .await
            {
                Ok(bytes) => total = total.saturating_add(bytes),
                Err(error) => {
                    warn!(
                        library = %library,
                        error = %error,
                        "Size estimate failed, reporting without it"
                    );
                    return None;
                }
            }
        }
        Some(total)
    }

    fn record_exception(
        &mut self,
        library: &str,
        file_ref: &str,
        item_id: &str,
        action: ExceptionAction,
        result: ExceptionOutcome,
        message: &str,
    ) -> Result<(), ExceptionLogError> {
        self.log.record(&ExceptionRecord {
            timestamp: Utc::now(),
            site: self.site_url.clone(),
            library: library.to_string(),
            file_ref: file_ref.to_string(),
            item_id: item_id.to_string(),
            action,
            result,
            message: message.to_string(),
        })
    }
}
