//! End-to-end engine runs against an in-memory remote.
//!
//! Each test builds a `FakeRemote` with scripted libraries, items, and
//! failures, runs the engine against a temp state directory, and asserts on
//! the report, the recorded remote calls, and the exception CSV.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tempfile::TempDir;

use crate::config::TrimConfig;
use crate::engine::{
    CheckpointDecision, CheckpointPolicy, CheckpointProgress, RunOutcome, TrimEngine,
};
use crate::exceptions::ExceptionLog;
use crate::policy::GateDecision;
use crate::remote::{
    ItemPage, ItemRef, LibraryInfo, LibraryKind, RemoteApi, RemoteError, RemoteResult, SiteInfo,
    VersionInfo, VersionPolicy,
};
use crate::state::{RunState, RunStateStore};

const SITE: &str = "https://contoso.example.com/sites/ops";

// =============================================================================
// Fake remote
// =============================================================================

/// In-memory [`RemoteApi`] with scripted failures and call recording.
struct FakeRemote {
    libraries: Vec<LibraryInfo>,
    items: HashMap<String, Vec<ItemRef>>,
    versions: HashMap<u64, Vec<VersionInfo>>,
    policy: VersionPolicy,
    /// Library whose item listing always fails.
    fail_listing_for: Option<String>,
    /// Delete calls that fail, keyed by 1-based call index.
    delete_failures: Mutex<HashMap<usize, RemoteError>>,
    delete_calls: Mutex<Vec<(String, u64, Vec<String>)>>,
    version_loads: Mutex<Vec<u64>>,
}

impl FakeRemote {
    fn new() -> Self {
        Self {
            libraries: Vec::new(),
            items: HashMap::new(),
            versions: HashMap::new(),
            policy: VersionPolicy {
                pending_change: false,
                major_version_limit: None,
                changed_at: None,
            },
            fail_listing_for: None,
            delete_failures: Mutex::new(HashMap::new()),
            delete_calls: Mutex::new(Vec::new()),
            version_loads: Mutex::new(Vec::new()),
        }
    }

    fn with_library(mut self, title: &str, items: Vec<ItemRef>) -> Self {
        self.libraries.push(LibraryInfo {
            title: title.to_string(),
            hidden: false,
            kind: LibraryKind::DocumentLibrary,
            item_count: Some(items.len() as u64),
        });
        self.items.insert(title.to_string(), items);
        self
    }

    fn with_versions(mut self, item_id: u64, versions: Vec<VersionInfo>) -> Self {
        self.versions.insert(item_id, versions);
        self
    }

    fn with_pending_policy_change(mut self) -> Self {
        self.policy.pending_change = true;
        self
    }

    fn with_listing_failure(mut self, library: &str) -> Self {
        self.fail_listing_for = Some(library.to_string());
        self
    }

    fn fail_delete_call(self, index: usize, error: RemoteError) -> Self {
        self.delete_failures
            .lock()
            .unwrap()
            .insert(index, error);
        self
    }

    fn delete_calls(&self) -> Vec<(String, u64, Vec<String>)> {
        self.delete_calls.lock().unwrap().clone()
    }

    fn version_loads(&self) -> Vec<u64> {
        self.version_loads.lock().unwrap().clone()
    }
}

fn api_error(status: u16, code: Option<&str>, message: &str) -> RemoteError {
    RemoteError::Api {
        status,
        code: code.map(str::to_string),
        message: message.to_string(),
    }
}

#[async_trait]
impl RemoteApi for FakeRemote {
    async fn site_info(&self) -> RemoteResult<SiteInfo> {
        Ok(SiteInfo {
            url: SITE.to_string(),
            title: "Ops".to_string(),
        })
    }

    async fn list_libraries(&self) -> RemoteResult<Vec<LibraryInfo>> {
        Ok(self.libraries.clone())
    }

    async fn list_items_page(
        &self,
        library: &str,
        page_size: u32,
        cursor: Option<&str>,
    ) -> RemoteResult<ItemPage> {
        if self.fail_listing_for.as_deref() == Some(library) {
            return Err(api_error(500, None, "listing backend unavailable"));
        }

        let items = self.items.get(library).cloned().unwrap_or_default();
        let start: usize = cursor.map_or(0, |c| c.parse().unwrap());
        let end = (start + page_size as usize).min(items.len());
        let next_cursor = (end < items.len()).then(|| end.to_string());

        Ok(ItemPage {
            items: items[start..end].to_vec(),
            next_cursor,
        })
    }

    async fn load_versions(&self, _library: &str, item_id: u64) -> RemoteResult<Vec<VersionInfo>> {
        self.version_loads.lock().unwrap().push(item_id);
        Ok(self.versions.get(&item_id).cloned().unwrap_or_default())
    }

    async fn delete_versions(
        &self,
        library: &str,
        item_id: u64,
        labels: &[String],
    ) -> RemoteResult<()> {
        let call_index = {
            let mut calls = self.delete_calls.lock().unwrap();
            calls.push((library.to_string(), item_id, labels.to_vec()));
            calls.len()
        };

        if let Some(error) = self.delete_failures.lock().unwrap().remove(&call_index) {
            return Err(error);
        }
        Ok(())
    }

    async fn version_policy(&self) -> RemoteResult<VersionPolicy> {
        Ok(self.policy.clone())
    }
}

// =============================================================================
// Harness
// =============================================================================

/// A checkpoint policy that always answers the same way.
struct ScriptedCheckpoint(CheckpointDecision);

#[async_trait]
impl CheckpointPolicy for ScriptedCheckpoint {
    async fn decide(&self, _progress: &CheckpointProgress) -> CheckpointDecision {
        self.0
    }
}

fn item(id: u64, name: &str) -> ItemRef {
    ItemRef {
        id,
        name: name.to_string(),
        path: format!("/sites/ops/Shared Documents/{name}"),
        size_bytes: 1024,
    }
}

fn version(label: &str, age_days: i64, is_current: bool) -> VersionInfo {
    VersionInfo {
        label: label.to_string(),
        created_at: Utc::now() - Duration::days(age_days),
        is_current,
        size_bytes: 512,
    }
}

/// Cutoff 45 days, single retry attempt, no inter-chunk pause: failures
/// surface immediately and tests never sleep.
fn options(delete: bool) -> TrimConfig {
    TrimConfig {
        older_than_days: Some(45),
        delete,
        all_libraries: true,
        chunk_pause_ms: 0,
        max_retry_attempts: 1,
        ..TrimConfig::default()
    }
}

struct Workspace {
    temp: TempDir,
}

impl Workspace {
    fn new() -> Self {
        Self {
            temp: TempDir::new().unwrap(),
        }
    }

    fn state_dir(&self) -> PathBuf {
        self.temp.path().join("state")
    }

    fn csv_path(&self) -> PathBuf {
        self.temp.path().join("exceptions.csv")
    }

    async fn engine(&self, remote: &Arc<FakeRemote>, opts: TrimConfig) -> TrimEngine {
        self.engine_with_checkpoint(
            remote,
            opts,
            Box::new(ScriptedCheckpoint(CheckpointDecision::Continue)),
        )
        .await
    }

    async fn engine_with_checkpoint(
        &self,
        remote: &Arc<FakeRemote>,
        opts: TrimConfig,
        checkpoint: Box<dyn CheckpointPolicy>,
    ) -> TrimEngine {
        let store = RunStateStore::open(self.state_dir()).await.unwrap();
        let log = ExceptionLog::open(self.csv_path(), self.temp.path().join("ops.log")).unwrap();
        TrimEngine::new(
            Arc::clone(remote) as Arc<dyn RemoteApi>,
            store,
            log,
            checkpoint,
            SITE,
            50,
            opts,
        )
    }

    async fn saved_state(&self) -> Option<RunState> {
        let store = RunStateStore::open(self.state_dir()).await.unwrap();
        store.load(SITE).await.unwrap()
    }

    fn csv_rows(&self) -> Vec<String> {
        match std::fs::read_to_string(self.csv_path()) {
            Ok(contents) => contents.lines().map(str::to_string).collect(),
            Err(_) => Vec::new(),
        }
    }
}

async fn seed_state(dir: &Path, state: &RunState) {
    let store = RunStateStore::open(dir).await.unwrap();
    store.save(SITE, state).await.unwrap();
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn test_first_run_is_forced_dry_then_second_run_deletes() {
    let remote = Arc::new(
        FakeRemote::new()
            .with_library("Shared Documents", vec![item(1, "report.docx")])
            .with_versions(
                1,
                vec![
                    version("3.0", 0, true),
                    version("2.0", 60, false),
                    version("1.0", 90, false),
                ],
            ),
    );
    let ws = Workspace::new();

    // Run 1: delete requested, but the site has never been trimmed
    let mut engine = ws.engine(&remote, options(true)).await;
    let report = engine.run().await.unwrap();

    assert!(report.dry_run);
    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.summary.versions_eligible, 2);
    assert_eq!(report.summary.versions_deleted, 0);
    assert!(remote.delete_calls().is_empty());

    let state = ws.saved_state().await.expect("state saved after dry run");
    assert!(state.last_run_at.is_some());
    assert!(state.last_dry_run_at.is_some());

    // Run 2: same site, same request; now it deletes
    let mut engine = ws.engine(&remote, options(true)).await;
    let report = engine.run().await.unwrap();

    assert!(!report.dry_run);
    assert_eq!(report.summary.versions_deleted, 2);
    let calls = remote.delete_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].1, 1);
    assert_eq!(calls[0].2, vec!["2.0".to_string(), "1.0".to_string()]);
}

#[tokio::test]
async fn test_current_version_is_never_deleted() {
    // Ages 0 (current), 10, 50, 100 against a 45-day cutoff
    let remote = Arc::new(
        FakeRemote::new()
            .with_library("Shared Documents", vec![item(1, "report.docx")])
            .with_versions(
                1,
                vec![
                    version("4.0", 0, true),
                    version("3.0", 10, false),
                    version("2.0", 50, false),
                    version("1.0", 100, false),
                ],
            ),
    );
    let ws = Workspace::new();
    seed_state(
        &ws.state_dir(),
        &RunState {
            last_run_at: Some(Utc::now() - Duration::days(1)),
            ..RunState::default()
        },
    )
    .await;

    let mut engine = ws.engine(&remote, options(true)).await;
    let report = engine.run().await.unwrap();

    assert!(!report.dry_run);
    let calls = remote.delete_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].2, vec!["2.0".to_string(), "1.0".to_string()]);
    assert!(!calls[0].2.contains(&"4.0".to_string()));
    assert!(!calls[0].2.contains(&"3.0".to_string()));
}

#[tokio::test]
async fn test_pending_policy_change_blocks_without_mutation() {
    let remote = Arc::new(
        FakeRemote::new()
            .with_library("Shared Documents", vec![item(1, "report.docx")])
            .with_versions(1, vec![version("1.0", 90, false)])
            .with_pending_policy_change(),
    );
    let ws = Workspace::new();

    let mut engine = ws.engine(&remote, options(true)).await;
    let report = engine.run().await.unwrap();

    assert_eq!(
        report.outcome,
        RunOutcome::Blocked(GateDecision::PendingChange)
    );
    assert_eq!(report.summary.processed, 0);
    assert!(remote.version_loads().is_empty());
    assert!(remote.delete_calls().is_empty());

    // A blocked run records nothing: no state, no exception rows
    assert_eq!(ws.saved_state().await, None);
    assert!(ws.csv_rows().is_empty());
}

#[tokio::test]
async fn test_recent_policy_change_blocks_until_cooldown_expires() {
    let remote = Arc::new(
        FakeRemote::new().with_library("Shared Documents", vec![item(1, "report.docx")]),
    );
    let ws = Workspace::new();

    // Policy changed 10 minutes ago: blocked
    seed_state(
        &ws.state_dir(),
        &RunState {
            last_run_at: Some(Utc::now() - Duration::days(1)),
            last_policy_change_at: Some(Utc::now() - Duration::minutes(10)),
            ..RunState::default()
        },
    )
    .await;

    let mut engine = ws.engine(&remote, options(false)).await;
    let report = engine.run().await.unwrap();
    assert!(matches!(
        report.outcome,
        RunOutcome::Blocked(GateDecision::CoolingDown { .. })
    ));
    assert_eq!(report.summary.processed, 0);

    // 31 minutes ago: the window has passed
    seed_state(
        &ws.state_dir(),
        &RunState {
            last_run_at: Some(Utc::now() - Duration::days(1)),
            last_policy_change_at: Some(Utc::now() - Duration::minutes(31)),
            ..RunState::default()
        },
    )
    .await;

    let mut engine = ws.engine(&remote, options(false)).await;
    let report = engine.run().await.unwrap();
    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.summary.processed, 1);
}

#[tokio::test]
async fn test_safety_ceiling_aborts_instead_of_completing() {
    let items: Vec<ItemRef> = (1..=150)
        .map(|id| item(id, &format!("file-{id}.txt")))
        .collect();
    let remote = Arc::new(FakeRemote::new().with_library("Bulk", items));
    let ws = Workspace::new();

    let opts = TrimConfig {
        max_files: 100,
        ..options(false)
    };
    let mut engine = ws.engine(&remote, opts).await;
    let report = engine.run().await.unwrap();

    assert_eq!(report.outcome, RunOutcome::SafetyCeiling { max_files: 100 });
    assert_eq!(report.summary.processed, 100);

    // The abort still persists state and reports a summary
    assert!(ws.saved_state().await.is_some());
}

#[tokio::test]
async fn test_run_under_the_ceiling_completes() {
    let items: Vec<ItemRef> = (1..=100)
        .map(|id| item(id, &format!("file-{id}.txt")))
        .collect();
    let remote = Arc::new(FakeRemote::new().with_library("Bulk", items));
    let ws = Workspace::new();

    let opts = TrimConfig {
        max_files: 100,
        ..options(false)
    };
    let mut engine = ws.engine(&remote, opts).await;
    let report = engine.run().await.unwrap();

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.summary.processed, 100);
}

#[tokio::test]
async fn test_chunks_commit_independently_and_blocks_are_recorded() {
    let remote = Arc::new(
        FakeRemote::new()
            .with_library("Shared Documents", vec![item(7, "archive.xlsx")])
            .with_versions(
                7,
                vec![
                    version("6.0", 0, true),
                    version("5.0", 50, false),
                    version("4.0", 60, false),
                    version("3.0", 70, false),
                    version("2.0", 80, false),
                    version("1.0", 90, false),
                ],
            )
            .fail_delete_call(
                2,
                api_error(409, Some("retention_hold"), "item is under a records hold"),
            ),
    );
    let ws = Workspace::new();
    seed_state(
        &ws.state_dir(),
        &RunState {
            last_run_at: Some(Utc::now() - Duration::days(1)),
            ..RunState::default()
        },
    )
    .await;

    let opts = TrimConfig {
        version_batch_size: 2,
        ..options(true)
    };
    let mut engine = ws.engine(&remote, opts).await;
    let report = engine.run().await.unwrap();

    // Five eligible labels in chunks of 2, 2, 1; the middle chunk fails
    let calls = remote.delete_calls();
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[0].2.len(), 2);
    assert_eq!(calls[1].2.len(), 2);
    assert_eq!(calls[2].2.len(), 1);

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.summary.versions_eligible, 5);
    assert_eq!(report.summary.versions_deleted, 3);
    assert_eq!(report.summary.failed_or_blocked, 1);

    let rows = ws.csv_rows();
    assert_eq!(
        rows[0],
        "timestamp,site,library,file_ref,item_id,action,result,message"
    );
    let blocked: Vec<&String> = rows.iter().filter(|r| r.contains(",Blocked,")).collect();
    assert_eq!(blocked.len(), 1);
    assert!(blocked[0].contains("records hold"));
}

#[tokio::test]
async fn test_unexpected_delete_failure_is_recorded_as_failed() {
    let remote = Arc::new(
        FakeRemote::new()
            .with_library("Shared Documents", vec![item(7, "archive.xlsx")])
            .with_versions(
                7,
                vec![version("2.0", 0, true), version("1.0", 90, false)],
            )
            .fail_delete_call(1, api_error(500, None, "internal error")),
    );
    let ws = Workspace::new();
    seed_state(
        &ws.state_dir(),
        &RunState {
            last_run_at: Some(Utc::now() - Duration::days(1)),
            ..RunState::default()
        },
    )
    .await;

    let mut engine = ws.engine(&remote, options(true)).await;
    let report = engine.run().await.unwrap();

    assert_eq!(report.summary.versions_deleted, 0);
    assert_eq!(report.summary.failed_or_blocked, 1);
    let rows = ws.csv_rows();
    assert_eq!(rows.iter().filter(|r| r.contains(",Failed,")).count(), 1);
}

#[tokio::test]
async fn test_two_dry_runs_produce_identical_summaries() {
    let remote = Arc::new(
        FakeRemote::new()
            .with_library("Shared Documents", vec![item(1, "a.docx"), item(2, "b.docx")])
            .with_versions(
                1,
                vec![version("2.0", 0, true), version("1.0", 90, false)],
            )
            .with_versions(2, vec![version("1.0", 10, false)]),
    );
    let ws = Workspace::new();

    let mut engine = ws.engine(&remote, options(false)).await;
    let first = engine.run().await.unwrap();

    let mut engine = ws.engine(&remote, options(false)).await;
    let second = engine.run().await.unwrap();

    assert_eq!(first.summary, second.summary);
    assert_eq!(first.outcome, second.outcome);
    assert!(first.dry_run && second.dry_run);
    assert!(remote.delete_calls().is_empty());

    // Both runs logged the same would-delete intent
    let rows = ws.csv_rows();
    let intents: Vec<&String> = rows
        .iter()
        .filter(|r| r.contains(",Delete,Skipped,"))
        .collect();
    assert_eq!(intents.len(), 2);
}

#[tokio::test]
async fn test_name_skip_filter_avoids_loading_versions() {
    let remote = Arc::new(
        FakeRemote::new()
            .with_library(
                "Shared Documents",
                vec![item(1, "Q1 Contract.docx"), item(2, "notes.txt")],
            )
            .with_versions(2, vec![version("1.0", 90, false)]),
    );
    let ws = Workspace::new();

    let opts = TrimConfig {
        skip_name_tokens: vec!["contract".to_string()],
        ..options(false)
    };
    let mut engine = ws.engine(&remote, opts).await;
    let report = engine.run().await.unwrap();

    assert_eq!(report.summary.processed, 2);
    assert_eq!(report.summary.skipped, 1);
    assert_eq!(remote.version_loads(), vec![2]);

    let rows = ws.csv_rows();
    assert_eq!(rows.iter().filter(|r| r.contains(",Skip,")).count(), 1);
}

#[tokio::test]
async fn test_listing_failure_abandons_library_and_continues() {
    let remote = Arc::new(
        FakeRemote::new()
            .with_library("Broken", vec![item(1, "unreachable.txt")])
            .with_library("Healthy", vec![item(2, "fine.docx")])
            .with_versions(2, vec![version("1.0", 90, false)])
            .with_listing_failure("Broken"),
    );
    let ws = Workspace::new();

    let mut engine = ws.engine(&remote, options(false)).await;
    let report = engine.run().await.unwrap();

    // The broken library contributes one Load exception; the healthy one
    // is still scanned
    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.summary.processed, 1);
    assert_eq!(report.summary.files_with_old_versions, 1);

    let rows = ws.csv_rows();
    let load_failures: Vec<&String> = rows
        .iter()
        .filter(|r| r.contains("Broken") && r.contains(",Load,Failed,"))
        .collect();
    assert_eq!(load_failures.len(), 1);
}

#[tokio::test]
async fn test_checkpoint_stop_finalizes_gracefully() {
    let items: Vec<ItemRef> = (1..=10)
        .map(|id| item(id, &format!("file-{id}.txt")))
        .collect();
    let remote = Arc::new(FakeRemote::new().with_library("Bulk", items));
    let ws = Workspace::new();

    let opts = TrimConfig {
        checkpoint_every_files: 2,
        ..options(false)
    };
    let mut engine = ws
        .engine_with_checkpoint(
            &remote,
            opts,
            Box::new(ScriptedCheckpoint(CheckpointDecision::Stop)),
        )
        .await;
    let report = engine.run().await.unwrap();

    assert_eq!(report.outcome, RunOutcome::AbortedByUser);
    assert_eq!(report.summary.processed, 2);
    assert!(ws.saved_state().await.is_some(), "stop still saves state");
}

#[tokio::test]
async fn test_measured_run_reports_library_bytes() {
    // 120 items at 1024 bytes each, paged 50 at a time
    let items: Vec<ItemRef> = (1..=120)
        .map(|id| item(id, &format!("file-{id}.txt")))
        .collect();
    let remote = Arc::new(FakeRemote::new().with_library("Bulk", items));
    let ws = Workspace::new();

    let opts = TrimConfig {
        measure_size: true,
        ..options(false)
    };
    let mut engine = ws.engine(&remote, opts).await;
    let report = engine.run().await.unwrap();

    assert_eq!(report.summary.size_before, Some(120 * 1024));
    assert_eq!(report.summary.size_after, Some(120 * 1024));
    assert_eq!(report.summary.processed, 120);
}

#[tokio::test]
async fn test_no_selection_is_a_configuration_error() {
    let remote = Arc::new(FakeRemote::new().with_library("Bulk", Vec::new()));
    let ws = Workspace::new();

    let opts = TrimConfig {
        all_libraries: false,
        ..options(false)
    };
    let mut engine = ws.engine(&remote, opts).await;
    let error = engine.run().await.unwrap_err();

    assert!(error.to_string().contains("no libraries selected"), "{error}");
    // Raised before any remote traffic or state write
    assert_eq!(ws.saved_state().await, None);
}

#[tokio::test]
async fn test_missing_cutoff_is_a_configuration_error() {
    let remote = Arc::new(FakeRemote::new().with_library("Bulk", Vec::new()));
    let ws = Workspace::new();

    let opts = TrimConfig {
        older_than_days: None,
        ..options(false)
    };
    let mut engine = ws.engine(&remote, opts).await;
    let error = engine.run().await.unwrap_err();

    assert!(error.to_string().contains("older_than_days"), "{error}");
}
