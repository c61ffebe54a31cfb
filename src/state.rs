//! Per-site run state.
//!
//! One JSON file per site under the state directory, named by the hex SHA-256
//! of the site URL so arbitrary URLs map to stable, filesystem-safe names.
//! Saves go through a temp file and rename, so an interrupted run never
//! truncates the previous record.
//!
//! The record is what the safety rails key off between runs: a site with no
//! completed run gets a forced dry run, and a recent policy change puts the
//! site in a cooldown window.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Result alias for state-store operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors from the run-state store.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("state I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("state record is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// What the trimmer remembers about a site between runs.
///
/// The schema is stable; every field is optional so records written by older
/// builds keep loading.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    /// Completion time of the most recent run, dry or deleting.
    pub last_run_at: Option<DateTime<Utc>>,

    /// Completion time of the most recent dry run.
    pub last_dry_run_at: Option<DateTime<Utc>>,

    /// When the site's versioning policy last changed, stamped by whatever
    /// applied the change.
    pub last_policy_change_at: Option<DateTime<Utc>>,

    /// Identifier of the run that wrote this record, for log correlation.
    #[serde(default)]
    pub last_run_id: Option<Uuid>,
}

impl RunState {
    /// True until a run has completed against this site.
    pub fn is_first_run(&self) -> bool {
        self.last_run_at.is_none()
    }
}

/// Whether this run must be a dry run regardless of flags.
///
/// The first run against a site is always dry, and deletion only happens
/// when the caller asked for it.
pub fn effective_dry_run(previous: Option<&RunState>, delete_requested: bool) -> bool {
    let first_run = previous.map_or(true, RunState::is_first_run);
    first_run || !delete_requested
}

/// Directory of per-site state files.
pub struct RunStateStore {
    dir: PathBuf,
}

impl RunStateStore {
    /// Open the store, creating the directory if needed.
    pub async fn open(dir: impl Into<PathBuf>) -> StateResult<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    /// Stable filesystem key for a site URL.
    pub fn site_key(site_url: &str) -> String {
        hex::encode(Sha256::digest(site_url.as_bytes()))
    }

    fn state_path(&self, site_url: &str) -> PathBuf {
        self.dir.join(format!("{}.json", Self::site_key(site_url)))
    }

    /// Load the record for a site, or `None` if the site has never been seen.
    pub async fn load(&self, site_url: &str) -> StateResult<Option<RunState>> {
        let path = self.state_path(site_url);
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&contents)?))
    }

    /// Write the record atomically; the previous state survives a crash
    /// mid-save.
    pub async fn save(&self, site_url: &str, state: &RunState) -> StateResult<()> {
        let path = self.state_path(site_url);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(state)?;
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    /// Stamp a policy change on a site, creating the record if the site has
    /// never been run. The trim run itself never writes this field.
    pub async fn record_policy_change(
        &self,
        site_url: &str,
        at: DateTime<Utc>,
    ) -> StateResult<()> {
        let mut state = self.load(site_url).await?.unwrap_or_default();
        state.last_policy_change_at = Some(at);
        self.save(site_url, &state).await
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    const SITE: &str = "https://contoso.example/teams/records";

    async fn create_test_store() -> (RunStateStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = RunStateStore::open(temp_dir.path()).await.unwrap();
        (store, temp_dir)
    }

    #[test]
    fn test_site_key_is_stable_and_distinct() {
        let a = RunStateStore::site_key(SITE);
        let b = RunStateStore::site_key(SITE);
        let c = RunStateStore::site_key("https://contoso.example/teams/archive");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|ch| ch.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn test_load_missing_site_returns_none() {
        let (store, _temp) = create_test_store().await;
        assert_eq!(store.load(SITE).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_save_and_reload_round_trips() {
        let (store, temp) = create_test_store().await;

        let state = RunState {
            last_run_at: Some(Utc::now()),
            last_dry_run_at: Some(Utc::now()),
            ..RunState::default()
        };
        store.save(SITE, &state).await.unwrap();

        // Reopening the store sees the same record
        let reopened = RunStateStore::open(temp.path()).await.unwrap();
        assert_eq!(reopened.load(SITE).await.unwrap(), Some(state));
    }

    #[tokio::test]
    async fn test_save_leaves_no_temp_file_behind() {
        let (store, temp) = create_test_store().await;
        store.save(SITE, &RunState::default()).await.unwrap();

        let names: Vec<String> = std::fs::read_dir(temp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();

        assert_eq!(names.len(), 1);
        assert!(names[0].ends_with(".json"), "unexpected file: {}", names[0]);
    }

    #[tokio::test]
    async fn test_policy_change_on_unseen_site_still_counts_as_first_run() {
        let (store, _temp) = create_test_store().await;

        store.record_policy_change(SITE, Utc::now()).await.unwrap();

        let state = store.load(SITE).await.unwrap().unwrap();
        assert!(state.is_first_run());
        assert!(state.last_policy_change_at.is_some());
    }

    #[tokio::test]
    async fn test_policy_change_preserves_run_timestamps() {
        let (store, _temp) = create_test_store().await;

        let ran_at = Utc::now();
        store
            .save(
                SITE,
                &RunState {
                    last_run_at: Some(ran_at),
                    last_dry_run_at: Some(ran_at),
                    ..RunState::default()
                },
            )
            .await
            .unwrap();

        store.record_policy_change(SITE, Utc::now()).await.unwrap();

        let state = store.load(SITE).await.unwrap().unwrap();
        assert_eq!(state.last_run_at, Some(ran_at));
        assert!(state.last_policy_change_at.is_some());
    }

    #[test]
    fn test_first_run_always_forces_dry_run() {
        assert!(effective_dry_run(None, true));
        assert!(effective_dry_run(None, false));

        let unrun = RunState::default();
        assert!(effective_dry_run(Some(&unrun), true));
    }

    #[test]
    fn test_delete_only_happens_when_requested_after_first_run() {
        let ran = RunState {
            last_run_at: Some(Utc::now()),
            ..RunState::default()
        };
        assert!(!effective_dry_run(Some(&ran), true));
        assert!(effective_dry_run(Some(&ran), false));
    }
}
