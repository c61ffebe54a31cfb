//! Trim run configuration.
//!
//! Everything that shapes a run: the cutoff, target selection, deletion
//! behavior, and the safety rails.
//!
//! # Example
//!
//! ```toml
//! [trim]
//! older_than_days = 180
//! delete = false
//! libraries = ["Shared Documents", "Archive"]
//! skip_name_tokens = ["contract", "confidential"]
//! max_files = 200000
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Options for a trim run.
///
/// All bounded-range values are rejected at validation when out of range,
/// never clamped. The one exception is `version_batch_size = 0`, which falls
/// back to the default with a warning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrimConfig {
    /// Versions older than this many days are eligible for deletion.
    /// Floor: 5, to prevent accidental mass-deletion of recent history.
    /// Required for `trim`; other commands ignore it.
    #[serde(default)]
    pub older_than_days: Option<u32>,

    /// Actually delete. Without it every run is a dry run, and the first
    /// run against a site is a dry run even with it.
    /// Default: false
    #[serde(default)]
    pub delete: bool,

    /// Explicit library titles to trim. Case-sensitive.
    #[serde(default)]
    pub libraries: Vec<String>,

    /// CSV file of library titles, first column, header row tolerated.
    /// Used when `libraries` is empty.
    #[serde(default)]
    pub libraries_csv: Option<PathBuf>,

    /// Trim every visible document library on the site.
    /// Default: false
    #[serde(default)]
    pub all_libraries: bool,

    /// Items whose leaf name contains one of these tokens
    /// (case-insensitive) are skipped before their versions are loaded.
    #[serde(default)]
    pub skip_name_tokens: Vec<String>,

    /// CSV file of additional skip tokens, first column.
    #[serde(default)]
    pub skip_tokens_csv: Option<PathBuf>,

    /// Version labels deleted per commit round-trip.
    /// Range 1..=500; 0 falls back to the default.
    /// Default: 50
    #[serde(default = "default_version_batch_size")]
    pub version_batch_size: u32,

    /// Pause between deletion chunks, in milliseconds.
    /// Range 0..=60000. Default: 500
    #[serde(default = "default_chunk_pause_ms")]
    pub chunk_pause_ms: u64,

    /// Hard ceiling on items processed in one run. Exceeding it aborts.
    /// Range 1..=1000000. Default: 200000
    #[serde(default = "default_max_files")]
    pub max_files: u64,

    /// Files between operator checkpoints.
    /// Range 100..=100000. Default: 5000
    #[serde(default = "default_checkpoint_every_files")]
    pub checkpoint_every_files: u64,

    /// Minutes between operator checkpoints.
    /// Range 1..=240. Default: 10
    #[serde(default = "default_checkpoint_every_minutes")]
    pub checkpoint_every_minutes: u64,

    /// Checkpoints log and continue instead of prompting.
    /// Default: false
    #[serde(default)]
    pub unattended: bool,

    /// Attempts per remote call, including the first.
    /// Range 1..=8. Default: 4
    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: u32,

    /// Estimate target sizes before and after the run. Costs a second full
    /// item pass per target.
    /// Default: false
    #[serde(default)]
    pub measure_size: bool,
}

impl Default for TrimConfig {
    fn default() -> Self {
        Self {
            older_than_days: None,
            delete: false,
            libraries: Vec::new(),
            libraries_csv: None,
            all_libraries: false,
            skip_name_tokens: Vec::new(),
            skip_tokens_csv: None,
            version_batch_size: default_version_batch_size(),
            chunk_pause_ms: default_chunk_pause_ms(),
            max_files: default_max_files(),
            checkpoint_every_files: default_checkpoint_every_files(),
            checkpoint_every_minutes: default_checkpoint_every_minutes(),
            unattended: false,
            max_retry_attempts: default_max_retry_attempts(),
            measure_size: false,
        }
    }
}

fn default_version_batch_size() -> u32 {
    50
}

fn default_chunk_pause_ms() -> u64 {
    500
}

fn default_max_files() -> u64 {
    200_000
}

fn default_checkpoint_every_files() -> u64 {
    5000
}

fn default_checkpoint_every_minutes() -> u64 {
    10
}

fn default_max_retry_attempts() -> u32 {
    4
}

/// Versions must be at least this old to trim. Guards against a typo'd
/// cutoff wiping recent history.
pub const MIN_OLDER_THAN_DAYS: u32 = 5;

impl TrimConfig {
    /// Validate bounded-range settings, naming the offending field.
    ///
    /// Takes `&mut self` for the one sanctioned fallback: a zero batch size
    /// resets to the default instead of erroring.
    pub fn validate(&mut self) -> Result<(), String> {
        if let Some(days) = self.older_than_days
            && days < MIN_OLDER_THAN_DAYS
        {
            return Err(format!(
                "trim.older_than_days must be at least {MIN_OLDER_THAN_DAYS}, got {days}"
            ));
        }
        if self.version_batch_size == 0 {
            tracing::warn!(
                default = default_version_batch_size(),
                "trim.version_batch_size is 0, falling back to the default"
            );
            self.version_batch_size = default_version_batch_size();
        }
        if self.version_batch_size > 500 {
            return Err(format!(
                "trim.version_batch_size must be between 1 and 500, got {}",
                self.version_batch_size
            ));
        }
        if self.chunk_pause_ms > 60_000 {
            return Err(format!(
                "trim.chunk_pause_ms must be between 0 and 60000, got {}",
                self.chunk_pause_ms
            ));
        }
        if !(1..=1_000_000).contains(&self.max_files) {
            return Err(format!(
                "trim.max_files must be between 1 and 1000000, got {}",
                self.max_files
            ));
        }
        if !(100..=100_000).contains(&self.checkpoint_every_files) {
            return Err(format!(
                "trim.checkpoint_every_files must be between 100 and 100000, got {}",
                self.checkpoint_every_files
            ));
        }
        if !(1..=240).contains(&self.checkpoint_every_minutes) {
            return Err(format!(
                "trim.checkpoint_every_minutes must be between 1 and 240, got {}",
                self.checkpoint_every_minutes
            ));
        }
        if !(1..=8).contains(&self.max_retry_attempts) {
            return Err(format!(
                "trim.max_retry_attempts must be between 1 and 8, got {}",
                self.max_retry_attempts
            ));
        }
        Ok(())
    }
}
