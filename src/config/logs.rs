//! Log and state file locations.
//!
//! # Example
//!
//! ```toml
//! [logs]
//! exceptions_csv = "/var/log/vertrim/exceptions.csv"
//! operational = "/var/log/vertrim/vertrim.log"
//! state_dir = "/var/lib/vertrim/state"
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Where the exception CSV, the operational log, and the per-site run state
/// live. Everything defaults under the platform's local data directory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogsConfig {
    /// Append-only CSV of failed, blocked, and skipped actions.
    #[serde(default)]
    pub exceptions_csv: Option<PathBuf>,

    /// Free-text operational log.
    #[serde(default)]
    pub operational: Option<PathBuf>,

    /// Directory of per-site run-state records.
    #[serde(default)]
    pub state_dir: Option<PathBuf>,
}

fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("vertrim")
}

impl LogsConfig {
    /// Exception CSV path, configured or default.
    pub fn exceptions_csv_path(&self) -> PathBuf {
        self.exceptions_csv
            .clone()
            .unwrap_or_else(|| data_dir().join("exceptions.csv"))
    }

    /// Operational log path, configured or default.
    pub fn operational_path(&self) -> PathBuf {
        self.operational
            .clone()
            .unwrap_or_else(|| data_dir().join("vertrim.log"))
    }

    /// Run-state directory, configured or default.
    pub fn state_dir_path(&self) -> PathBuf {
        self.state_dir
            .clone()
            .unwrap_or_else(|| data_dir().join("state"))
    }
}
