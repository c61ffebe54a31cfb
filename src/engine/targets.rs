//! Target selection.
//!
//! A run trims the libraries it was told to and nothing else. Explicit
//! titles win over a titles CSV, which wins over the all-libraries flag;
//! specifying nothing is an error rather than a silent site-wide trim.

use std::collections::HashSet;
use std::path::Path;

use tracing::warn;

use crate::engine::EngineError;
use crate::remote::{LibraryInfo, LibraryKind};

/// Where the run's library list comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetSelection {
    /// Titles given directly or loaded from a CSV, de-duplicated in order.
    Explicit(Vec<String>),

    /// Every visible document library on the site.
    AllLibraries,
}

impl TargetSelection {
    /// Build a selection from the configured knobs.
    pub fn from_options(
        titles: &[String],
        titles_csv: Option<&Path>,
        all_libraries: bool,
    ) -> Result<Self, EngineError> {
        let mut titles: Vec<String> = titles
            .iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();

        if titles.is_empty()
            && let Some(path) = titles_csv
        {
            titles = load_titles_csv(path)?;
        }

        if !titles.is_empty() {
            let mut seen = HashSet::new();
            titles.retain(|t| seen.insert(t.clone()));
            return Ok(TargetSelection::Explicit(titles));
        }

        if all_libraries {
            return Ok(TargetSelection::AllLibraries);
        }

        Err(EngineError::NoTargets(
            "no libraries selected; pass titles, a titles CSV, or enable all_libraries".into(),
        ))
    }
}

/// Resolve the selection against the live library list.
///
/// Explicit titles match case-sensitively; unknown titles are warned about
/// and dropped. `AllLibraries` keeps visible document libraries only.
pub fn resolve_targets(
    selection: &TargetSelection,
    available: &[LibraryInfo],
) -> Result<Vec<String>, EngineError> {
    let resolved: Vec<String> = match selection {
        TargetSelection::Explicit(titles) => titles
            .iter()
            .filter(|title| {
                let known = available.iter().any(|lib| lib.title == **title);
                if !known {
                    warn!(library = %title, "Library not found on site, skipping");
                }
                known
            })
            .cloned()
            .collect(),
        TargetSelection::AllLibraries => available
            .iter()
            .filter(|lib| lib.kind == LibraryKind::DocumentLibrary && !lib.hidden)
            .map(|lib| lib.title.clone())
            .collect(),
    };

    if resolved.is_empty() {
        return Err(EngineError::NoTargets(
            "selection matched no libraries on the site".into(),
        ));
    }

    Ok(resolved)
}

/// Library titles from the first column of a CSV. A leading header row named
/// `title`, `library`, or `name` is tolerated.
pub fn load_titles_csv(path: &Path) -> Result<Vec<String>, EngineError> {
    read_csv_column(path, &["title", "library", "name"])
}

/// Name-skip tokens from the first column of a CSV. A leading header row
/// named `token` or `pattern` is tolerated.
pub fn load_tokens_csv(path: &Path) -> Result<Vec<String>, EngineError> {
    read_csv_column(path, &["token", "pattern"])
}

fn read_csv_column(path: &Path, header_names: &[&str]) -> Result<Vec<String>, EngineError> {
    let to_engine_error = |source: csv::Error| EngineError::SelectionCsv {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(to_engine_error)?;

    let mut values = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record.map_err(to_engine_error)?;
        let Some(first) = record.get(0) else { continue };
        let first = first.trim();
        if first.is_empty() {
            continue;
        }
        if index == 0 && header_names.contains(&first.to_lowercase().as_str()) {
            continue;
        }
        values.push(first.to_string());
    }

    Ok(values)
}
