//! Filesystem rule loader.
//!
//! Loads rule definitions from a directory of YAML files, one
//! definition per file, in one pass at startup. Dotfiles and non-YAML
//! files are skipped; a parse failure in one file is reported per file
//! and never aborts the load. Handler categories referenced by loaded
//! definitions are resolved later, at engine construction.
//!
//! Files are visited in sorted path order so declaration order (the
//! priority tie-break) is stable across platforms.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::{InferenceError, Result};
use crate::rule::RuleDefinition;

/// Outcome of loading a rules directory.
#[derive(Debug)]
pub struct LoadOutcome {
    /// Successfully parsed definitions, in sorted file order.
    pub definitions: Vec<RuleDefinition>,
    /// Per-file results, including skips and failures.
    pub results: Vec<LoadResult>,
}

/// Outcome of loading a single rule file.
#[derive(Debug)]
pub struct LoadResult {
    pub path: PathBuf,
    pub status: LoadStatus,
}

/// Status of a single file load attempt.
#[derive(Debug)]
pub enum LoadStatus {
    Loaded { rule: String },
    Skipped { reason: String },
    Failed { error: String },
}

/// Scan `dir` (recursively) and load every YAML rule definition.
pub fn load_dir(dir: &Path) -> Result<LoadOutcome> {
    let mut outcome = LoadOutcome {
        definitions: Vec::new(),
        results: Vec::new(),
    };
    scan_dir(dir, &mut outcome)?;
    info!(
        path = %dir.display(),
        loaded = outcome.definitions.len(),
        files = outcome.results.len(),
        "rules directory loaded"
    );
    Ok(outcome)
}

fn scan_dir(dir: &Path, outcome: &mut LoadOutcome) -> Result<()> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
        .collect::<std::io::Result<Vec<_>>>()?
        .into_iter()
        .map(|entry| entry.path())
        .collect();
    paths.sort();

    for path in paths {
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            if name.starts_with('.') {
                if path.is_file() {
                    outcome.results.push(LoadResult {
                        path,
                        status: LoadStatus::Skipped {
                            reason: "dotfile".to_string(),
                        },
                    });
                }
                continue;
            }
        }

        if path.is_dir() {
            scan_dir(&path, outcome)?;
            continue;
        }

        let is_yaml = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e == "yml" || e == "yaml")
            .unwrap_or(false);
        if !is_yaml {
            outcome.results.push(LoadResult {
                path,
                status: LoadStatus::Skipped {
                    reason: "not a YAML file".to_string(),
                },
            });
            continue;
        }

        match load_file(&path) {
            Ok(def) => {
                info!(rule = %def.name, path = %path.display(), "loaded rule");
                outcome.results.push(LoadResult {
                    path,
                    status: LoadStatus::Loaded {
                        rule: def.name.clone(),
                    },
                });
                outcome.definitions.push(def);
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load rule file");
                outcome.results.push(LoadResult {
                    path,
                    status: LoadStatus::Failed {
                        error: e.to_string(),
                    },
                });
            }
        }
    }

    Ok(())
}

/// Parse a single YAML file into a [`RuleDefinition`].
pub fn load_file(path: &Path) -> Result<RuleDefinition> {
    let contents = fs::read_to_string(path)?;
    let def: RuleDefinition = serde_yaml::from_str(&contents)?;
    if def.name.is_empty() {
        return Err(InferenceError::Validation(
            "rule name must not be empty".to_string(),
        ));
    }
    Ok(def)
}
