//! JSON sidecar describing how a position dataset was produced.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ErrorAccumulator, PipelineError, Result};
use crate::orchestrator::BuildReport;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub created_at: String,
    pub games_file: PathBuf,
    pub games_total: usize,
    pub games_processed: usize,
    pub positions: usize,
    pub annotated: bool,
    pub engine: Option<String>,
    pub engine_variant: Option<String>,
    pub cancelled: bool,
    pub failures: Vec<FailureEntry>,
    /// All failure messages joined with `"; "`.
    pub failure_summary: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FailureEntry {
    pub game_index: usize,
    pub error: String,
}

/// `positions.npy` → `positions.json`.
pub fn manifest_path(dataset: &Path) -> PathBuf {
    dataset.with_extension("json")
}

impl Manifest {
    pub fn from_report(
        report: &BuildReport,
        games_file: &Path,
        games_total: usize,
        annotated: bool,
        engine: Option<String>,
        engine_variant: Option<String>,
    ) -> Self {
        let mut summary = ErrorAccumulator::default();
        let failures = report
            .failures
            .iter()
            .map(|failure| {
                summary.push(&format!("game {}: {}", failure.game_index, failure.error));
                FailureEntry {
                    game_index: failure.game_index,
                    error: failure.error.clone(),
                }
            })
            .collect();

        Self {
            created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            games_file: games_file.to_path_buf(),
            games_total,
            games_processed: report.games_processed,
            positions: report.records.len(),
            annotated,
            engine,
            engine_variant,
            cancelled: report.cancelled,
            failures,
            failure_summary: summary.take(),
        }
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| PipelineError::Config(format!("cannot serialize manifest: {e}")))?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn read(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| PipelineError::database(path, e))?;
        serde_json::from_str(&text).map_err(|e| PipelineError::database(path, e))
    }
}
