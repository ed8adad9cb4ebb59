//! Turning a ranked game collection into a position dataset.

use std::path::{Path, PathBuf};

use log::{error, info, warn};

use crate::cancel::CancelToken;
use crate::config::EngineConfig;
use crate::engine::{EngineAdapter, Oracle, UciEngine};
use crate::error::{PipelineError, Result};
use crate::extractor::{ExtractOptions, extract_positions};
use crate::manifest::{Manifest, manifest_path};
use crate::storage;
use crate::types::PositionRecord;

const PROGRESS_EVERY: usize = 1_000;

/// A game that was skipped without stopping the run.
#[derive(Clone, Debug, PartialEq)]
pub struct GameFailure {
    pub game_index: usize,
    pub error: String,
}

#[derive(Debug, Default)]
pub struct BuildReport {
    pub records: Vec<PositionRecord>,
    pub failures: Vec<GameFailure>,
    /// Games attempted to completion, failed ones included.
    pub games_processed: usize,
    pub cancelled: bool,
}

impl BuildReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && !self.cancelled
    }
}

/// Extract every game in collection order.
///
/// Games with unplayable notation are recorded in `failures` and skipped.
/// Engine faults end the run with `Err`. The adapter is shut down before
/// returning on every path.
pub fn build_dataset<O: Oracle>(
    collection: &[String],
    mut adapter: EngineAdapter<O>,
    options: &ExtractOptions,
    cancel: &CancelToken,
) -> Result<BuildReport> {
    let result = process_games(collection, &mut adapter, options, cancel);
    if let Err(e) = adapter.shutdown() {
        warn!("Engine shutdown failed: {e}");
    }
    result
}

fn process_games<O: Oracle>(
    collection: &[String],
    adapter: &mut EngineAdapter<O>,
    options: &ExtractOptions,
    cancel: &CancelToken,
) -> Result<BuildReport> {
    let mut report = BuildReport::default();

    for (game_index, notation) in collection.iter().enumerate() {
        if cancel.is_cancelled() {
            report.cancelled = true;
            break;
        }
        let game_id = u32::try_from(game_index).map_err(|_| {
            PipelineError::Config(format!("game index {game_index} does not fit in u32"))
        })?;

        match extract_positions(notation, game_id, adapter, options, cancel) {
            Ok(records) => report.records.extend(records),
            Err(PipelineError::Cancelled) => {
                report.cancelled = true;
                break;
            }
            Err(e) if e.is_engine_fault() => {
                error!("Aborting at game {game_index}: {e}");
                return Err(e);
            }
            Err(e) => {
                warn!("Skipping game {game_index}: {e}");
                report.failures.push(GameFailure {
                    game_index,
                    error: e.to_string(),
                });
            }
        }
        report.games_processed += 1;

        if report.games_processed % PROGRESS_EVERY == 0 {
            info!(
                "Processed {}/{} games ({} positions)",
                report.games_processed,
                collection.len(),
                report.records.len()
            );
        }
    }

    if report.cancelled {
        warn!(
            "Run cancelled after {} games; keeping {} positions",
            report.games_processed,
            report.records.len()
        );
    }
    Ok(report)
}

/// One `extract` invocation.
#[derive(Clone, Debug)]
pub struct ExtractJob {
    pub games: PathBuf,
    pub output: PathBuf,
    pub annotate: bool,
    pub engine: EngineConfig,
}

/// Load the collection, launch the engine when annotating, build and write
/// the dataset with its manifest.
pub fn run_extraction(job: &ExtractJob, cancel: &CancelToken) -> Result<BuildReport> {
    let mut adapter = EngineAdapter::<UciEngine>::new();
    if job.annotate {
        adapter.initialize(&job.engine)?;
    }
    run_extraction_with(job, adapter, cancel)
}

pub fn run_extraction_with<O: Oracle>(
    job: &ExtractJob,
    adapter: EngineAdapter<O>,
    cancel: &CancelToken,
) -> Result<BuildReport> {
    let time_limit = job.engine.time_limit()?;
    let collection = storage::read_game_collection(&job.games)?;
    info!(
        "Loaded {} games from '{}'",
        collection.len(),
        job.games.display()
    );

    let engine = adapter.engine_name().map(str::to_string);
    let variant = adapter.variant().map(|v| v.name().to_string());
    let options = ExtractOptions {
        annotate: job.annotate,
        time_limit,
    };

    let report = build_dataset(&collection, adapter, &options, cancel)?;

    storage::write_dataset(&job.output, &report.records)?;
    Manifest::from_report(
        &report,
        &job.games,
        collection.len(),
        job.annotate,
        engine,
        variant,
    )
    .write(&manifest_path(&job.output))?;

    info!(
        "Wrote {} positions from {} games to '{}' ({} failed{})",
        report.records.len(),
        report.games_processed,
        job.output.display(),
        report.failures.len(),
        if report.cancelled { ", cancelled" } else { "" }
    );
    Ok(report)
}

/// Reload a dataset written by [`run_extraction`].
pub fn load_dataset(path: &Path) -> Result<Vec<PositionRecord>> {
    storage::read_dataset(path)
}
