use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use log::error;

use chess_positions::archive::{self, Compression};
use chess_positions::catalog::{self, CatalogOptions, MetadataPolicy};
use chess_positions::config::Config;
use chess_positions::error::Result;
use chess_positions::orchestrator::{self, ExtractJob};
use chess_positions::{CancelToken, logging, storage};

#[derive(Parser, Debug)]
#[command(author, version, about = "Build engine-annotated chess position datasets", long_about = None)]
struct Args {
    /// Increase log verbosity (-v info, -vv debug); CHESS_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Rank the games of one or more PGN archives by average rating
    Catalog {
        /// Archive path or glob pattern (plain PGN or .zst)
        source: String,
        #[arg(short, long)]
        output: PathBuf,
        #[arg(long)]
        max_games: Option<usize>,
        /// auto, plain or zstd
        #[arg(long)]
        compression: Option<String>,
        /// Fail instead of skipping games without ratings
        #[arg(long)]
        abort_on_missing_elo: bool,
        /// Drop games whose moves repeat an earlier game
        #[arg(long)]
        dedupe: bool,
    },
    /// Replay a game collection into a position dataset
    Extract {
        games: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// Engine binary, overriding the configured path
        #[arg(long)]
        engine: Option<PathBuf>,
        /// Seconds per position
        #[arg(long)]
        time_limit: Option<f64>,
        /// Skip engine scores and piece encodings
        #[arg(long)]
        no_annotate: bool,
    },
    /// Print the rows of a position dataset
    Inspect {
        dataset: PathBuf,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(path) => Config::from_toml(path),
        None => Ok(Config::default()),
    }
}

fn run(args: Args) -> Result<()> {
    let mut config = load_config(args.config.as_ref())?;

    match args.command {
        Command::Catalog {
            source,
            output,
            max_games,
            compression,
            abort_on_missing_elo,
            dedupe,
        } => {
            if let Some(max_games) = max_games {
                config.catalog.max_games = max_games;
            }
            if let Some(raw) = compression.as_deref() {
                config.catalog.compression = Compression::parse(raw)?;
            }
            if abort_on_missing_elo {
                config.catalog.metadata_policy = MetadataPolicy::Abort;
            }
            config.catalog.dedupe |= dedupe;
            config.validate()?;

            let sources = archive::resolve_sources(&source)?;
            let options = CatalogOptions {
                output,
                max_games: config.catalog.max_games,
                policy: config.catalog.metadata_policy,
                compression: config.catalog.compression,
                dedupe: config.catalog.dedupe,
            };
            let report = catalog::build_catalog(&sources, &options)?;
            println!(
                "kept {} of {} games ({} skipped, {} duplicates)",
                report.games.len(),
                report.parsed,
                report.skipped.len(),
                report.duplicates
            );
        }
        Command::Extract {
            games,
            output,
            engine,
            time_limit,
            no_annotate,
        } => {
            if let Some(engine) = engine {
                config.engine.path = engine;
            }
            if let Some(secs) = time_limit {
                config.engine.time_limit_secs = secs;
            }
            if no_annotate {
                config.extract.annotate = false;
            }
            config.validate()?;

            let job = ExtractJob {
                games,
                output,
                annotate: config.extract.annotate,
                engine: config.engine,
            };
            let report = orchestrator::run_extraction(&job, &CancelToken::new())?;
            println!(
                "wrote {} positions from {} games ({} failed)",
                report.records.len(),
                report.games_processed,
                report.failures.len()
            );
        }
        Command::Inspect { dataset, limit } => {
            let rows = storage::read_dataset_rows(&dataset)?;
            println!("{} rows", rows.len());
            for row in rows.iter().take(limit) {
                let evaluation = if row.has_evaluation != 0 {
                    row.evaluation.to_string()
                } else {
                    "-".to_string()
                };
                println!(
                    "{:>6} {:>4} {:>7} {}",
                    row.game_id,
                    row.half_move,
                    evaluation,
                    row.fen_str().unwrap_or("<invalid fen>")
                );
            }
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    logging::init(args.verbose);

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_extract_flags() {
        let args = Args::try_parse_from([
            "chess-positions",
            "-vv",
            "extract",
            "games.npy",
            "--output",
            "positions.npy",
            "--time-limit",
            "0.25",
            "--no-annotate",
        ])
        .unwrap();

        assert_eq!(args.verbose, 2);
        match args.command {
            Command::Extract {
                time_limit,
                no_annotate,
                ..
            } => {
                assert_eq!(time_limit, Some(0.25));
                assert!(no_annotate);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
