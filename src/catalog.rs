//! Building the ranked game collection from PGN text.

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use pgn_reader::Reader;
use serde::Deserialize;

use crate::archive::{self, Compression};
use crate::error::{PipelineError, Result};
use crate::storage;
use crate::types::GameRecord;
use crate::visitor::CatalogVisitor;

/// What to do with a game that lacks a usable rating tag.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetadataPolicy {
    /// Leave the game out of the ranking and keep going.
    #[default]
    Skip,
    /// Fail the whole catalog build.
    Abort,
}

#[derive(Debug, Default)]
pub struct ParsedCatalog {
    pub records: Vec<GameRecord>,
    /// Games left out under [`MetadataPolicy::Skip`].
    pub skipped: Vec<PipelineError>,
}

/// Parse every game in `text` until the reader reaches end of input.
///
/// `first_index` offsets the game indices so that several archives can be
/// numbered as one stream.
pub fn parse_games(
    text: &str,
    first_index: usize,
    policy: MetadataPolicy,
    source: &Path,
) -> Result<ParsedCatalog> {
    let mut reader = Reader::new(io::Cursor::new(text.as_bytes()));
    let mut visitor = CatalogVisitor::new();
    let mut parsed = ParsedCatalog::default();
    let mut game_index = first_index;

    loop {
        match reader.read_game(&mut visitor) {
            Ok(Some(())) => {}
            Ok(None) => break,
            Err(error) => {
                return Err(PipelineError::CorruptArchive {
                    path: source.to_path_buf(),
                    reason: format!(
                        "Parser-stage error: stage=read_game; game_index={game_index}; error={error}"
                    ),
                });
            }
        }

        let Some(game) = visitor.current_game.take() else {
            break;
        };

        match game.into_record(game_index) {
            Ok(record) => parsed.records.push(record),
            Err(err) => match policy {
                MetadataPolicy::Skip => {
                    warn!("Skipping game in '{}': {err}", source.display());
                    parsed.skipped.push(err);
                }
                MetadataPolicy::Abort => {
                    warn!("Aborting catalog build on '{}': {err}", source.display());
                    return Err(err);
                }
            },
        }
        game_index += 1;
    }

    debug!(
        "Parsed {} games from '{}' ({} skipped)",
        parsed.records.len(),
        source.display(),
        parsed.skipped.len()
    );
    Ok(parsed)
}

/// Drop games whose notation exactly repeats an earlier one. Returns the
/// number removed.
pub fn dedupe_games(records: &mut Vec<GameRecord>) -> usize {
    let before = records.len();
    let keep: Vec<bool> = {
        let mut seen = HashSet::with_capacity(records.len());
        records
            .iter()
            .map(|record| seen.insert(record.notation.as_str()))
            .collect()
    };
    let mut keep = keep.into_iter();
    records.retain(|_| keep.next().unwrap_or(true));
    before - records.len()
}

/// Order by descending average rating (stable, so ties keep input order)
/// and keep at most `max_games`.
pub fn rank_games(mut records: Vec<GameRecord>, max_games: usize) -> Vec<GameRecord> {
    records.sort_by(|left, right| right.average_elo.total_cmp(&left.average_elo));
    records.truncate(max_games);
    records
}

#[derive(Clone, Debug)]
pub struct CatalogOptions {
    pub output: PathBuf,
    pub max_games: usize,
    pub policy: MetadataPolicy,
    pub compression: Compression,
    pub dedupe: bool,
}

#[derive(Debug)]
pub struct CatalogReport {
    pub games: Vec<GameRecord>,
    pub parsed: usize,
    pub skipped: Vec<PipelineError>,
    pub duplicates: usize,
}

/// Parse and rank already-decoded PGN text without touching the filesystem.
pub fn build_from_text(text: &str, options: &CatalogOptions) -> Result<CatalogReport> {
    collect(
        [(PathBuf::from("<memory>"), text.to_string())],
        options,
    )
}

/// Decode every source archive, rank the games and write the collection.
pub fn build_catalog(sources: &[PathBuf], options: &CatalogOptions) -> Result<CatalogReport> {
    let decoded = sources
        .iter()
        .map(|path| {
            archive::decode_archive(path, options.compression).map(|text| (path.clone(), text))
        })
        .collect::<Result<Vec<_>>>()?;

    let report = collect(decoded, options)?;

    let notations: Vec<String> = report.games.iter().map(|g| g.notation.clone()).collect();
    storage::write_game_collection(&options.output, &notations)?;
    info!(
        "Wrote {} of {} games to '{}' ({} skipped, {} duplicates)",
        report.games.len(),
        report.parsed,
        options.output.display(),
        report.skipped.len(),
        report.duplicates
    );
    Ok(report)
}

fn collect(
    sources: impl IntoIterator<Item = (PathBuf, String)>,
    options: &CatalogOptions,
) -> Result<CatalogReport> {
    let mut records = Vec::new();
    let mut skipped = Vec::new();
    let mut next_index = 0;

    for (path, text) in sources {
        let parsed = parse_games(&text, next_index, options.policy, &path)?;
        next_index += parsed.records.len() + parsed.skipped.len();
        records.extend(parsed.records);
        skipped.extend(parsed.skipped);
    }

    let parsed = records.len();
    let duplicates = if options.dedupe {
        dedupe_games(&mut records)
    } else {
        0
    };

    Ok(CatalogReport {
        games: rank_games(records, options.max_games),
        parsed,
        skipped,
        duplicates,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn game(white: u32, black: u32, moves: &str) -> String {
        format!("[Event \"Rated\"]\n[WhiteElo \"{white}\"]\n[BlackElo \"{black}\"]\n\n{moves}\n\n")
    }

    fn options(output: PathBuf, max_games: usize) -> CatalogOptions {
        CatalogOptions {
            output,
            max_games,
            policy: MetadataPolicy::Skip,
            compression: Compression::Auto,
            dedupe: false,
        }
    }

    #[test]
    fn test_parse_all_games_until_eof() {
        let text = [
            game(1500, 1600, "1. e4 e5 1-0"),
            game(2400, 2500, "1. d4 d5 0-1"),
            game(1800, 1800, "1. c4 1/2-1/2"),
        ]
        .concat();

        let parsed = parse_games(&text, 0, MetadataPolicy::Skip, Path::new("t.pgn")).unwrap();
        assert_eq!(parsed.records.len(), 3);
        assert!(parsed.skipped.is_empty());
        assert_eq!(parsed.records[1].average_elo, 2450.0);
        assert_eq!(parsed.records[2].source_index, 2);
    }

    #[test]
    fn test_empty_input_yields_no_games() {
        let parsed = parse_games("", 0, MetadataPolicy::Abort, Path::new("t.pgn")).unwrap();
        assert!(parsed.records.is_empty());

        let parsed = parse_games("\n\n  \n", 0, MetadataPolicy::Abort, Path::new("t.pgn")).unwrap();
        assert!(parsed.records.is_empty());
    }

    #[test]
    fn test_ranked_output_is_non_increasing() {
        let text = [
            game(1200, 1300, "1. e4 1-0"),
            game(2000, 2100, "1. d4 1-0"),
            game(1700, 1700, "1. c4 1-0"),
            game(2600, 2500, "1. Nf3 1-0"),
        ]
        .concat();

        let report = build_from_text(&text, &options(PathBuf::new(), 100)).unwrap();
        assert_eq!(report.games.len(), 4);
        assert!(
            report
                .games
                .windows(2)
                .all(|w| w[0].average_elo >= w[1].average_elo)
        );
        assert_eq!(report.games[0].notation, "1. Nf3 1-0");
    }

    #[test]
    fn test_truncates_to_strongest_games() {
        let text = [
            game(1000, 1000, "1. a3 1-0"),
            game(2200, 2200, "1. e4 1-0"),
            game(1500, 1500, "1. b3 1-0"),
            game(2100, 2100, "1. d4 1-0"),
        ]
        .concat();

        let report = build_from_text(&text, &options(PathBuf::new(), 2)).unwrap();
        let notations: Vec<&str> = report.games.iter().map(|g| g.notation.as_str()).collect();
        assert_eq!(notations, ["1. e4 1-0", "1. d4 1-0"]);
        assert_eq!(report.parsed, 4);
    }

    #[test]
    fn test_ties_keep_input_order() {
        let records = vec![
            GameRecord {
                notation: "first".into(),
                average_elo: 1800.0,
                source_index: 0,
            },
            GameRecord {
                notation: "second".into(),
                average_elo: 1900.0,
                source_index: 1,
            },
            GameRecord {
                notation: "third".into(),
                average_elo: 1800.0,
                source_index: 2,
            },
        ];

        let ranked = rank_games(records, 10);
        let order: Vec<usize> = ranked.iter().map(|g| g.source_index).collect();
        assert_eq!(order, [1, 0, 2]);
    }

    #[test]
    fn test_skip_policy_excludes_unrated_games() {
        let text = [
            game(2000, 2000, "1. e4 1-0"),
            "[Event \"Casual\"]\n\n1. d4 1-0\n\n".to_string(),
            game(1500, 1500, "1. c4 1-0"),
        ]
        .concat();

        let parsed = parse_games(&text, 0, MetadataPolicy::Skip, Path::new("t.pgn")).unwrap();
        assert_eq!(parsed.records.len(), 2);
        assert_eq!(parsed.skipped.len(), 1);
        assert!(matches!(
            parsed.skipped[0],
            PipelineError::MissingMetadata { game_index: 1, .. }
        ));
        assert_eq!(parsed.records[1].source_index, 2);
    }

    #[test]
    fn test_abort_policy_fails_build() {
        let text = [
            game(2000, 2000, "1. e4 1-0"),
            "[Event \"Casual\"]\n[WhiteElo \"1500\"]\n\n1. d4 1-0\n\n".to_string(),
        ]
        .concat();

        let err = parse_games(&text, 0, MetadataPolicy::Abort, Path::new("t.pgn")).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::MissingMetadata {
                game_index: 1,
                field: "BlackElo"
            }
        ));
    }

    #[test]
    fn test_dedupe_keeps_first_occurrence() {
        let text = [
            game(1500, 1500, "1. e4 e5 1-0"),
            game(2500, 2500, "1. e4 e5 1-0"),
            game(1600, 1600, "1. d4 1-0"),
        ]
        .concat();

        let mut opts = options(PathBuf::new(), 10);
        opts.dedupe = true;
        let report = build_from_text(&text, &opts).unwrap();

        assert_eq!(report.duplicates, 1);
        assert_eq!(report.games.len(), 2);
        assert_eq!(report.games[0].average_elo, 1600.0);
        assert_eq!(report.games[1].source_index, 0);
    }

    #[test]
    fn test_dedupe_compares_whole_notation() {
        let record = |notation: &str, source_index| GameRecord {
            notation: notation.to_string(),
            average_elo: 1500.0,
            source_index,
        };
        let mut records = vec![
            record("1. e4 e5 1-0", 0),
            record("1. e4 e5 0-1", 1),
            record("1. e4 e5", 2),
            record("1. e4 e5 0-1", 3),
            record("", 4),
            record("", 5),
        ];

        assert_eq!(dedupe_games(&mut records), 2);
        let kept: Vec<usize> = records.iter().map(|r| r.source_index).collect();
        assert_eq!(kept, [0, 1, 2, 4]);
    }

    #[test]
    fn test_end_to_end_keeps_stronger_game() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("games.pgn.zst");
        let text = [
            game(1900, 2100, "1. e4 e5 2. Nf3 Nc6 1-0"),
            game(1400, 1600, "1. d4 d5 0-1"),
        ]
        .concat();
        std::fs::write(&source, zstd::encode_all(text.as_bytes(), 3).unwrap()).unwrap();

        let output = dir.path().join("games.npy");
        let report = build_catalog(&[source], &options(output.clone(), 1)).unwrap();
        assert_eq!(report.games.len(), 1);

        let stored = storage::read_game_collection(&output).unwrap();
        assert_eq!(stored, ["1. e4 e5 2. Nf3 Nc6 1-0"]);
    }

    #[test]
    fn test_indices_continue_across_sources() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("a.pgn");
        let second = dir.path().join("b.pgn");
        std::fs::write(&first, game(1000, 1000, "1. e4 1-0")).unwrap();
        std::fs::write(&second, game(1100, 1100, "1. d4 1-0")).unwrap();

        let output = dir.path().join("games.npy");
        let report = build_catalog(&[first, second], &options(output, 10)).unwrap();
        assert_eq!(report.games[0].source_index, 1);
        assert_eq!(report.games[1].source_index, 0);
    }
}
