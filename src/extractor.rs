//! Replaying one game and emitting a record per ply.

use std::time::Duration;

use log::debug;
use shakmaty::{Chess, Position, san::SanPlus};

use crate::cancel::CancelToken;
use crate::engine::{EngineAdapter, Oracle};
use crate::error::{PipelineError, Result};
use crate::filter::parse_movetext_mainline;
use crate::types::PositionRecord;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ExtractOptions {
    /// Ask the engine for a score and the piece encoding of every position.
    pub annotate: bool,
    pub time_limit: Duration,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            annotate: true,
            time_limit: Duration::from_millis(100),
        }
    }
}

/// Replay `notation` from the initial position. Record `n` holds the board
/// after ply `n` (1-based).
pub fn extract_positions<O: Oracle>(
    notation: &str,
    game_id: u32,
    adapter: &mut EngineAdapter<O>,
    options: &ExtractOptions,
    cancel: &CancelToken,
) -> Result<Vec<PositionRecord>> {
    let parsed = parse_movetext_mainline(notation);
    if parsed.parse_error {
        return Err(PipelineError::MalformedNotation {
            game_id,
            ply: 0,
            san: String::new(),
            reason: "movetext could not be read".into(),
        });
    }

    let mut board = Chess::default();
    let mut records = Vec::with_capacity(parsed.sans.len());

    for (index, token) in parsed.sans.iter().enumerate() {
        cancel.check()?;
        let ply = index as u32 + 1;
        let malformed = |reason: String| PipelineError::MalformedNotation {
            game_id,
            ply,
            san: token.clone(),
            reason,
        };

        let san: SanPlus = token.parse().map_err(|e| malformed(format!("{e}")))?;
        let mv = san.san.to_move(&board).map_err(|e| malformed(format!("{e}")))?;
        board.play_unchecked(mv);

        let (pieces, evaluation) = if options.annotate {
            adapter.set_position(&board)?;
            let evaluation = adapter.evaluate(options.time_limit)?;
            (Some(adapter.pieces_encoding()?), Some(evaluation))
        } else {
            (None, None)
        };

        records.push(PositionRecord {
            game_id,
            half_move: ply,
            board: board.clone(),
            pieces,
            evaluation,
        });
    }

    debug!("Game {game_id}: {} positions", records.len());
    Ok(records)
}
