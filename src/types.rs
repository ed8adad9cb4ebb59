use shakmaty::{Chess, EnPassantMode, fen::Fen};

use crate::encoding::PieceEncoding;

/// One parsed game, ready for ranking.
#[derive(Debug, Clone, PartialEq)]
pub struct GameRecord {
    /// Mainline SAN with move numbers; no tags, comments, NAGs or variations.
    pub notation: String,
    /// Mean of `WhiteElo` and `BlackElo`.
    pub average_elo: f64,
    /// Position of the game in its source text (0-based).
    pub source_index: usize,
}

/// The board after one ply of one game.
#[derive(Debug, Clone)]
pub struct PositionRecord {
    pub game_id: u32,
    /// 1-based ply counter, reset per game.
    pub half_move: u32,
    pub board: Chess,
    pub pieces: Option<PieceEncoding>,
    /// White-relative centipawns.
    pub evaluation: Option<i32>,
}

impl PositionRecord {
    pub fn fen(&self) -> String {
        board_fen(&self.board)
    }
}

pub fn board_fen(pos: &Chess) -> String {
    Fen::from_position(pos, EnPassantMode::Legal).to_string()
}
