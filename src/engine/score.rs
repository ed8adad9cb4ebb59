//! Conversion of raw UCI scores into White-relative centipawns.

use shakmaty::Color;

/// Magnitude assigned to a position where one side is checkmated.
pub const MAX_EVAL: i32 = 10_000;

/// Width of the band just below [`MAX_EVAL`] reserved for mate scores.
/// Centipawn scores are clamped below it.
pub const MATE_BAND: i32 = 1_000;

/// Score as reported by the engine, relative to the side to move.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RawScore {
    Centipawns(i32),
    /// Moves to mate; negative when the side to move is getting mated.
    Mate(i32),
}

impl RawScore {
    /// Side-to-move relative score on the centipawn scale.
    pub fn to_relative(self) -> i32 {
        match self {
            Self::Centipawns(cp) => cp.clamp(-(MAX_EVAL - MATE_BAND), MAX_EVAL - MATE_BAND),
            Self::Mate(0) => -MAX_EVAL,
            Self::Mate(n) => {
                let distance = n.unsigned_abs().min((MATE_BAND - 1) as u32) as i32;
                if n > 0 {
                    MAX_EVAL - distance
                } else {
                    -(MAX_EVAL - distance)
                }
            }
        }
    }

    /// White-relative score for a position with `turn` to move.
    pub fn to_white_relative(self, turn: Color) -> i32 {
        from_side_to_move(self.to_relative(), turn)
    }
}

pub fn from_side_to_move(score: i32, turn: Color) -> i32 {
    match turn {
        Color::White => score,
        Color::Black => -score,
    }
}
