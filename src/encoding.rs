//! Piece-placement encoding: one bitboard per (color, role) pair.
//!
//! Bit `i` of an entry is set when square `i` (a1 = 0, h8 = 63) holds that
//! piece. Entries are ordered White then Black, and within a color
//! Pawn, Knight, Bishop, Rook, Queen, King, so entry `color * 6 + role`.

use shakmaty::{Board, Color, Role};

pub const PIECE_PLANES: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PieceEncoding(pub [u64; PIECE_PLANES]);

impl PieceEncoding {
    pub fn from_board(board: &Board) -> Self {
        let mut planes = [0u64; PIECE_PLANES];
        for color in Color::ALL {
            for role in Role::ALL {
                let occupied = board.by_color(color) & board.by_role(role);
                planes[plane_index(color, role)] = u64::from(occupied);
            }
        }
        Self(planes)
    }

    pub fn plane(&self, color: Color, role: Role) -> u64 {
        self.0[plane_index(color, role)]
    }

    /// Number of occupied squares for one color.
    pub fn count_color(&self, color: Color) -> u32 {
        Role::ALL
            .into_iter()
            .map(|role| self.plane(color, role).count_ones())
            .sum()
    }

    pub fn as_array(&self) -> &[u64; PIECE_PLANES] {
        &self.0
    }
}

fn plane_index(color: Color, role: Role) -> usize {
    let color_offset = match color {
        Color::White => 0,
        Color::Black => 6,
    };
    let role_offset = match role {
        Role::Pawn => 0,
        Role::Knight => 1,
        Role::Bishop => 2,
        Role::Rook => 3,
        Role::Queen => 4,
        Role::King => 5,
    };
    color_offset + role_offset
}
