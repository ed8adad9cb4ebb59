use smallvec::SmallVec;
use std::fmt::Write;
use std::io;

use pgn_reader::Reader;

use crate::visitor::CatalogVisitor;

pub type MoveList = SmallVec<[String; 128]>;

/// Render mainline SAN as `1. e4 e5 2. Nf3` with the result marker appended.
pub fn render_notation(sans: &[String], outcome: Option<&str>) -> String {
    let mut output = String::with_capacity(sans.len() * 6);
    for (move_count, san) in sans.iter().enumerate() {
        if move_count % 2 == 0 {
            if !output.is_empty() {
                output.push(' ');
            }
            let _ = write!(output, "{}. ", (move_count / 2) + 1);
        } else {
            output.push(' ');
        }
        output.push_str(san);
    }

    if let Some(outcome) = outcome {
        if !output.is_empty() {
            output.push(' ');
        }
        output.push_str(outcome);
    }
    output
}

#[derive(Debug, Default)]
pub struct ParsedMovetext {
    pub sans: MoveList,
    pub outcome: Option<String>,
    pub parse_error: bool,
}

/// Collect the mainline SAN tokens of a single game's movetext. Comments,
/// NAGs and variations are dropped.
pub fn parse_movetext_mainline(movetext: &str) -> ParsedMovetext {
    if movetext.trim().is_empty() {
        return ParsedMovetext::default();
    }

    let mut reader = Reader::new(io::Cursor::new(movetext.as_bytes()));
    let mut visitor = CatalogVisitor::new();

    match reader.read_game(&mut visitor) {
        Ok(Some(())) => match visitor.current_game.take() {
            Some(game) => ParsedMovetext {
                sans: game.sans,
                outcome: game.outcome,
                parse_error: false,
            },
            None => ParsedMovetext {
                parse_error: true,
                ..ParsedMovetext::default()
            },
        },
        Ok(None) | Err(_) => ParsedMovetext {
            parse_error: true,
            ..ParsedMovetext::default()
        },
    }
}
