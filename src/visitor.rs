use pgn_reader::{Nag, Outcome, RawComment, RawTag, SanPlus, Skip, Visitor};
use std::mem;
use std::ops::ControlFlow;

use crate::error::{PipelineError, Result};
use crate::filter::{MoveList, render_notation};
use crate::types::GameRecord;

macro_rules! pgn_visitor_skip_variations {
    () => {
        fn nag(&mut self, _: &mut Self::Movetext, _: Nag) -> ControlFlow<Self::Output> {
            ControlFlow::Continue(())
        }

        fn comment(
            &mut self,
            _: &mut Self::Movetext,
            _: RawComment<'_>,
        ) -> ControlFlow<Self::Output> {
            ControlFlow::Continue(())
        }

        fn partial_comment(
            &mut self,
            _: &mut Self::Movetext,
            _: RawComment<'_>,
        ) -> ControlFlow<Self::Output> {
            ControlFlow::Continue(())
        }

        fn begin_variation(&mut self, _: &mut Self::Movetext) -> ControlFlow<Self::Output, Skip> {
            ControlFlow::Continue(Skip(true))
        }
    };
}

/// Streaming PGN visitor (pgn-reader) for catalog building.
///
/// Keeps the two rating tags and the mainline SAN of each game; every other
/// tag, comment, NAG and variation is dropped. The finished game is left in
/// `current_game` after `end_game`.
pub struct CatalogVisitor {
    headers: RatingTags,
    outcome: Option<String>,
    pub current_game: Option<RawGame>,
}

/// A game as read from PGN, before its tags are validated.
#[derive(Debug, Clone, Default)]
pub struct RawGame {
    pub white_elo: Option<String>,
    pub black_elo: Option<String>,
    pub sans: MoveList,
    pub outcome: Option<String>,
}

#[derive(Default)]
struct RatingTags {
    white_elo: String,
    black_elo: String,
}

impl RatingTags {
    fn clear(&mut self) {
        *self = Self::default();
    }

    fn opt_take(field: &mut String) -> Option<String> {
        if field.is_empty() {
            None
        } else {
            Some(mem::take(field))
        }
    }

    fn set_known_tag(&mut self, key: &[u8], value: RawTag<'_>) {
        let slot: &mut String = match key {
            b"WhiteElo" => &mut self.white_elo,
            b"BlackElo" => &mut self.black_elo,
            _ => return,
        };

        // First occurrence wins.
        if !slot.is_empty() {
            return;
        }

        let bytes = value.as_bytes();
        if bytes.is_empty() {
            return;
        }

        *slot = String::from_utf8_lossy(bytes).trim().to_string();
    }
}

impl CatalogVisitor {
    pub fn new() -> Self {
        Self {
            headers: RatingTags::default(),
            outcome: None,
            current_game: None,
        }
    }
}

impl Default for CatalogVisitor {
    fn default() -> Self {
        Self::new()
    }
}

impl RawGame {
    /// Validate the rating tags and render the normalized notation.
    pub fn into_record(self, game_index: usize) -> Result<GameRecord> {
        let white = parse_elo(self.white_elo.as_deref(), game_index, "WhiteElo")?;
        let black = parse_elo(self.black_elo.as_deref(), game_index, "BlackElo")?;

        Ok(GameRecord {
            notation: render_notation(&self.sans, self.outcome.as_deref()),
            average_elo: (f64::from(white) + f64::from(black)) / 2.0,
            source_index: game_index,
        })
    }
}

fn parse_elo(raw: Option<&str>, game_index: usize, field: &'static str) -> Result<u32> {
    raw.and_then(|s| s.parse::<u32>().ok())
        .ok_or(PipelineError::MissingMetadata { game_index, field })
}

impl Visitor for CatalogVisitor {
    type Tags = ();
    type Movetext = MoveList;
    type Output = ();

    fn begin_tags(&mut self) -> ControlFlow<Self::Output, Self::Tags> {
        self.headers.clear();
        self.outcome = None;
        self.current_game = None;
        ControlFlow::Continue(())
    }

    fn tag(
        &mut self,
        _: &mut Self::Tags,
        key: &[u8],
        value: RawTag<'_>,
    ) -> ControlFlow<Self::Output> {
        self.headers.set_known_tag(key, value);
        ControlFlow::Continue(())
    }

    fn begin_movetext(&mut self, _: Self::Tags) -> ControlFlow<Self::Output, Self::Movetext> {
        ControlFlow::Continue(MoveList::new())
    }

    fn san(&mut self, movetext: &mut Self::Movetext, san: SanPlus) -> ControlFlow<Self::Output> {
        movetext.push(san.to_string());
        ControlFlow::Continue(())
    }

    pgn_visitor_skip_variations!();

    fn outcome(
        &mut self,
        _movetext: &mut Self::Movetext,
        outcome: Outcome,
    ) -> ControlFlow<Self::Output> {
        self.outcome = Some(outcome.to_string());
        ControlFlow::Continue(())
    }

    fn end_game(&mut self, movetext: Self::Movetext) -> Self::Output {
        self.current_game = Some(RawGame {
            white_elo: RatingTags::opt_take(&mut self.headers.white_elo),
            black_elo: RatingTags::opt_take(&mut self.headers.black_elo),
            sans: movetext,
            outcome: self.outcome.take(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgn_reader::Reader;

    #[test]
    fn test_visitor_basic_parsing() {
        let pgn = r#"[Event "Test Game"]
[Site "Internet"]
[WhiteElo "2100"]
[BlackElo "1900"]
[Result "1-0"]

1. e4 e5 2. Nf3 1-0"#;

        let mut reader = Reader::new(pgn.as_bytes());
        let mut visitor = CatalogVisitor::new();

        reader.read_game(&mut visitor).unwrap();

        let game = visitor.current_game.take().expect("Should have parsed a game");
        assert_eq!(game.white_elo.as_deref(), Some("2100"));
        assert_eq!(game.black_elo.as_deref(), Some("1900"));

        let record = game.into_record(0).unwrap();
        assert_eq!(record.notation, "1. e4 e5 2. Nf3 1-0");
        assert_eq!(record.average_elo, 2000.0);
    }

    #[test]
    fn test_visitor_duplicate_headers_preserve_first_value() {
        let pgn = r#"[WhiteElo "2000"]
[WhiteElo "2500"]
[BlackElo "1000"]

1. e4 1-0"#;

        let mut reader = Reader::new(pgn.as_bytes());
        let mut visitor = CatalogVisitor::new();

        reader.read_game(&mut visitor).unwrap();

        let record = visitor.current_game.take().unwrap().into_record(0).unwrap();
        assert_eq!(record.average_elo, 1500.0);
    }

    #[test]
    fn test_visitor_strips_comments_and_variations() {
        let pgn = r#"[WhiteElo "1500"]
[BlackElo "1500"]

1. d4 { [%eval 0.25] [%clk 1:30:43] } (1. e4 e5) Nf6 $1 2. c4 0-1"#;

        let mut reader = Reader::new(pgn.as_bytes());
        let mut visitor = CatalogVisitor::new();

        reader.read_game(&mut visitor).unwrap();

        let record = visitor.current_game.take().unwrap().into_record(3).unwrap();
        assert_eq!(record.notation, "1. d4 Nf6 2. c4 0-1");
        assert_eq!(record.source_index, 3);
    }

    #[test]
    fn test_missing_rating_is_reported() {
        let pgn = r#"[Event "No ratings"]
[WhiteElo "2000"]

1. e4 1-0"#;

        let mut reader = Reader::new(pgn.as_bytes());
        let mut visitor = CatalogVisitor::new();

        reader.read_game(&mut visitor).unwrap();

        let err = visitor.current_game.take().unwrap().into_record(5).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::MissingMetadata {
                game_index: 5,
                field: "BlackElo"
            }
        ));
    }

    #[test]
    fn test_unknown_rating_is_missing() {
        let pgn = r#"[WhiteElo "?"]
[BlackElo "2000"]

1. e4 1-0"#;

        let mut reader = Reader::new(pgn.as_bytes());
        let mut visitor = CatalogVisitor::new();

        reader.read_game(&mut visitor).unwrap();

        let err = visitor.current_game.take().unwrap().into_record(0).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::MissingMetadata {
                field: "WhiteElo",
                ..
            }
        ));
    }
}
