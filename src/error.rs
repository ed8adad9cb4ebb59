use std::path::PathBuf;

/// Errors raised by the dataset pipeline.
///
/// Variants carry enough context (path, game index, ply) to diagnose a
/// failure from the log line alone.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("source not found: '{}'", path.display())]
    SourceNotFound { path: PathBuf },

    #[error("corrupt archive '{}': {reason}", path.display())]
    CorruptArchive { path: PathBuf, reason: String },

    #[error("game {game_index}: missing or invalid {field} tag")]
    MissingMetadata {
        game_index: usize,
        field: &'static str,
    },

    #[error("engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("invalid engine adapter state: {operation} called while {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },

    #[error("database not found or unreadable '{}': {reason}", path.display())]
    DatabaseNotFound { path: PathBuf, reason: String },

    #[error("game {game_id}: cannot play '{san}' at ply {ply}: {reason}")]
    MalformedNotation {
        game_id: u32,
        ply: u32,
        san: String,
        reason: String,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("run cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Faults that leave the engine in an unknown state; a batch cannot
    /// continue past them.
    pub fn is_engine_fault(&self) -> bool {
        matches!(
            self,
            Self::EngineUnavailable(_) | Self::InvalidState { .. }
        )
    }

    pub(crate) fn database(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::DatabaseNotFound {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;

/// Joins diagnostic messages with `"; "` into a single optional string.
#[derive(Debug, Clone, Default)]
pub struct ErrorAccumulator(Option<String>);

impl ErrorAccumulator {
    pub fn push(&mut self, msg: &str) {
        match &mut self.0 {
            Some(existing) => {
                existing.push_str("; ");
                existing.push_str(msg);
            }
            None => {
                self.0 = Some(msg.to_string());
            }
        }
    }

    pub fn take(&mut self) -> Option<String> {
        self.0.take()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_multiple_messages_uses_separator() {
        let mut accumulator = ErrorAccumulator::default();
        accumulator.push("game 3: bad move");
        accumulator.push("game 7: bad move");

        assert_eq!(
            accumulator.take().as_deref(),
            Some("game 3: bad move; game 7: bad move")
        );
        assert!(accumulator.is_empty());
    }

    #[test]
    fn test_default_is_empty() {
        let mut accumulator = ErrorAccumulator::default();
        assert!(accumulator.is_empty());
        assert!(accumulator.take().is_none());
    }

    #[test]
    fn test_engine_fault_classification() {
        assert!(PipelineError::EngineUnavailable("gone".into()).is_engine_fault());
        assert!(
            PipelineError::InvalidState {
                operation: "evaluate",
                state: "uninitialized"
            }
            .is_engine_fault()
        );
        assert!(
            !PipelineError::MalformedNotation {
                game_id: 0,
                ply: 2,
                san: "e4".into(),
                reason: "illegal".into()
            }
            .is_engine_fault()
        );
        assert!(!PipelineError::Cancelled.is_engine_fault());
    }

    #[test]
    fn test_messages_carry_context() {
        let err = PipelineError::MissingMetadata {
            game_index: 4,
            field: "WhiteElo",
        };
        assert_eq!(err.to_string(), "game 4: missing or invalid WhiteElo tag");

        let err = PipelineError::SourceNotFound {
            path: PathBuf::from("games/lichess.pgn.zst"),
        };
        assert!(err.to_string().contains("games/lichess.pgn.zst"));
    }
}
