//! Engine adapter: board binding and lifecycle on top of a position oracle.

pub mod cpu;
pub mod score;
pub mod uci;

use std::mem;
use std::time::Duration;

use log::{debug, info, warn};
use shakmaty::{Chess, Color, Position};

use crate::config::EngineConfig;
use crate::encoding::PieceEncoding;
use crate::error::{PipelineError, Result};

pub use cpu::{CpuCapabilities, EngineVariant};
pub use score::{MATE_BAND, MAX_EVAL, RawScore};
pub use uci::UciEngine;

/// Result of one search.
#[derive(Clone, Debug, PartialEq)]
pub struct Analysis {
    /// Relative to the side to move.
    pub score: RawScore,
    pub depth: Option<u32>,
    pub nodes: Option<u64>,
    pub pv_head: Option<String>,
}

/// Something that can score a position within a time budget.
pub trait Oracle {
    fn analyse(&mut self, board: &Chess, time_limit: Duration) -> Result<Analysis>;

    /// Release the underlying engine. Calling it again is a no-op.
    fn quit(&mut self) -> Result<()>;

    fn name(&self) -> Option<&str> {
        None
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AdapterState {
    Uninitialized,
    Ready,
    Shutdown,
}

impl AdapterState {
    pub fn label(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Ready => "ready",
            Self::Shutdown => "shut down",
        }
    }
}

enum Slot<O> {
    Uninitialized,
    Ready { oracle: O, board: Chess },
    Shutdown,
}

/// Owns one oracle and the board it is asked about.
///
/// `Uninitialized → Ready → Shutdown`; board operations are only valid while
/// Ready.
pub struct EngineAdapter<O: Oracle = UciEngine> {
    slot: Slot<O>,
    variant: Option<EngineVariant>,
}

impl<O: Oracle> Default for EngineAdapter<O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O: Oracle> EngineAdapter<O> {
    pub fn new() -> Self {
        Self {
            slot: Slot::Uninitialized,
            variant: None,
        }
    }

    pub fn state(&self) -> AdapterState {
        match self.slot {
            Slot::Uninitialized => AdapterState::Uninitialized,
            Slot::Ready { .. } => AdapterState::Ready,
            Slot::Shutdown => AdapterState::Shutdown,
        }
    }

    pub fn variant(&self) -> Option<EngineVariant> {
        self.variant
    }

    pub fn engine_name(&self) -> Option<&str> {
        match &self.slot {
            Slot::Ready { oracle, .. } => oracle.name(),
            _ => None,
        }
    }

    fn invalid(&self, operation: &'static str) -> PipelineError {
        PipelineError::InvalidState {
            operation,
            state: self.state().label(),
        }
    }

    /// Install an already running oracle.
    pub fn initialize_with(&mut self, oracle: O) -> Result<()> {
        if self.state() != AdapterState::Uninitialized {
            return Err(self.invalid("initialize"));
        }
        self.slot = Slot::Ready {
            oracle,
            board: Chess::default(),
        };
        Ok(())
    }

    fn ready_mut(&mut self, operation: &'static str) -> Result<(&mut O, &mut Chess)> {
        let state = self.state().label();
        match &mut self.slot {
            Slot::Ready { oracle, board } => Ok((oracle, board)),
            _ => Err(PipelineError::InvalidState { operation, state }),
        }
    }

    pub fn set_position(&mut self, position: &Chess) -> Result<()> {
        let (_, board) = self.ready_mut("set_position")?;
        *board = position.clone();
        Ok(())
    }

    /// White-relative score of the tracked board.
    pub fn evaluate(&mut self, time_limit: Duration) -> Result<i32> {
        let (oracle, board) = self.ready_mut("evaluate")?;

        if board.is_checkmate() {
            return Ok(match board.turn() {
                Color::White => -MAX_EVAL,
                Color::Black => MAX_EVAL,
            });
        }
        if board.is_stalemate() {
            return Ok(0);
        }

        let analysis = oracle.analyse(board, time_limit)?;
        let score = analysis.score.to_white_relative(board.turn());
        debug!(
            "score {:?} depth {:?} nodes {:?} pv {:?} -> {score}",
            analysis.score, analysis.depth, analysis.nodes, analysis.pv_head
        );
        Ok(score)
    }

    pub fn pieces_encoding(&mut self) -> Result<PieceEncoding> {
        let (_, board) = self.ready_mut("pieces_encoding")?;
        Ok(PieceEncoding::from_board(board.board()))
    }

    /// Stop the engine. Safe in every state; the adapter ends up Shutdown.
    pub fn shutdown(&mut self) -> Result<()> {
        match mem::replace(&mut self.slot, Slot::Shutdown) {
            Slot::Ready { mut oracle, .. } => {
                debug!("Shutting down engine");
                oracle.quit()
            }
            Slot::Uninitialized | Slot::Shutdown => Ok(()),
        }
    }
}

impl EngineAdapter<UciEngine> {
    /// Probe the CPU, pick the matching engine build and launch it.
    pub fn initialize(&mut self, config: &EngineConfig) -> Result<()> {
        self.initialize_for(config, CpuCapabilities::detect())
    }

    pub fn initialize_for(&mut self, config: &EngineConfig, caps: CpuCapabilities) -> Result<()> {
        if self.state() != AdapterState::Uninitialized {
            return Err(self.invalid("initialize"));
        }

        let variant = EngineVariant::select(caps);
        if variant == EngineVariant::Unsupported {
            return Err(PipelineError::EngineUnavailable(format!(
                "no engine build for this CPU ({caps:?})"
            )));
        }

        let binary = variant.binary(config);
        let engine = UciEngine::spawn(binary, config)?;
        info!(
            "Engine '{}' started from '{}' ({variant} build)",
            engine.id_name().unwrap_or("unknown"),
            binary.display()
        );
        self.variant = Some(variant);
        self.initialize_with(engine)
    }
}

impl<O: Oracle> Drop for EngineAdapter<O> {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!("Engine shutdown failed: {e}");
        }
    }
}
