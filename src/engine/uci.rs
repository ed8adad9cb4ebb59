//! UCI engine subprocess.

use std::collections::HashSet;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, trace, warn};
use shakmaty::Chess;

use super::score::RawScore;
use super::{Analysis, Oracle};
use crate::config::EngineConfig;
use crate::error::{PipelineError, Result};
use crate::types::board_fen;

const QUIT_GRACE: Duration = Duration::from_millis(300);

/// A running UCI engine. Stdout is drained by a helper thread so that every
/// read can time out.
pub struct UciEngine {
    child: Child,
    stdin: BufWriter<ChildStdin>,
    rx: Receiver<String>,
    options: HashSet<String>,
    id_name: Option<String>,
    id_author: Option<String>,
    response_grace: Duration,
    exited: bool,
}

/// Fields collected from `info` lines while a search runs.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InfoSnapshot {
    pub score: Option<RawScore>,
    pub depth: Option<u32>,
    pub seldepth: Option<u32>,
    pub nodes: Option<u64>,
    pub pv_head: Option<String>,
}

fn unavailable(context: &str, err: impl std::fmt::Display) -> PipelineError {
    PipelineError::EngineUnavailable(format!("{context}: {err}"))
}

impl UciEngine {
    /// Launch `binary` and complete the handshake: `uci`, options,
    /// `isready`, `ucinewgame`.
    pub fn spawn(binary: &Path, config: &EngineConfig) -> Result<Self> {
        let mut child = Command::new(binary)
            .args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| unavailable(&format!("failed to spawn '{}'", binary.display()), e))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| PipelineError::EngineUnavailable("engine has no stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| PipelineError::EngineUnavailable("engine has no stdout".into()))?;

        let (tx, rx) = mpsc::channel::<String>();
        thread::spawn(move || {
            for line in BufReader::new(stdout).lines() {
                match line {
                    Ok(l) => {
                        if tx.send(l).is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
        });

        let mut engine = Self {
            child,
            stdin: BufWriter::new(stdin),
            rx,
            options: HashSet::new(),
            id_name: None,
            id_author: None,
            response_grace: config.response_grace(),
            exited: false,
        };

        let deadline = deadline_after(config.handshake_timeout(), Duration::ZERO)?;
        engine.write_line("uci")?;
        loop {
            let line = engine.read_line_before(deadline)?;
            if let Some(rest) = line.strip_prefix("id name ") {
                engine.id_name = Some(rest.trim().to_string());
            } else if let Some(rest) = line.strip_prefix("id author ") {
                engine.id_author = Some(rest.trim().to_string());
            } else if line.starts_with("option ") {
                if let Some(name) = parse_option_name(&line) {
                    engine.options.insert(name);
                }
            } else if line.trim() == "uciok" {
                break;
            }
        }

        engine.set_option_if_available("Threads", &config.threads.to_string())?;
        engine.set_option_if_available("Hash", &config.hash_mb.to_string())?;
        engine.sync_ready(deadline)?;
        engine.write_line("ucinewgame")?;
        engine.sync_ready(deadline)?;

        debug!(
            "Engine '{}' ready (author {:?}, {} options)",
            engine.id_name.as_deref().unwrap_or("unknown"),
            engine.id_author,
            engine.options.len()
        );
        Ok(engine)
    }

    pub fn id_name(&self) -> Option<&str> {
        self.id_name.as_deref()
    }

    pub fn id_author(&self) -> Option<&str> {
        self.id_author.as_deref()
    }

    fn write_line(&mut self, line: &str) -> Result<()> {
        trace!(">> {line}");
        self.stdin
            .write_all(line.as_bytes())
            .and_then(|()| self.stdin.write_all(b"\n"))
            .and_then(|()| self.stdin.flush())
            .map_err(|e| unavailable("write to engine failed", e))
    }

    fn read_line(&self, timeout: Duration) -> Result<String> {
        match self.rx.recv_timeout(timeout) {
            Ok(line) => {
                trace!("<< {line}");
                Ok(line)
            }
            Err(RecvTimeoutError::Timeout) => Err(PipelineError::EngineUnavailable(format!(
                "no response within {} ms",
                timeout.as_millis()
            ))),
            Err(RecvTimeoutError::Disconnected) => Err(PipelineError::EngineUnavailable(
                "engine closed its output".into(),
            )),
        }
    }

    fn read_line_before(&self, deadline: Instant) -> Result<String> {
        self.read_line(deadline.saturating_duration_since(Instant::now()))
    }

    fn set_option_if_available(&mut self, name: &str, value: &str) -> Result<()> {
        if self.options.contains(name) {
            self.write_line(&format!("setoption name {name} value {value}"))?;
        }
        Ok(())
    }

    fn sync_ready(&mut self, deadline: Instant) -> Result<()> {
        self.write_line("isready")?;
        loop {
            if self.read_line_before(deadline)?.trim() == "readyok" {
                return Ok(());
            }
        }
    }
}

impl Oracle for UciEngine {
    fn analyse(&mut self, board: &Chess, time_limit: Duration) -> Result<Analysis> {
        let deadline = deadline_after(time_limit, self.response_grace)?;
        let movetime = time_limit.as_millis().max(1);
        self.write_line(&format!("position fen {}", board_fen(board)))?;
        self.write_line(&format!("go movetime {movetime}"))?;

        let mut info = InfoSnapshot::default();
        loop {
            let line = self.read_line_before(deadline)?;
            if line.starts_with("info ") {
                parse_info_line(&line, &mut info);
            } else if line.starts_with("bestmove") {
                break;
            }
        }

        let score = info.score.ok_or_else(|| {
            PipelineError::EngineUnavailable("engine sent bestmove without a score".into())
        })?;
        Ok(Analysis {
            score,
            depth: info.depth,
            nodes: info.nodes,
            pv_head: info.pv_head,
        })
    }

    fn quit(&mut self) -> Result<()> {
        if self.exited {
            return Ok(());
        }
        self.exited = true;

        if let Err(e) = self.write_line("quit") {
            debug!("quit not delivered: {e}");
        }
        let deadline = Instant::now() + QUIT_GRACE;
        while Instant::now() < deadline {
            if let Ok(Some(_)) = self.child.try_wait() {
                return Ok(());
            }
            thread::sleep(Duration::from_millis(10));
        }

        warn!("Engine did not exit after quit; killing it");
        match self.child.kill() {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => {}
            Err(e) => return Err(PipelineError::Io(e)),
        }
        self.child.wait()?;
        Ok(())
    }

    fn name(&self) -> Option<&str> {
        self.id_name()
    }
}

impl Drop for UciEngine {
    fn drop(&mut self) {
        let _ = self.quit();
    }
}

/// `now + budget + grace`, or `EngineUnavailable` when that instant cannot be
/// represented.
fn deadline_after(budget: Duration, grace: Duration) -> Result<Instant> {
    budget
        .checked_add(grace)
        .and_then(|wait| Instant::now().checked_add(wait))
        .ok_or_else(|| {
            PipelineError::EngineUnavailable(format!(
                "wait of {budget:?} + {grace:?} exceeds the clock range"
            ))
        })
}

/// Extract the option name from `option name <words…> type …`.
fn parse_option_name(line: &str) -> Option<String> {
    let mut tokens = line.split_whitespace().skip_while(|t| *t != "name").skip(1);
    let mut words = Vec::new();
    for token in tokens.by_ref() {
        if token == "type" {
            break;
        }
        words.push(token);
    }
    (!words.is_empty()).then(|| words.join(" "))
}

/// Walk the tokens of one `info` line, updating the fields it carries.
pub fn parse_info_line(line: &str, out: &mut InfoSnapshot) {
    let mut it = line.split_whitespace();
    let _ = it.next();
    while let Some(tok) = it.next() {
        match tok {
            "depth" => {
                if let Some(v) = it.next().and_then(|s| s.parse().ok()) {
                    out.depth = Some(v);
                }
            }
            "seldepth" => {
                if let Some(v) = it.next().and_then(|s| s.parse().ok()) {
                    out.seldepth = Some(v);
                }
            }
            "nodes" => {
                if let Some(v) = it.next().and_then(|s| s.parse().ok()) {
                    out.nodes = Some(v);
                }
            }
            "score" => match it.next() {
                Some("cp") => {
                    if let Some(v) = it.next().and_then(|s| s.parse().ok()) {
                        out.score = Some(RawScore::Centipawns(v));
                    }
                }
                Some("mate") => {
                    if let Some(v) = it.next().and_then(|s| s.parse().ok()) {
                        out.score = Some(RawScore::Mate(v));
                    }
                }
                _ => {}
            },
            "pv" => {
                if let Some(mv) = it.next() {
                    out.pv_head = Some(mv.to_string());
                }
                break;
            }
            // Free text until end of line.
            "string" => break,
            _ => {}
        }
    }
}
