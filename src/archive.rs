//! Loading PGN archives (plain or zstd-compressed) into memory.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use log::{debug, warn};
use serde::Deserialize;
use zstd::stream::read::Decoder as ZstdDecoder;

use crate::error::{PipelineError, Result};

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    /// Pick by file extension.
    #[default]
    Auto,
    Plain,
    Zstd,
}

impl Compression {
    pub fn parse(raw: &str) -> Result<Self> {
        let normalized = raw.trim();
        if normalized.eq_ignore_ascii_case("zstd") {
            Ok(Self::Zstd)
        } else if normalized.eq_ignore_ascii_case("plain") {
            Ok(Self::Plain)
        } else if normalized.eq_ignore_ascii_case("auto") {
            Ok(Self::Auto)
        } else {
            Err(PipelineError::Config(format!(
                "Invalid compression value '{normalized}'. Supported values: 'auto', 'plain' or 'zstd'."
            )))
        }
    }

    /// Resolve `Auto` against the file name.
    pub fn resolve(self, path: &Path) -> Self {
        match self {
            Self::Auto => Self::detect(path),
            other => other,
        }
    }

    pub fn detect(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("zst") || ext.eq_ignore_ascii_case("zstd") => {
                Self::Zstd
            }
            _ => Self::Plain,
        }
    }
}

/// Expand a path or glob pattern into the list of archives to read.
pub fn resolve_sources(pattern: &str) -> Result<Vec<PathBuf>> {
    if !(pattern.contains('*') || pattern.contains('?')) {
        return Ok(vec![PathBuf::from(pattern)]);
    }

    let entries = glob::glob(pattern)
        .map_err(|e| PipelineError::Config(format!("invalid glob pattern '{pattern}': {e}")))?;

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| match entry {
            Ok(path) => Some(path),
            Err(e) => {
                warn!("Skipping unreadable glob entry: {e}");
                None
            }
        })
        .collect();
    paths.sort();

    if paths.is_empty() {
        return Err(PipelineError::SourceNotFound {
            path: PathBuf::from(pattern),
        });
    }
    Ok(paths)
}

fn open_input_stream(path: &Path, compression: Compression) -> Result<Box<dyn Read>> {
    let file = File::open(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => PipelineError::SourceNotFound {
            path: path.to_path_buf(),
        },
        _ => PipelineError::Io(e),
    })?;

    match compression.resolve(path) {
        Compression::Zstd => ZstdDecoder::new(file)
            .map(|decoder| Box::new(decoder) as Box<dyn Read>)
            .map_err(|e| PipelineError::CorruptArchive {
                path: path.to_path_buf(),
                reason: format!("failed to initialize zstd decoder: {e}"),
            }),
        _ => Ok(Box::new(file)),
    }
}

/// Read and (if needed) decompress one archive into a PGN string.
pub fn decode_archive(path: &Path, compression: Compression) -> Result<String> {
    let mut input = open_input_stream(path, compression)?;

    let mut bytes = Vec::new();
    input
        .read_to_end(&mut bytes)
        .map_err(|e| PipelineError::CorruptArchive {
            path: path.to_path_buf(),
            reason: format!("decompression failed: {e}"),
        })?;

    let text = String::from_utf8(bytes).map_err(|e| PipelineError::CorruptArchive {
        path: path.to_path_buf(),
        reason: format!("payload is not valid UTF-8: {e}"),
    })?;

    debug!("Decoded '{}' ({} bytes)", path.display(), text.len());
    Ok(text)
}
