//! `.npy` persistence for game collections and position datasets.
//!
//! A game collection is a 1-D array of fixed-width byte strings (`|S<n>`),
//! NUL-padded to the longest notation. A position dataset is a 1-D
//! structured array, one row per ply, described by [`position_row_dtype`].

use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use npyz::{DType, Field, NpyFile, TypeStr, WriterBuilder};
use shakmaty::{CastlingMode, Chess, fen::Fen};

use crate::encoding::{PIECE_PLANES, PieceEncoding};
use crate::error::{PipelineError, Result};
use crate::types::PositionRecord;

/// Fixed width of the FEN column. The longest legal FEN is well below this.
pub const FEN_BYTES: usize = 96;

/// On-disk row of a position dataset.
#[derive(
    Clone, Copy, Debug, PartialEq, npyz::Serialize, npyz::Deserialize, npyz::AutoSerialize,
)]
pub struct PositionRow {
    pub game_id: u32,
    pub half_move: u32,
    pub fen: [u8; FEN_BYTES],
    pub pieces: [u64; PIECE_PLANES],
    pub has_pieces: u8,
    pub evaluation: i32,
    pub has_evaluation: u8,
}

/// [('game_id','<u4'), ('half_move','<u4'), ('fen','|u1',(96,)),
///  ('pieces','<u8',(12,)), ('has_pieces','|u1'), ('evaluation','<i4'),
///  ('has_evaluation','|u1')]
pub fn position_row_dtype() -> DType {
    let u1: TypeStr = "|u1".parse().unwrap();
    let u4: TypeStr = "<u4".parse().unwrap();
    let u8_le: TypeStr = "<u8".parse().unwrap();
    let i4: TypeStr = "<i4".parse().unwrap();
    DType::Record(vec![
        Field {
            name: "game_id".into(),
            dtype: DType::Plain(u4.clone()),
        },
        Field {
            name: "half_move".into(),
            dtype: DType::Plain(u4),
        },
        Field {
            name: "fen".into(),
            dtype: DType::Array(
                FEN_BYTES.try_into().unwrap(),
                Box::new(DType::Plain(u1.clone())),
            ),
        },
        Field {
            name: "pieces".into(),
            dtype: DType::Array(
                PIECE_PLANES.try_into().unwrap(),
                Box::new(DType::Plain(u8_le)),
            ),
        },
        Field {
            name: "has_pieces".into(),
            dtype: DType::Plain(u1.clone()),
        },
        Field {
            name: "evaluation".into(),
            dtype: DType::Plain(i4),
        },
        Field {
            name: "has_evaluation".into(),
            dtype: DType::Plain(u1),
        },
    ])
}

impl PositionRow {
    pub fn from_record(record: &PositionRecord) -> Result<Self> {
        let fen = record.fen();
        if fen.len() > FEN_BYTES {
            return Err(PipelineError::Config(format!(
                "FEN longer than {FEN_BYTES} bytes: {fen}"
            )));
        }
        let mut fen_bytes = [0u8; FEN_BYTES];
        fen_bytes[..fen.len()].copy_from_slice(fen.as_bytes());

        Ok(Self {
            game_id: record.game_id,
            half_move: record.half_move,
            fen: fen_bytes,
            pieces: record.pieces.map(|p| p.0).unwrap_or([0; PIECE_PLANES]),
            has_pieces: u8::from(record.pieces.is_some()),
            evaluation: record.evaluation.unwrap_or(0),
            has_evaluation: u8::from(record.evaluation.is_some()),
        })
    }

    pub fn fen_str(&self) -> std::result::Result<&str, std::str::Utf8Error> {
        let end = self
            .fen
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(FEN_BYTES);
        std::str::from_utf8(&self.fen[..end])
    }

    fn into_record(self, path: &Path) -> Result<PositionRecord> {
        let fen_str = self
            .fen_str()
            .map_err(|e| PipelineError::database(path, format!("row FEN is not UTF-8: {e}")))?;
        let fen: Fen = fen_str
            .parse()
            .map_err(|e| PipelineError::database(path, format!("bad FEN '{fen_str}': {e}")))?;
        let board: Chess = fen
            .into_position(CastlingMode::Standard)
            .map_err(|e| PipelineError::database(path, format!("illegal FEN '{fen_str}': {e}")))?;

        Ok(PositionRecord {
            game_id: self.game_id,
            half_move: self.half_move,
            board,
            pieces: (self.has_pieces != 0).then_some(PieceEncoding(self.pieces)),
            evaluation: (self.has_evaluation != 0).then_some(self.evaluation),
        })
    }
}

fn begin_atomic(path: &Path) -> Result<(PathBuf, BufWriter<File>)> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("npy.tmp");
    let file = BufWriter::new(File::create(&tmp)?);
    Ok((tmp, file))
}

fn open_npy(path: &Path) -> Result<NpyFile<BufReader<File>>> {
    let file = File::open(path).map_err(|e| PipelineError::database(path, e))?;
    let npy = NpyFile::new(BufReader::new(file)).map_err(|e| PipelineError::database(path, e))?;
    if npy.shape().len() != 1 {
        return Err(PipelineError::database(
            path,
            format!("expected a 1-D array, found shape {:?}", npy.shape()),
        ));
    }
    Ok(npy)
}

/// Write the ranked notation strings as a `|S<n>` array.
pub fn write_game_collection(path: &Path, notations: &[String]) -> Result<()> {
    let width = notations.iter().map(String::len).max().unwrap_or(0).max(1);
    let type_str: TypeStr = format!("|S{width}")
        .parse()
        .map_err(|e| PipelineError::Config(format!("cannot build dtype |S{width}: {e}")))?;

    let (tmp, file) = begin_atomic(path)?;
    let mut writer = npyz::WriteOptions::new()
        .dtype(DType::Plain(type_str))
        .shape(&[notations.len() as u64])
        .writer(file)
        .begin_nd()?;
    for notation in notations {
        let mut padded = notation.as_bytes().to_vec();
        padded.resize(width, 0);
        writer.push(&padded)?;
    }
    writer.finish()?;
    fs::rename(&tmp, path)?;
    Ok(())
}

pub fn read_game_collection(path: &Path) -> Result<Vec<String>> {
    let npy = open_npy(path)?;
    let rows: Vec<Vec<u8>> = npy
        .into_vec()
        .map_err(|e| PipelineError::database(path, e))?;

    rows.into_iter()
        .map(|mut bytes| {
            while bytes.last() == Some(&0) {
                bytes.pop();
            }
            String::from_utf8(bytes)
                .map_err(|e| PipelineError::database(path, format!("notation is not UTF-8: {e}")))
        })
        .collect()
}

pub fn write_dataset(path: &Path, records: &[PositionRecord]) -> Result<()> {
    let rows = records
        .iter()
        .map(PositionRow::from_record)
        .collect::<Result<Vec<_>>>()?;

    let (tmp, file) = begin_atomic(path)?;
    let mut writer = npyz::WriteOptions::new()
        .dtype(position_row_dtype())
        .shape(&[rows.len() as u64])
        .writer(file)
        .begin_nd()?;
    writer.extend(rows.iter().copied())?;
    writer.finish()?;
    fs::rename(&tmp, path)?;
    Ok(())
}

pub fn read_dataset_rows(path: &Path) -> Result<Vec<PositionRow>> {
    let npy = open_npy(path)?;
    npy.into_vec()
        .map_err(|e| PipelineError::database(path, e))
}

/// Reload a dataset written by [`write_dataset`].
pub fn read_dataset(path: &Path) -> Result<Vec<PositionRecord>> {
    read_dataset_rows(path)?
        .into_iter()
        .map(|row| row.into_record(path))
        .collect()
}
