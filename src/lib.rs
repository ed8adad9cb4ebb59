pub mod archive;
pub mod cancel;
pub mod catalog;
pub mod config;
pub mod encoding;
pub mod engine;
pub mod error;
pub mod extractor;
pub mod filter;
pub mod logging;
pub mod manifest;
pub mod orchestrator;
pub mod storage;
pub mod types;
pub mod visitor;

pub use archive::{Compression, decode_archive, resolve_sources};
pub use cancel::CancelToken;
pub use catalog::{CatalogOptions, CatalogReport, MetadataPolicy, build_catalog, rank_games};
pub use config::{Config, EngineConfig};
pub use encoding::PieceEncoding;
pub use engine::{EngineAdapter, EngineVariant, MAX_EVAL, Oracle};
pub use error::{PipelineError, Result};
pub use extractor::{ExtractOptions, extract_positions};
pub use orchestrator::{BuildReport, ExtractJob, GameFailure, build_dataset, load_dataset, run_extraction};
pub use types::{GameRecord, PositionRecord};
