//! TOML run configuration. Every section and key is optional.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::archive::Compression;
use crate::catalog::MetadataPolicy;
use crate::error::{PipelineError, Result};

#[derive(Clone, Debug, Default, PartialEq, serde::Deserialize)]
pub struct Config {
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub extract: ExtractConfig,
}

#[derive(Clone, Debug, PartialEq, serde::Deserialize)]
pub struct CatalogConfig {
    #[serde(default = "defaults::max_games")]
    pub max_games: usize,
    #[serde(default)]
    pub metadata_policy: MetadataPolicy,
    #[serde(default)]
    pub dedupe: bool,
    #[serde(default)]
    pub compression: Compression,
}

#[derive(Clone, Debug, PartialEq, serde::Deserialize)]
pub struct EngineConfig {
    #[serde(default = "defaults::engine_path")]
    pub path: PathBuf,
    /// Extra command-line arguments passed to the engine binary.
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "defaults::time_limit_secs")]
    pub time_limit_secs: f64,
    /// Slack on top of the time limit before a silent engine counts as dead.
    #[serde(default = "defaults::response_grace_ms")]
    pub response_grace_ms: u64,
    /// Budget for the whole `uci` … `readyok` exchange at startup.
    #[serde(default = "defaults::handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,
    #[serde(default = "defaults::threads")]
    pub threads: u32,
    #[serde(default = "defaults::hash_mb")]
    pub hash_mb: u32,
    #[serde(default)]
    pub variants: VariantPaths,
}

/// Optional per-build engine binaries.
#[derive(Clone, Debug, Default, PartialEq, serde::Deserialize)]
pub struct VariantPaths {
    #[serde(default)]
    pub popcnt: Option<PathBuf>,
    #[serde(default)]
    pub avx2: Option<PathBuf>,
    #[serde(default)]
    pub neon: Option<PathBuf>,
}

#[derive(Clone, Debug, PartialEq, serde::Deserialize)]
pub struct ExtractConfig {
    #[serde(default = "defaults::annotate")]
    pub annotate: bool,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            max_games: defaults::max_games(),
            metadata_policy: MetadataPolicy::default(),
            dedupe: false,
            compression: Compression::default(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            path: defaults::engine_path(),
            args: Vec::new(),
            time_limit_secs: defaults::time_limit_secs(),
            response_grace_ms: defaults::response_grace_ms(),
            handshake_timeout_ms: defaults::handshake_timeout_ms(),
            threads: defaults::threads(),
            hash_mb: defaults::hash_mb(),
            variants: VariantPaths::default(),
        }
    }
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            annotate: defaults::annotate(),
        }
    }
}

impl EngineConfig {
    /// Search time per position. Rejects zero, negative, NaN and values
    /// too large for a `Duration`.
    pub fn time_limit(&self) -> Result<Duration> {
        let secs = self.time_limit_secs;
        match Duration::try_from_secs_f64(secs) {
            Ok(limit) if !limit.is_zero() => Ok(limit),
            _ => Err(PipelineError::Config(format!(
                "engine.time_limit_secs must be a positive number of seconds, got {secs}"
            ))),
        }
    }

    pub fn response_grace(&self) -> Duration {
        Duration::from_millis(self.response_grace_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
}

impl Config {
    pub fn from_toml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("cannot read '{}': {e}", path.display()))
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let cfg: Self =
            toml::from_str(contents).map_err(|e| PipelineError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.catalog.max_games == 0 {
            return Err(PipelineError::Config(
                "catalog.max_games must be at least 1".into(),
            ));
        }
        self.engine.time_limit()?;
        Ok(())
    }
}

mod defaults {
    use std::path::PathBuf;

    pub fn max_games() -> usize { 1_000_000 }
    pub fn engine_path() -> PathBuf { PathBuf::from("/usr/local/bin/stockfish") }
    pub fn time_limit_secs() -> f64 { 0.1 }
    pub fn response_grace_ms() -> u64 { 5_000 }
    pub fn handshake_timeout_ms() -> u64 { 10_000 }
    pub fn threads() -> u32 { 1 }
    pub fn hash_mb() -> u32 { 16 }
    pub fn annotate() -> bool { true }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let cfg = Config::from_toml_str("").unwrap();
        assert_eq!(cfg, Config::default());
        assert_eq!(cfg.catalog.max_games, 1_000_000);
        assert_eq!(cfg.catalog.metadata_policy, MetadataPolicy::Skip);
        assert_eq!(cfg.engine.time_limit().unwrap(), Duration::from_millis(100));
        assert_eq!(cfg.engine.handshake_timeout(), Duration::from_secs(10));
        assert!(cfg.extract.annotate);
    }

    #[test]
    fn test_full_file() {
        let cfg = Config::from_toml_str(
            r#"
[catalog]
max_games = 500
metadata_policy = "abort"
dedupe = true
compression = "zstd"

[engine]
path = "/opt/sf"
args = ["--bench"]
time_limit_secs = 0.5
threads = 4

[engine.variants]
avx2 = "/opt/sf-avx2"

[extract]
annotate = false
"#,
        )
        .unwrap();

        assert_eq!(cfg.catalog.max_games, 500);
        assert_eq!(cfg.catalog.metadata_policy, MetadataPolicy::Abort);
        assert!(cfg.catalog.dedupe);
        assert_eq!(cfg.catalog.compression, Compression::Zstd);
        assert_eq!(cfg.engine.path, PathBuf::from("/opt/sf"));
        assert_eq!(cfg.engine.args, ["--bench"]);
        assert_eq!(cfg.engine.threads, 4);
        assert_eq!(cfg.engine.hash_mb, 16);
        assert_eq!(cfg.engine.variants.avx2, Some(PathBuf::from("/opt/sf-avx2")));
        assert_eq!(cfg.engine.variants.popcnt, None);
        assert!(!cfg.extract.annotate);
    }

    #[test]
    fn test_rejects_zero_max_games() {
        let err = Config::from_toml_str("[catalog]\nmax_games = 0\n").unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn test_rejects_non_positive_time_limit() {
        let err = Config::from_toml_str("[engine]\ntime_limit_secs = 0.0\n").unwrap_err();
        assert!(err.to_string().contains("time_limit_secs"));
    }

    #[test]
    fn test_rejects_time_limit_beyond_duration_range() {
        let err = Config::from_toml_str("[engine]\ntime_limit_secs = 1e30\n").unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn test_time_limit_without_validation_does_not_panic() {
        for secs in [-1.0, 0.0, f64::NAN, f64::INFINITY, 1e30] {
            let engine = EngineConfig {
                time_limit_secs: secs,
                ..EngineConfig::default()
            };
            assert!(matches!(
                engine.time_limit(),
                Err(PipelineError::Config(_))
            ));
        }

        let engine = EngineConfig {
            time_limit_secs: 1e19,
            ..EngineConfig::default()
        };
        assert!(engine.time_limit().is_ok());
    }

    #[test]
    fn test_rejects_unknown_policy() {
        let err = Config::from_toml_str("[catalog]\nmetadata_policy = \"ignore\"\n").unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::from_toml(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }
}
