//! Runtime CPU probing and engine build selection.

use std::fmt;
use std::path::Path;

use log::debug;

use crate::config::EngineConfig;

/// Environment variable that caps the detected feature set.
pub const VARIANT_ENV: &str = "CHESS_ENGINE_VARIANT";

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct CpuCapabilities {
    pub popcnt: bool,
    pub avx2: bool,
    pub bmi2: bool,
    pub neon: bool,
}

impl CpuCapabilities {
    /// Probe the host, then apply the optional `CHESS_ENGINE_VARIANT` cap.
    pub fn detect() -> Self {
        let hw = Self::hardware();
        let caps = match std::env::var(VARIANT_ENV) {
            Ok(limit) => hw.clamped(&limit),
            Err(_) => hw,
        };
        debug!("CPU capabilities: {caps:?} (hardware {hw:?})");
        caps
    }

    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    fn hardware() -> Self {
        Self {
            popcnt: std::is_x86_feature_detected!("popcnt"),
            avx2: std::is_x86_feature_detected!("avx2"),
            bmi2: std::is_x86_feature_detected!("bmi2"),
            neon: false,
        }
    }

    #[cfg(target_arch = "aarch64")]
    fn hardware() -> Self {
        Self {
            neon: std::arch::is_aarch64_feature_detected!("neon"),
            ..Self::default()
        }
    }

    #[cfg(not(any(target_arch = "x86", target_arch = "x86_64", target_arch = "aarch64")))]
    fn hardware() -> Self {
        Self::default()
    }

    /// Drop features above `limit`. Unknown values leave the set unchanged.
    pub fn clamped(self, limit: &str) -> Self {
        match limit.trim().to_ascii_lowercase().as_str() {
            "baseline" | "popcnt" => Self {
                avx2: false,
                bmi2: false,
                ..self
            },
            "none" | "unsupported" => Self::default(),
            _ => self,
        }
    }
}

/// Engine build matching the host CPU.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EngineVariant {
    Unsupported,
    Popcnt,
    Avx2,
    Neon,
}

impl EngineVariant {
    pub fn select(caps: CpuCapabilities) -> Self {
        if caps.avx2 {
            Self::Avx2
        } else if caps.popcnt {
            Self::Popcnt
        } else if caps.neon {
            Self::Neon
        } else {
            Self::Unsupported
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Unsupported => "unsupported",
            Self::Popcnt => "popcnt",
            Self::Avx2 => "avx2",
            Self::Neon => "neon",
        }
    }

    /// Binary to launch: the per-variant override when configured, else the
    /// default engine path.
    pub fn binary(self, config: &EngineConfig) -> &Path {
        let variant_path = match self {
            Self::Popcnt => config.variants.popcnt.as_deref(),
            Self::Avx2 => config.variants.avx2.as_deref(),
            Self::Neon => config.variants.neon.as_deref(),
            Self::Unsupported => None,
        };
        variant_path.unwrap_or(&config.path)
    }
}

impl fmt::Display for EngineVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn caps(popcnt: bool, avx2: bool, neon: bool) -> CpuCapabilities {
        CpuCapabilities {
            popcnt,
            avx2,
            bmi2: avx2,
            neon,
        }
    }

    #[test]
    fn test_select_variant_matrix() {
        assert_eq!(EngineVariant::select(caps(true, true, false)), EngineVariant::Avx2);
        assert_eq!(EngineVariant::select(caps(false, true, false)), EngineVariant::Avx2);
        assert_eq!(EngineVariant::select(caps(true, false, false)), EngineVariant::Popcnt);
        assert_eq!(EngineVariant::select(caps(false, false, true)), EngineVariant::Neon);
        assert_eq!(
            EngineVariant::select(caps(false, false, false)),
            EngineVariant::Unsupported
        );
    }

    #[test]
    fn test_clamp_to_baseline() {
        let full = caps(true, true, false);
        assert_eq!(
            EngineVariant::select(full.clamped("baseline")),
            EngineVariant::Popcnt
        );
        assert_eq!(EngineVariant::select(full.clamped("POPCNT")), EngineVariant::Popcnt);
        assert_eq!(full.clamped("avx2"), full);
        assert_eq!(full.clamped("whatever"), full);
        assert_eq!(
            EngineVariant::select(full.clamped("none")),
            EngineVariant::Unsupported
        );
    }

    #[test]
    fn test_binary_prefers_variant_override() {
        let mut config = EngineConfig::default();
        config.path = PathBuf::from("/opt/engine/default");
        config.variants.avx2 = Some(PathBuf::from("/opt/engine/avx2"));

        assert_eq!(
            EngineVariant::Avx2.binary(&config),
            Path::new("/opt/engine/avx2")
        );
        assert_eq!(
            EngineVariant::Popcnt.binary(&config),
            Path::new("/opt/engine/default")
        );
    }
}
