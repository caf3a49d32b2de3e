use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::order::RenormalizePolicy;
use crate::persist::WritePolicy;
use crate::resize::ResizeConfig;

/// Pointer travel in pixels before a press becomes a drag.
pub const DEFAULT_ACTIVATION_DISTANCE: f64 = 8.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub activation_distance: f64,
    pub renormalize: RenormalizePolicy,
    pub write_policy: WritePolicy,
    pub resize: ResizeConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            activation_distance: DEFAULT_ACTIVATION_DISTANCE,
            renormalize: RenormalizePolicy::default(),
            write_policy: WritePolicy::default(),
            resize: ResizeConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Read `SHUFFLEBOARD_*` variables. Missing or unparsable values keep
    /// their defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parse_f64 = |key: &str, default: f64| {
            lookup(key)
                .and_then(|s| s.trim().parse::<f64>().ok())
                .filter(|v| v.is_finite())
                .unwrap_or(default)
        };
        let parse_i64 = |key: &str, default: i64| {
            lookup(key)
                .and_then(|s| s.trim().parse::<i64>().ok())
                .unwrap_or(default)
        };

        let renormalize = match lookup("SHUFFLEBOARD_RENORMALIZE").as_deref().map(str::trim) {
            Some("every-move") => RenormalizePolicy::OnEveryMove,
            Some("gap") => RenormalizePolicy::OnGapExhausted,
            _ => defaults.renormalize,
        };
        let write_policy = match lookup("SHUFFLEBOARD_ROLLBACK").as_deref().map(str::trim) {
            Some("true" | "1") => WritePolicy::WriteThroughWithRollback,
            Some("false" | "0") => WritePolicy::WriteThroughNoRollback,
            _ => defaults.write_policy,
        };
        let resize = ResizeConfig {
            unit_pixel_height: parse_f64(
                "SHUFFLEBOARD_UNIT_PIXEL_HEIGHT",
                defaults.resize.unit_pixel_height,
            ),
            unit_minutes: parse_i64("SHUFFLEBOARD_UNIT_MINUTES", defaults.resize.unit_minutes),
            snap_minutes: parse_i64("SHUFFLEBOARD_SNAP_MINUTES", defaults.resize.snap_minutes),
        }
        .sanitized();

        Self {
            activation_distance: parse_f64(
                "SHUFFLEBOARD_ACTIVATION_DISTANCE",
                defaults.activation_distance,
            )
            .max(0.0),
            renormalize,
            write_policy,
            resize,
        }
    }
}

/// Settings of the journal inspector binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InspectConfig {
    pub journal: PathBuf,
    /// Rewrite the journal to its latest state after printing.
    pub compact: bool,
}

impl InspectConfig {
    /// Read `SHUFFLEBOARD_JOURNAL` (default `./shuffleboard.journal`) and
    /// `SHUFFLEBOARD_COMPACT`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            journal: PathBuf::from(
                lookup("SHUFFLEBOARD_JOURNAL").unwrap_or_else(|| "./shuffleboard.journal".into()),
            ),
            compact: matches!(
                lookup("SHUFFLEBOARD_COMPACT").as_deref().map(str::trim),
                Some("true" | "1")
            ),
        }
    }
}
