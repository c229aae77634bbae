//! Navigation and simplification tunables.
//!
//! Preference storage is owned by the host; it hands the values over as
//! JSON (or builds a [`NavConfig`] directly). Missing keys take defaults.

use serde::{Deserialize, Serialize};

use crate::error::{NavError, Result};
use crate::simplify::SimplificationStrategy;

/// How bearings are presented: relative to true or magnetic north.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
pub enum AngleType {
    #[default]
    True,
    Magnetic,
}

/// Configuration for simplification and navigation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct NavConfig {
    /// Waypoint arrival radius in meters, also the base simplification tolerance.
    /// Default: 50.0
    pub proximity_m: f64,

    /// Accumulated turn (degrees) that flags a candidate turn point during
    /// forward turn detection. Default: 10.0
    pub turn_threshold_deg: f64,

    /// Cross-track deviation, in multiples of the tolerance, that confirms a
    /// candidate turn. Default: 3.0
    pub turn_confirm_factor: f64,

    /// Straight-line displacement, in multiples of the tolerance, after which a
    /// long straight segment is split. Default: 200.0
    pub straight_split_factor: f64,

    /// Ceiling on route vectors produced by peak elimination. Default: 500
    pub max_route_vectors: u32,

    /// Strategy used when the caller does not pick one.
    /// Default: peak elimination
    pub default_strategy: SimplificationStrategy,

    /// Bearing reference for presented angles. Default: true north
    pub angle_type: AngleType,
}

impl Default for NavConfig {
    fn default() -> Self {
        Self {
            proximity_m: 50.0,
            turn_threshold_deg: 10.0,
            turn_confirm_factor: 3.0,
            straight_split_factor: 200.0,
            max_route_vectors: 500,
            default_strategy: SimplificationStrategy::PeakElimination,
            angle_type: AngleType::True,
        }
    }
}

impl NavConfig {
    /// Parse a JSON document, filling missing keys with defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: NavConfig = serde_json::from_str(json).map_err(|e| NavError::ConfigError {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the algorithms cannot work with.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("proximity_m", self.proximity_m),
            ("turn_threshold_deg", self.turn_threshold_deg),
            ("turn_confirm_factor", self.turn_confirm_factor),
            ("straight_split_factor", self.straight_split_factor),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(NavError::ConfigError {
                    message: format!("{} must be a positive number, got {}", name, value),
                });
            }
        }
        if self.max_route_vectors == 0 {
            return Err(NavError::ConfigError {
                message: "max_route_vectors must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Simplification tolerance in meters for a given sensitivity.
    pub fn tolerance(&self, sensitivity: f64) -> f64 {
        self.proximity_m * sensitivity
    }
}
