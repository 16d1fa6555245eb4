//! Parameter metadata for the engine configuration
//!
//! This module describes every tunable engine parameter, enabling:
//! - Grid search over congestion and detector settings
//! - Parameter documentation
//! - Building a configuration from a flat name → value map
//!
//! # Example
//!
//! ```rust
//! use std::collections::HashMap;
//! use trendbox::params::Parameterized;
//! use trendbox::prelude::*;
//!
//! for param in EngineConfig::param_meta() {
//!     println!("{}: {:?} (default: {})", param.name, param.param_type, param.default);
//! }
//!
//! let params = HashMap::from([("min_congestion_bars", 10.0), ("bar_height_factor", 2.5)]);
//! let config = EngineConfig::with_params(&params).unwrap();
//! assert_eq!(config.congestion.min_congestion_bars.get(), 10);
//! ```

use std::collections::HashMap;

use crate::{
  congestion::CongestionConfig,
  engine::{CrossoverConfig, EngineConfig, SwingConfig},
  Period, Ratio, Result, TrendError,
};

// ============================================================
// PARAMETER TYPES
// ============================================================

/// Type of parameter value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
  /// Ratio value (0.0..=1.0)
  Ratio,
  /// Period value (positive integer)
  Period,
  /// Bar count that may be zero
  Count,
  /// Positive multiplier
  Factor,
}

/// Metadata for a single engine parameter
#[derive(Debug, Clone)]
pub struct ParamMeta {
  /// Parameter name (e.g., "min_congestion_bars")
  pub name: &'static str,
  /// Parameter type
  pub param_type: ParamType,
  /// Default value
  pub default: f64,
  /// Range for optimization: (min, max, step)
  pub range: (f64, f64, f64),
  /// Human-readable description
  pub description: &'static str,
}

impl ParamMeta {
  /// Create a new ParamMeta for a Ratio parameter
  pub const fn ratio(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Ratio, default, range, description }
  }

  /// Create a new ParamMeta for a Period parameter
  pub const fn period(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Period, default, range, description }
  }

  pub const fn count(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Count, default, range, description }
  }

  pub const fn factor(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Factor, default, range, description }
  }

  /// Generate all values for grid search
  pub fn generate_grid(&self) -> Vec<f64> {
    let (min, max, step) = self.range;
    let mut values = Vec::new();
    let mut v = min;
    while v <= max + f64::EPSILON {
      values.push(v);
      v += step;
    }
    values
  }

  /// Validate a value for this parameter
  pub fn validate(&self, value: f64) -> Result<()> {
    let (min, max, _) = self.range;
    if value < min || value > max {
      return Err(TrendError::OutOfRange { field: self.name, value, min, max });
    }
    match self.param_type {
      ParamType::Ratio => Ratio::new(value).map(|_| ()),
      ParamType::Period => {
        if value < 1.0 || value.fract() != 0.0 {
          return Err(TrendError::InvalidValue("Period must be a positive integer"));
        }
        Ok(())
      },
      ParamType::Count => {
        if value < 0.0 || value.fract() != 0.0 {
          return Err(TrendError::InvalidValue("Count must be a non-negative integer"));
        }
        Ok(())
      },
      ParamType::Factor => {
        if !value.is_finite() || value <= 0.0 {
          return Err(TrendError::InvalidValue("Factor must be positive and finite"));
        }
        Ok(())
      },
    }
  }
}

// ============================================================
// PARAMETERIZED TRAIT
// ============================================================

/// Configurations that can be described and built from flat parameters
pub trait Parameterized: Sized {
  /// Returns metadata for all configurable parameters
  fn param_meta() -> &'static [ParamMeta];

  /// Creates a configuration from a HashMap
  ///
  /// Missing parameters use their default values.
  fn with_params(params: &HashMap<&str, f64>) -> Result<Self>;
}

const ENGINE_PARAMS: &[ParamMeta] = &[
  ParamMeta::period(
    "min_congestion_bars",
    8.0,
    (4.0, 16.0, 1.0),
    "Bars before the last bar searched for congestion",
  ),
  ParamMeta::count(
    "bars_allowed_outside",
    2.0,
    (0.0, 4.0, 1.0),
    "Bars whose body may poke out of the reference range",
  ),
  ParamMeta::ratio(
    "area_allowed_outside",
    0.5,
    (0.1, 1.0, 0.1),
    "Largest outside area as a fraction of the bar's body",
  ),
  ParamMeta::period("bars_to_cancel", 6.0, (3.0, 12.0, 1.0), "Bars after confirmation that cancel the box"),
  ParamMeta::period(
    "reference_candidates",
    3.0,
    (1.0, 5.0, 1.0),
    "Tallest window bars tried as reference bar",
  ),
  ParamMeta::period("fast_period", 7.0, (3.0, 15.0, 1.0), "Fast moving average length"),
  ParamMeta::period("slow_period", 13.0, (8.0, 30.0, 1.0), "Slow moving average length"),
  ParamMeta::period("swing_period", 5.0, (3.0, 10.0, 1.0), "Swing high/low lookback"),
  ParamMeta::period("atr_period", 14.0, (7.0, 28.0, 7.0), "ATR length, also the warmup"),
  ParamMeta::factor(
    "bar_height_factor",
    2.0,
    (1.0, 4.0, 0.5),
    "Reference bar may not be taller than ATR times this",
  ),
];

impl Parameterized for EngineConfig {
  fn param_meta() -> &'static [ParamMeta] {
    ENGINE_PARAMS
  }

  fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
    let defaults = EngineConfig::default();
    let config = EngineConfig {
      congestion: CongestionConfig {
        min_congestion_bars: get_period(params, "min_congestion_bars", 8)?,
        bars_allowed_outside: get_count(params, "bars_allowed_outside", 2)?,
        area_allowed_outside: get_ratio(params, "area_allowed_outside", 0.5)?,
        bars_to_cancel: get_period(params, "bars_to_cancel", 6)?,
        reference_candidates: get_period(params, "reference_candidates", 3)?,
      },
      crossover: CrossoverConfig {
        fast_period: get_period(params, "fast_period", 7)?,
        slow_period: get_period(params, "slow_period", 13)?,
      },
      swing: SwingConfig { period: get_period(params, "swing_period", 5)? },
      atr_period: get_period(params, "atr_period", 14)?,
      bar_height_factor: get_factor(params, "bar_height_factor", 2.0)?,
      ..defaults
    };
    config.validate()?;
    Ok(config)
  }
}

// ============================================================
// PARAMETER VALUE HELPERS
// ============================================================

/// Helper to get a Ratio from params with default fallback
pub fn get_ratio(params: &HashMap<&str, f64>, key: &str, default: f64) -> Result<Ratio> {
  let value = params.get(key).copied().unwrap_or(default);
  Ratio::new(value)
}

/// Helper to get a Period from params with default fallback
pub fn get_period(params: &HashMap<&str, f64>, key: &str, default: usize) -> Result<Period> {
  let value = params.get(key).copied().unwrap_or(default as f64);
  Period::new(value as usize)
}

/// Helper to get a non-negative count from params with default fallback
pub fn get_count(params: &HashMap<&str, f64>, key: &str, default: usize) -> Result<usize> {
  let value = params.get(key).copied().unwrap_or(default as f64);
  if value < 0.0 || !value.is_finite() {
    return Err(TrendError::InvalidValue("Count must be a non-negative integer"));
  }
  Ok(value as usize)
}

/// Helper to get a positive finite multiplier from params with default fallback
pub fn get_factor(params: &HashMap<&str, f64>, key: &str, default: f64) -> Result<f64> {
  let value = params.get(key).copied().unwrap_or(default);
  if !value.is_finite() || value <= 0.0 {
    return Err(TrendError::InvalidValue("Factor must be positive and finite"));
  }
  Ok(value)
}

// ============================================================
// TESTS
// ============================================================
