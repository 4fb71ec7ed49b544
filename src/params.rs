//! Detector parameters and parameter metadata
//!
//! [`TrapParams`] is the caller-facing parameter set. [`Tuning`] groups the
//! heuristic constants of the scoring and filtering rules so they can be
//! adjusted without touching control flow.
//!
//! Parameter metadata enables:
//! - Grid search optimization
//! - Parameter documentation
//! - Automatic configuration UI generation
//!
//! # Example
//!
//! ```rust
//! use trapscan::params::{ParameterizedDetector, TrapParams};
//!
//! for param in TrapParams::param_meta() {
//!     println!("{}: {:?} (default: {})", param.name, param.param_type, param.default);
//! }
//! ```

use std::collections::HashMap;

use crate::detectors::helpers;
use crate::{Period, Ratio, Result, TrapError};

// ============================================================
// TRAP PARAMETERS
// ============================================================

/// Caller-supplied detection parameters.
///
/// Out-of-range values are never rejected by the scan; [`TrapParams::sanitized`]
/// clamps them to their floors first.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct TrapParams {
  /// Bars examined for the recent high (resistance)
  pub resistance_lookback: usize,
  /// Bars examined for the recent low (support)
  pub support_lookback: usize,
  /// Max bars after a breakout to await a reversal close (floor 1)
  pub confirmation_bars: usize,
  /// Max bars after a breakout scanned for wick / counter-candle evidence (floor 1)
  pub max_trap_bars: usize,
  /// Volume SMA period (floor 1)
  pub volume_ma_period: usize,
  /// Required multiple of the volume baseline
  pub min_volume_spike: f64,
  /// Required fractional breakout beyond the level
  pub min_breakout_factor: f64,
  /// Required fraction of the bar range taken by the rejection wick
  pub min_wick_ratio: f64,
  /// Acceptance threshold for the composite score, in [0, 1]
  pub min_trap_score: f64,
  pub enable_normal_signal: bool,
  /// Bars required since the last trap before a normal marker (floor 1)
  pub normal_quiet_bars: usize,
}

impl Default for TrapParams {
  fn default() -> Self {
    Self {
      resistance_lookback: 20,
      support_lookback: 20,
      confirmation_bars: 3,
      max_trap_bars: 5,
      volume_ma_period: 20,
      min_volume_spike: 1.3,
      min_breakout_factor: 0.0007,
      min_wick_ratio: 0.35,
      min_trap_score: 0.5,
      enable_normal_signal: true,
      normal_quiet_bars: 5,
    }
  }
}

impl TrapParams {
  /// Returns a copy with every field clamped to its floor.
  ///
  /// Non-finite floats fall back to the default, negative factors become 0,
  /// ratios and the score threshold are clamped into [0, 1].
  pub fn sanitized(&self) -> Self {
    let defaults = Self::default();
    let finite_or = |v: f64, d: f64| if v.is_finite() { v } else { d };

    Self {
      resistance_lookback: self.resistance_lookback,
      support_lookback: self.support_lookback,
      confirmation_bars: self.confirmation_bars.max(1),
      max_trap_bars: self.max_trap_bars.max(1),
      volume_ma_period: self.volume_ma_period.max(1),
      min_volume_spike: finite_or(self.min_volume_spike, defaults.min_volume_spike).max(0.0),
      min_breakout_factor: finite_or(self.min_breakout_factor, defaults.min_breakout_factor)
        .max(0.0),
      min_wick_ratio: finite_or(self.min_wick_ratio, defaults.min_wick_ratio).clamp(0.0, 1.0),
      min_trap_score: finite_or(self.min_trap_score, defaults.min_trap_score).clamp(0.0, 1.0),
      enable_normal_signal: self.enable_normal_signal,
      normal_quiet_bars: self.normal_quiet_bars.max(1),
    }
  }

  /// Bars needed before any level or baseline is available
  pub fn warmup_bars(&self) -> usize {
    self.resistance_lookback.max(self.support_lookback).max(self.volume_ma_period)
  }

  /// Volume baseline period as a validated [`Period`]
  pub fn volume_period(&self) -> Period {
    Period::new_const(self.volume_ma_period.max(1))
  }
}

// ============================================================
// TUNING
// ============================================================

/// Heuristic constants of the scoring and filtering rules.
///
/// Defaults live in [`crate::detectors::helpers`].
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Tuning {
  pub breakout_weight: f64,
  pub volume_weight: f64,
  pub wick_weight: f64,
  pub reversal_weight: f64,
  pub breakout_norm: f64,
  pub volume_norm: f64,
  pub initiation_close_ratio: f64,
  pub strong_body_ratio: f64,
  pub bear_breakout_leniency: f64,
  pub bear_volume_leniency: f64,
  pub min_trap_spacing: usize,
  pub calm_volume_floor: f64,
  pub calm_volume_factor: f64,
  pub calm_wick_floor: f64,
  pub calm_wick_factor: f64,
  pub calm_band_factor: f64,
  pub normal_min_gap: usize,
}

impl Default for Tuning {
  fn default() -> Self {
    Self {
      breakout_weight: helpers::BREAKOUT_WEIGHT,
      volume_weight: helpers::VOLUME_WEIGHT,
      wick_weight: helpers::WICK_WEIGHT,
      reversal_weight: helpers::REVERSAL_WEIGHT,
      breakout_norm: helpers::BREAKOUT_NORM,
      volume_norm: helpers::VOLUME_NORM,
      initiation_close_ratio: helpers::INITIATION_CLOSE_RATIO,
      strong_body_ratio: helpers::STRONG_BODY_RATIO,
      bear_breakout_leniency: helpers::BEAR_BREAKOUT_LENIENCY,
      bear_volume_leniency: helpers::BEAR_VOLUME_LENIENCY,
      min_trap_spacing: helpers::MIN_TRAP_SPACING,
      calm_volume_floor: helpers::CALM_VOLUME_FLOOR,
      calm_volume_factor: helpers::CALM_VOLUME_FACTOR,
      calm_wick_floor: helpers::CALM_WICK_FLOOR,
      calm_wick_factor: helpers::CALM_WICK_FACTOR,
      calm_band_factor: helpers::CALM_BAND_FACTOR,
      normal_min_gap: helpers::NORMAL_MIN_GAP,
    }
  }
}

impl Tuning {
  /// Weights must sum to 1 and every factor must be finite and non-negative
  pub fn validate(&self) -> Result<()> {
    let factors = [
      ("breakout_weight", self.breakout_weight),
      ("volume_weight", self.volume_weight),
      ("wick_weight", self.wick_weight),
      ("reversal_weight", self.reversal_weight),
      ("breakout_norm", self.breakout_norm),
      ("volume_norm", self.volume_norm),
      ("initiation_close_ratio", self.initiation_close_ratio),
      ("strong_body_ratio", self.strong_body_ratio),
      ("bear_breakout_leniency", self.bear_breakout_leniency),
      ("bear_volume_leniency", self.bear_volume_leniency),
      ("calm_volume_floor", self.calm_volume_floor),
      ("calm_volume_factor", self.calm_volume_factor),
      ("calm_wick_floor", self.calm_wick_floor),
      ("calm_wick_factor", self.calm_wick_factor),
      ("calm_band_factor", self.calm_band_factor),
    ];
    for (name, value) in factors {
      if !value.is_finite() || value < 0.0 {
        return Err(TrapError::InvalidConfig(format!("{name} = {value} must be finite and >= 0")));
      }
    }

    let sum = self.breakout_weight + self.volume_weight + self.wick_weight + self.reversal_weight;
    if (sum - 1.0).abs() > 1e-9 {
      return Err(TrapError::InvalidConfig(format!("score weights sum to {sum}, expected 1.0")));
    }
    Ok(())
  }
}

// ============================================================
// PARAMETER TYPES
// ============================================================

/// Type of parameter value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
  /// Ratio value in 0.0..=1.0
  Ratio,
  /// Unbounded non-negative multiplier
  Factor,
  /// Period value (positive integer)
  Period,
  /// Boolean encoded as 0.0 / 1.0
  Flag,
}

/// Metadata for a single detector parameter
#[derive(Debug, Clone)]
pub struct ParamMeta {
  /// Parameter name (e.g., "min_volume_spike")
  pub name: &'static str,
  pub param_type: ParamType,
  pub default: f64,
  /// Range for optimization: (min, max, step)
  pub range: (f64, f64, f64),
  pub description: &'static str,
}

impl ParamMeta {
  pub const fn ratio(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Ratio, default, range, description }
  }

  pub const fn factor(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Factor, default, range, description }
  }

  pub const fn period(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Period, default, range, description }
  }

  pub const fn flag(name: &'static str, default: bool, description: &'static str) -> Self {
    let default = if default { 1.0 } else { 0.0 };
    Self { name, param_type: ParamType::Flag, default, range: (0.0, 1.0, 1.0), description }
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
      return Err(TrapError::OutOfRange { field: self.name, value, min, max });
    }
    match self.param_type {
      ParamType::Ratio | ParamType::Factor => Ok(()),
      ParamType::Period => {
        if value < 1.0 || value.fract() != 0.0 {
          return Err(TrapError::InvalidValue("Period must be a positive integer"));
        }
        Ok(())
      },
      ParamType::Flag => {
        if value != 0.0 && value != 1.0 {
          return Err(TrapError::InvalidValue("Flag must be 0 or 1"));
        }
        Ok(())
      },
    }
  }
}

// ============================================================
// PARAMETERIZED DETECTOR TRAIT
// ============================================================

/// Trait for parameter sets that support discovery and grid construction
pub trait ParameterizedDetector: Sized {
  /// Returns metadata for all configurable parameters
  fn param_meta() -> &'static [ParamMeta];

  /// Creates a parameter set from a HashMap
  ///
  /// Missing parameters use their default values.
  fn with_params(params: &HashMap<&str, f64>) -> Result<Self>;
}

static TRAP_PARAM_META: [ParamMeta; 11] = [
  ParamMeta::period("resistance_lookback", 20.0, (5.0, 60.0, 5.0), "Bars for the recent high"),
  ParamMeta::period("support_lookback", 20.0, (5.0, 60.0, 5.0), "Bars for the recent low"),
  ParamMeta::period("confirmation_bars", 3.0, (1.0, 6.0, 1.0), "Bars to await a reversal close"),
  ParamMeta::period("max_trap_bars", 5.0, (1.0, 10.0, 1.0), "Bars scanned for rejection evidence"),
  ParamMeta::period("volume_ma_period", 20.0, (5.0, 60.0, 5.0), "Volume baseline SMA period"),
  ParamMeta::factor("min_volume_spike", 1.3, (1.0, 3.0, 0.1), "Required volume multiple"),
  ParamMeta::factor(
    "min_breakout_factor",
    0.0007,
    (0.0001, 0.005, 0.0001),
    "Required fractional breakout beyond the level",
  ),
  ParamMeta::ratio("min_wick_ratio", 0.35, (0.1, 0.8, 0.05), "Required rejection wick share"),
  ParamMeta::ratio("min_trap_score", 0.5, (0.3, 0.9, 0.05), "Composite score threshold"),
  ParamMeta::flag("enable_normal_signal", true, "Emit calm-state markers"),
  ParamMeta::period("normal_quiet_bars", 5.0, (1.0, 20.0, 1.0), "Bars since last trap for a marker"),
];

impl ParameterizedDetector for TrapParams {
  fn param_meta() -> &'static [ParamMeta] {
    &TRAP_PARAM_META
  }

  fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
    let d = Self::default();
    Ok(Self {
      resistance_lookback: get_period(params, "resistance_lookback", d.resistance_lookback)?.get(),
      support_lookback: get_period(params, "support_lookback", d.support_lookback)?.get(),
      confirmation_bars: get_period(params, "confirmation_bars", d.confirmation_bars)?.get(),
      max_trap_bars: get_period(params, "max_trap_bars", d.max_trap_bars)?.get(),
      volume_ma_period: get_period(params, "volume_ma_period", d.volume_ma_period)?.get(),
      min_volume_spike: get_factor(params, "min_volume_spike", d.min_volume_spike)?,
      min_breakout_factor: get_factor(params, "min_breakout_factor", d.min_breakout_factor)?,
      min_wick_ratio: get_ratio(params, "min_wick_ratio", d.min_wick_ratio)?.get(),
      min_trap_score: get_ratio(params, "min_trap_score", d.min_trap_score)?.get(),
      enable_normal_signal: params
        .get("enable_normal_signal")
        .map_or(d.enable_normal_signal, |v| *v != 0.0),
      normal_quiet_bars: get_period(params, "normal_quiet_bars", d.normal_quiet_bars)?.get(),
    })
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
  if value < 0.0 || value.fract() != 0.0 {
    return Err(TrapError::InvalidValue("Period must be a positive integer"));
  }
  Period::new(value as usize)
}

/// Helper to get a finite non-negative multiplier with default fallback
pub fn get_factor(params: &HashMap<&str, f64>, key: &str, default: f64) -> Result<f64> {
  let value = params.get(key).copied().unwrap_or(default);
  if !value.is_finite() || value < 0.0 {
    return Err(TrapError::InvalidValue("Factor must be finite and >= 0"));
  }
  Ok(value)
}

// ============================================================
// TESTS
// ============================================================
