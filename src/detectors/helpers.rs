//! Common helper functions for trap detection
//!
//! Heuristic thresholds and numeric helpers shared across all detector modules.
//! The constants below are the defaults of [`crate::params::Tuning`].

// ============================================================
// SCORE WEIGHTS (sum to 1.0)
// ============================================================

/// Weight of the normalised breakout distance in the composite score
pub const BREAKOUT_WEIGHT: f64 = 0.3;
/// Weight of the normalised volume spike in the composite score
pub const VOLUME_WEIGHT: f64 = 0.3;
/// Weight of the largest rejection wick ratio in the composite score
pub const WICK_WEIGHT: f64 = 0.2;
/// Weight of the fractional reversal from the extreme in the composite score
pub const REVERSAL_WEIGHT: f64 = 0.2;

/// Breakout strength saturates at this multiple of `min_breakout_factor`
pub const BREAKOUT_NORM: f64 = 3.0;
/// Volume strength saturates at this multiple of `min_volume_spike`
pub const VOLUME_NORM: f64 = 2.0;

// ============================================================
// CANDIDATE SHAPE
// ============================================================

/// Close must sit within this fraction of the range from the breakout extreme
pub const INITIATION_CLOSE_RATIO: f64 = 0.4;
/// Body/range ratio at or above which a counter-direction bar is "strong"
pub const STRONG_BODY_RATIO: f64 = 0.45;

/// Bear branch: multiplier on `min_breakout_factor`
pub const BEAR_BREAKOUT_LENIENCY: f64 = 0.85;
/// Bear branch: multiplier on `min_volume_spike`
pub const BEAR_VOLUME_LENIENCY: f64 = 0.9;

/// Minimum index distance between two accepted traps of the same kind
pub const MIN_TRAP_SPACING: usize = 2;

// ============================================================
// CALM STATE
// ============================================================

pub const CALM_VOLUME_FLOOR: f64 = 1.0;
pub const CALM_VOLUME_FACTOR: f64 = 0.85;
pub const CALM_WICK_FLOOR: f64 = 0.1;
pub const CALM_WICK_FACTOR: f64 = 0.8;
/// Close tolerance around the levels, as a multiple of `min_breakout_factor`
pub const CALM_BAND_FACTOR: f64 = 0.5;
/// Lower bound on the gap between two normal markers
pub const NORMAL_MIN_GAP: usize = 8;

// ============================================================
// HELPER FUNCTIONS
// ============================================================

/// Clamp into `[0, 1]`, mapping NaN to 0.
///
/// `f64::clamp` propagates NaN, which would poison a weighted sum.
#[inline]
pub fn unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Volume divided by baseline, or 0 while no baseline exists.
#[inline]
pub fn spike_factor(volume: f64, baseline: f64) -> f64 {
    if baseline > 0.0 {
        volume / baseline
    } else {
        0.0
    }
}

/// `numerator / denominator`, or 0 when the denominator is not positive.
#[inline]
pub fn ratio_or_zero(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

/// Trailing simple moving average, inclusive of the current value.
///
/// Uses a running sum so each step is O(1). Indices before the window is
/// full report 0 ("no baseline yet").
pub fn sma_filled(values: impl IntoIterator<Item = f64>, period: usize) -> Vec<f64> {
    let period = period.max(1);
    let values: Vec<f64> = values.into_iter().collect();
    let mut out = Vec::with_capacity(values.len());
    let mut sum = 0.0;

    for (i, &v) in values.iter().enumerate() {
        sum += v;
        if i >= period {
            sum -= values[i - period];
        }
        out.push(if i + 1 >= period { sum / period as f64 } else { 0.0 });
    }

    out
}
