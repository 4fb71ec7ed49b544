//! Rolling reference levels and volume baseline
//!
//! Resistance/support are the recent high/low over a trailing window that
//! excludes the current bar. The volume baseline is a trailing SMA that
//! includes it.

use super::helpers::{ratio_or_zero, sma_filled};
use crate::params::TrapParams;
use crate::{Period, OHLCV};

/// Maximum `high` over `bars[max(0, i - lookback)..i]`.
///
/// Returns 0 when the window is empty, which callers treat as
/// "insufficient history".
pub fn recent_high<T: OHLCV>(bars: &[T], index: usize, lookback: usize) -> f64 {
    let end = index.min(bars.len());
    let start = end.saturating_sub(lookback);
    bars[start..end]
        .iter()
        .map(|b| b.high())
        .fold(None, |acc: Option<f64>, h| Some(acc.map_or(h, |a| a.max(h))))
        .unwrap_or(0.0)
}

/// Minimum `low` over the same window as [`recent_high`], 0 when empty.
pub fn recent_low<T: OHLCV>(bars: &[T], index: usize, lookback: usize) -> f64 {
    let end = index.min(bars.len());
    let start = end.saturating_sub(lookback);
    bars[start..end]
        .iter()
        .map(|b| b.low())
        .fold(None, |acc: Option<f64>, l| Some(acc.map_or(l, |a| a.min(l))))
        .unwrap_or(0.0)
}

/// Trailing volume SMA per bar; 0 for the first `period - 1` bars.
pub fn volume_baseline<T: OHLCV>(bars: &[T], period: Period) -> Vec<f64> {
    sma_filled(bars.iter().map(|b| b.volume()), period.get())
}

/// Bar shape decomposition. Ratios are 0 when the range is 0.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BarAnatomy {
    pub range: f64,
    pub body: f64,
    pub upper_wick: f64,
    pub lower_wick: f64,
    pub body_ratio: f64,
    pub upper_wick_ratio: f64,
    pub lower_wick_ratio: f64,
}

impl BarAnatomy {
    pub fn of<T: OHLCV + ?Sized>(bar: &T) -> Self {
        let range = bar.high() - bar.low();
        let body = (bar.close() - bar.open()).abs();
        let upper_wick = bar.high() - bar.open().max(bar.close());
        let lower_wick = bar.open().min(bar.close()) - bar.low();

        Self {
            range,
            body,
            upper_wick,
            lower_wick,
            body_ratio: ratio_or_zero(body, range),
            upper_wick_ratio: ratio_or_zero(upper_wick, range),
            lower_wick_ratio: ratio_or_zero(lower_wick, range),
        }
    }
}

/// Reference levels at a specific bar
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LevelContext {
    /// Recent high excluding this bar (0 = none)
    pub resistance: f64,
    /// Recent low excluding this bar (0 = none)
    pub support: f64,
    /// Volume SMA including this bar (0 = warming up)
    pub volume_baseline: f64,
    /// Not the first bar, and both levels are non-zero
    pub has_levels: bool,
    /// The resistance lookback window is full
    pub resistance_full: bool,
    /// The support lookback window is full
    pub support_full: bool,
}

impl LevelContext {
    /// Bull branch gate: levels known and a full resistance window
    #[inline]
    pub fn bull_ready(&self) -> bool {
        self.has_levels && self.resistance_full && self.volume_baseline > 0.0
    }

    /// Bear branch gate: levels known and a full support window
    #[inline]
    pub fn bear_ready(&self) -> bool {
        self.has_levels && self.support_full && self.volume_baseline > 0.0
    }

    /// Calm test gate: both windows full
    #[inline]
    pub fn calm_ready(&self) -> bool {
        self.has_levels && self.resistance_full && self.support_full && self.volume_baseline > 0.0
    }
}

/// Provider of reference levels - precomputes levels for all bars
pub trait LevelProvider: Send + Sync {
    fn compute_all<T: OHLCV>(&self, bars: &[T], params: &TrapParams) -> Vec<LevelContext>;
}

/// Default provider: recent high/low and volume SMA
#[derive(Debug, Clone, Copy, Default)]
pub struct LevelTracker;

impl LevelTracker {
    /// Levels for one bar. O(lookback); prefer [`LevelProvider::compute_all`]
    /// for whole series.
    pub fn context_at<T: OHLCV>(
        &self,
        bars: &[T],
        index: usize,
        baseline: f64,
        params: &TrapParams,
    ) -> LevelContext {
        let resistance = recent_high(bars, index, params.resistance_lookback);
        let support = recent_low(bars, index, params.support_lookback);
        LevelContext {
            resistance,
            support,
            volume_baseline: baseline,
            has_levels: index >= 1 && resistance != 0.0 && support != 0.0,
            resistance_full: index >= params.resistance_lookback,
            support_full: index >= params.support_lookback,
        }
    }
}

impl LevelProvider for LevelTracker {
    fn compute_all<T: OHLCV>(&self, bars: &[T], params: &TrapParams) -> Vec<LevelContext> {
        let baseline = volume_baseline(bars, params.volume_period());
        baseline
            .iter()
            .enumerate()
            .map(|(i, &b)| self.context_at(bars, i, b, params))
            .collect()
    }
}
