//! Calm/normal state markers
//!
//! A bar is calm when volume is near its baseline, both wicks are short and
//! the close has not left the recent high/low band. Markers are debounced
//! against the last trap and the last marker.

use tracing::debug;

use super::helpers::spike_factor;
use super::levels::LevelContext;
use super::state::{is_spaced, ScanState};
use crate::params::{TrapParams, Tuning};
use crate::{NormalEvent, OHLCVExt, Signal, OHLCV};

#[derive(Debug, Clone, Copy)]
pub struct StabilityDetector {
    params: TrapParams,
    tuning: Tuning,
}

impl Default for StabilityDetector {
    fn default() -> Self {
        Self::new(TrapParams::default(), Tuning::default())
    }
}

impl StabilityDetector {
    pub fn new(params: TrapParams, tuning: Tuning) -> Self {
        Self {
            params: params.sanitized(),
            tuning,
        }
    }

    /// Minimum distance between two normal markers
    pub fn marker_gap(&self) -> usize {
        self.tuning.normal_min_gap.max(self.params.normal_quiet_bars)
    }

    pub fn is_calm<T: OHLCV>(&self, bar: &T, ctx: &LevelContext) -> bool {
        if !ctx.calm_ready() {
            return false;
        }

        let p = &self.params;
        let t = &self.tuning;

        let volume_cap = t.calm_volume_floor.max(p.min_volume_spike * t.calm_volume_factor);
        if spike_factor(bar.volume(), ctx.volume_baseline) > volume_cap {
            return false;
        }

        let wick_cap = t.calm_wick_floor.max(p.min_wick_ratio * t.calm_wick_factor);
        let anatomy = bar.anatomy();
        if anatomy.upper_wick_ratio > wick_cap || anatomy.lower_wick_ratio > wick_cap {
            return false;
        }

        let tolerance = p.min_breakout_factor * t.calm_band_factor;
        let close = bar.close();
        close <= ctx.resistance * (1.0 + tolerance) && close >= ctx.support * (1.0 - tolerance)
    }

    /// Write a normal marker at `index` if the slot is free, the bar is calm
    /// and both debounce gaps hold.
    pub fn step<T: OHLCV>(
        &self,
        bars: &[T],
        index: usize,
        ctx: &LevelContext,
        state: ScanState,
        slots: &mut [Option<Signal>],
    ) -> ScanState {
        if !self.params.enable_normal_signal || slots[index].is_some() {
            return state;
        }
        let Some(bar) = bars.get(index) else {
            return state;
        };

        if !self.is_calm(bar, ctx)
            || !is_spaced(state.last_trap, index, self.params.normal_quiet_bars)
            || !is_spaced(state.last_normal, index, self.marker_gap())
        {
            return state;
        }

        debug!(index, "normal state");
        slots[index] = Some(Signal::Normal(NormalEvent {
            index,
            timestamp: bar.timestamp(),
        }));
        state.with_normal(index)
    }
}
