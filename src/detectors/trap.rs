//! Bull/bear trap detection
//!
//! A bull trap is a breakout above resistance that closes back below it within
//! a few bars; a bear trap is the mirrored breakdown below support. Each
//! candidate passes a breakout, an initiation and a volume filter, then must
//! be confirmed by a reversal close. The confirmed candidate is scored and
//! accepted subject to rejection evidence, the score threshold and spacing.
//!
//! The bear branch is deliberately looser than the bull branch: a smaller
//! breakout and volume spike suffice, and a long lower wick alone initiates.

use tracing::{debug, trace};

use super::helpers::{ratio_or_zero, spike_factor, unit};
use super::levels::{BarAnatomy, LevelContext};
use super::state::{is_spaced, ScanState};
use crate::params::{TrapParams, Tuning};
use crate::{OHLCVExt, OverlapPolicy, Signal, TrapEvent, TrapKind, OHLCV};

/// A confirmed trap candidate, before spacing is applied
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrapCandidate {
    pub kind: TrapKind,
    /// Bar that broke the level
    pub breakout_index: usize,
    /// First bar (at or after the breakout) that closed back inside the level
    pub confirmed_index: usize,
    /// Resistance (bull) or support (bear) that was violated
    pub level: f64,
    pub reversal_close: f64,
    /// Largest rejection wick ratio in the evidence window
    pub max_wick_ratio: f64,
    /// A strong counter-direction candle appeared in the evidence window
    pub counter_candle: bool,
    pub score: f64,
}

/// Normalised score terms, each in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreTerms {
    pub breakout: f64,
    pub volume: f64,
    pub wick: f64,
    pub reversal: f64,
}

impl ScoreTerms {
    pub fn weighted(&self, tuning: &Tuning) -> f64 {
        unit(
            self.breakout * tuning.breakout_weight
                + self.volume * tuning.volume_weight
                + self.wick * tuning.wick_weight
                + self.reversal * tuning.reversal_weight,
        )
    }
}

/// Trap detector for both directions
#[derive(Debug, Clone, Copy)]
pub struct TrapDetector {
    params: TrapParams,
    tuning: Tuning,
}

impl Default for TrapDetector {
    fn default() -> Self {
        Self::new(TrapParams::default(), Tuning::default())
    }
}

impl TrapDetector {
    /// Parameters are sanitized on construction
    pub fn new(params: TrapParams, tuning: Tuning) -> Self {
        Self {
            params: params.sanitized(),
            tuning,
        }
    }

    pub fn params(&self) -> &TrapParams {
        &self.params
    }

    pub fn tuning(&self) -> &Tuning {
        &self.tuning
    }

    /// Evaluate a bull trap starting at `index`. Spacing is not checked.
    pub fn evaluate_bull<T: OHLCV>(
        &self,
        bars: &[T],
        index: usize,
        ctx: &LevelContext,
    ) -> Option<TrapCandidate> {
        let bar = bars.get(index)?;
        if !ctx.bull_ready() {
            return None;
        }

        let p = &self.params;
        let t = &self.tuning;
        let level = ctx.resistance;

        if bar.high() < level * (1.0 + p.min_breakout_factor) {
            return None;
        }

        let anatomy = bar.anatomy();
        let closes_near_high =
            ratio_or_zero(bar.high() - bar.close(), anatomy.range) < t.initiation_close_ratio;
        if !(bar.is_bullish() || closes_near_high) {
            return None;
        }

        let spike = spike_factor(bar.volume(), ctx.volume_baseline);
        if spike < p.min_volume_spike {
            return None;
        }

        let confirmed_index = self.confirm(bars, index, |close| close < level)?;
        let reversal_close = bars[confirmed_index].close();

        let (max_wick_ratio, counter_candle) =
            self.evidence(bars, index, confirmed_index, |a, b| {
                let strong = b.is_bearish() && a.body_ratio >= t.strong_body_ratio;
                (a.upper_wick_ratio, strong)
            });

        let terms = ScoreTerms {
            breakout: unit(
                ((bar.high() - level) / level) / (t.breakout_norm * p.min_breakout_factor),
            ),
            volume: unit(spike / (t.volume_norm * p.min_volume_spike)),
            wick: unit(max_wick_ratio),
            reversal: unit((bar.high() - reversal_close) / bar.high()),
        };

        Some(TrapCandidate {
            kind: TrapKind::Bull,
            breakout_index: index,
            confirmed_index,
            level,
            reversal_close,
            max_wick_ratio,
            counter_candle,
            score: terms.weighted(t),
        })
    }

    /// Evaluate a bear trap starting at `index`. Spacing is not checked.
    pub fn evaluate_bear<T: OHLCV>(
        &self,
        bars: &[T],
        index: usize,
        ctx: &LevelContext,
    ) -> Option<TrapCandidate> {
        let bar = bars.get(index)?;
        if !ctx.bear_ready() {
            return None;
        }

        let p = &self.params;
        let t = &self.tuning;
        let level = ctx.support;
        let breakout_factor = p.min_breakout_factor * t.bear_breakout_leniency;
        let volume_spike = p.min_volume_spike * t.bear_volume_leniency;

        if bar.low() > level * (1.0 - breakout_factor) {
            return None;
        }

        let anatomy = bar.anatomy();
        let closes_near_low =
            ratio_or_zero(bar.close() - bar.low(), anatomy.range) < t.initiation_close_ratio;
        let wick_rejection = anatomy.lower_wick_ratio >= p.min_wick_ratio;
        if !(bar.is_bearish() || closes_near_low || wick_rejection) {
            return None;
        }

        let spike = spike_factor(bar.volume(), ctx.volume_baseline);
        if spike < volume_spike {
            return None;
        }

        let confirmed_index = self.confirm(bars, index, |close| close > level)?;
        let reversal_close = bars[confirmed_index].close();

        let (max_wick_ratio, counter_candle) =
            self.evidence(bars, index, confirmed_index, |a, b| {
                let strong = b.is_bullish() && a.body_ratio >= t.strong_body_ratio;
                (a.lower_wick_ratio, strong)
            });

        let terms = ScoreTerms {
            breakout: unit(((level - bar.low()) / level) / (t.breakout_norm * breakout_factor)),
            volume: unit(spike / (t.volume_norm * volume_spike)),
            wick: unit(max_wick_ratio),
            reversal: unit((reversal_close - bar.low()) / bar.low()),
        };

        Some(TrapCandidate {
            kind: TrapKind::Bear,
            breakout_index: index,
            confirmed_index,
            level,
            reversal_close,
            max_wick_ratio,
            counter_candle,
            score: terms.weighted(t),
        })
    }

    /// First bar in `[index, index + confirmation_bars]` whose close has reverted
    fn confirm<T: OHLCV>(
        &self,
        bars: &[T],
        index: usize,
        reverted: impl Fn(f64) -> bool,
    ) -> Option<usize> {
        let last = index
            .saturating_add(self.params.confirmation_bars)
            .min(bars.len().checked_sub(1)?);
        (index..=last).find(|&j| reverted(bars[j].close()))
    }

    /// Max wick ratio and counter-candle flag over `[index, min(confirmed, index + max_trap_bars)]`
    fn evidence<T: OHLCV>(
        &self,
        bars: &[T],
        index: usize,
        confirmed: usize,
        inspect: impl Fn(&BarAnatomy, &T) -> (f64, bool),
    ) -> (f64, bool) {
        let end = confirmed.min(index.saturating_add(self.params.max_trap_bars));
        bars[index..=end]
            .iter()
            .fold((0.0_f64, false), |(wick, strong), bar| {
                let (w, s) = inspect(&bar.anatomy(), bar);
                (wick.max(w), strong || s)
            })
    }

    /// Evidence, score and spacing checks against the carried state
    pub fn accepts(&self, candidate: &TrapCandidate, state: &ScanState) -> bool {
        let evidence =
            candidate.max_wick_ratio >= self.params.min_wick_ratio || candidate.counter_candle;
        evidence
            && candidate.score >= self.params.min_trap_score
            && is_spaced(
                state.last_of(candidate.kind),
                candidate.confirmed_index,
                self.tuning.min_trap_spacing,
            )
    }

    /// Evaluate bull then bear at `index`, writing accepted traps into `slots`
    /// at their confirmed index.
    pub fn step<T: OHLCV>(
        &self,
        bars: &[T],
        index: usize,
        ctx: &LevelContext,
        mut state: ScanState,
        slots: &mut [Option<Signal>],
        policy: OverlapPolicy,
    ) -> ScanState {
        let bull = self.evaluate_bull(bars, index, ctx);
        let bear = self.evaluate_bear(bars, index, ctx);

        for candidate in [bull, bear].into_iter().flatten() {
            if !self.accepts(&candidate, &state) {
                trace!(
                    kind = ?candidate.kind,
                    breakout = candidate.breakout_index,
                    confirmed = candidate.confirmed_index,
                    score = candidate.score,
                    "trap candidate rejected"
                );
                continue;
            }

            let event = TrapEvent {
                index: candidate.confirmed_index,
                breakout_index: candidate.breakout_index,
                score: candidate.score,
                breakout_level: candidate.level,
                reversal_close: candidate.reversal_close,
                timestamp: bars[candidate.confirmed_index].timestamp(),
            };
            let signal = candidate.kind.signal(event);
            let slot = &mut slots[candidate.confirmed_index];

            if policy.replaces(slot.as_ref(), &signal) {
                debug!(
                    kind = ?candidate.kind,
                    index = event.index,
                    score = event.score,
                    level = event.breakout_level,
                    "trap accepted"
                );
                *slot = Some(signal);
            }
            state = state.with_trap(candidate.kind, candidate.confirmed_index);
        }

        state
    }
}
