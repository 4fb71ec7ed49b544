//! # trapscan - false-breakout trap detection
//!
//! Detects bull traps (failed breakouts above resistance) and bear traps
//! (failed breakdowns below support) in an OHLCV series, plus debounced
//! "normal" markers during calm stretches.
//!
//! ## Quick Start
//!
//! ```rust
//! use trapscan::prelude::*;
//!
//! let bars: Vec<Bar> = (0..30)
//!     .map(|i| Bar::new(i, 99.95, 100.06, 99.94, 100.05, 1000.0))
//!     .collect();
//!
//! let engine = EngineBuilder::new()
//!     .min_trap_score(0.6)
//!     .build()
//!     .unwrap();
//!
//! let scan = engine.scan(&bars).unwrap();
//! assert_eq!(scan.len(), bars.len());
//! assert_eq!(scan.bull_traps().count(), 0);
//! ```
//!
//! The scan is one forward pass. Each bar is evaluated for a bull trap, then
//! a bear trap, then a calm marker; a trap is written at the bar that
//! confirmed it, which may be a few bars after the breakout.

pub mod detectors;
pub mod params;

use tracing::{debug, warn};

use detectors::{
    LevelContext, LevelProvider, LevelTracker, ScanState, StabilityDetector, TrapDetector,
};
use params::{TrapParams, Tuning};

pub mod prelude {
    pub use crate::{
        // Entry points
        detect,
        // Detectors
        detectors::*,
        // Parameters
        params::{ParamMeta, ParamType, ParameterizedDetector, TrapParams, Tuning},
        // Parallel
        scan_parallel,
        // Data
        Bar,
        BarSignal,
        // Engine
        EngineBuilder,
        EngineConfig,
        EventRecord,
        NormalEvent,
        OHLCVExt,
        OverlapPolicy,
        Period,
        Ratio,
        Result,
        ScanError,
        ScanResult,
        Signal,
        SignalIterator,
        SignalKind,
        TrapEngine,
        // Errors
        TrapError,
        TrapEvent,
        TrapKind,
        TrapScan,
        OHLCV,
    };
}

// ============================================================
// ERRORS
// ============================================================

pub type Result<T> = std::result::Result<T, TrapError>;

/// Errors that can occur while configuring or validating a scan
#[derive(Debug, Clone, thiserror::Error)]
pub enum TrapError {
    #[error("Invalid value: {0}")]
    InvalidValue(&'static str),

    #[error("{field} = {value} out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Malformed bar at index {index}: {reason}")]
    MalformedBar { index: usize, reason: &'static str },
}

// ============================================================
// VALIDATED TYPES
// ============================================================

/// Normalized value in range 0.0..=1.0
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Ratio(f64);

impl Ratio {
    /// Create a new Ratio, validating the value is in [0.0, 1.0]
    pub fn new(value: f64) -> Result<Self> {
        if value.is_nan() || value.is_infinite() {
            return Err(TrapError::InvalidValue("Ratio cannot be NaN or infinite"));
        }
        if !(0.0..=1.0).contains(&value) {
            return Err(TrapError::OutOfRange {
                field: "Ratio",
                value,
                min: 0.0,
                max: 1.0,
            });
        }
        Ok(Self(value))
    }

    #[inline]
    pub fn get(self) -> f64 {
        self.0
    }
}

impl serde::Serialize for Ratio {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for Ratio {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = f64::deserialize(d)?;
        Ratio::new(value).map_err(serde::de::Error::custom)
    }
}

/// Period (must be > 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Period(usize);

impl Period {
    /// Create a new Period, validating value is > 0
    pub fn new(value: usize) -> Result<Self> {
        if value == 0 {
            return Err(TrapError::InvalidValue("Period must be > 0"));
        }
        Ok(Self(value))
    }

    #[doc(hidden)]
    pub const fn new_const(value: usize) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> usize {
        self.0
    }
}

impl serde::Serialize for Period {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for Period {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = usize::deserialize(d)?;
        Period::new(value).map_err(serde::de::Error::custom)
    }
}

// ============================================================
// OHLCV TRAITS
// ============================================================

/// Core OHLCV data trait
///
/// Implementors are expected to satisfy
/// `low <= min(open, close) <= max(open, close) <= high` and `volume >= 0`.
/// The scan does not check this unless [`EngineBuilder::validate_data`] is set;
/// violating bars produce meaningless scores.
pub trait OHLCV {
    fn open(&self) -> f64;
    fn high(&self) -> f64;
    fn low(&self) -> f64;
    fn close(&self) -> f64;
    fn volume(&self) -> f64;

    fn timestamp(&self) -> Option<i64> {
        None
    }
}

/// Extension trait with computed properties for OHLCV data
pub trait OHLCVExt: OHLCV {
    #[inline]
    fn body(&self) -> f64 {
        (self.close() - self.open()).abs()
    }

    #[inline]
    fn range(&self) -> f64 {
        self.high() - self.low()
    }

    #[inline]
    fn upper_wick(&self) -> f64 {
        self.high() - self.open().max(self.close())
    }

    #[inline]
    fn lower_wick(&self) -> f64 {
        self.open().min(self.close()) - self.low()
    }

    #[inline]
    fn is_bullish(&self) -> bool {
        self.close() > self.open()
    }

    #[inline]
    fn is_bearish(&self) -> bool {
        self.close() < self.open()
    }

    /// Range, body, wicks and their ratios to the range
    #[inline]
    fn anatomy(&self) -> detectors::BarAnatomy {
        detectors::BarAnatomy::of(self)
    }

    /// Validate OHLCV data consistency
    fn validate(&self) -> Result<()> {
        let prices = [self.open(), self.high(), self.low(), self.close()];
        if prices.iter().any(|p| p.is_nan()) {
            return Err(TrapError::MalformedBar {
                index: 0,
                reason: "NaN in OHLC",
            });
        }
        if prices.iter().any(|p| p.is_infinite()) {
            return Err(TrapError::MalformedBar {
                index: 0,
                reason: "Infinite value in OHLC",
            });
        }
        if self.high() < self.low() {
            return Err(TrapError::MalformedBar {
                index: 0,
                reason: "high < low",
            });
        }
        if self.open().min(self.close()) < self.low() {
            return Err(TrapError::MalformedBar {
                index: 0,
                reason: "open/close below low",
            });
        }
        if self.open().max(self.close()) > self.high() {
            return Err(TrapError::MalformedBar {
                index: 0,
                reason: "open/close above high",
            });
        }
        let volume = self.volume();
        if volume.is_nan() || volume.is_infinite() || volume < 0.0 {
            return Err(TrapError::MalformedBar {
                index: 0,
                reason: "volume must be finite and >= 0",
            });
        }
        Ok(())
    }
}

impl<T: OHLCV + ?Sized> OHLCVExt for T {}

/// Plain OHLCV bar with an integer timestamp
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Bar {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    pub fn new(timestamp: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }
}

impl OHLCV for Bar {
    fn open(&self) -> f64 {
        self.open
    }

    fn high(&self) -> f64 {
        self.high
    }

    fn low(&self) -> f64 {
        self.low
    }

    fn close(&self) -> f64 {
        self.close
    }

    fn volume(&self) -> f64 {
        self.volume
    }

    fn timestamp(&self) -> Option<i64> {
        Some(self.timestamp)
    }
}

// ============================================================
// EVENTS - result of detection (Copy, no allocations)
// ============================================================

/// Direction of a trap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum TrapKind {
    /// Failed breakout above resistance
    Bull,
    /// Failed breakdown below support
    Bear,
}

impl TrapKind {
    #[inline]
    pub fn signal(self, event: TrapEvent) -> Signal {
        match self {
            TrapKind::Bull => Signal::BullTrap(event),
            TrapKind::Bear => Signal::BearTrap(event),
        }
    }
}

/// A confirmed trap
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TrapEvent {
    /// Bar that confirmed the reversal; the event is reported here
    pub index: usize,
    /// Bar that broke the level
    pub breakout_index: usize,
    /// Composite score 0.0..=1.0
    pub score: f64,
    /// Resistance (bull) or support (bear) that was violated
    pub breakout_level: f64,
    /// Close of the confirming bar
    pub reversal_close: f64,
    pub timestamp: Option<i64>,
}

/// A calm/stable bar
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct NormalEvent {
    pub index: usize,
    pub timestamp: Option<i64>,
}

/// The event written at a bar index; at most one per index
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Signal {
    BullTrap(TrapEvent),
    BearTrap(TrapEvent),
    Normal(NormalEvent),
}

/// Tag of a [`Signal`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum SignalKind {
    BullTrap,
    BearTrap,
    Normal,
}

impl Signal {
    pub fn kind(&self) -> SignalKind {
        match self {
            Signal::BullTrap(_) => SignalKind::BullTrap,
            Signal::BearTrap(_) => SignalKind::BearTrap,
            Signal::Normal(_) => SignalKind::Normal,
        }
    }

    /// The trap payload, if this is a trap
    pub fn trap(&self) -> Option<&TrapEvent> {
        match self {
            Signal::BullTrap(e) | Signal::BearTrap(e) => Some(e),
            Signal::Normal(_) => None,
        }
    }

    pub fn score(&self) -> Option<f64> {
        self.trap().map(|e| e.score)
    }

    pub fn timestamp(&self) -> Option<i64> {
        match self {
            Signal::BullTrap(e) | Signal::BearTrap(e) => e.timestamp,
            Signal::Normal(e) => e.timestamp,
        }
    }

    #[inline]
    pub fn is_trap(&self) -> bool {
        !matches!(self, Signal::Normal(_))
    }
}

/// Flat, sparse encoding of one event
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EventRecord {
    pub index: usize,
    pub kind: SignalKind,
    pub score: Option<f64>,
    pub breakout_level: Option<f64>,
    pub reversal_close: Option<f64>,
    pub timestamp: Option<i64>,
}

impl EventRecord {
    pub fn from_signal(index: usize, signal: &Signal) -> Self {
        let trap = signal.trap();
        Self {
            index,
            kind: signal.kind(),
            score: trap.map(|e| e.score),
            breakout_level: trap.map(|e| e.breakout_level),
            reversal_close: trap.map(|e| e.reversal_close),
            timestamp: signal.timestamp(),
        }
    }
}

/// Per-bar results of one scan; `signals[k]` belongs to `bars[k]`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrapScan {
    signals: Vec<Option<Signal>>,
}

impl TrapScan {
    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Signal> {
        self.signals.get(index).and_then(Option::as_ref)
    }

    pub fn signals(&self) -> &[Option<Signal>] {
        &self.signals
    }

    pub fn into_signals(self) -> Vec<Option<Signal>> {
        self.signals
    }

    /// Occupied indices with their signal
    pub fn iter_events(&self) -> impl Iterator<Item = (usize, &Signal)> + '_ {
        self.signals
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|s| (i, s)))
    }

    /// Sparse list of events, omitting empty indices
    pub fn events(&self) -> Vec<EventRecord> {
        self.iter_events()
            .map(|(i, s)| EventRecord::from_signal(i, s))
            .collect()
    }

    pub fn bull_traps(&self) -> impl Iterator<Item = &TrapEvent> + '_ {
        self.iter_events().filter_map(|(_, s)| match s {
            Signal::BullTrap(e) => Some(e),
            _ => None,
        })
    }

    pub fn bear_traps(&self) -> impl Iterator<Item = &TrapEvent> + '_ {
        self.iter_events().filter_map(|(_, s)| match s {
            Signal::BearTrap(e) => Some(e),
            _ => None,
        })
    }

    pub fn normals(&self) -> impl Iterator<Item = &NormalEvent> + '_ {
        self.iter_events().filter_map(|(_, s)| match s {
            Signal::Normal(e) => Some(e),
            _ => None,
        })
    }

    pub fn trap_count(&self) -> usize {
        self.iter_events().filter(|(_, s)| s.is_trap()).count()
    }
}

impl From<Vec<Option<Signal>>> for TrapScan {
    fn from(signals: Vec<Option<Signal>>) -> Self {
        Self { signals }
    }
}

// ============================================================
// OVERLAP POLICY
// ============================================================

/// What happens when two accepted traps confirm at the same index
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum OverlapPolicy {
    /// The later write wins; at a shared bar the bear trap replaces the bull trap
    #[default]
    LastWriterWins,
    /// An existing trap is only replaced by a strictly higher-scoring one
    HigherScore,
}

impl OverlapPolicy {
    pub fn replaces(self, existing: Option<&Signal>, incoming: &Signal) -> bool {
        match (self, existing) {
            (_, None) | (OverlapPolicy::LastWriterWins, _) => true,
            (OverlapPolicy::HigherScore, Some(current)) => {
                match (current.score(), incoming.score()) {
                    (Some(old), Some(new)) => new > old,
                    _ => true,
                }
            }
        }
    }
}

// ============================================================
// TRAP ENGINE
// ============================================================

/// Engine configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Fail fast on malformed bars before scanning
    pub validate_data: bool,
    pub overlap_policy: OverlapPolicy,
}

/// Main trap detection engine
#[derive(Debug, Clone)]
pub struct TrapEngine<P: LevelProvider = LevelTracker> {
    level_provider: P,
    traps: TrapDetector,
    stability: StabilityDetector,
    config: EngineConfig,
}

impl TrapEngine<LevelTracker> {
    /// Engine with default tuning and the given parameters
    pub fn with_params(params: TrapParams) -> Self {
        Self::new(LevelTracker, params, Tuning::default(), EngineConfig::default())
    }
}

impl Default for TrapEngine<LevelTracker> {
    fn default() -> Self {
        Self::with_params(TrapParams::default())
    }
}

impl<P: LevelProvider> TrapEngine<P> {
    /// Unchecked constructor; prefer [`EngineBuilder`], which validates `tuning`
    pub fn new(level_provider: P, params: TrapParams, tuning: Tuning, config: EngineConfig) -> Self {
        Self {
            level_provider,
            traps: TrapDetector::new(params, tuning),
            stability: StabilityDetector::new(params, tuning),
            config,
        }
    }

    /// Sanitized parameters in effect
    pub fn params(&self) -> &TrapParams {
        self.traps.params()
    }

    pub fn tuning(&self) -> &Tuning {
        self.traps.tuning()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn trap_detector(&self) -> &TrapDetector {
        &self.traps
    }

    pub fn stability_detector(&self) -> &StabilityDetector {
        &self.stability
    }

    // ===========================================
    // LOW-LEVEL: Primitives
    // ===========================================

    /// Precompute levels for all bars.
    #[inline]
    pub fn compute_levels<T: OHLCV>(&self, bars: &[T]) -> Vec<LevelContext> {
        self.level_provider.compute_all(bars, self.params())
    }

    /// Advance the scan by one bar: bull, then bear, then calm marker.
    pub fn step<T: OHLCV>(
        &self,
        bars: &[T],
        index: usize,
        ctx: &LevelContext,
        state: ScanState,
        slots: &mut [Option<Signal>],
    ) -> ScanState {
        let state = self
            .traps
            .step(bars, index, ctx, state, slots, self.config.overlap_policy);
        self.stability.step(bars, index, ctx, state, slots)
    }

    // ===========================================
    // HIGH-LEVEL: Batch processing
    // ===========================================

    /// Scan all bars. Fails only when data validation is enabled and a bar
    /// is malformed.
    pub fn scan<T: OHLCV>(&self, bars: &[T]) -> Result<TrapScan> {
        if self.config.validate_data {
            validate_bars(bars)?;
        }
        Ok(self.run(bars))
    }

    /// Scan without validation
    pub fn run<T: OHLCV>(&self, bars: &[T]) -> TrapScan {
        let scan: TrapScan = self
            .iter(bars)
            .map(|b| b.signal)
            .collect::<Vec<_>>()
            .into();

        debug!(
            bars = bars.len(),
            bull = scan.bull_traps().count(),
            bear = scan.bear_traps().count(),
            normal = scan.normals().count(),
            "trap scan complete"
        );
        scan
    }

    /// Iterate bars with their final signal. Slot `i` is final once bar `i`
    /// has been processed.
    pub fn iter<'a, T: OHLCV>(&'a self, bars: &'a [T]) -> SignalIterator<'a, T, P> {
        SignalIterator::new(self, bars)
    }
}

fn validate_bars<T: OHLCV>(bars: &[T]) -> Result<()> {
    for (i, bar) in bars.iter().enumerate() {
        bar.validate().map_err(|e| match e {
            TrapError::MalformedBar { reason, .. } => TrapError::MalformedBar { index: i, reason },
            other => other,
        })?;
    }
    Ok(())
}

/// Detect traps and normal markers with default tuning.
///
/// Parameters are clamped, never rejected. The result has one slot per bar.
pub fn detect<T: OHLCV>(bars: &[T], params: &TrapParams) -> Vec<Option<Signal>> {
    TrapEngine::with_params(*params).run(bars).into_signals()
}

// ============================================================
// SIGNAL ITERATOR
// ============================================================

/// Signal at a specific bar
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BarSignal {
    pub index: usize,
    pub signal: Option<Signal>,
}

/// Iterator over bars with their signal, threading [`ScanState`] forward
pub struct SignalIterator<'a, T: OHLCV, P: LevelProvider> {
    engine: &'a TrapEngine<P>,
    bars: &'a [T],
    levels: Vec<LevelContext>,
    slots: Vec<Option<Signal>>,
    state: ScanState,
    current: usize,
}

impl<'a, T: OHLCV, P: LevelProvider> SignalIterator<'a, T, P> {
    fn new(engine: &'a TrapEngine<P>, bars: &'a [T]) -> Self {
        Self {
            engine,
            bars,
            levels: engine.compute_levels(bars),
            slots: vec![None; bars.len()],
            state: ScanState::new(),
            current: 0,
        }
    }

    /// State after the bars yielded so far
    pub fn state(&self) -> ScanState {
        self.state
    }
}

impl<'a, T: OHLCV, P: LevelProvider> Iterator for SignalIterator<'a, T, P> {
    type Item = BarSignal;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current >= self.bars.len() {
            return None;
        }

        let index = self.current;
        self.state = self.engine.step(
            self.bars,
            index,
            &self.levels[index],
            self.state,
            &mut self.slots,
        );
        self.current += 1;

        Some(BarSignal {
            index,
            signal: self.slots[index].take(),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.bars.len().saturating_sub(self.current);
        (remaining, Some(remaining))
    }
}

impl<'a, T: OHLCV, P: LevelProvider> ExactSizeIterator for SignalIterator<'a, T, P> {}

// ============================================================
// BUILDER
// ============================================================

/// Builder for creating TrapEngine instances
pub struct EngineBuilder<P: LevelProvider = LevelTracker> {
    level_provider: P,
    params: TrapParams,
    tuning: Tuning,
    config: EngineConfig,
}

impl Default for EngineBuilder<LevelTracker> {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder<LevelTracker> {
    pub fn new() -> Self {
        Self {
            level_provider: LevelTracker,
            params: TrapParams::default(),
            tuning: Tuning::default(),
            config: EngineConfig::default(),
        }
    }
}

impl<P: LevelProvider> EngineBuilder<P> {
    /// Change level provider
    pub fn level_provider<P2: LevelProvider>(self, provider: P2) -> EngineBuilder<P2> {
        EngineBuilder {
            level_provider: provider,
            params: self.params,
            tuning: self.tuning,
            config: self.config,
        }
    }

    /// Replace all parameters
    pub fn params(mut self, params: TrapParams) -> Self {
        self.params = params;
        self
    }

    pub fn tuning(mut self, tuning: Tuning) -> Self {
        self.tuning = tuning;
        self
    }

    pub fn lookback(mut self, resistance: usize, support: usize) -> Self {
        self.params.resistance_lookback = resistance;
        self.params.support_lookback = support;
        self
    }

    pub fn confirmation_bars(mut self, bars: usize) -> Self {
        self.params.confirmation_bars = bars;
        self
    }

    pub fn volume_ma_period(mut self, period: usize) -> Self {
        self.params.volume_ma_period = period;
        self
    }

    pub fn min_trap_score(mut self, score: f64) -> Self {
        self.params.min_trap_score = score;
        self
    }

    pub fn normal_signal(mut self, enable: bool) -> Self {
        self.params.enable_normal_signal = enable;
        self
    }

    /// Enable/disable data validation
    pub fn validate_data(mut self, enable: bool) -> Self {
        self.config.validate_data = enable;
        self
    }

    pub fn overlap_policy(mut self, policy: OverlapPolicy) -> Self {
        self.config.overlap_policy = policy;
        self
    }

    /// Build the engine. Parameters are clamped; invalid tuning is an error.
    pub fn build(self) -> Result<TrapEngine<P>> {
        self.tuning.validate()?;

        let sanitized = self.params.sanitized();
        if sanitized != self.params {
            warn!(requested = ?self.params, effective = ?sanitized, "trap parameters clamped");
        }

        Ok(TrapEngine::new(
            self.level_provider,
            sanitized,
            self.tuning,
            self.config,
        ))
    }
}

// ============================================================
// PARALLEL SCANNING
// ============================================================

use rayon::prelude::*;

/// Result of scanning a single instrument
#[derive(Debug)]
pub struct ScanResult {
    pub symbol: String,
    pub scan: TrapScan,
}

/// Error from scanning a single instrument
#[derive(Debug)]
pub struct ScanError {
    pub symbol: String,
    pub error: TrapError,
}

/// Parallel scanning of multiple instruments
pub fn scan_parallel<'a, T, I, P>(
    engine: &TrapEngine<P>,
    instruments: I,
) -> (Vec<ScanResult>, Vec<ScanError>)
where
    T: OHLCV + Sync + 'a,
    I: IntoParallelIterator<Item = (&'a str, &'a [T])>,
    P: LevelProvider,
{
    let results: Vec<_> = instruments
        .into_par_iter()
        .map(|(symbol, bars)| {
            engine
                .scan(bars)
                .map(|scan| ScanResult {
                    symbol: symbol.to_string(),
                    scan,
                })
                .map_err(|error| ScanError {
                    symbol: symbol.to_string(),
                    error,
                })
        })
        .collect();

    let mut successes = Vec::new();
    let mut errors = Vec::new();

    for result in results {
        match result {
            Ok(r) => successes.push(r),
            Err(e) => errors.push(e),
        }
    }

    (successes, errors)
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn flat(n: usize) -> Vec<Bar> {
        (0..n)
            .map(|i| Bar::new(i as i64, 99.95, 100.06, 99.94, 100.05, 1000.0))
            .collect()
    }

    /// 25 quiet bars, one outside bar at 25 that snaps back from both levels
    fn outside_bar_series() -> Vec<Bar> {
        let mut bars = flat(25);
        bars.push(Bar::new(25, 99.99, 102.5, 98.5, 100.0, 2000.0));
        bars.extend((26..30).map(|i| Bar::new(i, 99.95, 100.06, 99.94, 100.05, 1000.0)));
        bars
    }

    #[test]
    fn test_ratio_validation() {
        assert!(Ratio::new(0.0).is_ok());
        assert!(Ratio::new(1.0).is_ok());
        assert!(Ratio::new(0.5).is_ok());
        assert!(Ratio::new(-0.1).is_err());
        assert!(Ratio::new(1.1).is_err());
        assert!(Ratio::new(f64::NAN).is_err());
        assert!(Ratio::new(f64::INFINITY).is_err());
    }

    #[test]
    fn test_period_validation() {
        assert!(Period::new(1).is_ok());
        assert!(Period::new(100).is_ok());
        assert!(Period::new(0).is_err());
    }

    #[test]
    fn test_ohlcv_ext() {
        let bar = Bar::new(0, 100.0, 110.0, 90.0, 105.0, 1.0);
        assert_eq!(bar.body(), 5.0);
        assert_eq!(bar.range(), 20.0);
        assert_eq!(bar.upper_wick(), 5.0);
        assert_eq!(bar.lower_wick(), 10.0);
        assert!(bar.is_bullish());
        assert!(!bar.is_bearish());
        assert!((bar.anatomy().body_ratio - 0.25).abs() < 0.001);
    }

    #[test]
    fn test_bar_validation() {
        assert!(Bar::new(0, 100.0, 110.0, 90.0, 105.0, 1.0).validate().is_ok());
        assert!(Bar::new(0, 100.0, 90.0, 110.0, 105.0, 1.0).validate().is_err());
        assert!(Bar::new(0, 100.0, 104.0, 90.0, 105.0, 1.0).validate().is_err());
        assert!(Bar::new(0, 89.0, 110.0, 90.0, 105.0, 1.0).validate().is_err());
        assert!(Bar::new(0, 100.0, 110.0, 90.0, f64::NAN, 1.0).validate().is_err());
        assert!(Bar::new(0, 100.0, 110.0, 90.0, 105.0, -1.0).validate().is_err());
    }

    #[test]
    fn test_engine_builder() {
        assert!(EngineBuilder::new().build().is_ok());

        let bad = Tuning {
            wick_weight: 0.9,
            ..Tuning::default()
        };
        assert!(EngineBuilder::new().tuning(bad).build().is_err());
    }

    #[test]
    fn test_builder_clamps_params() {
        let engine = EngineBuilder::new()
            .confirmation_bars(0)
            .volume_ma_period(0)
            .min_trap_score(4.0)
            .build()
            .unwrap();
        assert_eq!(engine.params().confirmation_bars, 1);
        assert_eq!(engine.params().volume_ma_period, 1);
        assert_eq!(engine.params().min_trap_score, 1.0);
    }

    #[test]
    fn test_empty_scan() {
        let engine = TrapEngine::default();
        let bars: Vec<Bar> = vec![];
        let scan = engine.scan(&bars).unwrap();
        assert!(scan.is_empty());
        assert!(scan.events().is_empty());
    }

    #[test]
    fn test_scan_length_matches_bars() {
        let bars = outside_bar_series();
        let scan = TrapEngine::default().scan(&bars).unwrap();
        assert_eq!(scan.len(), bars.len());
        assert_eq!(detect(&bars, &TrapParams::default()).len(), bars.len());
    }

    #[test]
    fn test_last_writer_wins_at_shared_index() {
        let bars = outside_bar_series();
        let engine = TrapEngine::default();

        let ctx = engine.compute_levels(&bars);
        let bull = engine.trap_detector().evaluate_bull(&bars, 25, &ctx[25]).unwrap();
        let bear = engine.trap_detector().evaluate_bear(&bars, 25, &ctx[25]).unwrap();
        assert_eq!(bull.confirmed_index, 25);
        assert_eq!(bear.confirmed_index, 25);
        assert!(bull.score > bear.score);

        let scan = engine.scan(&bars).unwrap();
        assert!(matches!(scan.get(25), Some(Signal::BearTrap(_))));
        assert_eq!(scan.bull_traps().count(), 0);
    }

    #[test]
    fn test_higher_score_policy() {
        let bars = outside_bar_series();
        let engine = EngineBuilder::new()
            .overlap_policy(OverlapPolicy::HigherScore)
            .build()
            .unwrap();

        let scan = engine.scan(&bars).unwrap();
        assert!(matches!(scan.get(25), Some(Signal::BullTrap(_))));
    }

    #[test]
    fn test_overlap_policy_replaces() {
        let event = |score| TrapEvent {
            index: 0,
            breakout_index: 0,
            score,
            breakout_level: 1.0,
            reversal_close: 1.0,
            timestamp: None,
        };
        let low = Signal::BullTrap(event(0.6));
        let high = Signal::BearTrap(event(0.7));

        assert!(OverlapPolicy::LastWriterWins.replaces(Some(&high), &low));
        assert!(!OverlapPolicy::HigherScore.replaces(Some(&high), &low));
        assert!(OverlapPolicy::HigherScore.replaces(Some(&low), &high));
        assert!(OverlapPolicy::HigherScore.replaces(None, &low));
    }

    #[test]
    fn test_validate_data_reports_index() {
        let mut bars = flat(5);
        bars[3].high = 99.0;

        let engine = EngineBuilder::new().validate_data(true).build().unwrap();
        match engine.scan(&bars) {
            Err(TrapError::MalformedBar { index, .. }) => assert_eq!(index, 3),
            other => panic!("expected malformed bar error, got {other:?}"),
        }

        // Without validation the scan still completes
        assert_eq!(TrapEngine::default().scan(&bars).unwrap().len(), 5);
    }

    #[test]
    fn test_iterator_exact_size() {
        let bars = flat(3);
        let engine = TrapEngine::default();
        let iter = engine.iter(&bars);
        assert_eq!(iter.len(), 3);
        let items: Vec<_> = iter.collect();
        assert_eq!(items.iter().map(|b| b.index).collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn test_iterator_state_threads_forward() {
        let bars = outside_bar_series();
        let engine = TrapEngine::default();
        let mut iter = engine.iter(&bars);

        for _ in 0..25 {
            iter.next();
        }
        assert_eq!(iter.state().last_trap, None);
        assert_eq!(iter.state().last_normal, Some(20));

        let at_25 = iter.next().unwrap();
        assert!(at_25.signal.is_some());
        assert_eq!(iter.state().last_bull, Some(25));
        assert_eq!(iter.state().last_bear, Some(25));
        assert_eq!(iter.state().last_trap, Some(25));
    }

    #[test]
    fn test_events_are_sparse() {
        let bars = outside_bar_series();
        let scan = TrapEngine::default().scan(&bars).unwrap();
        let events = scan.events();

        assert_eq!(events.len(), scan.iter_events().count());
        let trap = events.iter().find(|e| e.index == 25).unwrap();
        assert_eq!(trap.kind, SignalKind::BearTrap);
        assert!(trap.score.is_some());
        assert_eq!(trap.timestamp, Some(25));

        let normal = events.iter().find(|e| e.kind == SignalKind::Normal).unwrap();
        assert_eq!(normal.score, None);
        assert_eq!(normal.breakout_level, None);
    }

    #[test]
    fn test_parallel_scan() {
        let engine = EngineBuilder::new().validate_data(true).build().unwrap();

        let bars1 = flat(30);
        let bars2 = outside_bar_series();
        let mut bad = flat(10);
        bad[2].low = 101.0;

        let instruments: Vec<(&str, &[Bar])> =
            vec![("AAPL", &bars1), ("GOOGL", &bars2), ("BAD", &bad)];

        let (results, errors) = scan_parallel(&engine, instruments);
        assert_eq!(results.len(), 2);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].symbol, "BAD");
    }

    #[test]
    fn test_compute_levels() {
        let engine = TrapEngine::default();
        let bars = flat(25);
        let levels = engine.compute_levels(&bars);
        assert_eq!(levels.len(), bars.len());
        assert!(levels[20].calm_ready());
        assert!(!levels[19].bull_ready());
        assert!(!levels[19].bear_ready());
    }
}
