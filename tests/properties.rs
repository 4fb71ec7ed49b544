//! Property tests over random bar series.

use proptest::prelude::*;
use trapscan::prelude::*;

/// Random walk around 100 with random wicks and volume
fn bars_strategy(max_len: usize) -> impl Strategy<Value = Vec<Bar>> {
    prop::collection::vec(
        (
            -1.0f64..1.0,
            0.0f64..1.0,
            0.0f64..1.0,
            500.0f64..3000.0,
        ),
        0..max_len,
    )
    .prop_map(|steps| {
        let mut price = 100.0;
        steps
            .into_iter()
            .enumerate()
            .map(|(i, (change, up, down, volume))| {
                let open = price;
                let close = (price + change).max(1.0);
                let high = open.max(close) + up;
                let low = (open.min(close) - down).max(0.5);
                price = close;
                Bar::new(i as i64, open, high, low, close, volume)
            })
            .collect()
    })
}

/// Accepted bull and bear traps, counted from the carried state.
///
/// With a one-bar confirmation window confirmations arrive in index order,
/// so greedy spacing keeps the largest spaced subset and the count can only
/// shrink as the candidate set shrinks.
fn accepted_traps(bars: &[Bar], min_trap_score: f64) -> (usize, usize) {
    let engine = TrapEngine::with_params(TrapParams {
        min_trap_score,
        confirmation_bars: 1,
        ..TrapParams::default()
    });
    let mut iter = engine.iter(bars);
    let mut prev = iter.state();
    let (mut bull, mut bear) = (0, 0);
    while iter.next().is_some() {
        let state = iter.state();
        bull += usize::from(state.last_bull != prev.last_bull);
        bear += usize::from(state.last_bear != prev.last_bear);
        prev = state;
    }
    (bull, bear)
}

fn indices(signals: &[Option<Signal>], kind: SignalKind) -> Vec<usize> {
    signals
        .iter()
        .enumerate()
        .filter_map(|(i, s)| s.filter(|s| s.kind() == kind).map(|_| i))
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn output_has_one_slot_per_bar(bars in bars_strategy(120)) {
        let out = detect(&bars, &TrapParams::default());
        prop_assert_eq!(out.len(), bars.len());
    }

    #[test]
    fn detection_is_deterministic(bars in bars_strategy(120)) {
        let params = TrapParams::default();
        prop_assert_eq!(detect(&bars, &params), detect(&bars, &params));
    }

    #[test]
    fn no_events_during_warmup(bars in bars_strategy(120)) {
        let params = TrapParams::default();
        let out = detect(&bars, &params);
        let warmup = params.resistance_lookback.max(params.support_lookback);
        for (i, slot) in out.iter().enumerate().take(warmup) {
            prop_assert!(slot.is_none(), "event at {} during warm-up", i);
        }
    }

    #[test]
    fn traps_of_one_direction_are_spaced(bars in bars_strategy(150)) {
        let out = detect(&bars, &TrapParams::default());
        for kind in [SignalKind::BullTrap, SignalKind::BearTrap] {
            let idx = indices(&out, kind);
            for pair in idx.windows(2) {
                prop_assert!(pair[1] - pair[0] >= 2, "{:?} at {:?}", kind, pair);
            }
        }
    }

    #[test]
    fn normals_keep_their_distance(bars in bars_strategy(150)) {
        let params = TrapParams::default();
        let out = detect(&bars, &params);

        let normals = indices(&out, SignalKind::Normal);
        for pair in normals.windows(2) {
            prop_assert!(pair[1] - pair[0] >= 8);
        }

        let traps: Vec<usize> = out
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.filter(Signal::is_trap).map(|_| i))
            .collect();
        for &n in &normals {
            if let Some(&t) = traps.iter().filter(|&&t| t < n).last() {
                prop_assert!(n - t >= params.normal_quiet_bars);
            }
        }
    }

    #[test]
    fn scores_are_bounded(bars in bars_strategy(150)) {
        let params = TrapParams::default();
        for signal in detect(&bars, &params).iter().flatten() {
            if let Some(score) = signal.score() {
                prop_assert!((params.min_trap_score..=1.0).contains(&score));
            }
        }
    }

    #[test]
    fn stricter_threshold_never_accepts_more(bars in bars_strategy(200)) {
        for (loose, strict) in [(0.5, 0.65), (0.65, 0.8)] {
            let (loose_bull, loose_bear) = accepted_traps(&bars, loose);
            let (strict_bull, strict_bear) = accepted_traps(&bars, strict);
            prop_assert!(strict_bull <= loose_bull, "bull {} > {} at {}", strict_bull, loose_bull, strict);
            prop_assert!(strict_bear <= loose_bear, "bear {} > {} at {}", strict_bear, loose_bear, strict);
        }
    }

    #[test]
    fn iterator_matches_scan(bars in bars_strategy(100)) {
        let engine = TrapEngine::default();
        let streamed: Vec<Option<Signal>> = engine.iter(&bars).map(|b| b.signal).collect();
        prop_assert_eq!(streamed, engine.run(&bars).into_signals());
    }

    #[test]
    fn random_params_never_fault(
        bars in bars_strategy(80),
        lookback in prop_oneof![0usize..40, Just(usize::MAX)],
        confirmation_bars in prop_oneof![0usize..6, (usize::MAX - 8)..=usize::MAX],
        max_trap_bars in prop_oneof![0usize..8, (usize::MAX - 8)..=usize::MAX],
        volume_ma_period in prop_oneof![0usize..30, Just(usize::MAX)],
        normal_quiet_bars in prop_oneof![0usize..12, Just(usize::MAX)],
        min_volume_spike in -1.0f64..3.0,
        min_trap_score in -0.5f64..1.5,
    ) {
        let params = TrapParams {
            resistance_lookback: lookback,
            support_lookback: lookback,
            confirmation_bars,
            max_trap_bars,
            volume_ma_period,
            min_volume_spike,
            min_trap_score,
            normal_quiet_bars,
            ..TrapParams::default()
        };
        prop_assert_eq!(detect(&bars, &params).len(), bars.len());
    }
}
