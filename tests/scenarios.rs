//! Integration tests for the trendbox public API.
//!
//! Worked examples of the congestion box, the swing detector and batch runs.

use trendbox::prelude::*;

/// Simple test bar structure
#[derive(Debug, Clone, Copy)]
struct TestBar {
    o: f64,
    h: f64,
    l: f64,
    c: f64,
}

impl TestBar {
    fn new(o: f64, h: f64, l: f64, c: f64) -> Self {
        Self { o, h, l, c }
    }
}

impl OHLC for TestBar {
    fn open(&self) -> f64 {
        self.o
    }

    fn high(&self) -> f64 {
        self.h
    }

    fn low(&self) -> f64 {
        self.l
    }

    fn close(&self) -> f64 {
        self.c
    }
}

/// Nine bars inside a 100..110 reference bar at index 4
fn congestion() -> Vec<TestBar> {
    let mut bars: Vec<TestBar> = (0..9)
        .map(|i| {
            if i % 2 == 0 {
                TestBar::new(103.0, 107.0, 102.0, 106.0)
            } else {
                TestBar::new(104.0, 108.5, 103.5, 108.0)
            }
        })
        .collect();
    bars[4] = TestBar::new(104.0, 110.0, 100.0, 105.0);
    bars
}

fn no_cap(_: usize) -> f64 {
    f64::INFINITY
}

/// Fixed swing levels, no crossovers and no bar short enough for a box
struct Levels {
    high: f64,
    low: f64,
}

impl IndicatorSource for Levels {
    fn fast_ma<T: OHLC>(&mut self, _bars: &[T], _index: usize) -> f64 {
        0.0
    }

    fn slow_ma<T: OHLC>(&mut self, _bars: &[T], _index: usize) -> f64 {
        1.0
    }

    fn swing_high<T: OHLC>(&mut self, _bars: &[T], _index: usize) -> f64 {
        self.high
    }

    fn swing_low<T: OHLC>(&mut self, _bars: &[T], _index: usize) -> f64 {
        self.low
    }

    fn max_bar_height<T: OHLC>(&mut self, _bars: &[T], _index: usize) -> f64 {
        0.0
    }
}

// ============================================================
// CONGESTION BOX
// ============================================================

#[test]
fn test_tallest_bar_over_cap_is_skipped() {
    // heights {3,3,3,3,3,3,3,3,9}
    let mut bars: Vec<TestBar> = (0..9)
        .map(|_| TestBar::new(101.0, 102.0, 99.0, 100.5))
        .collect();
    bars[8] = TestBar::new(100.0, 106.0, 97.0, 101.0);

    let mut cbox = CongestionBox::default();
    assert!(cbox.find(&bars, 8, |_| 4.0));

    let reference = cbox.reference_bar().unwrap();
    assert_ne!(reference, 8);
    assert_eq!(bars[reference].height(), 3.0);
}

#[test]
fn test_breakout_then_reset() {
    let mut bars = congestion();
    let mut cbox = CongestionBox::default();
    assert!(cbox.process(&bars, 8, no_cap));
    assert_eq!((cbox.start_y(), cbox.end_y()), (110.0, 100.0));

    // close 111, body top 112
    bars.push(TestBar::new(112.0, 112.5, 107.5, 111.0));
    cbox.process(&bars, 9, no_cap);
    assert_eq!(cbox.state(), BoxState::Breakout);
    assert_eq!(cbox.dir(), Direction::Up);

    // close 105, inside 100..110
    bars.push(TestBar::new(108.0, 109.0, 104.0, 105.0));
    cbox.process(&bars, 10, no_cap);
    assert_eq!(cbox.state(), BoxState::Reset);
}

#[test]
fn test_cancellation_closure() {
    let mut bars = congestion();
    let mut cbox = CongestionBox::default();
    cbox.process(&bars, 8, no_cap);

    bars.push(TestBar::new(108.0, 112.0, 107.0, 111.5));
    cbox.process(&bars, 9, no_cap);
    bars.push(TestBar::new(111.5, 113.0, 110.5, 112.5));
    cbox.process(&bars, 10, no_cap);
    assert_eq!(cbox.state(), BoxState::Confirmed);
    assert_eq!(cbox.confirmation_bar(), Some(10));

    let bars_to_cancel = cbox.config().bars_to_cancel.get();
    let mut canceled_at = None;
    for i in 11..=(10 + bars_to_cancel + 1) {
        bars.push(TestBar::new(112.0, 114.0, 111.0, 113.0));
        cbox.process(&bars, i, no_cap);
        if cbox.state() == BoxState::Canceled {
            canceled_at = Some(i);
            break;
        }
    }
    assert_eq!(canceled_at, Some(10 + bars_to_cancel));

    bars.push(TestBar::new(112.0, 114.0, 111.0, 113.0));
    cbox.process(&bars, 10 + bars_to_cancel + 1, no_cap);
    assert_eq!(cbox.state(), BoxState::None);
}

#[test]
fn test_live_confirmation_before_close() {
    let mut bars = congestion();
    let mut cbox = CongestionBox::default();
    cbox.process(&bars, 8, no_cap);

    bars.push(TestBar::new(108.0, 112.0, 107.0, 111.5));
    cbox.process(&bars, 9, no_cap);

    // forming bar, not yet above 112
    bars.push(TestBar::new(111.5, 111.8, 111.0, 111.6));
    assert!(!cbox.confirm_breakout(&bars, 10));

    bars[10] = TestBar::new(111.5, 112.25, 111.0, 112.0);
    assert!(cbox.confirm_breakout(&bars, 10));
    assert_eq!(cbox.state(), BoxState::Confirmed);
}

// ============================================================
// SWING DETECTOR
// ============================================================

#[test]
fn test_swing_low_break_confirms_on_trade() {
    let mut bars: Vec<TestBar> = (0..7)
        .map(|_| TestBar::new(100.0, 101.0, 99.0, 100.5))
        .collect();
    bars[6] = TestBar::new(98.0, 98.5, 95.5, 96.0); // bottom 96
    bars.push(TestBar::new(96.0, 96.5, 93.5, 94.0)); // bottom 94
    bars.push(TestBar::new(94.0, 94.2, 93.8, 94.0)); // forming

    let mut levels = Levels {
        high: 105.0,
        low: 95.0,
    };
    let mut swing = BreakoutDetector::new(SwingPolicy::default());

    assert!(!swing.find(&bars, &BarCursor::bar_open(8), &mut levels));
    assert_eq!(swing.dir(), Direction::Down);

    bars[8] = TestBar::new(94.0, 94.2, 93.0, 93.2);
    assert!(swing.find(&bars, &BarCursor::tick(8), &mut levels));
}

// ============================================================
// ENGINE
// ============================================================

#[test]
fn test_engine_with_custom_indicators() {
    let mut bars: Vec<TestBar> = (0..20)
        .map(|_| TestBar::new(100.0, 101.0, 99.0, 100.5))
        .collect();
    bars[16] = TestBar::new(99.5, 100.0, 93.0, 94.0);
    bars[17] = TestBar::new(94.0, 94.5, 92.0, 92.5);

    let mut engine = EngineBuilder::new()
        .indicators(Levels {
            high: 105.0,
            low: 95.0,
        })
        .build()
        .unwrap();
    let reports = engine.run(&bars).unwrap();

    let changes: Vec<_> = reports
        .iter()
        .flat_map(|r| r.events.iter())
        .filter(|e| matches!(e, TrendEvent::TrendChanged { .. }))
        .collect();
    assert_eq!(
        changes,
        vec![&TrendEvent::TrendChanged {
            bar: 17,
            direction: Direction::Down,
            method: BreakoutMethod::Swing,
        }]
    );
    assert_eq!(engine.trend_at(19), Some(Direction::Down));
    assert_eq!(engine.discrete_series()[19], -1);
}

#[test]
fn test_default_engine_on_trend() {
    // steady climb with no overlap between bars
    let bars: Vec<TestBar> = (0..60)
        .map(|i| {
            let base = 100.0 + i as f64 * 3.0;
            TestBar::new(base, base + 2.5, base - 0.5, base + 2.0)
        })
        .collect();

    let mut engine = EngineBuilder::new().build().unwrap();
    let reports = engine.run(&bars).unwrap();

    assert_eq!(reports.len(), 60);
    assert!(reports
        .iter()
        .all(|r| r.congestion.state == BoxState::None));
    assert!(reports.iter().all(|r| r.trend != Direction::Down));
}

#[test]
fn test_validate_data_reports_index() {
    let mut bars: Vec<TestBar> = (0..20)
        .map(|_| TestBar::new(100.0, 101.0, 99.0, 100.5))
        .collect();
    bars[12] = TestBar::new(100.0, 98.0, 99.0, 100.5);

    let mut engine = EngineBuilder::new().validate_data(true).build().unwrap();
    match engine.run(&bars) {
        Err(TrendError::InvalidOHLC { index, .. }) => assert_eq!(index, 12),
        other => panic!("expected InvalidOHLC, got {other:?}"),
    }

    // without validation the bad bar is just data
    let mut engine = EngineBuilder::new().build().unwrap();
    assert!(engine.run(&bars).is_ok());
}

#[test]
fn test_run_parallel_many_instruments() {
    let flat: Vec<Candle> = (0..30)
        .map(|i| Candle::new(100.0, 101.0 + (i % 2) as f64 * 0.5, 99.0, 100.5))
        .collect();
    let trend: Vec<Candle> = (0..50)
        .map(|i| {
            let base = 100.0 + i as f64;
            Candle::new(base, base + 1.5, base - 0.5, base + 1.0)
        })
        .collect();

    let instruments = vec![("FLAT", flat.as_slice()), ("TREND", trend.as_slice())];
    let (results, errors) = run_parallel(&EngineConfig::default(), instruments);

    assert!(errors.is_empty());
    assert_eq!(results.len(), 2);
    for result in &results {
        let expected = if result.symbol == "FLAT" { 30 } else { 50 };
        assert_eq!(result.reports.len(), expected);
    }
}
