//! Swing extreme breakout.

use super::{BarCursor, BreakoutPolicy};
use crate::{indicators::IndicatorSource, BarExt, Direction, OHLC};

/// Signal when a closed bar's body leaves the swing range, confirmed as soon
/// as the live bar trades beyond the signal bar's wick.
///
/// Only the first bar of a run outside the range signals: the previous bar
/// must still be inside the levels that preceded it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwingPolicy {
    pub period: usize,
}

impl Default for SwingPolicy {
    fn default() -> Self {
        Self { period: 5 }
    }
}

impl SwingPolicy {
    pub fn new(period: usize) -> Self {
        Self { period }
    }
}

impl BreakoutPolicy for SwingPolicy {
    fn capacity(&self) -> usize {
        2
    }

    fn can_process(&self, cursor: &BarCursor) -> bool {
        cursor.current >= self.period.max(2) && cursor.last_closed >= 1
    }

    fn detect<T: OHLC, I: IndicatorSource>(
        &self,
        bars: &[T],
        cursor: &BarCursor,
        indicators: &mut I,
    ) -> Direction {
        if !cursor.bar_closed {
            return Direction::None;
        }

        // each bar against the levels that precede it
        let i = cursor.last_closed;
        let (prev, curr) = (&bars[i - 1], &bars[i]);
        let (prev_high, prev_low) = (
            indicators.swing_high(bars, i - 1),
            indicators.swing_low(bars, i - 1),
        );
        let (high, low) = (indicators.swing_high(bars, i), indicators.swing_low(bars, i));

        if prev.top() <= prev_high && curr.top() > high {
            Direction::Up
        } else if prev.bottom() >= prev_low && curr.bottom() < low {
            Direction::Down
        } else {
            Direction::None
        }
    }

    fn confirm<T: OHLC>(
        &self,
        bars: &[T],
        cursor: &BarCursor,
        dir: Direction,
        against: usize,
    ) -> Option<usize> {
        let current = cursor.current;
        bars[current]
            .confirms_trend(dir, &bars[against])
            .then_some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breakout::{fixture::FixedIndicators, BreakoutDetector};
    use crate::indicators::DefaultIndicators;
    use crate::Candle;

    fn levels(high: f64, low: f64) -> FixedIndicators {
        FixedIndicators {
            swing_high: high,
            swing_low: low,
            ..Default::default()
        }
    }

    fn flat(n: usize) -> Vec<Candle> {
        vec![Candle::new(100.0, 101.0, 99.0, 100.5); n]
    }

    #[test]
    fn test_swing_needs_history() {
        let policy = SwingPolicy::default();
        assert!(!policy.can_process(&BarCursor::historical(4)));
        assert!(policy.can_process(&BarCursor::historical(5)));
        assert!(policy.can_process(&BarCursor::tick(5)));
    }

    #[test]
    fn test_swing_low_break_confirmed_intra_bar() {
        let mut bars = flat(10);
        bars[6] = Candle::new(98.0, 98.5, 95.5, 96.0); // bottom 96
        bars[7] = Candle::new(96.0, 96.5, 93.5, 94.0); // bottom 94 < 95
        bars[8] = Candle::new(94.0, 94.2, 93.8, 94.0); // forming
        let mut indicators = levels(105.0, 95.0);
        let mut detector = BreakoutDetector::new(SwingPolicy::default());

        assert!(!detector.find(&bars, &BarCursor::bar_open(8), &mut indicators));
        assert_eq!(detector.dir(), Direction::Down);
        assert_eq!(detector.pending(), &[7]);

        // live bar trades to 93, below the signal bar's 93.5 low
        bars[8] = Candle::new(94.0, 94.2, 93.0, 93.2);
        assert!(detector.find(&bars, &BarCursor::tick(8), &mut indicators));
        assert!(detector.pending().is_empty());
    }

    #[test]
    fn test_swing_detect_only_on_close() {
        let mut bars = flat(10);
        bars[7] = Candle::new(100.0, 107.0, 99.0, 106.0);
        let mut indicators = levels(105.0, 95.0);
        let policy = SwingPolicy::default();

        assert_eq!(
            policy.detect(&bars, &BarCursor::historical(7), &mut indicators),
            Direction::Up
        );
        assert_eq!(
            policy.detect(&bars, &BarCursor::tick(8), &mut indicators),
            Direction::None
        );
    }

    #[test]
    fn test_swing_requires_previous_inside() {
        let mut bars = flat(10);
        bars[6] = Candle::new(104.0, 107.0, 103.0, 106.0);
        bars[7] = Candle::new(106.0, 108.0, 105.0, 107.0);
        let mut indicators = levels(105.0, 95.0);
        let policy = SwingPolicy::default();

        assert_eq!(
            policy.detect(&bars, &BarCursor::historical(7), &mut indicators),
            Direction::None
        );
    }

    #[test]
    fn test_swing_steady_climb_confirms_first_signal() {
        let mut bars = flat(6);
        bars.extend((6..12).map(|i| {
            let base = 100.0 + (i - 5) as f64 * 3.0;
            Candle::new(base, base + 2.5, base - 0.5, base + 2.0)
        }));
        let mut indicators = DefaultIndicators::default();
        let mut detector = BreakoutDetector::new(SwingPolicy::default());

        assert!(!detector.find(&bars, &BarCursor::historical(6), &mut indicators));
        assert_eq!(detector.pending(), &[6]);

        // bar 7 also clears its window but bar 6 was already outside
        assert_eq!(
            detector
                .policy()
                .detect(&bars, &BarCursor::historical(7), &mut indicators),
            Direction::None
        );
        assert!(detector.find(&bars, &BarCursor::historical(7), &mut indicators));
    }

    #[test]
    fn test_swing_historical_confirms_on_later_bar() {
        let mut bars = flat(10);
        bars[7] = Candle::new(100.0, 107.0, 99.0, 106.0);
        bars[8] = Candle::new(106.0, 106.5, 104.0, 105.0); // no higher high
        bars[9] = Candle::new(105.0, 108.0, 104.5, 107.5);
        let mut indicators = levels(105.0, 95.0);
        let mut detector = BreakoutDetector::new(SwingPolicy::default());

        // a bar cannot confirm itself
        assert!(!detector.find(&bars, &BarCursor::historical(7), &mut indicators));
        assert_eq!(detector.pending(), &[7]);
        assert!(!detector.find(&bars, &BarCursor::historical(8), &mut indicators));
        assert!(detector.find(&bars, &BarCursor::historical(9), &mut indicators));
    }
}
