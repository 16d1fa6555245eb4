//! Fast/slow moving average touch-crossover.

use super::{BarCursor, BreakoutPolicy};
use crate::{indicators::IndicatorSource, BarExt, Direction, OHLC};

/// Signal when the fast average touches or crosses the slow one, confirmed
/// by two closed bars whose bodies keep moving in the new direction.
///
/// The signal fires on the touch (`fast == slow`), one bar before a strict
/// crossover would be reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrossoverPolicy {
    pub slow_period: usize,
}

impl Default for CrossoverPolicy {
    fn default() -> Self {
        Self { slow_period: 13 }
    }
}

impl CrossoverPolicy {
    pub fn new(slow_period: usize) -> Self {
        Self { slow_period }
    }
}

impl BreakoutPolicy for CrossoverPolicy {
    fn capacity(&self) -> usize {
        3
    }

    fn can_process(&self, cursor: &BarCursor) -> bool {
        cursor.last_closed >= self.slow_period.max(1)
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

        let i = cursor.last_closed;
        let (fast, slow) = (indicators.fast_ma(bars, i), indicators.slow_ma(bars, i));
        let (fast_prev, slow_prev) = (
            indicators.fast_ma(bars, i - 1),
            indicators.slow_ma(bars, i - 1),
        );

        if fast >= slow && fast_prev < slow_prev {
            Direction::Up
        } else if fast <= slow && fast_prev > slow_prev {
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
        let last = cursor.last_closed;
        if !cursor.bar_closed || last == against {
            return None;
        }

        let (bar, other) = (&bars[last], &bars[against]);
        let confirmed = match dir {
            Direction::Up => bar.body_higher(other),
            Direction::Down => bar.body_lower(other),
            Direction::None => false,
        };
        confirmed.then_some(last)
    }
}
