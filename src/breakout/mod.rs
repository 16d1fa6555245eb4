//! Two-phase trend reversal detectors.
//!
//! A detector first spots a signal bar, then waits for a fixed number of
//! confirmation bars. What counts as a signal and as a confirmation is a
//! [`BreakoutPolicy`]:
//!
//! - [`CrossoverPolicy`]: fast/slow moving average touch, two higher/lower bodies
//! - [`SwingPolicy`]: body beyond the swing extreme, one trade beyond that bar

use crate::{indicators::IndicatorSource, Direction, OHLC};

pub mod crossover;
pub mod swing;

pub use crossover::CrossoverPolicy;
pub use swing::SwingPolicy;

// ============================================================
// CURSOR
// ============================================================

/// Where the engine stands in the bar series on one call.
///
/// `current` is the bar being traded (it may still be forming), `last_closed`
/// the newest complete bar. `bar_closed` is true on the once-per-bar full
/// evaluation and false on intra-bar ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarCursor {
    pub current: usize,
    pub last_closed: usize,
    pub bar_closed: bool,
}

impl BarCursor {
    /// Replaying history: `index` itself is complete
    pub fn historical(index: usize) -> Self {
        Self {
            current: index,
            last_closed: index,
            bar_closed: true,
        }
    }

    /// First tick of a live bar: `current - 1` just closed
    pub fn bar_open(current: usize) -> Self {
        Self {
            current,
            last_closed: current - 1,
            bar_closed: true,
        }
    }

    /// Any later tick of a live bar
    pub fn tick(current: usize) -> Self {
        Self {
            current,
            last_closed: current - 1,
            bar_closed: false,
        }
    }
}

// ============================================================
// POLICY
// ============================================================

/// Signal and confirmation rules of one detector kind
pub trait BreakoutPolicy {
    /// Signal bar plus the number of confirmation bars
    fn capacity(&self) -> usize;

    /// Enough history to evaluate?
    fn can_process(&self, cursor: &BarCursor) -> bool;

    /// Direction of a fresh signal at the cursor, `Direction::None` otherwise
    fn detect<T: OHLC, I: IndicatorSource>(
        &self,
        bars: &[T],
        cursor: &BarCursor,
        indicators: &mut I,
    ) -> Direction;

    /// Index of the bar confirming `dir` against bar `against`, if any
    fn confirm<T: OHLC>(
        &self,
        bars: &[T],
        cursor: &BarCursor,
        dir: Direction,
        against: usize,
    ) -> Option<usize>;
}

// ============================================================
// DETECTOR
// ============================================================

/// Generic signal → confirmation state machine over a policy
#[derive(Debug, Clone)]
pub struct BreakoutDetector<P: BreakoutPolicy> {
    policy: P,
    dir: Direction,
    // bars[0] is the signal bar, the rest are confirmations
    bars: Vec<usize>,
}

impl<P: BreakoutPolicy + Default> Default for BreakoutDetector<P> {
    fn default() -> Self {
        Self::new(P::default())
    }
}

impl<P: BreakoutPolicy> BreakoutDetector<P> {
    pub fn new(policy: P) -> Self {
        let capacity = policy.capacity();
        Self {
            policy,
            dir: Direction::None,
            bars: Vec::with_capacity(capacity),
        }
    }

    /// Direction of the last signal
    #[inline]
    pub fn dir(&self) -> Direction {
        self.dir
    }

    /// Signal bar followed by the confirmations collected so far
    #[inline]
    pub fn pending(&self) -> &[usize] {
        &self.bars
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    /// Abandon a pending signal
    pub fn reset(&mut self) {
        self.bars.clear();
    }

    /// Returns true when a signal has collected all of its confirmations.
    ///
    /// A new signal and a confirmation of the pending one are tested
    /// independently on the same call.
    pub fn find<T: OHLC, I: IndicatorSource>(
        &mut self,
        bars: &[T],
        cursor: &BarCursor,
        indicators: &mut I,
    ) -> bool {
        if !self.policy.can_process(cursor) {
            return false;
        }

        let signal = self.policy.detect(bars, cursor, indicators);
        if signal != Direction::None {
            self.dir = signal;
            self.bars.clear();
            self.bars.push(cursor.last_closed);
        }

        let Some(&against) = self.bars.last() else {
            return false;
        };

        if let Some(confirmation) = self.policy.confirm(bars, cursor, self.dir, against) {
            self.bars.push(confirmation);
            if self.bars.len() >= self.policy.capacity() {
                self.bars.clear();
                return true;
            }
        }

        false
    }
}

#[cfg(test)]
pub(crate) mod fixture {
    use super::*;

    /// Indicator source with canned values
    #[derive(Debug, Clone, Default)]
    pub struct FixedIndicators {
        pub fast: Vec<f64>,
        pub slow: Vec<f64>,
        pub swing_high: f64,
        pub swing_low: f64,
    }

    impl IndicatorSource for FixedIndicators {
        fn fast_ma<T: OHLC>(&mut self, _bars: &[T], index: usize) -> f64 {
            self.fast[index]
        }

        fn slow_ma<T: OHLC>(&mut self, _bars: &[T], index: usize) -> f64 {
            self.slow[index]
        }

        fn swing_high<T: OHLC>(&mut self, _bars: &[T], _index: usize) -> f64 {
            self.swing_high
        }

        fn swing_low<T: OHLC>(&mut self, _bars: &[T], _index: usize) -> f64 {
            self.swing_low
        }

        fn max_bar_height<T: OHLC>(&mut self, _bars: &[T], _index: usize) -> f64 {
            f64::INFINITY
        }
    }
}
