//! Indicator values consumed by the detectors.
//!
//! The core never computes moving averages or swing levels itself; it asks an
//! [`IndicatorSource`]. [`DefaultIndicators`] is a ready-made source built on
//! exponential moving averages, an average true range and trailing swing
//! extremes.
//!
//! Moving averages and bar heights are only requested for closed bars, so
//! implementations may memoize them. Swing levels may be requested at the
//! forming bar and must depend only on the bars before it. Call
//! [`IndicatorSource::reset`] before feeding a different series.

use crate::{engine::EngineConfig, BarExt, OHLC};

/// Numeric inputs of the breakout detectors and the congestion finder
pub trait IndicatorSource {
    /// Fast moving average at bar `index`
    fn fast_ma<T: OHLC>(&mut self, bars: &[T], index: usize) -> f64;

    /// Slow moving average at bar `index`
    fn slow_ma<T: OHLC>(&mut self, bars: &[T], index: usize) -> f64;

    /// Swing high in effect at bar `index`
    fn swing_high<T: OHLC>(&mut self, bars: &[T], index: usize) -> f64;

    /// Swing low in effect at bar `index`
    fn swing_low<T: OHLC>(&mut self, bars: &[T], index: usize) -> f64;

    /// Tallest bar `index` may be to serve as a congestion reference bar
    fn max_bar_height<T: OHLC>(&mut self, bars: &[T], index: usize) -> f64;

    /// Drop memoized values
    fn reset(&mut self) {}

    /// Adopt the periods of an engine configuration. Called once when the
    /// engine is built; sources with their own parameters keep them.
    fn configure(&mut self, _config: &EngineConfig) {}
}

// ============================================================
// DEFAULT SOURCE
// ============================================================

/// EMA fast/slow averages, ATR-capped reference height and trailing swings
#[derive(Debug, Clone)]
pub struct DefaultIndicators {
    fast: Ema,
    slow: Ema,
    atr: Atr,
    swing_period: usize,
    bar_height_factor: f64,
}

impl Default for DefaultIndicators {
    fn default() -> Self {
        Self::new(7, 13, 14, 2.0, 5)
    }
}

impl DefaultIndicators {
    pub fn new(
        fast_period: usize,
        slow_period: usize,
        atr_period: usize,
        bar_height_factor: f64,
        swing_period: usize,
    ) -> Self {
        Self {
            fast: Ema::new(fast_period),
            slow: Ema::new(slow_period),
            atr: Atr::new(atr_period),
            swing_period,
            bar_height_factor,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(
            config.crossover.fast_period.get(),
            config.crossover.slow_period.get(),
            config.atr_period.get(),
            config.bar_height_factor,
            config.swing.period.get(),
        )
    }
}

impl IndicatorSource for DefaultIndicators {
    fn fast_ma<T: OHLC>(&mut self, bars: &[T], index: usize) -> f64 {
        self.fast.value_at(bars, index)
    }

    fn slow_ma<T: OHLC>(&mut self, bars: &[T], index: usize) -> f64 {
        self.slow.value_at(bars, index)
    }

    fn swing_high<T: OHLC>(&mut self, bars: &[T], index: usize) -> f64 {
        swing_high(bars, index, self.swing_period)
    }

    fn swing_low<T: OHLC>(&mut self, bars: &[T], index: usize) -> f64 {
        swing_low(bars, index, self.swing_period)
    }

    fn max_bar_height<T: OHLC>(&mut self, bars: &[T], index: usize) -> f64 {
        self.atr.value_at(bars, index) * self.bar_height_factor
    }

    fn reset(&mut self) {
        self.fast.reset();
        self.slow.reset();
        self.atr.reset();
    }

    fn configure(&mut self, config: &EngineConfig) {
        *self = Self::from_config(config);
    }
}

// ============================================================
// EMA
// ============================================================

/// Exponential moving average of closes.
///
/// Seeded with the first close: EMA[0] = close[0],
/// EMA[t] = close[t] * k + EMA[t-1] * (1 - k), k = 2 / (period + 1).
#[derive(Debug, Clone)]
pub struct Ema {
    period: usize,
    values: Vec<f64>,
}

impl Ema {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "EMA period must be >= 1");
        Self {
            period,
            values: Vec::new(),
        }
    }

    pub fn period(&self) -> usize {
        self.period
    }

    /// EMA at `index`, extending the memoized series as needed
    pub fn value_at<T: OHLC>(&mut self, bars: &[T], index: usize) -> f64 {
        let k = 2.0 / (self.period as f64 + 1.0);
        while self.values.len() <= index {
            let i = self.values.len();
            let close = bars[i].close();
            let value = match self.values.last() {
                Some(prev) => close * k + prev * (1.0 - k),
                None => close,
            };
            self.values.push(value);
        }
        self.values[index]
    }

    pub fn reset(&mut self) {
        self.values.clear();
    }
}

/// EMA over a whole series
pub fn ema_series<T: OHLC>(bars: &[T], period: usize) -> Vec<f64> {
    if bars.is_empty() {
        return Vec::new();
    }
    let mut ema = Ema::new(period);
    ema.value_at(bars, bars.len() - 1);
    ema.values
}

// ============================================================
// ATR
// ============================================================

/// Average true range.
///
/// ATR[0] = high - low. Afterwards the true range is averaged over
/// min(index + 1, period) bars: a plain running mean until the period is
/// full, Wilder smoothing after that.
#[derive(Debug, Clone)]
pub struct Atr {
    period: usize,
    values: Vec<f64>,
}

impl Atr {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "ATR period must be >= 1");
        Self {
            period,
            values: Vec::new(),
        }
    }

    pub fn value_at<T: OHLC>(&mut self, bars: &[T], index: usize) -> f64 {
        while self.values.len() <= index {
            let i = self.values.len();
            let value = match self.values.last() {
                None => bars[0].height(),
                Some(&prev) => {
                    let n = (i + 1).min(self.period) as f64;
                    let tr = true_range(&bars[i], bars[i - 1].close());
                    ((n - 1.0) * prev + tr) / n
                }
            };
            self.values.push(value);
        }
        self.values[index]
    }

    pub fn reset(&mut self) {
        self.values.clear();
    }
}

/// max(high - low, |high - prev_close|, |low - prev_close|)
#[inline]
pub fn true_range<T: OHLC>(bar: &T, prev_close: f64) -> f64 {
    let hl = bar.high() - bar.low();
    let hc = (bar.high() - prev_close).abs();
    let lc = (bar.low() - prev_close).abs();
    hl.max(hc).max(lc)
}

// ============================================================
// SWINGS
// ============================================================

/// Highest high of the `period` bars before `index`.
///
/// Bar `index` itself is excluded so that it can be tested against the
/// level. At `index == 0` the bar's own high is returned.
pub fn swing_high<T: OHLC>(bars: &[T], index: usize, period: usize) -> f64 {
    if index == 0 {
        return bars[0].high();
    }
    bars[index.saturating_sub(period)..index]
        .iter()
        .map(|b| b.high())
        .fold(f64::NEG_INFINITY, f64::max)
}

/// Lowest low of the `period` bars before `index`
pub fn swing_low<T: OHLC>(bars: &[T], index: usize, period: usize) -> f64 {
    if index == 0 {
        return bars[0].low();
    }
    bars[index.saturating_sub(period)..index]
        .iter()
        .map(|b| b.low())
        .fold(f64::INFINITY, f64::min)
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Candle;

    fn closes(values: &[f64]) -> Vec<Candle> {
        values
            .iter()
            .map(|&c| Candle::new(c, c + 1.0, c - 1.0, c))
            .collect()
    }

    #[test]
    fn test_ema_seed_and_recursion() {
        let bars = closes(&[10.0, 12.0, 14.0]);
        let mut ema = Ema::new(3);
        // k = 0.5
        assert_eq!(ema.value_at(&bars, 0), 10.0);
        assert_eq!(ema.value_at(&bars, 1), 11.0);
        assert_eq!(ema.value_at(&bars, 2), 12.5);
    }

    #[test]
    fn test_ema_memo_matches_series() {
        let bars = closes(&[5.0, 6.0, 4.0, 8.0, 9.0, 7.0]);
        let series = ema_series(&bars, 4);
        let mut ema = Ema::new(4);
        for (i, expected) in series.iter().enumerate().rev() {
            assert_eq!(ema.value_at(&bars, i), *expected);
        }
        assert!(ema_series::<Candle>(&[], 4).is_empty());
    }

    #[test]
    fn test_atr_running_then_wilder() {
        let bars = vec![
            Candle::new(10.0, 11.0, 9.0, 10.0),  // height 2
            Candle::new(10.0, 14.0, 10.0, 13.0), // tr = max(4, 4, 0) = 4
            Candle::new(13.0, 13.5, 12.5, 13.0), // tr = 1
        ];
        let mut atr = Atr::new(2);
        assert_eq!(atr.value_at(&bars, 0), 2.0);
        // n = 2: (1 * 2 + 4) / 2
        assert_eq!(atr.value_at(&bars, 1), 3.0);
        // n = 2: (1 * 3 + 1) / 2
        assert_eq!(atr.value_at(&bars, 2), 2.0);
    }

    #[test]
    fn test_true_range_gap() {
        let bar = Candle::new(20.0, 21.0, 19.0, 20.5);
        assert_eq!(true_range(&bar, 15.0), 6.0);
        assert_eq!(true_range(&bar, 20.0), 2.0);
    }

    #[test]
    fn test_swing_window_excludes_index() {
        let bars = vec![
            Candle::new(10.0, 15.0, 9.0, 10.0),
            Candle::new(10.0, 12.0, 8.0, 10.0),
            Candle::new(10.0, 11.0, 7.0, 10.0),
            Candle::new(10.0, 30.0, 1.0, 10.0),
        ];
        assert_eq!(swing_high(&bars, 3, 5), 15.0);
        assert_eq!(swing_low(&bars, 3, 5), 7.0);
        assert_eq!(swing_high(&bars, 3, 2), 12.0);
        assert_eq!(swing_low(&bars, 0, 5), 9.0);
    }

    #[test]
    fn test_default_source_reset() {
        let bars = closes(&[10.0, 12.0, 14.0]);
        let mut source = DefaultIndicators::default();
        let before = source.slow_ma(&bars, 2);

        let other = closes(&[50.0, 40.0, 30.0]);
        source.reset();
        let after = source.slow_ma(&other, 2);
        assert_ne!(before, after);
        assert_eq!(source.max_bar_height(&other, 0), 4.0);
    }

    #[test]
    fn test_configure_from_engine_config() {
        let mut config = EngineConfig::default();
        config.bar_height_factor = 3.0;
        config.swing.period = crate::Period::new(2).unwrap();

        let mut source = DefaultIndicators::default();
        source.configure(&config);

        let bars = vec![
            Candle::new(10.0, 15.0, 9.0, 10.0),
            Candle::new(10.0, 12.0, 8.0, 10.0),
            Candle::new(10.0, 11.0, 7.0, 10.0),
            Candle::new(10.0, 11.0, 9.0, 10.0),
        ];
        assert_eq!(source.max_bar_height(&bars, 0), 18.0);
        assert_eq!(source.swing_high(&bars, 3), 12.0);
    }
}
