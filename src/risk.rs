//! Per-bar risk, range and distance from the 21-period EMA, in ticks.

use serde::{Deserialize, Serialize};

use crate::{indicators::ema_series, Period, Result, TrendError, OHLC};

/// Risk figures of one bar
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskMetrics {
    /// Bar range in whole ticks
    pub range_ticks: f64,
    /// Money at risk across the bar plus one tick each side
    pub risk: f64,
    /// Ticks between the bar and the EMA, 0 when the bar touches it
    pub rule21_ticks: f64,
}

/// Instrument-aware risk calculator
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskCalculator {
    tick_size: f64,
    point_value: f64,
    ema_period: Period,
}

impl RiskCalculator {
    pub fn new(tick_size: f64, point_value: f64) -> Result<Self> {
        if !tick_size.is_finite() || tick_size <= 0.0 {
            return Err(TrendError::InvalidValue("tick_size must be positive and finite"));
        }
        if !point_value.is_finite() || point_value <= 0.0 {
            return Err(TrendError::InvalidValue("point_value must be positive and finite"));
        }
        Ok(Self {
            tick_size,
            point_value,
            ema_period: Period::new_const(21),
        })
    }

    pub fn with_ema_period(mut self, period: Period) -> Self {
        self.ema_period = period;
        self
    }

    pub fn ema_period(&self) -> Period {
        self.ema_period
    }

    /// Metrics of `bar` against an EMA value. Ticks round half to even.
    pub fn at<T: OHLC>(&self, bar: &T, ema: f64) -> RiskMetrics {
        let tick = self.tick_size;
        let range_ticks = ((bar.high() - bar.low()).abs() / tick).round_ties_even();
        let risk = (range_ticks + 2.0) * self.point_value * tick;

        let below = (ema - bar.high()).max(0.0) / tick;
        let above = (bar.low() - ema).max(0.0) / tick;
        let rule21_ticks = below.max(above).round_ties_even();

        RiskMetrics {
            range_ticks,
            risk,
            rule21_ticks,
        }
    }

    /// Metrics for every bar of a series
    pub fn compute<T: OHLC>(&self, bars: &[T]) -> Vec<RiskMetrics> {
        let ema = ema_series(bars, self.ema_period.get());
        bars.iter()
            .zip(ema)
            .map(|(bar, ema)| self.at(bar, ema))
            .collect()
    }
}
