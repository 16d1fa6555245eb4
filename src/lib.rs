//! # trendbox - congestion box, breakout and trend reversal detection
//!
//! Bar-by-bar state machines that find price congestion ("boxes"), follow
//! breakouts out of them through confirmation, fakeout and cancellation, and
//! classify trend reversals from a moving-average crossover and a swing
//! breakout detector.
//!
//! ## Quick Start
//!
//! ```rust
//! use trendbox::prelude::*;
//!
//! // Define your OHLC data
//! struct Bar { o: f64, h: f64, l: f64, c: f64 }
//!
//! impl OHLC for Bar {
//!     fn open(&self) -> f64 { self.o }
//!     fn high(&self) -> f64 { self.h }
//!     fn low(&self) -> f64 { self.l }
//!     fn close(&self) -> f64 { self.c }
//! }
//!
//! // Create engine with default configuration and indicators
//! let mut engine = EngineBuilder::new().build().unwrap();
//!
//! // Replay your history
//! let bars: Vec<Bar> = vec![];
//! let reports = engine.run(&bars).unwrap();
//! assert!(reports.is_empty());
//! ```

pub mod breakout;
pub mod congestion;
pub mod engine;
pub mod indicators;
pub mod params;
pub mod risk;

pub mod prelude {
    pub use crate::{
        // Detectors
        breakout::{BarCursor, BreakoutDetector, BreakoutPolicy, CrossoverPolicy, SwingPolicy},
        // Congestion
        congestion::{BoxSnapshot, BoxState, CongestionBox, CongestionConfig},
        // Engine
        engine::{
            BarReport, CrossoverConfig, EngineBuilder, EngineConfig, Feed, SwingConfig,
            TrendEngine, TrendEvent, TrendSnapshot,
        },
        // Indicators
        indicators::{DefaultIndicators, IndicatorSource},
        // Parameters
        params::{get_period, get_ratio, ParamMeta, ParamType, Parameterized},
        // Risk
        risk::{RiskCalculator, RiskMetrics},
        // Parallel
        run_parallel,
        // Types
        BarExt,
        BreakoutMethod,
        Candle,
        Direction,
        Period,
        Ratio,
        // Errors
        Result,
        RunError,
        RunResult,
        TrendError,
        OHLC,
    };
}

// ============================================================
// ERRORS
// ============================================================

pub type Result<T> = std::result::Result<T, TrendError>;

/// Errors raised while configuring an engine or validating input data
#[derive(Debug, Clone, thiserror::Error)]
pub enum TrendError {
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

    #[error("Invalid OHLC at index {index}: {reason}")]
    InvalidOHLC { index: usize, reason: &'static str },
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
            return Err(TrendError::InvalidValue("Ratio cannot be NaN or infinite"));
        }
        if !(0.0..=1.0).contains(&value) {
            return Err(TrendError::OutOfRange {
                field: "Ratio",
                value,
                min: 0.0,
                max: 1.0,
            });
        }
        Ok(Self(value))
    }

    /// Create a Ratio from a compile-time constant (library internal use)
    #[doc(hidden)]
    pub const fn new_const(value: f64) -> Self {
        Self(value)
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

/// Period or bar count (must be > 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Period(usize);

impl Period {
    /// Create a new Period, validating value is > 0
    pub fn new(value: usize) -> Result<Self> {
        if value == 0 {
            return Err(TrendError::InvalidValue("Period must be > 0"));
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
// BAR VIEW
// ============================================================

/// Read-only view of one price bar
pub trait OHLC {
    fn open(&self) -> f64;
    fn high(&self) -> f64;
    fn low(&self) -> f64;
    fn close(&self) -> f64;

    fn timestamp(&self) -> Option<i64> {
        None
    }
}

impl<B: OHLC + ?Sized> OHLC for &B {
    fn open(&self) -> f64 {
        (**self).open()
    }

    fn high(&self) -> f64 {
        (**self).high()
    }

    fn low(&self) -> f64 {
        (**self).low()
    }

    fn close(&self) -> f64 {
        (**self).close()
    }

    fn timestamp(&self) -> Option<i64> {
        (**self).timestamp()
    }
}

/// Bar geometry and relational predicates.
///
/// Wick-inclusive comparisons (`traded_*`) use high/low, body comparisons use
/// top/bottom. No rounding is applied anywhere.
pub trait BarExt: OHLC {
    #[inline]
    fn body(&self) -> f64 {
        (self.open() - self.close()).abs()
    }

    /// Full candle height including the wicks
    #[inline]
    fn height(&self) -> f64 {
        self.high() - self.low()
    }

    /// Highest point of the body
    #[inline]
    fn top(&self) -> f64 {
        self.open().max(self.close())
    }

    /// Lowest point of the body
    #[inline]
    fn bottom(&self) -> f64 {
        self.open().min(self.close())
    }

    #[inline]
    fn traded_higher_than<B: OHLC + ?Sized>(&self, other: &B) -> bool {
        self.high() > other.high()
    }

    #[inline]
    fn traded_lower_than<B: OHLC + ?Sized>(&self, other: &B) -> bool {
        self.low() < other.low()
    }

    #[inline]
    fn body_higher<B: OHLC + ?Sized>(&self, other: &B) -> bool {
        self.top() > other.top()
    }

    #[inline]
    fn body_lower<B: OHLC + ?Sized>(&self, other: &B) -> bool {
        self.bottom() < other.bottom()
    }

    /// Body overshoot above `high` plus body overshoot below `low`
    #[inline]
    fn area_outside(&self, high: f64, low: f64) -> f64 {
        let above = self.top() - high;
        let below = low - self.bottom();
        above.max(0.0) + below.max(0.0)
    }

    /// Up: this bar traded above `other`. Down: traded below it.
    #[inline]
    fn confirms_trend<B: OHLC + ?Sized>(&self, dir: Direction, other: &B) -> bool {
        match dir {
            Direction::Up => self.traded_higher_than(other),
            Direction::Down => self.traded_lower_than(other),
            Direction::None => false,
        }
    }

    /// Validate OHLC data consistency
    fn validate(&self) -> Result<()> {
        if self.open().is_nan() || self.high().is_nan() || self.low().is_nan() || self.close().is_nan()
        {
            return Err(TrendError::InvalidOHLC {
                index: 0,
                reason: "NaN in OHLC",
            });
        }
        if self.open().is_infinite()
            || self.high().is_infinite()
            || self.low().is_infinite()
            || self.close().is_infinite()
        {
            return Err(TrendError::InvalidOHLC {
                index: 0,
                reason: "Infinite value in OHLC",
            });
        }
        if self.high() < self.low() {
            return Err(TrendError::InvalidOHLC {
                index: 0,
                reason: "high < low",
            });
        }
        Ok(())
    }
}

impl<T: OHLC + ?Sized> BarExt for T {}

/// Plain bar for hosts that do not bring their own type
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Candle {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl Candle {
    pub fn new(open: f64, high: f64, low: f64, close: f64) -> Self {
        Self {
            open,
            high,
            low,
            close,
            timestamp: None,
        }
    }
}

impl OHLC for Candle {
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

    fn timestamp(&self) -> Option<i64> {
        self.timestamp
    }
}

// ============================================================
// DIRECTION / METHOD
// ============================================================

/// Trend or breakout direction
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
pub enum Direction {
    #[default]
    None,
    Up,
    Down,
}

impl Direction {
    #[inline]
    pub fn is_up(self) -> bool {
        matches!(self, Direction::Up)
    }

    #[inline]
    pub fn is_down(self) -> bool {
        matches!(self, Direction::Down)
    }

    #[inline]
    pub fn opposite(self) -> Self {
        match self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
            Direction::None => Direction::None,
        }
    }

    /// +1 for Up, -1 for Down, 0 otherwise
    #[inline]
    pub fn as_discrete(self) -> i8 {
        match self {
            Direction::Up => 1,
            Direction::Down => -1,
            Direction::None => 0,
        }
    }
}

/// Which detector produced the last trend decision
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
pub enum BreakoutMethod {
    #[default]
    None,
    Crossover,
    Swing,
    Both,
    Lost,
}

// ============================================================
// PARALLEL REPLAY
// ============================================================

use rayon::prelude::*;

use engine::{BarReport, EngineBuilder, EngineConfig};

/// Result of replaying a single instrument
#[derive(Debug)]
pub struct RunResult {
    pub symbol: String,
    pub reports: Vec<BarReport>,
}

/// Error from replaying a single instrument
#[derive(Debug)]
pub struct RunError {
    pub symbol: String,
    pub error: TrendError,
}

/// Replay many instruments in parallel, one fresh engine per instrument.
///
/// Instruments are evaluated independently; nothing is shared between them.
pub fn run_parallel<'a, T, I>(config: &EngineConfig, instruments: I) -> (Vec<RunResult>, Vec<RunError>)
where
    T: OHLC + Sync + 'a,
    I: IntoParallelIterator<Item = (&'a str, &'a [T])>,
{
    let results: Vec<_> = instruments
        .into_par_iter()
        .map(|(symbol, bars)| {
            EngineBuilder::new()
                .config(config.clone())
                .build()
                .and_then(|mut engine| engine.run(bars))
                .map(|reports| RunResult {
                    symbol: symbol.to_string(),
                    reports,
                })
                .map_err(|error| RunError {
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
