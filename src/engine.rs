//! Trend engine: drives the congestion box and both breakout detectors over a
//! bar series and classifies the trend bar by bar.
//!
//! The host calls [`TrendEngine::on_bar_close`] once per bar and, for a live
//! feed, [`TrendEngine::on_tick`] on every later price change of the forming
//! bar. [`TrendEngine::process`] maps a host's single "first tick of bar"
//! callback onto those two. [`TrendEngine::run`] replays a whole history.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    breakout::{BarCursor, BreakoutDetector, CrossoverPolicy, SwingPolicy},
    congestion::{BoxSnapshot, BoxState, CongestionBox, CongestionConfig},
    indicators::{DefaultIndicators, IndicatorSource},
    BarExt, BreakoutMethod, Direction, Period, Result, TrendError, OHLC,
};

// ============================================================
// CONFIG
// ============================================================

/// Moving average crossover settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrossoverConfig {
    pub fast_period: Period,
    pub slow_period: Period,
}

impl Default for CrossoverConfig {
    fn default() -> Self {
        Self {
            fast_period: Period::new_const(7),
            slow_period: Period::new_const(13),
        }
    }
}

/// Swing breakout settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwingConfig {
    /// Lookback of the swing high/low
    pub period: Period,
}

impl Default for SwingConfig {
    fn default() -> Self {
        Self {
            period: Period::new_const(5),
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub congestion: CongestionConfig,
    pub crossover: CrossoverConfig,
    pub swing: SwingConfig,
    /// ATR length. Nothing is evaluated before this many bars exist.
    pub atr_period: Period,
    /// A reference bar may not be taller than ATR times this
    pub bar_height_factor: f64,
    /// Only evaluate the last N bars of the supplied series
    pub recent_bars_only: Option<Period>,
    /// Check OHLC consistency before a batch run
    pub validate_data: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            congestion: CongestionConfig::default(),
            crossover: CrossoverConfig::default(),
            swing: SwingConfig::default(),
            atr_period: Period::new_const(14),
            bar_height_factor: 2.0,
            recent_bars_only: None,
            validate_data: false,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        self.congestion.validate()?;

        let (fast, slow) = (
            self.crossover.fast_period.get(),
            self.crossover.slow_period.get(),
        );
        if fast >= slow {
            return Err(TrendError::InvalidConfig(format!(
                "fast_period ({fast}) must be shorter than slow_period ({slow})"
            )));
        }

        if !self.bar_height_factor.is_finite() || self.bar_height_factor <= 0.0 {
            return Err(TrendError::InvalidValue(
                "bar_height_factor must be positive and finite",
            ));
        }

        Ok(())
    }

    /// Bars that must exist before the engine evaluates anything
    #[inline]
    pub fn warmup_bars(&self) -> usize {
        self.atr_period.get()
    }
}

// ============================================================
// FEED / EVENTS / REPORTS
// ============================================================

/// Whether the bar handed to [`TrendEngine::on_bar_close`] is complete
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Feed {
    /// Bar `current` is closed
    #[default]
    Historical,
    /// Bar `current` just opened, `current - 1` is the last closed bar
    Realtime,
}

/// Notifications raised by the engine, at most once per occurrence.
///
/// `bar` is the bar being evaluated when the event was raised.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum TrendEvent {
    NewCongestion {
        bar: usize,
        reference_bar: usize,
        start_bar: usize,
        top: f64,
        bottom: f64,
    },
    Breakout {
        bar: usize,
        breakout_bar: usize,
        direction: Direction,
    },
    BreakoutConfirmed {
        bar: usize,
        confirmation_bar: usize,
        direction: Direction,
    },
    BreakoutReset {
        bar: usize,
    },
    BreakoutFakeout {
        bar: usize,
    },
    CongestionCanceled {
        bar: usize,
    },
    TrendChanged {
        bar: usize,
        direction: Direction,
        method: BreakoutMethod,
    },
}

impl TrendEvent {
    pub fn bar(&self) -> usize {
        match *self {
            TrendEvent::NewCongestion { bar, .. }
            | TrendEvent::Breakout { bar, .. }
            | TrendEvent::BreakoutConfirmed { bar, .. }
            | TrendEvent::BreakoutReset { bar }
            | TrendEvent::BreakoutFakeout { bar }
            | TrendEvent::CongestionCanceled { bar }
            | TrendEvent::TrendChanged { bar, .. } => bar,
        }
    }
}

/// Current engine outputs
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendSnapshot {
    /// Last evaluated bar, `None` before the first call
    pub bar: Option<usize>,
    pub trend: Direction,
    pub method: BreakoutMethod,
    pub congestion: BoxSnapshot,
}

/// Outputs after one bar of a batch run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarReport {
    pub index: usize,
    pub trend: Direction,
    pub method: BreakoutMethod,
    pub congestion: BoxSnapshot,
    pub events: Vec<TrendEvent>,
}

// ============================================================
// BUILDER
// ============================================================

/// Builds a [`TrendEngine`], validating its configuration
pub struct EngineBuilder<I: IndicatorSource = DefaultIndicators> {
    indicators: I,
    config: EngineConfig,
}

impl Default for EngineBuilder<DefaultIndicators> {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder<DefaultIndicators> {
    pub fn new() -> Self {
        Self {
            indicators: DefaultIndicators::default(),
            config: EngineConfig::default(),
        }
    }
}

impl<I: IndicatorSource> EngineBuilder<I> {
    /// Change indicator source
    pub fn indicators<I2: IndicatorSource>(self, indicators: I2) -> EngineBuilder<I2> {
        EngineBuilder {
            indicators,
            config: self.config,
        }
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn congestion(mut self, congestion: CongestionConfig) -> Self {
        self.config.congestion = congestion;
        self
    }

    /// Enable/disable data validation
    pub fn validate_data(mut self, enable: bool) -> Self {
        self.config.validate_data = enable;
        self
    }

    /// Only evaluate the last `bars` bars of a series
    pub fn recent_bars_only(mut self, bars: Period) -> Self {
        self.config.recent_bars_only = Some(bars);
        self
    }

    /// Build the engine
    pub fn build(self) -> Result<TrendEngine<I>> {
        self.config.validate()?;
        let mut indicators = self.indicators;
        indicators.configure(&self.config);
        Ok(TrendEngine::new(self.config, indicators))
    }
}

// ============================================================
// ENGINE
// ============================================================

/// Congestion, breakout and trend state of one bar series
#[derive(Debug, Clone)]
pub struct TrendEngine<I: IndicatorSource = DefaultIndicators> {
    config: EngineConfig,
    indicators: I,
    congestion: CongestionBox,
    crossover: BreakoutDetector<CrossoverPolicy>,
    swing: BreakoutDetector<SwingPolicy>,
    trend: Vec<Direction>,
    method: BreakoutMethod,
    last_bar: Option<usize>,
    // once-per-occurrence guards
    last_reference: Option<usize>,
    last_confirmation: Option<usize>,
    last_breakout: Option<usize>,
    last_reversal: Option<usize>,
}

impl<I: IndicatorSource> TrendEngine<I> {
    fn new(config: EngineConfig, indicators: I) -> Self {
        Self {
            congestion: CongestionBox::new(config.congestion.clone()),
            crossover: BreakoutDetector::new(CrossoverPolicy::new(
                config.crossover.slow_period.get(),
            )),
            swing: BreakoutDetector::new(SwingPolicy::new(config.swing.period.get())),
            config,
            indicators,
            trend: Vec::new(),
            method: BreakoutMethod::None,
            last_bar: None,
            last_reference: None,
            last_confirmation: None,
            last_breakout: None,
            last_reversal: None,
        }
    }

    // ===========================================
    // Entry points
    // ===========================================

    /// Full evaluation, once per bar.
    ///
    /// With [`Feed::Historical`] bar `current` is complete; with
    /// [`Feed::Realtime`] it has just opened and `current - 1` is the bar that
    /// closed.
    pub fn on_bar_close<T: OHLC>(
        &mut self,
        bars: &[T],
        current: usize,
        feed: Feed,
    ) -> Vec<TrendEvent> {
        self.carry_trend(current);
        if self.skip(bars, current) {
            return Vec::new();
        }

        let cursor = match feed {
            Feed::Historical => BarCursor::historical(current),
            Feed::Realtime => BarCursor::bar_open(current),
        };
        let mut events = Vec::new();

        let indicators = &mut self.indicators;
        self.congestion
            .process(bars, cursor.last_closed, |i| indicators.max_bar_height(bars, i));

        self.evaluate(bars, &cursor, &mut events);
        self.on_box_state(&cursor, &mut events);

        events
    }

    /// Intra-bar evaluation of the forming bar `current`: live breakout
    /// confirmation, swing confirmation and loss of trend only.
    pub fn on_tick<T: OHLC>(&mut self, bars: &[T], current: usize) -> Vec<TrendEvent> {
        if self.skip(bars, current) {
            return Vec::new();
        }
        if self.trend.len() <= current {
            self.carry_trend(current);
        }

        let cursor = BarCursor::tick(current);
        let mut events = Vec::new();
        self.evaluate(bars, &cursor, &mut events);
        events
    }

    /// Single host callback: historical bars and first ticks go to
    /// [`on_bar_close`](Self::on_bar_close), later ticks to
    /// [`on_tick`](Self::on_tick).
    pub fn process<T: OHLC>(
        &mut self,
        bars: &[T],
        current: usize,
        feed: Feed,
        first_tick: bool,
    ) -> Vec<TrendEvent> {
        match feed {
            Feed::Realtime if !first_tick => self.on_tick(bars, current),
            _ => self.on_bar_close(bars, current, feed),
        }
    }

    /// Replay a closed history from scratch, one report per bar
    pub fn run<T: OHLC>(&mut self, bars: &[T]) -> Result<Vec<BarReport>> {
        if self.config.validate_data {
            for (index, bar) in bars.iter().enumerate() {
                bar.validate().map_err(|e| match e {
                    TrendError::InvalidOHLC { reason, .. } => {
                        TrendError::InvalidOHLC { index, reason }
                    }
                    other => other,
                })?;
            }
        }

        self.reset();
        let mut reports = Vec::with_capacity(bars.len());
        for index in 0..bars.len() {
            let events = self.on_bar_close(bars, index, Feed::Historical);
            reports.push(BarReport {
                index,
                trend: self.trend[index],
                method: self.method,
                congestion: self.congestion.snapshot(),
                events,
            });
        }
        Ok(reports)
    }

    /// Forget all state, including memoized indicator values
    pub fn reset(&mut self) {
        self.congestion.reset();
        self.crossover = BreakoutDetector::new(CrossoverPolicy::new(
            self.config.crossover.slow_period.get(),
        ));
        self.swing = BreakoutDetector::new(SwingPolicy::new(self.config.swing.period.get()));
        self.indicators.reset();
        self.trend.clear();
        self.method = BreakoutMethod::None;
        self.last_bar = None;
        self.last_reference = None;
        self.last_confirmation = None;
        self.last_breakout = None;
        self.last_reversal = None;
    }

    // ===========================================
    // Outputs
    // ===========================================

    /// Trend of the last evaluated bar
    pub fn trend(&self) -> Direction {
        self.trend.last().copied().unwrap_or_default()
    }

    pub fn trend_at(&self, index: usize) -> Option<Direction> {
        self.trend.get(index).copied()
    }

    pub fn trend_series(&self) -> &[Direction] {
        &self.trend
    }

    /// Trend as +1 / -1 / 0 per bar
    pub fn discrete_series(&self) -> Vec<i8> {
        self.trend.iter().map(|d| d.as_discrete()).collect()
    }

    /// Detector behind the last trend decision
    pub fn method(&self) -> BreakoutMethod {
        self.method
    }

    pub fn congestion(&self) -> &CongestionBox {
        &self.congestion
    }

    pub fn snapshot(&self) -> TrendSnapshot {
        TrendSnapshot {
            bar: self.last_bar,
            trend: self.trend(),
            method: self.method,
            congestion: self.congestion.snapshot(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn indicators(&self) -> &I {
        &self.indicators
    }

    // ===========================================
    // Internals
    // ===========================================

    fn skip<T: OHLC>(&self, bars: &[T], current: usize) -> bool {
        if current < self.config.warmup_bars() {
            return true;
        }
        match self.config.recent_bars_only {
            Some(recent) => bars.len() - current > recent.get(),
            None => false,
        }
    }

    /// Start bar `current` with the previous bar's trend
    fn carry_trend(&mut self, current: usize) {
        let prev = current
            .checked_sub(1)
            .and_then(|p| self.trend.get(p).copied())
            .unwrap_or_default();
        if self.trend.len() <= current {
            self.trend.resize(current + 1, prev);
        } else {
            self.trend[current] = prev;
        }
        self.last_bar = Some(current);
    }

    fn set_trend(&mut self, index: usize, dir: Direction) {
        self.trend[index] = dir;
    }

    fn previous_trend(&self, current: usize) -> Direction {
        current
            .checked_sub(1)
            .and_then(|p| self.trend.get(p).copied())
            .unwrap_or_default()
    }

    /// Work shared by bar close and ticks
    fn evaluate<T: OHLC>(
        &mut self,
        bars: &[T],
        cursor: &BarCursor,
        events: &mut Vec<TrendEvent>,
    ) {
        let current = cursor.current;
        self.congestion.confirm_breakout(bars, current);

        if self.congestion.state() == BoxState::Confirmed {
            let dir = self.congestion.dir();
            self.set_trend(current, dir);

            if let Some(confirmation_bar) = self.congestion.confirmation_bar() {
                if self.last_confirmation != Some(confirmation_bar) {
                    self.last_confirmation = Some(confirmation_bar);
                    emit(
                        events,
                        TrendEvent::BreakoutConfirmed {
                            bar: current,
                            confirmation_bar,
                            direction: dir,
                        },
                    );
                }
            }
        }

        if self.congestion.state() == BoxState::None {
            if let Some(event) = self.classify(bars, cursor) {
                emit(events, event);
            }
        }
    }

    /// Trend reversal from the breakout detectors, or loss of trend
    fn classify<T: OHLC>(&mut self, bars: &[T], cursor: &BarCursor) -> Option<TrendEvent> {
        let current = cursor.current;
        if self.last_reversal == Some(current) {
            return None;
        }

        let last = self.previous_trend(current);
        let mut next = last;

        let crossed = self.crossover.find(bars, cursor, &mut self.indicators);
        if crossed {
            next = self.crossover.dir();
            self.method = BreakoutMethod::Crossover;
        }

        let swung = self.swing.find(bars, cursor, &mut self.indicators);
        if swung {
            next = self.swing.dir();
            self.method = BreakoutMethod::Swing;
        }

        if crossed && swung {
            self.method = BreakoutMethod::Both;
        }

        let mut lost = false;
        if !crossed && !swung {
            let bar = &bars[current];
            lost = match last {
                Direction::Down => bar.high() >= self.indicators.swing_high(bars, current),
                Direction::Up => bar.low() <= self.indicators.swing_low(bars, current),
                Direction::None => false,
            };
            if lost {
                next = Direction::None;
                self.method = BreakoutMethod::Lost;
            }
        }

        self.set_trend(current, next);

        if (crossed || swung || lost) && next != last {
            self.last_reversal = Some(current);
            return Some(TrendEvent::TrendChanged {
                bar: current,
                direction: next,
                method: self.method,
            });
        }

        None
    }

    /// Once-per-bar reaction to the box state
    fn on_box_state(&mut self, cursor: &BarCursor, events: &mut Vec<TrendEvent>) {
        let current = cursor.current;

        match self.congestion.state() {
            state @ (BoxState::Inside | BoxState::Reset | BoxState::Fakeout) => {
                self.swing.reset();
                self.crossover.reset();
                self.set_trend(current, Direction::None);

                match state {
                    BoxState::Inside => {
                        let reference = self.congestion.reference_bar();
                        if let Some(reference_bar) = reference {
                            if self.last_reference != reference {
                                self.last_reference = reference;
                                emit(
                                    events,
                                    TrendEvent::NewCongestion {
                                        bar: current,
                                        reference_bar,
                                        start_bar: self.congestion.start_bar(),
                                        top: self.congestion.start_y(),
                                        bottom: self.congestion.end_y(),
                                    },
                                );
                            }
                        }
                    }
                    BoxState::Reset => emit(events, TrendEvent::BreakoutReset { bar: current }),
                    _ => emit(events, TrendEvent::BreakoutFakeout { bar: current }),
                }
            }
            BoxState::Breakout => {
                self.set_trend(current, Direction::None);

                if let Some(breakout_bar) = self.congestion.breakout_bar() {
                    if self.last_breakout != Some(breakout_bar) {
                        self.last_breakout = Some(breakout_bar);
                        emit(
                            events,
                            TrendEvent::Breakout {
                                bar: current,
                                breakout_bar,
                                direction: self.congestion.dir(),
                            },
                        );
                    }
                }
            }
            BoxState::Canceled => {
                let prev = self.previous_trend(current);
                self.set_trend(current, prev);
                emit(events, TrendEvent::CongestionCanceled { bar: current });
            }
            BoxState::Confirmed | BoxState::None => {}
        }
    }
}

fn emit(events: &mut Vec<TrendEvent>, event: TrendEvent) {
    debug!(bar = event.bar(), event = ?event, "trend event");
    events.push(event);
}

// ============================================================
// TESTS
// ============================================================
