//! Congestion box detection and its breakout lifecycle.
//!
//! A congestion is a window of bars whose bodies stay inside the high/low of
//! one reference bar, allowing a few bars to poke out slightly. Once a box is
//! seeded, every following bar is replayed through a small state machine:
//!
//! ```text
//! Inside ──breakout──▶ Breakout ──trade beyond breakout bar──▶ Confirmed
//!   ▲                   │   ▲                                  │  │
//!   │         close inside   └──────── opposite breakout ───────┘  │
//!   │                   ▼                                          │
//!   └────────────── Reset / Fakeout ◀──── close inside ────────────┘
//!
//! Confirmed ──barsToCancel bars outside──▶ Canceled ──▶ None
//! ```

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::{BarExt, Direction, Period, Ratio, Result, TrendError, OHLC};

// ============================================================
// CONFIG
// ============================================================

/// Congestion detection parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CongestionConfig {
    /// Bars before the last bar that form the search window (window = N + 1 bars)
    pub min_congestion_bars: Period,
    /// How many bars may poke out of the reference bar's range
    pub bars_allowed_outside: usize,
    /// Largest allowed outside area as a fraction of the bar's body
    pub area_allowed_outside: Ratio,
    /// Bars after confirmation that cancel the box
    pub bars_to_cancel: Period,
    /// How many of the tallest window bars are tried as reference bar
    pub reference_candidates: Period,
}

impl Default for CongestionConfig {
    fn default() -> Self {
        Self {
            min_congestion_bars: Period::new_const(8),
            bars_allowed_outside: 2,
            area_allowed_outside: Ratio::new_const(0.5),
            bars_to_cancel: Period::new_const(6),
            reference_candidates: Period::new_const(3),
        }
    }
}

impl CongestionConfig {
    pub fn validate(&self) -> Result<()> {
        let window = self.min_congestion_bars.get() + 1;
        if self.reference_candidates.get() > window {
            return Err(TrendError::InvalidConfig(format!(
                "reference_candidates ({}) exceeds the congestion window ({window} bars)",
                self.reference_candidates.get()
            )));
        }
        if self.bars_allowed_outside > window {
            return Err(TrendError::InvalidConfig(format!(
                "bars_allowed_outside ({}) exceeds the congestion window ({window} bars)",
                self.bars_allowed_outside
            )));
        }
        Ok(())
    }
}

// ============================================================
// STATE
// ============================================================

/// Lifecycle of a congestion box
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BoxState {
    #[default]
    None,
    Inside,
    Breakout,
    Reset,
    Fakeout,
    Confirmed,
    Canceled,
}

/// Copy of the box's observable fields
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BoxSnapshot {
    pub state: BoxState,
    pub dir: Direction,
    pub start_bar: usize,
    pub end_bar: usize,
    pub start_y: f64,
    pub end_y: f64,
    pub reference_bar: Option<usize>,
    pub breakout_bar: Option<usize>,
    pub confirmation_bar: Option<usize>,
}

// ============================================================
// BOX
// ============================================================

/// The live congestion box of one engine run.
///
/// `start_y` is the top of the box (reference bar's high), `end_y` the
/// bottom (reference bar's low).
#[derive(Debug, Clone)]
pub struct CongestionBox {
    config: CongestionConfig,

    start_bar: usize,
    end_bar: usize,
    start_y: f64,
    end_y: f64,

    state: BoxState,
    dir: Direction,

    reference_bar: Option<usize>,
    breakout_bar: Option<usize>,
    confirmation_bar: Option<usize>,
}

impl Default for CongestionBox {
    fn default() -> Self {
        Self::new(CongestionConfig::default())
    }
}

impl CongestionBox {
    pub fn new(config: CongestionConfig) -> Self {
        Self {
            config,
            start_bar: 0,
            end_bar: 0,
            start_y: 0.0,
            end_y: 0.0,
            state: BoxState::None,
            dir: Direction::None,
            reference_bar: None,
            breakout_bar: None,
            confirmation_bar: None,
        }
    }

    #[inline]
    pub fn state(&self) -> BoxState {
        self.state
    }

    #[inline]
    pub fn dir(&self) -> Direction {
        self.dir
    }

    #[inline]
    pub fn start_bar(&self) -> usize {
        self.start_bar
    }

    #[inline]
    pub fn end_bar(&self) -> usize {
        self.end_bar
    }

    #[inline]
    pub fn start_y(&self) -> f64 {
        self.start_y
    }

    #[inline]
    pub fn end_y(&self) -> f64 {
        self.end_y
    }

    #[inline]
    pub fn reference_bar(&self) -> Option<usize> {
        self.reference_bar
    }

    #[inline]
    pub fn breakout_bar(&self) -> Option<usize> {
        self.breakout_bar
    }

    #[inline]
    pub fn confirmation_bar(&self) -> Option<usize> {
        self.confirmation_bar
    }

    pub fn config(&self) -> &CongestionConfig {
        &self.config
    }

    pub fn snapshot(&self) -> BoxSnapshot {
        BoxSnapshot {
            state: self.state,
            dir: self.dir,
            start_bar: self.start_bar,
            end_bar: self.end_bar,
            start_y: self.start_y,
            end_y: self.end_y,
            reference_bar: self.reference_bar,
            breakout_bar: self.breakout_bar,
            confirmation_bar: self.confirmation_bar,
        }
    }

    // ===========================================
    // Bar tests
    // ===========================================

    fn closed_inside<T: OHLC>(&self, bar: &T) -> bool {
        self.end_y < bar.close() && bar.close() < self.start_y
    }

    /// Body beyond either boundary; top is tested first.
    fn breakout_dir<T: OHLC>(&self, bar: &T) -> Option<Direction> {
        if bar.top() > self.start_y {
            Some(Direction::Up)
        } else if bar.bottom() < self.end_y {
            Some(Direction::Down)
        } else {
            None
        }
    }

    /// Body beyond the boundary opposite to the current direction
    fn reverse_breakout_dir<T: OHLC>(&self, bar: &T) -> Option<Direction> {
        match self.dir {
            Direction::Down if bar.top() > self.start_y => Some(Direction::Up),
            Direction::Up if bar.bottom() < self.end_y => Some(Direction::Down),
            _ => None,
        }
    }

    // ===========================================
    // Finding
    // ===========================================

    /// Checks that bars `sb..=eb` form a congestion inside `[ey, sy]`.
    ///
    /// A bar whose body pokes out must do so by at most
    /// `area_allowed_outside` of its body, and at most `bars_allowed_outside`
    /// bars may poke out at all. A zero body with any outside area fails.
    pub fn is_congestion<T: OHLC>(&self, bars: &[T], sb: usize, eb: usize, sy: f64, ey: f64) -> bool {
        let allowed_area = self.config.area_allowed_outside.get();
        let mut outside = 0usize;

        for bar in &bars[sb..=eb] {
            let area = bar.area_outside(sy, ey);
            if area > 0.0 {
                let body = bar.body();
                if body == 0.0 || area / body > allowed_area {
                    return false;
                }

                outside += 1;
                if outside > self.config.bars_allowed_outside {
                    return false;
                }
            }
        }

        true
    }

    /// Picks a reference bar for the window `sb..=eb`.
    ///
    /// Candidates are the tallest `reference_candidates` bars, tried from the
    /// shortest of them toward the tallest. Zero-range bars and bars taller
    /// than `max_bar_height(index)` are skipped.
    fn reference_candidate<T: OHLC>(
        &self,
        bars: &[T],
        sb: usize,
        eb: usize,
        max_bar_height: &mut impl FnMut(usize) -> f64,
    ) -> Option<usize> {
        let mut by_height: Vec<usize> = (sb..=eb).collect();
        by_height.sort_by(|&a, &b| bars[a].height().total_cmp(&bars[b].height()));

        let skip = by_height
            .len()
            .saturating_sub(self.config.reference_candidates.get());

        by_height.into_iter().skip(skip).find(|&i| {
            let bar = &bars[i];
            bar.height() > 0.0
                && bar.height() <= max_bar_height(i)
                && self.is_congestion(bars, sb, eb, bar.high(), bar.low())
        })
    }

    /// An `Inside` box already spans exactly this bar's range
    fn holds_range<T: OHLC>(&self, bar: &T) -> bool {
        self.state == BoxState::Inside && bar.high() == self.start_y && bar.low() == self.end_y
    }

    /// Looks for a new or wider congestion ending at `last`.
    ///
    /// Returns true when the box geometry was (re)seeded.
    pub fn find<T: OHLC>(
        &mut self,
        bars: &[T],
        last: usize,
        mut max_bar_height: impl FnMut(usize) -> f64,
    ) -> bool {
        let span = self.config.min_congestion_bars.get();
        if last < span {
            return false;
        }

        let eb = last;
        let Some(reference) = self.reference_candidate(bars, last - span, eb, &mut max_bar_height)
        else {
            return false;
        };
        if Some(reference) == self.reference_bar || self.holds_range(&bars[reference]) {
            return false;
        }

        let sy = bars[reference].high();
        let ey = bars[reference].low();
        let mut found = false;
        let mut sb = Some(last - span);

        while let Some(start) = sb {
            if eb - start > span || !self.is_congestion(bars, start, eb, sy, ey) {
                break;
            }

            self.reference_bar = Some(reference);
            self.start_bar = start;
            self.end_bar = eb;
            self.start_y = sy;
            self.end_y = ey;
            found = true;

            sb = start.checked_sub(1);
        }

        if found {
            debug!(
                reference,
                start_bar = self.start_bar,
                end_bar = self.end_bar,
                top = self.start_y,
                bottom = self.end_y,
                "congestion box seeded"
            );
        }

        found
    }

    // ===========================================
    // State machine
    // ===========================================

    /// Moves a pending breakout to `Confirmed` if bar `idx` trades beyond the
    /// breakout bar. Safe to call on every tick of a forming bar.
    pub fn confirm_breakout<T: OHLC>(&mut self, bars: &[T], idx: usize) -> bool {
        if self.state != BoxState::Breakout {
            return false;
        }
        let Some(breakout) = self.breakout_bar else {
            return false;
        };

        if bars[idx].confirms_trend(self.dir, &bars[breakout]) {
            self.state = BoxState::Confirmed;
            self.confirmation_bar = Some(idx);
            trace!(bar = idx, dir = ?self.dir, "breakout confirmed");
            return true;
        }

        false
    }

    /// Replays bars `from..=max(last, end_bar)` through the state machine.
    pub fn recalc<T: OHLC>(&mut self, bars: &[T], from: usize, last: usize) {
        if self.state == BoxState::None {
            return;
        }

        let through = last.max(self.end_bar);
        for i in from..=through {
            self.step(bars, i);
        }
    }

    fn step<T: OHLC>(&mut self, bars: &[T], i: usize) {
        let bar = &bars[i];
        let before = self.state;

        match self.state {
            BoxState::Inside | BoxState::Reset | BoxState::Fakeout => {
                self.dir = Direction::None;
                self.state = BoxState::Inside;
                self.end_bar = i;

                if let Some(dir) = self.breakout_dir(bar) {
                    self.dir = dir;
                    self.state = BoxState::Breakout;
                    self.breakout_bar = Some(i);
                }
            }
            BoxState::Breakout => {
                if self.closed_inside(bar) {
                    self.state = BoxState::Reset;
                    self.dir = Direction::None;
                    self.end_bar = i;
                } else if self.confirm_breakout(bars, i) {
                    // state already moved to Confirmed
                } else if let Some(dir) = self.reverse_breakout_dir(bar) {
                    self.dir = dir;
                    self.breakout_bar = Some(i);
                    self.end_bar = i;
                }
            }
            BoxState::Confirmed => {
                if self.closed_inside(bar) {
                    self.state = BoxState::Fakeout;
                    self.dir = Direction::None;
                    self.end_bar = i;
                } else if let Some(dir) = self.reverse_breakout_dir(bar) {
                    // boundaries stay those of the original box
                    self.dir = dir;
                    self.state = BoxState::Breakout;
                    self.breakout_bar = Some(i);
                    self.end_bar = i;
                } else if let Some(confirmed) = self.confirmation_bar {
                    if i.saturating_sub(confirmed) >= self.config.bars_to_cancel.get() {
                        self.state = BoxState::Canceled;
                        self.dir = Direction::None;
                    }
                }
            }
            BoxState::Canceled => {
                self.state = BoxState::None;
            }
            BoxState::None => {}
        }

        if self.state != before {
            trace!(bar = i, from = ?before, to = ?self.state, dir = ?self.dir, "box transition");
        }
    }

    /// Per-bar entry point: seeds a new box when a better congestion shows
    /// up, otherwise replays only `last`.
    pub fn process<T: OHLC>(
        &mut self,
        bars: &[T],
        last: usize,
        max_bar_height: impl FnMut(usize) -> f64,
    ) -> bool {
        if self.find(bars, last, max_bar_height) {
            self.state = BoxState::Inside;
            self.dir = Direction::None;
            self.recalc(bars, self.start_bar, last);

            // a box whose reference bar is the last bar cannot have broken out yet
            if self.reference_bar == Some(last) {
                self.state = BoxState::Inside;
                self.dir = Direction::None;
            }
            true
        } else {
            self.recalc(bars, last, last);
            false
        }
    }

    /// Forget everything, back to a freshly constructed box
    pub fn reset(&mut self) {
        *self = Self::new(self.config.clone());
    }
}

// ============================================================
// TESTS
// ============================================================
