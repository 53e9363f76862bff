//! Calendar context for delay features
//!
//! Season and weekday are read from a [`Clock`] so tests can pin time.

use chrono::{Datelike, Local, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Meteorological season by calendar month
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Season {
    Spring,
    Summer,
    Fall,
    Winter,
}

impl Season {
    pub const ALL: [Season; 4] = [Season::Spring, Season::Summer, Season::Fall, Season::Winter];

    /// Dec-Feb Winter, Mar-May Spring, Jun-Aug Summer, Sep-Nov Fall
    pub fn from_month(month: u32) -> Self {
        match month {
            3..=5 => Season::Spring,
            6..=8 => Season::Summer,
            9..=11 => Season::Fall,
            _ => Season::Winter,
        }
    }

    /// Class name used by the fitted season encoder
    pub fn as_str(&self) -> &'static str {
        match self {
            Season::Spring => "Spring",
            Season::Summer => "Summer",
            Season::Fall => "Fall",
            Season::Winter => "Winter",
        }
    }
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source of wall-clock time
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// Local system time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Clock pinned to a single instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(NaiveDateTime);

impl FixedClock {
    pub fn new(at: NaiveDateTime) -> Self {
        Self(at)
    }

    /// Midnight of the given date, `None` if the date is invalid
    pub fn on_date(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(Self)
    }
}

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

/// Derives season and weekday from a clock
#[derive(Clone)]
pub struct TemporalContext {
    clock: Arc<dyn Clock>,
}

impl TemporalContext {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    pub fn system() -> Self {
        Self::new(Arc::new(SystemClock))
    }

    pub fn fixed(clock: FixedClock) -> Self {
        Self::new(Arc::new(clock))
    }

    pub fn current_season(&self) -> Season {
        self.snapshot().0
    }

    /// Day of week, Monday = 0 through Sunday = 6
    pub fn current_weekday(&self) -> u32 {
        self.snapshot().1
    }

    /// Season and weekday taken from a single clock reading
    pub fn snapshot(&self) -> (Season, u32) {
        let now = self.clock.now();
        (
            Season::from_month(now.month()),
            now.weekday().num_days_from_monday(),
        )
    }
}

impl Default for TemporalContext {
    fn default() -> Self {
        Self::system()
    }
}

impl fmt::Debug for TemporalContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemporalContext")
            .field("now", &self.clock.now())
            .finish()
    }
}
