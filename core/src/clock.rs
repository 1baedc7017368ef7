//! Simulation clock: owns tick state, pause, and the simulated calendar.
//!
//! Ticks are pure counters. The calendar is derived from the configured
//! start date and never consults the wall clock.

use crate::types::{MonthIndex, RunId, Tick};
use chrono::{Datelike, Duration, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimClock {
    pub run_id:       RunId,
    /// The next tick to be processed.
    pub current_tick: Tick,
    pub start_date:   NaiveDateTime,
    pub paused:       bool,
}

impl SimClock {
    pub fn new(run_id: RunId, start_date: NaiveDateTime) -> Self {
        Self {
            run_id,
            current_tick: 0,
            start_date,
            paused: true,
        }
    }

    /// Claim the next tick. Returns the tick to process.
    /// Panics if called while paused, callers must check.
    pub fn advance(&mut self) -> Tick {
        assert!(!self.paused, "advance() called on paused clock");
        let tick = self.current_tick;
        self.current_tick += 1;
        tick
    }

    pub fn pause(&mut self)  { self.paused = true;  }
    pub fn resume(&mut self) { self.paused = false; }

    /// Calendar date-time of `tick`.
    pub fn date_at(&self, tick: Tick) -> NaiveDateTime {
        self.start_date + Duration::minutes(tick as i64)
    }

    pub fn month_of(&self, tick: Tick) -> MonthIndex {
        self.date_at(tick).month0() as MonthIndex
    }

    pub fn calendar_at(&self, tick: Tick) -> CalendarPoint {
        let date = self.date_at(tick);
        CalendarPoint {
            month:   date.month0() as MonthIndex,
            day:     date.day(),
            hour:    date.hour() as usize,
            weekday: date.weekday().num_days_from_monday() as usize,
        }
    }
}

/// Calendar coordinates of a tick, as used by the arrival profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarPoint {
    /// 0 = January.
    pub month:   MonthIndex,
    /// Day of month, 1-based.
    pub day:     u32,
    pub hour:    usize,
    /// 0 = Monday.
    pub weekday: usize,
}
