//! Simulation time model.
//!
//! # Design
//!
//! The clock is minute-granular and day-relative: `Minute` counts minutes
//! since the working day opened at 06:30, so the operator-side day window is
//! `[0, 840]` (06:30–20:30) and the patient-side window is `[30, 810]`.
//! Scheduling decisions snap to a 15-minute grid (`TIME_UNIT`); the clock
//! itself always advances one minute per tick.
//!
//! `Minute` is a signed alias rather than a newtype: the mutation algebra is
//! wall-to-wall min/max arithmetic over gaps and deltas, and deltas are
//! routinely negative.  The typed IDs carry the strong typing where mixups
//! actually happen.

use std::fmt;

/// Minutes since 06:30 of the current day.  Deltas share the type.
pub type Minute = i32;

/// Zero-based day of the simulated week.
pub type Day = usize;

// ── Grid and window constants ─────────────────────────────────────────────────

/// Scheduling grid: visit start candidates snap to 15-minute slots.
pub const TIME_UNIT: Minute = 15;

/// Travel time between two points inside the same municipality.
pub const INTRA_MUN_TIME: Minute = 15;

/// Operator day window (06:30–20:30).
pub const OP_DAY_START: Minute = 0;
pub const OP_DAY_END: Minute = 840;

/// Patient day window (07:00–20:00) — visits may only start/end inside it.
pub const PAT_DAY_START: Minute = 30;
pub const PAT_DAY_END: Minute = 810;

/// No operation (scheduling, cancellation) may touch today's timeline less
/// than this many minutes ahead of the current time.
pub const MIN_NOTICE: Minute = 120;

/// Extra delay an itinerary may absorb beyond its computed slack before the
/// dispatcher starts descheduling.
pub const MAX_ALLOWED_DELAY: Minute = 60;

/// A visit may shrink to at most this fraction below its scheduled duration.
pub const SHORTEN_PCT: f64 = 0.15;

/// Clock value past which the run is declared broken (unresolvable
/// congestion): 1110 minutes ≙ past midnight.
pub const BROKEN_TIME: Minute = 1110;

/// Sentinel: the day has not started yet (first tick will bring time to 0).
pub const NOT_STARTED: Minute = -1;

// ── Grid helpers ──────────────────────────────────────────────────────────────

/// Largest grid slot ≤ `m`.  `m` must be non-negative.
#[inline]
pub fn floor_to_grid(m: Minute) -> Minute {
    m / TIME_UNIT * TIME_UNIT
}

/// Smallest grid slot ≥ `m`.  `m` must be non-negative.
#[inline]
pub fn ceil_to_grid(m: Minute) -> Minute {
    (m + TIME_UNIT - 1) / TIME_UNIT * TIME_UNIT
}

// ── Clock ─────────────────────────────────────────────────────────────────────

/// The model's (day, minute) position.  Copied freely into step contexts.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Clock {
    pub day: Day,
    /// Minutes since 06:30, or [`NOT_STARTED`] before the day's first tick.
    pub time: Minute,
}

impl Clock {
    pub fn start() -> Self {
        Clock { day: 0, time: NOT_STARTED }
    }

    /// `true` before the per-day initialization has run.
    #[inline]
    pub fn not_started(&self) -> bool {
        self.time == NOT_STARTED
    }

    /// `true` strictly inside the patient activity window.
    #[inline]
    pub fn in_patient_window(&self) -> bool {
        self.time > PAT_DAY_START && self.time < PAT_DAY_END
    }

    /// `true` strictly inside the operator day window.
    #[inline]
    pub fn in_operator_window(&self) -> bool {
        self.time > OP_DAY_START && self.time < OP_DAY_END
    }
}

impl fmt::Display for Clock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "day {} {}", self.day, fmt_minute(self.time))
    }
}

/// Render a day-relative minute as wall-clock "HH:MM" (06:30 base).
pub fn fmt_minute(m: Minute) -> String {
    if m < 0 {
        return "--:--".to_string();
    }
    let wall = m + 6 * 60 + 30;
    format!("{:02}:{:02}", wall / 60 % 24, wall % 60)
}
