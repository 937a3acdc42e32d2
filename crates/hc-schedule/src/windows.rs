//! Free-window feasibility queries over an operator's day.
//!
//! A *window* `(a, b)` is a maximal interval during which the operator
//! could service a visit happening in a target municipality: the gaps of
//! the existing itinerary, each shrunk by the travel needed to reach the
//! target from the preceding stop and to reach the following stop from the
//! target.  Windows with `a > b` are dropped.
//!
//! These queries feed both the dispatcher's candidate enumeration and the
//! fleet-wide possible-visits tables behind the robustness estimator.

use hc_core::time::{INTRA_MUN_TIME, PAT_DAY_END, PAT_DAY_START, TIME_UNIT};
use hc_core::{Minute, MunicipalityId, OperatorId};
use hc_spatial::CommutingGraph;

use crate::store::Stop;

// ── OperatorDay ───────────────────────────────────────────────────────────────

/// The slice of operator state the window and slack computations need for
/// one day.  A value snapshot — callers rebuild it after mutating the
/// operator's day window.
#[derive(Copy, Clone, Debug)]
pub struct OperatorDay {
    pub operator: OperatorId,
    pub home: MunicipalityId,
    /// False when the operator does not work this day at all.
    pub available: bool,
    /// Start of the working window (day-relative minutes).
    pub open: Minute,
    /// End of the working window.
    pub close: Minute,
}

// ── Window construction ───────────────────────────────────────────────────────

/// Free windows during which `op` could service a visit in `target`, given
/// the day itinerary `stops` (sorted by start time).
pub fn municipality_windows(
    graph: &CommutingGraph,
    op: &OperatorDay,
    stops: &[Stop],
    target: MunicipalityId,
) -> Vec<(Minute, Minute)> {
    if !op.available {
        return vec![];
    }

    let mut windows = Vec::with_capacity(stops.len() + 1);
    let mut push = |a: Minute, b: Minute| {
        if a <= b {
            windows.push((a, b));
        }
    };

    if stops.is_empty() {
        let d = graph.travel_time(op.home, target);
        push(op.open + d, op.close - d);
        return windows;
    }

    let first = &stops[0];
    let last = &stops[stops.len() - 1];

    // Before the first stop.
    push(
        op.open + graph.travel_time(op.home, target),
        first.start - graph.travel_time(first.municipality, target),
    );

    // Between consecutive stops.
    for pair in stops.windows(2) {
        push(
            pair[0].end + graph.travel_time(pair[0].municipality, target),
            pair[1].start - graph.travel_time(pair[1].municipality, target),
        );
    }

    // After the last stop.
    push(
        last.end + graph.travel_time(last.municipality, target),
        op.close - graph.travel_time(op.home, target),
    );

    windows
}

// ── Window combinators ────────────────────────────────────────────────────────

/// Intersect windows with `[from, to]`, dropping the ones fully outside.
pub fn clip_windows(
    windows: &[(Minute, Minute)],
    from: Minute,
    to: Minute,
) -> Vec<(Minute, Minute)> {
    windows
        .iter()
        .filter(|&&(a, b)| b >= from && a <= to)
        .map(|&(a, b)| (a.max(from), b.min(to)))
        .collect()
}

/// How many back-to-back visits of `duration` (separated by the
/// intra-municipality hop) fit across the windows.
pub fn count_fitting_visits(windows: &[(Minute, Minute)], duration: Minute) -> u32 {
    windows
        .iter()
        .map(|&(a, b)| ((b - a + INTRA_MUN_TIME) / (duration + INTRA_MUN_TIME)).max(0) as u32)
        .sum()
}

/// `true` if some window fully contains `[start, end]`.
pub fn contains_period(windows: &[(Minute, Minute)], start: Minute, end: Minute) -> bool {
    windows.iter().any(|&(a, b)| a <= start && end <= b)
}

/// Grid-aligned start candidates in `[PAT_DAY_START, PAT_DAY_END − duration]`
/// such that some window contains the whole visit.
pub fn start_times(windows: &[(Minute, Minute)], duration: Minute) -> Vec<Minute> {
    let mut times = Vec::new();
    let mut t = PAT_DAY_START;
    while t <= PAT_DAY_END - duration {
        if contains_period(windows, t, t + duration) {
            times.push(t);
        }
        t += TIME_UNIT;
    }
    times
}
