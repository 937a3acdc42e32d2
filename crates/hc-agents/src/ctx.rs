//! Shared step context and derived event probabilities.

use hc_core::time::{OP_DAY_END, PAT_DAY_END, PAT_DAY_START};
use hc_core::{Clock, Day, SimParams, SimRng};
use hc_schedule::VisitStore;
use hc_spatial::CommutingGraph;

// ── Event probabilities ───────────────────────────────────────────────────────

/// Per-tick probabilities derived once at model construction from the
/// configured per-day frequencies and the *initial* population size.
/// Patient-side frequencies are spread over the patient activity window and
/// shared across patients; operator-side frequencies over the operator day.
#[derive(Clone, Debug)]
pub struct EventProbs {
    pub new_visit: f64,
    pub single_cancellation: f64,
    pub all_cancellations: f64,
    pub new_patient: f64,
    pub quit_day: f64,
    pub late_entry: f64,
    pub early_exit: f64,
    pub extended_visit: f64,
    pub extended_travel: f64,
}

impl EventProbs {
    pub fn derive(params: &SimParams, n_patients: usize) -> EventProbs {
        let pat_window = (PAT_DAY_END - PAT_DAY_START) as f64;
        let per_patient = pat_window * n_patients.max(1) as f64;
        let op_day = OP_DAY_END as f64;

        EventProbs {
            new_visit: params.new_visit_per_day / per_patient,
            single_cancellation: params.single_cancellation_per_day / per_patient,
            all_cancellations: params.all_cancellations_per_day / per_patient,
            new_patient: params.new_patient_per_day / pat_window,
            quit_day: params.quit_day_per_day / op_day,
            late_entry: params.late_entry_per_day / op_day,
            early_exit: params.early_exit_per_day / op_day,
            extended_visit: params.prolonged_visit_probability,
            extended_travel: params.prolonged_travel_probability,
        }
    }
}

/// Weekday modulation of event draws: the raw uniform sample is multiplied
/// by this before comparison, so a smaller coefficient makes events more
/// likely toward the end of the week.
#[inline]
pub fn day_adjustment(day: Day, n_days: usize) -> f64 {
    (n_days as f64 - day as f64) / 3.0
}

// ── Run counters ──────────────────────────────────────────────────────────────

/// Counters accumulated across the run by agent steps and cascades.
#[derive(Clone, Debug, Default)]
pub struct RunCounters {
    /// Visits descheduled because an overrun exceeded the absorbable slack.
    pub overly_delayed_visits: u32,
}

// ── WorldCtx ──────────────────────────────────────────────────────────────────

/// Everything an agent step may touch, borrowed explicitly from the model.
///
/// The borrows are disjoint fields of the model, so patients, operators,
/// and the dispatcher can all be driven within one tick without cloning.
pub struct WorldCtx<'a> {
    pub graph: &'a mut CommutingGraph,
    pub visits: &'a mut VisitStore,
    pub clock: Clock,
    pub params: &'a SimParams,
    pub probs: &'a EventProbs,
    pub rng: &'a mut SimRng,
    pub counters: &'a mut RunCounters,
}
