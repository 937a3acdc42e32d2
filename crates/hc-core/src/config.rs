//! The immutable configuration bundle passed at model construction.
//!
//! Every probability knob, cost weight, and magic coefficient of the
//! simulation lives here; nothing reads ambient global state.  The defaults
//! reproduce the baseline week: 5 days, events calibrated per day, ±5 min
//! travel noise, a 10/25/60 triangular prolong distribution.

use crate::time::Minute;

// ── Dispatch level ────────────────────────────────────────────────────────────

/// Strategy level of the online dispatcher, from cheapest to most thorough.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum DispatchLevel {
    /// Only preferred operators, only the proposed start time.
    Dummy,
    /// Uniform random choice among feasible (operator, start) pairs.
    Random,
    /// Minimize the objective-delta criticality factor.
    Optimizer,
    /// Objective-delta × time-offset × fleet-robustness criticality.
    Robust,
}

// ── SimParams ─────────────────────────────────────────────────────────────────

/// Top-level simulation configuration.
///
/// Constructed by the harness (typically from the hyperparameter JSON plus
/// overrides) and handed to the model builder; immutable afterwards.
#[derive(Clone, Debug)]
pub struct SimParams {
    // ── Horizon ───────────────────────────────────────────────────────────
    pub n_days: usize,
    pub n_municipalities: usize,

    // ── Objective weights ─────────────────────────────────────────────────
    pub c_wage: f64,
    pub c_movement: f64,
    pub c_overskill: f64,
    pub c_execution: f64,
    pub big_m: f64,

    // ── Wage formula ──────────────────────────────────────────────────────
    /// Base wage per minute.
    pub sigma0: f64,
    /// Additional wage per minute per skill level.
    pub sigma1: f64,
    /// Overtime premium (overtime minutes are paid `1 + omega` times).
    pub omega: f64,

    // ── Unexpected-event frequencies (expected count per day) ─────────────
    pub new_visit_per_day: f64,
    pub single_cancellation_per_day: f64,
    pub all_cancellations_per_day: f64,
    pub new_patient_per_day: f64,
    pub quit_day_per_day: f64,
    pub late_entry_per_day: f64,
    pub early_exit_per_day: f64,

    // ── Perturbation draws ────────────────────────────────────────────────
    /// Probability that a started visit runs long (triangular draw below).
    pub prolonged_visit_probability: f64,
    /// Probability that a departure hits prolonged travel.
    pub prolonged_travel_probability: f64,
    /// Triangular prolong distribution, minutes.
    pub prolong_min: Minute,
    pub prolong_mode: Minute,
    pub prolong_max: Minute,
    /// Uniform noise bound applied when no prolong event fires.
    pub noise_time: Minute,
    /// Windows during which the prolonged-travel probability doubles,
    /// day-relative minutes (07:30–09:30 and 17:00–20:00 by default).
    pub rush_windows: Vec<(Minute, Minute)>,

    // ── Patient dynamics ──────────────────────────────────────────────────
    /// Probability that a non-premium patient requests a skill-1 visit.
    pub high_skill_probability: f64,

    // ── Dispatcher ────────────────────────────────────────────────────────
    pub dispatch_level: DispatchLevel,
    /// When false the dispatcher never runs (baseline drift measurement).
    pub manager_enabled: bool,
    /// When false the mutation algebra never shrinks/stretches to absorb
    /// delays — overruns propagate raw.
    pub handle_delay: bool,

    // ── Reproducibility ───────────────────────────────────────────────────
    /// Master RNG seed.  The same seed and inputs produce identical timelines.
    pub seed: u64,
}

impl Default for SimParams {
    fn default() -> Self {
        SimParams {
            n_days: 5,
            n_municipalities: 11,

            c_wage: 1.0,
            c_movement: 1.0,
            c_overskill: 0.0,
            c_execution: 1000.0,
            big_m: 1000.0,

            sigma0: 0.3,
            sigma1: 0.1,
            omega: 0.27,

            new_visit_per_day: 4.0,
            single_cancellation_per_day: 2.0,
            all_cancellations_per_day: 0.2,
            new_patient_per_day: 1.0,
            quit_day_per_day: 0.1,
            late_entry_per_day: 1.0,
            early_exit_per_day: 1.0,

            prolonged_visit_probability: 0.1,
            prolonged_travel_probability: 0.02,
            prolong_min: 10,
            prolong_mode: 25,
            prolong_max: 60,
            noise_time: 5,
            rush_windows: vec![(60, 180), (630, 810)],

            high_skill_probability: 0.05,

            dispatch_level: DispatchLevel::Robust,
            manager_enabled: true,
            handle_delay: true,

            seed: 0,
        }
    }
}

impl SimParams {
    /// Wage per minute for an operator of the given skill.
    #[inline]
    pub fn wage_per_minute(&self, skill: u8) -> f64 {
        self.sigma0 + skill as f64 * self.sigma1
    }

    /// Coefficient applied to the prolonged-travel draw: 0.5 inside a rush
    /// window (halving the draw doubles the hit probability), 1 elsewhere.
    pub fn rush_coefficient(&self, time: Minute) -> f64 {
        if self.rush_windows.iter().any(|&(a, b)| time >= a && time < b) {
            0.5
        } else {
            1.0
        }
    }
}
