//! The `Patient` agent.
//!
//! Patients are passive between events: each minute inside their activity
//! window they may request a new visit, cancel one scheduled visit, or
//! cancel everything and leave the roster.  Event probabilities are the
//! per-tick values derived at model build; draws are modulated so the later
//! weekdays see more churn.
//!
//! Preferences are derived, not stored: the operators and start times a
//! patient "prefers" are whoever served (or was proposed for) their visits
//! most often so far.

use rustc_hash::FxHashMap;

use tracing::debug;

use hc_core::time::{MIN_NOTICE, PAT_DAY_END, PAT_DAY_START, TIME_UNIT};
use hc_core::{Day, Minute, MunicipalityId, OperatorId, PatientId, VisitId};
use hc_schedule::{StateKind, VisitSpec, VisitStore};

use crate::ctx::{day_adjustment, WorldCtx};
use crate::operator::{Operator, OperatorState};

// ── Patient ───────────────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct Patient {
    pub id: PatientId,
    pub municipality: MunicipalityId,
    /// Premium patients only ever request skill-1 visits.
    pub premium: bool,
    pub assigned_operator: Option<OperatorId>,
    pub newly_generated: bool,

    // ── Stats ─────────────────────────────────────────────────────────────
    pub newly_generated_visits: u32,
    pub is_removed: bool,
}

impl Patient {
    pub fn new(
        id: PatientId,
        municipality: MunicipalityId,
        premium: bool,
        assigned_operator: Option<OperatorId>,
        newly_generated: bool,
    ) -> Patient {
        Patient {
            id,
            municipality,
            premium,
            assigned_operator,
            newly_generated,
            newly_generated_visits: 0,
            is_removed: false,
        }
    }

    // ── Preferences ───────────────────────────────────────────────────────

    /// Operators historically tied to this patient's visits (scheduled
    /// operator where placed, proposed operator otherwise), sorted by
    /// descending frequency.  Ties break on ascending operator ID, making
    /// the ordering an explicit policy rather than an accident of tallying.
    pub fn preferred_operators(&self, visits: &VisitStore) -> Vec<OperatorId> {
        let mut tally: FxHashMap<OperatorId, u32> = FxHashMap::default();
        for v in visits.of_patient(self.id) {
            let op = match v.placement() {
                Some(p) => Some(p.sched.operator),
                None => v.proposed_operator,
            };
            if let Some(op) = op {
                *tally.entry(op).or_insert(0) += 1;
            }
        }
        let mut ranked: Vec<(OperatorId, u32)> = tally.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        ranked.into_iter().map(|(op, _)| op).collect()
    }

    /// Proposed start times of this patient's visits, sorted by descending
    /// frequency (ties on ascending time).
    pub fn preferred_start_times(&self, visits: &VisitStore) -> Vec<Minute> {
        let mut tally: FxHashMap<Minute, u32> = FxHashMap::default();
        for v in visits.of_patient(self.id) {
            *tally.entry(v.proposed_start).or_insert(0) += 1;
        }
        let mut ranked: Vec<(Minute, u32)> = tally.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        ranked.into_iter().map(|(t, _)| t).collect()
    }

    // ── Visit generation ──────────────────────────────────────────────────

    fn select_skill(&self, ctx: &mut WorldCtx) -> u8 {
        if self.premium {
            1
        } else if ctx.rng.gen_bool(ctx.params.high_skill_probability) {
            1
        } else {
            0
        }
    }

    /// Weighted draw from the live duration distribution (of the common
    /// skill-0 pool, which defines the catalogue of offered durations).
    fn select_duration(&self, ctx: &mut WorldCtx) -> Option<Minute> {
        let distr = ctx.visits.duration_distribution(0);
        if distr.is_empty() {
            return None;
        }
        let roll: f64 = ctx.rng.random();
        let mut acc = 0.0;
        for &(duration, p) in &distr {
            acc += p;
            if roll < acc {
                return Some(duration);
            }
        }
        distr.last().map(|&(d, _)| d)
    }

    /// A start time on `day`: a preferred time if one is still reachable,
    /// otherwise a uniformly random grid slot.
    fn select_start_time(&self, duration: Minute, day: Day, ctx: &mut WorldCtx) -> Option<Minute> {
        let earliest = if day == ctx.clock.day && ctx.clock.time > PAT_DAY_START {
            ctx.clock.time
        } else {
            PAT_DAY_START
        };

        for pst in self.preferred_start_times(ctx.visits) {
            if pst >= earliest {
                return Some(pst);
            }
        }

        // Grid rounding: ceiling for the earliest feasible slot, floor for
        // the latest.
        let first_slot = hc_core::time::ceil_to_grid(earliest) / TIME_UNIT;
        let last_slot = (PAT_DAY_END - duration) / TIME_UNIT;
        match first_slot.cmp(&last_slot) {
            std::cmp::Ordering::Greater => None,
            std::cmp::Ordering::Equal => Some(first_slot * TIME_UNIT),
            std::cmp::Ordering::Less => {
                let slot = ctx.rng.gen_range(first_slot..last_slot);
                Some(slot * TIME_UNIT)
            }
        }
    }

    /// Pick a (day, start) among the remaining days without a proposed
    /// visit, trying days in random order.
    fn select_slot(&self, duration: Minute, ctx: &mut WorldCtx) -> Option<(Day, Minute)> {
        let mut candidate_days: Vec<Day> = (ctx.clock.day..ctx.params.n_days)
            .filter(|&d| {
                !ctx.visits
                    .of_patient(self.id)
                    .any(|v| v.proposed_day == d)
            })
            .collect();
        if candidate_days.is_empty() {
            return None;
        }
        ctx.rng.shuffle(&mut candidate_days);

        for day in candidate_days {
            if let Some(start) = self.select_start_time(duration, day, ctx) {
                return Some((day, start));
            }
        }
        None
    }

    /// Spawn a new NOT_SCHEDULED visit request; false if no slot was free.
    pub fn generate_new_visit(&mut self, ctx: &mut WorldCtx) -> bool {
        let skill = self.select_skill(ctx);
        let Some(duration) = self.select_duration(ctx) else {
            return false;
        };
        let Some((day, start)) = self.select_slot(duration, ctx) else {
            debug!(patient = %self.id, "no free slot for a new visit");
            return false;
        };

        let id = ctx.visits.add_proposed(VisitSpec {
            patient: self.id,
            municipality: self.municipality,
            skill,
            day,
            start,
            end: start + duration,
            operator: None,
            newly_generated: true,
        });
        self.newly_generated_visits += 1;
        debug!(patient = %self.id, visit = %id, day, start, "new visit requested");
        true
    }

    // ── Cancellations ─────────────────────────────────────────────────────

    /// Scheduled visits far enough in the future to be cancellable.
    pub fn cancellable_visits(&self, ctx: &WorldCtx) -> Vec<VisitId> {
        ctx.visits
            .of_patient(self.id)
            .filter(|v| v.kind() == StateKind::Scheduled)
            .filter(|v| {
                let real = v.real();
                real.day > ctx.clock.day
                    || (real.day == ctx.clock.day
                        && real.start > ctx.clock.time + MIN_NOTICE)
            })
            .map(|v| v.id)
            .collect()
    }

    /// Cancel one random cancellable visit; false if none qualify.
    pub fn cancel_visit(&mut self, operators: &mut [Operator], ctx: &mut WorldCtx) -> bool {
        let candidates = self.cancellable_visits(ctx);
        let Some(&victim) = ctx.rng.choose(&candidates) else {
            return false;
        };
        debug!(patient = %self.id, visit = %victim, "cancelling visit");
        remove_visit(victim, operators, ctx);
        true
    }

    /// Cancel everything cancellable and leave the roster.
    pub fn cancel_all_visits(&mut self, operators: &mut [Operator], ctx: &mut WorldCtx) -> bool {
        let candidates = self.cancellable_visits(ctx);
        if candidates.is_empty() {
            return false;
        }
        debug!(patient = %self.id, count = candidates.len(), "cancelling all visits");
        for victim in candidates {
            remove_visit(victim, operators, ctx);
        }
        self.is_removed = true;
        true
    }

    // ── Step ──────────────────────────────────────────────────────────────

    /// Advance the patient by one minute: inside the activity window, draw
    /// the three independent event chances.
    pub fn step(&mut self, operators: &mut [Operator], ctx: &mut WorldCtx) {
        if self.is_removed || !ctx.clock.in_patient_window() {
            return;
        }
        let adj = day_adjustment(ctx.clock.day, ctx.params.n_days);

        if ctx.rng.random::<f64>() * adj < ctx.probs.new_visit {
            self.generate_new_visit(ctx);
        }

        if ctx.rng.random::<f64>() * adj < ctx.probs.single_cancellation {
            self.cancel_visit(operators, ctx);
        }

        if ctx.rng.random::<f64>() * adj < ctx.probs.all_cancellations {
            self.cancel_all_visits(operators, ctx);
        }
    }
}

// ── Population distributions ──────────────────────────────────────────────────

/// Normalized distribution of patients over municipalities (all patients on
/// the roster, including removed ones — they shaped the demand).
pub fn municipality_distribution(patients: &[Patient], n_municipalities: usize) -> Vec<f64> {
    let mut counts = vec![0.0; n_municipalities];
    for p in patients {
        counts[p.municipality.index()] += 1.0;
    }
    let total: f64 = counts.iter().sum();
    if total > 0.0 {
        for c in &mut counts {
            *c /= total;
        }
    }
    counts
}

/// `[P(non-premium), P(premium)]` over the roster.
pub fn premium_distribution(patients: &[Patient]) -> [f64; 2] {
    if patients.is_empty() {
        return [1.0, 0.0];
    }
    let premium = patients.iter().filter(|p| p.premium).count() as f64;
    let share = premium / patients.len() as f64;
    [1.0 - share, share]
}

// ── Removal ───────────────────────────────────────────────────────────────────

/// Move a visit to the removed book and, if it was today's work for an idle
/// or waiting operator, refresh that operator's aim.
pub fn remove_visit(id: VisitId, operators: &mut [Operator], ctx: &mut WorldCtx) {
    let (operator, day) = {
        let v = ctx.visits.visit(id);
        (v.real().operator, v.real().day)
    };
    ctx.visits.remove(id);

    if day == ctx.clock.day {
        let op = &mut operators[operator.index()];
        if matches!(op.state, OperatorState::Idle | OperatorState::Unavailable) {
            op.retrieve_next_visit(day, ctx.graph, ctx.visits, ctx.clock);
        }
    }
}
