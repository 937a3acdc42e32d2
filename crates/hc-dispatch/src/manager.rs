//! The dispatcher proper: candidate enumeration and visit placement.
//!
//! # Scheduling procedure for one visit
//!
//! 1. Try the patient's preferred operators, most-frequent first, one at a
//!    time; the first that yields a feasible placement wins.
//! 2. Try the remaining fleet as one pool.
//! 3. Inside each pool, strategy A (the proposed time, unless it is within
//!    the notice period of the current minute) is attempted before strategy
//!    B (every grid start inside the operator's free windows).
//! 4. At the Optimizer/Robust levels, failing the proposed day triggers a
//!    sweep over the remaining days of the week (skipping the original day
//!    and days the patient is already visited).
//! 5. Multi-visit patients are first offered as a bundle to the single
//!    operator minimizing mean criticality, then fall back to independent
//!    placement.
//!
//! Equal-criticality candidates keep the first one found (enumeration order
//! is preferred-frequency, then operator index, then grid time), so results
//! are deterministic for a fixed RNG seed.

use std::collections::BTreeMap;

use tracing::debug;

use hc_core::time::MIN_NOTICE;
use hc_core::{Clock, Day, DispatchLevel, Minute, SimParams, SimRng, VisitId};
use hc_schedule::VisitStore;
use hc_spatial::CommutingGraph;

use hc_agents::{Operator, OperatorState, Patient};

use crate::criticality::{objective_factor, time_offset_factor, PossibleVisits};
use crate::robustness_factor;

// ── Context ───────────────────────────────────────────────────────────────────

/// Explicit borrows of everything the dispatcher may touch during a pass.
pub struct DispatchCtx<'a> {
    pub operators: &'a mut [Operator],
    pub patients: &'a [Patient],
    pub graph: &'a CommutingGraph,
    pub visits: &'a mut VisitStore,
    pub clock: Clock,
    pub params: &'a SimParams,
    pub rng: &'a mut SimRng,
}

/// A winning (criticality, start, operator) triple.  `criticality` is
/// `None` at the Random level, which never scores candidates.
#[derive(Clone, Debug)]
struct Chosen {
    criticality: Option<f64>,
    start: Minute,
    op_idx: usize,
}

// ── Dispatcher ────────────────────────────────────────────────────────────────

/// The online manager.  Stateless apart from its level; all world state is
/// borrowed per call.
#[derive(Clone, Debug)]
pub struct Dispatcher {
    pub level: DispatchLevel,
}

impl Dispatcher {
    pub fn new(level: DispatchLevel) -> Dispatcher {
        Dispatcher { level }
    }

    /// One-shot initial pass before the first tick.
    pub fn start_week(&self, ctx: &mut DispatchCtx) {
        self.schedule_all_unscheduled(ctx);
    }

    /// Per-tick pass over every NOT_SCHEDULED visit.
    pub fn step(&self, ctx: &mut DispatchCtx) {
        self.schedule_all_unscheduled(ctx);
    }

    fn schedule_all_unscheduled(&self, ctx: &mut DispatchCtx) {
        let mut pending = ctx.visits.unscheduled_ids();
        if pending.is_empty() {
            return;
        }

        match self.level {
            DispatchLevel::Dummy | DispatchLevel::Random => {
                for id in pending {
                    self.schedule_single_visit(id, ctx);
                }
            }
            DispatchLevel::Optimizer | DispatchLevel::Robust => {
                // Group by patient so bundles get a coupled attempt.
                pending.sort_by_key(|&id| (ctx.visits.visit(id).patient, id));
                let mut groups: Vec<Vec<VisitId>> = Vec::new();
                let mut last_patient = None;
                for id in pending {
                    let patient = ctx.visits.visit(id).patient;
                    if last_patient == Some(patient) {
                        if let Some(group) = groups.last_mut() {
                            group.push(id);
                        }
                    } else {
                        groups.push(vec![id]);
                        last_patient = Some(patient);
                    }
                }

                for group in groups {
                    if group.len() == 1 {
                        self.schedule_single_visit_multiple_days(group[0], ctx);
                    } else {
                        self.schedule_multiple_visits(&group, ctx);
                    }
                }
            }
        }
    }

    // ── Criticality ───────────────────────────────────────────────────────

    /// Score a candidate placement.  At the Robust level the visit is
    /// tentatively scheduled, the fleet capacity re-counted, and the visit
    /// descheduled again — a purely reversible probe.
    fn compute_criticality(
        &self,
        visit: VisitId,
        op_idx: usize,
        start: Minute,
        end: Minute,
        prev: Option<&PossibleVisits>,
        ctx: &mut DispatchCtx,
    ) -> f64 {
        let (day, proposed_start, municipality, visit_skill) = {
            let v = ctx.visits.visit(visit);
            (v.proposed_day, v.proposed_start, v.municipality, v.skill)
        };
        let op = &ctx.operators[op_idx];
        let (op_id, op_skill) = (op.id, op.skill);

        let travel_delta =
            op.added_travel_costs(ctx.graph, ctx.visits, day, start, municipality) as f64;
        let wage_delta = op.wage_increment(end - start, ctx.params);
        let overskill = if visit_skill < op_skill { 1.0 } else { 0.0 };

        let objective_delta = ctx.params.c_movement * travel_delta
            + ctx.params.c_wage * wage_delta
            + ctx.params.c_overskill * overskill;
        let obj_f = objective_factor(objective_delta);

        if self.level != DispatchLevel::Robust {
            return obj_f;
        }

        ctx.visits.visit_mut(visit).schedule(day, start, end, op_id);
        let new = PossibleVisits::build(day, ctx.operators, ctx.graph, ctx.visits);
        let mun_distr = hc_agents::municipality_distribution(
            ctx.patients,
            ctx.graph.municipality_count(),
        );
        let robustness = robustness_factor(op_skill, prev.unwrap_or(&new), &new, &mun_distr);
        let offset = time_offset_factor(proposed_start, start);
        ctx.visits.visit_mut(visit).deschedule();

        robustness * offset * obj_f
    }

    // ── Candidate search inside one operator pool ─────────────────────────

    fn try_schedule_with_operators(
        &self,
        visit: VisitId,
        pool: &[usize],
        prev: Option<&PossibleVisits>,
        ctx: &mut DispatchCtx,
    ) -> Option<Chosen> {
        let (day, start, end, municipality, visit_skill) = {
            let v = ctx.visits.visit(visit);
            (v.proposed_day, v.proposed_start, v.proposed_end, v.municipality, v.skill)
        };
        let duration = end - start;
        let notice_blocked =
            day == ctx.clock.day && start <= ctx.clock.time + MIN_NOTICE;

        match self.level {
            DispatchLevel::Random => {
                // A: the proposed time, any available operator.
                if !notice_blocked {
                    let available: Vec<usize> = pool
                        .iter()
                        .copied()
                        .filter(|&i| {
                            ctx.operators[i].available_for_visit(
                                ctx.graph,
                                ctx.visits,
                                ctx.visits.visit(visit),
                            )
                        })
                        .collect();
                    if let Some(&op_idx) = ctx.rng.choose(&available) {
                        return Some(Chosen { criticality: None, start, op_idx });
                    }
                }

                // B: any feasible grid time, uniform over operators and times.
                let mut with_times: Vec<(usize, Vec<Minute>)> = Vec::new();
                for &i in pool {
                    if visit_skill > ctx.operators[i].skill {
                        continue;
                    }
                    let mut times = ctx.operators[i].possible_start_times(
                        ctx.graph, ctx.visits, duration, day, municipality,
                    );
                    if day == ctx.clock.day {
                        times.retain(|&t| t >= ctx.clock.time + MIN_NOTICE);
                    }
                    if !times.is_empty() {
                        with_times.push((i, times));
                    }
                }
                if with_times.is_empty() {
                    return None;
                }
                let pick = ctx.rng.gen_range(0..with_times.len());
                let (op_idx, times) = &with_times[pick];
                let chosen_time = *ctx.rng.choose(times)?;
                Some(Chosen { criticality: None, start: chosen_time, op_idx: *op_idx })
            }

            DispatchLevel::Optimizer | DispatchLevel::Robust => {
                let mut best: Option<Chosen> = None;
                let mut best_crit = f64::INFINITY;

                // A: the proposed time.
                if !notice_blocked {
                    for &i in pool {
                        let feasible = ctx.operators[i].available_for_visit(
                            ctx.graph,
                            ctx.visits,
                            ctx.visits.visit(visit),
                        );
                        if !feasible {
                            continue;
                        }
                        let crit = self.compute_criticality(visit, i, start, end, prev, ctx);
                        if crit < best_crit {
                            best_crit = crit;
                            best = Some(Chosen { criticality: Some(crit), start, op_idx: i });
                        }
                    }
                    if best.is_some() {
                        return best;
                    }
                }

                // B: every feasible grid time.
                for &i in pool {
                    if visit_skill > ctx.operators[i].skill {
                        continue;
                    }
                    let mut times = ctx.operators[i].possible_start_times(
                        ctx.graph, ctx.visits, duration, day, municipality,
                    );
                    if day == ctx.clock.day {
                        times.retain(|&t| t >= ctx.clock.time + MIN_NOTICE);
                    }
                    for t in times {
                        let crit =
                            self.compute_criticality(visit, i, t, t + duration, prev, ctx);
                        if crit < best_crit {
                            best_crit = crit;
                            best = Some(Chosen { criticality: Some(crit), start: t, op_idx: i });
                        }
                    }
                }
                best
            }

            // Dummy never enumerates candidates through this path.
            DispatchLevel::Dummy => None,
        }
    }

    /// Preferred operators first (one by one), then the rest of the fleet.
    fn find_best_scheduling(&self, visit: VisitId, ctx: &mut DispatchCtx) -> Option<Chosen> {
        let patient = ctx.visits.visit(visit).patient;
        let day = ctx.visits.visit(visit).proposed_day;

        let preferred = ctx.patients[patient.index()].preferred_operators(ctx.visits);
        let preferred_idxs: Vec<usize> = preferred.iter().map(|op| op.index()).collect();

        let prev = (self.level == DispatchLevel::Robust)
            .then(|| PossibleVisits::build(day, ctx.operators, ctx.graph, ctx.visits));

        for &i in &preferred_idxs {
            if let Some(chosen) =
                self.try_schedule_with_operators(visit, &[i], prev.as_ref(), ctx)
            {
                return Some(chosen);
            }
        }

        let others: Vec<usize> = (0..ctx.operators.len())
            .filter(|i| !preferred_idxs.contains(i))
            .collect();
        self.try_schedule_with_operators(visit, &others, prev.as_ref(), ctx)
    }

    // ── Placement ─────────────────────────────────────────────────────────

    fn place(&self, visit: VisitId, day: Day, start: Minute, op_idx: usize, ctx: &mut DispatchCtx) {
        let duration = ctx.visits.visit(visit).proposed_duration();
        let op_id = ctx.operators[op_idx].id;
        ctx.visits
            .visit_mut(visit)
            .schedule(day, start, start + duration, op_id);
        debug!(visit = %visit, operator = %op_id, day, start, "visit scheduled");
        self.ping_operator(op_idx, day, ctx);
    }

    /// Wake an idle operator whose today just gained a visit, so it aims at
    /// the right next stop.
    fn ping_operator(&self, op_idx: usize, day: Day, ctx: &mut DispatchCtx) {
        if day != ctx.clock.day {
            return;
        }
        let op = &mut ctx.operators[op_idx];
        if op.state == OperatorState::Idle {
            op.retrieve_next_visit(day, ctx.graph, ctx.visits, ctx.clock);
        }
    }

    /// Try to place one visit on its proposed day.  On failure at the
    /// Dummy/Random levels the visit is moved to the unplaceable book;
    /// higher levels leave it NOT_SCHEDULED for the caller (or next tick).
    pub fn schedule_single_visit(&self, visit: VisitId, ctx: &mut DispatchCtx) -> bool {
        let (day, start, end) = {
            let v = ctx.visits.visit(visit);
            (v.proposed_day, v.proposed_start, v.proposed_end)
        };
        let notice_blocked =
            day == ctx.clock.day && start <= ctx.clock.time + MIN_NOTICE;

        match self.level {
            DispatchLevel::Dummy => {
                let patient = ctx.visits.visit(visit).patient;
                let preferred = ctx.patients[patient.index()].preferred_operators(ctx.visits);
                if !preferred.is_empty() && !notice_blocked {
                    for op_id in preferred {
                        let i = op_id.index();
                        let feasible = ctx.operators[i].available_for_visit(
                            ctx.graph,
                            ctx.visits,
                            ctx.visits.visit(visit),
                        );
                        if feasible {
                            ctx.visits.visit_mut(visit).schedule(day, start, end, op_id);
                            self.ping_operator(i, day, ctx);
                            return true;
                        }
                    }
                }
            }

            DispatchLevel::Random => {
                let patient = ctx.visits.visit(visit).patient;
                let preferred = ctx.patients[patient.index()].preferred_operators(ctx.visits);
                let preferred_idxs: Vec<usize> =
                    preferred.iter().map(|op| op.index()).collect();
                let others: Vec<usize> = (0..ctx.operators.len())
                    .filter(|i| !preferred_idxs.contains(i))
                    .collect();

                for pool in [preferred_idxs, others] {
                    if let Some(chosen) =
                        self.try_schedule_with_operators(visit, &pool, None, ctx)
                    {
                        self.place(visit, day, chosen.start, chosen.op_idx, ctx);
                        return true;
                    }
                }
            }

            DispatchLevel::Optimizer | DispatchLevel::Robust => {
                if let Some(chosen) = self.find_best_scheduling(visit, ctx) {
                    self.place(visit, day, chosen.start, chosen.op_idx, ctx);
                    return true;
                }
            }
        }

        if matches!(self.level, DispatchLevel::Dummy | DispatchLevel::Random) {
            debug!(visit = %visit, "unplaceable at any time");
            ctx.visits.mark_unplaceable(visit);
        }
        false
    }

    /// Try the proposed day, then sweep the remaining days of the week.
    pub fn schedule_single_visit_multiple_days(
        &self,
        visit: VisitId,
        ctx: &mut DispatchCtx,
    ) -> bool {
        if self.schedule_single_visit(visit, ctx) {
            return true;
        }

        let (original_day, patient) = {
            let v = ctx.visits.visit(visit);
            (v.proposed_day, v.patient)
        };
        ctx.visits.visit_mut(visit).original_day = Some(original_day);

        let eligible: Vec<Day> = (ctx.clock.day + 1..ctx.params.n_days)
            .filter(|&d| d != original_day && !ctx.visits.patient_has_visit_on(patient, d))
            .collect();

        for day in eligible {
            ctx.visits.visit_mut(visit).proposed_day = day;
            if self.schedule_single_visit(visit, ctx) {
                return true;
            }
        }

        // Exhausted the week: restore the request and leave it pending.
        let v = ctx.visits.visit_mut(visit);
        v.proposed_day = original_day;
        v.original_day = None;
        debug!(visit = %visit, "unschedulable on any day this week");
        false
    }

    // ── Coupled multi-visit scheduling ────────────────────────────────────

    fn try_multiple_schedules(
        &self,
        visits: &[VisitId],
        pool: &[usize],
        prevs: &[Option<PossibleVisits>],
        ctx: &mut DispatchCtx,
    ) -> Option<(f64, Vec<Minute>, usize)> {
        let mut best: Option<(f64, Vec<Minute>, usize)> = None;

        for &op_idx in pool {
            let mut starts = Vec::with_capacity(visits.len());
            let mut total = 0.0;
            let mut feasible = true;

            for (k, &visit) in visits.iter().enumerate() {
                match self.try_schedule_with_operators(visit, &[op_idx], prevs[k].as_ref(), ctx)
                {
                    Some(chosen) => {
                        total += chosen.criticality.unwrap_or(0.0);
                        starts.push(chosen.start);
                    }
                    None => {
                        feasible = false;
                        break;
                    }
                }
            }
            if !feasible {
                continue;
            }

            let avg = total / visits.len() as f64;
            if best.as_ref().is_none_or(|b| avg < b.0) {
                best = Some((avg, starts, op_idx));
            }
        }
        best
    }

    /// Offer the bundle to operators ranked by how many of the visits they
    /// could host at the proposed times; the first rank with a feasible
    /// coupled placement wins.
    fn find_best_multiple_schedulings(
        &self,
        visits: &[VisitId],
        ctx: &mut DispatchCtx,
    ) -> Option<(f64, Vec<Minute>, usize)> {
        let prevs: Vec<Option<PossibleVisits>> = visits
            .iter()
            .map(|&visit| {
                (self.level == DispatchLevel::Robust).then(|| {
                    let day = ctx.visits.visit(visit).proposed_day;
                    PossibleVisits::build(day, ctx.operators, ctx.graph, ctx.visits)
                })
            })
            .collect();

        let mut by_availability: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for i in 0..ctx.operators.len() {
            let hosting = visits
                .iter()
                .filter(|&&visit| {
                    ctx.operators[i].available_for_visit(
                        ctx.graph,
                        ctx.visits,
                        ctx.visits.visit(visit),
                    )
                })
                .count();
            by_availability.entry(hosting).or_default().push(i);
        }

        for (_, pool) in by_availability.iter().rev() {
            if let Some(best) = self.try_multiple_schedules(visits, pool, &prevs, ctx) {
                return Some(best);
            }
        }
        None
    }

    /// Coupled placement of one patient's unscheduled bundle; falls back to
    /// independent day-sweeping placement per visit.
    pub fn schedule_multiple_visits(&self, visits: &[VisitId], ctx: &mut DispatchCtx) -> bool {
        if let Some((_, starts, op_idx)) = self.find_best_multiple_schedulings(visits, ctx) {
            for (k, &visit) in visits.iter().enumerate() {
                let day = ctx.visits.visit(visit).proposed_day;
                self.place(visit, day, starts[k], op_idx, ctx);
            }
            return true;
        }

        debug!("coupled placement failed; scheduling the bundle independently");
        for &visit in visits {
            self.schedule_single_visit_multiple_days(visit, ctx);
        }
        false
    }

    /// Deschedule the given visits and place them afresh (used after
    /// assignment swaps and similar repairs).
    pub fn reschedule(&self, visits: &[VisitId], ctx: &mut DispatchCtx) {
        for &visit in visits {
            ctx.visits.visit_mut(visit).deschedule();
            self.schedule_single_visit_multiple_days(visit, ctx);
        }
    }
}
