//! The `Operator` agent.
//!
//! # State machine
//!
//! ```text
//! UNAVAILABLE ──(available ∧ inside day window)──▶ IDLE
//! IDLE ──(time == etd)─────────────────────────▶ TRAVELLING
//! IDLE ──(no next visit ∧ time to go home)──────▶ TRAVELLING (homeward)
//! TRAVELLING ──(time == eta ∧ next visit)───────▶ READY
//! TRAVELLING ──(time == eta ∧ homeward)─────────▶ UNAVAILABLE
//! READY ──(time == next visit's real start)─────▶ WORKING
//! WORKING ──(time == next visit's real end)─────▶ IDLE
//! ```
//!
//! Transitions are checked in sequence each minute, so an operator can pass
//! through several states within a single tick (e.g. becoming available and
//! immediately departing).  Departures draw travel perturbations — a
//! triangular prolong with the rush-hour-adjusted probability, otherwise
//! uniform noise — and visit starts draw the analogous visit perturbations;
//! both feed the mutation algebra so the rest of the day stays feasible.

use tracing::{debug, trace};

use hc_core::time::{self, MIN_NOTICE, OP_DAY_END, OP_DAY_START, PAT_DAY_END, PAT_DAY_START};
use hc_core::{Clock, Day, Minute, MunicipalityId, OperatorId, SimParams, VisitId};
use hc_schedule::{windows, ItineraryEdit, OperatorDay, Visit, VisitStore};
use hc_spatial::CommutingGraph;

use crate::ctx::{day_adjustment, WorldCtx};

// ── State ─────────────────────────────────────────────────────────────────────

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OperatorState {
    Idle,
    Travelling,
    Ready,
    Working,
    Unavailable,
}

// ── Operator ──────────────────────────────────────────────────────────────────

/// A mobile care worker with a skill level, a contractual time budget, and
/// per-day working windows.
#[derive(Clone, Debug)]
pub struct Operator {
    pub id: OperatorId,
    pub home: MunicipalityId,
    pub skill: u8,
    /// Contractual minutes per week; work beyond it is overtime.
    pub contract_time: Minute,
    pub max_time: Minute,

    // ── Per-day calendar (mutated by quit-day / late-entry / early-exit) ──
    pub availability: Vec<bool>,
    pub day_start: Vec<Minute>,
    pub day_end: Vec<Minute>,

    // ── Live state ────────────────────────────────────────────────────────
    pub state: OperatorState,
    pub current_municipality: MunicipalityId,
    pub next_visit: Option<VisitId>,
    /// Edge being (or about to be) traversed, as (from, to).
    pub current_edge: Option<(MunicipalityId, MunicipalityId)>,
    pub etd: Option<Minute>,
    pub eta: Option<Minute>,

    // ── Accumulators ──────────────────────────────────────────────────────
    pub executed_visits: u32,
    pub workload: Minute,
    pub real_travel_time: Minute,
    pub real_inter_travel_time: Minute,
    /// False on the day's first leg; flips true on arrival at a visit so
    /// that only intermediate inter-municipal legs accrue reimbursement.
    pub is_reimbursed: bool,
    pub travel_to_reimburse: Minute,
    pub overskill_visits: u32,
    pub overskill_time: Minute,
}

impl Operator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: OperatorId,
        home: MunicipalityId,
        skill: u8,
        contract_time: Minute,
        max_time: Minute,
        availability: Vec<bool>,
        day_start: Vec<Minute>,
        day_end: Vec<Minute>,
    ) -> Operator {
        Operator {
            id,
            home,
            skill,
            contract_time,
            max_time,
            availability,
            day_start,
            day_end,
            state: OperatorState::Idle,
            current_municipality: home,
            next_visit: None,
            current_edge: None,
            etd: None,
            eta: None,
            executed_visits: 0,
            workload: 0,
            real_travel_time: 0,
            real_inter_travel_time: 0,
            is_reimbursed: false,
            travel_to_reimburse: 0,
            overskill_visits: 0,
            overskill_time: 0,
        }
    }

    // ── Wage ──────────────────────────────────────────────────────────────

    /// Total wage for the accumulated workload: contract minutes at the
    /// base rate, overtime minutes at `1 + omega` times it.
    pub fn total_wage(&self, params: &SimParams) -> f64 {
        let base = self.contract_time.min(self.workload) as f64;
        let overtime = (self.workload - self.contract_time).max(0) as f64;
        params.wage_per_minute(self.skill) * (base + overtime * (1.0 + params.omega))
    }

    /// Marginal wage term used by the dispatcher's objective delta.
    pub fn wage_increment(&self, visit_duration: Minute, params: &SimParams) -> f64 {
        let overtime = (self.workload - self.contract_time + visit_duration).max(0) as f64;
        params.wage_per_minute(self.skill) * (self.workload as f64 + overtime * (1.0 + params.omega))
    }

    pub fn overtime(&self) -> Minute {
        (self.workload - self.contract_time).max(0)
    }

    // ── Calendar views ────────────────────────────────────────────────────

    /// Snapshot of this operator's window parameters for `day`.
    pub fn operator_day(&self, day: Day) -> OperatorDay {
        OperatorDay {
            operator: self.id,
            home: self.home,
            available: self.availability[day],
            open: self.day_start[day],
            close: self.day_end[day],
        }
    }

    fn edit<'g>(
        &self,
        graph: &'g CommutingGraph,
        day: Day,
        handle_delay: bool,
    ) -> ItineraryEdit<'g> {
        ItineraryEdit { graph, op: self.operator_day(day), day, handle_delay }
    }

    // ── Feasibility queries ───────────────────────────────────────────────

    /// Free windows for servicing a visit in `municipality` on `day`.
    pub fn available_windows(
        &self,
        graph: &CommutingGraph,
        visits: &VisitStore,
        municipality: MunicipalityId,
        day: Day,
    ) -> Vec<(Minute, Minute)> {
        let stops = visits.day_stops(self.id, day);
        windows::municipality_windows(graph, &self.operator_day(day), &stops, municipality)
    }

    /// `true` iff some free window contains `[start, end]` in `municipality`.
    pub fn available_for_period(
        &self,
        graph: &CommutingGraph,
        visits: &VisitStore,
        start: Minute,
        end: Minute,
        municipality: MunicipalityId,
        day: Day,
    ) -> bool {
        let w = self.available_windows(graph, visits, municipality, day);
        windows::contains_period(&w, start, end)
    }

    /// `true` iff this operator can execute `visit` at its proposed slot:
    /// sufficient skill and a containing free window.
    pub fn available_for_visit(
        &self,
        graph: &CommutingGraph,
        visits: &VisitStore,
        visit: &Visit,
    ) -> bool {
        if visit.skill > self.skill {
            return false;
        }
        self.available_for_period(
            graph,
            visits,
            visit.proposed_start,
            visit.proposed_end,
            visit.municipality,
            visit.proposed_day,
        )
    }

    /// How many extra visits of `duration` this operator could fit in
    /// `municipality` on `day` within the patient window.
    pub fn possible_visits(
        &self,
        graph: &CommutingGraph,
        visits: &VisitStore,
        duration: Minute,
        day: Day,
        municipality: MunicipalityId,
    ) -> u32 {
        let w = self.available_windows(graph, visits, municipality, day);
        let clipped = windows::clip_windows(&w, PAT_DAY_START, PAT_DAY_END);
        windows::count_fitting_visits(&clipped, duration)
    }

    /// [`possible_visits`](Self::possible_visits) for every municipality.
    pub fn possible_visits_per_municipality(
        &self,
        graph: &CommutingGraph,
        visits: &VisitStore,
        duration: Minute,
        day: Day,
    ) -> Vec<u32> {
        graph
            .municipalities()
            .map(|m| self.possible_visits(graph, visits, duration, day, m))
            .collect()
    }

    /// Grid-aligned start times at which a visit of `duration` would fit.
    pub fn possible_start_times(
        &self,
        graph: &CommutingGraph,
        visits: &VisitStore,
        duration: Minute,
        day: Day,
        municipality: MunicipalityId,
    ) -> Vec<Minute> {
        let w = self.available_windows(graph, visits, municipality, day);
        windows::start_times(&w, duration)
    }

    /// Travel-time increase from detouring through `municipality` at `time`
    /// on `day`, relative to the leg the itinerary already contains there.
    pub fn added_travel_costs(
        &self,
        graph: &CommutingGraph,
        visits: &VisitStore,
        day: Day,
        time: Minute,
        municipality: MunicipalityId,
    ) -> Minute {
        let stops = visits.day_stops(self.id, day);

        if stops.is_empty() {
            return if self.home == municipality {
                0
            } else {
                2 * graph.travel_time(self.home, municipality)
            };
        }

        let first = &stops[0];
        let last = &stops[stops.len() - 1];

        let (prev, next) = if time < first.start {
            (self.home, first.municipality)
        } else if time > last.end {
            (last.municipality, self.home)
        } else {
            match stops
                .windows(2)
                .find(|pair| pair[0].end <= time && time <= pair[1].start)
            {
                Some(pair) => (pair[0].municipality, pair[1].municipality),
                None => {
                    // `time` overlaps an existing stop — no clean insertion
                    // point; the caller's window check should have excluded it.
                    debug!(operator = %self.id, time, "no insertion gap at requested time");
                    return 0;
                }
            }
        };

        let out = if municipality != prev { graph.travel_time(municipality, prev) } else { 0 };
        let back = if municipality != next { graph.travel_time(next, municipality) } else { 0 };
        let old = if prev != next { graph.travel_time(prev, next) } else { 0 };
        out + back - old
    }

    // ── Movement bookkeeping ──────────────────────────────────────────────

    /// Refresh `etd`/`eta` from the current edge and next visit.
    ///
    /// Departure is as late as possible while still arriving on time, but
    /// never before the day opens, never in the past, and never more than
    /// the notice period ahead of the visit.
    pub fn update_movement(&mut self, graph: &CommutingGraph, visits: &VisitStore, clock: Clock) {
        match self.next_visit {
            None => {
                self.etd = None;
                self.eta = None;
            }
            Some(next) => {
                let (from, to) = match self.current_edge {
                    Some(edge) => edge,
                    None => return,
                };
                let weight = graph.travel_time(from, to);
                let start = visits.visit(next).real().start;

                let earliest = OP_DAY_START
                    .max(self.day_start[clock.day])
                    .max(clock.time + 1)
                    .max(start - MIN_NOTICE);
                let etd = (start - weight).min(earliest);
                self.etd = Some(etd);
                self.eta = Some(etd + weight);
            }
        }
    }

    /// Fetch the day's first still-SCHEDULED visit and aim at it.
    pub fn retrieve_next_visit(
        &mut self,
        day: Day,
        graph: &CommutingGraph,
        visits: &VisitStore,
        clock: Clock,
    ) {
        let scheduled = visits.scheduled_itinerary(self.id, day);
        match scheduled.first() {
            None => {
                self.next_visit = None;
                self.current_edge = None;
            }
            Some(&first) => {
                self.next_visit = Some(first);
                let dest = visits.visit(first).municipality;
                self.current_edge = Some((self.current_municipality, dest));
            }
        }
        self.update_movement(graph, visits, clock);
    }

    // ── Day lifecycle ─────────────────────────────────────────────────────

    /// Per-day reset: back home, reimbursement cleared, first visit fetched.
    pub fn start_day(&mut self, graph: &CommutingGraph, visits: &VisitStore, clock: Clock) {
        self.current_municipality = self.home;
        self.is_reimbursed = false;

        if !self.availability[clock.day] {
            self.state = OperatorState::Unavailable;
            return;
        }

        self.retrieve_next_visit(clock.day, graph, visits, clock);
        if self.next_visit.is_none() {
            return;
        }

        if self.day_start[clock.day] > OP_DAY_START {
            self.state = OperatorState::Unavailable;
        } else {
            self.state = OperatorState::Idle;
        }
    }

    // ── Unexpected events ─────────────────────────────────────────────────

    /// Abandon the rest of today: truncate the day window to the earliest
    /// possible return home and deschedule today's remaining visits.
    pub fn quit_day(&mut self, ctx: &mut WorldCtx) {
        debug!(operator = %self.id, "quitting the day");
        let today = ctx.clock.day;
        let home_leg = ctx.graph.travel_time(self.current_municipality, self.home);
        self.day_end[today] = ctx.clock.time + home_leg + 1;
        self.next_visit = None;
        self.current_edge = None;
        self.etd = None;
        self.eta = None;

        for id in ctx.visits.scheduled_itinerary(self.id, today) {
            ctx.visits.visit_mut(id).deschedule();
        }
    }

    /// Start a future day late; visits no longer reachable are descheduled.
    pub fn late_entry(&mut self, day: Day, entry: Minute, ctx: &mut WorldCtx) {
        debug!(operator = %self.id, day, entry, "late entry");
        self.day_start[day] = entry;

        for id in ctx.visits.scheduled_itinerary(self.id, day) {
            let v = ctx.visits.visit(id);
            let leg = ctx.graph.travel_time(self.home, v.municipality);
            if v.real().start - leg < entry {
                ctx.visits.visit_mut(id).deschedule();
            }
        }
    }

    /// End a future day early; visits that would overrun it are descheduled.
    pub fn early_exit(&mut self, day: Day, exit: Minute, ctx: &mut WorldCtx) {
        debug!(operator = %self.id, day, exit, "early exit");
        self.day_end[day] = exit;

        for id in ctx.visits.scheduled_itinerary(self.id, day) {
            let v = ctx.visits.visit(id);
            let leg = ctx.graph.travel_time(v.municipality, self.home);
            if v.real().end + leg > exit {
                ctx.visits.visit_mut(id).deschedule();
            }
        }
    }

    // ── Travel perturbation ───────────────────────────────────────────────

    /// Delay the current leg: arrival slips, and the next visit (if any) is
    /// pushed through the mutation algebra so the day re-balances.
    pub fn extend_travel(&mut self, delta: Minute, ctx: &mut WorldCtx) {
        self.eta = self.eta.map(|eta| eta + delta);

        let Some(next) = self.next_visit else {
            trace!(operator = %self.id, delta, "homeward leg extended");
            return;
        };
        let Some(eta) = self.eta else { return };

        let mut push = (eta - ctx.visits.visit(next).real().start).max(0);
        if ctx.params.handle_delay {
            let budget = ctx.visits.visit(next).shortening_time();
            let shrink = budget.min(push);
            if shrink > 0 {
                ctx.visits.visit_mut(next).shrink_start(shrink);
                push -= shrink;
            }
        }

        if push > 0 {
            let day = ctx.clock.day;
            let edit = self.edit(ctx.graph, day, ctx.params.handle_delay);
            ctx.counters.overly_delayed_visits += edit.extend_visit(ctx.visits, next, push);
            // Net effect: the visit keeps its duration but starts `push` later.
            ctx.visits.visit_mut(next).shrink_start(push);
        }
    }

    /// The current leg is faster than planned: arrival moves up and the next
    /// visit recovers part of its delay and compressed duration.
    pub fn shorten_travel(&mut self, delta: Minute, ctx: &mut WorldCtx) {
        self.eta = self.eta.map(|eta| eta - delta);

        let Some(next) = self.next_visit else {
            trace!(operator = %self.id, delta, "homeward leg shortened");
            return;
        };

        let delay = ctx.visits.visit(next).delay();
        if delay > 0 {
            let pull = delta.min(delay);
            let day = ctx.clock.day;
            let edit = self.edit(ctx.graph, day, ctx.params.handle_delay);
            edit.shorten_visit(ctx.visits, next, pull);
            ctx.visits.visit_mut(next).stretch_start(pull);
        }

        // Back on the anchor: restore any remaining compressed duration.
        let v = ctx.visits.visit(next);
        if v.real().start == v.sched().start {
            let give_back = v.shortened_time();
            ctx.visits.visit_mut(next).stretch_end(give_back);
        }
    }

    fn draw_travel_perturbation(&mut self, ctx: &mut WorldCtx) {
        let coeff = ctx.params.rush_coefficient(ctx.clock.time);
        if ctx.rng.random::<f64>() * coeff < ctx.probs.extended_travel {
            let extend = ctx.rng.triangular(
                ctx.params.prolong_min,
                ctx.params.prolong_mode,
                ctx.params.prolong_max,
            );
            self.extend_travel(extend, ctx);
        } else {
            let noise = ctx.rng.noise(ctx.params.noise_time);
            if noise > 0 {
                self.extend_travel(noise, ctx);
            } else if noise < 0 {
                self.shorten_travel(-noise, ctx);
            }
        }
    }

    // ── Per-state steps ───────────────────────────────────────────────────

    fn unavailable_step(&mut self, ctx: &mut WorldCtx) {
        let day = ctx.clock.day;
        if self.availability[day]
            && ctx.clock.time >= self.day_start[day]
            && ctx.clock.time <= self.day_end[day]
        {
            self.state = OperatorState::Idle;
            self.retrieve_next_visit(day, ctx.graph, ctx.visits, ctx.clock);
            trace!(operator = %self.id, "now available");
        }
    }

    fn idle_step(&mut self, ctx: &mut WorldCtx) {
        let now = ctx.clock.time;
        let day = ctx.clock.day;

        // Homeward departure once nothing remains and the day is closing.
        if self.next_visit.is_none() {
            let home_leg = ctx.graph.travel_time(self.current_municipality, self.home);
            if self.day_end[day] <= (now + home_leg).max(now + MIN_NOTICE) {
                self.state = OperatorState::Travelling;
                self.current_edge = Some((self.current_municipality, self.home));
                self.etd = Some(now);
                self.eta = Some(now + home_leg);
                self.draw_travel_perturbation(ctx);
                trace!(operator = %self.id, eta = ?self.eta, "returning home");
                return;
            }
        }

        // Scheduled departure toward the next visit.
        if self.etd == Some(now) {
            self.state = OperatorState::Travelling;
            self.draw_travel_perturbation(ctx);
            return;
        }

        // Operator-side unexpected events (never on the last day).
        if ctx.clock.in_operator_window() && day != ctx.params.n_days - 1 {
            let adj = day_adjustment(day, ctx.params.n_days);
            let n_days = ctx.params.n_days;

            if ctx.rng.random::<f64>() * adj < ctx.probs.quit_day {
                self.quit_day(ctx);
                return;
            }

            if ctx.rng.random::<f64>() * adj < ctx.probs.late_entry && day < n_days - 1 {
                let target = ctx.rng.gen_range(day + 1..n_days);
                let entry = time::floor_to_grid(ctx.rng.gen_range(OP_DAY_START..OP_DAY_END / 2));
                if entry > self.day_start[target] {
                    self.late_entry(target, entry, ctx);
                }
                return;
            }

            if ctx.rng.random::<f64>() * adj < ctx.probs.early_exit && day < n_days - 1 {
                let target = ctx.rng.gen_range(day + 1..n_days);
                let exit =
                    time::floor_to_grid(ctx.rng.gen_range(OP_DAY_END / 2..OP_DAY_END));
                if exit < self.day_end[target] {
                    self.early_exit(target, exit, ctx);
                }
            }
        }
    }

    fn travelling_step(&mut self, ctx: &mut WorldCtx) {
        if self.eta != Some(ctx.clock.time) {
            return;
        }
        let Some((from, to)) = self.current_edge else { return };
        let Some(etd) = self.etd else { return };
        let duration = ctx.clock.time - etd;

        ctx.graph.record_travel(from, to);
        self.real_travel_time += duration;
        let inter = !ctx.graph.is_intra(from, to);
        if inter {
            self.real_inter_travel_time += duration;
        }

        if self.next_visit.is_some() {
            if self.is_reimbursed && inter {
                self.travel_to_reimburse += duration;
            }
            self.is_reimbursed = true;
            self.state = OperatorState::Ready;
            self.current_municipality = to;
            trace!(operator = %self.id, municipality = %to, "arrived for next visit");
        } else {
            self.is_reimbursed = false;
            self.state = OperatorState::Unavailable;
            self.current_municipality = self.home;
            self.day_end[ctx.clock.day] = ctx.clock.time;
            trace!(operator = %self.id, "back home, done for the day");
        }
    }

    fn ready_step(&mut self, ctx: &mut WorldCtx) {
        let Some(next) = self.next_visit else { return };
        if ctx.visits.visit(next).real().start != ctx.clock.time {
            return;
        }

        self.state = OperatorState::Working;
        ctx.visits
            .visit_mut(next)
            .start(ctx.clock.day, ctx.clock.time, self.id);

        // Visit perturbation.
        let day = ctx.clock.day;
        if ctx.rng.random::<f64>() < ctx.probs.extended_visit {
            let extend = ctx.rng.triangular(
                ctx.params.prolong_min,
                ctx.params.prolong_mode,
                ctx.params.prolong_max,
            );
            let edit = self.edit(ctx.graph, day, ctx.params.handle_delay);
            ctx.counters.overly_delayed_visits += edit.extend_visit(ctx.visits, next, extend);
        } else {
            let noise = ctx.rng.noise(ctx.params.noise_time);
            let edit = self.edit(ctx.graph, day, ctx.params.handle_delay);
            if noise > 0 {
                ctx.counters.overly_delayed_visits += edit.extend_visit(ctx.visits, next, noise);
            } else if noise < 0 {
                edit.shorten_visit(ctx.visits, next, -noise);
            }
        }
        trace!(operator = %self.id, visit = %next, "visit started");
    }

    fn working_step(&mut self, ctx: &mut WorldCtx) {
        let Some(next) = self.next_visit else { return };
        if ctx.visits.visit(next).real().end != ctx.clock.time {
            return;
        }

        ctx.visits.visit_mut(next).complete(ctx.clock.time);
        let v = ctx.visits.visit(next);
        let duration = v.real().duration();
        self.executed_visits += 1;
        self.workload += duration;
        if v.skill < self.skill {
            self.overskill_visits += 1;
            self.overskill_time += duration;
        }
        trace!(operator = %self.id, visit = %next, duration, "visit completed");

        self.state = OperatorState::Idle;
        self.retrieve_next_visit(ctx.clock.day, ctx.graph, ctx.visits, ctx.clock);
        self.idle_step(ctx);
    }

    /// Advance the operator by one minute.
    pub fn step(&mut self, ctx: &mut WorldCtx) {
        if self.state == OperatorState::Unavailable {
            self.unavailable_step(ctx);
        }
        if self.state == OperatorState::Idle {
            self.idle_step(ctx);
        }
        if self.state == OperatorState::Travelling {
            self.travelling_step(ctx);
        }
        if self.state == OperatorState::Ready {
            self.ready_step(ctx);
        }
        if self.state == OperatorState::Working {
            self.working_step(ctx);
        }
    }
}
