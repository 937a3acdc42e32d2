//! The `HomeCareModel` and its tick loop.

use tracing::{debug, info};

use hc_core::time::{BROKEN_TIME, NOT_STARTED, OP_DAY_END, PAT_DAY_END, PAT_DAY_START};
use hc_core::{Clock, MunicipalityId, OperatorId, PatientId, SimParams, SimRng};
use hc_dispatch::{DispatchCtx, Dispatcher};
use hc_schedule::{StateKind, VisitStore};
use hc_spatial::CommutingGraph;

use hc_agents::{
    municipality_distribution, premium_distribution, EventProbs, Operator, OperatorState,
    Patient, RunCounters, WorldCtx,
};

use crate::observer::SimObserver;

// ── Agent activation ──────────────────────────────────────────────────────────

/// Index into one of the model's agent arenas; the per-tick activation order
/// is a shuffled snapshot of these.
#[derive(Copy, Clone, Debug)]
enum AgentRef {
    Patient(usize),
    Operator(usize),
}

// ── HomeCareModel ─────────────────────────────────────────────────────────────

/// Owner of all simulation state.
pub struct HomeCareModel {
    pub params: SimParams,
    pub probs: EventProbs,

    pub graph: CommutingGraph,
    pub patients: Vec<Patient>,
    pub operators: Vec<Operator>,
    pub visits: VisitStore,
    pub dispatcher: Dispatcher,

    pub clock: Clock,
    pub rng: SimRng,

    pub running: bool,
    pub is_broken: bool,
    /// Ticks processed so far (the first tick triggers the week-start pass).
    pub steps: u64,
    pub counters: RunCounters,
}

impl HomeCareModel {
    /// Assemble a model from pre-built entities.  Used by the input-driven
    /// [`ModelBuilder`](crate::ModelBuilder) and directly by scenario tests.
    pub fn assemble(
        params: SimParams,
        graph: CommutingGraph,
        patients: Vec<Patient>,
        operators: Vec<Operator>,
        visits: VisitStore,
    ) -> HomeCareModel {
        let probs = EventProbs::derive(&params, patients.len());
        let rng = SimRng::new(params.seed);
        let dispatcher = Dispatcher::new(params.dispatch_level);
        HomeCareModel {
            params,
            probs,
            graph,
            patients,
            operators,
            visits,
            dispatcher,
            clock: Clock::start(),
            rng,
            running: true,
            is_broken: false,
            steps: 0,
            counters: RunCounters::default(),
        }
    }

    // ── Queries ───────────────────────────────────────────────────────────

    pub fn all_operators_unavailable(&self) -> bool {
        self.operators
            .iter()
            .all(|op| op.state == OperatorState::Unavailable)
    }

    /// NOT_SCHEDULED (and given-up) visits of the patients assigned to an
    /// operator — the execution penalty base of the final objective.
    pub fn not_executed_visits(&self, operator: OperatorId) -> usize {
        let assigned: Vec<PatientId> = self
            .patients
            .iter()
            .filter(|p| p.assigned_operator == Some(operator))
            .map(|p| p.id)
            .collect();

        let pending = self
            .visits
            .iter()
            .filter(|v| v.kind() == StateKind::NotScheduled && assigned.contains(&v.patient))
            .count();
        let unplaceable = self
            .visits
            .unplaceable()
            .iter()
            .filter(|v| assigned.contains(&v.patient))
            .count();
        pending + unplaceable
    }

    /// The decomposed end-of-run objective: wages, reimbursed travel,
    /// overskill executions, and the penalty for never-executed requests.
    pub fn compute_objective(&self) -> f64 {
        let wage: f64 = self.operators.iter().map(|op| op.total_wage(&self.params)).sum();
        let movement: f64 = self
            .operators
            .iter()
            .map(|op| op.travel_to_reimburse as f64)
            .sum::<f64>()
            * self.params.c_movement;
        let overskill: f64 = self
            .operators
            .iter()
            .map(|op| op.overskill_visits as f64)
            .sum::<f64>()
            * self.params.c_overskill;
        let not_executed: f64 = self
            .operators
            .iter()
            .map(|op| self.not_executed_visits(op.id) as f64)
            .sum::<f64>()
            * self.params.c_execution;

        wage + movement + overskill + not_executed
    }

    // ── Run lifecycle ─────────────────────────────────────────────────────

    /// Drive the model to completion, reporting through `observer`.
    pub fn run<O: SimObserver>(&mut self, observer: &mut O) {
        while self.running {
            let day_before = self.clock.day;
            self.tick();
            observer.on_tick_end(self);
            if self.clock.day != day_before || !self.running {
                observer.on_day_end(day_before, self);
            }
        }
        observer.on_run_end(self);
    }

    /// Process exactly `n` ticks (or fewer if the run terminates).
    pub fn run_ticks(&mut self, n: u64) {
        for _ in 0..n {
            if !self.running {
                break;
            }
            self.tick();
        }
    }

    /// Advance the simulation by one logical minute.
    pub fn tick(&mut self) {
        if !self.running {
            return;
        }

        // One-shot initial dispatch before anything moves.
        if self.steps == 0 && self.params.manager_enabled {
            info!("week start: initial dispatch pass");
            self.dispatcher_pass(true);
        }

        if self.clock.not_started() {
            self.start_day();
        }

        self.clock.time += 1;

        self.model_unexpected_events();
        self.step_agents();

        if self.params.manager_enabled {
            self.dispatcher_pass(false);
        }

        self.steps += 1;

        // Day / week termination.
        if self.clock.time >= OP_DAY_END && self.all_operators_unavailable() {
            if self.clock.day == self.params.n_days - 1 {
                info!(day = self.clock.day, "week complete");
                self.running = false;
            } else {
                debug!(day = self.clock.day, "day complete");
                self.clock.day += 1;
                self.clock.time = NOT_STARTED;
            }
        }

        // Past midnight with operators still out: unresolvable congestion.
        if self.clock.time >= BROKEN_TIME {
            self.running = false;
            self.is_broken = true;
            info!("run broken: clock overshot the day");
        }
    }

    // ── Tick phases ───────────────────────────────────────────────────────

    fn start_day(&mut self) {
        debug!(day = self.clock.day, "starting day");
        let clock = self.clock;
        for op in &mut self.operators {
            op.start_day(&self.graph, &self.visits, clock);
        }
    }

    /// New-patient arrival: municipality and premium flag sampled from the
    /// live population distributions, with an immediate first request.
    fn model_unexpected_events(&mut self) {
        if self.clock.time <= PAT_DAY_START || self.clock.time >= PAT_DAY_END {
            return;
        }
        if self.rng.random::<f64>() >= self.probs.new_patient {
            return;
        }

        let mun_distr = municipality_distribution(&self.patients, self.params.n_municipalities);
        let municipality = MunicipalityId::from_index(weighted_index(&mut self.rng, &mun_distr));
        let premium = self.rng.random::<f64>() < premium_distribution(&self.patients)[1];

        let id = PatientId::from_index(self.patients.len());
        let mut patient = Patient::new(id, municipality, premium, None, true);
        debug!(patient = %id, municipality = %municipality, premium, "new patient arrived");

        {
            let mut ctx = WorldCtx {
                graph: &mut self.graph,
                visits: &mut self.visits,
                clock: self.clock,
                params: &self.params,
                probs: &self.probs,
                rng: &mut self.rng,
                counters: &mut self.counters,
            };
            patient.generate_new_visit(&mut ctx);
        }

        // Joins the arena now; first activation is next tick.
        self.patients.push(patient);
    }

    fn step_agents(&mut self) {
        let mut order: Vec<AgentRef> = (0..self.patients.len())
            .map(AgentRef::Patient)
            .chain((0..self.operators.len()).map(AgentRef::Operator))
            .collect();
        self.rng.shuffle(&mut order);

        let HomeCareModel {
            params,
            probs,
            graph,
            patients,
            operators,
            visits,
            clock,
            rng,
            counters,
            ..
        } = self;

        for agent in order {
            // Fresh reborrows per activation; the bindings are &mut and
            // would otherwise move into the first context.
            let mut ctx = WorldCtx {
                graph: &mut *graph,
                visits: &mut *visits,
                clock: *clock,
                params: &*params,
                probs: &*probs,
                rng: &mut *rng,
                counters: &mut *counters,
            };
            match agent {
                AgentRef::Patient(i) => patients[i].step(operators, &mut ctx),
                AgentRef::Operator(i) => operators[i].step(&mut ctx),
            }
        }
    }

    fn dispatcher_pass(&mut self, week_start: bool) {
        let HomeCareModel {
            params,
            graph,
            patients,
            operators,
            visits,
            clock,
            rng,
            dispatcher,
            ..
        } = self;
        let mut ctx = DispatchCtx {
            operators,
            patients,
            graph,
            visits,
            clock: *clock,
            params,
            rng,
        };
        if week_start {
            dispatcher.start_week(&mut ctx);
        } else {
            dispatcher.step(&mut ctx);
        }
    }

    // ── Assignment swap ───────────────────────────────────────────────────

    /// Exchange the assigned operators of two patients and re-place their
    /// visits with the swapped operators where the proposed slots still fit.
    /// Patients left without an operator are repaired toward whichever of
    /// the two can host more of their visits.
    pub fn perform_swap(&mut self, a: PatientId, b: PatientId) -> bool {
        let op_a = self.patients[a.index()].assigned_operator;
        let op_b = self.patients[b.index()].assigned_operator;
        let (Some(op_a), Some(op_b)) = (op_a, op_b) else {
            return false;
        };
        if op_a == op_b {
            return false;
        }
        debug!(%a, %b, from = %op_a, to = %op_b, "swapping assigned operators");

        self.patients[a.index()].assigned_operator = Some(op_b);
        self.patients[b.index()].assigned_operator = Some(op_a);

        for (patient, target) in [(a, op_b), (b, op_a)] {
            for id in self.visits.ids_of_patient(patient) {
                let v = self.visits.visit_mut(id);
                if v.kind() == StateKind::Scheduled {
                    v.deschedule();
                }
                v.proposed_operator = Some(target);
            }
            for id in self.visits.ids_of_patient(patient) {
                let feasible = {
                    let v = self.visits.visit(id);
                    v.kind() == StateKind::NotScheduled
                        && self.operators[target.index()].available_for_visit(
                            &self.graph,
                            &self.visits,
                            v,
                        )
                };
                if feasible {
                    let (day, start, end) = {
                        let v = self.visits.visit(id);
                        (v.proposed_day, v.proposed_start, v.proposed_end)
                    };
                    self.visits.visit_mut(id).schedule(day, start, end, target);
                }
            }
        }

        // Repair patients with no operator toward whichever of the pair
        // hosts more of their visits.
        let orphans: Vec<PatientId> = self
            .patients
            .iter()
            .filter(|p| p.assigned_operator.is_none())
            .map(|p| p.id)
            .collect();
        for patient in orphans {
            let mut hosted = [0usize; 2];
            for id in self.visits.ids_of_patient(patient) {
                let v = self.visits.visit(id);
                for (slot, op) in [op_a, op_b].into_iter().enumerate() {
                    if self.operators[op.index()].available_for_visit(&self.graph, &self.visits, v)
                    {
                        hosted[slot] += 1;
                    }
                }
            }
            let chosen = if hosted[0] > hosted[1] {
                Some(op_a)
            } else if hosted[1] > hosted[0] {
                Some(op_b)
            } else if hosted[0] != 0 {
                Some(op_a)
            } else {
                None
            };
            if let Some(op) = chosen {
                self.patients[patient.index()].assigned_operator = Some(op);
                self.place_pending_with(patient, op);
            }
        }

        // Final pass: pending visits of the pair's patients.
        let pair_patients: Vec<(PatientId, OperatorId)> = self
            .patients
            .iter()
            .filter_map(|p| {
                p.assigned_operator
                    .filter(|&op| op == op_a || op == op_b)
                    .map(|op| (p.id, op))
            })
            .collect();
        for (patient, op) in pair_patients {
            self.place_pending_with(patient, op);
        }

        true
    }

    /// Schedule the patient's NOT_SCHEDULED visits with `op` at their
    /// proposed slots where the operator has room.
    fn place_pending_with(&mut self, patient: PatientId, op: OperatorId) {
        for id in self.visits.ids_of_patient(patient) {
            let feasible = {
                let v = self.visits.visit(id);
                v.kind() == StateKind::NotScheduled
                    && self.operators[op.index()]
                        .available_for_visit(&self.graph, &self.visits, v)
            };
            if feasible {
                let (day, start, end) = {
                    let v = self.visits.visit(id);
                    (v.proposed_day, v.proposed_start, v.proposed_end)
                };
                let v = self.visits.visit_mut(id);
                v.proposed_operator = Some(op);
                v.schedule(day, start, end, op);
            }
        }
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Draw an index from a normalized weight vector.
fn weighted_index(rng: &mut SimRng, weights: &[f64]) -> usize {
    let roll: f64 = rng.random();
    let mut acc = 0.0;
    for (i, &w) in weights.iter().enumerate() {
        acc += w;
        if roll < acc {
            return i;
        }
    }
    weights.len().saturating_sub(1)
}
