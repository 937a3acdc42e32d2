//! Unit tests for hc-agents.

use hc_core::{Clock, MunicipalityId, OperatorId, PatientId, SimParams, SimRng};
use hc_schedule::{StateKind, VisitSpec, VisitStore};
use hc_spatial::{CommutingGraph, MunPosition};

use crate::ctx::{day_adjustment, EventProbs, RunCounters, WorldCtx};
use crate::operator::{Operator, OperatorState};
use crate::patient::{municipality_distribution, premium_distribution, Patient};

// ── Fixture ───────────────────────────────────────────────────────────────────

fn mun(i: usize) -> MunicipalityId {
    MunicipalityId::from_index(i)
}

fn two_mun_graph() -> CommutingGraph {
    CommutingGraph::from_matrix(
        vec![
            MunPosition { lat: 45.0, lon: 9.0 },
            MunPosition { lat: 45.2, lon: 9.1 },
        ],
        &[vec![15, 30], vec![30, 15]],
    )
    .unwrap()
}

/// Params with every stochastic event switched off, so state-machine tests
/// are exact.
fn quiet_params() -> SimParams {
    SimParams {
        n_municipalities: 2,
        new_visit_per_day: 0.0,
        single_cancellation_per_day: 0.0,
        all_cancellations_per_day: 0.0,
        new_patient_per_day: 0.0,
        quit_day_per_day: 0.0,
        late_entry_per_day: 0.0,
        early_exit_per_day: 0.0,
        prolonged_visit_probability: 0.0,
        prolonged_travel_probability: 0.0,
        noise_time: 0,
        high_skill_probability: 0.0,
        ..SimParams::default()
    }
}

struct World {
    graph: CommutingGraph,
    visits: VisitStore,
    params: SimParams,
    probs: EventProbs,
    rng: SimRng,
    counters: RunCounters,
    clock: Clock,
}

impl World {
    fn new() -> World {
        let params = quiet_params();
        let probs = EventProbs::derive(&params, 1);
        World {
            graph: two_mun_graph(),
            visits: VisitStore::new(),
            params,
            probs,
            rng: SimRng::new(7),
            counters: RunCounters::default(),
            clock: Clock::start(),
        }
    }

    fn ctx(&mut self) -> WorldCtx<'_> {
        WorldCtx {
            graph: &mut self.graph,
            visits: &mut self.visits,
            clock: self.clock,
            params: &self.params,
            probs: &self.probs,
            rng: &mut self.rng,
            counters: &mut self.counters,
        }
    }

    fn baseline(&mut self, p: usize, op: usize, day: usize, start: i32, end: i32, m: usize) {
        self.visits.add_baseline_scheduled(VisitSpec {
            patient: PatientId::from_index(p),
            municipality: mun(m),
            skill: 0,
            day,
            start,
            end,
            operator: Some(OperatorId::from_index(op)),
            newly_generated: false,
        });
    }
}

fn operator(home: usize, skill: u8) -> Operator {
    Operator::new(
        OperatorId::from_index(0),
        mun(home),
        skill,
        900,
        1_000,
        vec![true; 5],
        vec![0; 5],
        vec![840; 5],
    )
}

// ── Wage ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod wage {
    use super::*;

    #[test]
    fn contract_hours_at_base_rate() {
        let params = quiet_params();
        let mut op = operator(0, 0);
        op.workload = 600;
        assert!((op.total_wage(&params) - 0.3 * 600.0).abs() < 1e-9);
    }

    #[test]
    fn overtime_carries_the_premium() {
        let params = quiet_params();
        let mut op = operator(0, 1);
        op.workload = 1_000; // 100 over the 900 contract
        let expected = 0.4 * (900.0 + 100.0 * 1.27);
        assert!((op.total_wage(&params) - expected).abs() < 1e-9);
        assert_eq!(op.overtime(), 100);
    }
}

// ── Operator state machine ────────────────────────────────────────────────────

#[cfg(test)]
mod operator_day {
    use super::*;

    /// One quiet day, one intra-municipal visit: the operator departs at day
    /// start, waits on site, works 09:00–10:00, and is home and unavailable
    /// by mid-afternoon.  Mirrors the trivial end-to-end scenario.
    #[test]
    fn single_visit_walkthrough() {
        let mut world = World::new();
        world.baseline(0, 0, 0, 90, 150, 0);
        let mut op = operator(0, 0);

        op.start_day(&world.graph, &world.visits, Clock { day: 0, time: -1 });
        assert_eq!(op.state, OperatorState::Idle);
        assert_eq!(op.etd, Some(0));
        assert_eq!(op.eta, Some(15));

        for t in 0..=800 {
            world.clock = Clock { day: 0, time: t };
            op.step(&mut world.ctx());

            // Travel conservation while on the road.
            if op.state == OperatorState::Travelling {
                if let (Some(etd), Some(eta), Some((from, to))) =
                    (op.etd, op.eta, op.current_edge)
                {
                    assert_eq!(eta, etd + world.graph.travel_time(from, to));
                }
            }
            match t {
                0..=14 => assert_eq!(op.state, OperatorState::Travelling),
                15..=89 => assert_eq!(op.state, OperatorState::Ready),
                90..=149 => assert_eq!(op.state, OperatorState::Working),
                _ => {}
            }
        }

        assert_eq!(op.state, OperatorState::Unavailable);
        assert_eq!(op.executed_visits, 1);
        assert_eq!(op.workload, 60);
        assert_eq!(op.real_travel_time, 30); // out and back, 15 each
        assert_eq!(op.real_inter_travel_time, 0);
        assert_eq!(op.travel_to_reimburse, 0); // first leg is never reimbursed
        assert_eq!(world.counters.overly_delayed_visits, 0);

        let executed: Vec<_> = world
            .visits
            .iter()
            .filter(|v| v.kind() == StateKind::Executed)
            .collect();
        assert_eq!(executed.len(), 1);
        assert_eq!(executed[0].real(), executed[0].sched());
    }

    #[test]
    fn intermediate_intermunicipal_travel_is_reimbursed() {
        let mut world = World::new();
        world.baseline(0, 0, 0, 90, 150, 1);
        world.baseline(1, 0, 0, 240, 300, 0);
        let mut op = operator(0, 0);

        op.start_day(&world.graph, &world.visits, Clock { day: 0, time: -1 });
        for t in 0..=800 {
            world.clock = Clock { day: 0, time: t };
            op.step(&mut world.ctx());
        }

        assert_eq!(op.executed_visits, 2);
        // Legs: home→mun1 (30, first: not reimbursed), mun1→mun0 (30,
        // reimbursed), and the final mun0→home self-loop (15, homeward).
        assert_eq!(op.real_travel_time, 75);
        assert_eq!(op.real_inter_travel_time, 60);
        assert_eq!(op.travel_to_reimburse, 30);
        // Both directed legs touched the 0↔1 edge (counters mirror).
        assert_eq!(world.graph.n_travels(mun(1), mun(0)), 2);
    }

    #[test]
    fn workload_is_monotone_and_counts_executed_only() {
        let mut world = World::new();
        world.baseline(0, 0, 0, 90, 150, 0);
        world.baseline(1, 0, 0, 240, 300, 0);
        let mut op = operator(0, 0);

        op.start_day(&world.graph, &world.visits, Clock { day: 0, time: -1 });
        let mut last = 0;
        for t in 0..=800 {
            world.clock = Clock { day: 0, time: t };
            op.step(&mut world.ctx());
            assert!(op.workload >= last, "workload decreased at t={t}");
            last = op.workload;
        }
        assert_eq!(op.workload, 120);
    }

    #[test]
    fn overskill_accrues_on_low_skill_visits() {
        let mut world = World::new();
        world.baseline(0, 0, 0, 90, 150, 0);
        let mut op = operator(0, 1); // skill 1 serving a skill-0 visit

        op.start_day(&world.graph, &world.visits, Clock { day: 0, time: -1 });
        for t in 0..=800 {
            world.clock = Clock { day: 0, time: t };
            op.step(&mut world.ctx());
        }
        assert_eq!(op.overskill_visits, 1);
        assert_eq!(op.overskill_time, 60);
    }

    #[test]
    fn unavailable_day_never_activates() {
        let mut world = World::new();
        world.baseline(0, 0, 0, 90, 150, 0);
        let mut op = operator(0, 0);
        op.availability[0] = false;

        op.start_day(&world.graph, &world.visits, Clock { day: 0, time: -1 });
        assert_eq!(op.state, OperatorState::Unavailable);
        for t in 0..=400 {
            world.clock = Clock { day: 0, time: t };
            op.step(&mut world.ctx());
        }
        assert_eq!(op.state, OperatorState::Unavailable);
        assert_eq!(op.executed_visits, 0);
    }

    #[test]
    fn quit_day_truncates_and_descheduled_the_rest() {
        let mut world = World::new();
        world.baseline(0, 0, 0, 300, 360, 0);
        world.baseline(1, 0, 0, 500, 560, 0);
        let mut op = operator(0, 0);
        op.start_day(&world.graph, &world.visits, Clock { day: 0, time: -1 });

        world.clock = Clock { day: 0, time: 100 };
        op.quit_day(&mut world.ctx());

        // Day window now ends right after the trip home.
        assert_eq!(op.day_end[0], 100 + 15 + 1);
        assert!(op.next_visit.is_none());
        assert!(world
            .visits
            .iter()
            .all(|v| v.kind() == StateKind::NotScheduled));
    }

    #[test]
    fn late_entry_sheds_unreachable_visits() {
        let mut world = World::new();
        world.baseline(0, 0, 1, 90, 150, 0); // would need departure before 75
        world.baseline(1, 0, 1, 400, 460, 0);
        let mut op = operator(0, 0);

        world.clock = Clock { day: 0, time: 200 };
        op.late_entry(1, 300, &mut world.ctx());

        assert_eq!(op.day_start[1], 300);
        let kinds: Vec<StateKind> = world.visits.iter().map(|v| v.kind()).collect();
        assert_eq!(kinds, vec![StateKind::NotScheduled, StateKind::Scheduled]);
    }

    #[test]
    fn early_exit_sheds_overrunning_visits() {
        let mut world = World::new();
        world.baseline(0, 0, 1, 90, 150, 0);
        world.baseline(1, 0, 1, 400, 460, 0); // 460 + 15 > 420
        let mut op = operator(0, 0);

        world.clock = Clock { day: 0, time: 200 };
        op.early_exit(1, 420, &mut world.ctx());

        assert_eq!(op.day_end[1], 420);
        let kinds: Vec<StateKind> = world.visits.iter().map(|v| v.kind()).collect();
        assert_eq!(kinds, vec![StateKind::Scheduled, StateKind::NotScheduled]);
    }

    #[test]
    fn prolonged_visit_postpones_the_follower() {
        let mut world = World::new();
        // Force the prolong branch on every draw.
        world.params.prolonged_visit_probability = 1.0;
        world.probs = EventProbs::derive(&world.params, 1);
        world.baseline(0, 0, 0, 90, 150, 0);
        world.baseline(1, 0, 0, 180, 240, 0);
        let mut op = operator(0, 0);

        op.start_day(&world.graph, &world.visits, Clock { day: 0, time: -1 });
        for t in 0..=800 {
            world.clock = Clock { day: 0, time: t };
            op.step(&mut world.ctx());
        }

        // Both executed despite the perturbations, and the second visit kept
        // at least 85 % of its scheduled hour.
        let executed: Vec<_> = world
            .visits
            .iter()
            .filter(|v| v.kind() == StateKind::Executed)
            .collect();
        assert_eq!(executed.len(), 2);
        for v in executed {
            assert!(v.real().duration() * 100 >= v.sched().duration() * 85);
        }
    }
}

// ── Patient behavior ──────────────────────────────────────────────────────────

#[cfg(test)]
mod patient {
    use super::*;

    fn patient(i: usize, m: usize) -> Patient {
        Patient::new(PatientId::from_index(i), mun(m), false, None, false)
    }

    #[test]
    fn preferred_operators_rank_by_frequency() {
        let mut world = World::new();
        world.baseline(0, 1, 0, 90, 150, 0);
        world.baseline(0, 1, 1, 90, 150, 0);
        world.baseline(0, 0, 2, 90, 150, 0);
        let p = patient(0, 0);

        let prefs = p.preferred_operators(&world.visits);
        assert_eq!(
            prefs,
            vec![OperatorId::from_index(1), OperatorId::from_index(0)]
        );
    }

    #[test]
    fn cancellation_respects_the_notice_bar() {
        let mut world = World::new();
        world.baseline(0, 0, 0, 300, 360, 0); // today, starts at 300
        let p = patient(0, 0);

        // At 200 the bar is 320 → not cancellable.
        world.clock = Clock { day: 0, time: 200 };
        assert!(p.cancellable_visits(&world.ctx()).is_empty());

        // At 150 the bar is 270 → cancellable.
        world.clock = Clock { day: 0, time: 150 };
        assert_eq!(p.cancellable_visits(&world.ctx()).len(), 1);
    }

    #[test]
    fn cancelling_refreshes_an_idle_operator() {
        let mut world = World::new();
        world.baseline(0, 0, 0, 300, 360, 0);
        let mut ops = vec![operator(0, 0)];
        ops[0].start_day(&world.graph, &world.visits, Clock { day: 0, time: -1 });
        assert!(ops[0].next_visit.is_some());

        world.clock = Clock { day: 0, time: 10 };
        let mut p = patient(0, 0);
        assert!(p.cancel_visit(&mut ops, &mut world.ctx()));

        assert_eq!(world.visits.removed().len(), 1);
        assert!(ops[0].next_visit.is_none(), "idle operator must drop its aim");
    }

    #[test]
    fn cancel_all_marks_the_patient_removed() {
        let mut world = World::new();
        world.baseline(0, 0, 1, 300, 360, 0);
        world.baseline(0, 0, 2, 300, 360, 0);
        let mut ops = vec![operator(0, 0)];
        world.clock = Clock { day: 0, time: 10 };
        let mut p = patient(0, 0);

        assert!(p.cancel_all_visits(&mut ops, &mut world.ctx()));
        assert!(p.is_removed);
        assert_eq!(world.visits.removed().len(), 2);

        // A removed patient never steps again.
        p.step(&mut ops, &mut world.ctx());
        assert_eq!(world.visits.active_count(), 0);
    }

    #[test]
    fn new_visit_request_lands_in_the_store() {
        let mut world = World::new();
        world.baseline(0, 0, 0, 300, 360, 0); // seeds the duration catalogue
        world.clock = Clock { day: 0, time: 100 };
        let mut p = patient(1, 1);

        assert!(p.generate_new_visit(&mut world.ctx()));
        assert_eq!(p.newly_generated_visits, 1);

        let fresh: Vec<_> = world
            .visits
            .iter()
            .filter(|v| v.newly_generated)
            .collect();
        assert_eq!(fresh.len(), 1);
        let v = fresh[0];
        assert_eq!(v.kind(), StateKind::NotScheduled);
        assert_eq!(v.municipality, mun(1));
        assert_eq!(v.proposed_duration(), 60);
        assert_eq!(v.proposed_start % 15, 0);
    }

    #[test]
    fn premium_patients_request_high_skill() {
        let mut world = World::new();
        world.baseline(0, 0, 0, 300, 360, 0);
        world.clock = Clock { day: 0, time: 100 };
        let mut p = Patient::new(PatientId::from_index(1), mun(0), true, None, true);

        assert!(p.generate_new_visit(&mut world.ctx()));
        let fresh: Vec<_> = world.visits.iter().filter(|v| v.newly_generated).collect();
        assert_eq!(fresh[0].skill, 1);
    }
}

// ── Context helpers ───────────────────────────────────────────────────────────

#[cfg(test)]
mod context {
    use super::*;

    #[test]
    fn probabilities_scale_with_population() {
        let small = EventProbs::derive(&SimParams::default(), 10);
        let large = EventProbs::derive(&SimParams::default(), 100);
        assert!(small.new_visit > large.new_visit);
        // Operator-side probabilities are population-independent.
        assert!((small.quit_day - large.quit_day).abs() < 1e-15);
    }

    #[test]
    fn day_adjustment_shrinks_toward_friday() {
        assert!((day_adjustment(0, 5) - 5.0 / 3.0).abs() < 1e-12);
        assert!((day_adjustment(4, 5) - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn population_distributions_normalize() {
        let patients = vec![
            Patient::new(PatientId::from_index(0), mun(0), false, None, false),
            Patient::new(PatientId::from_index(1), mun(0), true, None, false),
            Patient::new(PatientId::from_index(2), mun(1), true, None, false),
        ];
        let mun_distr = municipality_distribution(&patients, 2);
        assert!((mun_distr[0] - 2.0 / 3.0).abs() < 1e-12);
        assert!((mun_distr[1] - 1.0 / 3.0).abs() < 1e-12);

        let prem = premium_distribution(&patients);
        assert!((prem[0] + prem[1] - 1.0).abs() < 1e-12);
        assert!((prem[1] - 2.0 / 3.0).abs() < 1e-12);
    }
}
