//! Unit tests for hc-schedule.

use hc_core::{MunicipalityId, OperatorId, PatientId};
use hc_spatial::{CommutingGraph, MunPosition};

use crate::algebra::ItineraryEdit;
use crate::store::{VisitSpec, VisitStore};
use crate::visit::StateKind;
use crate::windows::{self, OperatorDay};

// ── Fixtures ──────────────────────────────────────────────────────────────────

fn mun(i: usize) -> MunicipalityId {
    MunicipalityId::from_index(i)
}

fn op(i: usize) -> OperatorId {
    OperatorId::from_index(i)
}

fn pat(i: usize) -> PatientId {
    PatientId::from_index(i)
}

/// Two municipalities, 30 minutes apart, 15-minute self-loops.
fn two_mun_graph() -> CommutingGraph {
    let positions = vec![
        MunPosition { lat: 45.0, lon: 9.0 },
        MunPosition { lat: 45.2, lon: 9.1 },
    ];
    let matrix = vec![vec![15, 30], vec![30, 15]];
    CommutingGraph::from_matrix(positions, &matrix).unwrap()
}

fn day0(home: usize) -> OperatorDay {
    OperatorDay {
        operator: op(0),
        home: mun(home),
        available: true,
        open: 0,
        close: 840,
    }
}

fn spec(p: usize, m: usize, start: i32, end: i32) -> VisitSpec {
    VisitSpec {
        patient: pat(p),
        municipality: mun(m),
        skill: 0,
        day: 0,
        start,
        end,
        operator: Some(op(0)),
        newly_generated: false,
    }
}

// ── Visit state machine ───────────────────────────────────────────────────────

#[cfg(test)]
mod state_machine {
    use super::*;

    #[test]
    fn schedule_copies_anchor_and_live() {
        let mut store = VisitStore::new();
        let id = store.add_proposed(spec(0, 0, 90, 150));
        assert_eq!(store.visit(id).kind(), StateKind::NotScheduled);

        store.visit_mut(id).schedule(0, 90, 150, op(0));
        let v = store.visit(id);
        assert_eq!(v.kind(), StateKind::Scheduled);
        assert_eq!(v.sched(), v.real());
        assert!(v.scheduled_by_manager);
    }

    #[test]
    fn baseline_visits_are_not_manager_scheduled() {
        let mut store = VisitStore::new();
        let id = store.add_baseline_scheduled(spec(0, 0, 90, 150));
        let v = store.visit(id);
        assert_eq!(v.kind(), StateKind::Scheduled);
        assert!(!v.scheduled_by_manager);
    }

    #[test]
    fn start_and_complete_track_real_times() {
        let mut store = VisitStore::new();
        let id = store.add_baseline_scheduled(spec(0, 0, 90, 150));

        store.visit_mut(id).start(0, 95, op(0));
        assert_eq!(store.visit(id).kind(), StateKind::Executing);
        assert_eq!(store.visit(id).real().start, 95);
        // Anchor unchanged.
        assert_eq!(store.visit(id).sched().start, 90);

        store.visit_mut(id).complete(152);
        let v = store.visit(id);
        assert_eq!(v.kind(), StateKind::Executed);
        assert_eq!(v.real().end, 152);
        assert_eq!(v.delay(), 5);
    }

    #[test]
    fn deschedule_clears_placement() {
        let mut store = VisitStore::new();
        let id = store.add_baseline_scheduled(spec(0, 0, 90, 150));
        store.visit_mut(id).deschedule();
        let v = store.visit(id);
        assert_eq!(v.kind(), StateKind::NotScheduled);
        assert!(v.placement().is_none());
    }

    #[test]
    fn shortening_budget_is_15_percent_of_anchor() {
        let mut store = VisitStore::new();
        let id = store.add_baseline_scheduled(spec(0, 0, 90, 150));
        // 60-minute visit: floor is 51, budget 9.
        assert_eq!(store.visit(id).shortening_time(), 9);

        store.visit_mut(id).shrink_start(9);
        assert_eq!(store.visit(id).shortening_time(), 0);
        assert_eq!(store.visit(id).shortened_time(), 9);
    }

    #[test]
    fn postpone_and_anticipate_shift_both_ends() {
        let mut store = VisitStore::new();
        let id = store.add_baseline_scheduled(spec(0, 0, 90, 150));
        store.visit_mut(id).postpone(20);
        assert_eq!((store.visit(id).real().start, store.visit(id).real().end), (110, 170));
        store.visit_mut(id).anticipate(20);
        assert_eq!((store.visit(id).real().start, store.visit(id).real().end), (90, 150));
        assert_eq!(store.visit(id).delay(), 0);
    }
}

// ── VisitStore ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod store {
    use super::*;

    #[test]
    fn conservation_across_books() {
        let mut store = VisitStore::new();
        let a = store.add_baseline_scheduled(spec(0, 0, 90, 150));
        let b = store.add_proposed(spec(1, 0, 180, 240));
        let c = store.add_proposed(spec(2, 1, 300, 360));

        assert!(store.remove(a));
        assert!(store.mark_unplaceable(b));

        assert_eq!(store.active_count(), 1);
        assert_eq!(store.removed().len(), 1);
        assert_eq!(store.unplaceable().len(), 1);
        assert_eq!(store.total_count(), 3);
        assert!(store.get(c).is_some());
        assert!(store.get(a).is_none());
    }

    #[test]
    fn itinerary_is_sorted_by_start() {
        let mut store = VisitStore::new();
        let late = store.add_baseline_scheduled(spec(0, 0, 300, 360));
        let early = store.add_baseline_scheduled(spec(1, 0, 90, 150));
        assert_eq!(store.itinerary(op(0), 0), vec![early, late]);
    }

    #[test]
    fn scheduled_itinerary_skips_started_visits() {
        let mut store = VisitStore::new();
        let a = store.add_baseline_scheduled(spec(0, 0, 90, 150));
        let b = store.add_baseline_scheduled(spec(1, 0, 180, 240));
        store.visit_mut(a).start(0, 90, op(0));

        assert_eq!(store.scheduled_itinerary(op(0), 0), vec![b]);
        assert_eq!(store.itinerary(op(0), 0), vec![a, b]);
    }

    #[test]
    fn duration_distribution_normalizes() {
        let mut store = VisitStore::new();
        store.add_proposed(spec(0, 0, 90, 150)); // 60
        store.add_proposed(spec(1, 0, 90, 150)); // 60
        store.add_proposed(spec(2, 0, 90, 120)); // 30

        let distr = store.duration_distribution(0);
        assert_eq!(distr.len(), 2);
        assert_eq!(distr[0].0, 30);
        assert!((distr[0].1 - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(distr[1].0, 60);
        assert!((distr[1].1 - 2.0 / 3.0).abs() < 1e-12);

        assert!(store.duration_distribution(1).is_empty());
    }
}

// ── Free windows ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod free_windows {
    use super::*;

    #[test]
    fn empty_day_is_one_window_minus_travel() {
        let graph = two_mun_graph();
        let w = windows::municipality_windows(&graph, &day0(0), &[], mun(1));
        // 30 minutes out, 30 minutes back.
        assert_eq!(w, vec![(30, 810)]);
    }

    #[test]
    fn unavailable_operator_has_no_windows() {
        let graph = two_mun_graph();
        let mut od = day0(0);
        od.available = false;
        assert!(windows::municipality_windows(&graph, &od, &[], mun(1)).is_empty());
    }

    #[test]
    fn windows_shrink_around_existing_stops() {
        let graph = two_mun_graph();
        let mut store = VisitStore::new();
        store.add_baseline_scheduled(spec(0, 0, 200, 260));
        let stops = store.day_stops(op(0), 0);

        let w = windows::municipality_windows(&graph, &day0(0), &stops, mun(0));
        // Before: home(0)→target 15 in, stop starts 200 minus 15 back.
        // After: stop ends 260 plus 15, close 840 minus 15.
        assert_eq!(w, vec![(15, 185), (275, 825)]);
    }

    #[test]
    fn empty_windows_are_dropped() {
        let graph = two_mun_graph();
        let mut store = VisitStore::new();
        // Back-to-back stops leave no room in municipality 1.
        store.add_baseline_scheduled(spec(0, 0, 100, 160));
        store.add_baseline_scheduled(spec(1, 0, 175, 235));
        let stops = store.day_stops(op(0), 0);

        let w = windows::municipality_windows(&graph, &day0(0), &stops, mun(1));
        // The middle gap (190, 145) is inverted and must be gone.
        assert!(w.iter().all(|&(a, b)| a <= b));
        assert_eq!(w.len(), 2);
    }

    #[test]
    fn clip_and_count() {
        let w = vec![(30, 180), (300, 420)];
        let clipped = windows::clip_windows(&w, 60, 360);
        assert_eq!(clipped, vec![(60, 180), (300, 360)]);

        // (180-60+15)/(60+15) = 1; (360-300+15)/75 = 1.
        assert_eq!(windows::count_fitting_visits(&clipped, 60), 2);
        assert_eq!(windows::count_fitting_visits(&clipped, 120), 1);
    }

    #[test]
    fn start_times_follow_the_grid() {
        let w = vec![(100, 250)];
        let times = windows::start_times(&w, 60);
        // First grid slot ≥ 100 with room for 60 minutes: 105.
        assert_eq!(times.first(), Some(&105));
        assert_eq!(times.last(), Some(&180));
        assert!(times.iter().all(|t| t % 15 == 0));
    }

    #[test]
    fn contains_period_needs_full_containment() {
        let w = vec![(100, 200)];
        assert!(windows::contains_period(&w, 100, 200));
        assert!(windows::contains_period(&w, 120, 180));
        assert!(!windows::contains_period(&w, 90, 150));
        assert!(!windows::contains_period(&w, 150, 210));
    }
}

// ── Mutation algebra ──────────────────────────────────────────────────────────

#[cfg(test)]
mod algebra {
    use super::*;

    fn edit<'a>(graph: &'a CommutingGraph, od: OperatorDay) -> ItineraryEdit<'a> {
        ItineraryEdit { graph, op: od, day: 0, handle_delay: true }
    }

    #[test]
    fn cumulable_delay_empty_itinerary_is_sentinel() {
        let graph = two_mun_graph();
        let store = VisitStore::new();
        let e = edit(&graph, day0(0));
        assert_eq!(e.cumulable_delay(&store, None, None), -1);
    }

    #[test]
    fn cumulable_delay_counts_gaps_and_budgets() {
        let graph = two_mun_graph();
        let mut store = VisitStore::new();
        store.add_baseline_scheduled(spec(0, 0, 90, 150));
        store.add_baseline_scheduled(spec(1, 0, 180, 240));
        let e = edit(&graph, day0(0));

        // From 150 to end of day: inter-visit gap excess 180-150-15 = 15,
        // second visit's shortening budget 9, tail margin 840-240-15 = 585.
        assert_eq!(e.cumulable_delay(&store, Some(150), None), 15 + 9 + 585);
    }

    #[test]
    fn cumulable_delay_bounded_window_is_the_free_lag() {
        let graph = two_mun_graph();
        let mut store = VisitStore::new();
        store.add_baseline_scheduled(spec(0, 0, 90, 150));
        store.add_baseline_scheduled(spec(1, 0, 180, 240));
        let e = edit(&graph, day0(0));

        assert_eq!(e.cumulable_delay(&store, Some(150), Some(180)), 15);
    }

    #[test]
    fn extend_last_visit_stretches_freely() {
        let graph = two_mun_graph();
        let mut store = VisitStore::new();
        let id = store.add_baseline_scheduled(spec(0, 0, 90, 150));
        let e = edit(&graph, day0(0));

        assert_eq!(e.extend_visit(&mut store, id, 45), 0);
        assert_eq!(store.visit(id).real().end, 195);
    }

    #[test]
    fn extend_cascades_shrink_then_postpone() {
        let graph = two_mun_graph();
        let mut store = VisitStore::new();
        let v1 = store.add_baseline_scheduled(spec(0, 0, 90, 150));
        let v2 = store.add_baseline_scheduled(spec(1, 0, 180, 240));
        let e = edit(&graph, day0(0));

        assert_eq!(e.extend_visit(&mut store, v1, 30), 0);

        // v1 ran to 180; v2 gave its 9-minute budget from the start and was
        // postponed by the remaining 6.
        assert_eq!(store.visit(v1).real().end, 180);
        assert_eq!(store.visit(v2).real().start, 195);
        assert_eq!(store.visit(v2).real().end, 246);
        assert_eq!(store.visit(v2).shortened_time(), 9);

        // No double-booking: 180 + 15 travel ≤ 195.
        let stops = store.day_stops(op(0), 0);
        assert!(stops[0].end + 15 <= stops[1].start);
    }

    #[test]
    fn unabsorbable_extension_sheds_last_scheduled_visit() {
        let graph = two_mun_graph();
        let mut store = VisitStore::new();
        let v1 = store.add_baseline_scheduled(spec(0, 0, 90, 150));
        let v2 = store.add_baseline_scheduled(spec(1, 1, 180, 240));
        let mut od = day0(0);
        od.close = 300; // tight day: little slack after v2
        let e = edit(&graph, od);

        // Slack after 150: gap 180-150-30 = 0, budget 9, tail 300-240-30 = 30,
        // no overrun. 150 > 39 + 60 → v2 must go.
        let descheduled = e.extend_visit(&mut store, v1, 150);
        assert_eq!(descheduled, 1);
        assert_eq!(store.visit(v2).kind(), StateKind::NotScheduled);
        // v1 became last of the day and stretched freely.
        assert_eq!(store.visit(v1).real().end, 300);
    }

    #[test]
    fn shorten_recovers_a_delayed_follower() {
        let graph = two_mun_graph();
        let mut store = VisitStore::new();
        let v1 = store.add_baseline_scheduled(spec(0, 0, 90, 150));
        let v2 = store.add_baseline_scheduled(spec(1, 0, 180, 240));
        store.visit_mut(v2).postpone(15); // running 15 late
        let e = edit(&graph, day0(0));

        // v1 finishes 30 early.
        e.shorten_visit(&mut store, v1, 30);

        assert_eq!(store.visit(v1).real().end, 120);
        // v2 is pulled back onto its anchor.
        assert_eq!(store.visit(v2).real().start, 180);
        assert_eq!(store.visit(v2).delay(), 0);
    }

    #[test]
    fn shorten_gives_compressed_time_back_to_last_visit() {
        let graph = two_mun_graph();
        let mut store = VisitStore::new();
        let v1 = store.add_baseline_scheduled(spec(0, 0, 90, 150));
        let v2 = store.add_baseline_scheduled(spec(1, 0, 180, 240));
        // v2 was previously shrunk by 9 from its start (delay cascade).
        store.visit_mut(v2).shrink_start(9);
        assert_eq!(store.visit(v2).shortened_time(), 9);
        let e = edit(&graph, day0(0));

        // v1 finishes 20 early: plenty of lag, v2 ends on schedule again.
        e.shorten_visit(&mut store, v1, 20);
        assert_eq!(store.visit(v2).shortened_time(), 0);
        assert_eq!(store.visit(v2).real().duration(), store.visit(v2).sched().duration());
    }

    #[test]
    fn handle_delay_off_disables_shrinking() {
        let graph = two_mun_graph();
        let mut store = VisitStore::new();
        let v1 = store.add_baseline_scheduled(spec(0, 0, 90, 150));
        let v2 = store.add_baseline_scheduled(spec(1, 0, 180, 240));
        let mut e = edit(&graph, day0(0));
        e.handle_delay = false;

        e.extend_visit(&mut store, v1, 30);

        // Without absorption v2 keeps its duration and is postponed whole.
        assert_eq!(store.visit(v2).shortened_time(), 0);
        assert_eq!(store.visit(v2).real().start, 195);
    }
}
