//! The schedule-mutation algebra.
//!
//! # Design
//!
//! All operations edit one operator's day itinerary, always through visit
//! IDs so every read goes back to the store after the previous mutation.
//! [`ItineraryEdit`] bundles the read-only context (graph, the operator's
//! day parameters, whether delay absorption is enabled); the store is passed
//! per call because the caller usually holds it mutably for other work too.
//!
//! The central quantity is *cumulable delay*: the slack available inside a
//! time window, i.e. every gap between consecutive stops in excess of the
//! required travel, the bookending home-to-first and last-to-home margins,
//! and the per-visit shortening budgets (a visit may compress to 85 % of
//! its scheduled duration).  An overrun is absorbable iff it fits in the
//! cumulable delay plus the allowed-delay grace; otherwise the day sheds
//! its last scheduled visit and tries again.

use tracing::{debug, trace};

use hc_core::time::MAX_ALLOWED_DELAY;
use hc_core::{Day, Minute, VisitId};
use hc_spatial::CommutingGraph;

use crate::store::VisitStore;
use crate::visit::StateKind;
use crate::windows::OperatorDay;

/// Editing context for one operator-day.
pub struct ItineraryEdit<'a> {
    pub graph: &'a CommutingGraph,
    pub op: OperatorDay,
    pub day: Day,
    /// When false, shrink/stretch absorption is disabled and overruns
    /// propagate raw (measurement mode).
    pub handle_delay: bool,
}

impl ItineraryEdit<'_> {
    // ── Slack accounting ──────────────────────────────────────────────────

    /// Earliest time the operator can be back home after the day's last
    /// stop, floored by the contractual end of day.
    pub fn estimated_return_home(&self, store: &VisitStore) -> Minute {
        let stops = store.day_stops(self.op.operator, self.day);
        match stops.last() {
            None => self.op.close,
            Some(last) => {
                let home_leg = self.graph.travel_time(last.municipality, self.op.home);
                (last.end + home_leg).max(self.op.close)
            }
        }
    }

    /// Slack available between `from` and `to` to absorb delays.
    ///
    /// `None` bounds default to the operator's day window.  When `to` is
    /// `None` the result is additionally reduced by any projected overrun of
    /// the return-home time past the end of day.  Returns −1 for an empty
    /// itinerary (no schedule, nothing to absorb into).
    pub fn cumulable_delay(
        &self,
        store: &VisitStore,
        from: Option<Minute>,
        to: Option<Minute>,
    ) -> Minute {
        let stops = store.day_stops(self.op.operator, self.day);
        if stops.is_empty() {
            return -1;
        }

        let from_t = from.unwrap_or(self.op.open);
        let to_t = to.unwrap_or(self.op.close);
        let mut slack: Minute = 0;

        // Home → first stop margin.
        let first = &stops[0];
        let leg = self.graph.travel_time(self.op.home, first.municipality);
        slack += (to_t.min(first.start) - from_t - leg).max(0);

        if from_t < first.end {
            let shortening = store.visit(first.id).shortening_time();
            slack += shortening.min(first.end - from_t);
        }

        // Gap excess between consecutive stops, plus the next stop's
        // shortening budget when it lies inside the window.
        for pair in stops.windows(2) {
            let (cur, next) = (&pair[0], &pair[1]);
            let leg = self.graph.travel_time(cur.municipality, next.municipality);
            slack += (next.start.min(to_t) - from_t.max(cur.end) - leg).max(0);

            if from_t < next.end && next.start < to_t {
                let shortening = store.visit(next.id).shortening_time();
                slack += shortening.min(next.end - from_t).min(to_t - next.start);
            }
        }

        // Last stop → home margin.
        let last = &stops[stops.len() - 1];
        let leg = self.graph.travel_time(last.municipality, self.op.home);
        slack += (to_t - from_t.max(last.end) - leg).max(0);

        // Open-ended window: subtract any projected overrun past end of day.
        if to.is_none() {
            slack += self.op.close - self.estimated_return_home(store);
        }

        slack
    }

    // ── Overrun absorption ────────────────────────────────────────────────

    /// The visit at `id` ran `delta` minutes long: stretch it and ripple the
    /// delay through the rest of the day.
    ///
    /// Subsequent visits first give up their shortening budget, then are
    /// postponed by whatever remains.  If the overrun exceeds the cumulable
    /// slack plus the allowed-delay grace, the day's last SCHEDULED visit is
    /// descheduled and the absorption retried.  Returns how many visits were
    /// descheduled.
    pub fn extend_visit(&self, store: &mut VisitStore, id: VisitId, delta: Minute) -> u32 {
        let mut descheduled = 0;

        loop {
            let itinerary = store.itinerary(self.op.operator, self.day);
            let Some(pos) = itinerary.iter().position(|&v| v == id) else {
                // The visit left the day (e.g. descheduled underneath us).
                return descheduled;
            };

            // Last of the day: stretch freely, nothing follows.
            if pos == itinerary.len() - 1 {
                store.visit_mut(id).stretch_end(delta);
                return descheduled;
            }

            let visit_end = store.visit(id).real().end;
            let slack = self.cumulable_delay(store, Some(visit_end), None);

            if slack + MAX_ALLOWED_DELAY > delta {
                // Absorbable: walk forward shrinking and postponing.
                let mut to_postpone: Vec<(VisitId, Minute)> = Vec::new();
                let mut carry = delta;
                let mut i = pos;
                while carry > 0 && i < itinerary.len() - 1 {
                    let this = itinerary[i];
                    let next = itinerary[i + 1];
                    let leg = self.graph.travel_time(
                        store.visit(this).municipality,
                        store.visit(next).municipality,
                    );

                    let this_end = store.visit(this).real().end;
                    let next_start = store.visit(next).real().start;
                    let mut postponing = (this_end + leg + carry - next_start).max(0);
                    postponing = self.try_shrink(store, next, postponing);

                    if postponing > 0 {
                        to_postpone.push((next, postponing));
                    }
                    carry = postponing;
                    i += 1;
                }

                for (vid, by) in to_postpone {
                    trace!(visit = %vid, by, "postponing visit");
                    store.visit_mut(vid).postpone(by);
                }
                store.visit_mut(id).stretch_end(delta);
                return descheduled;
            }

            // Not absorbable: shed the day's last scheduled visit and retry.
            let last_scheduled = itinerary
                .iter()
                .rev()
                .copied()
                .find(|&v| store.visit(v).kind() == StateKind::Scheduled);
            match last_scheduled {
                Some(shed) => {
                    debug!(visit = %shed, "overrun unabsorbable, descheduling");
                    store.visit_mut(shed).deschedule();
                    descheduled += 1;
                }
                None => {
                    // Nothing left to shed; stretch and accept the overrun.
                    store.visit_mut(id).stretch_end(delta);
                    return descheduled;
                }
            }
        }
    }

    /// Shrink `next` from its start by up to its shortening budget, returning
    /// the postponement still required afterwards.
    fn try_shrink(&self, store: &mut VisitStore, id: VisitId, postponing: Minute) -> Minute {
        if !self.handle_delay || postponing <= 0 {
            return postponing;
        }
        let budget = store.visit(id).shortening_time();
        if budget <= 0 {
            return postponing;
        }
        let shrink = budget.min(postponing);
        trace!(visit = %id, shrink, "shrinking visit from its start");
        store.visit_mut(id).shrink_start(shrink);
        postponing - shrink
    }

    /// Stretch `id` back toward its scheduled duration by up to
    /// `stretch`, bounded by the slack after its end.  Returns the updated
    /// recovered-time budget.
    fn try_stretch(
        &self,
        store: &mut VisitStore,
        id: VisitId,
        stretch: Minute,
        recovered: Minute,
    ) -> Minute {
        if !self.handle_delay || stretch <= 0 {
            return recovered;
        }
        let visit_end = store.visit(id).real().end;
        let slack = self.cumulable_delay(store, Some(visit_end), None).max(0);
        let stretch = stretch.min(slack);
        if stretch <= 0 {
            return recovered;
        }
        trace!(visit = %id, stretch, "stretching visit toward its schedule");
        store.visit_mut(id).stretch_end(stretch);
        recovered - stretch
    }

    // ── Early-finish recovery ─────────────────────────────────────────────

    /// The visit at `id` finished `delta` minutes early: shrink it and pull
    /// the rest of the day back toward the scheduled plan.
    ///
    /// Each later visit is anticipated by the smaller of its accumulated
    /// delay and the free lag before it; visits previously compressed get
    /// their time back where the recovered budget allows.
    pub fn shorten_visit(&self, store: &mut VisitStore, id: VisitId, delta: Minute) {
        store.visit_mut(id).shrink_end(delta);

        let itinerary = store.itinerary(self.op.operator, self.day);
        let Some(v) = store.get(id) else { return };
        let from_start = v.real().start;
        let tail: Vec<VisitId> = itinerary
            .into_iter()
            .filter(|&vid| store.visit(vid).real().start >= from_start)
            .collect();
        if tail.is_empty() {
            return;
        }

        let mut recovered = delta;

        for i in 0..tail.len().saturating_sub(1) {
            let this = tail[i];
            let next = tail[i + 1];

            let this_end = store.visit(this).real().end;
            let next_start = store.visit(next).real().start;
            let mut lag = self.cumulable_delay(store, Some(this_end), Some(next_start));

            let shortened = if i != 0 { store.visit(this).shortened_time() } else { 0 };
            let delay = store.visit(next).delay();

            let anticipate = lag.min(delay);
            if anticipate > 0 {
                trace!(visit = %next, anticipate, "anticipating visit");
                store.visit_mut(next).anticipate(anticipate);
                lag -= anticipate;
            }

            let stretch = shortened.min(lag).min(recovered);
            recovered = self.try_stretch(store, this, stretch, recovered);
        }

        // Give the last visit its compressed time back, bounded by the lag
        // before the trip home.
        let last = tail[tail.len() - 1];
        let last_shortened = store.visit(last).shortened_time();
        let (last_end, last_mun) = {
            let v = store.visit(last);
            (v.real().end, v.municipality)
        };
        let home_leg = self.graph.travel_time(last_mun, self.op.home);
        let lag = (self.op.close - last_end - home_leg).max(0);

        let stretch = last_shortened.min(recovered).min(lag);
        if stretch > 0 {
            trace!(visit = %last, stretch, "stretching last visit of the day");
            store.visit_mut(last).stretch_end(stretch);
        }
    }
}
