//! The `Visit` entity and its state machine.
//!
//! # State model
//!
//! A visit's placement is a sum type rather than nullable fields: either the
//! visit is `Unscheduled` (no timing data exists) or it is `Placed` with two
//! complete slots — `sched`, the anchor written once at scheduling time, and
//! `real`, the live copy that the mutation algebra and the operator state
//! machine edit as the day unfolds.  Delay and shortening budgets are always
//! measured against `sched`; wall-clock execution follows `real`.
//!
//! Legal transitions (everything else is a logic error, checked by debug
//! assertions):
//!
//! ```text
//! NOT_SCHEDULED ── schedule ──▶ SCHEDULED ── start ──▶ EXECUTING ── complete ──▶ EXECUTED
//!       ▲                          │
//!       └────── deschedule ────────┘
//! ```

use hc_core::time::SHORTEN_PCT;
use hc_core::{Day, Minute, MunicipalityId, OperatorId, PatientId, VisitId};

// ── Slot ──────────────────────────────────────────────────────────────────────

/// A concrete (day, start, end, operator) placement.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Slot {
    pub day: Day,
    pub start: Minute,
    pub end: Minute,
    pub operator: OperatorId,
}

impl Slot {
    #[inline]
    pub fn duration(&self) -> Minute {
        self.end - self.start
    }
}

// ── Placement ─────────────────────────────────────────────────────────────────

/// Scheduled anchor plus live copy.  `real == sched` immediately after
/// scheduling; only `real` moves afterwards.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Placement {
    pub sched: Slot,
    pub real: Slot,
}

impl Placement {
    fn new(slot: Slot) -> Self {
        Placement { sched: slot, real: slot }
    }
}

// ── State ─────────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Eq)]
enum State {
    NotScheduled,
    Scheduled(Placement),
    Executing(Placement),
    Executed(Placement),
}

/// Discriminant of [`Visit`]'s state, for queries that don't need the slots.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum StateKind {
    NotScheduled,
    Scheduled,
    Executing,
    Executed,
}

// ── Visit ─────────────────────────────────────────────────────────────────────

/// A single care appointment.
///
/// Owned by the model's `VisitStore`; operators and the dispatcher hold
/// non-owning `VisitId` references.
#[derive(Clone, Debug)]
pub struct Visit {
    pub id: VisitId,
    pub patient: PatientId,
    /// The patient's municipality, denormalized at creation (it never
    /// changes) so itinerary math needs no patient lookups.
    pub municipality: MunicipalityId,
    /// Required skill level (0 or 1).
    pub skill: u8,

    // ── Proposed data (the request, never mutated by execution) ───────────
    pub proposed_day: Day,
    pub proposed_start: Minute,
    pub proposed_end: Minute,
    pub proposed_operator: Option<OperatorId>,

    state: State,

    pub newly_generated: bool,
    /// Set on every `schedule()` call — distinguishes online placements
    /// from the baseline plan.
    pub scheduled_by_manager: bool,
    /// Transiently set by the dispatcher while it probes alternative days,
    /// so the original request day is excluded from the search.
    pub original_day: Option<Day>,
}

impl Visit {
    /// A fresh, not-yet-scheduled visit request.
    #[allow(clippy::too_many_arguments)]
    pub fn proposed(
        id: VisitId,
        patient: PatientId,
        municipality: MunicipalityId,
        skill: u8,
        day: Day,
        start: Minute,
        end: Minute,
        operator: Option<OperatorId>,
        newly_generated: bool,
    ) -> Visit {
        Visit {
            id,
            patient,
            municipality,
            skill,
            proposed_day: day,
            proposed_start: start,
            proposed_end: end,
            proposed_operator: operator,
            state: State::NotScheduled,
            newly_generated,
            scheduled_by_manager: false,
            original_day: None,
        }
    }

    /// A baseline visit that enters the simulation already SCHEDULED at its
    /// proposed slot with `operator` (the offline plan's choice).
    #[allow(clippy::too_many_arguments)]
    pub fn baseline_scheduled(
        id: VisitId,
        patient: PatientId,
        municipality: MunicipalityId,
        skill: u8,
        day: Day,
        start: Minute,
        end: Minute,
        operator: OperatorId,
    ) -> Visit {
        let mut v = Visit::proposed(
            id, patient, municipality, skill, day, start, end, Some(operator), false,
        );
        v.state = State::Scheduled(Placement::new(Slot { day, start, end, operator }));
        v
    }

    // ── Queries ───────────────────────────────────────────────────────────

    #[inline]
    pub fn kind(&self) -> StateKind {
        match self.state {
            State::NotScheduled => StateKind::NotScheduled,
            State::Scheduled(_) => StateKind::Scheduled,
            State::Executing(_) => StateKind::Executing,
            State::Executed(_) => StateKind::Executed,
        }
    }

    #[inline]
    pub fn is_placed(&self) -> bool {
        !matches!(self.state, State::NotScheduled)
    }

    /// Placement if the visit is scheduled, executing, or executed.
    pub fn placement(&self) -> Option<&Placement> {
        match &self.state {
            State::NotScheduled => None,
            State::Scheduled(p) | State::Executing(p) | State::Executed(p) => Some(p),
        }
    }

    fn placement_mut(&mut self) -> Option<&mut Placement> {
        match &mut self.state {
            State::NotScheduled => None,
            State::Scheduled(p) | State::Executing(p) | State::Executed(p) => Some(p),
        }
    }

    /// Live slot.
    ///
    /// # Panics
    /// Panics if the visit is not scheduled.  Itinerary code only ever holds
    /// IDs of placed visits.
    #[inline]
    #[track_caller]
    pub fn real(&self) -> &Slot {
        &self.placement().expect("visit has no placement").real
    }

    /// Scheduled anchor slot.
    ///
    /// # Panics
    /// Panics if the visit is not scheduled.
    #[inline]
    #[track_caller]
    pub fn sched(&self) -> &Slot {
        &self.placement().expect("visit has no placement").sched
    }

    #[inline]
    pub fn proposed_duration(&self) -> Minute {
        self.proposed_end - self.proposed_start
    }

    // ── Derived budgets ───────────────────────────────────────────────────

    /// Minutes by which the visit can still be compressed before dropping
    /// below `1 − SHORTEN_PCT` of its scheduled duration.
    pub fn shortening_time(&self) -> Minute {
        let p = match self.placement() {
            Some(p) => p,
            None => return 0,
        };
        let floor = p.sched.duration() as f64 * (1.0 - SHORTEN_PCT);
        (p.real.duration() as f64 - floor).max(0.0) as Minute
    }

    /// Signed amount already taken off the scheduled duration (negative if
    /// the visit has been stretched past it).
    pub fn shortened_time(&self) -> Minute {
        match self.placement() {
            Some(p) => p.sched.duration() - p.real.duration(),
            None => 0,
        }
    }

    /// Current start delay against the scheduled anchor (signed).
    pub fn delay(&self) -> Minute {
        match self.placement() {
            Some(p) => p.real.start - p.sched.start,
            None => 0,
        }
    }

    // ── Transitions ───────────────────────────────────────────────────────

    /// NOT_SCHEDULED → SCHEDULED.  Writes both anchor and live slots and
    /// marks the visit as placed by the online dispatcher.
    pub fn schedule(&mut self, day: Day, start: Minute, end: Minute, operator: OperatorId) {
        debug_assert!(
            matches!(self.state, State::NotScheduled),
            "schedule() on a visit that is already placed"
        );
        self.state = State::Scheduled(Placement::new(Slot { day, start, end, operator }));
        self.scheduled_by_manager = true;
    }

    /// SCHEDULED → NOT_SCHEDULED.  Drops all timing data.
    pub fn deschedule(&mut self) {
        debug_assert!(
            matches!(self.state, State::Scheduled(_)),
            "deschedule() on a visit that is not in SCHEDULED"
        );
        self.state = State::NotScheduled;
    }

    /// SCHEDULED → EXECUTING.  Records the actual start.
    pub fn start(&mut self, day: Day, time: Minute, operator: OperatorId) {
        debug_assert!(
            matches!(self.state, State::Scheduled(_)),
            "start() on a visit that is not in SCHEDULED"
        );
        if let Some(p) = self.placement_mut() {
            p.real.day = day;
            p.real.start = time;
            p.real.operator = operator;
            let placement = *p;
            self.state = State::Executing(placement);
        }
    }

    /// EXECUTING → EXECUTED.  Records the actual end.
    pub fn complete(&mut self, time: Minute) {
        debug_assert!(
            matches!(self.state, State::Executing(_)),
            "complete() on a visit that is not in EXECUTING"
        );
        if let Some(p) = self.placement_mut() {
            p.real.end = time;
            let placement = *p;
            self.state = State::Executed(placement);
        }
    }

    // ── Live-slot mutators (no state change) ──────────────────────────────

    /// Grow the visit by moving its start earlier.
    pub fn stretch_start(&mut self, delta: Minute) {
        if let Some(p) = self.placement_mut() {
            p.real.start -= delta;
        }
    }

    /// Grow the visit by moving its end later.
    pub fn stretch_end(&mut self, delta: Minute) {
        if let Some(p) = self.placement_mut() {
            p.real.end += delta;
        }
    }

    /// Compress the visit by moving its start later.
    pub fn shrink_start(&mut self, delta: Minute) {
        if let Some(p) = self.placement_mut() {
            p.real.start += delta;
        }
    }

    /// Compress the visit by moving its end earlier.
    pub fn shrink_end(&mut self, delta: Minute) {
        if let Some(p) = self.placement_mut() {
            p.real.end -= delta;
        }
    }

    /// Shift the whole visit later.
    pub fn postpone(&mut self, delta: Minute) {
        if let Some(p) = self.placement_mut() {
            p.real.start += delta;
            p.real.end += delta;
        }
    }

    /// Shift the whole visit earlier.
    pub fn anticipate(&mut self, delta: Minute) {
        if let Some(p) = self.placement_mut() {
            p.real.start -= delta;
            p.real.end -= delta;
        }
    }
}
