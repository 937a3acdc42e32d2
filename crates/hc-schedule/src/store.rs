//! `VisitStore` — the arena that owns every visit.
//!
//! Three books: `active` (live visits, whatever their state), `removed`
//! (cancelled by patients) and `unplaceable` (given up on by the
//! dispatcher).  A visit moves between books at most once and IDs are never
//! reused, so `active + removed + unplaceable` always equals baseline plus
//! newly generated.
//!
//! Lookup is a linear scan over the active book.  Populations are tens of
//! patients and a few hundred visits; keeping the book a plain `Vec` makes
//! removal, iteration order, and the conservation invariant trivial.

use rustc_hash::FxHashMap;

use hc_core::{Day, Minute, MunicipalityId, OperatorId, PatientId, VisitId};

use crate::visit::{StateKind, Visit};

// ── Stop ──────────────────────────────────────────────────────────────────────

/// One entry of an operator's day itinerary: the visit's live timing plus
/// where it happens.  Extracted snapshot — re-fetch after mutating.
#[derive(Copy, Clone, Debug)]
pub struct Stop {
    pub id: VisitId,
    pub municipality: MunicipalityId,
    pub start: Minute,
    pub end: Minute,
}

// ── VisitSpec ─────────────────────────────────────────────────────────────────

/// Everything needed to mint a new visit (the store assigns the ID).
#[derive(Clone, Debug)]
pub struct VisitSpec {
    pub patient: PatientId,
    pub municipality: MunicipalityId,
    pub skill: u8,
    pub day: Day,
    pub start: Minute,
    pub end: Minute,
    pub operator: Option<OperatorId>,
    pub newly_generated: bool,
}

// ── VisitStore ────────────────────────────────────────────────────────────────

/// Owner of all visits, live and retired.
#[derive(Default)]
pub struct VisitStore {
    active: Vec<Visit>,
    removed: Vec<Visit>,
    unplaceable: Vec<Visit>,
    next_index: usize,
}

impl VisitStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Creation ──────────────────────────────────────────────────────────

    /// Mint a NOT_SCHEDULED visit request.
    pub fn add_proposed(&mut self, spec: VisitSpec) -> VisitId {
        let id = self.next_id();
        self.active.push(Visit::proposed(
            id,
            spec.patient,
            spec.municipality,
            spec.skill,
            spec.day,
            spec.start,
            spec.end,
            spec.operator,
            spec.newly_generated,
        ));
        id
    }

    /// Mint a baseline visit that starts out SCHEDULED with `operator`.
    ///
    /// # Panics
    /// Panics if `spec.operator` is `None` — a scheduled visit needs one.
    pub fn add_baseline_scheduled(&mut self, spec: VisitSpec) -> VisitId {
        let operator = spec.operator.expect("baseline scheduled visit needs an operator");
        let id = self.next_id();
        self.active.push(Visit::baseline_scheduled(
            id,
            spec.patient,
            spec.municipality,
            spec.skill,
            spec.day,
            spec.start,
            spec.end,
            operator,
        ));
        id
    }

    fn next_id(&mut self) -> VisitId {
        let id = VisitId::from_index(self.next_index);
        self.next_index += 1;
        id
    }

    // ── Lookup ────────────────────────────────────────────────────────────

    pub fn get(&self, id: VisitId) -> Option<&Visit> {
        self.active.iter().find(|v| v.id == id)
    }

    pub fn get_mut(&mut self, id: VisitId) -> Option<&mut Visit> {
        self.active.iter_mut().find(|v| v.id == id)
    }

    /// # Panics
    /// Panics if `id` is not in the active book.  Itinerary code only holds
    /// IDs of live visits.
    #[track_caller]
    pub fn visit(&self, id: VisitId) -> &Visit {
        self.get(id).expect("visit not in active book")
    }

    /// # Panics
    /// Panics if `id` is not in the active book.
    #[track_caller]
    pub fn visit_mut(&mut self, id: VisitId) -> &mut Visit {
        self.get_mut(id).expect("visit not in active book")
    }

    // ── Book movement ─────────────────────────────────────────────────────

    /// Move an active visit to the removed book (patient cancellation).
    /// Returns false if the ID is unknown.
    pub fn remove(&mut self, id: VisitId) -> bool {
        match self.active.iter().position(|v| v.id == id) {
            Some(pos) => {
                self.removed.push(self.active.remove(pos));
                true
            }
            None => false,
        }
    }

    /// Move an active visit to the unplaceable book (dispatch gave up).
    pub fn mark_unplaceable(&mut self, id: VisitId) -> bool {
        match self.active.iter().position(|v| v.id == id) {
            Some(pos) => {
                self.unplaceable.push(self.active.remove(pos));
                true
            }
            None => false,
        }
    }

    // ── Iteration ─────────────────────────────────────────────────────────

    pub fn iter(&self) -> impl Iterator<Item = &Visit> {
        self.active.iter()
    }

    pub fn removed(&self) -> &[Visit] {
        &self.removed
    }

    pub fn unplaceable(&self) -> &[Visit] {
        &self.unplaceable
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Total visits ever minted (active + removed + unplaceable).
    pub fn total_count(&self) -> usize {
        self.next_index
    }

    // ── Per-patient queries ───────────────────────────────────────────────

    pub fn of_patient(&self, patient: PatientId) -> impl Iterator<Item = &Visit> {
        self.active.iter().filter(move |v| v.patient == patient)
    }

    /// IDs of the patient's visits, in insertion order.
    pub fn ids_of_patient(&self, patient: PatientId) -> Vec<VisitId> {
        self.of_patient(patient).map(|v| v.id).collect()
    }

    /// `true` if the patient has a placed visit on `day`.
    pub fn patient_has_visit_on(&self, patient: PatientId, day: Day) -> bool {
        self.of_patient(patient)
            .any(|v| v.is_placed() && v.real().day == day)
    }

    // ── Per-operator itineraries ──────────────────────────────────────────

    /// The operator's day itinerary (scheduled, executing, and executed
    /// visits), sorted by live start time.
    pub fn itinerary(&self, operator: OperatorId, day: Day) -> Vec<VisitId> {
        self.sorted_day_visits(operator, day, false)
            .into_iter()
            .map(|v| v.id)
            .collect()
    }

    /// Only the still-SCHEDULED part of the day itinerary, sorted by start.
    pub fn scheduled_itinerary(&self, operator: OperatorId, day: Day) -> Vec<VisitId> {
        self.sorted_day_visits(operator, day, true)
            .into_iter()
            .map(|v| v.id)
            .collect()
    }

    /// Timing snapshot of the day itinerary, sorted by start.
    pub fn day_stops(&self, operator: OperatorId, day: Day) -> Vec<Stop> {
        self.sorted_day_visits(operator, day, false)
            .into_iter()
            .map(|v| Stop {
                id: v.id,
                municipality: v.municipality,
                start: v.real().start,
                end: v.real().end,
            })
            .collect()
    }

    fn sorted_day_visits(&self, operator: OperatorId, day: Day, only_scheduled: bool) -> Vec<&Visit> {
        let mut visits: Vec<&Visit> = self
            .active
            .iter()
            .filter(|v| match v.kind() {
                StateKind::NotScheduled => false,
                StateKind::Scheduled => true,
                StateKind::Executing | StateKind::Executed => !only_scheduled,
            })
            .filter(|v| {
                let real = v.real();
                real.operator == operator && real.day == day
            })
            .collect();
        visits.sort_by_key(|v| v.real().start);
        visits
    }

    // ── Dispatch queries ──────────────────────────────────────────────────

    /// IDs of all NOT_SCHEDULED visits, in insertion order.
    pub fn unscheduled_ids(&self) -> Vec<VisitId> {
        self.active
            .iter()
            .filter(|v| v.kind() == StateKind::NotScheduled)
            .map(|v| v.id)
            .collect()
    }

    // ── Derived distributions ─────────────────────────────────────────────

    /// Normalized distribution of proposed durations among active visits of
    /// the given skill, sorted ascending by duration.  Empty if the skill
    /// has no visits.
    pub fn duration_distribution(&self, skill: u8) -> Vec<(Minute, f64)> {
        let mut counts: FxHashMap<Minute, u32> = FxHashMap::default();
        for v in &self.active {
            if v.skill == skill {
                *counts.entry(v.proposed_duration()).or_insert(0) += 1;
            }
        }
        let total: u32 = counts.values().sum();
        let mut distr: Vec<(Minute, f64)> = counts
            .into_iter()
            .map(|(d, c)| (d, c as f64 / total as f64))
            .collect();
        distr.sort_by_key(|&(d, _)| d);
        distr
    }

    /// How many active visits were generated during the run.
    pub fn newly_generated_count(&self) -> usize {
        self.active.iter().filter(|v| v.newly_generated).count()
    }
}
