//! Derivation of end-of-run metrics from a finished model.

use serde::Serialize;

use hc_core::{Day, Minute};
use hc_schedule::StateKind;
use hc_sim::HomeCareModel;

// ── Per-operator row ──────────────────────────────────────────────────────────

/// One row of the operator statistics table.
#[derive(Clone, Debug, Serialize)]
pub struct OperatorRow {
    pub operator: u32,
    pub skill: u8,
    pub contract_time: Minute,
    pub max_time: Minute,
    pub assigned_patients: usize,
    pub total_visits: usize,
    pub not_executed_visits: usize,
    pub workload: Minute,
    pub overtime: Minute,
    pub travel_time: Minute,
    pub inter_travel_time: Minute,
    pub overskill_visits: u32,
    pub overskill_time: Minute,
    pub total_wage: f64,
}

// ── RunReport ─────────────────────────────────────────────────────────────────

/// The decomposed objective plus run-level operational metrics.
#[derive(Clone, Debug)]
pub struct RunReport {
    pub objective: f64,
    pub wage_component: f64,
    pub movement_component: f64,
    pub overskill_component: f64,
    pub not_executed_component: f64,

    /// Mean start delay of executed visits against their anchors.
    pub average_visit_delay: f64,
    /// Mean |scheduled − proposed| start offset of manager-placed visits.
    pub average_time_offset: f64,
    /// Histogram: how many patients were seen by 0, 1, 2, … operators.
    pub operators_per_patient: Vec<usize>,
    /// Unplaceable visits bucketed by their proposed day.
    pub unplaceable_per_day: Vec<usize>,

    pub overly_delayed_visits: u32,
    pub newly_generated_visits: usize,
    pub removed_visits: usize,
    pub is_broken: bool,

    pub rows: Vec<OperatorRow>,
}

impl RunReport {
    pub fn from_model(model: &HomeCareModel) -> RunReport {
        let params = &model.params;

        // ── Objective decomposition ───────────────────────────────────────
        let wage_component: f64 = model
            .operators
            .iter()
            .map(|op| op.total_wage(params))
            .sum();
        let movement_component: f64 = model
            .operators
            .iter()
            .map(|op| op.travel_to_reimburse as f64)
            .sum::<f64>()
            * params.c_movement;
        let overskill_component: f64 = model
            .operators
            .iter()
            .map(|op| op.overskill_visits as f64)
            .sum::<f64>()
            * params.c_overskill;
        let not_executed_component: f64 = model
            .operators
            .iter()
            .map(|op| model.not_executed_visits(op.id) as f64)
            .sum::<f64>()
            * params.c_execution;

        // ── Delay and offset metrics ──────────────────────────────────────
        let executed: Vec<_> = model
            .visits
            .iter()
            .filter(|v| v.kind() == StateKind::Executed)
            .collect();
        let average_visit_delay = if executed.is_empty() {
            0.0
        } else {
            executed.iter().map(|v| v.delay() as f64).sum::<f64>() / executed.len() as f64
        };

        let offsets: Vec<f64> = model
            .visits
            .iter()
            .filter(|v| {
                v.scheduled_by_manager
                    && matches!(v.kind(), StateKind::Executed | StateKind::Scheduled)
            })
            .map(|v| (v.sched().start - v.proposed_start).abs() as f64)
            .collect();
        let average_time_offset = if offsets.is_empty() {
            0.0
        } else {
            offsets.iter().sum::<f64>() / offsets.len() as f64
        };

        // ── Continuity histogram ──────────────────────────────────────────
        let mut operators_per_patient = vec![0usize; 6];
        for patient in model.patients.iter().filter(|p| !p.is_removed) {
            let mut seen: Vec<_> = model
                .visits
                .of_patient(patient.id)
                .filter(|v| v.kind() == StateKind::Executed)
                .map(|v| v.real().operator)
                .collect();
            seen.sort_unstable();
            seen.dedup();
            let bucket = seen.len().min(operators_per_patient.len() - 1);
            operators_per_patient[bucket] += 1;
        }

        // ── Unplaceable-by-day histogram ──────────────────────────────────
        let mut unplaceable_per_day = vec![0usize; params.n_days];
        for v in model.visits.unplaceable() {
            if v.proposed_day < params.n_days {
                unplaceable_per_day[v.proposed_day] += 1;
            }
        }

        // ── Per-operator rows ─────────────────────────────────────────────
        let rows = model
            .operators
            .iter()
            .map(|op| {
                let assigned_patients = model
                    .patients
                    .iter()
                    .filter(|p| p.assigned_operator == Some(op.id))
                    .count();
                let not_executed = model.not_executed_visits(op.id);
                OperatorRow {
                    operator: op.id.0,
                    skill: op.skill,
                    contract_time: op.contract_time,
                    max_time: op.max_time,
                    assigned_patients,
                    total_visits: op.executed_visits as usize + not_executed,
                    not_executed_visits: not_executed,
                    workload: op.workload,
                    overtime: op.overtime(),
                    travel_time: op.real_travel_time,
                    inter_travel_time: op.real_inter_travel_time,
                    overskill_visits: op.overskill_visits,
                    overskill_time: op.overskill_time,
                    total_wage: op.total_wage(params),
                }
            })
            .collect();

        RunReport {
            objective: wage_component
                + movement_component
                + overskill_component
                + not_executed_component,
            wage_component,
            movement_component,
            overskill_component,
            not_executed_component,
            average_visit_delay,
            average_time_offset,
            operators_per_patient,
            unplaceable_per_day,
            overly_delayed_visits: model.counters.overly_delayed_visits,
            newly_generated_visits: model.visits.newly_generated_count(),
            removed_visits: model.visits.removed().len(),
            is_broken: model.is_broken,
            rows,
        }
    }
}

/// Executed visits whose start slipped more than `threshold` minutes past
/// the scheduled anchor.
pub fn visits_delayed_by(model: &HomeCareModel, threshold: Minute) -> usize {
    model
        .visits
        .iter()
        .filter(|v| v.kind() == StateKind::Executed && v.delay() > threshold)
        .count()
}

/// Unplaceable visits requested for `day`.
pub fn unplaceable_on(model: &HomeCareModel, day: Day) -> usize {
    model
        .visits
        .unplaceable()
        .iter()
        .filter(|v| v.proposed_day == day)
        .count()
}
