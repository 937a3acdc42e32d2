//! Build a [`HomeCareModel`] from the typed input bundle.
//!
//! The builder translates the 1-indexed, array-of-arrays input surface into
//! the simulator's entities:
//!
//! - the commuting graph from positions + minute matrix,
//! - patients with their offline-assigned operator (the solution's
//!   assignment row),
//! - operators with per-day calendars,
//! - visits, walked operator by operator: executed cells of the solution
//!   become baseline SCHEDULED visits; requested-but-unexecuted cells of
//!   assigned patients become NOT_SCHEDULED proposals (carrying the
//!   operator as a proposal only if that operator already sees the patient).
//!
//! Visit IDs are minted in (operator, day, start) order so runs are
//! reproducible from equal inputs.

use hc_core::{HcError, HcResult, MunicipalityId, OperatorId, PatientId, SimParams};
use hc_input::SimInput;
use hc_schedule::{VisitSpec, VisitStore};
use hc_spatial::{CommutingGraph, MunPosition};

use hc_agents::{Operator, Patient};

use crate::model::HomeCareModel;

/// Builder translating a validated [`SimInput`] into a ready model.
///
/// Runtime knobs (seed, dispatch level, event frequencies) come from the
/// supplied [`SimParams`]; the input's hyperparameters override the
/// objective weights and horizon.
pub struct ModelBuilder {
    input: SimInput,
    params: SimParams,
}

impl ModelBuilder {
    pub fn new(input: SimInput) -> ModelBuilder {
        ModelBuilder { input, params: SimParams::default() }
    }

    /// Replace the runtime parameter template (seed, level, frequencies…).
    pub fn params(mut self, params: SimParams) -> ModelBuilder {
        self.params = params;
        self
    }

    pub fn seed(mut self, seed: u64) -> ModelBuilder {
        self.params.seed = seed;
        self
    }

    pub fn dispatch_level(mut self, level: hc_core::DispatchLevel) -> ModelBuilder {
        self.params.dispatch_level = level;
        self
    }

    pub fn build(self) -> HcResult<HomeCareModel> {
        let ModelBuilder { input, mut params } = self;
        input.validate().map_err(HcError::from)?;

        // ── Hyperparameters override the template ─────────────────────────
        let h = &input.hyperparams;
        params.n_days = h.n_days;
        params.n_municipalities = h.n_municipalities;
        params.c_wage = h.c_wage;
        params.c_movement = h.c_movement;
        params.c_overskill = h.c_overskill;
        params.c_execution = h.c_execution;
        params.big_m = h.big_m;
        params.sigma0 = h.sigma0;
        params.sigma1 = h.sigma1;
        params.omega = h.omega;

        // ── Commuting graph ───────────────────────────────────────────────
        let positions: Vec<MunPosition> = input
            .municipalities
            .latitudes
            .iter()
            .zip(&input.municipalities.longitudes)
            .map(|(&lat, &lon)| MunPosition { lat, lon })
            .collect();
        let graph = CommutingGraph::from_matrix(positions, &input.commuting.minutes)?;

        // ── Patients ──────────────────────────────────────────────────────
        let mut patients: Vec<Patient> = (0..input.patients.count)
            .map(|p| {
                let municipality =
                    MunicipalityId::from_index(input.patients.municipalities[p] - 1);
                let assigned = input.solution.assignment[p]
                    .iter()
                    .position(|&x| x == 1)
                    .map(OperatorId::from_index);
                Patient::new(PatientId::from_index(p), municipality, false, assigned, false)
            })
            .collect();

        // ── Operators ─────────────────────────────────────────────────────
        let operators: Vec<Operator> = (0..input.operators.count)
            .map(|o| {
                Operator::new(
                    OperatorId::from_index(o),
                    MunicipalityId::from_index(input.operators.municipalities[o] - 1),
                    input.operators.skills[o],
                    input.operators.contract_times[o],
                    input.operators.max_times[o],
                    input.operators.availability[o].iter().map(|&a| a == 1).collect(),
                    input.operators.day_starts[o].clone(),
                    input.operators.day_ends[o].clone(),
                )
            })
            .collect();

        // ── Visits ────────────────────────────────────────────────────────
        let mut visits = VisitStore::new();
        for o in 0..input.operators.count {
            let op_id = OperatorId::from_index(o);
            let execution = &input.solution.visit_execution[o];

            // Executed cells, in (day, start) order.
            let mut planned: Vec<(usize, usize)> = Vec::new(); // (patient, day)
            for d in 0..h.n_days {
                for p in 0..input.patients.count {
                    if execution[p][d] == 1 {
                        planned.push((p, d));
                    }
                }
            }
            planned.sort_by_key(|&(p, d)| (d, input.visits.starts[p][d]));

            let mut seen_patients: Vec<usize> = Vec::new();
            for &(p, d) in &planned {
                if !seen_patients.contains(&p) {
                    seen_patients.push(p);
                }
                visits.add_baseline_scheduled(VisitSpec {
                    patient: PatientId::from_index(p),
                    municipality: patients[p].municipality,
                    skill: input.visits.skills[p][d],
                    day: d,
                    start: input.visits.starts[p][d],
                    end: input.visits.ends[p][d],
                    operator: Some(op_id),
                    newly_generated: false,
                });
            }

            // Requested-but-unexecuted cells of this operator's patients.
            let mut dropped: Vec<(usize, usize)> = Vec::new();
            for d in 0..h.n_days {
                for p in 0..input.patients.count {
                    if input.visits.requested[p][d] == 1
                        && input.solution.assignment[p][o] == 1
                        && execution[p][d] == 0
                    {
                        dropped.push((p, d));
                    }
                }
            }
            dropped.sort_by_key(|&(p, d)| (d, input.visits.starts[p][d]));

            for &(p, d) in &dropped {
                let proposed_operator = seen_patients.contains(&p).then_some(op_id);
                visits.add_proposed(VisitSpec {
                    patient: PatientId::from_index(p),
                    municipality: patients[p].municipality,
                    skill: input.visits.skills[p][d],
                    day: d,
                    start: input.visits.starts[p][d],
                    end: input.visits.ends[p][d],
                    operator: proposed_operator,
                    newly_generated: false,
                });
            }
        }

        // Premium: a patient whose every baseline visit needs skill > 0.
        for patient in &mut patients {
            let mut any = false;
            let mut all_high = true;
            for v in visits.of_patient(patient.id) {
                any = true;
                if v.skill == 0 {
                    all_high = false;
                }
            }
            patient.premium = any && all_high;
        }

        Ok(HomeCareModel::assemble(params, graph, patients, operators, visits))
    }
}
