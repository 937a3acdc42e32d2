//! `hc-input` — the typed input surface of the simulator.
//!
//! The core consumes seven logically separate inputs (hyperparameters,
//! municipalities, commuting matrix, patients, operators, visit requests,
//! assignment tables) plus the offline optimizer's solution.  This crate
//! defines the serde types matching the JSON the offline pipeline emits,
//! a directory loader, and the validation pass that rejects inconsistent
//! data before the model is built.
//!
//! Index convention: municipalities are 1-indexed in the files (a legacy of
//! the optimization model) and 0-indexed everywhere inside the simulator;
//! the conversion happens in the model builder, not here.

pub mod json;

#[cfg(test)]
mod tests;

use serde::Deserialize;
use thiserror::Error;

use hc_core::{HcError, Minute};

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum InputError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed JSON in {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("inconsistent input: {0}")]
    Inconsistent(String),
}

impl From<InputError> for HcError {
    fn from(err: InputError) -> HcError {
        match err {
            InputError::Inconsistent(msg) => HcError::InvalidInput(msg),
            other => HcError::Parse(other.to_string()),
        }
    }
}

// ── Input sections ────────────────────────────────────────────────────────────

/// Objective weights and horizon, as produced by the data generator.
#[derive(Clone, Debug, Deserialize)]
pub struct Hyperparams {
    #[serde(rename = "Cw")]
    pub c_wage: f64,
    #[serde(rename = "Cm")]
    pub c_movement: f64,
    #[serde(rename = "Co")]
    pub c_overskill: f64,
    #[serde(rename = "Cx")]
    pub c_execution: f64,
    #[serde(rename = "bigM")]
    pub big_m: f64,
    pub sigma0: f64,
    pub sigma1: f64,
    pub omega: f64,
    #[serde(rename = "numDays")]
    pub n_days: usize,
    #[serde(rename = "numMunicipalities")]
    pub n_municipalities: usize,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Municipalities {
    #[serde(rename = "municipalityLatitude")]
    pub latitudes: Vec<f64>,
    #[serde(rename = "municipalityLongitude")]
    pub longitudes: Vec<f64>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Commuting {
    #[serde(rename = "commutingTime")]
    pub minutes: Vec<Vec<Minute>>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Patients {
    #[serde(rename = "numPatients")]
    pub count: usize,
    /// 1-indexed municipality per patient.
    #[serde(rename = "patientMunicipality")]
    pub municipalities: Vec<usize>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Operators {
    #[serde(rename = "numOperators")]
    pub count: usize,
    /// 1-indexed municipality per operator.
    #[serde(rename = "operatorMunicipality")]
    pub municipalities: Vec<usize>,
    #[serde(rename = "operatorSkill")]
    pub skills: Vec<u8>,
    #[serde(rename = "operatorTime")]
    pub contract_times: Vec<Minute>,
    #[serde(rename = "operatorMaxTime")]
    pub max_times: Vec<Minute>,
    /// `[operator][day]` ∈ {0, 1}.
    #[serde(rename = "operatorAvailability")]
    pub availability: Vec<Vec<u8>>,
    #[serde(rename = "operatorStartTime")]
    pub day_starts: Vec<Vec<Minute>>,
    #[serde(rename = "operatorEndTime")]
    pub day_ends: Vec<Vec<Minute>>,
}

/// Baseline visit requests, `[patient][day]`.
#[derive(Clone, Debug, Deserialize)]
pub struct VisitRequests {
    #[serde(rename = "visitRequest")]
    pub requested: Vec<Vec<u8>>,
    #[serde(rename = "visitSkill")]
    pub skills: Vec<Vec<u8>>,
    #[serde(rename = "visitStartTime")]
    pub starts: Vec<Vec<Minute>>,
    #[serde(rename = "visitEndTime")]
    pub ends: Vec<Vec<Minute>>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Assignment {
    /// `[operator][patient]` ∈ {0, 1}: skill/availability compatibility.
    #[serde(rename = "feasiblePatients")]
    pub feasible_patients: Vec<Vec<u8>>,
    /// `[patient][operator]` ∈ {0, 1}: exactly one 1 per row.
    #[serde(rename = "previousAssignment")]
    pub previous_assignment: Vec<Vec<u8>>,
}

/// The offline MIP solution the simulation starts from.
#[derive(Clone, Debug, Deserialize)]
pub struct OfflineSolution {
    pub objective: f64,
    /// `[patient][operator]` ∈ {0, 1}.
    pub assignment: Vec<Vec<u8>>,
    /// `[i][j][operator][day]` ∈ {0, 1}; informational, unused by the core.
    #[serde(default)]
    pub movement: Option<Vec<Vec<Vec<Vec<u8>>>>>,
    /// `[operator][patient][day]` ∈ {0, 1}.
    #[serde(rename = "visitExecution")]
    pub visit_execution: Vec<Vec<Vec<u8>>>,
}

// ── Bundle ────────────────────────────────────────────────────────────────────

/// Everything the model builder needs, loaded and shape-checked.
#[derive(Clone, Debug)]
pub struct SimInput {
    pub hyperparams: Hyperparams,
    pub municipalities: Municipalities,
    pub commuting: Commuting,
    pub patients: Patients,
    pub operators: Operators,
    pub visits: VisitRequests,
    pub assignment: Assignment,
    pub solution: OfflineSolution,
}

impl SimInput {
    /// Cross-section consistency checks.  A failure here means the data
    /// generator produced an unusable instance; the caller regenerates
    /// rather than the core attempting repair.
    pub fn validate(&self) -> Result<(), InputError> {
        let n_mun = self.hyperparams.n_municipalities;
        let n_days = self.hyperparams.n_days;
        let n_pat = self.patients.count;
        let n_op = self.operators.count;

        let fail = |msg: String| Err(InputError::Inconsistent(msg));

        if self.municipalities.latitudes.len() != n_mun
            || self.municipalities.longitudes.len() != n_mun
        {
            return fail(format!("expected {n_mun} municipality positions"));
        }

        if self.commuting.minutes.len() != n_mun
            || self.commuting.minutes.iter().any(|row| row.len() != n_mun)
        {
            return fail(format!("commuting matrix must be {n_mun}×{n_mun}"));
        }
        for i in 0..n_mun {
            for j in 0..i {
                if self.commuting.minutes[i][j] != self.commuting.minutes[j][i] {
                    return fail(format!("commuting matrix asymmetric at ({i}, {j})"));
                }
            }
        }

        if self.patients.municipalities.len() != n_pat {
            return fail(format!("expected {n_pat} patient municipalities"));
        }
        if let Some(&m) = self
            .patients
            .municipalities
            .iter()
            .find(|&&m| m == 0 || m > n_mun)
        {
            return fail(format!("patient municipality {m} outside 1..={n_mun}"));
        }

        for (name, len) in [
            ("operatorMunicipality", self.operators.municipalities.len()),
            ("operatorSkill", self.operators.skills.len()),
            ("operatorTime", self.operators.contract_times.len()),
            ("operatorMaxTime", self.operators.max_times.len()),
            ("operatorAvailability", self.operators.availability.len()),
            ("operatorStartTime", self.operators.day_starts.len()),
            ("operatorEndTime", self.operators.day_ends.len()),
        ] {
            if len != n_op {
                return fail(format!("{name} must have {n_op} rows"));
            }
        }
        if self.operators.availability.iter().any(|r| r.len() != n_days)
            || self.operators.day_starts.iter().any(|r| r.len() != n_days)
            || self.operators.day_ends.iter().any(|r| r.len() != n_days)
        {
            return fail(format!("operator daily arrays must have {n_days} columns"));
        }

        for (name, table) in [
            ("visitRequest", &self.visits.requested),
            ("visitSkill", &self.visits.skills),
        ] {
            if table.len() != n_pat || table.iter().any(|r| r.len() != n_days) {
                return fail(format!("{name} must be {n_pat}×{n_days}"));
            }
        }
        if self.visits.starts.len() != n_pat || self.visits.ends.len() != n_pat {
            return fail(format!("visit time tables must have {n_pat} rows"));
        }

        // Every patient needs at least one feasible operator.
        if self.assignment.feasible_patients.len() != n_op {
            return fail(format!("feasiblePatients must have {n_op} rows"));
        }
        for p in 0..n_pat {
            let feasible = self
                .assignment
                .feasible_patients
                .iter()
                .any(|row| row.get(p).copied().unwrap_or(0) == 1);
            if !feasible {
                return fail(format!("patient {p} has no feasible operator"));
            }
        }

        // Exactly one previously-assigned operator per patient.
        if self.assignment.previous_assignment.len() != n_pat {
            return fail(format!("previousAssignment must have {n_pat} rows"));
        }
        for (p, row) in self.assignment.previous_assignment.iter().enumerate() {
            let ones = row.iter().filter(|&&x| x == 1).count();
            if ones != 1 {
                return fail(format!("patient {p} has {ones} previous operators, expected 1"));
            }
        }

        if self.solution.visit_execution.len() != n_op {
            return fail(format!("visitExecution must have {n_op} rows"));
        }
        if self.solution.assignment.len() != n_pat {
            return fail(format!("solution assignment must have {n_pat} rows"));
        }

        Ok(())
    }
}
