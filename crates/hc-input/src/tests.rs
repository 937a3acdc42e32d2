//! Unit tests for hc-input.

use std::fs;

use crate::json::{
    ASSIGNMENT_FILE, COMMUTING_FILE, HYPERPARAMS_FILE, MUNICIPALITIES_FILE, OPERATORS_FILE,
    OUTPUT_FILE, PATIENTS_FILE, VISITS_FILE,
};
use crate::{InputError, SimInput};

// ── Fixture: a consistent 2-municipality, 2-patient, 1-operator instance ──────

fn hyperparams_json() -> &'static str {
    r#"{
        "Cw": 1, "Cm": 1, "Co": 0, "Cx": 1000, "bigM": 1000,
        "sigma0": 0.3, "sigma1": 0.1, "omega": 0.27,
        "numDays": 2, "numMunicipalities": 2
    }"#
}

fn municipalities_json() -> &'static str {
    r#"{
        "municipalityLatitude": [45.0, 45.2],
        "municipalityLongitude": [9.0, 9.1]
    }"#
}

fn commuting_json() -> &'static str {
    r#"{ "commutingTime": [[15, 30], [30, 15]] }"#
}

fn patients_json() -> &'static str {
    r#"{ "numPatients": 2, "patientMunicipality": [1, 2] }"#
}

fn operators_json() -> &'static str {
    r#"{
        "numOperators": 1,
        "operatorMunicipality": [1],
        "operatorSkill": [1],
        "operatorTime": [900],
        "operatorMaxTime": [1000],
        "operatorAvailability": [[1, 1]],
        "operatorStartTime": [[0, 0]],
        "operatorEndTime": [[840, 840]]
    }"#
}

fn visits_json() -> &'static str {
    r#"{
        "visitRequest": [[1, 0], [0, 1]],
        "visitSkill": [[0, 0], [1, 0]],
        "visitStartTime": [[90, 0], [0, 300]],
        "visitEndTime": [[150, 0], [0, 360]]
    }"#
}

fn assignment_json() -> &'static str {
    r#"{
        "feasiblePatients": [[1, 1]],
        "previousAssignment": [[1], [1]]
    }"#
}

fn output_json() -> &'static str {
    r#"{
        "objective": 42.0,
        "assignment": [[1], [1]],
        "visitExecution": [[[1, 0], [0, 1]]]
    }"#
}

fn parse_input() -> SimInput {
    SimInput {
        hyperparams: serde_json::from_str(hyperparams_json()).unwrap(),
        municipalities: serde_json::from_str(municipalities_json()).unwrap(),
        commuting: serde_json::from_str(commuting_json()).unwrap(),
        patients: serde_json::from_str(patients_json()).unwrap(),
        operators: serde_json::from_str(operators_json()).unwrap(),
        visits: serde_json::from_str(visits_json()).unwrap(),
        assignment: serde_json::from_str(assignment_json()).unwrap(),
        solution: serde_json::from_str(output_json()).unwrap(),
    }
}

// ── Parsing ───────────────────────────────────────────────────────────────────

#[test]
fn parses_renamed_fields() {
    let input = parse_input();
    assert_eq!(input.hyperparams.n_days, 2);
    assert_eq!(input.hyperparams.n_municipalities, 2);
    assert!((input.hyperparams.c_execution - 1000.0).abs() < 1e-12);
    assert_eq!(input.patients.municipalities, vec![1, 2]);
    assert_eq!(input.operators.skills, vec![1]);
    assert_eq!(input.visits.starts[0][0], 90);
    assert!(input.solution.movement.is_none());
}

#[test]
fn valid_bundle_passes_validation() {
    assert!(parse_input().validate().is_ok());
}

// ── Validation failures ───────────────────────────────────────────────────────

#[test]
fn rejects_asymmetric_commuting() {
    let mut input = parse_input();
    input.commuting.minutes[0][1] = 99;
    let err = input.validate().unwrap_err();
    assert!(matches!(err, InputError::Inconsistent(_)));
    assert!(err.to_string().contains("asymmetric"));
}

#[test]
fn rejects_patient_without_feasible_operator() {
    let mut input = parse_input();
    input.assignment.feasible_patients[0][1] = 0;
    let err = input.validate().unwrap_err();
    assert!(err.to_string().contains("no feasible operator"));
}

#[test]
fn rejects_multiple_previous_assignments() {
    let mut input = parse_input();
    input.assignment.previous_assignment[0] = vec![0];
    let err = input.validate().unwrap_err();
    assert!(err.to_string().contains("previous operators"));
}

#[test]
fn rejects_out_of_range_patient_municipality() {
    let mut input = parse_input();
    input.patients.municipalities[1] = 3;
    assert!(input.validate().is_err());
}

#[test]
fn rejects_wrong_daily_array_width() {
    let mut input = parse_input();
    input.operators.day_starts[0] = vec![0];
    assert!(input.validate().is_err());
}

// ── Directory loading ─────────────────────────────────────────────────────────

#[test]
fn loads_a_full_directory() {
    let dir = tempfile::tempdir().unwrap();
    for (name, body) in [
        (HYPERPARAMS_FILE, hyperparams_json()),
        (MUNICIPALITIES_FILE, municipalities_json()),
        (COMMUTING_FILE, commuting_json()),
        (PATIENTS_FILE, patients_json()),
        (OPERATORS_FILE, operators_json()),
        (VISITS_FILE, visits_json()),
        (ASSIGNMENT_FILE, assignment_json()),
        (OUTPUT_FILE, output_json()),
    ] {
        fs::write(dir.path().join(name), body).unwrap();
    }

    let input = SimInput::from_dir(dir.path()).unwrap();
    assert_eq!(input.operators.count, 1);
    assert_eq!(input.patients.count, 2);
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = SimInput::from_dir(dir.path()).unwrap_err();
    assert!(matches!(err, InputError::Io { .. }));
}

#[test]
fn malformed_json_names_the_file() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join(HYPERPARAMS_FILE), "{ not json").unwrap();
    let err = SimInput::from_dir(dir.path()).unwrap_err();
    match err {
        InputError::Json { path, .. } => assert!(path.contains("hyperparams.json")),
        other => panic!("expected Json error, got {other:?}"),
    }
}
