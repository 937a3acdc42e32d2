//! weekly — smallest runnable example for the rust_hc simulator.
//!
//! Builds a synthetic district (3 municipalities, 2 operators, 6 patients,
//! a hand-written baseline week) and simulates it under the robust
//! dispatcher, printing the end-of-run report and writing the CSV files to
//! ./weekly-out.  Set RUST_LOG=debug to watch the dispatcher narrate.

use std::fs;
use std::time::Instant;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use hc_core::{DispatchLevel, MunicipalityId, OperatorId, PatientId, SimParams};
use hc_output::{CsvReportObserver, RunReport};
use hc_schedule::{VisitSpec, VisitStore};
use hc_sim::HomeCareModel;
use hc_spatial::{CommutingGraph, MunPosition};

use hc_agents::{Operator, Patient};

// ── Constants ─────────────────────────────────────────────────────────────────

const SEED: u64 = 42;
const N_DAYS: usize = 5;
const OUTPUT_DIR: &str = "weekly-out";

fn mun(i: usize) -> MunicipalityId {
    MunicipalityId::from_index(i)
}

// ── District construction ─────────────────────────────────────────────────────

fn build_graph() -> Result<CommutingGraph> {
    let positions = vec![
        MunPosition { lat: 45.464, lon: 9.190 },
        MunPosition { lat: 45.485, lon: 9.204 },
        MunPosition { lat: 45.445, lon: 9.178 },
    ];
    let matrix = vec![
        vec![15, 25, 35],
        vec![25, 15, 20],
        vec![35, 20, 15],
    ];
    Ok(CommutingGraph::from_matrix(positions, &matrix)?)
}

fn build_operators() -> Vec<Operator> {
    let full_week = vec![true; N_DAYS];
    vec![
        Operator::new(
            OperatorId::from_index(0),
            mun(0),
            0,
            1_500,
            1_800,
            full_week.clone(),
            vec![0; N_DAYS],
            vec![840; N_DAYS],
        ),
        Operator::new(
            OperatorId::from_index(1),
            mun(1),
            1,
            1_200,
            1_500,
            full_week,
            vec![0; N_DAYS],
            vec![840; N_DAYS],
        ),
    ]
}

fn build_patients(operators: &[Operator]) -> Vec<Patient> {
    // Patients scattered over the three municipalities, split between the
    // two operators; patient 5 is premium (skill-1 care only).
    (0..6)
        .map(|p| {
            Patient::new(
                PatientId::from_index(p),
                mun(p % 3),
                p == 5,
                Some(operators[p % 2].id),
                false,
            )
        })
        .collect()
}

/// A hand-written baseline plan: two visits per patient across the week,
/// skill-0 except the premium patient's.
fn build_visits(patients: &[Patient]) -> VisitStore {
    let mut visits = VisitStore::new();
    let slots = [(90, 150), (300, 360), (510, 570)];

    for (p, patient) in patients.iter().enumerate() {
        let operator = patient.assigned_operator;
        let skill = u8::from(patient.premium);
        for k in 0..2 {
            let day = (p + 2 * k) % N_DAYS;
            let (start, end) = slots[(p + k) % slots.len()];
            visits.add_baseline_scheduled(VisitSpec {
                patient: patient.id,
                municipality: patient.municipality,
                skill,
                day,
                start,
                end,
                operator,
                newly_generated: false,
            });
        }
    }

    visits
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let params = SimParams {
        n_days: N_DAYS,
        n_municipalities: 3,
        dispatch_level: DispatchLevel::Robust,
        seed: SEED,
        ..SimParams::default()
    };

    let graph = build_graph()?;
    let operators = build_operators();
    let patients = build_patients(&operators);
    let visits = build_visits(&patients);

    let mut model = HomeCareModel::assemble(params, graph, patients, operators, visits);

    fs::create_dir_all(OUTPUT_DIR)?;
    let mut observer = CsvReportObserver::new(OUTPUT_DIR);

    let started = Instant::now();
    model.run(&mut observer);
    let elapsed = started.elapsed();

    if let Some(err) = observer.error.take() {
        return Err(err.into());
    }

    // ── Report ────────────────────────────────────────────────────────────
    let report = RunReport::from_model(&model);
    println!("simulated {} ticks in {:.2?}", model.steps, elapsed);
    println!(
        "run {}; objective {:.2} (wage {:.2}, movement {:.2}, overskill {:.2}, not-executed {:.2})",
        if model.is_broken { "BROKEN" } else { "complete" },
        report.objective,
        report.wage_component,
        report.movement_component,
        report.overskill_component,
        report.not_executed_component,
    );
    println!(
        "visits: {} newly generated, {} cancelled, {} unplaceable, avg delay {:.2} min, avg offset {:.2} min",
        report.newly_generated_visits,
        report.removed_visits,
        report.unplaceable_per_day.iter().sum::<usize>(),
        report.average_visit_delay,
        report.average_time_offset,
    );
    for row in &report.rows {
        println!(
            "  operator {}: {} visits, workload {} min (overtime {}), travel {} min, wage {:.2}",
            row.operator, row.total_visits, row.workload, row.overtime, row.travel_time,
            row.total_wage,
        );
    }
    println!("CSV written to {OUTPUT_DIR}/");

    Ok(())
}
