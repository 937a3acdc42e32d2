//! CSV rendering of the run report.
//!
//! Two files, matching what the analysis notebooks expect: a per-operator
//! statistics table and a one-row run summary.  Writers are generic over
//! `io::Write` so tests render into memory.

use std::io::Write;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use hc_sim::{HomeCareModel, SimObserver};

use crate::report::RunReport;

pub const OPERATOR_STATS_FILE: &str = "operator_stats.csv";
pub const SUMMARY_FILE: &str = "summary.csv";

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

// ── Summary row ───────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct SummaryRow {
    objective: f64,
    wage_component: f64,
    movement_component: f64,
    overskill_component: f64,
    not_executed_component: f64,
    average_visit_delay: f64,
    average_time_offset: f64,
    overly_delayed_visits: u32,
    newly_generated_visits: usize,
    removed_visits: usize,
    is_broken: bool,
}

// ── Writers ───────────────────────────────────────────────────────────────────

/// Render the per-operator table.
pub fn write_operator_stats<W: Write>(writer: W, report: &RunReport) -> Result<(), OutputError> {
    let mut csv = csv::Writer::from_writer(writer);
    for row in &report.rows {
        csv.serialize(row)?;
    }
    csv.flush()?;
    Ok(())
}

/// Render the one-row run summary.
pub fn write_summary<W: Write>(writer: W, report: &RunReport) -> Result<(), OutputError> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.serialize(SummaryRow {
        objective: report.objective,
        wage_component: report.wage_component,
        movement_component: report.movement_component,
        overskill_component: report.overskill_component,
        not_executed_component: report.not_executed_component,
        average_visit_delay: report.average_visit_delay,
        average_time_offset: report.average_time_offset,
        overly_delayed_visits: report.overly_delayed_visits,
        newly_generated_visits: report.newly_generated_visits,
        removed_visits: report.removed_visits,
        is_broken: report.is_broken,
    })?;
    csv.flush()?;
    Ok(())
}

// ── Observer ──────────────────────────────────────────────────────────────────

/// Writes both CSV files into a directory when the run ends.
///
/// Errors are recorded in [`CsvReportObserver::error`] rather than panicking
/// inside the tick loop; callers check after `run` returns.
pub struct CsvReportObserver {
    dir: PathBuf,
    pub error: Option<OutputError>,
}

impl CsvReportObserver {
    pub fn new(dir: impl Into<PathBuf>) -> CsvReportObserver {
        CsvReportObserver { dir: dir.into(), error: None }
    }

    fn write_all(&self, model: &HomeCareModel) -> Result<(), OutputError> {
        let report = RunReport::from_model(model);
        let stats = std::fs::File::create(self.dir.join(OPERATOR_STATS_FILE))?;
        write_operator_stats(stats, &report)?;
        let summary = std::fs::File::create(self.dir.join(SUMMARY_FILE))?;
        write_summary(summary, &report)?;
        Ok(())
    }
}

impl SimObserver for CsvReportObserver {
    fn on_run_end(&mut self, model: &HomeCareModel) {
        if let Err(err) = self.write_all(model) {
            self.error = Some(err);
        }
    }
}
