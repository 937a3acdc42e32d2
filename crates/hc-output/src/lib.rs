//! `hc-output` — end-of-run metrics and CSV export.
//!
//! [`RunReport`] derives the decomposed objective and the operational
//! metrics (delays, overtime, utilization, per-operator rows) from a
//! finished model; the [`csv`] module renders them to the two flat files
//! the analysis pipeline consumes, and [`CsvReportObserver`] plugs that
//! into the simulation's observer hooks.

pub mod csv;
pub mod report;


pub use csv::{CsvReportObserver, OutputError};
pub use report::{OperatorRow, RunReport};
