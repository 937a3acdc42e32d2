//! JSON loading for the input bundle.
//!
//! The offline pipeline leaves one file per section in a data directory;
//! file names are fixed by convention.  Loading is strict: unknown shapes
//! or missing files are errors, and the bundle is validated before being
//! handed to the caller.

use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;

use crate::{
    Assignment, Commuting, Hyperparams, InputError, Municipalities, OfflineSolution, Operators,
    Patients, SimInput, VisitRequests,
};

pub const HYPERPARAMS_FILE: &str = "hyperparams.json";
pub const MUNICIPALITIES_FILE: &str = "municipalities.json";
pub const COMMUTING_FILE: &str = "commuting.json";
pub const PATIENTS_FILE: &str = "patients.json";
pub const OPERATORS_FILE: &str = "operators.json";
pub const VISITS_FILE: &str = "visits.json";
pub const ASSIGNMENT_FILE: &str = "assignment.json";
pub const OUTPUT_FILE: &str = "output_data.json";

fn load_file<T: DeserializeOwned>(dir: &Path, name: &str) -> Result<T, InputError> {
    let path = dir.join(name);
    let text = fs::read_to_string(&path).map_err(|source| InputError::Io {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| InputError::Json {
        path: path.display().to_string(),
        source,
    })
}

impl SimInput {
    /// Load and validate the whole bundle from a data directory.
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<SimInput, InputError> {
        let dir = dir.as_ref();
        let input = SimInput {
            hyperparams: load_file::<Hyperparams>(dir, HYPERPARAMS_FILE)?,
            municipalities: load_file::<Municipalities>(dir, MUNICIPALITIES_FILE)?,
            commuting: load_file::<Commuting>(dir, COMMUTING_FILE)?,
            patients: load_file::<Patients>(dir, PATIENTS_FILE)?,
            operators: load_file::<Operators>(dir, OPERATORS_FILE)?,
            visits: load_file::<VisitRequests>(dir, VISITS_FILE)?,
            assignment: load_file::<Assignment>(dir, ASSIGNMENT_FILE)?,
            solution: load_file::<OfflineSolution>(dir, OUTPUT_FILE)?,
        };
        input.validate()?;
        Ok(input)
    }
}
