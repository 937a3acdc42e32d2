//! `hc-core` — foundational types for the `rust_hc` home-care simulator.
//!
//! This crate is a dependency of every other `hc-*` crate.  It intentionally
//! has no `hc-*` dependencies and minimal external ones (only `rand` and
//! `thiserror`).
//!
//! # What lives here
//!
//! | Module     | Contents                                                  |
//! |------------|-----------------------------------------------------------|
//! | [`ids`]    | `PatientId`, `OperatorId`, `VisitId`, `MunicipalityId`    |
//! | [`time`]   | `Minute`, `Day`, `Clock`, grid helpers, day-window consts |
//! | [`config`] | `SimParams`, `DispatchLevel`, event frequencies           |
//! | [`rng`]    | `SimRng` — the single seeded PRNG behind every draw       |
//! | [`error`]  | `HcError`, `HcResult`                                     |

pub mod config;
pub mod error;
pub mod ids;
pub mod rng;
pub mod time;


// ── Re-exports ────────────────────────────────────────────────────────────────

pub use config::{DispatchLevel, SimParams};
pub use error::{HcError, HcResult};
pub use ids::{MunicipalityId, OperatorId, PatientId, VisitId};
pub use rng::SimRng;
pub use time::{Clock, Day, Minute};
