//! `hc-dispatch` — the online manager.
//!
//! Each tick the dispatcher tries to place every NOT_SCHEDULED visit on
//! some (operator, day, start) triple.  How hard it tries depends on its
//! [`DispatchLevel`](hc_core::DispatchLevel):
//!
//! - **Dummy** — preferred operators at the proposed time only.
//! - **Random** — uniform choice among feasible candidates.
//! - **Optimizer** — argmin of the objective-delta criticality factor.
//! - **Robust** — additionally weighs how much fleet-wide placement
//!   capacity the candidate would consume ([`criticality`]).

pub mod criticality;
pub mod manager;


pub use criticality::{robustness_factor, PossibleVisits};
pub use manager::{DispatchCtx, Dispatcher};
