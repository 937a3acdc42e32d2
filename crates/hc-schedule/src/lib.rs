//! `hc-schedule` — visits, itineraries, and the schedule-mutation algebra.
//!
//! This crate is the algorithmic heart of the simulator.  It owns:
//!
//! - the [`Visit`] entity and its four-state machine
//!   (`NOT_SCHEDULED → SCHEDULED → EXECUTING → EXECUTED`),
//! - the [`VisitStore`] arena holding every live, removed, and unplaceable
//!   visit,
//! - free-window feasibility queries over an operator's day
//!   ([`windows`]), and
//! - the mutation algebra ([`ItineraryEdit`]) that keeps a day's itinerary
//!   feasible as real time deviates from planned time: slack accounting
//!   (`cumulable_delay`), overrun absorption with shrink/postpone cascades
//!   (`extend_visit`), and early-finish recovery (`shorten_visit`).
//!
//! Operators and the dispatcher (in `hc-agents` / `hc-dispatch`) drive these
//! primitives; nothing here draws randomness or owns agent state.

pub mod algebra;
pub mod store;
pub mod visit;
pub mod windows;

#[cfg(test)]
mod tests;

pub use algebra::ItineraryEdit;
pub use store::{Stop, VisitSpec, VisitStore};
pub use visit::{Placement, Slot, StateKind, Visit};
pub use windows::OperatorDay;
