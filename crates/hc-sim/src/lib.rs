//! `hc-sim` — the discrete-event simulation engine.
//!
//! [`HomeCareModel`] owns every entity (commuting graph, patients,
//! operators, visits, dispatcher) in plain arenas and advances a
//! minute-granular clock.  Each tick:
//!
//! 1. one-shot initial dispatch pass (first tick of the week only),
//! 2. per-day initialization when a new day begins,
//! 3. model-level unexpected events (new patient arrivals),
//! 4. every agent steps once, in a fresh uniform-random order,
//! 5. the dispatcher re-places whatever is NOT_SCHEDULED,
//! 6. day/week termination and broken-run detection.
//!
//! All state mutation happens on the driver thread; agents added mid-tick
//! first activate on the following tick.  A single seeded PRNG drives every
//! draw, so equal inputs and seed reproduce the timeline exactly.

pub mod builder;
pub mod model;
pub mod observer;


pub use builder::ModelBuilder;
pub use model::HomeCareModel;
pub use observer::{NoopObserver, SimObserver};
