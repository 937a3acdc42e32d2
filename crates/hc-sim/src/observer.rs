//! Observer hooks for run instrumentation.
//!
//! The model calls these at tick and day boundaries; writers and stats
//! collectors implement the trait instead of patching the tick loop.

use hc_core::Day;

use crate::model::HomeCareModel;

/// Callbacks invoked by [`HomeCareModel::run`].
///
/// All methods have no-op defaults, so implementors only override what they
/// need.  The model is borrowed immutably: observers record, never steer.
pub trait SimObserver {
    /// After every processed tick.
    fn on_tick_end(&mut self, _model: &HomeCareModel) {}

    /// After the last tick of `day` (also fired for the final day).
    fn on_day_end(&mut self, _day: Day, _model: &HomeCareModel) {}

    /// Once, when the run stops (normally or broken).
    fn on_run_end(&mut self, _model: &HomeCareModel) {}
}

/// The do-nothing observer for callers that only want the end state.
pub struct NoopObserver;

impl SimObserver for NoopObserver {}
