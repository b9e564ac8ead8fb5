//! Turning unit payloads into a ranked action plan.
//!
//! Units declare [`ActionRule`]s; [`reduce`] applies them once a run has
//! settled. The aggregator summarizes finished plans for reports.

pub mod aggregator;
pub mod integrator;
pub mod rules;

pub use integrator::reduce;
pub use rules::ActionRule;
