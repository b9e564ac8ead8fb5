//! Scheduling: the default graph, the orchestrator that executes it and the
//! controller that runs executions in the background.

pub mod controller;
pub mod orchestrator;
pub mod registry;

pub use controller::RunController;
pub use orchestrator::{Orchestrator, OrchestratorOptions};
pub use registry::default_graph;
