//! Task graph declaration and validation.

pub mod task_graph;

pub use task_graph::{GraphNode, TaskGraph};
