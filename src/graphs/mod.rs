//! Workflow graph construction and compilation.
//!
//! A graph is assembled with [`GraphBuilder`], validated and frozen into a
//! [`Workflow`] by `compile()`, and the three shipped topologies are built
//! by one parameterized constructor in [`profiles`].

mod builder;
mod compilation;
mod edges;
pub mod profiles;

pub use builder::GraphBuilder;
pub use compilation::{GraphError, Workflow};
pub use edges::{ConditionalEdge, RouteFn};
pub use profiles::GraphProfile;
