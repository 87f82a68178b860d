//! Input nodes
//!
//! The entry node and data nodes that bring values into a graph.

mod constants;
mod env_get;
mod start;

pub use constants::{ConstKind, ConstNode};
pub use env_get::EnvGetNode;
pub use start::StartNode;
