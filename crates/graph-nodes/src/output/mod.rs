//! Output nodes
//!
//! Nodes that write results out of the graph.

mod print;

pub use print::PrintNode;
