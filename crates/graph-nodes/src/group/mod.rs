//! Group nodes
//!
//! Sub-graph composition: the group node and the two boundary nodes of its
//! inner graph.

mod boundary;
mod group_node;

pub use boundary::{GroupInputsNode, GroupOutputsNode};
pub use group_node::GroupNode;
