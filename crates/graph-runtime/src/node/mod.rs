//! Node capabilities
//!
//! A node is composed from up to four independent capabilities:
//!
//! - [`NodeBase`]: identity (id, full path, type, cache id, parent group)
//! - [`Inputs`]: input port definitions, literals and incoming data edges
//! - [`Outputs`]: output port definitions and connection counters
//! - [`Executions`]: outgoing execution edges
//!
//! Concrete nodes hold the capabilities they need and expose them through
//! the [`Node`] trait. Data nodes implement [`Node::output_value`] and compute
//! their values lazily; execution nodes implement [`Node::execute_impl`] and
//! publish their outputs with [`set_output_value`] before firing the next
//! execution edge.
//!
//! ```ignore
//! #[async_trait]
//! impl Node for BranchNode {
//!     fn base(&self) -> &NodeBase { &self.base }
//!     fn inputs(&self) -> Option<&Inputs> { Some(&self.inputs) }
//!     fn executions(&self) -> Option<&Executions> { Some(&self.executions) }
//!
//!     async fn execute_impl(&self, state: &Arc<ExecutionState>, _input: &str, _prev: Option<RuntimeError>) -> Result<()> {
//!         let condition: bool = input_value(self, state, "condition").await?;
//!         let port = if condition { "exec-then" } else { "exec-otherwise" };
//!         execute(self, port, state, None).await
//!     }
//! }
//! ```

mod base;
mod executions;
mod inputs;
mod outputs;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{Result, RuntimeError};
use crate::state::{CacheType, ExecutionState};
use crate::value::Value;

pub use base::NodeBase;
pub use executions::{dispatch, execute, ExecutionTarget, Executions};
pub use inputs::{
    connect_data_port, input_array_value, input_value, input_value_raw, ordinal, DataSource,
    IndexPortInfo, Inputs,
};
pub use outputs::{is_value_valid_for_output, set_output_value, Outputs, SetOutputOpts};

/// Structural role of a node, used where group boundaries need special handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Regular,
    Group,
    GroupInputs,
    GroupOutputs,
}

/// A node instance in a loaded graph
#[async_trait]
pub trait Node: Send + Sync + 'static {
    fn base(&self) -> &NodeBase;

    fn inputs(&self) -> Option<&Inputs> {
        None
    }

    fn outputs(&self) -> Option<&Outputs> {
        None
    }

    fn executions(&self) -> Option<&Executions> {
        None
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Regular
    }

    /// Cache that values produced by this node are stored in
    fn cache_type(&self) -> CacheType {
        if self.base().is_execution_node() {
            CacheType::Permanent
        } else {
            CacheType::Ephemeral
        }
    }

    /// Compute the value of an output port.
    ///
    /// Execution nodes publish their outputs while executing, so the default
    /// reports a missing value.
    async fn output_value(&self, state: &Arc<ExecutionState>, output_id: &str) -> Result<Value> {
        Err(RuntimeError::no_output_value(
            Some(state),
            format!("output port '{}' has no value", output_id),
        ))
    }

    /// Run the node after an execution edge arrived at `input_id`.
    ///
    /// `prev` carries the error of an upstream node that routed its failure
    /// into this node.
    async fn execute_impl(
        &self,
        state: &Arc<ExecutionState>,
        input_id: &str,
        prev: Option<RuntimeError>,
    ) -> Result<()> {
        let _ = (input_id, prev);
        Err(RuntimeError::leaf(
            Some(state),
            format!("node '{}' has no execution interface", self.base().id()),
        ))
    }

    /// Whether the node can start a run
    fn is_entry(&self) -> bool {
        false
    }

    /// Start a run from this node
    async fn execute_entry(&self, state: &Arc<ExecutionState>, args: Vec<String>) -> Result<()> {
        let _ = args;
        Err(RuntimeError::leaf(
            Some(state),
            format!("node '{}' is not an entry node", self.base().id()),
        ))
    }
}

impl std::fmt::Debug for dyn Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.base().id())
            .field("type", &self.base().node_type())
            .field("kind", &self.kind())
            .finish()
    }
}
