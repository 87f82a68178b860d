//! Sequence Node
//!
//! Fires every connected `exec[k]` output one after the other.

use std::sync::Arc;

use async_trait::async_trait;
use graph_runtime::types::parse_index_port;
use graph_runtime::{
    execute, DescriptorFn, ExecutionState, Executions, InputDefinition, Inputs, Node, NodeBase,
    NodeDescriptor, NodeInit, NodeTypeDefinition, OutputDefinition, Outputs, Result, RuntimeError,
};

/// Sequence Node
///
/// Outputs are visited in ascending index order. A failing branch stops the
/// sequence and its error is returned.
pub struct SequenceNode {
    base: NodeBase,
    inputs: Inputs,
    outputs: Outputs,
    executions: Executions,
}

impl SequenceNode {
    pub const PORT_EXEC: &'static str = "exec";

    pub fn create(init: &mut NodeInit<'_>) -> Result<Arc<dyn Node>> {
        Ok(Arc::new(Self {
            base: init.base(),
            inputs: init.inputs(),
            outputs: init.outputs(),
            executions: Executions::new(),
        }))
    }
}

impl NodeDescriptor for SequenceNode {
    fn descriptor() -> NodeTypeDefinition {
        NodeTypeDefinition::new("core/sequence", 1, "Sequence")
            .short_desc("Run several paths one after the other")
            .category("control")
            .input(Self::PORT_EXEC, InputDefinition::exec("Exec", 0))
            .output(Self::PORT_EXEC, OutputDefinition::exec("Exec", 0).array())
    }
}

inventory::submit!(DescriptorFn(SequenceNode::descriptor, SequenceNode::create));

#[async_trait]
impl Node for SequenceNode {
    fn base(&self) -> &NodeBase {
        &self.base
    }

    fn inputs(&self) -> Option<&Inputs> {
        Some(&self.inputs)
    }

    fn outputs(&self) -> Option<&Outputs> {
        Some(&self.outputs)
    }

    fn executions(&self) -> Option<&Executions> {
        Some(&self.executions)
    }

    async fn execute_impl(
        &self,
        state: &Arc<ExecutionState>,
        _input_id: &str,
        _prev: Option<RuntimeError>,
    ) -> Result<()> {
        let mut ports = Vec::new();
        for port in self.executions.connected_ports() {
            let (_, index) = parse_index_port(&port).ok_or_else(|| {
                RuntimeError::leaf(Some(state), format!("invalid output id {}", port))
            })?;
            ports.push((index, port));
        }
        ports.sort();

        for (_, port) in ports {
            if state.is_cancelled() {
                break;
            }
            execute(self, &port, state, None).await?;
        }
        Ok(())
    }
}
