//! Group boundary nodes
//!
//! `group-inputs` is the entry of a group's inner graph and mirrors the
//! group's declared inputs as outputs. `group-outputs` is the sink and
//! mirrors the declared outputs as inputs. Both pass values and execution
//! straight through.

use std::sync::Arc;

use async_trait::async_trait;
use graph_runtime::{
    execute, input_value_raw, CacheType, DescriptorFn, ExecutionState, Executions,
    InputDefinition, Inputs, Node, NodeBase, NodeDescriptor, NodeInit, NodeKind,
    NodeTypeDefinition, OutputDefinition, Outputs, Result, RuntimeError, Value,
};

/// Group Inputs Node
pub struct GroupInputsNode {
    base: NodeBase,
    inputs: Inputs,
    outputs: Outputs,
    executions: Executions,
}

impl GroupInputsNode {
    pub fn create(init: &mut NodeInit<'_>) -> Result<Arc<dyn Node>> {
        let declared = init.scope.map(|s| s.inputs.clone()).unwrap_or_default();
        let mirrored = declared
            .iter()
            .map(|(id, def)| (id.clone(), OutputDefinition::from(def)))
            .collect();

        Ok(Arc::new(Self {
            base: init.base(),
            inputs: Inputs::with_defs(declared),
            outputs: Outputs::with_defs(mirrored),
            executions: Executions::new(),
        }))
    }
}

impl NodeDescriptor for GroupInputsNode {
    fn descriptor() -> NodeTypeDefinition {
        NodeTypeDefinition::new("core/group-inputs", 1, "Group Inputs")
            .short_desc("Inputs of the enclosing group")
            .category("group")
    }
}

inventory::submit!(DescriptorFn(GroupInputsNode::descriptor, GroupInputsNode::create));

#[async_trait]
impl Node for GroupInputsNode {
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

    fn kind(&self) -> NodeKind {
        NodeKind::GroupInputs
    }

    // Pass-through values must survive the ephemeral reset between
    // execution nodes of the inner graph.
    fn cache_type(&self) -> CacheType {
        CacheType::Permanent
    }

    async fn output_value(&self, state: &Arc<ExecutionState>, output_id: &str) -> Result<Value> {
        input_value_raw(self, state, output_id, None).await
    }

    async fn execute_impl(
        &self,
        state: &Arc<ExecutionState>,
        input_id: &str,
        _prev: Option<RuntimeError>,
    ) -> Result<()> {
        execute(self, input_id, state, None).await
    }
}

/// Group Outputs Node
pub struct GroupOutputsNode {
    base: NodeBase,
    inputs: Inputs,
    outputs: Outputs,
    executions: Executions,
}

impl GroupOutputsNode {
    pub fn create(init: &mut NodeInit<'_>) -> Result<Arc<dyn Node>> {
        let declared = init.scope.map(|s| s.outputs.clone()).unwrap_or_default();
        let mirrored = declared
            .iter()
            .map(|(id, def)| (id.clone(), InputDefinition::from(def)))
            .collect();

        Ok(Arc::new(Self {
            base: init.base(),
            inputs: Inputs::with_defs(mirrored),
            outputs: Outputs::with_defs(declared),
            executions: Executions::new(),
        }))
    }
}

impl NodeDescriptor for GroupOutputsNode {
    fn descriptor() -> NodeTypeDefinition {
        NodeTypeDefinition::new("core/group-outputs", 1, "Group Outputs")
            .short_desc("Outputs of the enclosing group")
            .category("group")
    }
}

inventory::submit!(DescriptorFn(GroupOutputsNode::descriptor, GroupOutputsNode::create));

#[async_trait]
impl Node for GroupOutputsNode {
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

    fn kind(&self) -> NodeKind {
        NodeKind::GroupOutputs
    }

    async fn output_value(&self, state: &Arc<ExecutionState>, output_id: &str) -> Result<Value> {
        input_value_raw(self, state, output_id, None).await
    }

    /// Errors routed into the boundary are handed on to the group node
    async fn execute_impl(
        &self,
        state: &Arc<ExecutionState>,
        input_id: &str,
        prev: Option<RuntimeError>,
    ) -> Result<()> {
        execute(self, input_id, state, prev).await
    }
}
