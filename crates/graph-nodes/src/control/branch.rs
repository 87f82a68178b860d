//! Branch Node
//!
//! Routes execution to one of two outputs depending on a boolean condition.

use std::sync::Arc;

use async_trait::async_trait;
use graph_runtime::{
    execute, input_value, DescriptorFn, ExecutionState, Executions, InputDefinition, Inputs, Node,
    NodeBase, NodeDescriptor, NodeInit, NodeTypeDefinition, OutputDefinition, Outputs, Result,
    RuntimeError,
};

/// Branch Node
///
/// # Inputs
/// - `exec` - Execution input
/// - `condition` - Boolean that selects the branch
///
/// # Outputs
/// - `exec-then` - Fired when the condition is true
/// - `exec-otherwise` - Fired when the condition is false
pub struct BranchNode {
    base: NodeBase,
    inputs: Inputs,
    outputs: Outputs,
    executions: Executions,
}

impl BranchNode {
    pub const PORT_CONDITION: &'static str = "condition";
    pub const PORT_EXEC_THEN: &'static str = "exec-then";
    pub const PORT_EXEC_OTHERWISE: &'static str = "exec-otherwise";

    pub fn create(init: &mut NodeInit<'_>) -> Result<Arc<dyn Node>> {
        Ok(Arc::new(Self {
            base: init.base(),
            inputs: init.inputs(),
            outputs: init.outputs(),
            executions: Executions::new(),
        }))
    }
}

impl NodeDescriptor for BranchNode {
    fn descriptor() -> NodeTypeDefinition {
        NodeTypeDefinition::new("core/branch", 1, "Branch")
            .short_desc("Run one of two paths depending on a condition")
            .category("control")
            .input("exec", InputDefinition::exec("Exec", 0))
            .input(Self::PORT_CONDITION, InputDefinition::new("Condition", "bool", 1))
            .output(Self::PORT_EXEC_THEN, OutputDefinition::exec("Then", 0))
            .output(Self::PORT_EXEC_OTHERWISE, OutputDefinition::exec("Otherwise", 1))
    }
}

inventory::submit!(DescriptorFn(BranchNode::descriptor, BranchNode::create));

#[async_trait]
impl Node for BranchNode {
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
        let condition: bool = input_value(self, state, Self::PORT_CONDITION).await?;
        log::debug!("BranchNode {}: condition is {}", self.base.id(), condition);

        let port = if condition {
            Self::PORT_EXEC_THEN
        } else {
            Self::PORT_EXEC_OTHERWISE
        };
        execute(self, port, state, None).await
    }
}
