//! Select Exec Node
//!
//! Merges several execution paths and reports which one arrived.

use std::sync::Arc;

use async_trait::async_trait;
use graph_runtime::types::parse_index_port;
use graph_runtime::{
    execute, set_output_value, DescriptorFn, ExecutionState, Executions, InputDefinition, Inputs,
    Node, NodeBase, NodeDescriptor, NodeInit, NodeTypeDefinition, OutputDefinition, Outputs,
    Result, RuntimeError, SetOutputOpts, Value,
};

/// Select Exec Node
///
/// # Inputs
/// - `exec[k]` - Execution inputs
///
/// # Outputs
/// - `exec` - Fired for every arrival
/// - `index` - Index `k` of the input that fired
pub struct SelectExecNode {
    base: NodeBase,
    inputs: Inputs,
    outputs: Outputs,
    executions: Executions,
}

impl SelectExecNode {
    pub const PORT_EXEC: &'static str = "exec";
    pub const PORT_INDEX: &'static str = "index";

    pub fn create(init: &mut NodeInit<'_>) -> Result<Arc<dyn Node>> {
        Ok(Arc::new(Self {
            base: init.base(),
            inputs: init.inputs(),
            outputs: init.outputs(),
            executions: Executions::new(),
        }))
    }
}

impl NodeDescriptor for SelectExecNode {
    fn descriptor() -> NodeTypeDefinition {
        NodeTypeDefinition::new("core/select-exec", 1, "Select Exec")
            .short_desc("Continue from whichever execution input fired")
            .category("control")
            .input(Self::PORT_EXEC, InputDefinition::exec("Exec", 0).array())
            .output(Self::PORT_EXEC, OutputDefinition::exec("Exec", 0))
            .output(Self::PORT_INDEX, OutputDefinition::new("Index", "number", 1))
    }
}

inventory::submit!(DescriptorFn(SelectExecNode::descriptor, SelectExecNode::create));

#[async_trait]
impl Node for SelectExecNode {
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
        input_id: &str,
        _prev: Option<RuntimeError>,
    ) -> Result<()> {
        let (_, index) = parse_index_port(input_id).ok_or_else(|| {
            RuntimeError::leaf(Some(state), format!("invalid input id: {}", input_id))
        })?;

        set_output_value(self, state, Self::PORT_INDEX, Value::Int(index), SetOutputOpts::default())?;
        execute(self, Self::PORT_EXEC, state, None).await
    }
}
