//! Print Node
//!
//! Writes values to the run's output sink, one line per value.

use std::sync::Arc;

use async_trait::async_trait;
use graph_runtime::{
    execute, input_array_value, DescriptorFn, ExecutionState, Executions, InputDefinition,
    Inputs, Node, NodeBase, NodeDescriptor, NodeInit, NodeTypeDefinition, OutputDefinition,
    Outputs, Result, RuntimeError, Value,
};

/// Print Node
///
/// # Inputs
/// - `exec` - Execution input
/// - `values` - Values to print, in index order
///
/// # Outputs
/// - `exec` - Fired after every value was written
pub struct PrintNode {
    base: NodeBase,
    inputs: Inputs,
    outputs: Outputs,
    executions: Executions,
}

impl PrintNode {
    pub const PORT_EXEC: &'static str = "exec";
    pub const PORT_VALUES: &'static str = "values";

    pub fn create(init: &mut NodeInit<'_>) -> Result<Arc<dyn Node>> {
        Ok(Arc::new(Self {
            base: init.base(),
            inputs: init.inputs(),
            outputs: init.outputs(),
            executions: Executions::new(),
        }))
    }
}

impl NodeDescriptor for PrintNode {
    fn descriptor() -> NodeTypeDefinition {
        NodeTypeDefinition::new("core/print", 1, "Print")
            .short_desc("Print values to standard output")
            .category("output")
            .input(Self::PORT_EXEC, InputDefinition::exec("Exec", 0))
            .input(
                Self::PORT_VALUES,
                InputDefinition::new("Values", "any", 1).array(),
            )
            .output(Self::PORT_EXEC, OutputDefinition::exec("Exec", 0))
    }
}

inventory::submit!(DescriptorFn(PrintNode::descriptor, PrintNode::create));

#[async_trait]
impl Node for PrintNode {
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
        let values: Vec<Value> = input_array_value(self, state, Self::PORT_VALUES, None).await?;
        for value in values {
            state.output().write_line(&value.to_string())?;
        }
        execute(self, Self::PORT_EXEC, state, None).await
    }
}
