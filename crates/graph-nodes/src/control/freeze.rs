//! Freeze Node
//!
//! Captures a value when execution passes through and keeps re-emitting it.

use std::sync::Arc;

use async_trait::async_trait;
use graph_runtime::{
    execute, input_value, set_output_value, DescriptorFn, ExecutionState, Executions,
    InputDefinition, Inputs, Node, NodeBase, NodeDescriptor, NodeInit, NodeTypeDefinition,
    OutputDefinition, Outputs, Result, RuntimeError, SetOutputOpts, Value,
};

/// Freeze Node
///
/// # Inputs
/// - `exec` - Captures `init` into `value` and fires `exec`
/// - `exec-reset` - Replaces `value` with `replace`; nothing downstream runs
/// - `init` - Value captured on `exec`
/// - `replace` - Value captured on `exec-reset`
///
/// # Outputs
/// - `value` - The captured value
pub struct FreezeNode {
    base: NodeBase,
    inputs: Inputs,
    outputs: Outputs,
    executions: Executions,
}

impl FreezeNode {
    pub const PORT_EXEC: &'static str = "exec";
    pub const PORT_EXEC_RESET: &'static str = "exec-reset";
    pub const PORT_INIT: &'static str = "init";
    pub const PORT_REPLACE: &'static str = "replace";
    pub const PORT_VALUE: &'static str = "value";

    pub fn create(init: &mut NodeInit<'_>) -> Result<Arc<dyn Node>> {
        Ok(Arc::new(Self {
            base: init.base(),
            inputs: init.inputs(),
            outputs: init.outputs(),
            executions: Executions::new(),
        }))
    }
}

impl NodeDescriptor for FreezeNode {
    fn descriptor() -> NodeTypeDefinition {
        NodeTypeDefinition::new("core/freeze", 1, "Freeze")
            .short_desc("Capture a value and keep it for later executions")
            .category("control")
            .input(Self::PORT_EXEC, InputDefinition::exec("Exec", 0).required())
            .input(Self::PORT_EXEC_RESET, InputDefinition::exec("Reset", 1))
            .input(Self::PORT_INIT, InputDefinition::new("Init", "any", 2))
            .input(Self::PORT_REPLACE, InputDefinition::new("Replace", "any", 3))
            .output(Self::PORT_EXEC, OutputDefinition::exec("Exec", 0))
            .output(Self::PORT_VALUE, OutputDefinition::new("Value", "unknown", 1))
    }
}

inventory::submit!(DescriptorFn(FreezeNode::descriptor, FreezeNode::create));

#[async_trait]
impl Node for FreezeNode {
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
        match input_id {
            Self::PORT_EXEC => {
                let value: Value = input_value(self, state, Self::PORT_INIT).await?;
                set_output_value(self, state, Self::PORT_VALUE, value, SetOutputOpts::default())?;
                execute(self, Self::PORT_EXEC, state, None).await
            }
            Self::PORT_EXEC_RESET => {
                let value: Value = input_value(self, state, Self::PORT_REPLACE).await?;
                log::debug!("FreezeNode {}: value replaced", self.base.id());
                set_output_value(self, state, Self::PORT_VALUE, value, SetOutputOpts::default())
            }
            other => Err(RuntimeError::leaf(
                Some(state),
                format!("unknown input '{}'", other),
            )),
        }
    }
}
