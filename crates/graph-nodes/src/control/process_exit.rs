//! Process Exit Node
//!
//! Ends the whole run with an exit code. Nothing downstream of any branch
//! runs once this node fired.

use std::sync::Arc;

use async_trait::async_trait;
use graph_runtime::{
    input_value, DescriptorFn, ExecutionState, InputDefinition, Inputs, Node, NodeBase,
    NodeDescriptor, NodeInit, NodeTypeDefinition, Result, RuntimeError,
};

/// Process Exit Node
///
/// Records `code` on the run and cancels the root execution state. The run
/// then returns [`RuntimeError::Exit`] carrying the code.
///
/// # Inputs
/// - `exec` - Execution input
/// - `code` - Exit code, 0 when unset
pub struct ProcessExitNode {
    base: NodeBase,
    inputs: Inputs,
}

impl ProcessExitNode {
    pub const PORT_EXEC: &'static str = "exec";
    pub const PORT_CODE: &'static str = "code";

    pub fn create(init: &mut NodeInit<'_>) -> Result<Arc<dyn Node>> {
        Ok(Arc::new(Self {
            base: init.base(),
            inputs: init.inputs(),
        }))
    }
}

impl NodeDescriptor for ProcessExitNode {
    fn descriptor() -> NodeTypeDefinition {
        NodeTypeDefinition::new("core/process-exit", 1, "Process Exit")
            .short_desc("Stop the graph and exit with a code")
            .category("control")
            .input(Self::PORT_EXEC, InputDefinition::exec("Exec", 0))
            .input(Self::PORT_CODE, InputDefinition::new("Exit Code", "number", 1))
    }
}

inventory::submit!(DescriptorFn(ProcessExitNode::descriptor, ProcessExitNode::create));

#[async_trait]
impl Node for ProcessExitNode {
    fn base(&self) -> &NodeBase {
        &self.base
    }

    fn inputs(&self) -> Option<&Inputs> {
        Some(&self.inputs)
    }

    async fn execute_impl(
        &self,
        state: &Arc<ExecutionState>,
        _input_id: &str,
        _prev: Option<RuntimeError>,
    ) -> Result<()> {
        let code: i32 = input_value(self, state, Self::PORT_CODE).await?;
        log::info!("ProcessExitNode {}: exit requested with code {}", self.base.id(), code);
        state.request_exit(code);
        Ok(())
    }
}
