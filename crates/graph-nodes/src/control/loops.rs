//! Loop Nodes
//!
//! Single threaded iteration. The body runs on the same execution state as
//! the loop, so it reads the current index, key or value straight from the
//! loop node's outputs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use graph_runtime::{
    execute, input_value, set_output_value, DescriptorFn, ExecutionState, Executions,
    InputDefinition, Inputs, Iterable, Node, NodeBase, NodeDescriptor, NodeInit,
    NodeTypeDefinition, OutputDefinition, Outputs, Result, RuntimeError, SetOutputOpts, Value,
};

/// Execution input that stops a running loop after the current iteration
pub const PORT_EXEC_BREAK: &str = "exec-break";
pub const PORT_EXEC_BODY: &str = "exec-body";
pub const PORT_EXEC_COMPLETED: &str = "exec-completed";

/// For Loop Node
///
/// Runs `exec-body` for every index from `first_index` to `last_index`
/// (inclusive), then fires `exec-completed`. An empty range skips the body.
///
/// # Outputs
/// - `index` - Current index, valid while the body runs
pub struct ForLoopNode {
    base: NodeBase,
    inputs: Inputs,
    outputs: Outputs,
    executions: Executions,
    running: AtomicBool,
}

impl ForLoopNode {
    pub const PORT_FIRST_INDEX: &'static str = "first_index";
    pub const PORT_LAST_INDEX: &'static str = "last_index";
    pub const PORT_INDEX: &'static str = "index";

    pub fn create(init: &mut NodeInit<'_>) -> Result<Arc<dyn Node>> {
        Ok(Arc::new(Self {
            base: init.base(),
            inputs: init.inputs(),
            outputs: init.outputs(),
            executions: Executions::new(),
            running: AtomicBool::new(false),
        }))
    }
}

impl NodeDescriptor for ForLoopNode {
    fn descriptor() -> NodeTypeDefinition {
        NodeTypeDefinition::new("core/for-loop", 1, "For Loop")
            .short_desc("Run the body for every index of a range")
            .category("control")
            .input("exec", InputDefinition::exec("Exec", 0).required())
            .input(PORT_EXEC_BREAK, InputDefinition::exec("Break", 1))
            .input(Self::PORT_FIRST_INDEX, InputDefinition::new("First Index", "number", 2))
            .input(Self::PORT_LAST_INDEX, InputDefinition::new("Last Index", "number", 3))
            .output(PORT_EXEC_BODY, OutputDefinition::exec("Body", 0))
            .output(PORT_EXEC_COMPLETED, OutputDefinition::exec("Completed", 1))
            .output(Self::PORT_INDEX, OutputDefinition::new("Index", "number", 2))
    }
}

inventory::submit!(DescriptorFn(ForLoopNode::descriptor, ForLoopNode::create));

#[async_trait]
impl Node for ForLoopNode {
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
        if input_id == PORT_EXEC_BREAK {
            log::debug!("ForLoopNode {}: break requested", self.base.id());
            self.running.store(false, Ordering::SeqCst);
            return Ok(());
        }

        self.running.store(true, Ordering::SeqCst);
        let first: i64 = input_value(self, state, Self::PORT_FIRST_INDEX).await?;
        let last: i64 = input_value(self, state, Self::PORT_LAST_INDEX).await?;

        if first <= last && self.executions.has_target(PORT_EXEC_BODY) {
            log::debug!("ForLoopNode {}: iterating {}..={}", self.base.id(), first, last);
            for index in first..=last {
                if state.is_cancelled() || !self.running.load(Ordering::SeqCst) {
                    break;
                }
                set_output_value(self, state, Self::PORT_INDEX, Value::Int(index), SetOutputOpts::default())?;
                execute(self, PORT_EXEC_BODY, state, None).await?;
            }
        }

        execute(self, PORT_EXEC_COMPLETED, state, None).await
    }
}

/// For Each Node
///
/// Iterates arrays (index, element), maps (key, value, ordered by key),
/// strings (index, character) and streams (index, byte).
pub struct ForEachNode {
    base: NodeBase,
    inputs: Inputs,
    outputs: Outputs,
    executions: Executions,
    running: AtomicBool,
}

impl ForEachNode {
    pub const PORT_INPUT: &'static str = "input";
    pub const PORT_KEY: &'static str = "key";
    pub const PORT_VALUE: &'static str = "value";

    pub fn create(init: &mut NodeInit<'_>) -> Result<Arc<dyn Node>> {
        Ok(Arc::new(Self {
            base: init.base(),
            inputs: init.inputs(),
            outputs: init.outputs(),
            executions: Executions::new(),
            running: AtomicBool::new(false),
        }))
    }
}

impl NodeDescriptor for ForEachNode {
    fn descriptor() -> NodeTypeDefinition {
        NodeTypeDefinition::new("core/for-each-loop", 1, "For Each")
            .short_desc("Run the body for every element of a collection")
            .category("control")
            .input("exec", InputDefinition::exec("Exec", 0).required())
            .input(PORT_EXEC_BREAK, InputDefinition::exec("Break", 1))
            .input(Self::PORT_INPUT, InputDefinition::new("Input", "iterable", 2).required())
            .output(PORT_EXEC_BODY, OutputDefinition::exec("Body", 0))
            .output(PORT_EXEC_COMPLETED, OutputDefinition::exec("Completed", 1))
            .output(Self::PORT_KEY, OutputDefinition::new("Key", "unknown", 2))
            .output(Self::PORT_VALUE, OutputDefinition::new("Value", "unknown", 3))
    }
}

inventory::submit!(DescriptorFn(ForEachNode::descriptor, ForEachNode::create));

#[async_trait]
impl Node for ForEachNode {
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
        if input_id == PORT_EXEC_BREAK {
            log::debug!("ForEachNode {}: break requested", self.base.id());
            self.running.store(false, Ordering::SeqCst);
            return Ok(());
        }

        self.running.store(true, Ordering::SeqCst);
        let items: Iterable = input_value(self, state, Self::PORT_INPUT).await?;

        for item in items {
            if state.is_cancelled() || !self.running.load(Ordering::SeqCst) {
                break;
            }
            let (key, value) = item?;
            set_output_value(self, state, Self::PORT_KEY, key, SetOutputOpts::default())?;
            set_output_value(self, state, Self::PORT_VALUE, value, SetOutputOpts::default())?;
            execute(self, PORT_EXEC_BODY, state, None).await?;
        }

        execute(self, PORT_EXEC_COMPLETED, state, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptors_validate() {
        let mut for_loop = ForLoopNode::descriptor();
        for_loop.validate().unwrap();
        assert!(for_loop.inputs["exec"].required);
        assert!(!for_loop.inputs[PORT_EXEC_BREAK].required);

        let mut for_each = ForEachNode::descriptor();
        for_each.validate().unwrap();
        assert_eq!(for_each.key(), "core/for-each-loop@v1");
    }
}
