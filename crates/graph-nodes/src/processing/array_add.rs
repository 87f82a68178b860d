//! Array Add Node

use std::sync::Arc;

use async_trait::async_trait;
use graph_runtime::{
    execute, input_value, set_output_value, DescriptorFn, ExecutionState, Executions, Indexable,
    InputDefinition, Inputs, Node, NodeBase, NodeDescriptor, NodeInit, NodeTypeDefinition,
    OutputDefinition, Outputs, Result, RuntimeError, SetOutputOpts, Value,
};

/// Array Add Node
///
/// Appends `item` to a copy of `array`. The input value is never modified,
/// so every execution state sees the array it was given.
///
/// # Inputs
/// - `exec` - Execution input
/// - `array` - Array, string or byte buffer to append to
/// - `item` - Element to append
///
/// # Outputs
/// - `array` - The extended collection
/// - `index` - Position of the appended element
pub struct ArrayAddNode {
    base: NodeBase,
    inputs: Inputs,
    outputs: Outputs,
    executions: Executions,
}

impl ArrayAddNode {
    pub const PORT_EXEC: &'static str = "exec";
    pub const PORT_ARRAY: &'static str = "array";
    pub const PORT_ITEM: &'static str = "item";
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

impl NodeDescriptor for ArrayAddNode {
    fn descriptor() -> NodeTypeDefinition {
        NodeTypeDefinition::new("core/array-add", 1, "Array Add")
            .short_desc("Append an element to an array")
            .category("processing")
            .input(Self::PORT_EXEC, InputDefinition::exec("Exec", 0))
            .input(Self::PORT_ARRAY, InputDefinition::new("Array", "indexable", 1))
            .input(Self::PORT_ITEM, InputDefinition::new("Item", "any", 2))
            .output(Self::PORT_EXEC, OutputDefinition::exec("Exec", 0))
            .output(Self::PORT_ARRAY, OutputDefinition::new("Array", "unknown", 1))
            .output(Self::PORT_INDEX, OutputDefinition::new("Index", "number", 2))
    }
}

inventory::submit!(DescriptorFn(ArrayAddNode::descriptor, ArrayAddNode::create));

#[async_trait]
impl Node for ArrayAddNode {
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
        let mut array: Indexable = input_value(self, state, Self::PORT_ARRAY).await?;
        let item: Value = input_value(self, state, Self::PORT_ITEM).await?;

        let index = array.len();
        array
            .append(item)
            .map_err(|e| RuntimeError::create(Some(state), Some(e), "failed to append item"))?;

        set_output_value(self, state, Self::PORT_ARRAY, array.into_value(), SetOutputOpts::default())?;
        set_output_value(self, state, Self::PORT_INDEX, Value::from(index), SetOutputOpts::default())?;

        execute(self, Self::PORT_EXEC, state, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor() {
        let mut def = ArrayAddNode::descriptor();
        def.validate().unwrap();
        assert!(def.inputs[ArrayAddNode::PORT_EXEC].required);
    }
}
