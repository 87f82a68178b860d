//! Select Data Node

use std::sync::Arc;

use async_trait::async_trait;
use graph_runtime::{
    input_array_value, input_value, DescriptorFn, ExecutionState, InputDefinition, Inputs, Node,
    NodeBase, NodeDescriptor, NodeInit, NodeTypeDefinition, OutputDefinition, Outputs, Result,
    RuntimeError, Value,
};

/// Select Data Node
///
/// Picks one of its `choices[k]` by index. Only the selected choice is
/// resolved; the nodes behind the other choices are never asked for a value.
///
/// # Inputs
/// - `index` - Position of the choice to return
/// - `choices` - Candidate values
///
/// # Outputs
/// - `value` - The selected choice
pub struct SelectDataNode {
    base: NodeBase,
    inputs: Inputs,
    outputs: Outputs,
}

impl SelectDataNode {
    pub const PORT_INDEX: &'static str = "index";
    pub const PORT_CHOICES: &'static str = "choices";
    pub const PORT_VALUE: &'static str = "value";

    pub fn create(init: &mut NodeInit<'_>) -> Result<Arc<dyn Node>> {
        Ok(Arc::new(Self {
            base: init.base(),
            inputs: init.inputs(),
            outputs: init.outputs(),
        }))
    }
}

impl NodeDescriptor for SelectDataNode {
    fn descriptor() -> NodeTypeDefinition {
        NodeTypeDefinition::new("core/select-data", 1, "Select Data")
            .short_desc("Select one of several values by index")
            .category("processing")
            .input(Self::PORT_INDEX, InputDefinition::new("Index", "number", 0))
            .input(
                Self::PORT_CHOICES,
                InputDefinition::new("Choices", "any", 1)
                    .array()
                    .array_initial_count(2),
            )
            .output(Self::PORT_VALUE, OutputDefinition::new("Value", "unknown", 0))
    }
}

inventory::submit!(DescriptorFn(SelectDataNode::descriptor, SelectDataNode::create));

#[async_trait]
impl Node for SelectDataNode {
    fn base(&self) -> &NodeBase {
        &self.base
    }

    fn inputs(&self) -> Option<&Inputs> {
        Some(&self.inputs)
    }

    fn outputs(&self) -> Option<&Outputs> {
        Some(&self.outputs)
    }

    async fn output_value(&self, state: &Arc<ExecutionState>, _output_id: &str) -> Result<Value> {
        let index: i64 = input_value(self, state, Self::PORT_INDEX).await?;
        let mut choices: Vec<Value> =
            input_array_value(self, state, Self::PORT_CHOICES, Some(index)).await?;

        let position = usize::try_from(index).ok().filter(|i| *i < choices.len());
        match position {
            Some(i) => Ok(choices.swap_remove(i)),
            None => Err(RuntimeError::leaf(
                Some(state),
                format!(
                    "index out of range: {}, expected 0-{}",
                    index,
                    choices.len().saturating_sub(1)
                ),
            )),
        }
    }
}
