//! Array Get Node

use std::sync::Arc;

use async_trait::async_trait;
use graph_runtime::{
    input_value, DescriptorFn, ExecutionState, Indexable, InputDefinition, Inputs, Node, NodeBase,
    NodeDescriptor, NodeInit, NodeTypeDefinition, OutputDefinition, Outputs, Result, RuntimeError,
    Value,
};

/// Zero value for an element of `array`
fn element_zero(array: Indexable) -> Value {
    match array.into_value() {
        Value::Array(items) => Value::element_zero(&items),
        Value::String(_) => Value::String(String::new()),
        Value::Bytes(_) => Value::Int(0),
        _ => Value::Null,
    }
}

/// Array Get Node
///
/// Reads one element of an array, string or byte buffer. An index out of
/// range fails while `bound_check` is set and yields the element zero value
/// otherwise.
///
/// # Inputs
/// - `array` - Collection to read from
/// - `index` - Zero based position
/// - `bound_check` - Fail on an index out of range, true by default
///
/// # Outputs
/// - `value` - The element
pub struct ArrayGetNode {
    base: NodeBase,
    inputs: Inputs,
    outputs: Outputs,
}

impl ArrayGetNode {
    pub const PORT_ARRAY: &'static str = "array";
    pub const PORT_INDEX: &'static str = "index";
    pub const PORT_BOUND_CHECK: &'static str = "bound_check";
    pub const PORT_VALUE: &'static str = "value";

    pub fn create(init: &mut NodeInit<'_>) -> Result<Arc<dyn Node>> {
        Ok(Arc::new(Self {
            base: init.base(),
            inputs: init.inputs(),
            outputs: init.outputs(),
        }))
    }
}

impl NodeDescriptor for ArrayGetNode {
    fn descriptor() -> NodeTypeDefinition {
        NodeTypeDefinition::new("core/array-get", 1, "Array Get")
            .short_desc("Get the element at an index")
            .category("processing")
            .input(Self::PORT_ARRAY, InputDefinition::new("Array", "indexable", 0))
            .input(Self::PORT_INDEX, InputDefinition::new("Index", "number", 1))
            .input(
                Self::PORT_BOUND_CHECK,
                InputDefinition::new("Bound Check", "bool", 2).with_default(serde_json::json!(true)),
            )
            .output(Self::PORT_VALUE, OutputDefinition::new("Value", "unknown", 0))
    }
}

inventory::submit!(DescriptorFn(ArrayGetNode::descriptor, ArrayGetNode::create));

#[async_trait]
impl Node for ArrayGetNode {
    fn base(&self) -> &NodeBase {
        &self.base
    }

    fn inputs(&self) -> Option<&Inputs> {
        Some(&self.inputs)
    }

    fn outputs(&self) -> Option<&Outputs> {
        Some(&self.outputs)
    }

    async fn output_value(&self, state: &Arc<ExecutionState>, output_id: &str) -> Result<Value> {
        if output_id != Self::PORT_VALUE {
            return Err(RuntimeError::no_output_value(
                Some(state),
                format!("output port '{}' has no value", output_id),
            ));
        }

        let array: Indexable = input_value(self, state, Self::PORT_ARRAY).await?;
        let index: i64 = input_value(self, state, Self::PORT_INDEX).await?;
        let bound_check: bool = input_value(self, state, Self::PORT_BOUND_CHECK).await?;

        let element = usize::try_from(index).ok().and_then(|i| array.index(i));
        match element {
            Some(value) => Ok(value),
            None if bound_check => Err(RuntimeError::leaf(
                Some(state),
                format!("index out of bounds: {} (length {})", index, array.len()),
            )),
            None => Ok(element_zero(array)),
        }
    }
}
