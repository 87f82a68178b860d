//! Length Node

use std::sync::Arc;

use async_trait::async_trait;
use graph_runtime::{
    input_value, DescriptorFn, ExecutionState, InputDefinition, Inputs, Node, NodeBase,
    NodeDescriptor, NodeInit, NodeTypeDefinition, OutputDefinition, Outputs, Result, RuntimeError,
    Value,
};

/// Element count of `value`.
///
/// Strings count characters. Streams report their known length or are read
/// to the end. Scalars have a length of 0 so a loop over them never spins.
pub fn value_length(value: &Value) -> Result<usize> {
    Ok(match value {
        Value::Array(items) => items.len(),
        Value::Map(map) => map.len(),
        Value::String(s) => s.chars().count(),
        Value::Bytes(b) => b.len(),
        Value::Stream(stream) => match stream.length {
            Some(length) => length as usize,
            None => stream.read_all()?.len(),
        },
        _ => 0,
    })
}

/// Length Node
///
/// # Inputs
/// - `input` - Array, map, string, bytes or stream
///
/// # Outputs
/// - `length` - Number of elements
pub struct LengthNode {
    base: NodeBase,
    inputs: Inputs,
    outputs: Outputs,
}

impl LengthNode {
    pub const PORT_INPUT: &'static str = "input";
    pub const PORT_LENGTH: &'static str = "length";

    pub fn create(init: &mut NodeInit<'_>) -> Result<Arc<dyn Node>> {
        Ok(Arc::new(Self {
            base: init.base(),
            inputs: init.inputs(),
            outputs: init.outputs(),
        }))
    }
}

impl NodeDescriptor for LengthNode {
    fn descriptor() -> NodeTypeDefinition {
        NodeTypeDefinition::new("core/length", 1, "Length")
            .short_desc("Number of elements in an array, map or string")
            .category("processing")
            .input(Self::PORT_INPUT, InputDefinition::new("Input", "any", 0))
            .output(Self::PORT_LENGTH, OutputDefinition::new("Length", "number", 0))
    }
}

inventory::submit!(DescriptorFn(LengthNode::descriptor, LengthNode::create));

#[async_trait]
impl Node for LengthNode {
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
        if output_id != Self::PORT_LENGTH {
            return Err(RuntimeError::no_output_value(
                Some(state),
                format!("output port '{}' has no value", output_id),
            ));
        }

        let input: Value = input_value(self, state, Self::PORT_INPUT).await?;
        let length = value_length(&input).map_err(|e| {
            RuntimeError::create(Some(state), Some(e), "failed to determine length")
        })?;
        Ok(Value::from(length))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graph_runtime::DataStream;

    #[test]
    fn test_value_length() {
        assert_eq!(value_length(&Value::from(vec![Value::Int(1), Value::Int(2)])).unwrap(), 2);
        assert_eq!(value_length(&Value::from("héllo")).unwrap(), 5);
        assert_eq!(value_length(&Value::Bytes(vec![1, 2, 3])).unwrap(), 3);
        assert_eq!(
            value_length(&Value::from(DataStream::from_bytes(b"abcd".to_vec()))).unwrap(),
            4
        );
        assert_eq!(value_length(&Value::Int(12)).unwrap(), 0);
        assert_eq!(value_length(&Value::Null).unwrap(), 0);
    }

    #[test]
    fn test_descriptor() {
        let mut def = LengthNode::descriptor();
        def.validate().unwrap();
    }
}
