//! Constant Nodes
//!
//! Data nodes that hand their `value` input on unchanged, typed by the node.
//! Expressions in the literal are evaluated like on any other input.

use std::sync::Arc;

use async_trait::async_trait;
use graph_runtime::{
    input_value, DescriptorFn, ExecutionState, FromValue, InputDefinition, Inputs, Node, NodeBase,
    NodeInit, NodeTypeDefinition, OutputDefinition, Outputs, Result, RuntimeError, Value,
};

const PORT_VALUE: &str = "value";

/// Port type a constant node declares for its input and output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstKind {
    String,
    Number,
    Bool,
}

impl ConstKind {
    fn port_type(self) -> &'static str {
        match self {
            ConstKind::String => "string",
            ConstKind::Number => "number",
            ConstKind::Bool => "bool",
        }
    }
}

/// Constant Node
pub struct ConstNode {
    kind: ConstKind,
    base: NodeBase,
    inputs: Inputs,
    outputs: Outputs,
}

impl ConstNode {
    fn create(init: &mut NodeInit<'_>, kind: ConstKind) -> Result<Arc<dyn Node>> {
        Ok(Arc::new(Self {
            kind,
            base: init.base(),
            inputs: init.inputs(),
            outputs: init.outputs(),
        }))
    }

    fn definition(id: &str, name: &str, kind: ConstKind) -> NodeTypeDefinition {
        NodeTypeDefinition::new(id, 1, name)
            .short_desc(format!("A constant {}", kind.port_type()))
            .category("input")
            .input(PORT_VALUE, InputDefinition::new("Value", kind.port_type(), 0))
            .output(PORT_VALUE, OutputDefinition::new("Value", kind.port_type(), 0))
    }

    pub fn string_descriptor() -> NodeTypeDefinition {
        Self::definition("core/const-string", "String", ConstKind::String)
    }

    pub fn number_descriptor() -> NodeTypeDefinition {
        Self::definition("core/const-number", "Number", ConstKind::Number)
    }

    pub fn bool_descriptor() -> NodeTypeDefinition {
        Self::definition("core/const-bool", "Bool", ConstKind::Bool)
    }

    pub fn create_string(init: &mut NodeInit<'_>) -> Result<Arc<dyn Node>> {
        Self::create(init, ConstKind::String)
    }

    pub fn create_number(init: &mut NodeInit<'_>) -> Result<Arc<dyn Node>> {
        Self::create(init, ConstKind::Number)
    }

    pub fn create_bool(init: &mut NodeInit<'_>) -> Result<Arc<dyn Node>> {
        Self::create(init, ConstKind::Bool)
    }
}

inventory::submit!(DescriptorFn(ConstNode::string_descriptor, ConstNode::create_string));
inventory::submit!(DescriptorFn(ConstNode::number_descriptor, ConstNode::create_number));
inventory::submit!(DescriptorFn(ConstNode::bool_descriptor, ConstNode::create_bool));

#[async_trait]
impl Node for ConstNode {
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
        if output_id != PORT_VALUE {
            return Err(RuntimeError::no_output_value(
                Some(state),
                format!("output port '{}' has no value", output_id),
            ));
        }

        let value = match self.kind {
            ConstKind::String => Value::String(input_value(self, state, PORT_VALUE).await?),
            ConstKind::Bool => Value::Bool(input_value(self, state, PORT_VALUE).await?),
            ConstKind::Number => match input_value::<Value>(self, state, PORT_VALUE).await? {
                Value::Int(i) => Value::Int(i),
                Value::Null => Value::Int(0),
                other => Value::Float(f64::from_value(state, other)?),
            },
        };
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptors() {
        for mut def in [
            ConstNode::string_descriptor(),
            ConstNode::number_descriptor(),
            ConstNode::bool_descriptor(),
        ] {
            def.validate().unwrap();
            assert_eq!(def.inputs[PORT_VALUE].port_type, def.outputs[PORT_VALUE].port_type);
        }
    }
}
