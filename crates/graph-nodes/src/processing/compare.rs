//! Comparison Nodes
//!
//! `core/math-compare@v1` compares two numbers with a selectable operator,
//! `core/negate@v1` flips a boolean.

use std::sync::Arc;

use async_trait::async_trait;
use graph_runtime::{
    input_value, DescriptorFn, ExecutionState, InputDefinition, Inputs, Node, NodeBase,
    NodeDescriptor, NodeInit, NodeTypeDefinition, OutputDefinition, Outputs, Result, RuntimeError,
    Value,
};

const PORT_RESULT: &str = "result";

fn check_output(state: &Arc<ExecutionState>, output_id: &str, expected: &str) -> Result<()> {
    if output_id == expected {
        Ok(())
    } else {
        Err(RuntimeError::no_output_value(
            Some(state),
            format!("output port '{}' has no value", output_id),
        ))
    }
}

/// Compare `a` and `b` with one of `==`, `!=`, `<`, `<=`, `>`, `>=`
pub fn compare(a: f64, b: f64, operator: &str) -> Option<bool> {
    match operator {
        "==" => Some(a == b),
        "!=" => Some(a != b),
        "<" => Some(a < b),
        "<=" => Some(a <= b),
        ">" => Some(a > b),
        ">=" => Some(a >= b),
        _ => None,
    }
}

/// Compare Node
///
/// # Inputs
/// - `op1` - Left operand
/// - `op2` - Right operand
/// - `operator` - Comparison operator, `==` by default
///
/// # Outputs
/// - `result` - Outcome of the comparison
pub struct CompareNode {
    base: NodeBase,
    inputs: Inputs,
    outputs: Outputs,
}

impl CompareNode {
    pub const PORT_OP1: &'static str = "op1";
    pub const PORT_OP2: &'static str = "op2";
    pub const PORT_OPERATOR: &'static str = "operator";

    pub fn create(init: &mut NodeInit<'_>) -> Result<Arc<dyn Node>> {
        Ok(Arc::new(Self {
            base: init.base(),
            inputs: init.inputs(),
            outputs: init.outputs(),
        }))
    }
}

impl NodeDescriptor for CompareNode {
    fn descriptor() -> NodeTypeDefinition {
        NodeTypeDefinition::new("core/math-compare", 1, "Compare")
            .short_desc("Compare two numbers")
            .category("processing")
            .input(Self::PORT_OP1, InputDefinition::new("A", "number", 0))
            .input(
                Self::PORT_OPERATOR,
                InputDefinition::new("Operator", "option", 1)
                    .with_default(serde_json::json!("=="))
                    .with_options(&[
                        ("Equal", "=="),
                        ("Not Equal", "!="),
                        ("Less", "<"),
                        ("Less Or Equal", "<="),
                        ("Greater", ">"),
                        ("Greater Or Equal", ">="),
                    ]),
            )
            .input(Self::PORT_OP2, InputDefinition::new("B", "number", 2))
            .output(PORT_RESULT, OutputDefinition::new("Result", "bool", 0))
    }
}

inventory::submit!(DescriptorFn(CompareNode::descriptor, CompareNode::create));

#[async_trait]
impl Node for CompareNode {
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
        check_output(state, output_id, PORT_RESULT)?;

        let a: f64 = input_value(self, state, Self::PORT_OP1).await?;
        let b: f64 = input_value(self, state, Self::PORT_OP2).await?;
        let operator: String = input_value(self, state, Self::PORT_OPERATOR).await?;

        let result = compare(a, b, &operator).ok_or_else(|| {
            RuntimeError::leaf(Some(state), format!("invalid operator '{}'", operator))
        })?;
        Ok(Value::Bool(result))
    }
}

/// Negate Node
///
/// # Inputs
/// - `input` - Value to negate, coerced to bool
///
/// # Outputs
/// - `result` - The negated value
pub struct NegateNode {
    base: NodeBase,
    inputs: Inputs,
    outputs: Outputs,
}

impl NegateNode {
    pub const PORT_INPUT: &'static str = "input";

    pub fn create(init: &mut NodeInit<'_>) -> Result<Arc<dyn Node>> {
        Ok(Arc::new(Self {
            base: init.base(),
            inputs: init.inputs(),
            outputs: init.outputs(),
        }))
    }
}

impl NodeDescriptor for NegateNode {
    fn descriptor() -> NodeTypeDefinition {
        NodeTypeDefinition::new("core/negate", 1, "Negate")
            .short_desc("Invert a boolean")
            .category("processing")
            .input(Self::PORT_INPUT, InputDefinition::new("Input", "bool", 0))
            .output(PORT_RESULT, OutputDefinition::new("Result", "bool", 0))
    }
}

inventory::submit!(DescriptorFn(NegateNode::descriptor, NegateNode::create));

#[async_trait]
impl Node for NegateNode {
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
        check_output(state, output_id, PORT_RESULT)?;
        let input: bool = input_value(self, state, Self::PORT_INPUT).await?;
        Ok(Value::Bool(!input))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compare_operators() {
        assert_eq!(compare(1.0, 1.0, "=="), Some(true));
        assert_eq!(compare(1.0, 2.0, "!="), Some(true));
        assert_eq!(compare(1.0, 2.0, "<"), Some(true));
        assert_eq!(compare(2.0, 2.0, "<="), Some(true));
        assert_eq!(compare(1.0, 2.0, ">"), Some(false));
        assert_eq!(compare(2.0, 2.0, ">="), Some(true));
        assert_eq!(compare(1.0, 2.0, "=>"), None);
    }

    #[test]
    fn test_descriptors() {
        for mut def in [CompareNode::descriptor(), NegateNode::descriptor()] {
            def.validate().unwrap();
        }
    }
}
