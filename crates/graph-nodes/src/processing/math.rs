//! Math Nodes
//!
//! Data nodes folding their `inputs[k]` left to right. Integers stay
//! integers as long as every operand is one and the result fits; anything
//! else is computed in floating point.

use std::sync::Arc;

use async_trait::async_trait;
use graph_runtime::{
    input_array_value, DescriptorFn, ExecutionState, FromValue, InputDefinition, Inputs, Node,
    NodeBase, NodeInit, NodeTypeDefinition, OutputDefinition, Outputs, Result, RuntimeError,
    Value,
};

const PORT_INPUTS: &str = "inputs";
const PORT_RESULT: &str = "result";

/// Arithmetic operation of a math node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathOp {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl MathOp {
    fn checked(self, a: i64, b: i64) -> Option<i64> {
        match self {
            MathOp::Add => a.checked_add(b),
            MathOp::Subtract => a.checked_sub(b),
            MathOp::Multiply => a.checked_mul(b),
            MathOp::Divide if b == 0 => Some(0),
            MathOp::Divide if a.checked_rem(b) == Some(0) => a.checked_div(b),
            MathOp::Divide => None,
        }
    }

    fn float(self, a: f64, b: f64) -> f64 {
        match self {
            MathOp::Add => a + b,
            MathOp::Subtract => a - b,
            MathOp::Multiply => a * b,
            MathOp::Divide if b == 0.0 => 0.0,
            MathOp::Divide => a / b,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    fn from_value(state: &ExecutionState, value: Value) -> Result<Self> {
        match value {
            Value::Int(i) => Ok(Number::Int(i)),
            Value::Null => Ok(Number::Int(0)),
            other => Ok(Number::Float(f64::from_value(state, other)?)),
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }

    fn apply(self, op: MathOp, rhs: Number) -> Number {
        if let (Number::Int(a), Number::Int(b)) = (self, rhs) {
            if let Some(result) = op.checked(a, b) {
                return Number::Int(result);
            }
        }
        Number::Float(op.float(self.as_f64(), rhs.as_f64()))
    }

    fn into_value(self) -> Value {
        match self {
            Number::Int(i) => Value::Int(i),
            Number::Float(f) => Value::Float(f),
        }
    }
}

/// Fold `operands` with `op`. No operands yield 0.
pub fn fold(op: MathOp, operands: &[Value], state: &ExecutionState) -> Result<Value> {
    let mut iter = operands.iter().cloned();
    let Some(first) = iter.next() else {
        return Ok(Value::Int(0));
    };

    let mut acc = Number::from_value(state, first)?;
    for operand in iter {
        acc = acc.apply(op, Number::from_value(state, operand)?);
    }
    Ok(acc.into_value())
}

/// Math Node
///
/// # Inputs
/// - `inputs` - Operands, in index order
///
/// # Outputs
/// - `result` - The folded result
pub struct MathNode {
    op: MathOp,
    base: NodeBase,
    inputs: Inputs,
    outputs: Outputs,
}

impl MathNode {
    fn create(init: &mut NodeInit<'_>, op: MathOp) -> Result<Arc<dyn Node>> {
        Ok(Arc::new(Self {
            op,
            base: init.base(),
            inputs: init.inputs(),
            outputs: init.outputs(),
        }))
    }

    fn definition(id: &str, name: &str, desc: &str) -> NodeTypeDefinition {
        NodeTypeDefinition::new(id, 1, name)
            .short_desc(desc)
            .category("processing")
            .input(
                PORT_INPUTS,
                InputDefinition::new("Inputs", "number", 0)
                    .array()
                    .array_initial_count(2),
            )
            .output(PORT_RESULT, OutputDefinition::new("Result", "number", 0))
    }

    pub fn add_descriptor() -> NodeTypeDefinition {
        Self::definition("core/math-add", "Add", "Add numbers")
    }

    pub fn subtract_descriptor() -> NodeTypeDefinition {
        Self::definition("core/math-subtract", "Subtract", "Subtract numbers from the first")
    }

    pub fn multiply_descriptor() -> NodeTypeDefinition {
        Self::definition("core/math-multiply", "Multiply", "Multiply numbers")
    }

    pub fn divide_descriptor() -> NodeTypeDefinition {
        Self::definition("core/math-divide", "Divide", "Divide the first number by the others")
    }

    pub fn create_add(init: &mut NodeInit<'_>) -> Result<Arc<dyn Node>> {
        Self::create(init, MathOp::Add)
    }

    pub fn create_subtract(init: &mut NodeInit<'_>) -> Result<Arc<dyn Node>> {
        Self::create(init, MathOp::Subtract)
    }

    pub fn create_multiply(init: &mut NodeInit<'_>) -> Result<Arc<dyn Node>> {
        Self::create(init, MathOp::Multiply)
    }

    pub fn create_divide(init: &mut NodeInit<'_>) -> Result<Arc<dyn Node>> {
        Self::create(init, MathOp::Divide)
    }
}

inventory::submit!(DescriptorFn(MathNode::add_descriptor, MathNode::create_add));
inventory::submit!(DescriptorFn(MathNode::subtract_descriptor, MathNode::create_subtract));
inventory::submit!(DescriptorFn(MathNode::multiply_descriptor, MathNode::create_multiply));
inventory::submit!(DescriptorFn(MathNode::divide_descriptor, MathNode::create_divide));

#[async_trait]
impl Node for MathNode {
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
        if output_id != PORT_RESULT {
            return Err(RuntimeError::no_output_value(
                Some(state),
                format!("output port '{}' has no value", output_id),
            ));
        }

        let operands: Vec<Value> = input_array_value(self, state, PORT_INPUTS, None).await?;
        let result = fold(self.op, &operands, state)?;
        log::trace!("MathNode {}: {:?} = {}", self.base.id(), self.op, result);
        Ok(result)
    }
}
