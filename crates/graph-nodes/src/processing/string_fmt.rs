//! String Format Node

use std::sync::Arc;

use async_trait::async_trait;
use graph_runtime::{
    input_array_value, input_value, DescriptorFn, ExecutionState, InputDefinition, Inputs, Node,
    NodeBase, NodeDescriptor, NodeInit, NodeTypeDefinition, OutputDefinition, Outputs, Result,
    Value,
};

/// Replace `{0}`, `{1}`, ... in `fmt` with the matching argument.
///
/// Placeholders without an argument and any other braces are kept as they
/// are.
pub fn format_placeholders(fmt: &str, args: &[Value]) -> String {
    let mut out = String::with_capacity(fmt.len());
    let mut rest = fmt;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];

        let replacement = after.find('}').and_then(|close| {
            let index: usize = after[..close].parse().ok()?;
            args.get(index).map(|arg| (arg.to_string(), close))
        });

        match replacement {
            Some((text, close)) => {
                out.push_str(&text);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// String Format Node
///
/// # Inputs
/// - `fmt` - Format string with `{k}` placeholders
/// - `args` - Values for the placeholders
///
/// # Outputs
/// - `result` - The formatted string
pub struct StringFmtNode {
    base: NodeBase,
    inputs: Inputs,
    outputs: Outputs,
}

impl StringFmtNode {
    pub const PORT_FMT: &'static str = "fmt";
    pub const PORT_ARGS: &'static str = "args";
    pub const PORT_RESULT: &'static str = "result";

    pub fn create(init: &mut NodeInit<'_>) -> Result<Arc<dyn Node>> {
        Ok(Arc::new(Self {
            base: init.base(),
            inputs: init.inputs(),
            outputs: init.outputs(),
        }))
    }
}

impl NodeDescriptor for StringFmtNode {
    fn descriptor() -> NodeTypeDefinition {
        NodeTypeDefinition::new("core/string-fmt", 1, "String Format")
            .short_desc("Fill placeholders in a format string")
            .category("processing")
            .input(Self::PORT_FMT, InputDefinition::new("Format", "string", 0))
            .input(Self::PORT_ARGS, InputDefinition::new("Arguments", "any", 1).array())
            .output(Self::PORT_RESULT, OutputDefinition::new("Result", "string", 0))
    }
}

inventory::submit!(DescriptorFn(StringFmtNode::descriptor, StringFmtNode::create));

#[async_trait]
impl Node for StringFmtNode {
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
        let fmt: String = input_value(self, state, Self::PORT_FMT).await?;
        let args: Vec<Value> = input_array_value(self, state, Self::PORT_ARGS, None).await?;
        Ok(Value::String(format_placeholders(&fmt, &args)))
    }
}
