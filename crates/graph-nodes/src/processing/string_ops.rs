//! String Nodes
//!
//! Data nodes splitting, joining, replacing and matching strings.

use std::sync::Arc;

use async_trait::async_trait;
use graph_runtime::{
    input_array_value, input_value, DescriptorFn, ExecutionState, InputDefinition, Inputs, Node,
    NodeBase, NodeDescriptor, NodeInit, NodeTypeDefinition, OutputDefinition, Outputs, Result,
    RuntimeError, Value,
};
use regex::Regex;

const PORT_RESULT: &str = "result";

fn check_output(state: &Arc<ExecutionState>, output_id: &str) -> Result<()> {
    if output_id == PORT_RESULT {
        Ok(())
    } else {
        Err(RuntimeError::no_output_value(
            Some(state),
            format!("output port '{}' has no value", output_id),
        ))
    }
}

fn compile(state: &Arc<ExecutionState>, pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| {
        RuntimeError::leaf(Some(state), format!("invalid regex pattern '{}': {}", pattern, e))
    })
}

/// Split `text` at `delimiter` into at most `max_segments` parts.
///
/// A negative maximum splits at every delimiter, 0 yields no segments.
/// Escaped `\n`, `\t` and `\r` in the delimiter stand for the control
/// characters.
pub fn split_string(text: &str, delimiter: &str, max_segments: i64) -> Vec<String> {
    let delimiter = delimiter
        .replace("\\n", "\n")
        .replace("\\t", "\t")
        .replace("\\r", "\r");

    match usize::try_from(max_segments) {
        Ok(0) => Vec::new(),
        Ok(n) => text.splitn(n, delimiter.as_str()).map(str::to_string).collect(),
        Err(_) => text.split(delimiter.as_str()).map(str::to_string).collect(),
    }
}

/// String Split Node
///
/// # Inputs
/// - `string` - Text to split
/// - `delimiter` - Separator, `\n`, `\t` and `\r` escapes allowed
/// - `max_segments` - Upper bound on the number of parts, -1 for no bound
///
/// # Outputs
/// - `result` - The segments
pub struct StringSplitNode {
    base: NodeBase,
    inputs: Inputs,
    outputs: Outputs,
}

impl StringSplitNode {
    pub const PORT_STRING: &'static str = "string";
    pub const PORT_DELIMITER: &'static str = "delimiter";
    pub const PORT_MAX_SEGMENTS: &'static str = "max_segments";

    pub fn create(init: &mut NodeInit<'_>) -> Result<Arc<dyn Node>> {
        Ok(Arc::new(Self {
            base: init.base(),
            inputs: init.inputs(),
            outputs: init.outputs(),
        }))
    }
}

impl NodeDescriptor for StringSplitNode {
    fn descriptor() -> NodeTypeDefinition {
        NodeTypeDefinition::new("core/string-split", 1, "String Split")
            .short_desc("Split a string at a delimiter")
            .category("processing")
            .input(Self::PORT_STRING, InputDefinition::new("String", "string", 0))
            .input(
                Self::PORT_DELIMITER,
                InputDefinition::new("Delimiter", "string", 1).with_default(serde_json::json!(",")),
            )
            .input(
                Self::PORT_MAX_SEGMENTS,
                InputDefinition::new("Max Segments", "number", 2).with_default(serde_json::json!(-1)),
            )
            .output(PORT_RESULT, OutputDefinition::new("Result", "[]string", 0))
    }
}

inventory::submit!(DescriptorFn(StringSplitNode::descriptor, StringSplitNode::create));

#[async_trait]
impl Node for StringSplitNode {
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
        check_output(state, output_id)?;
        let text: String = input_value(self, state, Self::PORT_STRING).await?;
        let delimiter: String = input_value(self, state, Self::PORT_DELIMITER).await?;
        let max_segments: i64 = input_value(self, state, Self::PORT_MAX_SEGMENTS).await?;
        Ok(Value::from(split_string(&text, &delimiter, max_segments)))
    }
}

/// String Join Node
///
/// # Inputs
/// - `segments` - Strings to join, in index order
/// - `delimiter` - Placed between two segments
///
/// # Outputs
/// - `result` - The joined string
pub struct StringJoinNode {
    base: NodeBase,
    inputs: Inputs,
    outputs: Outputs,
}

impl StringJoinNode {
    pub const PORT_SEGMENTS: &'static str = "segments";
    pub const PORT_DELIMITER: &'static str = "delimiter";

    pub fn create(init: &mut NodeInit<'_>) -> Result<Arc<dyn Node>> {
        Ok(Arc::new(Self {
            base: init.base(),
            inputs: init.inputs(),
            outputs: init.outputs(),
        }))
    }
}

impl NodeDescriptor for StringJoinNode {
    fn descriptor() -> NodeTypeDefinition {
        NodeTypeDefinition::new("core/string-join", 1, "String Join")
            .short_desc("Join strings with a delimiter")
            .category("processing")
            .input(
                Self::PORT_SEGMENTS,
                InputDefinition::new("Segments", "string", 0)
                    .array()
                    .array_initial_count(2),
            )
            .input(Self::PORT_DELIMITER, InputDefinition::new("Delimiter", "string", 1))
            .output(PORT_RESULT, OutputDefinition::new("Result", "string", 0))
    }
}

inventory::submit!(DescriptorFn(StringJoinNode::descriptor, StringJoinNode::create));

#[async_trait]
impl Node for StringJoinNode {
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
        check_output(state, output_id)?;
        let segments: Vec<String> =
            input_array_value(self, state, Self::PORT_SEGMENTS, None).await?;
        let delimiter: String = input_value(self, state, Self::PORT_DELIMITER).await?;
        Ok(Value::String(segments.join(&delimiter)))
    }
}

/// String Replace Node
///
/// # Inputs
/// - `input` - Text to work on
/// - `substring` - Text or regex to look for
/// - `replacement` - Replacement, regex mode expands `$1` style groups
/// - `op` - `string` or `regex`
///
/// # Outputs
/// - `result` - Text with every occurrence replaced
pub struct StringReplaceNode {
    base: NodeBase,
    inputs: Inputs,
    outputs: Outputs,
}

impl StringReplaceNode {
    pub const PORT_INPUT: &'static str = "input";
    pub const PORT_SUBSTRING: &'static str = "substring";
    pub const PORT_REPLACEMENT: &'static str = "replacement";
    pub const PORT_OP: &'static str = "op";

    pub fn create(init: &mut NodeInit<'_>) -> Result<Arc<dyn Node>> {
        Ok(Arc::new(Self {
            base: init.base(),
            inputs: init.inputs(),
            outputs: init.outputs(),
        }))
    }
}

impl NodeDescriptor for StringReplaceNode {
    fn descriptor() -> NodeTypeDefinition {
        NodeTypeDefinition::new("core/string-replace", 1, "String Replace")
            .short_desc("Replace every occurrence of a substring")
            .category("processing")
            .input(Self::PORT_INPUT, InputDefinition::new("Input", "string", 0))
            .input(Self::PORT_SUBSTRING, InputDefinition::new("Substring", "string", 1))
            .input(Self::PORT_REPLACEMENT, InputDefinition::new("Replacement", "string", 2))
            .input(
                Self::PORT_OP,
                InputDefinition::new("Mode", "option", 3)
                    .with_default(serde_json::json!("string"))
                    .with_options(&[("String", "string"), ("Regex", "regex")]),
            )
            .output(PORT_RESULT, OutputDefinition::new("Result", "string", 0))
    }
}

inventory::submit!(DescriptorFn(StringReplaceNode::descriptor, StringReplaceNode::create));

#[async_trait]
impl Node for StringReplaceNode {
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
        check_output(state, output_id)?;
        let input: String = input_value(self, state, Self::PORT_INPUT).await?;
        let substring: String = input_value(self, state, Self::PORT_SUBSTRING).await?;
        let replacement: String = input_value(self, state, Self::PORT_REPLACEMENT).await?;
        let op: String = input_value(self, state, Self::PORT_OP).await?;

        let result = match op.as_str() {
            "string" => input.replace(&substring, &replacement),
            "regex" => compile(state, &substring)?
                .replace_all(&input, replacement.as_str())
                .into_owned(),
            other => {
                return Err(RuntimeError::leaf(
                    Some(state),
                    format!("unknown operation: {}", other),
                ))
            }
        };
        Ok(Value::String(result))
    }
}

/// Test `text` against `pattern` with one of the plain match operations.
/// Returns `None` for an unknown operation.
pub fn match_plain(text: &str, pattern: &str, op: &str) -> Option<bool> {
    match op {
        "contains" => Some(text.contains(pattern)),
        "notcontains" => Some(!text.contains(pattern)),
        "startswith" => Some(text.starts_with(pattern)),
        "endswith" => Some(text.ends_with(pattern)),
        "equals" => Some(text == pattern),
        _ => None,
    }
}

/// String Match Node
///
/// # Inputs
/// - `str1` - Text to test
/// - `str2` - Substring or regex
/// - `op` - `contains`, `notcontains`, `startswith`, `endswith`, `equals` or `regex`
///
/// # Outputs
/// - `result` - Whether the text matched
pub struct StringMatchNode {
    base: NodeBase,
    inputs: Inputs,
    outputs: Outputs,
}

impl StringMatchNode {
    pub const PORT_STR1: &'static str = "str1";
    pub const PORT_STR2: &'static str = "str2";
    pub const PORT_OP: &'static str = "op";

    pub fn create(init: &mut NodeInit<'_>) -> Result<Arc<dyn Node>> {
        Ok(Arc::new(Self {
            base: init.base(),
            inputs: init.inputs(),
            outputs: init.outputs(),
        }))
    }
}

impl NodeDescriptor for StringMatchNode {
    fn descriptor() -> NodeTypeDefinition {
        NodeTypeDefinition::new("core/string-match", 1, "String Match")
            .short_desc("Test a string against a pattern")
            .category("processing")
            .input(Self::PORT_STR1, InputDefinition::new("String", "string", 0))
            .input(
                Self::PORT_OP,
                InputDefinition::new("Operation", "option", 1)
                    .with_default(serde_json::json!("contains"))
                    .with_options(&[
                        ("Contains", "contains"),
                        ("Not Contains", "notcontains"),
                        ("Starts With", "startswith"),
                        ("Ends With", "endswith"),
                        ("Equals", "equals"),
                        ("Regex", "regex"),
                    ]),
            )
            .input(Self::PORT_STR2, InputDefinition::new("Pattern", "string", 2))
            .output(PORT_RESULT, OutputDefinition::new("Result", "bool", 0))
    }
}

inventory::submit!(DescriptorFn(StringMatchNode::descriptor, StringMatchNode::create));

#[async_trait]
impl Node for StringMatchNode {
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
        check_output(state, output_id)?;
        let text: String = input_value(self, state, Self::PORT_STR1).await?;
        let pattern: String = input_value(self, state, Self::PORT_STR2).await?;
        let op: String = input_value(self, state, Self::PORT_OP).await?;

        if op == "regex" {
            return Ok(Value::Bool(compile(state, &pattern)?.is_match(&text)));
        }
        match_plain(&text, &pattern, &op).map(Value::Bool).ok_or_else(|| {
            RuntimeError::leaf(Some(state), format!("unknown operation: {}", op))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_string() {
        assert_eq!(split_string("a,b,c", ",", -1), vec!["a", "b", "c"]);
        assert_eq!(split_string("a,b,c", ",", 2), vec!["a", "b,c"]);
        assert!(split_string("a,b,c", ",", 0).is_empty());
        assert_eq!(split_string("one\ntwo", "\\n", -1), vec!["one", "two"]);
        assert_eq!(split_string("", ",", -1), vec![""]);
    }

    #[test]
    fn test_match_plain() {
        assert_eq!(match_plain("hello world", "world", "contains"), Some(true));
        assert_eq!(match_plain("hello", "world", "notcontains"), Some(true));
        assert_eq!(match_plain("hello", "he", "startswith"), Some(true));
        assert_eq!(match_plain("hello", "he", "endswith"), Some(false));
        assert_eq!(match_plain("hello", "hello", "equals"), Some(true));
        assert_eq!(match_plain("x", "x", "like"), None);
    }

    #[test]
    fn test_descriptors() {
        for mut def in [
            StringSplitNode::descriptor(),
            StringJoinNode::descriptor(),
            StringReplaceNode::descriptor(),
            StringMatchNode::descriptor(),
        ] {
            def.validate().unwrap();
        }
    }
}
