//! Env Get Node

use std::sync::Arc;

use async_trait::async_trait;
use graph_runtime::{
    input_value, DescriptorFn, ExecutionState, InputDefinition, Inputs, Node, NodeBase,
    NodeDescriptor, NodeInit, NodeTypeDefinition, OutputDefinition, Outputs, Result,
    RuntimeError, Value,
};

/// Env Get Node
///
/// Reads a variable from the environment of the execution state that asks
/// for it, so branches that changed their environment see their own value.
///
/// # Inputs
/// - `env` - Variable name
///
/// # Outputs
/// - `value` - Variable value, empty if unset
/// - `exists` - Whether the variable is set
pub struct EnvGetNode {
    base: NodeBase,
    inputs: Inputs,
    outputs: Outputs,
}

impl EnvGetNode {
    pub const PORT_ENV: &'static str = "env";
    pub const PORT_VALUE: &'static str = "value";
    pub const PORT_EXISTS: &'static str = "exists";

    pub fn create(init: &mut NodeInit<'_>) -> Result<Arc<dyn Node>> {
        Ok(Arc::new(Self {
            base: init.base(),
            inputs: init.inputs(),
            outputs: init.outputs(),
        }))
    }
}

impl NodeDescriptor for EnvGetNode {
    fn descriptor() -> NodeTypeDefinition {
        NodeTypeDefinition::new("core/env-get", 1, "Env Get")
            .short_desc("Read an environment variable")
            .category("input")
            .input(Self::PORT_ENV, InputDefinition::new("Env", "string", 0))
            .output(Self::PORT_VALUE, OutputDefinition::new("Value", "string", 0))
            .output(Self::PORT_EXISTS, OutputDefinition::new("Exists", "bool", 1))
    }
}

inventory::submit!(DescriptorFn(EnvGetNode::descriptor, EnvGetNode::create));

#[async_trait]
impl Node for EnvGetNode {
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
        let key: String = input_value(self, state, Self::PORT_ENV).await?;
        let value = state.env_var(key.trim());

        match output_id {
            Self::PORT_VALUE => Ok(Value::String(value.unwrap_or_default())),
            Self::PORT_EXISTS => Ok(Value::Bool(value.is_some())),
            other => Err(RuntimeError::no_output_value(
                Some(state),
                format!("output port '{}' has no value", other),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use graph_runtime::StateOptions;

    #[tokio::test]
    async fn test_reads_state_env() {
        let node = EnvGetNode {
            base: NodeBase::new("e", "e", "core/env-get@v1", "Env Get", None),
            inputs: Inputs::with_defs(EnvGetNode::descriptor().inputs),
            outputs: Outputs::with_defs(EnvGetNode::descriptor().outputs),
        };
        node.inputs.set_value(EnvGetNode::PORT_ENV, Value::from("HOME"));

        let state = ExecutionState::new(StateOptions::default());
        state.set_env(HashMap::from([("HOME".to_string(), "/home/me".to_string())]));

        let value = node.output_value(&state, EnvGetNode::PORT_VALUE).await.unwrap();
        assert_eq!(value, Value::from("/home/me"));
        let exists = node.output_value(&state, EnvGetNode::PORT_EXISTS).await.unwrap();
        assert_eq!(exists, Value::Bool(true));

        node.inputs.set_value(EnvGetNode::PORT_ENV, Value::from("NOPE"));
        let exists = node.output_value(&state, EnvGetNode::PORT_EXISTS).await.unwrap();
        assert_eq!(exists, Value::Bool(false));
    }
}
