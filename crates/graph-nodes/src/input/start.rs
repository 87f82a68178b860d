//! Start Node
//!
//! Entry node of a graph. Publishes the run's environment, arguments and
//! standard input, then fires `exec`.

use std::sync::Arc;

use async_trait::async_trait;
use graph_runtime::{
    execute, set_output_value, DataStream, DescriptorFn, ExecutionState, Executions, Node,
    NodeBase, NodeDescriptor, NodeInit, NodeTypeDefinition, OutputDefinition, Outputs, Result,
    SetOutputOpts, Value,
};

/// Start Node
///
/// # Outputs
/// - `exec` - Fired once when the run starts
/// - `env` - Environment as `KEY=value` entries, sorted by key
/// - `args` - Arguments passed to the run
/// - `stdin` - Standard input of the process
pub struct StartNode {
    base: NodeBase,
    outputs: Outputs,
    executions: Executions,
}

impl StartNode {
    pub const PORT_EXEC: &'static str = "exec";
    pub const PORT_ENV: &'static str = "env";
    pub const PORT_ARGS: &'static str = "args";
    pub const PORT_STDIN: &'static str = "stdin";

    pub fn create(init: &mut NodeInit<'_>) -> Result<Arc<dyn Node>> {
        Ok(Arc::new(Self {
            base: init.base(),
            outputs: init.outputs(),
            executions: Executions::new(),
        }))
    }
}

impl NodeDescriptor for StartNode {
    fn descriptor() -> NodeTypeDefinition {
        NodeTypeDefinition::new("core/start", 1, "Start")
            .short_desc("Where the graph starts")
            .category("input")
            .entry()
            .output(Self::PORT_EXEC, OutputDefinition::exec("Exec", 0))
            .output(Self::PORT_ENV, OutputDefinition::new("Environment", "string", 1).array())
            .output(Self::PORT_ARGS, OutputDefinition::new("Arguments", "string", 2).array())
            .output(Self::PORT_STDIN, OutputDefinition::new("Stdin", "stream", 3))
    }
}

inventory::submit!(DescriptorFn(StartNode::descriptor, StartNode::create));

#[async_trait]
impl Node for StartNode {
    fn base(&self) -> &NodeBase {
        &self.base
    }

    fn outputs(&self) -> Option<&Outputs> {
        Some(&self.outputs)
    }

    fn executions(&self) -> Option<&Executions> {
        Some(&self.executions)
    }

    fn is_entry(&self) -> bool {
        true
    }

    async fn execute_entry(&self, state: &Arc<ExecutionState>, args: Vec<String>) -> Result<()> {
        let mut env: Vec<(String, String)> = state.env_snapshot().into_iter().collect();
        env.sort();
        let env: Vec<String> = env.into_iter().map(|(k, v)| format!("{}={}", k, v)).collect();

        log::debug!("StartNode {}: {} arguments", self.base.id(), args.len());

        set_output_value(self, state, Self::PORT_ENV, Value::from(env), SetOutputOpts::default())?;
        set_output_value(self, state, Self::PORT_ARGS, Value::from(args), SetOutputOpts::default())?;

        // Only hand out stdin when something reads it
        if self.outputs.connection_count(Self::PORT_STDIN) > 0 {
            let stdin = DataStream::new(Box::new(std::io::stdin()));
            set_output_value(self, state, Self::PORT_STDIN, Value::from(stdin), SetOutputOpts::default())?;
        }

        execute(self, Self::PORT_EXEC, state, None).await
    }
}
