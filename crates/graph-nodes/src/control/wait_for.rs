//! Wait For Node
//!
//! Holds back execution until it arrived a given number of times, typically
//! from the branches of a concurrent node.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use graph_runtime::{
    execute, input_value, merge_env, DescriptorFn, ExecutionState, Executions, InputDefinition,
    Inputs, Node, NodeBase, NodeDescriptor, NodeInit, NodeTypeDefinition, OutputDefinition,
    Outputs, Result, RuntimeError,
};
use parking_lot::Mutex;

#[derive(Debug)]
struct Gate {
    /// Arrivals still missing before `exec` fires; `None` before the first one
    remaining: Option<usize>,
    /// Environment merged from every arrival of the current batch
    env: HashMap<String, String>,
}

/// Wait For Node
///
/// # Inputs
/// - `exec` - Execution input counted towards `after`
/// - `after` - Number of arrivals needed
/// - `loop` - Start over after firing instead of ignoring later arrivals
///
/// # Outputs
/// - `exec` - Fired once `after` arrivals were counted. The firing state
///   gets the environment merged from all of them.
pub struct WaitForNode {
    base: NodeBase,
    inputs: Inputs,
    outputs: Outputs,
    executions: Executions,
    gate: Mutex<Gate>,
}

impl WaitForNode {
    pub const PORT_EXEC: &'static str = "exec";
    pub const PORT_AFTER: &'static str = "after";
    pub const PORT_LOOP: &'static str = "loop";

    pub fn create(init: &mut NodeInit<'_>) -> Result<Arc<dyn Node>> {
        Ok(Arc::new(Self {
            base: init.base(),
            inputs: init.inputs(),
            outputs: init.outputs(),
            executions: Executions::new(),
            gate: Mutex::new(Gate {
                remaining: None,
                env: HashMap::new(),
            }),
        }))
    }

    /// Count one arrival. Returns the environment to fire with once the
    /// gate opens.
    fn arrive(
        &self,
        env: HashMap<String, String>,
        after: usize,
        restart: bool,
    ) -> Option<HashMap<String, String>> {
        let mut gate = self.gate.lock();
        let remaining = match gate.remaining {
            None => after,
            Some(0) if restart => after,
            Some(0) => return None,
            Some(n) => n,
        };

        let remaining = remaining.saturating_sub(1);
        gate.remaining = Some(remaining);
        gate.env = merge_env(&env, &gate.env);

        if remaining > 0 {
            return None;
        }
        Some(std::mem::take(&mut gate.env))
    }
}

impl NodeDescriptor for WaitForNode {
    fn descriptor() -> NodeTypeDefinition {
        NodeTypeDefinition::new("core/wait-for", 1, "Wait For")
            .short_desc("Continue after execution arrived a number of times")
            .category("control")
            .input(Self::PORT_EXEC, InputDefinition::exec("Exec", 0))
            .input(
                Self::PORT_AFTER,
                InputDefinition::new("After", "number", 1).with_default(serde_json::json!(1)),
            )
            .input(Self::PORT_LOOP, InputDefinition::new("Loop", "bool", 2))
            .output(Self::PORT_EXEC, OutputDefinition::exec("Exec", 0))
    }
}

inventory::submit!(DescriptorFn(WaitForNode::descriptor, WaitForNode::create));

#[async_trait]
impl Node for WaitForNode {
    fn base(&self) -> &NodeBase {
        &self.base
    }

    fn inputs(&self) -> Option<&Inputs> {
        Some(&self.inputs)
    }

    fn outputs(&self) -> Option<&Outputs> {
        Some(&self.outputs)
    }

    fn executions(&self) -> Option<&Executions> {
        Some(&self.executions)
    }

    async fn execute_impl(
        &self,
        state: &Arc<ExecutionState>,
        input_id: &str,
        _prev: Option<RuntimeError>,
    ) -> Result<()> {
        if input_id != Self::PORT_EXEC {
            return Ok(());
        }

        let restart: bool = input_value(self, state, Self::PORT_LOOP).await?;
        let after: usize = input_value(self, state, Self::PORT_AFTER).await?;

        let Some(env) = self.arrive(state.env_snapshot(), after, restart) else {
            log::debug!("WaitForNode {}: waiting for more arrivals", self.base.id());
            return Ok(());
        };

        state.set_env(env);
        execute(self, Self::PORT_EXEC, state, None).await
    }
}
