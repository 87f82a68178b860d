//! Sleep Node
//!
//! Pauses the current execution path. Cancelling the run wakes the node up
//! early and drops the path.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use graph_runtime::{
    execute, input_value, DescriptorFn, ExecutionState, Executions, InputDefinition, Inputs, Node,
    NodeBase, NodeDescriptor, NodeInit, NodeTypeDefinition, OutputDefinition, Outputs, Result,
    RuntimeError,
};

/// Turn a count and a unit name into a duration. Negative counts sleep 0.
pub fn sleep_duration(count: i64, unit: &str) -> Option<Duration> {
    let count = u64::try_from(count).unwrap_or(0);
    match unit {
        "seconds" => Some(Duration::from_secs(count)),
        "milliseconds" => Some(Duration::from_millis(count)),
        "microseconds" => Some(Duration::from_micros(count)),
        "nanoseconds" => Some(Duration::from_nanos(count)),
        _ => None,
    }
}

/// Sleep Node
///
/// # Inputs
/// - `exec` - Execution input
/// - `duration` - How long to sleep, in `unit`
/// - `unit` - One of `seconds`, `milliseconds`, `microseconds`, `nanoseconds`
///
/// # Outputs
/// - `exec` - Fired once the duration elapsed
pub struct SleepNode {
    base: NodeBase,
    inputs: Inputs,
    outputs: Outputs,
    executions: Executions,
}

impl SleepNode {
    pub const PORT_EXEC: &'static str = "exec";
    pub const PORT_DURATION: &'static str = "duration";
    pub const PORT_UNIT: &'static str = "unit";

    pub fn create(init: &mut NodeInit<'_>) -> Result<Arc<dyn Node>> {
        Ok(Arc::new(Self {
            base: init.base(),
            inputs: init.inputs(),
            outputs: init.outputs(),
            executions: Executions::new(),
        }))
    }
}

impl NodeDescriptor for SleepNode {
    fn descriptor() -> NodeTypeDefinition {
        NodeTypeDefinition::new("core/sleep", 1, "Sleep")
            .short_desc("Wait for a while before continuing")
            .category("control")
            .input(Self::PORT_EXEC, InputDefinition::exec("Exec", 0))
            .input(Self::PORT_DURATION, InputDefinition::new("Duration", "number", 1))
            .input(
                Self::PORT_UNIT,
                InputDefinition::new("Unit", "option", 2)
                    .with_default(serde_json::json!("milliseconds"))
                    .with_options(&[
                        ("Seconds", "seconds"),
                        ("Milliseconds", "milliseconds"),
                        ("Microseconds", "microseconds"),
                        ("Nanoseconds", "nanoseconds"),
                    ]),
            )
            .output(Self::PORT_EXEC, OutputDefinition::exec("Exec", 0))
    }
}

inventory::submit!(DescriptorFn(SleepNode::descriptor, SleepNode::create));

#[async_trait]
impl Node for SleepNode {
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
        _input_id: &str,
        _prev: Option<RuntimeError>,
    ) -> Result<()> {
        let count: i64 = input_value(self, state, Self::PORT_DURATION).await?;
        let unit: String = input_value(self, state, Self::PORT_UNIT).await?;
        let duration = sleep_duration(count, &unit).ok_or_else(|| {
            RuntimeError::leaf(Some(state), format!("invalid unit '{}'", unit))
        })?;

        log::debug!("SleepNode {}: sleeping for {:?}", self.base.id(), duration);
        let cancel = state.cancel_token();
        tokio::select! {
            _ = cancel.cancelled() => {
                log::debug!("SleepNode {}: cancelled while sleeping", self.base.id());
                return Ok(());
            }
            _ = tokio::time::sleep(duration) => {}
        }

        execute(self, Self::PORT_EXEC, state, None).await
    }
}
