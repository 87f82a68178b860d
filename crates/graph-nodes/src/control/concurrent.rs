//! Concurrent Nodes
//!
//! Every branch or iteration runs on its own forked execution state, so
//! outputs published by one branch are invisible to the others. The
//! completion output fires once, after every branch returned, and only if
//! none of them failed.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use graph_runtime::types::parse_index_port;
use graph_runtime::{
    execute, input_value, set_output_value, DescriptorFn, ExecutionState, Executions,
    InputDefinition, Inputs, Iterable, Node, NodeBase, NodeDescriptor, NodeInit,
    NodeTypeDefinition, OutputDefinition, Outputs, Result, RuntimeError, SetOutputOpts, Value,
};

use super::loops::{PORT_EXEC_BODY, PORT_EXEC_COMPLETED};
use super::pool::{run_branches, upgrade_self, Branch};

/// Concurrent Exec Node
///
/// Runs every connected `exec[k]` output on its own forked state.
pub struct ConcurrentExecNode {
    this: Weak<ConcurrentExecNode>,
    base: NodeBase,
    inputs: Inputs,
    outputs: Outputs,
    executions: Executions,
}

impl ConcurrentExecNode {
    pub const PORT_EXEC: &'static str = "exec";

    pub fn create(init: &mut NodeInit<'_>) -> Result<Arc<dyn Node>> {
        let (base, inputs, outputs) = (init.base(), init.inputs(), init.outputs());
        let node = Arc::new_cyclic(|this: &Weak<Self>| Self {
            this: this.clone(),
            base,
            inputs,
            outputs,
            executions: Executions::new(),
        });
        Ok(node)
    }

    /// Connected `exec[k]` outputs in index order
    fn branch_ports(&self) -> Vec<String> {
        let mut ports: Vec<(i64, String)> = self
            .executions
            .connected_ports()
            .into_iter()
            .filter_map(|port| parse_index_port(&port).map(|(_, index)| (index, port)))
            .collect();
        ports.sort();
        ports.into_iter().map(|(_, port)| port).collect()
    }
}

impl NodeDescriptor for ConcurrentExecNode {
    fn descriptor() -> NodeTypeDefinition {
        NodeTypeDefinition::new("core/concurrent-exec", 1, "Concurrent Exec")
            .short_desc("Run several paths at the same time")
            .category("control")
            .input(Self::PORT_EXEC, InputDefinition::exec("Exec", 0))
            .output(Self::PORT_EXEC, OutputDefinition::exec("Exec", 0).array())
            .output(PORT_EXEC_COMPLETED, OutputDefinition::exec("Completed", 1))
    }
}

inventory::submit!(DescriptorFn(ConcurrentExecNode::descriptor, ConcurrentExecNode::create));

#[async_trait]
impl Node for ConcurrentExecNode {
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
        let this = upgrade_self(&self.this, state)?;

        let targets: Vec<_> = self
            .branch_ports()
            .iter()
            .filter_map(|port| self.executions.target(port))
            .collect();
        log::debug!(
            "ConcurrentExecNode {}: running {} branches",
            self.base.id(),
            targets.len()
        );

        let branches = targets.into_iter().map(move |target| -> Result<Branch> {
            Ok(Branch {
                state: state.fork(&this),
                target,
            })
        });
        run_branches(state, branches, 0).await?;

        execute(self, PORT_EXEC_COMPLETED, state, None).await
    }
}

/// Concurrent For Loop Node
///
/// Runs the body for every index of `first_index..=last_index` on a pool of
/// `worker_count` workers (0 means no bound). The state of an iteration is
/// forked when a worker picks it up.
pub struct ConcurrentForNode {
    this: Weak<ConcurrentForNode>,
    base: NodeBase,
    inputs: Inputs,
    outputs: Outputs,
    executions: Executions,
}

impl ConcurrentForNode {
    pub const PORT_FIRST_INDEX: &'static str = "first_index";
    pub const PORT_LAST_INDEX: &'static str = "last_index";
    pub const PORT_WORKER_COUNT: &'static str = "worker_count";
    pub const PORT_INDEX: &'static str = "index";

    pub fn create(init: &mut NodeInit<'_>) -> Result<Arc<dyn Node>> {
        let (base, inputs, outputs) = (init.base(), init.inputs(), init.outputs());
        let node = Arc::new_cyclic(|this: &Weak<Self>| Self {
            this: this.clone(),
            base,
            inputs,
            outputs,
            executions: Executions::new(),
        });
        Ok(node)
    }
}

impl NodeDescriptor for ConcurrentForNode {
    fn descriptor() -> NodeTypeDefinition {
        NodeTypeDefinition::new("core/concurrent-for-loop", 1, "Concurrent For Loop")
            .short_desc("Run the body for every index of a range, in parallel")
            .category("control")
            .input("exec", InputDefinition::exec("Exec", 0))
            .input(Self::PORT_FIRST_INDEX, InputDefinition::new("First Index", "number", 1))
            .input(Self::PORT_LAST_INDEX, InputDefinition::new("Last Index", "number", 2))
            .input(
                Self::PORT_WORKER_COUNT,
                InputDefinition::new("Worker Count", "number", 3)
                    .description("Maximum number of parallel iterations, 0 runs all at once"),
            )
            .output(PORT_EXEC_BODY, OutputDefinition::exec("Body", 0))
            .output(PORT_EXEC_COMPLETED, OutputDefinition::exec("Completed", 1))
            .output(Self::PORT_INDEX, OutputDefinition::new("Index", "number", 2))
    }
}

inventory::submit!(DescriptorFn(ConcurrentForNode::descriptor, ConcurrentForNode::create));

#[async_trait]
impl Node for ConcurrentForNode {
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
        let first: i64 = input_value(self, state, Self::PORT_FIRST_INDEX).await?;
        let last: i64 = input_value(self, state, Self::PORT_LAST_INDEX).await?;
        let workers: usize = input_value(self, state, Self::PORT_WORKER_COUNT).await?;

        if let (true, Some(target)) = (first <= last, self.executions.target(PORT_EXEC_BODY)) {
            let this = upgrade_self(&self.this, state)?;

            let branches = (first..=last).map(move |index| -> Result<Branch> {
                let child = state.fork(&this);
                set_output_value(self, &child, Self::PORT_INDEX, Value::Int(index), SetOutputOpts::default())?;
                Ok(Branch {
                    state: child,
                    target: target.clone(),
                })
            });

            let started = run_branches(state, branches, workers).await?;
            log::debug!(
                "ConcurrentForNode {}: {} iterations on {} workers",
                self.base.id(),
                started,
                workers
            );
        }

        execute(self, PORT_EXEC_COMPLETED, state, None).await
    }
}

/// Concurrent For Each Node
///
/// Like [`ConcurrentForNode`], one forked state per element of `input`.
pub struct ConcurrentForEachNode {
    this: Weak<ConcurrentForEachNode>,
    base: NodeBase,
    inputs: Inputs,
    outputs: Outputs,
    executions: Executions,
}

impl ConcurrentForEachNode {
    pub const PORT_INPUT: &'static str = "input";
    pub const PORT_WORKER_COUNT: &'static str = "worker_count";
    pub const PORT_KEY: &'static str = "key";
    pub const PORT_VALUE: &'static str = "value";

    pub fn create(init: &mut NodeInit<'_>) -> Result<Arc<dyn Node>> {
        let (base, inputs, outputs) = (init.base(), init.inputs(), init.outputs());
        let node = Arc::new_cyclic(|this: &Weak<Self>| Self {
            this: this.clone(),
            base,
            inputs,
            outputs,
            executions: Executions::new(),
        });
        Ok(node)
    }
}

impl NodeDescriptor for ConcurrentForEachNode {
    fn descriptor() -> NodeTypeDefinition {
        NodeTypeDefinition::new("core/concurrent-for-each-loop", 1, "Concurrent For Each")
            .short_desc("Run the body for every element of a collection, in parallel")
            .category("control")
            .input("exec", InputDefinition::exec("Exec", 0))
            .input(Self::PORT_INPUT, InputDefinition::new("Input", "iterable", 1).required())
            .input(
                Self::PORT_WORKER_COUNT,
                InputDefinition::new("Worker Count", "number", 2)
                    .description("Maximum number of parallel iterations, 0 runs all at once"),
            )
            .output(PORT_EXEC_BODY, OutputDefinition::exec("Body", 0))
            .output(PORT_EXEC_COMPLETED, OutputDefinition::exec("Completed", 1))
            .output(Self::PORT_KEY, OutputDefinition::new("Key", "unknown", 2))
            .output(Self::PORT_VALUE, OutputDefinition::new("Value", "unknown", 3))
    }
}

inventory::submit!(DescriptorFn(
    ConcurrentForEachNode::descriptor,
    ConcurrentForEachNode::create
));

#[async_trait]
impl Node for ConcurrentForEachNode {
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
        let items: Iterable = input_value(self, state, Self::PORT_INPUT).await?;
        let workers: usize = input_value(self, state, Self::PORT_WORKER_COUNT).await?;

        if let Some(target) = self.executions.target(PORT_EXEC_BODY) {
            let this = upgrade_self(&self.this, state)?;

            let branches = items.map(move |item| -> Result<Branch> {
                let (key, value) = item?;
                let child = state.fork(&this);
                set_output_value(self, &child, Self::PORT_KEY, key, SetOutputOpts::default())?;
                set_output_value(self, &child, Self::PORT_VALUE, value, SetOutputOpts::default())?;
                Ok(Branch {
                    state: child,
                    target: target.clone(),
                })
            });

            let started = run_branches(state, branches, workers).await?;
            log::debug!(
                "ConcurrentForEachNode {}: {} iterations on {} workers",
                self.base.id(),
                started,
                workers
            );
        }

        execute(self, PORT_EXEC_COMPLETED, state, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptors_validate() {
        for mut def in [
            ConcurrentExecNode::descriptor(),
            ConcurrentForNode::descriptor(),
            ConcurrentForEachNode::descriptor(),
        ] {
            def.validate().unwrap();
            assert!(def.outputs.contains_key(PORT_EXEC_COMPLETED));
        }
    }
}
