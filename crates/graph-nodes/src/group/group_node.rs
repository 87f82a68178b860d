//! Group Node
//!
//! A group embeds a sub-graph. Its ports are whatever the sub-graph declares
//! in its `inputs` and `outputs` sections; values and execution cross the
//! boundary through the sub-graph's `group-inputs` and `group-outputs`
//! nodes.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use graph_runtime::{
    connect_data_port, execute, input_value_raw, load_graph_with, AssignmentMode, DescriptorFn,
    ExecutionState, Executions, Graph, Inputs, Node, NodeBase, NodeDescriptor, NodeInit, NodeKind,
    NodeTypeDefinition, Outputs, Result, RuntimeError, Value, HINT_INTERNAL_ERROR,
};
use once_cell::sync::OnceCell;

use crate::control::pool::upgrade_self;

/// Group Node
///
/// Entering through one of the group's execution inputs pushes the group on
/// the state's hierarchy; leaving through one of its execution outputs pops
/// it again.
pub struct GroupNode {
    this: Weak<GroupNode>,
    base: NodeBase,
    inputs: Inputs,
    outputs: Outputs,
    executions: Executions,
    /// The embedded graph, owning the inner nodes
    graph: OnceCell<Graph>,
}

impl GroupNode {
    pub const DOCUMENT_GRAPH: &'static str = "graph";

    pub fn create(init: &mut NodeInit<'_>) -> Result<Arc<dyn Node>> {
        let Some(graph_doc) = init
            .document
            .get(Self::DOCUMENT_GRAPH)
            .and_then(|g| g.as_object())
        else {
            return Err(RuntimeError::leaf(
                None,
                format!(
                    "group node '{}' ({}) has an invalid graph definition",
                    init.definition.name, init.id
                ),
            ));
        };

        let base = init.base();
        let group = Arc::new_cyclic(|this: &Weak<Self>| Self {
            this: this.clone(),
            base,
            inputs: Inputs::new(),
            outputs: Outputs::new(),
            executions: Executions::new(),
            graph: OnceCell::new(),
        });
        let group_dyn: Arc<dyn Node> = group.clone();

        let (graph, errors) = load_graph_with(
            init.registry,
            graph_doc,
            Some(Arc::downgrade(&group_dyn)),
            &init.full_path,
            init.validate,
        );
        let failed = !errors.is_empty();
        for err in errors {
            init.collect(err)?;
        }
        if !failed {
            group.wire_boundaries(&group_dyn, &graph, init)?;
            log::debug!(
                "GroupNode {}: loaded {} nodes, {} inputs, {} outputs",
                init.id,
                graph.nodes().len(),
                graph.inputs.len(),
                graph.outputs.len()
            );
        }

        group.graph.set(graph).map_err(|_| {
            RuntimeError::leaf(None, format!("group node '{}' was loaded twice", init.id))
                .with_hint(HINT_INTERNAL_ERROR)
        })?;
        Ok(group_dyn)
    }

    /// Take over the sub-graph's declarations as the group's ports and wire
    /// them to the boundary nodes.
    ///
    /// Every port is wired on its own. In validate mode a failing port is
    /// recorded and the remaining ports are still wired.
    fn wire_boundaries(
        &self,
        group_dyn: &Arc<dyn Node>,
        graph: &Graph,
        init: &mut NodeInit<'_>,
    ) -> Result<()> {
        if let Some(name) = graph.inputs.keys().find(|id| graph.outputs.contains_key(*id)) {
            init.collect(RuntimeError::leaf(
                None,
                format!("group node has an input and output with the same name '{}'", name),
            ))?;
        }

        self.inputs.set_defs(graph.inputs.clone(), AssignmentMode::Replace);
        self.outputs.set_defs(graph.outputs.clone(), AssignmentMode::Replace);

        if !graph.inputs.is_empty() {
            match graph.entry_id().and_then(|id| graph.find_node(id)) {
                None => init.collect(RuntimeError::leaf(None, "group has no group input node"))?,
                Some(entry) if entry.kind() != NodeKind::GroupInputs => init.collect(
                    RuntimeError::leaf(None, "group input node is not a group input node"),
                )?,
                Some(entry) => {
                    for (id, def) in &graph.inputs {
                        let wired = if def.exec {
                            self.executions.connect(&self.base, id, entry, id)
                        } else {
                            connect_data_port(group_dyn, id, entry, id, true)
                        };
                        if let Err(e) = wired {
                            init.collect(RuntimeError::create(
                                None,
                                Some(e),
                                format!("failed to wire group input '{}'", id),
                            ))?;
                        }
                    }
                }
            }
        }

        if !graph.outputs.is_empty() {
            match graph.nodes().values().find(|n| n.kind() == NodeKind::GroupOutputs) {
                None => init.collect(RuntimeError::leaf(None, "group has no group output node"))?,
                Some(sink) => {
                    for (id, def) in &graph.outputs {
                        let wired = if def.exec {
                            match sink.executions() {
                                Some(executions) => executions.connect(sink.base(), id, group_dyn, id),
                                None => Err(RuntimeError::leaf(
                                    None,
                                    "group output node has no execution interface",
                                )),
                            }
                        } else {
                            connect_data_port(sink, id, group_dyn, id, true)
                        };
                        if let Err(e) = wired {
                            init.collect(RuntimeError::create(
                                None,
                                Some(e),
                                format!("failed to wire group output '{}'", id),
                            ))?;
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// The embedded graph, once loaded
    pub fn graph(&self) -> Option<&Graph> {
        self.graph.get()
    }
}

impl NodeDescriptor for GroupNode {
    fn descriptor() -> NodeTypeDefinition {
        NodeTypeDefinition::new("core/group", 1, "Group")
            .short_desc("Embed a sub-graph as a single node")
            .category("group")
    }
}

inventory::submit!(DescriptorFn(GroupNode::descriptor, GroupNode::create));

#[async_trait]
impl Node for GroupNode {
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

    fn kind(&self) -> NodeKind {
        NodeKind::Group
    }

    async fn output_value(&self, state: &Arc<ExecutionState>, output_id: &str) -> Result<Value> {
        input_value_raw(self, state, output_id, None).await
    }

    async fn execute_impl(
        &self,
        state: &Arc<ExecutionState>,
        input_id: &str,
        prev: Option<RuntimeError>,
    ) -> Result<()> {
        if self.inputs.def(input_id).is_some() {
            state.push_hierarchy(upgrade_self(&self.this, state)?);
        } else if self.outputs.def_by_port_id(input_id).is_some() {
            if state.pop_hierarchy().is_none() {
                return Err(RuntimeError::leaf(
                    Some(state),
                    format!("group node '{}' has no parent execution state", self.base.id()),
                )
                .with_hint(HINT_INTERNAL_ERROR));
            }
        } else {
            return Err(RuntimeError::leaf(
                Some(state),
                format!(
                    "group node '{}' has no input or output with id '{}'",
                    self.base.id(),
                    input_id
                ),
            )
            .with_hint(HINT_INTERNAL_ERROR));
        }

        execute(self, input_id, state, prev).await
    }
}
