//! Loaded action graph

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::definition::{InputDefinition, OutputDefinition};
use crate::error::{Result, RuntimeError};
use crate::node::Node;

/// Nodes of one graph level plus its boundary declarations.
///
/// The graph owns its nodes. Edges between them are non-owning, so a graph
/// must outlive every execution that runs on it.
#[derive(Default)]
pub struct Graph {
    nodes: BTreeMap<String, Arc<dyn Node>>,
    /// Declared inputs, used when the graph is the body of a group
    pub inputs: BTreeMap<String, InputDefinition>,
    /// Declared outputs, used when the graph is the body of a group
    pub outputs: BTreeMap<String, OutputDefinition>,
    entry: Option<String>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, id: impl Into<String>, node: Arc<dyn Node>) {
        self.nodes.insert(id.into(), node);
    }

    pub fn find_node(&self, id: &str) -> Option<&Arc<dyn Node>> {
        self.nodes.get(id)
    }

    pub fn nodes(&self) -> &BTreeMap<String, Arc<dyn Node>> {
        &self.nodes
    }

    pub fn set_entry(&mut self, id: impl Into<String>) {
        self.entry = Some(id.into());
    }

    pub fn entry_id(&self) -> Option<&str> {
        self.entry.as_deref()
    }

    /// The node a run starts from
    pub fn entry(&self) -> Result<&Arc<dyn Node>> {
        let id = self.entry.as_deref().unwrap_or_default();
        let node = self
            .nodes
            .get(id)
            .ok_or_else(|| RuntimeError::leaf(None, format!("entry '{}' not found", id)))?;
        if !node.is_entry() {
            return Err(RuntimeError::leaf(
                None,
                format!("entry '{}' is not an entry node", id),
            ));
        }
        Ok(node)
    }
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("nodes", &self.nodes.keys().collect::<Vec<_>>())
            .field("inputs", &self.inputs.keys().collect::<Vec<_>>())
            .field("outputs", &self.outputs.keys().collect::<Vec<_>>())
            .field("entry", &self.entry)
            .finish()
    }
}
