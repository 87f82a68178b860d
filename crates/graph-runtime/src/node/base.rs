//! Identity shared by every node

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use super::Node;

/// Identity and bookkeeping every node carries
pub struct NodeBase {
    id: String,
    full_path: String,
    node_type: String,
    name: String,
    cache_id: String,
    /// Enclosing group node, if any
    parent: Option<Weak<dyn Node>>,
    execution_node: AtomicBool,
}

impl NodeBase {
    pub fn new(
        id: impl Into<String>,
        full_path: impl Into<String>,
        node_type: impl Into<String>,
        name: impl Into<String>,
        parent: Option<Weak<dyn Node>>,
    ) -> Self {
        let id = id.into();
        let cache_id = format!("{}:{}", id, uuid::Uuid::new_v4());
        Self {
            id,
            full_path: full_path.into(),
            node_type: node_type.into(),
            name: name.into(),
            cache_id,
            parent,
            execution_node: AtomicBool::new(false),
        }
    }

    /// Id unique within the enclosing graph
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Id prefixed with the ids of all enclosing groups, unique within a run
    pub fn full_path(&self) -> &str {
        &self.full_path
    }

    pub fn node_type(&self) -> &str {
        &self.node_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Prefix of every output cache key of this node
    pub fn cache_id(&self) -> &str {
        &self.cache_id
    }

    /// Enclosing group node
    pub fn parent(&self) -> Option<Arc<dyn Node>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    /// Whether any execution edge touches this node
    pub fn is_execution_node(&self) -> bool {
        self.execution_node.load(Ordering::Acquire)
    }

    pub fn mark_execution_node(&self) {
        self.execution_node.store(true, Ordering::Release);
    }
}

impl std::fmt::Debug for NodeBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeBase")
            .field("id", &self.id)
            .field("node_type", &self.node_type)
            .field("cache_id", &self.cache_id)
            .finish()
    }
}
