//! Node type registry
//!
//! Maps node type keys (`core/for-loop@v1`) to their declared port
//! definitions and a factory that builds a node instance while a graph is
//! loaded.
//!
//! Node implementations register themselves at link time:
//!
//! ```ignore
//! impl NodeDescriptor for PrintNode {
//!     fn descriptor() -> NodeTypeDefinition {
//!         NodeTypeDefinition::new("core/print", 1, "Print")
//!             .input("exec", InputDefinition::exec("Exec", 0))
//!             .output("exec", OutputDefinition::exec("Exec", 0))
//!     }
//! }
//!
//! inventory::submit!(graph_runtime::DescriptorFn(PrintNode::descriptor, PrintNode::create));
//! ```
//!
//! [`NodeRegistry::with_builtins`] collects every submitted descriptor.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Weak};

use once_cell::sync::Lazy;

use crate::definition::{AssignmentMode, InputDefinition, NodeTypeDefinition, OutputDefinition};
use crate::error::{Result, RuntimeError};
use crate::node::{Inputs, Node, NodeBase, Outputs};
use crate::types::normalize_node_type;

/// Trait for node types that describe their ports
pub trait NodeDescriptor {
    fn descriptor() -> NodeTypeDefinition
    where
        Self: Sized;
}

/// Builds a node instance from its graph document entry
pub type NodeFactory = fn(&mut NodeInit<'_>) -> Result<Arc<dyn Node>>;

/// Link-time registration of a node type.
///
/// The first field returns the declared definition, the second builds
/// instances of it.
pub struct DescriptorFn(pub fn() -> NodeTypeDefinition, pub NodeFactory);

inventory::collect!(DescriptorFn);

/// Port declarations of the graph being loaded.
///
/// Set while the inner graph of a group is loaded, so the boundary nodes can
/// mirror the group's ports.
#[derive(Debug, Clone, Default)]
pub struct GraphScope {
    pub inputs: BTreeMap<String, InputDefinition>,
    pub outputs: BTreeMap<String, OutputDefinition>,
}

/// Everything a factory gets to build one node
pub struct NodeInit<'a> {
    pub id: String,
    /// `<parent path>/<id>` for nodes inside groups
    pub full_path: String,
    /// Normalized type key
    pub node_type: String,
    pub definition: &'a NodeTypeDefinition,
    /// The node's entry in the graph document
    pub document: &'a serde_json::Map<String, serde_json::Value>,
    /// Enclosing group, if any
    pub parent: Option<Weak<dyn Node>>,
    pub scope: Option<&'a GraphScope>,
    pub registry: &'a NodeRegistry,
    pub validate: bool,
    /// Errors collected in validate mode while the node could still be built
    pub errors: Vec<RuntimeError>,
}

impl<'a> NodeInit<'a> {
    pub fn base(&self) -> NodeBase {
        NodeBase::new(
            &self.id,
            &self.full_path,
            &self.node_type,
            &self.definition.name,
            self.parent.clone(),
        )
    }

    /// Inputs with the declared definitions
    pub fn inputs(&self) -> Inputs {
        Inputs::with_defs(self.definition.inputs.clone())
    }

    /// Outputs with the declared definitions
    pub fn outputs(&self) -> Outputs {
        Outputs::with_defs(self.definition.outputs.clone())
    }

    /// Record an error in validate mode, return it otherwise
    pub fn collect(&mut self, err: RuntimeError) -> Result<()> {
        if self.validate {
            self.errors.push(err);
            Ok(())
        } else {
            Err(err)
        }
    }
}

struct RegistryEntry {
    definition: NodeTypeDefinition,
    factory: NodeFactory,
}

/// Registry of node types
pub struct NodeRegistry {
    entries: HashMap<String, RegistryEntry>,
}

static GLOBAL: Lazy<NodeRegistry> = Lazy::new(NodeRegistry::with_builtins);

impl NodeRegistry {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Validate and register a node type
    pub fn register(&mut self, mut definition: NodeTypeDefinition, factory: NodeFactory) -> Result<()> {
        definition.validate()?;

        let key = definition.key();
        if self.entries.contains_key(&key) {
            return Err(RuntimeError::leaf(
                None,
                format!("node definition '{}' already registered", key),
            ));
        }
        self.entries.insert(key, RegistryEntry { definition, factory });
        Ok(())
    }

    /// Registry with every node type submitted through [`DescriptorFn`].
    ///
    /// Invalid definitions are skipped with an error log.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for DescriptorFn(descriptor, factory) in inventory::iter::<DescriptorFn> {
            let definition = descriptor();
            let key = definition.key();
            if let Err(e) = registry.register(definition, *factory) {
                log::error!("failed to register node type '{}': {}", key, e);
            }
        }
        log::debug!("registered {} built-in node types", registry.entries.len());
        registry
    }

    /// Process-wide registry of built-in node types
    pub fn global() -> &'static NodeRegistry {
        &GLOBAL
    }

    pub fn get_definition(&self, node_type: &str) -> Option<&NodeTypeDefinition> {
        self.entries
            .get(&normalize_node_type(node_type))
            .map(|e| &e.definition)
    }

    pub fn has_node_type(&self, node_type: &str) -> bool {
        self.entries.contains_key(&normalize_node_type(node_type))
    }

    /// Registered type keys, sorted
    pub fn node_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.entries.keys().map(|s| s.as_str()).collect();
        types.sort_unstable();
        types
    }

    /// Merge another registry into this one. Entries of `other` win.
    pub fn merge(&mut self, other: NodeRegistry) {
        self.entries.extend(other.entries);
    }

    /// Build a node of `node_type`.
    ///
    /// The declared port definitions are merged over whatever the factory
    /// set up dynamically. In validate mode errors the factory recovered
    /// from are appended to `errors`.
    #[allow(clippy::too_many_arguments)]
    pub fn create_node(
        &self,
        node_type: &str,
        id: &str,
        full_path: &str,
        document: &serde_json::Map<String, serde_json::Value>,
        parent: Option<Weak<dyn Node>>,
        scope: Option<&GraphScope>,
        validate: bool,
        errors: &mut Vec<RuntimeError>,
    ) -> Result<Arc<dyn Node>> {
        let key = normalize_node_type(node_type);
        let entry = self
            .entries
            .get(&key)
            .ok_or_else(|| RuntimeError::leaf(None, format!("unknown node type '{}'", key)))?;

        let mut init = NodeInit {
            id: id.to_string(),
            full_path: full_path.to_string(),
            node_type: key,
            definition: &entry.definition,
            document,
            parent,
            scope,
            registry: self,
            validate,
            errors: Vec::new(),
        };
        let node = (entry.factory)(&mut init)?;
        errors.append(&mut init.errors);

        if let Some(inputs) = node.inputs() {
            inputs.set_defs(entry.definition.inputs.clone(), AssignmentMode::Merge);
        }
        if let Some(outputs) = node.outputs() {
            outputs.set_defs(entry.definition.outputs.clone(), AssignmentMode::Merge);
        }
        Ok(node)
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop {
        base: NodeBase,
        inputs: Inputs,
    }

    impl Node for Noop {
        fn base(&self) -> &NodeBase {
            &self.base
        }

        fn inputs(&self) -> Option<&Inputs> {
            Some(&self.inputs)
        }
    }

    fn create_noop(init: &mut NodeInit<'_>) -> Result<Arc<dyn Node>> {
        Ok(Arc::new(Noop {
            base: init.base(),
            inputs: Inputs::new(),
        }))
    }

    fn noop_definition(id: &str) -> NodeTypeDefinition {
        NodeTypeDefinition::new(id, 1, "Noop").input("value", InputDefinition::new("Value", "string", 0))
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = NodeRegistry::new();
        registry.register(noop_definition("core/noop"), create_noop).unwrap();

        assert!(registry.has_node_type("core/noop@v1"));
        assert!(registry.has_node_type("noop@v1"));
        assert_eq!(registry.node_types(), vec!["core/noop@v1"]);
        assert_eq!(registry.get_definition("noop@v1").unwrap().name, "Noop");

        let err = registry
            .register(noop_definition("core/noop"), create_noop)
            .unwrap_err();
        assert_eq!(err.to_string(), "node definition 'core/noop@v1' already registered");
    }

    #[test]
    fn test_register_rejects_invalid_definitions() {
        let mut registry = NodeRegistry::new();
        assert!(registry
            .register(noop_definition("core/no_op"), create_noop)
            .is_err());
        assert!(registry
            .register(NodeTypeDefinition::new("core/lower", 1, "lower"), create_noop)
            .is_err());
    }

    #[test]
    fn test_create_node_merges_declared_defs() {
        let mut registry = NodeRegistry::new();
        registry.register(noop_definition("core/noop"), create_noop).unwrap();

        let document = serde_json::Map::new();
        let mut errors = Vec::new();
        let node = registry
            .create_node("noop@v1", "n1", "g/n1", &document, None, None, false, &mut errors)
            .unwrap();
        assert_eq!(node.base().node_type(), "core/noop@v1");
        assert_eq!(node.base().full_path(), "g/n1");
        assert!(node.inputs().unwrap().def("value").is_some());

        let err = registry
            .create_node("core/missing@v1", "n2", "n2", &document, None, None, false, &mut errors)
            .unwrap_err();
        assert_eq!(err.to_string(), "unknown node type 'core/missing@v1'");
    }

    #[test]
    fn test_merge() {
        let mut a = NodeRegistry::new();
        a.register(noop_definition("core/a"), create_noop).unwrap();
        let mut b = NodeRegistry::new();
        b.register(noop_definition("core/b"), create_noop).unwrap();
        a.merge(b);
        assert_eq!(a.node_types(), vec!["core/a@v1", "core/b@v1"]);
    }
}
