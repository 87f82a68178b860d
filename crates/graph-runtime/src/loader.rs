//! Graph loader and validator
//!
//! Builds a [`Graph`] from a parsed graph document. The document sections are
//! processed in order: graph inputs, graph outputs, nodes, executions,
//! connections, entry.
//!
//! In run mode the first error aborts loading. In validate mode every
//! section keeps going and all errors are returned together, so a user sees
//! every problem of a graph file in one pass:
//!
//! ```ignore
//! let errors = validate_graph(&document);
//! if !errors.is_empty() {
//!     eprintln!("{}", ValidationReport::new(errors));
//! }
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Weak};

use serde::de::DeserializeOwned;
use serde_json::{Map, Value as Json};

use crate::error::{Result, RuntimeError};
use crate::graph::Graph;
use crate::node::{connect_data_port, Node, NodeKind};
use crate::registry::{GraphScope, NodeRegistry};
use crate::types::{is_github_action_type, parse_index_port};
use crate::value::Value;

type Document = Map<String, Json>;

/// Errors collected in validate mode, or the first one in run mode
struct Collector {
    validate: bool,
    errors: Vec<RuntimeError>,
}

impl Collector {
    fn collect(&mut self, err: RuntimeError) -> Result<()> {
        if self.validate {
            self.errors.push(err);
            Ok(())
        } else {
            Err(err)
        }
    }
}

/// Look up a dotted path such as `src.node`
fn property<'a>(document: &'a Document, path: &str) -> Result<&'a Json> {
    let mut parts = path.split('.');
    let first = parts.next().unwrap_or_default();
    let mut current = document
        .get(first)
        .ok_or_else(|| RuntimeError::leaf(None, format!("key not found: {}", path)))?;
    for part in parts {
        current = current
            .as_object()
            .and_then(|map| map.get(part))
            .ok_or_else(|| RuntimeError::leaf(None, format!("key not found: {}", path)))?;
    }
    Ok(current)
}

fn property_str<'a>(document: &'a Document, path: &str) -> Result<&'a str> {
    property(document, path)?.as_str().ok_or_else(|| {
        RuntimeError::leaf(None, format!("cannot convert value of '{}' to type string", path))
    })
}

/// Load a graph document with the built-in node types.
///
/// `parent` is the enclosing group and `parent_id` its full path, both unset
/// for a top-level graph. In run mode the returned list holds at most one
/// error and the graph is empty if it does.
pub fn load_graph(
    document: &Document,
    parent: Option<Weak<dyn Node>>,
    parent_id: &str,
    validate: bool,
) -> (Graph, Vec<RuntimeError>) {
    load_graph_with(NodeRegistry::global(), document, parent, parent_id, validate)
}

/// Load a graph document with node types from `registry`
pub fn load_graph_with(
    registry: &NodeRegistry,
    document: &Document,
    parent: Option<Weak<dyn Node>>,
    parent_id: &str,
    validate: bool,
) -> (Graph, Vec<RuntimeError>) {
    let mut collector = Collector {
        validate,
        errors: Vec::new(),
    };
    let mut graph = Graph::new();

    let result = load_sections(registry, &mut graph, document, parent, parent_id, &mut collector);
    match result {
        Ok(()) => (graph, collector.errors),
        Err(err) => (Graph::new(), vec![err]),
    }
}

fn load_sections(
    registry: &NodeRegistry,
    graph: &mut Graph,
    document: &Document,
    parent: Option<Weak<dyn Node>>,
    parent_id: &str,
    c: &mut Collector,
) -> Result<()> {
    graph.inputs = load_port_definitions(document, "inputs", c)?;
    graph.outputs = load_port_definitions(document, "outputs", c)?;

    let scope = GraphScope {
        inputs: graph.inputs.clone(),
        outputs: graph.outputs.clone(),
    };
    load_nodes(registry, graph, document, parent, parent_id, &scope, c)?;
    load_executions(graph, document, c)?;
    load_connections(graph, document, c)?;
    load_entry(graph, document, c)
}

fn load_port_definitions<T: DeserializeOwned>(
    document: &Document,
    section: &str,
    c: &mut Collector,
) -> Result<BTreeMap<String, T>> {
    let mut defs = BTreeMap::new();
    let Some(ports) = document.get(section) else {
        return Ok(defs);
    };
    let Some(ports) = ports.as_object() else {
        c.collect(RuntimeError::leaf(None, format!("graph {} are not a map", section)))?;
        return Ok(defs);
    };

    for (port_id, def) in ports {
        match serde_json::from_value::<T>(def.clone()) {
            Ok(def) => {
                defs.insert(port_id.clone(), def);
            }
            Err(e) => c.collect(RuntimeError::create(
                None,
                Some(e.into()),
                format!("invalid definition of graph {} '{}'", section, port_id),
            ))?,
        }
    }
    Ok(defs)
}

fn load_nodes(
    registry: &NodeRegistry,
    graph: &mut Graph,
    document: &Document,
    parent: Option<Weak<dyn Node>>,
    parent_id: &str,
    scope: &GraphScope,
    c: &mut Collector,
) -> Result<()> {
    let nodes = match property(document, "nodes") {
        Ok(Json::Array(nodes)) => nodes,
        Ok(_) => return c.collect(RuntimeError::leaf(None, "nodes is not a list")),
        Err(e) => return c.collect(e),
    };

    for node_data in nodes {
        let Some(node_doc) = node_data.as_object() else {
            c.collect(RuntimeError::leaf(None, "node is not a map"))?;
            continue;
        };

        // A node without id is still checked, it just never joins the graph
        let id = match property_str(node_doc, "id") {
            Ok(id) => Some(id),
            Err(e) => {
                c.collect(e)?;
                None
            }
        };

        let node_type = match property_str(node_doc, "type") {
            Ok(node_type) => node_type,
            Err(e) => {
                c.collect(e)?;
                continue;
            }
        };

        let id_str = id.unwrap_or_default();
        let full_path = if parent_id.is_empty() {
            id_str.to_string()
        } else {
            format!("{}/{}", parent_id, id_str)
        };

        if is_github_action_type(node_type) {
            c.collect(RuntimeError::leaf(
                None,
                format!("node '{}' uses github action '{}' which is not supported", id_str, node_type),
            ))?;
            continue;
        }

        let created = registry.create_node(
            node_type,
            id_str,
            &full_path,
            node_doc,
            parent.clone(),
            Some(scope),
            c.validate,
            &mut c.errors,
        );
        let node = match created {
            Ok(node) => node,
            Err(e) => {
                c.collect(e)?;
                continue;
            }
        };

        load_input_values(&node, node_doc, c)?;
        load_output_values(&node, node_doc, c)?;

        let Some(id) = id else {
            continue;
        };
        if graph.find_node(id).is_some() {
            c.collect(RuntimeError::leaf(
                None,
                format!("node id '{}' is used more than once", id),
            ))?;
            continue;
        }
        log::trace!("loaded node '{}' ({})", full_path, node.base().node_type());
        graph.add_node(id, node);
    }
    Ok(())
}

/// Set input literals and register the `name[k]` sub-ports they mention
fn load_input_values(node: &Arc<dyn Node>, node_doc: &Document, c: &mut Collector) -> Result<()> {
    let Some(values) = node_doc.get("inputs") else {
        return Ok(());
    };
    let base = node.base();
    let Some(values) = values.as_object() else {
        return c.collect(RuntimeError::leaf(
            None,
            format!("inputs of node '{}' ({}) are not a map", base.name(), base.id()),
        ));
    };
    let Some(inputs) = node.inputs() else {
        return c.collect(RuntimeError::leaf(
            None,
            format!(
                "dst node '{}' ({}) does not have inputs but inputs are defined",
                base.name(),
                base.id()
            ),
        ));
    };

    let mut sub_inputs: Vec<(i64, &str)> = Vec::new();
    for (port_id, value) in values {
        if let Some((array_port, index)) = parse_index_port(port_id) {
            if inputs.def(&array_port).is_none() {
                c.collect(RuntimeError::leaf(
                    None,
                    format!(
                        "dst node '{}' ({}) has no array input '{}'",
                        base.name(),
                        base.id(),
                        array_port
                    ),
                ))?;
                continue;
            }
            sub_inputs.push((index, port_id));
        }
        inputs.set_value(port_id, Value::from_json(value.clone()));
    }

    sub_inputs.sort();
    for (_, port_id) in sub_inputs {
        if let Err(e) = inputs.add_sub_input(port_id) {
            c.collect(e)?;
        }
    }
    Ok(())
}

/// The `outputs` section of a node only declares array sub-ports
fn load_output_values(node: &Arc<dyn Node>, node_doc: &Document, c: &mut Collector) -> Result<()> {
    let Some(values) = node_doc.get("outputs") else {
        return Ok(());
    };
    let base = node.base();
    let Some(outputs) = node.outputs() else {
        return c.collect(RuntimeError::leaf(
            None,
            format!(
                "node '{}' ({}) does not have outputs but outputs are defined",
                base.name(),
                base.id()
            ),
        ));
    };
    let Some(values) = values.as_object() else {
        return c.collect(RuntimeError::leaf(
            None,
            format!("outputs of node '{}' ({}) are not a map", base.name(), base.id()),
        ));
    };

    let mut sub_outputs: Vec<(i64, &str)> = Vec::new();
    for port_id in values.keys() {
        match parse_index_port(port_id) {
            Some((array_port, index)) => {
                if outputs.def(&array_port).is_none() {
                    c.collect(RuntimeError::leaf(
                        None,
                        format!(
                            "source node '{}' ({}) has no array output '{}'",
                            base.name(),
                            base.id(),
                            array_port
                        ),
                    ))?;
                    continue;
                }
                sub_outputs.push((index, port_id));
            }
            None => c.collect(RuntimeError::leaf(
                None,
                format!(
                    "source node '{}' ({}) has no output '{}'",
                    base.name(),
                    base.id(),
                    port_id
                ),
            ))?,
        }
    }

    sub_outputs.sort();
    for (_, port_id) in sub_outputs {
        if let Err(e) = outputs.add_sub_output(port_id) {
            c.collect(e)?;
        }
    }
    Ok(())
}

/// One `{src: {node, port}, dst: {node, port}}` entry
struct Edge<'a> {
    src_node: &'a str,
    src_port: &'a str,
    dst_node: &'a str,
    dst_port: &'a str,
}

fn parse_edge<'a>(entry: &'a Json, kind: &str) -> Result<Edge<'a>> {
    let entry = entry
        .as_object()
        .ok_or_else(|| RuntimeError::leaf(None, format!("{} is not a map", kind)))?;
    Ok(Edge {
        src_node: property_str(entry, "src.node")?,
        dst_node: property_str(entry, "dst.node")?,
        src_port: property_str(entry, "src.port")?,
        dst_port: property_str(entry, "dst.port")?,
    })
}

/// Entries of an edge list section. A missing section has no entries.
fn edge_list<'a>(document: &'a Document, section: &str, c: &mut Collector) -> Result<&'a [Json]> {
    match document.get(section) {
        None | Some(Json::Null) => Ok(&[]),
        Some(Json::Array(entries)) => Ok(entries),
        Some(_) => {
            c.collect(RuntimeError::leaf(None, format!("{} is not a list", section)))?;
            Ok(&[])
        }
    }
}

fn endpoints<'g>(graph: &'g Graph, edge: &Edge<'_>) -> Result<(&'g Arc<dyn Node>, &'g Arc<dyn Node>)> {
    let src = graph.find_node(edge.src_node).ok_or_else(|| {
        RuntimeError::leaf(None, format!("src node '{}' does not exist", edge.src_node))
    })?;
    let dst = graph.find_node(edge.dst_node).ok_or_else(|| {
        RuntimeError::leaf(
            None,
            format!("connection dst node '{}' does not exist", edge.dst_node),
        )
    })?;
    Ok((src, dst))
}

fn load_executions(graph: &Graph, document: &Document, c: &mut Collector) -> Result<()> {
    for entry in edge_list(document, "executions", c)? {
        if let Err(e) = connect_execution(graph, entry) {
            c.collect(e)?;
        }
    }
    Ok(())
}

/// Whether `port` is `name[k]` of an array execution port `name`
fn is_exec_array_element(port: &str, flags: impl Fn(&str) -> Option<(bool, bool)>) -> bool {
    parse_index_port(port)
        .and_then(|(array_port, _)| flags(&array_port))
        .is_some_and(|(exec, array)| exec && array)
}

fn connect_execution(graph: &Graph, entry: &Json) -> Result<()> {
    let edge = parse_edge(entry, "execution")?;
    let (src, dst) = endpoints(graph, &edge)?;
    let (src_base, dst_base) = (src.base(), dst.base());

    let executions = src.executions().ok_or_else(|| {
        RuntimeError::leaf(
            None,
            format!(
                "src node '{}' ({}) does not have an execution interface",
                src_base.name(),
                edge.src_node
            ),
        )
    })?;

    // boundary nodes mirror the group's ports
    if src.kind() != NodeKind::GroupInputs {
        let outputs = src.outputs().ok_or_else(|| {
            RuntimeError::leaf(
                None,
                format!(
                    "src node '{}' ({}) does not have an output interface",
                    src_base.name(),
                    edge.src_node
                ),
            )
        })?;
        if outputs.def_by_port_id(edge.src_port).is_none()
            && is_exec_array_element(edge.src_port, |p| outputs.def(p).map(|d| (d.exec, d.array)))
        {
            outputs.add_sub_output(edge.src_port)?;
        }
        if !outputs.def_by_port_id(edge.src_port).is_some_and(|(def, _)| def.exec) {
            return Err(RuntimeError::leaf(
                None,
                format!(
                    "src node '{}' ({}) has no execution output '{}'",
                    src_base.name(),
                    edge.src_node,
                    edge.src_port
                ),
            ));
        }
    }

    if dst.kind() != NodeKind::GroupOutputs {
        let inputs = dst.inputs().ok_or_else(|| {
            RuntimeError::leaf(
                None,
                format!(
                    "dst node '{}' ('{}') does not have an input interface",
                    dst_base.name(),
                    edge.dst_node
                ),
            )
        })?;
        if inputs.def_by_port_id(edge.dst_port).is_none()
            && is_exec_array_element(edge.dst_port, |p| inputs.def(p).map(|d| (d.exec, d.array)))
        {
            inputs.add_sub_input(edge.dst_port)?;
        }
        if !inputs.def_by_port_id(edge.dst_port).is_some_and(|(def, _)| def.exec) {
            return Err(RuntimeError::leaf(
                None,
                format!(
                    "dst node '{}' ({}) has no execution input '{}'",
                    dst_base.name(),
                    edge.dst_node,
                    edge.dst_port
                ),
            ));
        }
    }

    if executions.has_target(edge.src_port) {
        return Err(RuntimeError::leaf(
            None,
            format!(
                "execution output '{}' of node '{}' ({}) is already connected",
                edge.src_port,
                src_base.name(),
                edge.src_node
            ),
        )
        .with_hint("use a sequence or concurrent-exec node to run several nodes from one output"));
    }

    executions
        .connect(src_base, edge.src_port, dst, edge.dst_port)
        .map_err(|e| RuntimeError::create(None, Some(e), "failed to connect execution ports"))
}

fn load_connections(graph: &Graph, document: &Document, c: &mut Collector) -> Result<()> {
    for entry in edge_list(document, "connections", c)? {
        if let Err(e) = connect_data(graph, entry) {
            c.collect(e)?;
        }
    }
    Ok(())
}

fn connect_data(graph: &Graph, entry: &Json) -> Result<()> {
    let edge = parse_edge(entry, "connection")?;
    let (src, dst) = endpoints(graph, &edge)?;

    let inputs = dst.inputs().ok_or_else(|| {
        RuntimeError::leaf(
            None,
            format!(
                "dst node '{}' ('{}') does not have an input interface",
                dst.base().name(),
                edge.dst_node
            ),
        )
    })?;
    if inputs.is_connected(edge.dst_port) {
        return Err(RuntimeError::leaf(
            None,
            format!(
                "input '{}' of node '{}' ({}) already has a connection",
                edge.dst_port,
                dst.base().name(),
                edge.dst_node
            ),
        ));
    }

    // group ports are declared by the inner graph, both sides agree by construction
    let skip_validation = src.kind() == NodeKind::Group || dst.kind() == NodeKind::Group;
    connect_data_port(src, edge.src_port, dst, edge.dst_port, skip_validation)
        .map_err(|e| RuntimeError::create(None, Some(e), "failed to connect data ports"))
}

fn load_entry(graph: &mut Graph, document: &Document, c: &mut Collector) -> Result<()> {
    match document.get("entry") {
        None => c.collect(RuntimeError::leaf(None, "entry is missing")),
        Some(Json::String(entry)) => {
            graph.set_entry(entry.as_str());
            Ok(())
        }
        Some(_) => c.collect(RuntimeError::leaf(None, "entry is not a string")),
    }
}

/// Load `document` in validate mode and return every error found
pub fn validate_graph(document: &Document) -> Vec<RuntimeError> {
    validate_graph_with(NodeRegistry::global(), document)
}

pub fn validate_graph_with(registry: &NodeRegistry, document: &Document) -> Vec<RuntimeError> {
    let (_, errors) = load_graph_with(registry, document, None, "", true);
    errors
}

/// All errors of a validation run, one per line
#[derive(Debug)]
pub struct ValidationReport {
    pub errors: Vec<RuntimeError>,
}

impl ValidationReport {
    pub fn new(errors: Vec<RuntimeError>) -> Self {
        Self { errors }
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.errors.is_empty() {
            return write!(f, "graph is valid");
        }
        writeln!(f, "found {} error(s):", self.errors.len())?;
        for (i, err) in self.errors.iter().enumerate() {
            writeln!(f, "{}. {}", i + 1, err)?;
        }
        Ok(())
    }
}
