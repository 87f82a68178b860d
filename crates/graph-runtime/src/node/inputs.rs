//! Input ports and value resolution
//!
//! An input resolves its value from one of three places, in order:
//!
//! 1. the output wired to it, read from the output caches of the execution
//!    state or computed by the source node on demand
//! 2. the literal set in the graph document, or the declared default
//! 3. the zero value of the port type, unless the input is required
//!
//! String values are run through the expression evaluator before they are
//! converted into the type the node asks for.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Weak};

use futures_util::future::{BoxFuture, FutureExt};
use parking_lot::RwLock;

use super::{Node, NodeKind};
use crate::coerce::FromValue;
use crate::definition::{AssignmentMode, InputDefinition};
use crate::error::{Result, RuntimeError, HINT_INTERNAL_ERROR};
use crate::expression::evaluate;
use crate::state::ExecutionState;
use crate::types::{default_zero_value, parse_index_port, ports_are_compatible, PortType};
use crate::value::Value;

/// A `name[k]` sub-port of an array port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexPortInfo {
    pub index_port_id: String,
    pub array_port_id: String,
    pub index: i64,
}

/// Origin of an incoming data edge
#[derive(Clone)]
pub struct DataSource {
    pub src: Weak<dyn Node>,
    pub src_output_id: String,
    /// Set when the edge starts at a sub-port of an array output
    pub src_index: Option<IndexPortInfo>,
}

#[derive(Default)]
struct InputsInner {
    defs: BTreeMap<String, InputDefinition>,
    values: HashMap<String, Value>,
    index_ports: HashMap<String, IndexPortInfo>,
    connections: HashMap<String, DataSource>,
}

/// Input port capability
#[derive(Default)]
pub struct Inputs {
    inner: RwLock<InputsInner>,
}

impl Inputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defs(defs: BTreeMap<String, InputDefinition>) -> Self {
        let inputs = Self::new();
        inputs.set_defs(defs, AssignmentMode::Replace);
        inputs
    }

    pub fn set_defs(&self, defs: BTreeMap<String, InputDefinition>, mode: AssignmentMode) {
        let mut inner = self.inner.write();
        match mode {
            AssignmentMode::Replace => inner.defs = defs,
            AssignmentMode::Merge => inner.defs.extend(defs),
        }
    }

    pub fn defs(&self) -> BTreeMap<String, InputDefinition> {
        self.inner.read().defs.clone()
    }

    pub fn def(&self, port: &str) -> Option<InputDefinition> {
        self.inner.read().defs.get(port).cloned()
    }

    /// Resolve a declared port or a registered `name[k]` sub-port
    pub fn def_by_port_id(&self, port: &str) -> Option<(InputDefinition, Option<IndexPortInfo>)> {
        let inner = self.inner.read();
        match inner.index_ports.get(port) {
            Some(info) => inner
                .defs
                .get(&info.array_port_id)
                .map(|def| (def.clone(), Some(info.clone()))),
            None => inner.defs.get(port).map(|def| (def.clone(), None)),
        }
    }

    /// Set the literal value of an input or sub-input
    pub fn set_value(&self, port: &str, value: Value) {
        self.inner.write().values.insert(port.to_string(), value);
    }

    pub fn value(&self, port: &str) -> Option<Value> {
        self.inner.read().values.get(port).cloned()
    }

    /// Register the sub-port `name[k]` of the array input `name`
    pub fn add_sub_input(&self, sub_port_id: &str) -> Result<()> {
        let (array_port_id, index) = parse_index_port(sub_port_id).ok_or_else(|| {
            RuntimeError::leaf(None, format!("port '{}' is not a sub port", sub_port_id))
        })?;

        let mut inner = self.inner.write();
        match inner.defs.get(&array_port_id) {
            None => {
                return Err(RuntimeError::leaf(
                    None,
                    format!("port '{}' does not exist", array_port_id),
                ))
            }
            Some(def) if !def.array => {
                return Err(RuntimeError::leaf(
                    None,
                    format!("port '{}' is not an array input", array_port_id),
                ))
            }
            Some(_) => {}
        }

        inner.index_ports.insert(
            sub_port_id.to_string(),
            IndexPortInfo {
                index_port_id: sub_port_id.to_string(),
                array_port_id,
                index,
            },
        );
        Ok(())
    }

    /// Sub-ports of `array_port_id`, ordered by index
    pub fn index_ports_of(&self, array_port_id: &str) -> Vec<IndexPortInfo> {
        let mut ports: Vec<IndexPortInfo> = self
            .inner
            .read()
            .index_ports
            .values()
            .filter(|p| p.array_port_id == array_port_id)
            .cloned()
            .collect();
        ports.sort_by_key(|p| p.index);
        ports
    }

    pub fn data_source(&self, port: &str) -> Option<DataSource> {
        self.inner.read().connections.get(port).cloned()
    }

    pub fn is_connected(&self, port: &str) -> bool {
        self.inner.read().connections.contains_key(port)
    }

    fn set_connection(&self, port: &str, source: DataSource) {
        self.inner.write().connections.insert(port.to_string(), source);
    }
}

/// Register `port` as a sub-port if it names an element of a declared array port
fn ensure_sub_port(port: &str, is_array: impl Fn(&str) -> bool, add: impl Fn(&str) -> Result<()>) -> Result<()> {
    if let Some((array_port, _)) = parse_index_port(port) {
        if is_array(&array_port) {
            add(port)?;
        }
    }
    Ok(())
}

/// Wire the output `src_port` of `src` to the input `dst_port` of `dst`.
///
/// With `skip_validation` the port definitions and types are not checked.
/// Group boundaries use this since both sides mirror the same declaration.
pub fn connect_data_port(
    src: &Arc<dyn Node>,
    src_port: &str,
    dst: &Arc<dyn Node>,
    dst_port: &str,
    skip_validation: bool,
) -> Result<()> {
    let src_base = src.base();
    let dst_base = dst.base();

    let src_outputs = src.outputs().ok_or_else(|| {
        RuntimeError::leaf(
            None,
            format!("source node '{}' ({}) has no outputs", src_base.name(), src_base.id()),
        )
    })?;
    let dst_inputs = dst.inputs().ok_or_else(|| {
        RuntimeError::leaf(
            None,
            format!("dst node '{}' ({}) has no inputs", dst_base.name(), dst_base.id()),
        )
    })?;

    if src_outputs.def_by_port_id(src_port).is_none() {
        ensure_sub_port(
            src_port,
            |p| src_outputs.def(p).is_some_and(|d| d.array),
            |p| src_outputs.add_sub_output(p),
        )?;
    }
    if dst_inputs.def_by_port_id(dst_port).is_none() {
        ensure_sub_port(
            dst_port,
            |p| dst_inputs.def(p).is_some_and(|d| d.array),
            |p| dst_inputs.add_sub_input(p),
        )?;
    }

    let output = src_outputs.def_by_port_id(src_port);
    let src_index = output.as_ref().and_then(|(_, info)| info.clone());

    if !skip_validation {
        let (output_def, output_index) = output.ok_or_else(|| {
            RuntimeError::leaf(
                None,
                format!(
                    "source node '{}' ({}) has no output '{}'",
                    src_base.name(),
                    src_base.id(),
                    src_port
                ),
            )
        })?;
        let (input_def, input_index) = dst_inputs.def_by_port_id(dst_port).ok_or_else(|| {
            RuntimeError::leaf(
                None,
                format!(
                    "destination node '{}' ({}) has no input '{}'",
                    dst_base.name(),
                    dst_base.id(),
                    dst_port
                ),
            )
        })?;

        let edge = format!("{}.{} -> {}.{}", src_base.id(), src_port, dst_base.id(), dst_port);
        if output_def.exec && input_def.exec {
            return Err(RuntimeError::leaf(
                None,
                format!("both ports are execution ports ({})", edge),
            )
            .with_hint("the connections must go to the `executions` section of the graph file"));
        } else if output_def.exec {
            return Err(RuntimeError::leaf(
                None,
                format!(
                    "source port is an execution port, but destination port is a data port ({})",
                    edge
                ),
            )
            .with_hint("either the source port or the destination port must be changed to match the other"));
        } else if input_def.exec {
            return Err(RuntimeError::leaf(
                None,
                format!(
                    "destination port is an execution port, but source port is a data port ({})",
                    edge
                ),
            )
            .with_hint("either the source port or the destination port must be changed to match the other"));
        }

        let output_type = if output_def.array && output_index.is_none() {
            output_def.full_type()
        } else {
            output_def.port_type.clone()
        };
        let input_type = if input_def.array && input_index.is_none() {
            input_def.full_type()
        } else {
            input_def.port_type.clone()
        };

        if !ports_are_compatible(&PortType::data(&output_type), &PortType::data(&input_type)) {
            return Err(RuntimeError::leaf(
                None,
                format!(
                    "the ports between the node '{}'.'{}' and '{}'.'{}' are not compatible. ({}) ({} != {})",
                    src_base.name(),
                    output_def.name,
                    dst_base.name(),
                    input_def.name,
                    edge,
                    output_type,
                    input_type
                ),
            )
            .with_hint("open the file in the graph editor and fix the connection between the two nodes"));
        }
    }

    dst_inputs.set_connection(
        dst_port,
        DataSource {
            src: Arc::downgrade(src),
            src_output_id: src_port.to_string(),
            src_index: src_index.clone(),
        },
    );

    src_outputs.increment_connection_counter(src_port);
    if let Some(info) = &src_index {
        src_outputs.increment_connection_counter(&info.array_port_id);
    }
    Ok(())
}

async fn resolve_connected(
    node: &dyn Node,
    state: &Arc<ExecutionState>,
    input_id: &str,
    source: DataSource,
) -> Result<Value> {
    let src = source.src.upgrade().ok_or_else(|| {
        RuntimeError::leaf(
            Some(state),
            format!("source node of input '{}' no longer exists", input_id),
        )
        .with_hint(HINT_INTERNAL_ERROR)
    })?;

    let cache_port = match &source.src_index {
        Some(info) => info.index_port_id.as_str(),
        None => source.src_output_id.as_str(),
    };
    let cache_type = src.cache_type();
    let regard_cache = src.kind() == NodeKind::Regular && node.kind() != NodeKind::GroupInputs;

    if regard_cache {
        if let Some(value) = state.cached_output(src.base().cache_id(), cache_port, cache_type) {
            log::trace!("visit (cached) {}, execute: false", src.base().id());
            return Ok(value);
        }
    }

    let request_port = match &source.src_index {
        Some(info) => info.array_port_id.as_str(),
        None => source.src_output_id.as_str(),
    };

    state.push_visit(&src, false);
    let result = src.output_value(state, request_port).await;
    state.pop_visit();
    let mut value = result?;

    if let Some(info) = &source.src_index {
        let Value::Array(items) = value else {
            return Err(RuntimeError::leaf(
                Some(state),
                format!("output '{}' is not a slice", source.src_output_id),
            ));
        };
        if info.index < 0 {
            return Err(RuntimeError::leaf(
                Some(state),
                format!("index '{}' is < 0", info.index),
            ));
        }
        value = match items.get(info.index as usize) {
            Some(item) => item.clone(),
            None => Value::element_zero(&items),
        };
    }

    if regard_cache {
        state.cache_output(src.base().cache_id(), cache_port, value.clone(), cache_type);
    }
    Ok(value)
}

/// Resolve the raw value of an input.
///
/// `array_port` names the array port when `input_id` is one of its
/// sub-ports, so the array declaration supplies default and type.
pub fn input_value_raw<'a>(
    node: &'a dyn Node,
    state: &'a Arc<ExecutionState>,
    input_id: &'a str,
    array_port: Option<&'a str>,
) -> BoxFuture<'a, Result<Value>> {
    async move {
        let inputs = node.inputs().ok_or_else(|| {
            RuntimeError::leaf(
                Some(state),
                format!("node '{}' has no inputs", node.base().id()),
            )
        })?;
        let def = inputs.def(array_port.unwrap_or(input_id));

        let value = match inputs.data_source(input_id) {
            Some(source) => resolve_connected(node, state, input_id, source).await?,
            None => match (inputs.value(input_id).filter(|v| !v.is_null()), &def) {
                (Some(value), _) => value,
                (None, Some(def)) if def.default.is_some() => def.default_value().unwrap_or_default(),
                (None, Some(def)) if def.required => {
                    return Err(RuntimeError::no_input_value(
                        Some(state),
                        format!("no value for input '{}' ({})", def.name, input_id),
                    ));
                }
                (None, Some(def)) => match default_zero_value(&def.port_type) {
                    Some(zero) => return Ok(zero),
                    None => Value::Null,
                },
                (None, None) => Value::Null,
            },
        };

        if value.is_null() {
            let message = match &def {
                Some(def) => format!("no value for input '{}' ({})", def.name, input_id),
                None => format!("unknown input '{}'", input_id),
            };
            return Err(RuntimeError::no_input_value(Some(state), message));
        }

        let mut value = match value {
            Value::String(text) => evaluate(state, &text).await.map_err(|e| {
                RuntimeError::create(
                    Some(state),
                    Some(e),
                    format!("unable to evaluate expression in input '{}'", input_id),
                )
            })?,
            other => other,
        };

        let def = def.or_else(|| inputs.def(input_id));
        if let Some(def) = &def {
            if def.port_type == "option" {
                value = match value {
                    Value::String(s) => Value::String(s.trim_matches(&[' ', '\n', '\r'][..]).to_string()),
                    Value::Int(i) => {
                        let option = usize::try_from(i).ok().and_then(|i| def.options.get(i));
                        match option {
                            Some(option) => Value::String(option.value.clone()),
                            None => {
                                return Err(RuntimeError::leaf(
                                    Some(state),
                                    format!("option value out of range: {}", i),
                                ))
                            }
                        }
                    }
                    other => other,
                };
            }

            if def.exec {
                return Err(RuntimeError::leaf(
                    Some(state),
                    "internal error because a value was requested from an execution port",
                )
                .with_hint(HINT_INTERNAL_ERROR));
            }
        }

        Ok(value)
    }
    .boxed()
}

fn convert_input<T: FromValue + Default>(
    state: &Arc<ExecutionState>,
    input_id: &str,
    value: Value,
) -> Result<T> {
    if value.is_null() {
        return Ok(T::default());
    }
    let kind = value.kind_name();
    T::from_value(state, value).map_err(|e| {
        if T::UNWRAP_ERRORS {
            e
        } else {
            RuntimeError::create(
                Some(state),
                Some(e),
                format!(
                    "unable to convert '{}' to '{}' at input '{}'",
                    kind,
                    T::TYPE_NAME,
                    input_id
                ),
            )
        }
    })
}

/// Resolve an input and convert it into `T`.
///
/// Expressions that evaluate to null yield `T::default()`.
pub async fn input_value<T: FromValue + Default>(
    node: &dyn Node,
    state: &Arc<ExecutionState>,
    input_id: &str,
) -> Result<T> {
    let value = input_value_raw(node, state, input_id, None).await?;
    convert_input(state, input_id, value)
}

/// Resolve every sub-port of the array input `input_id`, in index order.
///
/// With `index` set, only that sub-port is resolved and the others are
/// left at their default. The result is padded to the declared
/// `array_initial_count`.
pub async fn input_array_value<T: FromValue + Default>(
    node: &dyn Node,
    state: &Arc<ExecutionState>,
    input_id: &str,
    index: Option<i64>,
) -> Result<Vec<T>> {
    let base = node.base();
    let inputs = node.inputs().ok_or_else(|| {
        RuntimeError::leaf(Some(state), format!("node '{}' has no inputs", base.id()))
    })?;

    let def = inputs.def(input_id).ok_or_else(|| {
        RuntimeError::leaf(
            Some(state),
            format!("no input definition for input '{}'", input_id),
        )
    })?;
    if !def.array {
        return Err(RuntimeError::leaf(
            Some(state),
            format!("input '{}' is not an array input", input_id),
        ));
    }

    let ports = inputs.index_ports_of(input_id);
    let mut values = Vec::with_capacity(ports.len());
    for port in ports {
        if index.is_some_and(|i| i != port.index) {
            values.push(T::default());
            continue;
        }

        let result = match input_value_raw(node, state, &port.index_port_id, Some(input_id)).await {
            Ok(value) => convert_input::<T>(state, &port.index_port_id, value),
            Err(e) => Err(e),
        };
        let value = result.map_err(|e| {
            RuntimeError::create(
                Some(state),
                Some(e),
                format!(
                    "error when requesting input from '{}' ({}) {} at **{}** input port",
                    base.name(),
                    base.id(),
                    input_id,
                    ordinal(port.index)
                ),
            )
        })?;
        values.push(value);
    }

    if let Some(count) = def.array_initial_count {
        while values.len() < count {
            values.push(T::default());
        }
    }

    Ok(values)
}

/// `first`, `1st`, `2nd`, `3rd`, `4th`, ..., `11th`, ...
pub fn ordinal(i: i64) -> String {
    if i == 0 {
        return "first".to_string();
    }
    let suffix = match (i % 100, i % 10) {
        (11..=13, _) => "th",
        (_, 1) => "st",
        (_, 2) => "nd",
        (_, 3) => "rd",
        _ => "th",
    };
    format!("{}{}", i, suffix)
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::definition::OutputDefinition;
    use crate::node::{NodeBase, Outputs};
    use crate::state::{CacheType, StateOptions};

    /// Data node counting how often its value is computed
    struct Source {
        base: NodeBase,
        outputs: Outputs,
        value: Value,
        calls: parking_lot::Mutex<u32>,
    }

    #[async_trait]
    impl Node for Source {
        fn base(&self) -> &NodeBase {
            &self.base
        }

        fn outputs(&self) -> Option<&Outputs> {
            Some(&self.outputs)
        }

        async fn output_value(&self, _state: &Arc<ExecutionState>, _output_id: &str) -> Result<Value> {
            *self.calls.lock() += 1;
            Ok(self.value.clone())
        }
    }

    struct Sink {
        base: NodeBase,
        inputs: Inputs,
    }

    impl Node for Sink {
        fn base(&self) -> &NodeBase {
            &self.base
        }

        fn inputs(&self) -> Option<&Inputs> {
            Some(&self.inputs)
        }
    }

    fn source(port_type: &str, array: bool, value: Value) -> Arc<Source> {
        let mut def = OutputDefinition::new("Out", port_type, 0);
        def.array = array;
        let mut defs = BTreeMap::new();
        defs.insert("out".to_string(), def);
        Arc::new(Source {
            base: NodeBase::new("src", "src", "core/src@v1", "Src", None),
            outputs: Outputs::with_defs(defs),
            value,
            calls: parking_lot::Mutex::new(0),
        })
    }

    fn sink(defs: Vec<(&str, InputDefinition)>) -> Arc<Sink> {
        Arc::new(Sink {
            base: NodeBase::new("dst", "dst", "core/dst@v1", "Dst", None),
            inputs: Inputs::with_defs(defs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()),
        })
    }

    fn state() -> Arc<ExecutionState> {
        ExecutionState::new(StateOptions::default())
    }

    #[tokio::test]
    async fn test_connected_value_is_cached() {
        let src = source("number", false, Value::Int(7));
        let dst = sink(vec![("n", InputDefinition::new("N", "number", 0))]);
        let src_node: Arc<dyn Node> = src.clone();
        let dst_node: Arc<dyn Node> = dst.clone();
        connect_data_port(&src_node, "out", &dst_node, "n", false).unwrap();
        assert_eq!(src.outputs.connection_count("out"), 1);

        let state = state();
        let a: i64 = input_value(dst.as_ref(), &state, "n").await.unwrap();
        let b: i64 = input_value(dst.as_ref(), &state, "n").await.unwrap();
        assert_eq!((a, b), (7, 7));
        assert_eq!(*src.calls.lock(), 1);
        assert!(state
            .cached_output(src.base.cache_id(), "out", CacheType::Ephemeral)
            .is_some());

        state.clear_ephemeral();
        let _: i64 = input_value(dst.as_ref(), &state, "n").await.unwrap();
        assert_eq!(*src.calls.lock(), 2);
    }

    #[tokio::test]
    async fn test_literal_default_and_zero() {
        let dst = sink(vec![
            ("a", InputDefinition::new("A", "string", 0)),
            ("b", InputDefinition::new("B", "number", 1).with_default(serde_json::json!(5))),
            ("c", InputDefinition::new("C", "bool", 2)),
            ("d", InputDefinition::new("D", "string", 3).required()),
        ]);
        dst.inputs.set_value("a", Value::from("hi"));
        let state = state();

        let a: String = input_value(dst.as_ref(), &state, "a").await.unwrap();
        let b: i64 = input_value(dst.as_ref(), &state, "b").await.unwrap();
        let c: bool = input_value(dst.as_ref(), &state, "c").await.unwrap();
        assert_eq!((a.as_str(), b, c), ("hi", 5, false));

        let err = input_value::<String>(dst.as_ref(), &state, "d").await.unwrap_err();
        assert!(err.is_no_input_value());
        assert_eq!(err.to_string(), "no value for input 'D' (d)");

        let err = input_value::<String>(dst.as_ref(), &state, "zzz").await.unwrap_err();
        assert_eq!(err.to_string(), "unknown input 'zzz'");
    }

    #[tokio::test]
    async fn test_conversion_error_names_the_input() {
        let dst = sink(vec![("n", InputDefinition::new("N", "number", 0))]);
        dst.inputs.set_value("n", Value::from("abc"));
        let err = input_value::<i64>(dst.as_ref(), &state(), "n").await.unwrap_err();
        assert!(err
            .to_string()
            .starts_with("unable to convert 'string' to 'i64' at input 'n'"));
    }

    #[tokio::test]
    async fn test_option_input() {
        let dst = sink(vec![(
            "mode",
            InputDefinition::new("Mode", "option", 0)
                .with_default(serde_json::json!("fast"))
                .with_options(&[("Fast", "fast"), ("Slow", "slow")]),
        )]);
        let state = state();
        dst.inputs.set_value("mode", Value::Int(1));
        let mode: String = input_value(dst.as_ref(), &state, "mode").await.unwrap();
        assert_eq!(mode, "slow");

        dst.inputs.set_value("mode", Value::Int(5));
        let err = input_value::<String>(dst.as_ref(), &state, "mode").await.unwrap_err();
        assert_eq!(err.to_string(), "option value out of range: 5");

        dst.inputs.set_value("mode", Value::from(" fast\n"));
        let mode: String = input_value(dst.as_ref(), &state, "mode").await.unwrap();
        assert_eq!(mode, "fast");
    }

    #[tokio::test]
    async fn test_array_input_order_and_padding() {
        let dst = sink(vec![(
            "values",
            InputDefinition::new("Values", "string", 0)
                .array()
                .array_initial_count(4),
        )]);
        dst.inputs.add_sub_input("values[1]").unwrap();
        dst.inputs.add_sub_input("values[0]").unwrap();
        dst.inputs.set_value("values[0]", Value::from("a"));
        dst.inputs.set_value("values[1]", Value::from("b"));

        let state = state();
        let values: Vec<String> = input_array_value(dst.as_ref(), &state, "values", None)
            .await
            .unwrap();
        assert_eq!(values, vec!["a", "b", "", ""]);

        let only: Vec<String> = input_array_value(dst.as_ref(), &state, "values", Some(1))
            .await
            .unwrap();
        assert_eq!(only[..2], ["".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn test_array_input_error_names_ordinal() {
        let dst = sink(vec![("nums", InputDefinition::new("Nums", "number", 0).array())]);
        dst.inputs.add_sub_input("nums[0]").unwrap();
        dst.inputs.add_sub_input("nums[2]").unwrap();
        dst.inputs.set_value("nums[0]", Value::Int(1));
        dst.inputs.set_value("nums[2]", Value::from("x"));

        let err = input_array_value::<i64>(dst.as_ref(), &state(), "nums", None)
            .await
            .unwrap_err();
        assert!(err
            .to_string()
            .starts_with("error when requesting input from 'Dst' (dst) nums at **2nd** input port"));

        let err = input_array_value::<i64>(dst.as_ref(), &state(), "missing", None)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "no input definition for input 'missing'");
    }

    #[tokio::test]
    async fn test_index_sub_port_of_source() {
        let src = source("string", true, Value::from(vec!["x".to_string(), "y".to_string()]));
        let dst = sink(vec![
            ("first", InputDefinition::new("First", "string", 0)),
            ("far", InputDefinition::new("Far", "string", 1)),
        ]);
        let src_node: Arc<dyn Node> = src.clone();
        let dst_node: Arc<dyn Node> = dst.clone();
        connect_data_port(&src_node, "out[1]", &dst_node, "first", false).unwrap();
        connect_data_port(&src_node, "out[9]", &dst_node, "far", false).unwrap();
        assert_eq!(src.outputs.connection_count("out"), 2);

        let state = state();
        let first: String = input_value(dst.as_ref(), &state, "first").await.unwrap();
        let far: String = input_value(dst.as_ref(), &state, "far").await.unwrap();
        assert_eq!(first, "y");
        assert_eq!(far, "");
    }

    #[test]
    fn test_connect_rejects_incompatible_ports() {
        let src: Arc<dyn Node> = source("stream", false, Value::Null);
        let dst: Arc<dyn Node> = sink(vec![("n", InputDefinition::new("N", "number", 0))]);
        let err = connect_data_port(&src, "out", &dst, "n", false).unwrap_err();
        assert_eq!(
            err.to_string(),
            "the ports between the node 'Src'.'Out' and 'Dst'.'N' are not compatible. (src.out -> dst.n) (stream != number)"
        );
        assert!(crate::error::error_hint(&err).unwrap().starts_with("open the file"));

        connect_data_port(&src, "out", &dst, "n", true).unwrap();
        assert!(dst.inputs().unwrap().is_connected("n"));
    }

    #[test]
    fn test_sub_input_errors() {
        let dst = sink(vec![("n", InputDefinition::new("N", "number", 0))]);
        assert_eq!(
            dst.inputs.add_sub_input("n").unwrap_err().to_string(),
            "port 'n' is not a sub port"
        );
        assert_eq!(
            dst.inputs.add_sub_input("n[0]").unwrap_err().to_string(),
            "port 'n' is not an array input"
        );
        assert_eq!(
            dst.inputs.add_sub_input("m[0]").unwrap_err().to_string(),
            "port 'm' does not exist"
        );
    }

    #[test]
    fn test_ordinal() {
        assert_eq!(ordinal(0), "first");
        assert_eq!(ordinal(1), "1st");
        assert_eq!(ordinal(2), "2nd");
        assert_eq!(ordinal(3), "3rd");
        assert_eq!(ordinal(4), "4th");
        assert_eq!(ordinal(11), "11th");
        assert_eq!(ordinal(22), "22nd");
        assert_eq!(ordinal(113), "113th");
    }
}
