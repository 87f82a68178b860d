//! Output ports
//!
//! Execution nodes publish their outputs into the permanent cache of the
//! current execution state. A value is only kept when some input is wired to
//! the output, or when the run is a debug session and the value has to be
//! shown to the user.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;

use super::inputs::IndexPortInfo;
use super::{Node, NodeBase};
use crate::definition::{AssignmentMode, OutputDefinition};
use crate::error::{Result, RuntimeError};
use crate::state::{CacheType, ExecutionState};
use crate::types::parse_index_port;
use crate::value::Value;

/// Options for [`Outputs::set_value`]
#[derive(Debug, Clone, Copy, Default)]
pub struct SetOutputOpts {
    /// Silently ignore unknown ports
    pub not_exists_is_no_error: bool,
}

#[derive(Default)]
struct OutputsInner {
    defs: BTreeMap<String, OutputDefinition>,
    index_ports: HashMap<String, IndexPortInfo>,
    counters: HashMap<String, u64>,
}

/// Output port capability
#[derive(Default)]
pub struct Outputs {
    inner: RwLock<OutputsInner>,
}

impl Outputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defs(defs: BTreeMap<String, OutputDefinition>) -> Self {
        let outputs = Self::new();
        outputs.set_defs(defs, AssignmentMode::Replace);
        outputs
    }

    pub fn set_defs(&self, defs: BTreeMap<String, OutputDefinition>, mode: AssignmentMode) {
        let mut inner = self.inner.write();
        match mode {
            AssignmentMode::Replace => inner.defs = defs,
            AssignmentMode::Merge => inner.defs.extend(defs),
        }
    }

    pub fn defs(&self) -> BTreeMap<String, OutputDefinition> {
        self.inner.read().defs.clone()
    }

    pub fn def(&self, port: &str) -> Option<OutputDefinition> {
        self.inner.read().defs.get(port).cloned()
    }

    /// Resolve a declared port or a registered `name[k]` sub-port
    pub fn def_by_port_id(&self, port: &str) -> Option<(OutputDefinition, Option<IndexPortInfo>)> {
        let inner = self.inner.read();
        match inner.index_ports.get(port) {
            Some(info) => inner
                .defs
                .get(&info.array_port_id)
                .map(|def| (def.clone(), Some(info.clone()))),
            None => inner.defs.get(port).map(|def| (def.clone(), None)),
        }
    }

    /// Register the sub-port `name[k]` of the array output `name`
    pub fn add_sub_output(&self, sub_port_id: &str) -> Result<()> {
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
                    format!("port '{}' is not an array port", array_port_id),
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

    pub fn increment_connection_counter(&self, port: &str) {
        *self
            .inner
            .write()
            .counters
            .entry(port.to_string())
            .or_insert(0) += 1;
    }

    pub fn connection_count(&self, port: &str) -> u64 {
        self.inner.read().counters.get(port).copied().unwrap_or(0)
    }

    /// Validate and publish an output value.
    ///
    /// `port` may be a declared output or a sub-port of an array output, in
    /// which case the value is checked against the element type.
    pub fn set_value(
        &self,
        owner: &NodeBase,
        state: &ExecutionState,
        port: &str,
        value: Value,
        opts: SetOutputOpts,
    ) -> Result<()> {
        let expected = match self.def(port) {
            Some(def) => Some((def.name.clone(), def.full_type())),
            None => parse_index_port(port)
                .and_then(|(array_port, _)| self.def(&array_port))
                .map(|def| (def.name.clone(), def.port_type.clone())),
        };

        let Some((name, expected_type)) = expected else {
            if opts.not_exists_is_no_error {
                return Ok(());
            }
            return Err(RuntimeError::leaf(
                Some(state),
                format!("failed to set a value to an unknown port '{}'", port),
            ));
        };

        if !is_value_valid_for_output(&value, &expected_type) {
            return Err(RuntimeError::leaf(
                Some(state),
                format!(
                    "output '{}' ({}): expected {}, but got {}",
                    name,
                    port,
                    expected_type,
                    value.kind_name()
                ),
            ));
        }

        if self.connection_count(port) == 0 && !state.is_debug_session() {
            return Ok(());
        }

        state.cache_output(owner.cache_id(), port, value, CacheType::Permanent);
        Ok(())
    }
}

/// Publish an output value of `node`
pub fn set_output_value(
    node: &dyn Node,
    state: &Arc<ExecutionState>,
    port: &str,
    value: Value,
    opts: SetOutputOpts,
) -> Result<()> {
    match node.outputs() {
        Some(outputs) => outputs.set_value(node.base(), state, port, value, opts),
        None => Err(RuntimeError::leaf(
            Some(state),
            format!("node '{}' has no outputs", node.base().id()),
        )),
    }
}

/// Whether `value` may be published on an output of `expected_type`
pub fn is_value_valid_for_output(value: &Value, expected_type: &str) -> bool {
    if value.is_null() {
        return false;
    }

    match expected_type {
        "any" | "unknown" => true,
        "iterable" => matches!(value, Value::Array(_) | Value::Map(_) | Value::String(_)),
        "string" => matches!(value, Value::String(_)),
        "number" => matches!(value, Value::Int(_) | Value::Float(_)),
        "bool" => matches!(value, Value::Bool(_)),
        "stream" => matches!(value, Value::String(_) | Value::Bytes(_) | Value::Stream(_)),
        "storage-provider" | "credentials" | "git-repo" => {
            matches!(value, Value::Handle(h) if h.port_type() == expected_type)
        }
        "[]any" | "[]unknown" => matches!(value, Value::Array(_)),
        other => match (other.strip_prefix("[]"), value) {
            (Some(elem_type), Value::Array(items)) => items
                .iter()
                .all(|item| is_value_valid_for_output(item, elem_type)),
            _ => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::StateOptions;

    fn outputs() -> Outputs {
        let mut defs = BTreeMap::new();
        defs.insert("result".to_string(), OutputDefinition::new("Result", "number", 0));
        defs.insert("items".to_string(), OutputDefinition::new("Items", "string", 1).array());
        Outputs::with_defs(defs)
    }

    fn base() -> NodeBase {
        NodeBase::new("n", "n", "core/test@v1", "Test", None)
    }

    #[test]
    fn test_validation_table() {
        assert!(is_value_valid_for_output(&Value::Int(1), "number"));
        assert!(is_value_valid_for_output(&Value::Float(1.5), "number"));
        assert!(!is_value_valid_for_output(&Value::from("1"), "number"));
        assert!(is_value_valid_for_output(&Value::from("x"), "stream"));
        assert!(is_value_valid_for_output(
            &Value::Array(vec![Value::from("a")]),
            "[]string"
        ));
        assert!(!is_value_valid_for_output(
            &Value::Array(vec![Value::Int(1)]),
            "[]string"
        ));
        assert!(!is_value_valid_for_output(&Value::Null, "any"));
        assert!(is_value_valid_for_output(&Value::Bool(true), "unknown"));
    }

    #[test]
    fn test_unconnected_value_is_discarded() {
        let outputs = outputs();
        let base = base();
        let state = ExecutionState::new(StateOptions::default());

        outputs
            .set_value(&base, &state, "result", Value::Int(1), SetOutputOpts::default())
            .unwrap();
        assert!(state
            .cached_output(base.cache_id(), "result", CacheType::Permanent)
            .is_none());

        outputs.increment_connection_counter("result");
        outputs
            .set_value(&base, &state, "result", Value::Int(2), SetOutputOpts::default())
            .unwrap();
        assert_eq!(
            state.cached_output(base.cache_id(), "result", CacheType::Permanent),
            Some(Value::Int(2))
        );
    }

    #[test]
    fn test_debug_session_keeps_values() {
        let outputs = outputs();
        let base = base();
        let state = ExecutionState::new(StateOptions {
            is_debug_session: true,
            ..Default::default()
        });
        outputs
            .set_value(&base, &state, "result", Value::Int(3), SetOutputOpts::default())
            .unwrap();
        assert!(state
            .cached_output(base.cache_id(), "result", CacheType::Permanent)
            .is_some());
    }

    #[test]
    fn test_type_mismatch_and_unknown_port() {
        let outputs = outputs();
        let base = base();
        let state = ExecutionState::new(StateOptions::default());

        let err = outputs
            .set_value(&base, &state, "result", Value::from("x"), SetOutputOpts::default())
            .unwrap_err();
        assert_eq!(err.to_string(), "output 'Result' (result): expected number, but got string");

        let err = outputs
            .set_value(&base, &state, "nope", Value::Int(1), SetOutputOpts::default())
            .unwrap_err();
        assert_eq!(err.to_string(), "failed to set a value to an unknown port 'nope'");

        outputs
            .set_value(
                &base,
                &state,
                "nope",
                Value::Int(1),
                SetOutputOpts {
                    not_exists_is_no_error: true,
                },
            )
            .unwrap();
    }

    #[test]
    fn test_sub_ports() {
        let outputs = outputs();
        let base = base();
        let state = ExecutionState::new(StateOptions::default());

        outputs.add_sub_output("items[1]").unwrap();
        outputs.add_sub_output("items[0]").unwrap();
        let ports = outputs.index_ports_of("items");
        assert_eq!(ports[0].index, 0);
        assert_eq!(ports[1].index_port_id, "items[1]");

        let (def, info) = outputs.def_by_port_id("items[1]").unwrap();
        assert_eq!(def.name, "Items");
        assert_eq!(info.unwrap().index, 1);

        assert!(outputs.add_sub_output("result[0]").is_err());
        assert!(outputs.add_sub_output("items").is_err());

        outputs.increment_connection_counter("items[0]");
        outputs
            .set_value(&base, &state, "items[0]", Value::from("a"), SetOutputOpts::default())
            .unwrap();
        assert_eq!(
            state.cached_output(base.cache_id(), "items[0]", CacheType::Permanent),
            Some(Value::from("a"))
        );
    }
}
