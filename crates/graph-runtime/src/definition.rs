//! Port and node type definitions
//!
//! A [`NodeTypeDefinition`] is the declarative description of a node type:
//! identity, category and the input/output port maps. Built-in nodes build
//! theirs in code through the builder methods; group nodes read theirs from
//! the `inputs`/`outputs` sections of the embedded graph document, which is
//! why every definition type is also `Deserialize`.
//!
//! ```ignore
//! NodeTypeDefinition::new("core/branch", 1, "Branch")
//!     .category("control")
//!     .input("exec", InputDefinition::exec("Exec", 0))
//!     .input("condition", InputDefinition::new("Condition", "bool", 1))
//!     .output("exec-then", OutputDefinition::exec("Then", 0))
//!     .output("exec-otherwise", OutputDefinition::exec("Otherwise", 1));
//! ```

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::{Result, RuntimeError};
use crate::types::EXEC_PORT_RE;
use crate::value::Value;

/// How factory-provided port definitions are combined with others
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentMode {
    /// Replace the existing definitions entirely
    Replace,
    /// Insert on top of the existing definitions
    Merge,
}

/// One entry of an `option` input
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputOption {
    pub name: String,
    pub value: String,
}

/// Definition of an input port
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub port_type: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub desc: String,
    pub index: i64,
    pub array: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub array_initial_count: Option<usize>,
    pub exec: bool,
    pub hide_socket: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial: Option<serde_json::Value>,
    pub required: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<InputOption>,
    pub multiline: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub hint: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub array_hints: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<f64>,
}

impl InputDefinition {
    /// Data input of the given semantic type
    pub fn new(name: impl Into<String>, port_type: impl Into<String>, index: i64) -> Self {
        Self {
            name: name.into(),
            port_type: port_type.into(),
            index,
            ..Default::default()
        }
    }

    /// Execution input
    pub fn exec(name: impl Into<String>, index: i64) -> Self {
        Self {
            name: name.into(),
            index,
            exec: true,
            ..Default::default()
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Declare the port as an array of its type, with `name[k]` sub-ports
    pub fn array(mut self) -> Self {
        self.array = true;
        self
    }

    /// Minimum length of the resolved array value
    pub fn array_initial_count(mut self, count: usize) -> Self {
        self.array_initial_count = Some(count);
        self
    }

    pub fn with_default(mut self, default: serde_json::Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_options(mut self, options: &[(&str, &str)]) -> Self {
        self.options = options
            .iter()
            .map(|(name, value)| InputOption {
                name: name.to_string(),
                value: value.to_string(),
            })
            .collect();
        self
    }

    pub fn description(mut self, desc: impl Into<String>) -> Self {
        self.desc = desc.into();
        self
    }

    /// Default as a runtime value
    pub fn default_value(&self) -> Option<Value> {
        self.default.clone().map(Value::from_json)
    }

    /// Declared type including the array prefix
    pub fn full_type(&self) -> String {
        if self.array {
            format!("[]{}", self.port_type)
        } else {
            self.port_type.clone()
        }
    }
}

/// Definition of an output port
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub port_type: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub desc: String,
    pub index: i64,
    pub array: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub array_initial_count: Option<usize>,
    pub exec: bool,
}

impl OutputDefinition {
    /// Data output of the given semantic type
    pub fn new(name: impl Into<String>, port_type: impl Into<String>, index: i64) -> Self {
        Self {
            name: name.into(),
            port_type: port_type.into(),
            index,
            ..Default::default()
        }
    }

    /// Execution output
    pub fn exec(name: impl Into<String>, index: i64) -> Self {
        Self {
            name: name.into(),
            index,
            exec: true,
            ..Default::default()
        }
    }

    pub fn array(mut self) -> Self {
        self.array = true;
        self
    }

    /// Declared type including the array prefix
    pub fn full_type(&self) -> String {
        if self.array {
            format!("[]{}", self.port_type)
        } else {
            self.port_type.clone()
        }
    }
}

impl From<&InputDefinition> for OutputDefinition {
    fn from(def: &InputDefinition) -> Self {
        Self {
            name: def.name.clone(),
            port_type: def.port_type.clone(),
            desc: def.desc.clone(),
            index: def.index,
            array: def.array,
            array_initial_count: def.array_initial_count,
            exec: def.exec,
        }
    }
}

impl From<&OutputDefinition> for InputDefinition {
    fn from(def: &OutputDefinition) -> Self {
        Self {
            name: def.name.clone(),
            port_type: def.port_type.clone(),
            desc: def.desc.clone(),
            index: def.index,
            array: def.array,
            array_initial_count: def.array_initial_count,
            exec: def.exec,
            ..Default::default()
        }
    }
}

/// Definition of a node type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeTypeDefinition {
    /// Namespaced id without version, e.g. `core/for-loop`
    pub id: String,
    pub version: u32,
    /// Human readable name, must start with an upper case letter
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub short_desc: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub category: String,
    /// Whether the node can start a run
    pub entry: bool,
    pub inputs: BTreeMap<String, InputDefinition>,
    pub outputs: BTreeMap<String, OutputDefinition>,
}

impl NodeTypeDefinition {
    pub fn new(id: impl Into<String>, version: u32, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version,
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn short_desc(mut self, desc: impl Into<String>) -> Self {
        self.short_desc = desc.into();
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    /// Mark the node type as an entry node
    pub fn entry(mut self) -> Self {
        self.entry = true;
        self
    }

    pub fn input(mut self, port_id: impl Into<String>, def: InputDefinition) -> Self {
        self.inputs.insert(port_id.into(), def);
        self
    }

    pub fn output(mut self, port_id: impl Into<String>, def: OutputDefinition) -> Self {
        self.outputs.insert(port_id.into(), def);
        self
    }

    /// Registry key, `<id>@v<version>`
    pub fn key(&self) -> String {
        format!("{}@v{}", self.id, self.version)
    }

    fn check_identity(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(RuntimeError::leaf(None, "id is missing"));
        }
        if self.name.is_empty() {
            return Err(RuntimeError::leaf(None, format!("name is missing in {}", self.id)));
        }
        if self.version == 0 {
            return Err(RuntimeError::leaf(None, format!("version is missing in {}", self.id)));
        }
        if !self.name.chars().next().is_some_and(char::is_uppercase) {
            return Err(RuntimeError::leaf(
                None,
                format!("name must start with an upper case letter in {}", self.id),
            ));
        }
        Ok(())
    }

    /// Apply the registration rules.
    ///
    /// Single execution inputs are forced to `required`; everything else is
    /// checked and the first violation is returned.
    pub fn validate(&mut self) -> Result<()> {
        if self.id.contains('_') {
            return Err(RuntimeError::leaf(
                None,
                format!("id '{}' must not contain underscores", self.id),
            ));
        }

        self.check_identity()?;

        let exec_count = self.inputs.values().filter(|d| d.exec).count();
        let required_exec = self.inputs.values().any(|d| d.exec && d.required);
        if exec_count <= 1 {
            for def in self.inputs.values_mut().filter(|d| d.exec) {
                def.required = true;
            }
        } else if !required_exec {
            return Err(RuntimeError::leaf(
                None,
                format!(
                    "node '{}' has multiple execution inputs but none is required, please mark at least one as required",
                    self.id
                ),
            ));
        }

        let mut input_indexes: HashMap<i64, &str> = HashMap::new();
        for (input_id, def) in &self.inputs {
            if let Some(prev) = input_indexes.get(&def.index) {
                return Err(RuntimeError::leaf(
                    None,
                    format!("duplicate input index in {} at '{}' / '{}'", self.name, input_id, prev),
                ));
            }

            if !def.exec
                && def.required
                && (def.port_type == "number" || def.port_type.starts_with("[]") || def.array)
            {
                return Err(RuntimeError::leaf(
                    None,
                    format!(
                        "the following input '{}.{}' cannot be marked as required. Please remove the required flag.",
                        self.name, input_id
                    ),
                ));
            }

            validate_port_id(input_id, def.exec)
                .map_err(|e| e.wrap(None, format!("input '{}' is invalid", input_id)))?;

            input_indexes.insert(def.index, input_id);

            if def.required && def.default.is_some() {
                return Err(RuntimeError::leaf(
                    None,
                    format!("input '{}' is flagged as required but has a default value", input_id),
                ));
            }

            match def.port_type.as_str() {
                "boolean" => {
                    return Err(RuntimeError::leaf(
                        None,
                        format!("input '{}' has type 'boolean', use 'bool' instead", input_id),
                    ));
                }
                "option" => validate_options(input_id, def)?,
                _ => {}
            }
        }

        let mut output_indexes: HashMap<i64, &str> = HashMap::new();
        for (output_id, def) in &self.outputs {
            if let Some(prev) = output_indexes.get(&def.index) {
                return Err(RuntimeError::leaf(
                    None,
                    format!("duplicate output index in {} at '{}' / '{}'", self.name, output_id, prev),
                ));
            }
            output_indexes.insert(def.index, output_id);

            validate_port_id(output_id, def.exec)
                .map_err(|e| e.wrap(None, format!("output '{}' is invalid", output_id)))?;

            match def.port_type.as_str() {
                "indexable" | "iterable" => {
                    return Err(RuntimeError::leaf(
                        None,
                        format!(
                            "output cannot be of type '{}', use 'unknown' or use the correct array type (e.g. []string) instead",
                            def.port_type
                        ),
                    ));
                }
                "any" => {
                    return Err(RuntimeError::leaf(
                        None,
                        "output cannot be of type 'any', use 'unknown' instead",
                    ));
                }
                _ => {}
            }
        }

        Ok(())
    }
}

fn validate_options(input_id: &str, def: &InputDefinition) -> Result<()> {
    if def.default.is_none() {
        return Err(RuntimeError::leaf(
            None,
            format!("input '{}' must have a default value", input_id),
        ));
    }
    for option in &def.options {
        let message = if option.name.is_empty() {
            "option name is missing in input"
        } else if option.value.is_empty() {
            "option value is missing in input"
        } else if option.value.to_lowercase() != option.value {
            "option value must be lowercase in input"
        } else {
            continue;
        };
        return Err(RuntimeError::leaf(None, format!("{} '{}'", message, input_id)));
    }
    Ok(())
}

/// Check a port id against the naming rules for data and execution ports
pub fn validate_port_id(port_id: &str, exec: bool) -> Result<()> {
    if port_id.is_empty() {
        return Err(RuntimeError::leaf(None, "port id is missing"));
    }

    if exec {
        let caps = EXEC_PORT_RE.captures(port_id).ok_or_else(|| {
            RuntimeError::leaf(
                None,
                format!(
                    "port '{}' is flagged as exec but does not match '{}'",
                    port_id,
                    EXEC_PORT_RE.as_str()
                ),
            )
        })?;
        if caps.get(2).is_some_and(|m| m.as_str().contains('-')) {
            return Err(RuntimeError::leaf(
                None,
                format!("execution port '{}' must not contain hyphens", port_id),
            ));
        }
    } else if port_id.starts_with("exec-") {
        return Err(RuntimeError::leaf(
            None,
            format!("port '{}' starts with 'exec-' but is not flagged as exec", port_id),
        ));
    } else if port_id.contains('-') {
        return Err(RuntimeError::leaf(
            None,
            format!("port '{}' must not contain hyphens", port_id),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> NodeTypeDefinition {
        NodeTypeDefinition::new("core/test-node", 1, "Test")
            .input("exec", InputDefinition::exec("Exec", 0))
            .output("exec", OutputDefinition::exec("Exec", 0))
    }

    fn err(def: NodeTypeDefinition) -> String {
        let mut def = def;
        def.validate().unwrap_err().to_string()
    }

    #[test]
    fn test_single_exec_input_becomes_required() {
        let mut def = base();
        def.validate().unwrap();
        assert!(def.inputs["exec"].required);
        assert_eq!(def.key(), "core/test-node@v1");
    }

    #[test]
    fn test_identity_rules() {
        assert_eq!(
            err(NodeTypeDefinition::new("core/bad_id", 1, "Bad")),
            "id 'core/bad_id' must not contain underscores"
        );
        assert_eq!(
            err(NodeTypeDefinition::new("core/x", 1, "lower")),
            "name must start with an upper case letter in core/x"
        );
        assert_eq!(err(NodeTypeDefinition::new("core/x", 0, "X")), "version is missing in core/x");
    }

    #[test]
    fn test_multiple_exec_inputs_need_a_required_one() {
        let def = base().input("exec-reset", InputDefinition::exec("Reset", 1));
        assert!(err(def).contains("has multiple execution inputs but none is required"));

        let mut def = base()
            .input("exec-reset", InputDefinition::exec("Reset", 1))
            .input("exec", InputDefinition::exec("Exec", 0).required());
        def.validate().unwrap();
        assert!(!def.inputs["exec-reset"].required);
    }

    #[test]
    fn test_duplicate_index() {
        let def = base()
            .input("a", InputDefinition::new("A", "string", 1))
            .input("b", InputDefinition::new("B", "string", 1));
        assert_eq!(err(def), "duplicate input index in Test at 'b' / 'a'");
    }

    #[test]
    fn test_required_restrictions() {
        let def = base().input("count", InputDefinition::new("Count", "number", 1).required());
        assert!(err(def).starts_with("the following input 'Test.count' cannot be marked as required"));

        let def = base().input(
            "name",
            InputDefinition::new("Name", "string", 1)
                .required()
                .with_default(serde_json::json!("x")),
        );
        assert_eq!(err(def), "input 'name' is flagged as required but has a default value");
    }

    #[test]
    fn test_port_id_rules() {
        assert!(validate_port_id("exec-body", true).is_ok());
        assert!(validate_port_id("exec-on-error", true).is_err());
        assert!(validate_port_id("body", true).is_err());
        assert!(validate_port_id("exec-body", false).is_err());
        assert!(validate_port_id("first-index", false).is_err());
        assert!(validate_port_id("first_index", false).is_ok());

        let def = base().input("bad-port", InputDefinition::new("Bad", "string", 1));
        assert_eq!(err(def), "input 'bad-port' is invalid\n ↳ port 'bad-port' must not contain hyphens");
    }

    #[test]
    fn test_option_inputs() {
        let def = base().input("mode", InputDefinition::new("Mode", "option", 1));
        assert_eq!(err(def), "input 'mode' must have a default value");

        let def = base().input(
            "mode",
            InputDefinition::new("Mode", "option", 1)
                .with_default(serde_json::json!("fast"))
                .with_options(&[("Fast", "Fast")]),
        );
        assert_eq!(err(def), "option value must be lowercase in input 'mode'");
    }

    #[test]
    fn test_output_type_rules() {
        let def = base().output("items", OutputDefinition::new("Items", "iterable", 1));
        assert!(err(def).starts_with("output cannot be of type 'iterable'"));

        let def = base().output("value", OutputDefinition::new("Value", "any", 1));
        assert_eq!(err(def), "output cannot be of type 'any', use 'unknown' instead");
    }

    #[test]
    fn test_deserialize_graph_port() {
        let def: InputDefinition = serde_json::from_value(serde_json::json!({
            "name": "X",
            "type": "number",
            "index": 0,
            "default": 3
        }))
        .unwrap();
        assert_eq!(def.port_type, "number");
        assert_eq!(def.default_value(), Some(Value::Int(3)));
        assert!(!def.exec);
    }
}
