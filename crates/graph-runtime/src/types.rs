//! Port types and the compatibility relation between them
//!
//! Ports declare a semantic type string: `bool`, `number`, `string`,
//! `secret`, `stream`, `iterable`, `indexable`, `option`, `storage-provider`,
//! `credentials`, `git-repo`, `any`, `unknown`, or any of those prefixed
//! with `[]`. Execution ports carry no data and only connect to each other.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::value::Value;

/// Matches index sub-ports such as `inputs[3]`
pub static INDEX_PORT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([\w-]+)\[([0-9]+)\]$").expect("valid index port pattern"));

/// Valid execution port ids: `exec`, `exec-body`, `exec-completed`, ...
pub static EXEC_PORT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^exec(-([\w-]+))?$").expect("valid exec port pattern"));

/// Node type ids without a namespace, e.g. `print@v1`
static SHORT_NODE_TYPE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\w-]+@v[0-9]+$").expect("valid node type pattern"));

/// Pairs of source type to additional target types a data edge may connect
const OUTPUT_TO_INPUT_CAST: &[(&str, &[&str])] = &[
    ("bool", &["number", "string"]),
    (
        "string",
        &["number", "bool", "stream", "indexable", "iterable", "option", "secret"],
    ),
    ("number", &["bool", "string", "option"]),
    ("secret", &["string"]),
    ("stream", &["string", "iterable"]),
    ("option", &["number", "string"]),
];

/// Type of one end of an edge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortType {
    pub port_type: String,
    pub exec: bool,
}

impl PortType {
    pub fn data(port_type: impl Into<String>) -> Self {
        Self {
            port_type: port_type.into(),
            exec: false,
        }
    }

    pub fn exec() -> Self {
        Self {
            port_type: String::new(),
            exec: true,
        }
    }
}

fn cast_targets(source: &str) -> &'static [&'static str] {
    OUTPUT_TO_INPUT_CAST
        .iter()
        .find(|(s, _)| *s == source)
        .map(|(_, targets)| *targets)
        .unwrap_or(&[])
}

/// Whether a data or execution edge from `source` to `target` is allowed
pub fn ports_are_compatible(source: &PortType, target: &PortType) -> bool {
    if source.exec || target.exec {
        return source.exec && target.exec;
    }

    let src = source.port_type.as_str();
    let dst = target.port_type.as_str();

    if src == dst || dst == "any" || src == "unknown" || dst == "unknown" {
        return true;
    }

    if let Some(src_elem) = src.strip_prefix("[]") {
        if matches!(dst, "iterable" | "indexable" | "[]any" | "bool") {
            return true;
        }
        if let Some(dst_elem) = dst.strip_prefix("[]") {
            if ports_are_compatible(&PortType::data(src_elem), &PortType::data(dst_elem)) {
                return true;
            }
        }
    }

    cast_targets(src).contains(&dst)
}

/// Source types an input of `input_type` accepts, the type itself first
pub fn input_type_accepts(input_type: &str) -> Vec<String> {
    let mut accepted = vec![input_type.to_string()];
    accepted.extend(
        OUTPUT_TO_INPUT_CAST
            .iter()
            .filter(|(_, targets)| targets.contains(&input_type))
            .map(|(source, _)| source.to_string()),
    );
    accepted
}

/// Target types an output of `output_type` can feed, the type itself first
pub fn output_type_accepted_by(output_type: &str) -> Vec<String> {
    let mut accepted = vec![output_type.to_string()];
    accepted.extend(cast_targets(output_type).iter().map(|t| t.to_string()));
    accepted
}

/// Split `name[k]` into `("name", k)`
pub fn parse_index_port(port_id: &str) -> Option<(String, i64)> {
    let caps = INDEX_PORT_RE.captures(port_id)?;
    let index = caps.get(2)?.as_str().parse::<i64>().ok()?;
    Some((caps.get(1)?.as_str().to_string(), index))
}

/// Prefix namespace-less node types with `core/`
pub fn normalize_node_type(node_type: &str) -> String {
    if SHORT_NODE_TYPE_RE.is_match(node_type) {
        format!("core/{}", node_type)
    } else {
        node_type.to_string()
    }
}

/// Whether the node type refers to a GitHub action (`github.com/owner/repo@ref`)
pub fn is_github_action_type(node_type: &str) -> bool {
    node_type.starts_with("github.com/")
}

/// Value of an unconnected, optional input without literal or default.
///
/// Returns `None` for types that have no zero value.
pub fn default_zero_value(port_type: &str) -> Option<Value> {
    let value = match port_type {
        "bool" => Value::Bool(false),
        "number" => Value::Int(0),
        "string" | "secret" => Value::String(String::new()),
        "credentials" | "any" | "stream" | "git-repo" | "unknown" | "storage-provider" => Value::Null,
        "[]bool" | "[]number" | "[]string" => Value::Array(Vec::new()),
        "map" => Value::Map(BTreeMap::new()),
        _ => return None,
    };
    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compat(src: &str, dst: &str) -> bool {
        ports_are_compatible(&PortType::data(src), &PortType::data(dst))
    }

    #[test]
    fn test_exec_ports_only_connect_to_exec() {
        assert!(ports_are_compatible(&PortType::exec(), &PortType::exec()));
        assert!(!ports_are_compatible(&PortType::exec(), &PortType::data("any")));
        assert!(!ports_are_compatible(&PortType::data("any"), &PortType::exec()));
    }

    #[test]
    fn test_basic_rules() {
        assert!(compat("string", "string"));
        assert!(compat("stream", "any"));
        assert!(compat("unknown", "number"));
        assert!(compat("number", "unknown"));
        assert!(!compat("any", "number"));
    }

    #[test]
    fn test_array_rules() {
        assert!(compat("[]string", "iterable"));
        assert!(compat("[]string", "indexable"));
        assert!(compat("[]number", "[]any"));
        assert!(compat("[]number", "bool"));
        assert!(compat("[]bool", "[]string"));
        assert!(compat("[]string", "[]secret"));
        assert!(!compat("[]stream", "[]number"));
        assert!(!compat("[]string", "string"));
    }

    #[test]
    fn test_cast_table() {
        assert!(compat("bool", "number"));
        assert!(compat("string", "secret"));
        assert!(compat("stream", "iterable"));
        assert!(!compat("stream", "indexable"));
        assert!(compat("option", "string"));
        assert!(!compat("secret", "number"));
        assert!(!compat("credentials", "string"));
    }

    #[test]
    fn test_accept_lists() {
        let accepts = input_type_accepts("string");
        assert_eq!(accepts[0], "string");
        assert!(accepts.contains(&"bool".to_string()));
        assert!(accepts.contains(&"secret".to_string()));
        assert_eq!(output_type_accepted_by("secret"), vec!["secret", "string"]);
    }

    #[test]
    fn test_index_port_and_node_type() {
        assert_eq!(parse_index_port("inputs[12]"), Some(("inputs".to_string(), 12)));
        assert_eq!(parse_index_port("exec-on[0]"), Some(("exec-on".to_string(), 0)));
        assert_eq!(parse_index_port("inputs"), None);
        assert_eq!(parse_index_port("inputs[-1]"), None);

        assert_eq!(normalize_node_type("print@v1"), "core/print@v1");
        assert_eq!(normalize_node_type("core/print@v1"), "core/print@v1");
        assert_eq!(normalize_node_type("print@v2"), "core/print@v2");
        assert_eq!(normalize_node_type("http-request@v12"), "core/http-request@v12");
        assert_eq!(normalize_node_type("print@vx"), "print@vx");
        assert!(is_github_action_type("github.com/actions/checkout@v4"));
        assert!(EXEC_PORT_RE.is_match("exec-completed"));
        assert!(!EXEC_PORT_RE.is_match("execute"));
    }

    #[test]
    fn test_default_zero_values() {
        assert_eq!(default_zero_value("number"), Some(Value::Int(0)));
        assert_eq!(default_zero_value("secret"), Some(Value::from("")));
        assert_eq!(default_zero_value("stream"), Some(Value::Null));
        assert_eq!(default_zero_value("[]string"), Some(Value::Array(vec![])));
        assert_eq!(default_zero_value("option"), None);
    }
}
