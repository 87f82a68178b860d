//! Expression tree evaluation against an execution state

use std::collections::BTreeMap;
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};

use super::functions;
use super::parser::{CompareOp, Expr};
use crate::error::{Result, RuntimeError};
use crate::node::input_value_raw;
use crate::state::ExecutionState;
use crate::value::Value;

/// Intermediate result. The named contexts stay lazy so lookups can apply
/// their own key rules.
enum Operand {
    Value(Value),
    Env,
    Secrets,
    Inputs,
}

pub(crate) struct Evaluator<'a> {
    state: &'a Arc<ExecutionState>,
}

impl<'a> Evaluator<'a> {
    pub fn new(state: &'a Arc<ExecutionState>) -> Self {
        Self { state }
    }

    pub fn eval<'b>(&'b self, expr: &'b Expr) -> BoxFuture<'b, Result<Value>> {
        async move {
            let operand = self.operand(expr).await?;
            Ok(self.materialize(operand))
        }
        .boxed()
    }

    fn operand<'b>(&'b self, expr: &'b Expr) -> BoxFuture<'b, Result<Operand>> {
        async move {
            let value = match expr {
                Expr::Null => Value::Null,
                Expr::Bool(b) => Value::Bool(*b),
                Expr::Int(i) => Value::Int(*i),
                Expr::Float(f) => Value::Float(*f),
                Expr::Str(s) => Value::String(s.clone()),
                Expr::Var(name) => return self.root(name),
                Expr::Prop(receiver, name) => match self.operand(receiver).await? {
                    Operand::Env => self.env(name),
                    Operand::Secrets => self.secret(name),
                    Operand::Inputs => self.input(name).await?,
                    Operand::Value(value) => property(&value, name),
                },
                Expr::Index(receiver, index) => {
                    let receiver = self.operand(receiver).await?;
                    let index = self.eval(index).await?;
                    match receiver {
                        Operand::Env => self.env(&index.to_string()),
                        Operand::Secrets => self.secret(&index.to_string()),
                        Operand::Inputs => self.input(&index.to_string()).await?,
                        Operand::Value(value) => index_value(&value, &index)?,
                    }
                }
                Expr::Star(receiver) => match self.operand(receiver).await? {
                    Operand::Env => sorted_values(
                        self.state
                            .env_snapshot()
                            .into_iter()
                            .map(|(k, v)| (k, Value::String(v))),
                    ),
                    Operand::Secrets => sorted_values(
                        self.state
                            .secrets()
                            .iter()
                            .map(|(k, v)| (k.clone(), Value::String(v.clone()))),
                    ),
                    Operand::Inputs => sorted_values(
                        self.state.inputs().iter().map(|(k, v)| (k.clone(), v.clone())),
                    ),
                    Operand::Value(Value::Map(map)) => Value::Array(map.into_values().collect()),
                    Operand::Value(Value::Array(items)) => Value::Array(items),
                    Operand::Value(_) => Value::Array(Vec::new()),
                },
                Expr::Call(name, args) => {
                    let mut values = Vec::with_capacity(args.len());
                    for arg in args {
                        values.push(self.eval(arg).await?);
                    }
                    functions::call(name, values)?
                }
                Expr::Not(inner) => Value::Bool(!is_truthy(&self.eval(inner).await?)),
                Expr::And(left, right) => {
                    let left = self.eval(left).await?;
                    if !is_truthy(&left) {
                        left
                    } else {
                        self.eval(right).await?
                    }
                }
                Expr::Or(left, right) => {
                    let left = self.eval(left).await?;
                    if is_truthy(&left) {
                        left
                    } else {
                        self.eval(right).await?
                    }
                }
                Expr::Compare(op, left, right) => {
                    let left = self.eval(left).await?;
                    let right = self.eval(right).await?;
                    Value::Bool(compare(*op, &left, &right))
                }
            };
            Ok(Operand::Value(value))
        }
        .boxed()
    }

    fn root(&self, name: &str) -> Result<Operand> {
        let value = match name {
            "env" => return Ok(Operand::Env),
            "secrets" => return Ok(Operand::Secrets),
            "inputs" => return Ok(Operand::Inputs),
            "github" => self.state.github().clone(),
            "needs" => self.state.needs().clone(),
            "matrix" => self.state.matrix().clone(),
            "steps" => Value::Map(self.state.permanent_cache_map()),
            "runner" => self.runner(),
            "job" => {
                return Err(RuntimeError::msg(
                    "access to 'job' variable is not supported in this context",
                ))
            }
            _ => Value::Null,
        };
        Ok(Operand::Value(value))
    }

    fn materialize(&self, operand: Operand) -> Value {
        match operand {
            Operand::Value(value) => value,
            Operand::Env => Value::Map(
                self.state
                    .env_snapshot()
                    .into_iter()
                    .map(|(k, v)| (k, Value::String(v)))
                    .collect(),
            ),
            Operand::Secrets => Value::Map(
                self.state
                    .secrets()
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect(),
            ),
            Operand::Inputs => Value::Map(
                self.state
                    .inputs()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            ),
        }
    }

    /// Environment lookups are exact
    fn env(&self, key: &str) -> Value {
        self.state.env_var(key).map(Value::String).unwrap_or_default()
    }

    /// Secret names are stored upper-case
    fn secret(&self, key: &str) -> Value {
        self.state
            .secret(&key.to_uppercase())
            .map(Value::String)
            .unwrap_or_default()
    }

    /// Run inputs first, then the inputs of the group enclosing the node
    /// that is currently being visited.
    async fn input(&self, key: &str) -> Result<Value> {
        let inputs = self.state.inputs();
        if let Some(value) = inputs.get(key).or_else(|| inputs.get(&key.to_lowercase())) {
            return Ok(value.clone());
        }

        let Some(visit) = self.state.last_visited() else {
            return Ok(Value::Null);
        };
        match visit.node.base().parent() {
            Some(group) if group.inputs().is_some() => {
                input_value_raw(group.as_ref(), self.state, key, None).await
            }
            _ => Ok(Value::Null),
        }
    }

    fn runner(&self) -> Value {
        let os = match std::env::consts::OS {
            "windows" => "Windows",
            "macos" => "macOS",
            other => other,
        };
        let arch = match std::env::consts::ARCH {
            "x86_64" => "X64",
            "x86" => "X86",
            "aarch64" => "ARM64",
            "arm" => "ARM",
            other => other,
        };
        let env = |key: &str| Value::String(self.state.env_var(key).unwrap_or_default());

        let mut map = BTreeMap::new();
        map.insert("os".to_string(), Value::from(os));
        map.insert("arch".to_string(), Value::from(arch));
        map.insert("name".to_string(), env("RUNNER_NAME"));
        map.insert("temp".to_string(), env("RUNNER_TEMP"));
        map.insert("tool_cache".to_string(), env("RUNNER_TOOL_CACHE"));
        Value::Map(map)
    }
}

fn sorted_values(entries: impl Iterator<Item = (String, Value)>) -> Value {
    let sorted: BTreeMap<String, Value> = entries.collect();
    Value::Array(sorted.into_values().collect())
}

/// Map property with an upper-case and lower-case fallback, or a projection
/// over the elements of an array.
fn property(value: &Value, name: &str) -> Value {
    match value {
        Value::Map(map) => map
            .get(name)
            .or_else(|| map.get(&name.to_uppercase()))
            .or_else(|| map.get(&name.to_lowercase()))
            .cloned()
            .unwrap_or_default(),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| match item {
                    Value::Map(map) => map.get(name).cloned().unwrap_or_default(),
                    _ => Value::Null,
                })
                .collect(),
        ),
        _ => Value::Null,
    }
}

fn index_value(value: &Value, index: &Value) -> Result<Value> {
    match value {
        Value::Null => Ok(Value::Null),
        Value::Array(items) => {
            if let Some(i) = to_index(index) {
                return Ok(usize::try_from(i)
                    .ok()
                    .and_then(|i| items.get(i))
                    .cloned()
                    .unwrap_or_default());
            }
            match index {
                Value::String(_) => Ok(Value::Array(
                    items
                        .iter()
                        .map(|item| index_value(item, index).unwrap_or_default())
                        .collect(),
                )),
                other => Err(RuntimeError::msg(format!(
                    "array index must be integer or string projection (got {})",
                    other.kind_name()
                ))),
            }
        }
        Value::Map(map) => {
            let key = index.to_string();
            if let Some(found) = map.get(&key) {
                return Ok(found.clone());
            }
            let key = key.to_lowercase();
            Ok(map
                .iter()
                .find(|(k, _)| k.to_lowercase() == key)
                .map(|(_, v)| v.clone())
                .unwrap_or_default())
        }
        other => Err(RuntimeError::msg(format!("cannot index type {}", other.kind_name()))),
    }
}

fn to_index(index: &Value) -> Option<i64> {
    match index {
        Value::Int(i) => Some(*i),
        Value::Float(f) => Some(f.trunc() as i64),
        Value::String(s) => s
            .parse::<i64>()
            .ok()
            .or_else(|| s.parse::<f64>().ok().map(|f| f.trunc() as i64)),
        _ => None,
    }
}

/// `null`, `false`, `0`, `-0`, NaN and `''` are falsy
pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Int(i) => *i != 0,
        Value::Float(f) => *f != 0.0 && !f.is_nan(),
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

/// Numeric coercion used by the comparison operators.
///
/// `None` for values without a numeric form. Strings are trimmed and the
/// empty string is zero.
fn to_number(value: &Value) -> Option<f64> {
    match value {
        Value::Null => Some(0.0),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::Int(i) => Some(*i as f64),
        Value::Float(f) => Some(*f),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                Some(0.0)
            } else {
                s.parse::<f64>().ok()
            }
        }
        _ => None,
    }
}

pub(crate) fn values_equal(left: &Value, right: &Value) -> bool {
    if left.is_null() && right.is_null() {
        return true;
    }
    if let (Value::String(l), Value::String(r)) = (left, right) {
        return l.to_lowercase() == r.to_lowercase();
    }
    match (to_number(left), to_number(right)) {
        (Some(l), Some(r)) => !l.is_nan() && !r.is_nan() && l == r,
        _ => left == right,
    }
}

fn compare(op: CompareOp, left: &Value, right: &Value) -> bool {
    match op {
        CompareOp::Eq => return values_equal(left, right),
        CompareOp::Ne => return !values_equal(left, right),
        _ => {}
    }

    if let (Value::String(l), Value::String(r)) = (left, right) {
        let (l, r) = (l.to_lowercase(), r.to_lowercase());
        return match op {
            CompareOp::Lt => l < r,
            CompareOp::Le => l <= r,
            CompareOp::Gt => l > r,
            _ => l >= r,
        };
    }

    let (Some(l), Some(r)) = (to_number(left), to_number(right)) else {
        return false;
    };
    if l.is_nan() || r.is_nan() {
        return false;
    }
    match op {
        CompareOp::Lt => l < r,
        CompareOp::Le => l <= r,
        CompareOp::Gt => l > r,
        _ => l >= r,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness() {
        assert!(!is_truthy(&Value::Null));
        assert!(!is_truthy(&Value::Float(f64::NAN)));
        assert!(!is_truthy(&Value::Float(-0.0)));
        assert!(!is_truthy(&Value::from("")));
        assert!(is_truthy(&Value::from("false")));
        assert!(is_truthy(&Value::Array(Vec::new())));
    }

    #[test]
    fn test_equality_coercion() {
        assert!(values_equal(&Value::Int(2), &Value::Float(2.0)));
        assert!(values_equal(&Value::from("ABC"), &Value::from("abc")));
        assert!(!values_equal(&Value::from("abc"), &Value::Int(0)));
        assert!(values_equal(
            &Value::Array(vec![Value::Int(1)]),
            &Value::Array(vec![Value::Int(1)])
        ));
        assert!(!values_equal(&Value::Array(Vec::new()), &Value::Int(0)));
    }

    #[test]
    fn test_index_rules() {
        let items = Value::Array(vec![Value::Int(10), Value::Int(20)]);
        assert_eq!(index_value(&items, &Value::Int(1)).unwrap(), Value::Int(20));
        assert_eq!(index_value(&items, &Value::Int(5)).unwrap(), Value::Null);
        assert_eq!(index_value(&items, &Value::from("1")).unwrap(), Value::Int(20));
        assert_eq!(index_value(&Value::Null, &Value::Int(0)).unwrap(), Value::Null);

        let mut map = BTreeMap::new();
        map.insert("Name".to_string(), Value::from("x"));
        let map = Value::Map(map);
        assert_eq!(index_value(&map, &Value::from("name")).unwrap(), Value::from("x"));

        let err = index_value(&Value::Int(3), &Value::Int(0)).unwrap_err();
        assert_eq!(err.to_string(), "cannot index type int");
    }

    #[test]
    fn test_property_projection() {
        let mut a = BTreeMap::new();
        a.insert("id".to_string(), Value::Int(1));
        let items = Value::Array(vec![Value::Map(a), Value::Int(2)]);
        assert_eq!(
            property(&items, "id"),
            Value::Array(vec![Value::Int(1), Value::Null])
        );
        assert_eq!(property(&Value::Null, "id"), Value::Null);
    }
}
