//! Random-access view over arrays, strings and byte buffers

use crate::error::{Result, RuntimeError};
use crate::value::Value;

#[derive(Debug, Clone, PartialEq)]
enum Data {
    Array(Vec<Value>),
    Text(String),
    Bytes(Vec<u8>),
}

/// Random-access sequence produced by coercing a value to `indexable`
///
/// Strings index by character, byte buffers by byte.
#[derive(Debug, Clone, PartialEq)]
pub struct Indexable {
    data: Data,
}

impl Default for Indexable {
    fn default() -> Self {
        Self::from_array(Vec::new())
    }
}

impl Indexable {
    pub fn from_array(items: Vec<Value>) -> Self {
        Self {
            data: Data::Array(items),
        }
    }

    pub fn from_string(text: impl Into<String>) -> Self {
        Self {
            data: Data::Text(text.into()),
        }
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            data: Data::Bytes(bytes),
        }
    }

    pub fn len(&self) -> usize {
        match &self.data {
            Data::Array(items) => items.len(),
            Data::Text(text) => text.chars().count(),
            Data::Bytes(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element at `index`, or `None` when out of range
    pub fn index(&self, index: usize) -> Option<Value> {
        match &self.data {
            Data::Array(items) => items.get(index).cloned(),
            Data::Text(text) => text.chars().nth(index).map(|c| Value::String(c.to_string())),
            Data::Bytes(bytes) => bytes.get(index).map(|b| Value::Int(*b as i64)),
        }
    }

    /// Append an element.
    ///
    /// Strings append the string form of the value; byte buffers accept bytes,
    /// strings and integers in `0..=255`.
    pub fn append(&mut self, value: Value) -> Result<()> {
        match &mut self.data {
            Data::Array(items) => items.push(value),
            Data::Text(text) => match value {
                Value::Stream(_) | Value::Handle(_) => {
                    return Err(RuntimeError::msg(format!(
                        "cannot append '{}' to a string",
                        value.kind_name()
                    )))
                }
                other => text.push_str(&other.to_string()),
            },
            Data::Bytes(bytes) => match value {
                Value::Bytes(b) => bytes.extend(b),
                Value::String(s) => bytes.extend(s.into_bytes()),
                Value::Int(i) if (0..=255).contains(&i) => bytes.push(i as u8),
                other => {
                    return Err(RuntimeError::msg(format!(
                        "cannot append '{}' to bytes",
                        other.kind_name()
                    )))
                }
            },
        }
        Ok(())
    }

    /// Convert back into a port value
    pub fn into_value(self) -> Value {
        match self.data {
            Data::Array(items) => Value::Array(items),
            Data::Text(text) => Value::String(text),
            Data::Bytes(bytes) => Value::Bytes(bytes),
        }
    }
}
