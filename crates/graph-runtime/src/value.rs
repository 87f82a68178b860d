//! Runtime values flowing through data ports
//!
//! A [`Value`] is the closed set of shapes a port can carry. Node types
//! declare semantic port types (`number`, `[]string`, `stream`, ...); the
//! runtime checks values against those declarations when outputs are set and
//! coerces them when inputs are read (see [`crate::coerce`]).

use std::collections::BTreeMap;
use std::fmt;
use std::io::Read;
use std::sync::Arc;

use parking_lot::Mutex;

/// Reader type shared by stream values
pub type BoxedReader = Box<dyn Read + Send>;

/// External handle carried by a port (storage provider, credentials, git repo)
///
/// Collaborators implement this for the opaque objects they pass between
/// nodes. The runtime only needs to know which semantic port type the handle
/// satisfies.
pub trait ValueHandle: Send + Sync + fmt::Debug {
    /// Semantic port type this handle satisfies, e.g. `credentials`
    fn port_type(&self) -> &str;

    /// Downcasting support for the nodes that consume the handle
    fn as_any(&self) -> &dyn std::any::Any;
}

/// A byte stream that can be consumed once
///
/// Clones share the same underlying reader, so the first consumer drains it
/// for everyone.
#[derive(Clone)]
pub struct DataStream {
    reader: Arc<Mutex<Option<BoxedReader>>>,
    /// Source path, if the stream was opened from a file
    pub path: Option<String>,
    /// Total length in bytes, if known
    pub length: Option<u64>,
}

impl DataStream {
    /// Wrap a reader
    pub fn new(reader: BoxedReader) -> Self {
        Self {
            reader: Arc::new(Mutex::new(Some(reader))),
            path: None,
            length: None,
        }
    }

    /// Stream over an in-memory buffer
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let length = bytes.len() as u64;
        let mut stream = Self::new(Box::new(std::io::Cursor::new(bytes)));
        stream.length = Some(length);
        stream
    }

    /// Take the reader out of the stream. Returns `None` once consumed.
    pub fn take_reader(&self) -> Option<BoxedReader> {
        self.reader.lock().take()
    }

    /// Read the remaining bytes and close the stream
    pub fn read_all(&self) -> std::io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        if let Some(mut reader) = self.take_reader() {
            reader.read_to_end(&mut buf)?;
        }
        Ok(buf)
    }

    fn ptr_eq(&self, other: &DataStream) -> bool {
        Arc::ptr_eq(&self.reader, &other.reader)
    }
}

impl fmt::Debug for DataStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataStream")
            .field("path", &self.path)
            .field("length", &self.length)
            .finish()
    }
}

/// A value carried by a data port
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    Array(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Stream(DataStream),
    Handle(Arc<dyn ValueHandle>),
}

impl Value {
    /// Short name of the runtime shape, used in diagnostics
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
            Value::Stream(_) => "stream",
            Value::Handle(_) => "handle",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Vec<Value>> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Zero value of the same shape, used when indexing past the end of an array
    pub fn zero_like(&self) -> Value {
        match self {
            Value::Bool(_) => Value::Bool(false),
            Value::Int(_) => Value::Int(0),
            Value::Float(_) => Value::Float(0.0),
            Value::String(_) => Value::String(String::new()),
            Value::Bytes(_) => Value::Bytes(Vec::new()),
            Value::Array(_) => Value::Array(Vec::new()),
            Value::Map(_) => Value::Map(BTreeMap::new()),
            _ => Value::Null,
        }
    }

    /// Element zero value for an array, based on its first element
    pub fn element_zero(items: &[Value]) -> Value {
        items.first().map(Value::zero_like).unwrap_or(Value::Null)
    }

    /// Convert a JSON value. Integers that fit into `i64` stay integers.
    pub fn from_json(json: serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => Value::Map(
                map.into_iter()
                    .map(|(k, v)| (k, Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Convert to JSON. Streams and handles have no JSON form and become null.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null | Value::Stream(_) | Value::Handle(_) => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Bytes(b) => serde_json::Value::String(String::from_utf8_lossy(b).into_owned()),
            Value::Array(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
            Value::Map(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Stream(a), Value::Stream(b)) => a.ptr_eq(b),
            (Value::Handle(a), Value::Handle(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// Plain formatting without draining streams.
///
/// Numbers use the shortest representation (`3`, `0.5`), maps render as
/// `key: value` lines.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
            Value::String(s) => f.write_str(s),
            Value::Bytes(b) => f.write_str(&String::from_utf8_lossy(b)),
            Value::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            Value::Map(map) => {
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str("\n")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                Ok(())
            }
            Value::Stream(s) => match &s.path {
                Some(path) => write!(f, "<stream {}>", path),
                None => f.write_str("<stream>"),
            },
            Value::Handle(h) => write!(f, "<{}>", h.port_type()),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<DataStream> for Value {
    fn from(v: DataStream) -> Self {
        Value::Stream(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Array(v)
    }
}

impl From<Vec<String>> for Value {
    fn from(v: Vec<String>) -> Self {
        Value::Array(v.into_iter().map(Value::String).collect())
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(v: BTreeMap<String, Value>) -> Self {
        Value::Map(v)
    }
}
