//! Runtime value coercion
//!
//! Nodes read their inputs as concrete Rust types. [`FromValue`] converts a
//! resolved [`Value`] into the requested type, following the coercion rules
//! of the port type lattice: strings parse into numbers and booleans,
//! collections are truthy when non-empty, streams drain into strings, and
//! secret inputs resolve their key against the run's secrets.

use std::fmt;
use std::io::{Cursor, Read};

use crate::error::{Result, RuntimeError};
use crate::indexable::Indexable;
use crate::iterable::Iterable;
use crate::state::ExecutionState;
use crate::value::{BoxedReader, Value};

const HINT_SECRETS: &str =
    "To learn about secrets, please visit https://docs.actionforge.dev/reference/configuration/#secrets";

/// Conversion from a port value into a typed input
pub trait FromValue: Sized {
    /// Name used in conversion errors
    const TYPE_NAME: &'static str;

    /// Return conversion errors unchanged instead of wrapping them with the
    /// input port that was read
    const UNWRAP_ERRORS: bool = false;

    fn from_value(state: &ExecutionState, value: Value) -> Result<Self>;
}

fn unsupported(kind: &str, target: &str) -> RuntimeError {
    RuntimeError::msg(format!("cannot convert '{}' to {}", kind, target))
}

impl FromValue for Value {
    const TYPE_NAME: &'static str = "any";

    fn from_value(_state: &ExecutionState, value: Value) -> Result<Self> {
        Ok(value)
    }
}

impl FromValue for bool {
    const TYPE_NAME: &'static str = "bool";

    fn from_value(_state: &ExecutionState, value: Value) -> Result<Self> {
        match value {
            Value::Bool(b) => Ok(b),
            Value::Int(i) => Ok(i != 0),
            Value::Float(f) => Ok(f != 0.0),
            Value::String(s) => Ok(!s.is_empty()),
            Value::Bytes(b) => Ok(!b.is_empty()),
            Value::Array(a) => Ok(!a.is_empty()),
            Value::Map(m) => Ok(!m.is_empty()),
            other => Err(RuntimeError::msg(format!(
                "cannot convert {} to bool",
                other.kind_name()
            ))),
        }
    }
}

fn to_i64(value: Value) -> Result<i64> {
    match value {
        Value::Int(i) => Ok(i),
        Value::Float(f) => {
            if f.is_finite() && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
                Ok(f.trunc() as i64)
            } else {
                Err(RuntimeError::msg(format!("value {} overflows i64", f)))
            }
        }
        Value::Bool(b) => Ok(b as i64),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|e| RuntimeError::msg(format!("unable to convert string to int: {}", e))),
        other => Err(unsupported(other.kind_name(), "int")),
    }
}

fn to_u64(value: Value) -> Result<u64> {
    match value {
        Value::Int(i) if i < 0 => Err(RuntimeError::msg(format!(
            "cannot convert negative value {} to an unsigned int",
            i
        ))),
        Value::Int(i) => Ok(i as u64),
        Value::Float(f) if f < 0.0 => Err(RuntimeError::msg(format!(
            "cannot convert negative float {:.6} to an unsigned int",
            f
        ))),
        Value::Float(f) => {
            if f.is_finite() && f <= u64::MAX as f64 {
                Ok(f.trunc() as u64)
            } else {
                Err(RuntimeError::msg(format!("value {} overflows u64", f)))
            }
        }
        Value::Bool(b) => Ok(b as u64),
        Value::String(s) => s
            .trim()
            .parse::<u64>()
            .map_err(|e| RuntimeError::msg(format!("unable to convert string to uint: {}", e))),
        other => Err(unsupported(other.kind_name(), "uint")),
    }
}

fn to_f64(value: Value) -> Result<f64> {
    match value {
        Value::Int(i) => Ok(i as f64),
        Value::Float(f) => Ok(f),
        Value::Bool(b) => Ok(if b { 1.0 } else { 0.0 }),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|e| RuntimeError::msg(format!("unable to convert string to float: {}", e))),
        other => Err(unsupported(other.kind_name(), "float")),
    }
}

macro_rules! impl_signed {
    ($($t:ty),*) => {$(
        impl FromValue for $t {
            const TYPE_NAME: &'static str = stringify!($t);

            fn from_value(_state: &ExecutionState, value: Value) -> Result<Self> {
                let wide = to_i64(value)?;
                <$t>::try_from(wide).map_err(|_| {
                    RuntimeError::msg(format!("value {} overflows {}", wide, stringify!($t)))
                })
            }
        }
    )*};
}

macro_rules! impl_unsigned {
    ($($t:ty),*) => {$(
        impl FromValue for $t {
            const TYPE_NAME: &'static str = stringify!($t);

            fn from_value(_state: &ExecutionState, value: Value) -> Result<Self> {
                let wide = to_u64(value)?;
                <$t>::try_from(wide).map_err(|_| {
                    RuntimeError::msg(format!("value {} overflows {}", wide, stringify!($t)))
                })
            }
        }
    )*};
}

impl_signed!(i8, i16, i32, i64);
impl_unsigned!(u8, u16, u32, u64, usize);

impl FromValue for f64 {
    const TYPE_NAME: &'static str = "f64";

    fn from_value(_state: &ExecutionState, value: Value) -> Result<Self> {
        to_f64(value)
    }
}

impl FromValue for f32 {
    const TYPE_NAME: &'static str = "f32";

    fn from_value(_state: &ExecutionState, value: Value) -> Result<Self> {
        let wide = to_f64(value)?;
        if wide.is_finite() && wide.abs() > f32::MAX as f64 {
            return Err(RuntimeError::msg(format!("value {} overflows f32", wide)));
        }
        Ok(wide as f32)
    }
}

fn decode(bytes: Vec<u8>) -> Result<String> {
    String::from_utf8(bytes).map_err(|e| RuntimeError::msg(format!("error decoding bytes: {}", e)))
}

impl FromValue for String {
    const TYPE_NAME: &'static str = "string";

    fn from_value(_state: &ExecutionState, value: Value) -> Result<Self> {
        match value {
            Value::String(s) => Ok(s),
            Value::Int(_) | Value::Float(_) | Value::Bool(_) | Value::Map(_) => Ok(value.to_string()),
            Value::Bytes(b) => decode(b),
            Value::Stream(stream) => decode(stream.read_all()?),
            Value::Null => Err(RuntimeError::msg("cannot convert nil to string")),
            other => Err(unsupported(other.kind_name(), "string")),
        }
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    const TYPE_NAME: &'static str = "array";

    fn from_value(state: &ExecutionState, value: Value) -> Result<Self> {
        match value {
            Value::Array(items) => items
                .into_iter()
                .enumerate()
                .map(|(i, item)| {
                    T::from_value(state, item).map_err(|e| {
                        RuntimeError::create(
                            Some(state),
                            Some(e),
                            format!("unable to convert element {}", i),
                        )
                    })
                })
                .collect(),
            other => Err(RuntimeError::msg(format!(
                "expected array but got {}",
                other.kind_name()
            ))),
        }
    }
}

impl FromValue for Indexable {
    const TYPE_NAME: &'static str = "indexable";

    fn from_value(_state: &ExecutionState, value: Value) -> Result<Self> {
        match value {
            Value::Array(items) => Ok(Indexable::from_array(items)),
            Value::String(s) => Ok(Indexable::from_string(s)),
            Value::Bytes(b) => Ok(Indexable::from_bytes(b)),
            Value::Stream(stream) => Ok(Indexable::from_bytes(stream.read_all()?)),
            other => Err(unsupported(other.kind_name(), "indexable")),
        }
    }
}

impl FromValue for Iterable {
    const TYPE_NAME: &'static str = "iterable";

    fn from_value(_state: &ExecutionState, value: Value) -> Result<Self> {
        match value {
            Value::Array(items) => Ok(Iterable::from_array(items)),
            Value::Map(map) => Ok(Iterable::from_map(map)),
            Value::String(s) => Ok(Iterable::from_string(&s)),
            Value::Stream(stream) => Ok(match stream.take_reader() {
                Some(reader) => Iterable::from_reader(reader),
                None => Iterable::default(),
            }),
            other => Err(unsupported(other.kind_name(), "iterable")),
        }
    }
}

/// Reader over a `stream`, `string` or byte input
pub struct StreamReader(pub BoxedReader);

impl StreamReader {
    pub fn read_to_string(mut self) -> Result<String> {
        let mut buf = Vec::new();
        self.0.read_to_end(&mut buf)?;
        decode(buf)
    }
}

impl Default for StreamReader {
    fn default() -> Self {
        StreamReader(Box::new(Cursor::new(Vec::new())))
    }
}

impl Read for StreamReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.0.read(buf)
    }
}

impl fmt::Debug for StreamReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StreamReader")
    }
}

impl FromValue for StreamReader {
    const TYPE_NAME: &'static str = "stream";

    fn from_value(_state: &ExecutionState, value: Value) -> Result<Self> {
        match value {
            Value::Stream(stream) => Ok(stream.take_reader().map(StreamReader).unwrap_or_default()),
            Value::String(s) => Ok(StreamReader(Box::new(Cursor::new(s.into_bytes())))),
            Value::Bytes(b) => Ok(StreamReader(Box::new(Cursor::new(b)))),
            other => Err(RuntimeError::msg(format!(
                "unsupported type '{}'",
                other.kind_name()
            ))),
        }
    }
}

/// A resolved secret. The value never shows up in debug output.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Secret {
    key: String,
    value: String,
}

impl Secret {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secret")
            .field("key", &self.key)
            .field("value", &"***")
            .finish()
    }
}

impl FromValue for Secret {
    const TYPE_NAME: &'static str = "secret";
    const UNWRAP_ERRORS: bool = true;

    fn from_value(state: &ExecutionState, value: Value) -> Result<Self> {
        match value {
            Value::String(key) => match state.secret(&key) {
                Some(value) => Ok(Secret { key, value }),
                None => Err(RuntimeError::leaf(
                    Some(state),
                    format!("no secret found for '{}'", key),
                )
                .with_hint(HINT_SECRETS)),
            },
            other => Err(RuntimeError::leaf(
                Some(state),
                format!("cannot convert '{}' to Secret", other.kind_name()),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, HashMap};
    use std::sync::Arc;

    use super::*;
    use crate::state::StateOptions;
    use crate::value::DataStream;

    fn state() -> Arc<ExecutionState> {
        let mut secrets = HashMap::new();
        secrets.insert("API_KEY".to_string(), "hunter2".to_string());
        ExecutionState::new(StateOptions {
            secrets,
            ..Default::default()
        })
    }

    fn conv<T: FromValue>(v: impl Into<Value>) -> Result<T> {
        T::from_value(&state(), v.into())
    }

    #[test]
    fn test_to_bool() {
        assert!(conv::<bool>("x").unwrap());
        assert!(!conv::<bool>("").unwrap());
        assert!(!conv::<bool>(0i64).unwrap());
        assert!(conv::<bool>(0.5).unwrap());
        assert!(!conv::<bool>(Value::Array(vec![])).unwrap());
        assert!(conv::<bool>(Value::Null).is_err());
    }

    #[test]
    fn test_to_integers() {
        assert_eq!(conv::<i64>(" 42 ").unwrap(), 42);
        assert_eq!(conv::<i64>(true).unwrap(), 1);
        assert_eq!(conv::<i32>(3.9).unwrap(), 3);
        assert_eq!(conv::<i8>(300i64).unwrap_err().to_string(), "value 300 overflows i8");
        assert!(conv::<i64>("abc")
            .unwrap_err()
            .to_string()
            .starts_with("unable to convert string to int"));
    }

    #[test]
    fn test_to_unsigned() {
        assert_eq!(conv::<u8>(255i64).unwrap(), 255);
        assert_eq!(
            conv::<u32>(-1i64).unwrap_err().to_string(),
            "cannot convert negative value -1 to an unsigned int"
        );
        assert_eq!(
            conv::<u64>(-1.5).unwrap_err().to_string(),
            "cannot convert negative float -1.500000 to an unsigned int"
        );
        assert_eq!(conv::<usize>("7").unwrap(), 7);
    }

    #[test]
    fn test_to_float() {
        assert_eq!(conv::<f64>("3.25").unwrap(), 3.25);
        assert_eq!(conv::<f64>(2i64).unwrap(), 2.0);
        assert!(conv::<f32>(1e300).unwrap_err().to_string().contains("overflows f32"));
    }

    #[test]
    fn test_to_string() {
        assert_eq!(conv::<String>(3i64).unwrap(), "3");
        assert_eq!(conv::<String>(0.5).unwrap(), "0.5");
        assert_eq!(conv::<String>(false).unwrap(), "false");
        assert_eq!(conv::<String>(b"bytes".to_vec()).unwrap(), "bytes");
        assert_eq!(
            conv::<String>(DataStream::from_bytes(b"streamed".to_vec())).unwrap(),
            "streamed"
        );

        let mut map = BTreeMap::new();
        map.insert("k".to_string(), Value::from("v"));
        assert_eq!(conv::<String>(Value::Map(map)).unwrap(), "k: v");
        assert_eq!(conv::<String>(Value::Null).unwrap_err().to_string(), "cannot convert nil to string");
    }

    #[test]
    fn test_numeric_string_round_trip() {
        for text in ["0", "42", "-7", "3.5"] {
            let n = conv::<f64>(text).unwrap();
            assert_eq!(conv::<String>(n).unwrap(), text);
        }
    }

    #[test]
    fn test_to_vec() {
        let v = conv::<Vec<i64>>(Value::Array(vec![Value::from("1"), Value::Int(2)])).unwrap();
        assert_eq!(v, vec![1, 2]);

        let err = conv::<Vec<i64>>(Value::Array(vec![Value::from("x")])).unwrap_err();
        assert!(err.to_string().starts_with("unable to convert element 0"));
        assert_eq!(
            conv::<Vec<i64>>("x").unwrap_err().to_string(),
            "expected array but got string"
        );
    }

    #[test]
    fn test_views() {
        let idx = conv::<Indexable>("abc").unwrap();
        assert_eq!(idx.len(), 3);
        let it = conv::<Iterable>(Value::Array(vec![Value::Int(1)])).unwrap();
        assert_eq!(it.count(), 1);
        assert!(conv::<Indexable>(1i64).is_err());

        let reader = conv::<StreamReader>("text").unwrap();
        assert_eq!(reader.read_to_string().unwrap(), "text");
    }

    #[test]
    fn test_secret_lookup() {
        let secret = conv::<Secret>("API_KEY").unwrap();
        assert_eq!(secret.value(), "hunter2");
        assert!(!format!("{:?}", secret).contains("hunter2"));

        let err = conv::<Secret>("MISSING").unwrap_err();
        assert_eq!(err.to_string(), "no secret found for 'MISSING'");
        assert!(crate::error::error_hint(&err).unwrap().contains("secrets"));
    }
}
