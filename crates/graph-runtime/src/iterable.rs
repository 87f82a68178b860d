//! Pull-based `(key, value)` view over arrays, maps, strings and streams

use std::collections::btree_map;
use std::io::Read;

use crate::error::Result;
use crate::value::{BoxedReader, Value};

enum Source {
    Array(std::vec::IntoIter<Value>),
    Map(btree_map::IntoIter<String, Value>),
    Chars(std::vec::IntoIter<char>),
    Reader(BoxedReader),
}

/// Sequence produced by coercing a value to `iterable`
///
/// Arrays yield `(position, element)`, maps yield `(key, value)` in key
/// order, strings yield one entry per character and streams one entry per
/// byte. Streams are read lazily.
pub struct Iterable {
    source: Source,
    pos: usize,
}

impl Default for Iterable {
    fn default() -> Self {
        Self::from_array(Vec::new())
    }
}

impl std::fmt::Debug for Iterable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Iterable").field("pos", &self.pos).finish()
    }
}

impl Iterable {
    pub fn from_array(items: Vec<Value>) -> Self {
        Self {
            source: Source::Array(items.into_iter()),
            pos: 0,
        }
    }

    pub fn from_map(map: std::collections::BTreeMap<String, Value>) -> Self {
        Self {
            source: Source::Map(map.into_iter()),
            pos: 0,
        }
    }

    pub fn from_string(text: &str) -> Self {
        Self {
            source: Source::Chars(text.chars().collect::<Vec<_>>().into_iter()),
            pos: 0,
        }
    }

    pub fn from_reader(reader: BoxedReader) -> Self {
        Self {
            source: Source::Reader(reader),
            pos: 0,
        }
    }
}

impl Iterator for Iterable {
    type Item = Result<(Value, Value)>;

    fn next(&mut self) -> Option<Self::Item> {
        let pos = Value::Int(self.pos as i64);
        let item = match &mut self.source {
            Source::Array(items) => items.next().map(|v| Ok((pos, v))),
            Source::Map(entries) => entries.next().map(|(k, v)| Ok((Value::String(k), v))),
            Source::Chars(chars) => chars
                .next()
                .map(|c| Ok((pos, Value::String(c.to_string())))),
            Source::Reader(reader) => {
                let mut buf = [0u8; 1];
                loop {
                    match reader.read(&mut buf) {
                        Ok(0) => break None,
                        Ok(_) => break Some(Ok((pos, Value::Int(buf[0] as i64)))),
                        Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                        Err(e) => break Some(Err(e.into())),
                    }
                }
            }
        };
        if item.is_some() {
            self.pos += 1;
        }
        item
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn collect(it: Iterable) -> Vec<(Value, Value)> {
        it.map(|r| r.unwrap()).collect()
    }

    #[test]
    fn test_array_keys_are_positions() {
        let items = collect(Iterable::from_array(vec![Value::from("a"), Value::from("b")]));
        assert_eq!(
            items,
            vec![
                (Value::Int(0), Value::from("a")),
                (Value::Int(1), Value::from("b"))
            ]
        );
    }

    #[test]
    fn test_map_iterates_in_key_order() {
        let mut map = BTreeMap::new();
        map.insert("b".to_string(), Value::Int(2));
        map.insert("a".to_string(), Value::Int(1));
        let items = collect(Iterable::from_map(map));
        assert_eq!(items[0], (Value::from("a"), Value::Int(1)));
        assert_eq!(items[1], (Value::from("b"), Value::Int(2)));
    }

    #[test]
    fn test_string_and_reader() {
        let chars = collect(Iterable::from_string("hi"));
        assert_eq!(chars[1], (Value::Int(1), Value::from("i")));

        let bytes = collect(Iterable::from_reader(Box::new(std::io::Cursor::new(vec![7u8, 8]))));
        assert_eq!(bytes, vec![(Value::Int(0), Value::Int(7)), (Value::Int(1), Value::Int(8))]);
    }
}
