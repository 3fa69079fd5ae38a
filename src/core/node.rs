// Reference-counted JSON document tree with cursor-based object iteration.
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use serde_json::Value;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum JsonType {
    Null,
    Bool,
    Integer,
    Real,
    String,
    Array,
    Object,
}

impl JsonType {
    /// Stable numeric code shared by the C ABI and CLI output.
    pub fn code(self) -> i32 {
        match self {
            JsonType::Null => 0,
            JsonType::Bool => 1,
            JsonType::Integer => 2,
            JsonType::Real => 3,
            JsonType::String => 4,
            JsonType::Array => 5,
            JsonType::Object => 6,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            JsonType::Null => "null",
            JsonType::Bool => "bool",
            JsonType::Integer => "integer",
            JsonType::Real => "real",
            JsonType::String => "string",
            JsonType::Array => "array",
            JsonType::Object => "object",
        }
    }
}

impl fmt::Display for JsonType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, PartialEq)]
pub(crate) enum NodeData {
    Null,
    Bool(bool),
    Integer(i64),
    Real(f64),
    String(String),
    Array(Vec<Node>),
    Object(IndexMap<String, Node>),
}

/// One owned reference to a shared JSON node.
///
/// Cloning acquires a reference and dropping releases it, so the reference count
/// observed through [`Node::ref_count`] is exactly the number of live `Node`
/// values (parents, handles, iterators) pointing at the same tree node.
#[derive(Clone, PartialEq)]
pub struct Node(Rc<NodeData>);

/// Position of one entry inside an object's insertion order.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Cursor(usize);

impl Node {
    pub(crate) fn from_data(data: NodeData) -> Self {
        Self(Rc::new(data))
    }

    pub(crate) fn data(&self) -> &NodeData {
        &self.0
    }

    pub fn null() -> Self {
        Self::from_data(NodeData::Null)
    }

    pub fn bool(value: bool) -> Self {
        Self::from_data(NodeData::Bool(value))
    }

    pub fn integer(value: i64) -> Self {
        Self::from_data(NodeData::Integer(value))
    }

    /// `None` for NaN and infinities, which have no JSON encoding.
    pub fn real(value: f64) -> Option<Self> {
        value
            .is_finite()
            .then(|| Self::from_data(NodeData::Real(value)))
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::from_data(NodeData::String(value.into()))
    }

    pub fn array(items: Vec<Node>) -> Self {
        Self::from_data(NodeData::Array(items))
    }

    /// Builds an object; a repeated key replaces the earlier value in place.
    pub fn object<K: Into<String>>(entries: impl IntoIterator<Item = (K, Node)>) -> Self {
        let mut out = IndexMap::new();
        for (key, value) in entries {
            out.insert(key.into(), value);
        }
        Self::from_data(NodeData::Object(out))
    }

    pub fn json_type(&self) -> JsonType {
        match self.data() {
            NodeData::Null => JsonType::Null,
            NodeData::Bool(_) => JsonType::Bool,
            NodeData::Integer(_) => JsonType::Integer,
            NodeData::Real(_) => JsonType::Real,
            NodeData::String(_) => JsonType::String,
            NodeData::Array(_) => JsonType::Array,
            NodeData::Object(_) => JsonType::Object,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self.data() {
            NodeData::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self.data() {
            NodeData::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self.data() {
            NodeData::Real(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.data() {
            NodeData::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn array_len(&self) -> Option<usize> {
        match self.data() {
            NodeData::Array(items) => Some(items.len()),
            _ => None,
        }
    }

    /// Borrows an element without acquiring a reference.
    pub fn array_get(&self, index: usize) -> Option<&Node> {
        match self.data() {
            NodeData::Array(items) => items.get(index),
            _ => None,
        }
    }

    pub fn object_len(&self) -> Option<usize> {
        match self.data() {
            NodeData::Object(entries) => Some(entries.len()),
            _ => None,
        }
    }

    /// Borrows the value stored under `key` without acquiring a reference.
    pub fn object_get(&self, key: &str) -> Option<&Node> {
        match self.data() {
            NodeData::Object(entries) => entries.get(key),
            _ => None,
        }
    }

    /// First cursor of a non-empty object; `None` for empty objects and non-objects.
    pub fn object_iter(&self) -> Option<Cursor> {
        match self.data() {
            NodeData::Object(entries) if !entries.is_empty() => Some(Cursor(0)),
            _ => None,
        }
    }

    pub fn object_iter_key(&self, cursor: Cursor) -> Option<&str> {
        self.entry_at(cursor).map(|(key, _)| key.as_str())
    }

    pub fn object_iter_value(&self, cursor: Cursor) -> Option<&Node> {
        self.entry_at(cursor).map(|(_, value)| value)
    }

    pub fn object_iter_next(&self, cursor: Cursor) -> Option<Cursor> {
        let next = Cursor(cursor.0 + 1);
        self.entry_at(next).map(|_| next)
    }

    /// Acquires one more reference to this node.
    pub fn incref(&self) -> Node {
        self.clone()
    }

    /// Number of outstanding references, including `self`.
    pub fn ref_count(&self) -> usize {
        Rc::strong_count(&self.0)
    }

    fn entry_at(&self, cursor: Cursor) -> Option<(&String, &Node)> {
        match self.data() {
            NodeData::Object(entries) => entries.get_index(cursor.0),
            _ => None,
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.data(), f)
    }
}

impl From<&Value> for Node {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => Node::null(),
            Value::Bool(value) => Node::bool(*value),
            Value::Number(number) => match number.as_i64() {
                Some(value) => Node::integer(value),
                None => number
                    .as_f64()
                    .and_then(Node::real)
                    .unwrap_or_else(Node::null),
            },
            Value::String(value) => Node::string(value.as_str()),
            Value::Array(items) => Node::array(items.iter().map(Node::from).collect()),
            Value::Object(map) => Node::object(
                map.iter()
                    .map(|(key, value)| (key.clone(), Node::from(value))),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{JsonType, Node};
    use serde_json::json;

    fn sample() -> Node {
        Node::from(&json!({"a": 1, "items": [10, 20, 30], "name": "x"}))
    }

    #[test]
    fn accessors_respect_types() {
        let root = sample();
        assert_eq!(root.json_type(), JsonType::Object);
        assert_eq!(root.object_len(), Some(3));
        assert_eq!(root.array_len(), None);

        let items = root.object_get("items").expect("items");
        assert_eq!(items.array_len(), Some(3));
        assert_eq!(items.array_get(1).and_then(Node::as_i64), Some(20));
        assert!(items.array_get(3).is_none());
        assert!(items.object_get("a").is_none());

        let name = root.object_get("name").expect("name");
        assert_eq!(name.as_str(), Some("x"));
        assert_eq!(name.as_i64(), None);
        assert!(root.object_get("missing").is_none());
    }

    #[test]
    fn cursor_walks_entries_in_insertion_order() {
        let root = Node::object([
            ("z", Node::integer(1)),
            ("a", Node::integer(2)),
            ("m", Node::integer(3)),
        ]);
        let mut keys = Vec::new();
        let mut cursor = root.object_iter();
        while let Some(at) = cursor {
            keys.push(root.object_iter_key(at).expect("key").to_string());
            cursor = root.object_iter_next(at);
        }
        assert_eq!(keys, ["z", "a", "m"]);
    }

    #[test]
    fn empty_object_and_non_object_have_no_cursor() {
        assert!(Node::object(Vec::<(String, Node)>::new()).object_iter().is_none());
        assert!(Node::array(vec![Node::null()]).object_iter().is_none());
    }

    #[test]
    fn repeated_key_replaces_value_in_place() {
        let root = Node::object([
            ("a", Node::integer(1)),
            ("b", Node::integer(2)),
            ("a", Node::integer(3)),
        ]);
        assert_eq!(root.object_len(), Some(2));
        let first = root.object_iter().expect("cursor");
        assert_eq!(root.object_iter_key(first), Some("a"));
        assert_eq!(root.object_iter_value(first).and_then(Node::as_i64), Some(3));
    }

    #[test]
    fn non_finite_reals_are_refused() {
        assert!(Node::real(f64::NAN).is_none());
        assert!(Node::real(f64::INFINITY).is_none());
        assert!(Node::real(f64::NEG_INFINITY).is_none());
        assert_eq!(Node::real(-0.5).and_then(|node| node.as_f64()), Some(-0.5));
    }

    #[test]
    fn wide_object_lookup_and_order() {
        let root = Node::object((0..5000).map(|i| (format!("k{i}"), Node::integer(i))));
        assert_eq!(root.object_len(), Some(5000));
        assert_eq!(root.object_get("k4999").and_then(Node::as_i64), Some(4999));
        let first = root.object_iter().expect("cursor");
        assert_eq!(root.object_iter_key(first), Some("k0"));
    }

    #[test]
    fn incref_and_drop_move_the_count() {
        let root = sample();
        let items = root.object_get("items").expect("items");
        assert_eq!(items.ref_count(), 1);
        let extra = items.incref();
        assert_eq!(items.ref_count(), 2);
        drop(extra);
        assert_eq!(items.ref_count(), 1);
    }
}
