// JSON text -> Node decoding with positioned, categorized parse diagnostics.
use std::fmt;

use indexmap::IndexMap;
use serde::de::{self, Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};
use serde_json::error::Category;

use crate::core::error::{Error, ErrorKind};
use crate::core::node::{Node, NodeData};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ParseFailureCategory {
    Syntax,
    Eof,
    Data,
    Io,
}

impl ParseFailureCategory {
    pub fn label(self) -> &'static str {
        match self {
            ParseFailureCategory::Syntax => "syntax",
            ParseFailureCategory::Eof => "eof",
            ParseFailureCategory::Data => "data",
            ParseFailureCategory::Io => "io",
        }
    }
}

/// Parses any JSON value (scalars included) into a fresh tree.
///
/// The returned root holds the only reference to itself; ownership passes to the
/// caller.
pub fn parse(text: &str) -> Result<Node, Error> {
    serde_json::from_str::<Node>(text).map_err(|err| parse_error(err, text))
}

pub fn categorize_error(err: &serde_json::Error) -> ParseFailureCategory {
    match err.classify() {
        Category::Syntax => ParseFailureCategory::Syntax,
        Category::Eof => ParseFailureCategory::Eof,
        Category::Data => ParseFailureCategory::Data,
        Category::Io => ParseFailureCategory::Io,
    }
}

/// Parser message with the trailing " at line L column C" removed.
pub fn bare_message(err: &serde_json::Error) -> String {
    let text = err.to_string();
    let suffix = format!(" at line {} column {}", err.line(), err.column());
    match text.strip_suffix(&suffix) {
        Some(message) => message.to_string(),
        None => text,
    }
}

/// A token cut short by a line break is reported by serde_json on the next line
/// at column 0; that position is moved back to the end of the offending line.
fn error_position(text: &str, line: usize, column: usize) -> (usize, usize) {
    if column > 0 || line < 2 {
        return (line, column);
    }
    let previous = text.lines().nth(line - 2).map_or(0, str::len);
    (line - 1, previous)
}

fn parse_error(err: serde_json::Error, text: &str) -> Error {
    let category = categorize_error(&err);
    let message = format!("{} (parse category: {})", bare_message(&err), category.label());
    let (line, column) = error_position(text, err.line(), err.column());
    tracing::debug!(
        line,
        column,
        category = category.label(),
        "json parse failed"
    );
    Error::new(ErrorKind::Parse)
        .with_position(line, column)
        .with_message(message)
        .with_source(err)
}

impl<'de> Deserialize<'de> for Node {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(NodeVisitor)
    }
}

struct NodeVisitor;

impl<'de> Visitor<'de> for NodeVisitor {
    type Value = Node;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("any JSON value")
    }

    fn visit_unit<E: de::Error>(self) -> Result<Node, E> {
        Ok(Node::null())
    }

    fn visit_bool<E: de::Error>(self, value: bool) -> Result<Node, E> {
        Ok(Node::bool(value))
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<Node, E> {
        Ok(Node::integer(value))
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<Node, E> {
        i64::try_from(value)
            .map(Node::integer)
            .map_err(|_| E::custom("too big integer"))
    }

    fn visit_f64<E: de::Error>(self, value: f64) -> Result<Node, E> {
        Node::real(value).ok_or_else(|| E::custom("real number overflow"))
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Node, E> {
        Ok(Node::string(value))
    }

    fn visit_string<E: de::Error>(self, value: String) -> Result<Node, E> {
        Ok(Node::string(value))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Node, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element::<Node>()? {
            items.push(item);
        }
        Ok(Node::array(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Node, A::Error> {
        let mut entries = IndexMap::with_capacity(map.size_hint().unwrap_or(0));
        while let Some((key, value)) = map.next_entry::<String, Node>()? {
            entries.insert(key, value);
        }
        Ok(Node::from_data(NodeData::Object(entries)))
    }
}

#[cfg(test)]
mod tests {
    use super::{ParseFailureCategory, categorize_error, parse};
    use crate::core::error::ErrorKind;
    use crate::core::node::{JsonType, Node};

    #[test]
    fn parses_nested_document() {
        let root = parse(r#"{"a":1,"items":[10,20,30],"pi":3.5,"ok":true,"nil":null}"#)
            .expect("parse");
        assert_eq!(root.ref_count(), 1);
        assert_eq!(root.object_len(), Some(5));
        let items = root.object_get("items").expect("items");
        assert_eq!(items.array_get(2).and_then(Node::as_i64), Some(30));
        assert_eq!(root.object_get("pi").and_then(Node::as_f64), Some(3.5));
        assert_eq!(root.object_get("ok").and_then(Node::as_bool), Some(true));
        assert_eq!(
            root.object_get("nil").map(Node::json_type),
            Some(JsonType::Null)
        );
    }

    #[test]
    fn scalar_roots_are_accepted() {
        assert_eq!(parse("42").expect("int").as_i64(), Some(42));
        assert_eq!(parse("\"hi\"").expect("str").as_str(), Some("hi"));
        assert_eq!(parse("-7").expect("neg").as_i64(), Some(-7));
    }

    #[test]
    fn truncated_object_reports_position() {
        let err = parse(r#"{"a":"#).expect_err("should fail");
        assert_eq!(err.kind(), ErrorKind::Parse);
        assert_eq!(err.line(), Some(1));
        assert!(err.column().is_some());
        let message = err.message().expect("message");
        assert!(!message.is_empty());
        assert!(message.contains("parse category: eof"));
        assert!(!message.contains(" at line "));
    }

    #[test]
    fn token_cut_by_newline_stays_on_its_line() {
        let err = parse("[1,\n tru\n]").expect_err("should fail");
        assert_eq!(err.line(), Some(2));
        assert_eq!(err.column(), Some(4));

        let err = parse("[1,\n 2 x]").expect_err("should fail");
        assert_eq!(err.line(), Some(2));
        assert_eq!(err.column(), Some(4));
    }

    #[test]
    fn integer_beyond_i64_is_rejected() {
        let err = parse("[18446744073709551615]").expect_err("should fail");
        assert_eq!(err.kind(), ErrorKind::Parse);
        assert!(err.message().expect("message").contains("too big integer"));
    }

    #[test]
    fn syntax_errors_are_categorized() {
        let err = serde_json::from_str::<Node>(r#"{"a":}"#).expect_err("should fail");
        assert_eq!(categorize_error(&err), ParseFailureCategory::Syntax);
    }
}
