// Node -> JSON text encoding driven by a passthrough flag word.
use std::io;

use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use serde_json::ser::Formatter;

use crate::core::error::{Error, ErrorKind};
use crate::core::node::{Node, NodeData};

/// Encoder flag word; bit layout matches the conventional C JSON library flags so
/// hosts can pass their existing constants through unchanged.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct EncodeFlags(u32);

impl EncodeFlags {
    pub const INDENT_MASK: u32 = 0x1F;
    pub const COMPACT: u32 = 0x20;
    pub const ENSURE_ASCII: u32 = 0x40;
    pub const SORT_KEYS: u32 = 0x80;
    pub const PRESERVE_ORDER: u32 = 0x100;

    pub fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn indent(n: u32) -> Self {
        Self(n & Self::INDENT_MASK)
    }

    pub fn with(self, bits: u32) -> Self {
        Self(self.0 | bits)
    }

    pub fn indent_width(self) -> usize {
        (self.0 & Self::INDENT_MASK) as usize
    }

    pub fn compact(self) -> bool {
        self.0 & Self::COMPACT != 0
    }

    pub fn ensure_ascii(self) -> bool {
        self.0 & Self::ENSURE_ASCII != 0
    }

    pub fn sort_keys(self) -> bool {
        self.0 & Self::SORT_KEYS != 0
    }
}

impl Node {
    pub fn encode(&self, flags: EncodeFlags) -> Result<String, Error> {
        let mut out = Vec::new();
        let formatter = FlagFormatter::new(flags);
        let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
        Encoded {
            node: self,
            sort_keys: flags.sort_keys(),
        }
        .serialize(&mut serializer)
        .map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("failed to encode json")
                .with_source(err)
        })?;
        String::from_utf8(out).map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("encoder produced invalid utf-8")
                .with_source(err)
        })
    }
}

impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        Encoded {
            node: self,
            sort_keys: false,
        }
        .serialize(serializer)
    }
}

struct Encoded<'a> {
    node: &'a Node,
    sort_keys: bool,
}

impl<'a> Encoded<'a> {
    fn child(&self, node: &'a Node) -> Encoded<'a> {
        Encoded {
            node,
            sort_keys: self.sort_keys,
        }
    }
}

impl Serialize for Encoded<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.node.data() {
            NodeData::Null => serializer.serialize_unit(),
            NodeData::Bool(value) => serializer.serialize_bool(*value),
            NodeData::Integer(value) => serializer.serialize_i64(*value),
            NodeData::Real(value) => serializer.serialize_f64(*value),
            NodeData::String(value) => serializer.serialize_str(value),
            NodeData::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(&self.child(item))?;
                }
                seq.end()
            }
            NodeData::Object(entries) => {
                let mut ordered: Vec<(&String, &Node)> = entries.iter().collect();
                if self.sort_keys {
                    ordered.sort_by(|a, b| a.0.cmp(b.0));
                }
                let mut map = serializer.serialize_map(Some(ordered.len()))?;
                for (key, value) in ordered {
                    map.serialize_entry(key, &self.child(value))?;
                }
                map.end()
            }
        }
    }
}

/// Separators are `", "`/`": "` by default, `","`/`":"` when compact; a non-zero
/// indent puts every element on its own line.
struct FlagFormatter {
    indent: usize,
    compact: bool,
    ensure_ascii: bool,
    depth: usize,
    has_value: bool,
}

impl FlagFormatter {
    fn new(flags: EncodeFlags) -> Self {
        Self {
            indent: flags.indent_width(),
            compact: flags.compact(),
            ensure_ascii: flags.ensure_ascii(),
            depth: 0,
            has_value: false,
        }
    }

    fn begin_nested<W: ?Sized + io::Write>(&mut self, writer: &mut W, open: &[u8]) -> io::Result<()> {
        self.depth += 1;
        self.has_value = false;
        writer.write_all(open)
    }

    fn end_nested<W: ?Sized + io::Write>(&mut self, writer: &mut W, close: &[u8]) -> io::Result<()> {
        self.depth -= 1;
        if self.has_value && self.indent > 0 {
            self.newline(writer)?;
        }
        writer.write_all(close)
    }

    fn begin_item<W: ?Sized + io::Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        if !first {
            writer.write_all(b",")?;
        }
        if self.indent > 0 {
            self.newline(writer)
        } else if !first && !self.compact {
            writer.write_all(b" ")
        } else {
            Ok(())
        }
    }

    fn newline<W: ?Sized + io::Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(b"\n")?;
        for _ in 0..self.depth * self.indent {
            writer.write_all(b" ")?;
        }
        Ok(())
    }
}

impl Formatter for FlagFormatter {
    fn begin_array<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.begin_nested(writer, b"[")
    }

    fn end_array<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.end_nested(writer, b"]")
    }

    fn begin_array_value<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        self.begin_item(writer, first)
    }

    fn end_array_value<W: ?Sized + io::Write>(&mut self, _writer: &mut W) -> io::Result<()> {
        self.has_value = true;
        Ok(())
    }

    fn begin_object<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.begin_nested(writer, b"{")
    }

    fn end_object<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.end_nested(writer, b"}")
    }

    fn begin_object_key<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        self.begin_item(writer, first)
    }

    fn begin_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        if self.compact {
            writer.write_all(b":")
        } else {
            writer.write_all(b": ")
        }
    }

    fn end_object_value<W: ?Sized + io::Write>(&mut self, _writer: &mut W) -> io::Result<()> {
        self.has_value = true;
        Ok(())
    }

    fn write_string_fragment<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        fragment: &str,
    ) -> io::Result<()> {
        if !self.ensure_ascii || fragment.is_ascii() {
            return writer.write_all(fragment.as_bytes());
        }
        let mut units = [0u16; 2];
        for ch in fragment.chars() {
            if ch.is_ascii() {
                writer.write_all(&[ch as u8])?;
                continue;
            }
            for unit in ch.encode_utf16(&mut units) {
                write!(writer, "\\u{unit:04X}")?;
            }
        }
        Ok(())
    }
}
