//! In-memory payload model
//!
//! A `Document` is an arena of structural containers plus a root value.
//! Containers refer to each other through `NodeId` handles, so a payload can
//! share one container under several keys or point back at an ancestor
//! without any reference counting cycles.

use std::fmt;
use std::io;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Serialize, Serializer};
use serde_json::Number;

use crate::error::{DocumentError, Result};
use crate::transform::date::to_iso_string;

/// Handle to a container stored in a `Document`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A value whose internals are never walked by the transformer.
///
/// Implementors that know how to present themselves as plain JSON return it
/// from `to_plain`; the transformer then stores that plain form instead of
/// the object. Everything else is carried through by reference.
pub trait OpaqueValue: fmt::Debug + Send + Sync {
    /// Short name used in logs
    fn type_name(&self) -> &str;

    /// Plain representation, if this value has one
    fn to_plain(&self) -> Option<serde_json::Value> {
        None
    }
}

/// A single payload value: either a terminal or a handle to a container
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Number(Number),
    Text(String),
    Date(DateTime<Utc>),
    Opaque(Arc<dyn OpaqueValue>),
    Node(NodeId),
}

impl Value {
    /// Truthiness as used by the date-field rule: null, false, zero and the
    /// empty string are falsy, every object is truthy
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
            Value::Text(s) => !s.is_empty(),
            Value::Date(_) | Value::Opaque(_) | Value::Node(_) => true,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_node(&self) -> Option<NodeId> {
        match self {
            Value::Node(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::Opaque(a), Value::Opaque(b)) => {
                Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
            }
            (Value::Node(a), Value::Node(b)) => a == b,
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n.into())
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Value::Number(n.into())
    }
}

impl From<f64> for Value {
    /// Non-finite floats have no JSON number form and become `Null`
    fn from(f: f64) -> Self {
        Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(dt: DateTime<Utc>) -> Self {
        Value::Date(dt)
    }
}

impl From<NodeId> for Value {
    fn from(id: NodeId) -> Self {
        Value::Node(id)
    }
}

/// Insertion-ordered map entries with unique keys
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fields {
    entries: IndexMap<String, Value>,
}

impl Fields {
    pub fn new() -> Self {
        Fields::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Fields {
            entries: IndexMap::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Entry at insertion position `index`
    pub fn get_index(&self, index: usize) -> Option<(&str, &Value)> {
        self.entries.get_index(index).map(|(k, v)| (k.as_str(), v))
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Insert or replace. A replaced key keeps its original position.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.entries.insert(key.into(), value)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub(crate) fn set_at(&mut self, index: usize, value: Value) {
        if let Some((_, slot)) = self.entries.get_index_mut(index) {
            *slot = value;
        }
    }
}

/// A structural container
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Sequence(Vec<Value>),
    Map(Fields),
}

impl Node {
    pub fn len(&self) -> usize {
        match self {
            Node::Sequence(items) => items.len(),
            Node::Map(fields) => fields.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_sequence(&self) -> bool {
        matches!(self, Node::Sequence(_))
    }
}

/// An arena of containers plus the value at the top of the payload
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
    root: Value,
}

impl Default for Document {
    fn default() -> Self {
        Document::new()
    }
}

impl Document {
    /// An empty document whose root is `Null`
    pub fn new() -> Self {
        Document {
            nodes: Vec::new(),
            root: Value::Null,
        }
    }

    /// A document holding a single terminal root
    pub fn scalar(value: Value) -> Self {
        let mut doc = Document::new();
        if value.as_node().is_none() {
            doc.root = value;
        }
        doc
    }

    /// Build a tree-shaped document from plain JSON
    pub fn from_json(json: serde_json::Value) -> Self {
        let mut doc = Document::new();
        doc.root = doc.import_json(json);
        doc
    }

    pub fn root(&self) -> &Value {
        &self.root
    }

    pub fn set_root(&mut self, value: Value) -> Result<()> {
        self.check_value(&value)?;
        self.root = value;
        Ok(())
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn add_node(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    pub fn add_map(&mut self) -> NodeId {
        self.add_node(Node::Map(Fields::new()))
    }

    pub fn add_sequence(&mut self) -> NodeId {
        self.add_node(Node::Sequence(Vec::new()))
    }

    /// Insert `value` under `key` in map `map`
    pub fn insert(&mut self, map: NodeId, key: impl Into<String>, value: Value) -> Result<()> {
        self.check_value(&value)?;
        match self.nodes.get_mut(map.0) {
            Some(Node::Map(fields)) => {
                fields.insert(key, value);
                Ok(())
            }
            Some(Node::Sequence(_)) => Err(DocumentError::NotAMap(map)),
            None => Err(DocumentError::DanglingNode(map)),
        }
    }

    /// Append `value` to sequence `seq`
    pub fn push(&mut self, seq: NodeId, value: Value) -> Result<()> {
        self.check_value(&value)?;
        match self.nodes.get_mut(seq.0) {
            Some(Node::Sequence(items)) => {
                items.push(value);
                Ok(())
            }
            Some(Node::Map(_)) => Err(DocumentError::NotASequence(seq)),
            None => Err(DocumentError::DanglingNode(seq)),
        }
    }

    /// Look up `key` in map `map`
    pub fn field(&self, map: NodeId, key: &str) -> Option<&Value> {
        match self.node(map)? {
            Node::Map(fields) => fields.get(key),
            Node::Sequence(_) => None,
        }
    }

    /// Look up position `index` in sequence `seq`
    pub fn item(&self, seq: NodeId, index: usize) -> Option<&Value> {
        match self.node(seq)? {
            Node::Sequence(items) => items.get(index),
            Node::Map(_) => None,
        }
    }

    /// Copy plain JSON into this arena as fresh containers
    pub fn import_json(&mut self, json: serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n),
            serde_json::Value::String(s) => Value::Text(s),
            serde_json::Value::Array(arr) => {
                let items = arr.into_iter().map(|item| self.import_json(item)).collect();
                Value::Node(self.add_node(Node::Sequence(items)))
            }
            serde_json::Value::Object(obj) => {
                let mut fields = Fields::with_capacity(obj.len());
                for (key, value) in obj {
                    let value = self.import_json(value);
                    fields.insert(key, value);
                }
                Value::Node(self.add_node(Node::Map(fields)))
            }
        }
    }

    /// Export the document as plain JSON.
    ///
    /// Shared containers are written out once per reference. Dates use their
    /// ISO-8601 form, opaque values their plain form or `null`.
    pub fn to_json(&self) -> Result<serde_json::Value> {
        let mut builder = ValueBuilder::default();
        self.walk_json(&mut builder)?;
        Ok(builder.finish())
    }

    /// Write the document as compact JSON text.
    ///
    /// Unlike `to_json` and `Serialize`, nothing here nests on the call stack,
    /// so any depth the transform produces can be written out.
    pub fn write_json<W: io::Write>(&self, writer: W) -> Result<()> {
        self.walk_json(&mut TextWriter::new(writer))
    }

    pub fn to_json_string(&self) -> Result<String> {
        let mut buf = Vec::new();
        self.write_json(&mut buf)?;
        String::from_utf8(buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e).into())
    }

    /// Deepest container nesting reachable from the root
    pub fn depth(&self) -> Result<usize> {
        let mut counter = DepthCounter::default();
        self.walk_json(&mut counter)?;
        Ok(counter.max)
    }

    /// Depth-first export with an explicit stack of `(container, next entry)`
    fn walk_json<S: JsonSink>(&self, sink: &mut S) -> Result<()> {
        let mut on_path = vec![false; self.nodes.len()];
        let mut stack: Vec<(NodeId, usize)> = Vec::new();
        self.emit_value(&self.root, sink, &mut on_path, &mut stack)?;

        while let Some(top) = stack.last_mut() {
            let (id, index) = *top;
            top.1 += 1;

            let next = match &self.nodes[id.0] {
                Node::Sequence(items) => items.get(index),
                Node::Map(fields) => match fields.get_index(index) {
                    Some((key, value)) => {
                        sink.key(key)?;
                        Some(value)
                    }
                    None => None,
                },
            };

            match next {
                Some(value) => self.emit_value(value, sink, &mut on_path, &mut stack)?,
                None => {
                    stack.pop();
                    on_path[id.0] = false;
                    sink.close()?;
                }
            }
        }
        Ok(())
    }

    fn emit_value<S: JsonSink>(
        &self,
        value: &Value,
        sink: &mut S,
        on_path: &mut [bool],
        stack: &mut Vec<(NodeId, usize)>,
    ) -> Result<()> {
        let json = match value {
            Value::Node(id) => {
                let node = self.node(*id).ok_or(DocumentError::DanglingNode(*id))?;
                if on_path[id.0] {
                    return Err(DocumentError::Cycle(*id));
                }
                on_path[id.0] = true;
                stack.push((*id, 0));
                return sink.open(node.is_sequence(), node.len());
            }
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => serde_json::Value::Number(n.clone()),
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::Date(dt) => serde_json::Value::String(to_iso_string(dt)),
            Value::Opaque(opaque) => opaque.to_plain().unwrap_or(serde_json::Value::Null),
        };
        sink.leaf(json)
    }

    fn check_value(&self, value: &Value) -> Result<()> {
        match value {
            Value::Node(id) if id.0 >= self.nodes.len() => Err(DocumentError::DanglingNode(*id)),
            _ => Ok(()),
        }
    }

    /// Overwrite a slot the transformer reserved earlier
    pub(crate) fn fill(&mut self, target: NodeId, slot: usize, value: Value) {
        match self.nodes.get_mut(target.0) {
            Some(Node::Sequence(items)) => {
                if let Some(item) = items.get_mut(slot) {
                    *item = value;
                }
            }
            Some(Node::Map(fields)) => fields.set_at(slot, value),
            None => {}
        }
    }

    pub(crate) fn set_root_unchecked(&mut self, value: Value) {
        self.root = value;
    }
}

/// Deepest nesting `Serialize` accepts. Serde serializers recurse once per
/// level, so deeper documents must go through `Document::write_json`.
pub const MAX_SERIALIZE_DEPTH: usize = 512;

impl Serialize for Document {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let depth = self.depth().map_err(serde::ser::Error::custom)?;
        if depth > MAX_SERIALIZE_DEPTH {
            return Err(serde::ser::Error::custom(DocumentError::TooDeep {
                depth,
                limit: MAX_SERIALIZE_DEPTH,
            }));
        }
        let json = self.to_json().map_err(serde::ser::Error::custom)?;
        json.serialize(serializer)
    }
}

/// Receives a document as a flat stream of JSON events
trait JsonSink {
    fn open(&mut self, sequence: bool, len: usize) -> Result<()>;
    fn key(&mut self, key: &str) -> Result<()>;
    fn leaf(&mut self, json: serde_json::Value) -> Result<()>;
    fn close(&mut self) -> Result<()>;
}

enum Partial {
    Array(Vec<serde_json::Value>),
    Object(serde_json::Map<String, serde_json::Value>, String),
}

/// Assembles a `serde_json::Value` bottom-up
#[derive(Default)]
struct ValueBuilder {
    open: Vec<Partial>,
    done: Option<serde_json::Value>,
}

impl ValueBuilder {
    fn attach(&mut self, json: serde_json::Value) {
        match self.open.last_mut() {
            Some(Partial::Array(items)) => items.push(json),
            Some(Partial::Object(obj, key)) => {
                obj.insert(std::mem::take(key), json);
            }
            None => self.done = Some(json),
        }
    }

    fn finish(self) -> serde_json::Value {
        self.done.unwrap_or(serde_json::Value::Null)
    }
}

impl JsonSink for ValueBuilder {
    fn open(&mut self, sequence: bool, len: usize) -> Result<()> {
        self.open.push(if sequence {
            Partial::Array(Vec::with_capacity(len))
        } else {
            Partial::Object(serde_json::Map::with_capacity(len), String::new())
        });
        Ok(())
    }

    fn key(&mut self, key: &str) -> Result<()> {
        if let Some(Partial::Object(_, pending)) = self.open.last_mut() {
            *pending = key.to_string();
        }
        Ok(())
    }

    fn leaf(&mut self, json: serde_json::Value) -> Result<()> {
        self.attach(json);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let json = match self.open.pop() {
            Some(Partial::Array(items)) => serde_json::Value::Array(items),
            Some(Partial::Object(obj, _)) => serde_json::Value::Object(obj),
            None => return Ok(()),
        };
        self.attach(json);
        Ok(())
    }
}

/// Streams compact JSON text. Each open container remembers whether it is a
/// sequence and whether it already holds an entry.
struct TextWriter<W> {
    writer: W,
    open: Vec<(bool, bool)>,
    after_key: bool,
}

impl<W: io::Write> TextWriter<W> {
    fn new(writer: W) -> Self {
        TextWriter {
            writer,
            open: Vec::new(),
            after_key: false,
        }
    }

    /// Separator before a value: none after a key, a comma between items
    fn begin_value(&mut self) -> Result<()> {
        if self.after_key {
            self.after_key = false;
            return Ok(());
        }
        if let Some((_, filled)) = self.open.last_mut() {
            if *filled {
                self.writer.write_all(b",")?;
            }
            *filled = true;
        }
        Ok(())
    }
}

impl<W: io::Write> JsonSink for TextWriter<W> {
    fn open(&mut self, sequence: bool, _len: usize) -> Result<()> {
        self.begin_value()?;
        self.writer.write_all(if sequence { b"[" } else { b"{" })?;
        self.open.push((sequence, false));
        Ok(())
    }

    fn key(&mut self, key: &str) -> Result<()> {
        if let Some((_, filled)) = self.open.last_mut() {
            if *filled {
                self.writer.write_all(b",")?;
            }
            *filled = true;
        }
        serde_json::to_writer(&mut self.writer, key).map_err(io::Error::from)?;
        self.writer.write_all(b":")?;
        self.after_key = true;
        Ok(())
    }

    fn leaf(&mut self, json: serde_json::Value) -> Result<()> {
        self.begin_value()?;
        serde_json::to_writer(&mut self.writer, &json).map_err(io::Error::from)?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some((sequence, _)) = self.open.pop() {
            self.writer.write_all(if sequence { b"]" } else { b"}" })?;
        }
        Ok(())
    }
}

#[derive(Default)]
struct DepthCounter {
    current: usize,
    max: usize,
}

impl JsonSink for DepthCounter {
    fn open(&mut self, _sequence: bool, _len: usize) -> Result<()> {
        self.current += 1;
        self.max = self.max.max(self.current);
        Ok(())
    }

    fn key(&mut self, _key: &str) -> Result<()> {
        Ok(())
    }

    fn leaf(&mut self, _json: serde_json::Value) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.current = self.current.saturating_sub(1);
        Ok(())
    }
}
